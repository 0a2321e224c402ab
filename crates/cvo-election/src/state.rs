//! ---
//! cvo_section: "07-resilience-fault-tolerance"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Lease-based leader election."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use std::fmt;

/// Position of an elector in the acquire/renew/release protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElectionState {
    /// Not holding the lease; waiting for the next attempt.
    Idle,
    /// An acquisition attempt is in flight.
    Acquiring,
    /// Lease acquired; the control loop has been handed off.
    Leading,
    /// Periodically refreshing the lease.
    Renewing,
    /// Terminal. The process must exit; there is no way back to `Idle`.
    Released,
}

impl ElectionState {
    pub fn is_leader(&self) -> bool {
        matches!(self, ElectionState::Leading | ElectionState::Renewing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ElectionState::Released)
    }
}

impl fmt::Display for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ElectionState::Idle => "idle",
            ElectionState::Acquiring => "acquiring",
            ElectionState::Leading => "leading",
            ElectionState::Renewing => "renewing",
            ElectionState::Released => "released",
        };
        f.write_str(label)
    }
}

/// How [`crate::LeaderElector::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// No renewal succeeded within the renew deadline.
    LeadershipLost,
    /// Shutdown was requested, before or during leadership.
    Cancelled,
    /// The control loop returned on its own while this replica was leading.
    ControlLoopExited,
}

/// Result of a single acquire-or-renew attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// This replica took the lease from nobody, an expired holder, or a fresh record.
    Acquired,
    /// This replica already held the lease and refreshed it.
    Renewed,
    /// Another replica holds a live lease; nothing was written.
    HeldByOther { holder: String },
    /// A concurrent writer won the compare-and-set.
    LostRace,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Acquired | AttemptOutcome::Renewed)
    }
}
