//! ---
//! cvo_section: "07-resilience-fault-tolerance"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Lease-based leader election."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use async_trait::async_trait;

use crate::signal::StopSignal;

/// Hooks invoked by [`crate::LeaderElector::run`].
#[async_trait]
pub trait LeaderCallbacks: Send + Sync + 'static {
    /// Runs on its own task once the lease is acquired. Must return promptly
    /// after `stop` fires.
    async fn on_started_leading(&self, stop: StopSignal);

    /// Called exactly once, after the `on_started_leading` task has finished.
    async fn on_stopped_leading(&self);

    /// A different replica was observed holding the lease.
    fn on_new_leader(&self, _identity: &str) {}
}
