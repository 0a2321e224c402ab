//! ---
//! cvo_section: "07-resilience-fault-tolerance"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Lease-based leader election."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
//! The acquire/renew/release state machine.
//!
//! A replica loops in `Idle -> Acquiring` until it sees the lease absent,
//! expired or already its own. Expiry is judged on this replica's own clock:
//! a lease held by someone else stays live until the record has gone
//! unchanged for a full configured lease duration since we first saw it, so
//! clock skew between hosts never shortens the wait.
//!
//! Once it leads it renews every retry period and must get a renewal through
//! within the renew deadline of each renewal cycle. When it cannot, it stops
//! the control loop and reports `LeadershipLost`; the process is expected to
//! exit rather than retry. Everything after the loss, including the stop
//! event, completes within `renew_deadline + retry_period` of the last
//! successful renewal.
use std::sync::Arc;
use std::time::Duration;

use cvo_common::{ElectionConfig, ProcessIdentity};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::callbacks::LeaderCallbacks;
use crate::clock::{Clock, MonotonicClock};
use crate::error::{ElectionError, LockError};
use crate::events::{EventRecorder, TracingRecorder, LEADER_ELECTION_REASON};
use crate::lock::LockResource;
use crate::record::{LeaseRecord, LockVersion};
use crate::signal::{stop_channel, StopSignal};
use crate::state::{AttemptOutcome, ElectionState, Termination};

/// Upper bound for posting the "stopped leading" event before exiting.
const STOP_EVENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct Observed {
    record: LeaseRecord,
    version: LockVersion,
    // local time the record was last seen to change
    observed_at: Instant,
}

enum RenewCycle {
    Renewed,
    Lost,
    Cancelled,
}

/// Runs the lease protocol for one replica against one lock.
pub struct LeaderElector {
    identity: ProcessIdentity,
    config: ElectionConfig,
    lock: Arc<dyn LockResource>,
    recorder: Arc<dyn EventRecorder>,
    clock: Arc<dyn Clock>,
    observed: Option<Observed>,
    last_renewed: Option<Instant>,
    reported_leader: Option<String>,
    state: watch::Sender<ElectionState>,
}

impl LeaderElector {
    pub fn new(
        identity: ProcessIdentity,
        config: ElectionConfig,
        lock: Arc<dyn LockResource>,
    ) -> Result<Self, ElectionError> {
        config.validate()?;
        let recorder = Arc::new(TracingRecorder::new(lock.describe()));
        let (state, _) = watch::channel(ElectionState::Idle);
        Ok(Self {
            identity,
            config,
            lock,
            recorder,
            clock: Arc::new(MonotonicClock::new()),
            observed: None,
            last_renewed: None,
            reported_leader: None,
            state,
        })
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn identity(&self) -> &ProcessIdentity {
        &self.identity
    }

    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    pub fn state(&self) -> ElectionState {
        *self.state.borrow()
    }

    /// Follow state transitions from another task.
    pub fn subscribe(&self) -> watch::Receiver<ElectionState> {
        self.state.subscribe()
    }

    /// Last record read or written by this replica.
    pub fn observed_record(&self) -> Option<&LeaseRecord> {
        self.observed.as_ref().map(|observed| &observed.record)
    }

    /// Whether the last observed record names this replica.
    pub fn is_leader(&self) -> bool {
        self.observed_record()
            .is_some_and(|record| record.is_held_by(self.identity.as_str()))
    }

    /// One pass of the protocol: read the record and claim or refresh it when
    /// allowed. A live lease held by someone else is never written to.
    pub async fn try_acquire_or_renew(&mut self) -> Result<AttemptOutcome, LockError> {
        let me = self.identity.as_str().to_owned();
        let lease_seconds = self.config.lease_duration_seconds();
        let attempted_at = Instant::now();
        let now = self.clock.now();

        let (current, version) = match self.lock.get().await {
            Ok(found) => found,
            Err(LockError::NotFound(_)) => {
                let record = LeaseRecord::claim(&me, lease_seconds, now);
                return match self.lock.create(&record).await {
                    Ok(version) => {
                        self.observe(record, version);
                        self.last_renewed = Some(attempted_at);
                        Ok(AttemptOutcome::Acquired)
                    }
                    Err(err) if err.is_conflict() => Ok(AttemptOutcome::LostRace),
                    Err(err) => Err(err),
                };
            }
            Err(err) => return Err(err),
        };
        self.observe(current.clone(), version.clone());

        let held_by_me = current.is_held_by(&me);
        if !held_by_me && !current.is_vacant() && self.observed_lease_is_live() {
            return Ok(AttemptOutcome::HeldByOther {
                holder: current.holder_identity,
            });
        }

        let mut next = LeaseRecord::claim(&me, lease_seconds, now);
        next.leader_transitions = current.leader_transitions;
        if held_by_me {
            next.acquire_time = current.acquire_time;
        } else {
            next.leader_transitions += 1;
        }

        match self.lock.update(&next, &version).await {
            Ok(version) => {
                self.observe(next, version);
                self.last_renewed = Some(attempted_at);
                Ok(if held_by_me {
                    AttemptOutcome::Renewed
                } else {
                    AttemptOutcome::Acquired
                })
            }
            Err(err) if err.is_conflict() => Ok(AttemptOutcome::LostRace),
            Err(err) => Err(err),
        }
    }

    /// Acquire, lead, renew, and finally release. Consumes the elector: a
    /// replica that stopped leading never goes back to `Idle`.
    pub async fn run(mut self, callbacks: Arc<dyn LeaderCallbacks>, stop: StopSignal) -> Termination {
        if !self.acquire(callbacks.as_ref(), &stop).await {
            self.set_state(ElectionState::Released);
            info!(identity = %self.identity, "shutdown requested before the lease was acquired");
            return Termination::Cancelled;
        }

        self.set_state(ElectionState::Leading);
        let (worker_stop, worker_signal) = stop_channel();
        let started = Arc::clone(&callbacks);
        let mut worker = tokio::spawn(async move { started.on_started_leading(worker_signal).await });

        let termination = tokio::select! {
            exit = self.renew(callbacks.as_ref(), &stop) => exit,
            joined = &mut worker => {
                if let Err(err) = joined {
                    error!(error = %err, "control loop task failed");
                }
                warn!(identity = %self.identity, "control loop exited while leading");
                Termination::ControlLoopExited
            }
        };

        worker_stop.stop();
        if termination != Termination::ControlLoopExited {
            self.stop_control_loop(worker).await;
        }

        match termination {
            Termination::LeadershipLost => {
                error!(identity = %self.identity, lock = %self.lock.describe(), "leader lease lost");
            }
            Termination::Cancelled | Termination::ControlLoopExited => {
                if self.config.release_on_cancel {
                    self.release().await;
                }
            }
        }
        self.record_stopped_leading(termination).await;
        self.set_state(ElectionState::Released);
        callbacks.on_stopped_leading().await;
        termination
    }

    async fn acquire(&mut self, callbacks: &dyn LeaderCallbacks, stop: &StopSignal) -> bool {
        info!(identity = %self.identity, lock = %self.lock.describe(), "attempting to acquire leader lease");
        loop {
            if stop.is_stopped() {
                return false;
            }
            self.set_state(ElectionState::Acquiring);
            let attempt = timeout(self.config.renew_deadline, self.try_acquire_or_renew()).await;
            self.report_leader(callbacks);
            match attempt {
                Ok(Ok(outcome)) if outcome.is_success() => {
                    info!(identity = %self.identity, lock = %self.lock.describe(), "successfully acquired lease");
                    self.record_event(format!("{} became leader", self.identity));
                    return true;
                }
                Ok(Ok(AttemptOutcome::HeldByOther { holder })) => {
                    debug!(%holder, "lease is held by another replica")
                }
                Ok(Ok(_)) => debug!("lost the race to acquire the lease"),
                Ok(Err(err)) if err.is_transient() => warn!(error = %err, "failed to acquire lease"),
                Ok(Err(err)) => error!(error = %err, "lock record needs repair before the lease can be acquired"),
                Err(_) => warn!("lease acquisition attempt timed out"),
            }
            self.set_state(ElectionState::Idle);
            let wait = self.jittered_retry();
            tokio::select! {
                _ = stop.stopped() => return false,
                _ = sleep(wait) => {}
            }
        }
    }

    async fn renew(&mut self, callbacks: &dyn LeaderCallbacks, stop: &StopSignal) -> Termination {
        loop {
            let cycle_start = self.renewed_at() + self.config.retry_period;
            tokio::select! {
                _ = stop.stopped() => return Termination::Cancelled,
                _ = sleep_until(cycle_start) => {}
            }
            self.set_state(ElectionState::Renewing);
            let deadline = cycle_start + self.config.renew_deadline;
            match self.renew_cycle(callbacks, stop, deadline).await {
                RenewCycle::Renewed => {}
                RenewCycle::Lost => return Termination::LeadershipLost,
                RenewCycle::Cancelled => return Termination::Cancelled,
            }
        }
    }

    /// Retry the renewal at the retry period until it succeeds or no further
    /// attempt fits before `deadline`.
    async fn renew_cycle(
        &mut self,
        callbacks: &dyn LeaderCallbacks,
        stop: &StopSignal,
        deadline: Instant,
    ) -> RenewCycle {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(deadline = ?self.config.renew_deadline, "failed to renew lease within the renew deadline");
                return RenewCycle::Lost;
            }
            let attempt = timeout(remaining, self.try_acquire_or_renew()).await;
            self.report_leader(callbacks);
            match attempt {
                Ok(Ok(outcome)) if outcome.is_success() => {
                    debug!(identity = %self.identity, "lease renewed");
                    return RenewCycle::Renewed;
                }
                Ok(Ok(AttemptOutcome::HeldByOther { holder })) => {
                    warn!(%holder, "lease was taken over by another replica");
                    return RenewCycle::Lost;
                }
                Ok(Ok(_)) => debug!("renewal lost a compare-and-set race"),
                Ok(Err(err)) if err.is_transient() => warn!(error = %err, "failed to renew lease"),
                Ok(Err(err)) => error!(error = %err, "lock record needs repair, cannot renew lease"),
                Err(_) => {
                    warn!(deadline = ?self.config.renew_deadline, "renewal did not complete within the renew deadline");
                    return RenewCycle::Lost;
                }
            }
            let next = Instant::now() + self.config.retry_period;
            if next >= deadline {
                warn!(deadline = ?self.config.renew_deadline, "failed to renew lease within the renew deadline");
                return RenewCycle::Lost;
            }
            tokio::select! {
                _ = stop.stopped() => return RenewCycle::Cancelled,
                _ = sleep_until(next) => {}
            }
        }
    }

    /// Wait for the control loop to wind down, leaving room for the stop
    /// event before the stop deadline. Aborted past that point.
    async fn stop_control_loop(&self, mut worker: JoinHandle<()>) {
        let grace = self
            .until_stop_deadline()
            .saturating_sub(STOP_EVENT_TIMEOUT);
        match timeout(grace, &mut worker).await {
            Ok(Ok(())) => debug!("control loop stopped"),
            Ok(Err(err)) => error!(error = %err, "control loop task failed"),
            Err(_) => {
                warn!(?grace, "control loop did not stop in time, aborting it");
                worker.abort();
                let _ = worker.await;
            }
        }
    }

    fn renewed_at(&self) -> Instant {
        self.last_renewed.unwrap_or_else(Instant::now)
    }

    /// Time left until `last renewal + retry_period + renew_deadline`, the
    /// latest point a replica that stopped leading may still be running.
    fn until_stop_deadline(&self) -> Duration {
        let deadline = self.renewed_at() + self.config.retry_period + self.config.renew_deadline;
        deadline.saturating_duration_since(Instant::now())
    }

    fn observed_lease_is_live(&self) -> bool {
        self.observed
            .as_ref()
            .is_some_and(|observed| observed.observed_at + self.config.lease_duration > Instant::now())
    }

    /// Hand the lease back with a one second duration so a standby can take
    /// over without waiting for expiry.
    async fn release(&mut self) {
        let Some(observed) = self.observed.clone() else {
            return;
        };
        if !observed.record.is_held_by(self.identity.as_str()) {
            return;
        }
        let now = self.clock.now();
        let record = LeaseRecord {
            holder_identity: String::new(),
            lease_duration_seconds: 1,
            acquire_time: now,
            renew_time: now,
            leader_transitions: observed.record.leader_transitions,
        };
        match timeout(
            self.config.renew_deadline,
            self.lock.update(&record, &observed.version),
        )
        .await
        {
            Ok(Ok(version)) => {
                info!(identity = %self.identity, "released leader lease");
                self.observe(record, version);
            }
            Ok(Err(err)) => warn!(error = %err, "failed to release leader lease"),
            Err(_) => warn!("timed out releasing leader lease"),
        }
    }

    fn observe(&mut self, record: LeaseRecord, version: LockVersion) {
        let observed_at = match &self.observed {
            Some(previous) if previous.record == record => previous.observed_at,
            _ => Instant::now(),
        };
        self.observed = Some(Observed {
            record,
            version,
            observed_at,
        });
    }

    fn report_leader(&mut self, callbacks: &dyn LeaderCallbacks) {
        let Some(holder) = self
            .observed
            .as_ref()
            .map(|observed| observed.record.holder_identity.clone())
        else {
            return;
        };
        if holder.is_empty() || self.reported_leader.as_deref() == Some(holder.as_str()) {
            return;
        }
        self.reported_leader = Some(holder.clone());
        if holder != self.identity.as_str() {
            info!(leader = %holder, "new leader observed");
            callbacks.on_new_leader(&holder);
        }
    }

    fn record_event(&self, message: String) {
        let recorder = Arc::clone(&self.recorder);
        tokio::spawn(async move {
            recorder.record(LEADER_ELECTION_REASON, &message).await;
        });
    }

    /// Awaited: the process may exit right after `on_stopped_leading`.
    async fn record_stopped_leading(&self, termination: Termination) {
        let mut budget = STOP_EVENT_TIMEOUT;
        if termination == Termination::LeadershipLost {
            budget = budget.min(self.until_stop_deadline());
        }
        let message = format!("{} stopped leading", self.identity);
        if timeout(budget, self.recorder.record(LEADER_ELECTION_REASON, &message))
            .await
            .is_err()
        {
            warn!(?budget, "gave up posting the stopped leading event");
        }
    }

    fn jittered_retry(&self) -> Duration {
        let extra = self.config.jitter_factor - 1.0;
        if extra <= 0.0 {
            return self.config.retry_period;
        }
        let factor = 1.0 + rand::thread_rng().gen::<f64>() * extra;
        self.config.retry_period.mul_f64(factor)
    }

    fn set_state(&self, next: ElectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(identity = %self.identity, state = %next, "election state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::MemoryLock;

    fn elector(jitter_factor: f64) -> LeaderElector {
        let config = ElectionConfig {
            jitter_factor,
            ..ElectionConfig::default()
        };
        LeaderElector::new(
            ProcessIdentity::from_value(Some("pod-a".into())).unwrap(),
            config,
            Arc::new(MemoryLock::new("test")),
        )
        .unwrap()
    }

    #[test]
    fn jitter_stays_within_factor() {
        let elector = elector(1.2);
        for _ in 0..100 {
            let wait = elector.jittered_retry();
            assert!(wait >= Duration::from_secs(30));
            assert!(wait <= Duration::from_secs(36));
        }
    }

    #[test]
    fn no_jitter_uses_retry_period() {
        assert_eq!(elector(1.0).jittered_retry(), Duration::from_secs(30));
    }

    #[test]
    fn invalid_timings_are_rejected() {
        let config = ElectionConfig {
            renew_deadline: Duration::from_secs(120),
            ..ElectionConfig::default()
        };
        let result = LeaderElector::new(
            ProcessIdentity::from_value(Some("pod-a".into())).unwrap(),
            config,
            Arc::new(MemoryLock::new("test")),
        );
        assert!(matches!(result, Err(ElectionError::Config(_))));
    }

    #[test]
    fn starts_idle() {
        let elector = elector(1.2);
        assert_eq!(elector.state(), ElectionState::Idle);
        assert!(!elector.is_leader());
    }
}
