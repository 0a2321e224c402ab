//! ---
//! cvo_section: "07-resilience-fault-tolerance"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Lease-based leader election."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
//! Singleton activation for operator replicas.
//!
//! Replicas contend for a single lease record held in a coordination store.
//! The holder runs the control loop; everybody else waits. A holder that
//! cannot renew within its deadline stops the control loop and terminates,
//! so at most one replica drives the cluster at a time.

pub mod callbacks;
pub mod clock;
pub mod elector;
pub mod error;
pub mod events;
pub mod lock;
pub mod record;
pub mod signal;
pub mod state;

pub use callbacks::LeaderCallbacks;
pub use clock::{Clock, MonotonicClock};
pub use elector::LeaderElector;
pub use error::{BoxError, ElectionError, LockError};
pub use events::{EventRecorder, KubeEventRecorder, TracingRecorder, LEADER_ELECTION_REASON};
pub use lock::{ConfigMapLock, LockResource, MemoryLock, LEADER_ANNOTATION};
pub use record::{LeaseRecord, LockVersion};
pub use signal::{stop_channel, StopHandle, StopSignal};
pub use state::{AttemptOutcome, ElectionState, Termination};
