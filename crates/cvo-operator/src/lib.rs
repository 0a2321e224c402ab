//! ---
//! cvo_section: "01-core-functionality"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Operator lifecycle and control-loop boundary."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
//! Glue between leader election and the cluster version operator's control
//! loop: validated startup inputs, the `Workers` boundary, and the callbacks
//! that start the loop on election and exit the process afterwards.

pub mod exit;
pub mod graph;
pub mod lifecycle;
pub mod startup;
pub mod workers;

pub use exit::{ExitHandler, ProcessExit, RecordedExit};
pub use graph::UpdateGraphClient;
pub use lifecycle::{OperatorLifecycle, STOPPED_LEADING_EXIT_CODE};
pub use startup::{Startup, StartupError, LEADER_ELECTION_USER_AGENT};
pub use workers::{IdleWorkers, Workers};
