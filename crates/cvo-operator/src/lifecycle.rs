//! ---
//! cvo_section: "01-core-functionality"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Operator lifecycle and control-loop boundary."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use std::sync::Arc;

use async_trait::async_trait;
use cvo_election::{LeaderCallbacks, StopSignal};
use cvo_kube::ClientConfig;
use tracing::info;

use crate::exit::ExitHandler;
use crate::graph::UpdateGraphClient;
use crate::workers::Workers;

/// Exit code after leadership ends. Restarting the process is the recovery
/// path, so this is not a failure.
pub const STOPPED_LEADING_EXIT_CODE: i32 = 0;

/// Hands the control loop to the elected replica and terminates the process
/// once it stops leading.
#[derive(Debug)]
pub struct OperatorLifecycle<W> {
    workers: Arc<W>,
    client: ClientConfig,
    graph: UpdateGraphClient,
    exit: Arc<dyn ExitHandler>,
}

impl<W: Workers> OperatorLifecycle<W> {
    pub fn new(
        workers: Arc<W>,
        client: ClientConfig,
        graph: UpdateGraphClient,
        exit: Arc<dyn ExitHandler>,
    ) -> Self {
        Self {
            workers,
            client,
            graph,
            exit,
        }
    }
}

#[async_trait]
impl<W: Workers> LeaderCallbacks for OperatorLifecycle<W> {
    async fn on_started_leading(&self, stop: StopSignal) {
        info!(cluster_id = %self.graph.cluster_id(), "started leading, starting workers");
        self.workers
            .start_workers(stop, self.client.clone(), self.graph.clone())
            .await;
    }

    async fn on_stopped_leading(&self) {
        info!("stopped leadership, exiting");
        self.exit.exit(STOPPED_LEADING_EXIT_CODE);
    }

    fn on_new_leader(&self, identity: &str) {
        info!(leader = %identity, "another replica is leading");
    }
}
