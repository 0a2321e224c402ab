//! ---
//! cvo_section: "01-core-functionality"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Operator lifecycle and control-loop boundary."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use async_trait::async_trait;
use cvo_election::StopSignal;
use cvo_kube::ClientConfig;
use tracing::info;

use crate::graph::UpdateGraphClient;

/// Entry point of the reconciliation loop run by the elected replica.
#[async_trait]
pub trait Workers: Send + Sync + 'static {
    /// Runs until `stop` fires, then releases everything it holds and
    /// returns. May also return early, which ends this replica's leadership.
    async fn start_workers(&self, stop: StopSignal, client: ClientConfig, graph: UpdateGraphClient);
}

/// Holds leadership without reconciling anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleWorkers;

#[async_trait]
impl Workers for IdleWorkers {
    async fn start_workers(&self, stop: StopSignal, client: ClientConfig, graph: UpdateGraphClient) {
        info!(server = %client.server, cluster_id = %graph.cluster_id(), "no control loop linked in; idling while leader");
        stop.stopped().await;
    }
}
