//! ---
//! cvo_section: "01-core-functionality"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Operator lifecycle and control-loop boundary."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
//! Startup sequence: cluster id, replica identity, client configuration, then
//! the lock. Each step is a precondition for the next; nothing touches the
//! coordination store until all of them passed.
use std::path::Path;
use std::sync::Arc;

use cvo_common::{
    ClientSettings, ClusterId, ElectionConfig, IdentityError, LockConfig, ProcessIdentity,
    COMPONENT_NAME, LOCK_NAMESPACE,
};
use cvo_election::{
    ConfigMapLock, ElectionError, EventRecorder, KubeEventRecorder, LeaderElector, LockResource,
    MonotonicClock, StopSignal, Termination, TracingRecorder,
};
use cvo_kube::{load_client_config, ClientConfig, KubeClient, KubeError};
use thiserror::Error;
use tracing::info;

use crate::exit::ExitHandler;
use crate::graph::UpdateGraphClient;
use crate::lifecycle::OperatorLifecycle;
use crate::workers::Workers;

/// Suffix appended to the user agent of the client that manages the lock.
pub const LEADER_ELECTION_USER_AGENT: &str = "leader-election";

/// Fatal startup conditions. The process exits without retrying.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid cluster id: {0}")]
    ClusterId(#[source] IdentityError),
    #[error("invalid replica identity: {0}")]
    Identity(#[source] IdentityError),
    #[error("failed to load config for the cluster API client: {0}")]
    ClientConfig(#[source] KubeError),
    #[error("failed to create leader-election client: {0}")]
    LockClient(#[source] KubeError),
    #[error(transparent)]
    Election(#[from] ElectionError),
}

/// Validated process inputs.
#[derive(Debug, Clone)]
pub struct Startup {
    pub cluster_id: ClusterId,
    pub identity: ProcessIdentity,
    pub client: ClientConfig,
}

impl Startup {
    pub fn prepare(
        raw_cluster_id: &str,
        pod_name: Option<String>,
        kubeconfig: Option<&Path>,
        settings: &ClientSettings,
    ) -> Result<Self, StartupError> {
        let cluster_id = ClusterId::parse(raw_cluster_id).map_err(StartupError::ClusterId)?;
        let identity = ProcessIdentity::from_value(pod_name).map_err(StartupError::Identity)?;
        let client = load_client_config(kubeconfig)
            .map_err(StartupError::ClientConfig)?
            .with_timeout(settings.request_timeout);
        info!(%cluster_id, %identity, server = %client.server, "startup inputs validated");
        Ok(Self {
            cluster_id,
            identity,
            client,
        })
    }

    /// The ConfigMap lock and its event recorder, on a dedicated client.
    pub fn config_map_lock(
        &self,
        lock: &LockConfig,
    ) -> Result<(Arc<dyn LockResource>, Arc<dyn EventRecorder>), StartupError> {
        let client = KubeClient::new(&self.client.with_user_agent(LEADER_ELECTION_USER_AGENT))
            .map_err(StartupError::LockClient)?;
        let recorder: Arc<dyn EventRecorder> = if lock.emit_events {
            Arc::new(KubeEventRecorder::for_config_map(
                client.clone(),
                LOCK_NAMESPACE,
                COMPONENT_NAME,
                COMPONENT_NAME,
                Arc::new(MonotonicClock::new()),
            ))
        } else {
            Arc::new(TracingRecorder::new(format!("{LOCK_NAMESPACE}/{COMPONENT_NAME}")))
        };
        let resource: Arc<dyn LockResource> =
            Arc::new(ConfigMapLock::new(client, LOCK_NAMESPACE, COMPONENT_NAME));
        Ok((resource, recorder))
    }

    pub fn lifecycle<W: Workers>(
        &self,
        workers: Arc<W>,
        exit: Arc<dyn ExitHandler>,
    ) -> OperatorLifecycle<W> {
        OperatorLifecycle::new(
            workers,
            self.client.clone(),
            UpdateGraphClient::new(self.cluster_id),
            exit,
        )
    }

    /// Contend for the lease and drive `workers` while leading.
    pub async fn run<W: Workers>(
        &self,
        election: &ElectionConfig,
        lock: Arc<dyn LockResource>,
        recorder: Arc<dyn EventRecorder>,
        workers: Arc<W>,
        exit: Arc<dyn ExitHandler>,
        stop: StopSignal,
    ) -> Result<Termination, StartupError> {
        let elector = LeaderElector::new(self.identity.clone(), election.clone(), lock)?
            .with_recorder(recorder);
        let callbacks = Arc::new(self.lifecycle(workers, exit));
        Ok(elector.run(callbacks, stop).await)
    }
}
