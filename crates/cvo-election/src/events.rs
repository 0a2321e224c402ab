//! ---
//! cvo_section: "07-resilience-fault-tolerance"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Lease-based leader election."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
//! Leadership transition annotations. Purely observational: failures are
//! logged and never reach the election protocol.
use std::sync::Arc;

use async_trait::async_trait;
use cvo_kube::{Event, KubeClient, ObjectReference};
use tracing::{info, warn};

use crate::clock::Clock;

/// Reason attached to every leadership event.
pub const LEADER_ELECTION_REASON: &str = "LeaderElection";

#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, reason: &str, message: &str);
}

/// Emits transitions as log lines only.
#[derive(Debug, Clone)]
pub struct TracingRecorder {
    lock: String,
}

impl TracingRecorder {
    pub fn new(lock: impl Into<String>) -> Self {
        Self { lock: lock.into() }
    }
}

#[async_trait]
impl EventRecorder for TracingRecorder {
    async fn record(&self, reason: &str, message: &str) {
        info!(lock = %self.lock, reason, "{message}");
    }
}

/// Also publishes a core/v1 Event against the lock object.
#[derive(Debug, Clone)]
pub struct KubeEventRecorder {
    client: KubeClient,
    object: ObjectReference,
    component: String,
    clock: Arc<dyn Clock>,
}

impl KubeEventRecorder {
    pub fn for_config_map(
        client: KubeClient,
        namespace: &str,
        name: &str,
        component: &str,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            object: ObjectReference {
                api_version: "v1".into(),
                kind: "ConfigMap".into(),
                namespace: namespace.to_owned(),
                name: name.to_owned(),
                uid: None,
                resource_version: None,
            },
            component: component.to_owned(),
            clock,
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(&self, reason: &str, message: &str) {
        info!(lock = %format!("{}/{}", self.object.namespace, self.object.name), reason, "{message}");
        let event = Event::normal(
            self.object.clone(),
            &self.component,
            reason,
            message,
            self.clock.now(),
        );
        if let Err(err) = self.client.create_event(&self.object.namespace, &event).await {
            warn!(error = %err, reason, "failed to publish leader election event");
        }
    }
}
