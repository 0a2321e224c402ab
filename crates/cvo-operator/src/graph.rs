//! ---
//! cvo_section: "01-core-functionality"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Operator lifecycle and control-loop boundary."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use cvo_common::ClusterId;

/// Handle for the update-graph service, parametrized by the cluster it
/// resolves versions for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateGraphClient {
    cluster_id: ClusterId,
}

impl UpdateGraphClient {
    pub fn new(cluster_id: ClusterId) -> Self {
        Self { cluster_id }
    }

    pub fn cluster_id(&self) -> ClusterId {
        self.cluster_id
    }
}
