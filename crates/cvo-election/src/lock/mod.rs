//! ---
//! cvo_section: "07-resilience-fault-tolerance"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Lease-based leader election."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
//! Lock resources: one named record in a store offering atomic
//! compare-and-set. Swapping the store never touches the election engine.

mod configmap;
mod memory;

use async_trait::async_trait;

use crate::error::LockError;
use crate::record::{LeaseRecord, LockVersion};

pub use configmap::{ConfigMapLock, LEADER_ANNOTATION};
pub use memory::MemoryLock;

/// Each operation is a single atomic store request.
#[async_trait]
pub trait LockResource: Send + Sync {
    /// Current record and the version it was read at. `LockError::NotFound`
    /// when the record does not exist yet.
    async fn get(&self) -> Result<(LeaseRecord, LockVersion), LockError>;

    /// Create the record. `LockError::AlreadyExists` when another replica won.
    async fn create(&self, record: &LeaseRecord) -> Result<LockVersion, LockError>;

    /// Replace the record if it is still at `expected`, else `LockError::Conflict`.
    async fn update(
        &self,
        record: &LeaseRecord,
        expected: &LockVersion,
    ) -> Result<LockVersion, LockError>;

    /// Human readable location, e.g. `kube-system/cluster-version-operator`.
    fn describe(&self) -> String;
}
