//! ---
//! cvo_section: "07-resilience-fault-tolerance"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Lease-based leader election."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use cvo_common::ConfigError;
use cvo_kube::KubeError;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures of a single operation against the lock record.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {0} not found")]
    NotFound(String),
    #[error("lock {0} already exists")]
    AlreadyExists(String),
    #[error("lock {0} was modified by another writer")]
    Conflict(String),
    #[error("lock {lock} holds a malformed record: {reason}")]
    Malformed { lock: String, reason: String },
    #[error("lock {0} operation timed out")]
    Timeout(String),
    #[error("coordination store error on lock {lock}: {source}")]
    Store {
        lock: String,
        #[source]
        source: BoxError,
    },
}

impl LockError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, LockError::Conflict(_) | LockError::AlreadyExists(_))
    }

    /// Whether retrying the same operation can succeed without someone
    /// repairing the record first. Either way the engine keeps retrying.
    pub fn is_transient(&self) -> bool {
        !matches!(self, LockError::Malformed { .. })
    }

    pub(crate) fn from_kube(lock: &str, err: KubeError, on_conflict: fn(String) -> LockError) -> Self {
        if err.is_not_found() {
            LockError::NotFound(lock.to_owned())
        } else if err.is_conflict() {
            on_conflict(lock.to_owned())
        } else if matches!(err, KubeError::Timeout { .. }) {
            LockError::Timeout(lock.to_owned())
        } else {
            LockError::Store {
                lock: lock.to_owned(),
                source: Box::new(err),
            }
        }
    }
}

/// Rejected elector construction.
#[derive(Debug, Error)]
pub enum ElectionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}
