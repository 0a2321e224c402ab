//! ---
//! cvo_section: "07-resilience-fault-tolerance"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Lease-based leader election."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use super::LockResource;
use crate::error::LockError;
use crate::record::{LeaseRecord, LockVersion};

#[derive(Debug, Default)]
struct Slot {
    record: Option<LeaseRecord>,
    version: u64,
}

/// Process-local lock record with store-style compare-and-set.
///
/// Handles created through [`MemoryLock::handle`] share the record but each
/// has its own connectivity switch and write counter, so one handle per
/// replica models independent clients of one store.
#[derive(Debug)]
pub struct MemoryLock {
    name: String,
    slot: Arc<Mutex<Slot>>,
    partitioned: AtomicBool,
    write_attempts: AtomicU64,
}

impl MemoryLock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot: Arc::default(),
            partitioned: AtomicBool::new(false),
            write_attempts: AtomicU64::new(0),
        }
    }

    /// Another client of the same record.
    pub fn handle(&self) -> Self {
        Self {
            name: self.name.clone(),
            slot: Arc::clone(&self.slot),
            partitioned: AtomicBool::new(false),
            write_attempts: AtomicU64::new(0),
        }
    }

    /// Cut (or restore) this handle's connectivity; every call fails while cut.
    pub fn set_partitioned(&self, partitioned: bool) {
        self.partitioned.store(partitioned, Ordering::SeqCst);
    }

    /// Number of create/update calls issued through this handle.
    pub fn write_attempts(&self) -> u64 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Current record regardless of connectivity.
    pub fn snapshot(&self) -> Option<(LeaseRecord, LockVersion)> {
        let slot = self.slot.lock();
        slot.record
            .clone()
            .map(|record| (record, version_token(slot.version)))
    }

    /// Overwrite the record unconditionally.
    pub fn seed(&self, record: LeaseRecord) -> LockVersion {
        let mut slot = self.slot.lock();
        slot.version += 1;
        slot.record = Some(record);
        version_token(slot.version)
    }

    fn reachable(&self) -> Result<(), LockError> {
        if self.partitioned.load(Ordering::SeqCst) {
            return Err(LockError::Store {
                lock: self.name.clone(),
                source: "coordination store unreachable".into(),
            });
        }
        Ok(())
    }
}

fn version_token(version: u64) -> LockVersion {
    LockVersion::new(version.to_string())
}

#[async_trait]
impl LockResource for MemoryLock {
    async fn get(&self) -> Result<(LeaseRecord, LockVersion), LockError> {
        self.reachable()?;
        self.snapshot()
            .ok_or_else(|| LockError::NotFound(self.name.clone()))
    }

    async fn create(&self, record: &LeaseRecord) -> Result<LockVersion, LockError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        self.reachable()?;
        let mut slot = self.slot.lock();
        if slot.record.is_some() {
            return Err(LockError::AlreadyExists(self.name.clone()));
        }
        slot.version += 1;
        slot.record = Some(record.clone());
        trace!(lock = %self.name, version = slot.version, holder = %record.holder_identity, "record created");
        Ok(version_token(slot.version))
    }

    async fn update(
        &self,
        record: &LeaseRecord,
        expected: &LockVersion,
    ) -> Result<LockVersion, LockError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        self.reachable()?;
        let mut slot = self.slot.lock();
        if slot.record.is_none() {
            return Err(LockError::NotFound(self.name.clone()));
        }
        if version_token(slot.version) != *expected {
            return Err(LockError::Conflict(self.name.clone()));
        }
        slot.version += 1;
        slot.record = Some(record.clone());
        trace!(lock = %self.name, version = slot.version, holder = %record.holder_identity, "record updated");
        Ok(version_token(slot.version))
    }

    fn describe(&self) -> String {
        format!("memory/{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn compare_and_set_rejects_stale_version() {
        let lock = MemoryLock::new("test");
        let other = lock.handle();
        let record = LeaseRecord::claim("a", 90, Utc::now());

        let v1 = lock.create(&record).await.unwrap();
        assert!(matches!(
            other.create(&record).await,
            Err(LockError::AlreadyExists(_))
        ));

        let v2 = other.update(&record, &v1).await.unwrap();
        assert_eq!(v2.as_str(), "2");
        assert!(matches!(
            lock.update(&record, &v1).await,
            Err(LockError::Conflict(_))
        ));
        assert_eq!(lock.write_attempts(), 2);
        assert_eq!(other.write_attempts(), 2);
    }

    #[tokio::test]
    async fn partition_is_per_handle() {
        let lock = MemoryLock::new("test");
        let other = lock.handle();
        lock.seed(LeaseRecord::vacant());

        lock.set_partitioned(true);
        assert!(matches!(lock.get().await, Err(LockError::Store { .. })));
        assert!(other.get().await.is_ok());
    }
}
