//! ---
//! cvo_section: "07-resilience-fault-tolerance"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Lease-based leader election."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The shared lease. Lives in the coordination store; replicas only ever hold
/// a possibly-stale copy plus the [`LockVersion`] it was read at.
///
/// The timestamps are informational. Whether the lease expired is decided by
/// each reader from when it saw the record change, never by comparing
/// `renew_time` with its own clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
    /// Empty when nobody holds the lease.
    #[serde(default)]
    pub holder_identity: String,
    pub lease_duration_seconds: u64,
    #[serde(default)]
    pub acquire_time: DateTime<Utc>,
    #[serde(default)]
    pub renew_time: DateTime<Utc>,
    #[serde(default)]
    pub leader_transitions: u64,
}

impl LeaseRecord {
    /// A fresh claim by `holder` at `now`.
    pub fn claim(holder: &str, lease_duration_seconds: u64, now: DateTime<Utc>) -> Self {
        Self {
            holder_identity: holder.to_owned(),
            lease_duration_seconds,
            acquire_time: now,
            renew_time: now,
            leader_transitions: 0,
        }
    }

    /// Record with no holder, as found on a lock object that carries no lease yet.
    pub fn vacant() -> Self {
        Self {
            holder_identity: String::new(),
            lease_duration_seconds: 0,
            acquire_time: DateTime::<Utc>::default(),
            renew_time: DateTime::<Utc>::default(),
            leader_transitions: 0,
        }
    }

    pub fn is_vacant(&self) -> bool {
        self.holder_identity.is_empty()
    }

    pub fn is_held_by(&self, identity: &str) -> bool {
        !self.is_vacant() && self.holder_identity == identity
    }
}

/// Opaque token assigned by the store on every write; the expected value for
/// the next compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockVersion(String);

impl LockVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::default() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn vacant_record_is_unheld() {
        let record = LeaseRecord::vacant();
        assert!(record.is_vacant());
        assert!(!record.is_held_by(""));
        assert!(LeaseRecord::claim("a", 90, at(1_000)).is_held_by("a"));
    }

    #[test]
    fn missing_fields_default() {
        let record: LeaseRecord =
            serde_json::from_str(r#"{"holderIdentity":"pod-a","leaseDurationSeconds":90}"#).unwrap();
        assert_eq!(record.leader_transitions, 0);
        assert_eq!(record.renew_time, DateTime::<Utc>::default());
    }

    #[test]
    fn wire_format_uses_camel_case() {
        let record = LeaseRecord::claim("pod-a", 90, at(0));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["holderIdentity"], "pod-a");
        assert_eq!(json["leaseDurationSeconds"], 90);
        assert_eq!(json["leaderTransitions"], 0);
        assert!(json["renewTime"].as_str().unwrap().starts_with("1970-01-01T00:00:00"));
    }
}
