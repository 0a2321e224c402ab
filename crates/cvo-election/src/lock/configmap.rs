//! ---
//! cvo_section: "07-resilience-fault-tolerance"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Lease-based leader election."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use async_trait::async_trait;
use cvo_kube::{ConfigMap, KubeClient, ObjectMeta};
use parking_lot::Mutex;
use tracing::debug;

use super::LockResource;
use crate::error::LockError;
use crate::record::{LeaseRecord, LockVersion};

/// Annotation carrying the JSON-encoded [`LeaseRecord`].
pub const LEADER_ANNOTATION: &str = "control-plane.alpha.kubernetes.io/leader";

/// Lock stored as an annotation on a ConfigMap; the object's
/// `resourceVersion` is the compare-and-set token.
#[derive(Debug)]
pub struct ConfigMapLock {
    client: KubeClient,
    namespace: String,
    name: String,
    // last object seen, so a replace keeps data and labels written by others
    cached: Mutex<Option<ConfigMap>>,
}

impl ConfigMapLock {
    pub fn new(client: KubeClient, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            name: name.into(),
            cached: Mutex::new(None),
        }
    }

    fn encode(&self, record: &LeaseRecord) -> Result<String, LockError> {
        serde_json::to_string(record).map_err(|err| LockError::Malformed {
            lock: self.describe(),
            reason: err.to_string(),
        })
    }

    fn decode(&self, config_map: &ConfigMap) -> Result<LeaseRecord, LockError> {
        match config_map.metadata.annotations.get(LEADER_ANNOTATION) {
            Some(raw) => serde_json::from_str(raw).map_err(|err| LockError::Malformed {
                lock: self.describe(),
                reason: err.to_string(),
            }),
            None => Ok(LeaseRecord::vacant()),
        }
    }

    fn version_of(&self, config_map: &ConfigMap) -> Result<LockVersion, LockError> {
        config_map
            .metadata
            .resource_version
            .as_deref()
            .filter(|rv| !rv.is_empty())
            .map(LockVersion::new)
            .ok_or_else(|| LockError::Malformed {
                lock: self.describe(),
                reason: "object has no resourceVersion".into(),
            })
    }
}

#[async_trait]
impl LockResource for ConfigMapLock {
    async fn get(&self) -> Result<(LeaseRecord, LockVersion), LockError> {
        let config_map = self
            .client
            .get_config_map(&self.namespace, &self.name)
            .await
            .map_err(|err| LockError::from_kube(&self.describe(), err, LockError::Conflict))?;
        let record = self.decode(&config_map)?;
        let version = self.version_of(&config_map)?;
        *self.cached.lock() = Some(config_map);
        Ok((record, version))
    }

    async fn create(&self, record: &LeaseRecord) -> Result<LockVersion, LockError> {
        let mut config_map = ConfigMap::new(ObjectMeta::named(&self.namespace, &self.name));
        config_map
            .metadata
            .annotations
            .insert(LEADER_ANNOTATION.to_owned(), self.encode(record)?);
        let created = self
            .client
            .create_config_map(&self.namespace, &config_map)
            .await
            .map_err(|err| LockError::from_kube(&self.describe(), err, LockError::AlreadyExists))?;
        let version = self.version_of(&created)?;
        debug!(lock = %self.describe(), %version, "lock object created");
        *self.cached.lock() = Some(created);
        Ok(version)
    }

    async fn update(
        &self,
        record: &LeaseRecord,
        expected: &LockVersion,
    ) -> Result<LockVersion, LockError> {
        let mut config_map = self
            .cached
            .lock()
            .clone()
            .unwrap_or_else(|| ConfigMap::new(ObjectMeta::named(&self.namespace, &self.name)));
        config_map.metadata.resource_version = Some(expected.as_str().to_owned());
        config_map
            .metadata
            .annotations
            .insert(LEADER_ANNOTATION.to_owned(), self.encode(record)?);
        let replaced = self
            .client
            .replace_config_map(&self.namespace, &config_map)
            .await
            .map_err(|err| LockError::from_kube(&self.describe(), err, LockError::Conflict))?;
        let version = self.version_of(&replaced)?;
        *self.cached.lock() = Some(replaced);
        Ok(version)
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}
