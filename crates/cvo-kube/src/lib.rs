//! ---
//! cvo_section: "05-networking-external-interfaces"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Cluster API client and credential loading."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
//! Client capability for the cluster API: credential loading plus the small
//! set of typed calls the operator needs (ConfigMaps and Events).

pub mod client;
pub mod config;
pub mod error;
pub mod resources;

pub use client::KubeClient;
pub use config::{load_client_config, Auth, ClientConfig, SERVICE_ACCOUNT_DIR};
pub use error::{KubeError, Result};
pub use resources::{ConfigMap, Event, EventSource, ObjectMeta, ObjectReference};
