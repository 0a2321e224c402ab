//! ---
//! cvo_section: "05-networking-external-interfaces"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Cluster API client and credential loading."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KubeError>;

#[derive(Debug, Error)]
pub enum KubeError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid kubeconfig {path}: {source}")]
    KubeconfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid kubeconfig: {0}")]
    InvalidKubeconfig(String),
    #[error("unable to load in-cluster configuration: {0}")]
    NotInCluster(String),
    #[error("invalid server url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid base64 in {field}: {source}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },
    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {url} returned {status} ({reason}): {message}")]
    Api {
        method: String,
        url: String,
        status: u16,
        reason: String,
        message: String,
    },
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl KubeError {
    /// HTTP status of an API error response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            KubeError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// 409: `AlreadyExists` on create, `Conflict` on a stale `resourceVersion`.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    /// Network-level failures and server-side errors worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            KubeError::Timeout { .. } | KubeError::Transport { .. } => true,
            KubeError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
