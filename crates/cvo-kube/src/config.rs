//! ---
//! cvo_section: "05-networking-external-interfaces"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Cluster API client and credential loading."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
//! Client capability loading.
//!
//! A [`ClientConfig`] is built either from an explicit kubeconfig file (meant
//! for out-of-cluster testing, not production topologies) or from the service
//! account credentials mounted into every pod. Loading only touches the local
//! filesystem; no request is made until a [`crate::KubeClient`] is used.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::{KubeError, Result};

/// Directory holding the mounted service account credentials.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";
const DEFAULT_USER_AGENT: &str = concat!("cluster-version-operator/v", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials presented to the cluster API.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
    ClientCertificate { cert_pem: Vec<u8>, key_pem: Vec<u8> },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Auth::ClientCertificate { .. } => f.write_str("ClientCertificate(<redacted>)"),
        }
    }
}

/// Everything needed to talk to the cluster API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: Url,
    pub root_ca_pem: Option<Vec<u8>>,
    pub insecure_skip_tls_verify: bool,
    pub auth: Auth,
    pub user_agent: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(server: Url, auth: Auth) -> Self {
        Self {
            server,
            root_ca_pem: None,
            insecure_skip_tls_verify: false,
            auth,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Copy of this configuration with `/<suffix>` appended to the user agent.
    #[must_use]
    pub fn with_user_agent(&self, suffix: &str) -> Self {
        let mut config = self.clone();
        config.user_agent = format!("{}/{}", self.user_agent, suffix);
        config
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from the kubeconfig at `path`, using its current context.
    pub fn from_kubeconfig(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| KubeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let kubeconfig: Kubeconfig =
            serde_yaml::from_str(&contents).map_err(|source| KubeError::KubeconfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        kubeconfig.into_client_config(base_dir)
    }

    /// Build from the service account mounted into the pod.
    pub fn in_cluster() -> Result<Self> {
        Self::in_cluster_from(
            std::env::var(SERVICE_HOST_ENV).ok(),
            std::env::var(SERVICE_PORT_ENV).ok(),
            Path::new(SERVICE_ACCOUNT_DIR),
        )
    }

    /// In-cluster loading with the environment lookups and credential
    /// directory supplied by the caller.
    pub fn in_cluster_from(
        host: Option<String>,
        port: Option<String>,
        service_account_dir: &Path,
    ) -> Result<Self> {
        let (host, port) = match (host, port) {
            (Some(host), Some(port)) if !host.is_empty() && !port.is_empty() => (host, port),
            _ => {
                return Err(KubeError::NotInCluster(format!(
                    "{SERVICE_HOST_ENV} and {SERVICE_PORT_ENV} must be defined"
                )))
            }
        };
        let authority = if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        let raw = format!("https://{authority}");
        let server = Url::parse(&raw).map_err(|source| KubeError::InvalidUrl { url: raw, source })?;

        let token_path = service_account_dir.join("token");
        let token = read_file(&token_path)?;
        let token = String::from_utf8_lossy(&token).trim().to_owned();

        let mut config = Self::new(server, Auth::Bearer(token));
        let ca_path = service_account_dir.join("ca.crt");
        match fs::read(&ca_path) {
            Ok(ca) => config.root_ca_pem = Some(ca),
            Err(err) => {
                warn!(path = %ca_path.display(), error = %err, "expected to load root CA config, continuing without it")
            }
        }
        Ok(config)
    }
}

/// Load the client configuration: an explicit kubeconfig when `kubeconfig`
/// is a non-empty path, otherwise the in-cluster service account.
pub fn load_client_config(kubeconfig: Option<&Path>) -> Result<ClientConfig> {
    match kubeconfig.filter(|path| !path.as_os_str().is_empty()) {
        Some(path) => {
            debug!(path = %path.display(), "loading kube client config from path");
            ClientConfig::from_kubeconfig(path)
        }
        None => {
            debug!("using in-cluster kube client config");
            ClientConfig::in_cluster()
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| KubeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn decode(field: &'static str, data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(data.trim())
        .map_err(|source| KubeError::Base64 { field, source })
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Inline `*-data` wins over the file reference, as in kubectl.
fn inline_or_file(
    base_dir: &Path,
    field: &'static str,
    data: Option<&str>,
    file: Option<&Path>,
) -> Result<Option<Vec<u8>>> {
    if let Some(data) = data {
        return decode(field, data).map(Some);
    }
    file.map(|file| read_file(&resolve(base_dir, file))).transpose()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    #[serde(default)]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry {
    server: String,
    #[serde(default)]
    certificate_authority: Option<PathBuf>,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextEntry,
}

#[derive(Debug, Deserialize)]
struct ContextEntry {
    cluster: String,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: UserEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UserEntry {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "tokenFile")]
    token_file: Option<PathBuf>,
    #[serde(default)]
    client_certificate: Option<PathBuf>,
    #[serde(default)]
    client_certificate_data: Option<String>,
    #[serde(default)]
    client_key: Option<PathBuf>,
    #[serde(default)]
    client_key_data: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl Kubeconfig {
    fn into_client_config(self, base_dir: &Path) -> Result<ClientConfig> {
        let context_name = match (&self.current_context, self.contexts.as_slice()) {
            (Some(name), _) if !name.is_empty() => name.clone(),
            (_, [only]) => only.name.clone(),
            _ => {
                return Err(KubeError::InvalidKubeconfig(
                    "no current-context is set".into(),
                ))
            }
        };
        let context = self
            .contexts
            .iter()
            .find(|ctx| ctx.name == context_name)
            .map(|ctx| &ctx.context)
            .ok_or_else(|| {
                KubeError::InvalidKubeconfig(format!("context {context_name:?} not found"))
            })?;
        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| {
                KubeError::InvalidKubeconfig(format!("cluster {:?} not found", context.cluster))
            })?;
        let user = match &context.user {
            Some(name) => Some(
                self.users
                    .iter()
                    .find(|u| &u.name == name)
                    .map(|u| &u.user)
                    .ok_or_else(|| {
                        KubeError::InvalidKubeconfig(format!("user {name:?} not found"))
                    })?,
            ),
            None => None,
        };

        let server = Url::parse(&cluster.server).map_err(|source| KubeError::InvalidUrl {
            url: cluster.server.clone(),
            source,
        })?;
        let auth = match user {
            Some(user) => user.auth(base_dir)?,
            None => Auth::None,
        };

        let mut config = ClientConfig::new(server, auth);
        config.insecure_skip_tls_verify = cluster.insecure_skip_tls_verify;
        config.root_ca_pem = inline_or_file(
            base_dir,
            "certificate-authority-data",
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
        )?;
        Ok(config)
    }
}

impl UserEntry {
    fn auth(&self, base_dir: &Path) -> Result<Auth> {
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(Auth::Bearer(token.to_owned()));
        }
        if let Some(file) = &self.token_file {
            let token = read_file(&resolve(base_dir, file))?;
            return Ok(Auth::Bearer(String::from_utf8_lossy(&token).trim().to_owned()));
        }
        let cert = inline_or_file(
            base_dir,
            "client-certificate-data",
            self.client_certificate_data.as_deref(),
            self.client_certificate.as_deref(),
        )?;
        let key = inline_or_file(
            base_dir,
            "client-key-data",
            self.client_key_data.as_deref(),
            self.client_key.as_deref(),
        )?;
        match (cert, key) {
            (Some(cert_pem), Some(key_pem)) => {
                return Ok(Auth::ClientCertificate { cert_pem, key_pem })
            }
            (None, None) => {}
            _ => {
                return Err(KubeError::InvalidKubeconfig(
                    "client certificate and key must be provided together".into(),
                ))
            }
        }
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            return Ok(Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            });
        }
        Ok(Auth::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_suffix_is_appended() {
        let config = ClientConfig::new(Url::parse("https://10.0.0.1:443").unwrap(), Auth::None);
        let derived = config.with_user_agent("leader-election");
        assert!(derived.user_agent.starts_with("cluster-version-operator/v"));
        assert!(derived.user_agent.ends_with("/leader-election"));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let rendered = format!("{:?}", Auth::Bearer("s3cr3t".into()));
        assert!(!rendered.contains("s3cr3t"));
    }

    #[test]
    fn single_context_is_used_without_current_context() {
        let kubeconfig: Kubeconfig = serde_yaml::from_str(
            r#"
clusters:
- name: dev
  cluster:
    server: https://dev.example:6443
contexts:
- name: only
  context:
    cluster: dev
"#,
        )
        .unwrap();
        let config = kubeconfig.into_client_config(Path::new(".")).unwrap();
        assert_eq!(config.server.host_str(), Some("dev.example"));
        assert_eq!(config.auth, Auth::None);
    }
}
