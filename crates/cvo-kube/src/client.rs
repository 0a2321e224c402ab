//! ---
//! cvo_section: "05-networking-external-interfaces"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Cluster API client and credential loading."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use reqwest::{Certificate, Identity, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};
use url::Url;

use crate::config::{Auth, ClientConfig};
use crate::error::{KubeError, Result};
use crate::resources::{ConfigMap, Event, Status};

/// Thin typed client over the cluster REST API.
///
/// Every call is a single request bounded by the configured timeout; retries
/// are the caller's business.
#[derive(Debug, Clone)]
pub struct KubeClient {
    http: reqwest::Client,
    base: Url,
    auth: Auth,
}

impl KubeClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify);
        if let Some(ca) = &config.root_ca_pem {
            let certificate = Certificate::from_pem(ca).map_err(KubeError::ClientBuild)?;
            builder = builder.add_root_certificate(certificate);
        }
        if let Auth::ClientCertificate { cert_pem, key_pem } = &config.auth {
            let mut pem = key_pem.clone();
            pem.push(b'\n');
            pem.extend_from_slice(cert_pem);
            let identity = Identity::from_pem(&pem).map_err(KubeError::ClientBuild)?;
            builder = builder.identity(identity);
        }
        let http = builder.build().map_err(KubeError::ClientBuild)?;
        Ok(Self {
            http,
            base: config.server.clone(),
            auth: config.auth.clone(),
        })
    }

    pub fn server(&self) -> &Url {
        &self.base
    }

    pub async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap> {
        let path = format!("/api/v1/namespaces/{namespace}/configmaps/{name}");
        self.send::<(), _>(Method::GET, &path, None).await
    }

    pub async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap> {
        let path = format!("/api/v1/namespaces/{namespace}/configmaps");
        self.send(Method::POST, &path, Some(config_map)).await
    }

    /// Replace the object. The server rejects the write with 409 when
    /// `metadata.resourceVersion` is no longer current.
    pub async fn replace_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap> {
        let name = config_map.metadata.name.as_deref().unwrap_or_default();
        let path = format!("/api/v1/namespaces/{namespace}/configmaps/{name}");
        self.send(Method::PUT, &path, Some(config_map)).await
    }

    pub async fn create_event(&self, namespace: &str, event: &Event) -> Result<Event> {
        let path = format!("/api/v1/namespaces/{namespace}/events");
        self.send(Method::POST, &path, Some(event)).await
    }

    fn url(&self, path: &str) -> Result<Url> {
        let raw = format!("{}{}", self.base.as_str().trim_end_matches('/'), path);
        Url::parse(&raw).map_err(|source| KubeError::InvalidUrl { url: raw, source })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::None | Auth::ClientCertificate { .. } => request,
        }
    }

    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        trace!(%method, %url, "cluster api request");
        let mut request = self.authorize(self.http.request(method.clone(), url.clone()));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|source| transport(&url, source))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| transport(&url, source))?;

        if !status.is_success() {
            let parsed: Status = serde_json::from_slice(&bytes).unwrap_or_default();
            let message = if parsed.message.is_empty() {
                String::from_utf8_lossy(&bytes).into_owned()
            } else {
                parsed.message
            };
            debug!(%method, %url, status = status.as_u16(), reason = %parsed.reason, "cluster api error");
            return Err(KubeError::Api {
                method: method.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
                reason: parsed.reason,
                message,
            });
        }

        serde_json::from_slice(&bytes).map_err(|source| KubeError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

fn transport(url: &Url, source: reqwest::Error) -> KubeError {
    if source.is_timeout() {
        KubeError::Timeout {
            url: url.to_string(),
        }
    } else {
        KubeError::Transport {
            url: url.to_string(),
            source,
        }
    }
}
