//! ---
//! cvo_section: "15-testing-qa-runbook"
//! cvo_subsection: "tests"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Cluster API client request and error mapping coverage."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use cvo_kube::{Auth, ClientConfig, ConfigMap, Event, KubeClient, KubeError, ObjectMeta, ObjectReference};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use url::Url;

#[derive(Default)]
struct Seen {
    user_agents: Vec<String>,
    authorizations: Vec<String>,
    events: Vec<Value>,
}

type Shared = Arc<Mutex<Seen>>;

fn record(seen: &Shared, headers: &HeaderMap) {
    let mut seen = seen.lock().unwrap();
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned()
    };
    seen.user_agents.push(header("user-agent"));
    seen.authorizations.push(header("authorization"));
}

async fn get_config_map(
    State(seen): State<Shared>,
    headers: HeaderMap,
    Path((ns, name)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    record(&seen, &headers);
    if name == "present" {
        return (
            StatusCode::OK,
            Json(json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": name, "namespace": ns, "resourceVersion": "7"}
            })),
        );
    }
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "kind": "Status",
            "status": "Failure",
            "reason": "NotFound",
            "message": format!("configmaps \"{name}\" not found"),
            "code": 404
        })),
    )
}

async fn create_config_map(
    State(seen): State<Shared>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    record(&seen, &headers);
    (
        StatusCode::CONFLICT,
        Json(json!({"kind": "Status", "reason": "AlreadyExists", "message": "already exists", "code": 409})),
    )
}

async fn create_event(
    State(seen): State<Shared>,
    Json(event): Json<Value>,
) -> (StatusCode, Json<Value>) {
    seen.lock().unwrap().events.push(event.clone());
    (StatusCode::CREATED, Json(event))
}

async fn serve(seen: Shared) -> SocketAddr {
    let router = Router::new()
        .route(
            "/api/v1/namespaces/:ns/configmaps/:name",
            get(get_config_map),
        )
        .route("/api/v1/namespaces/:ns/configmaps", post(create_config_map))
        .route("/api/v1/namespaces/:ns/events", post(create_event))
        .with_state(seen);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn client(addr: SocketAddr) -> KubeClient {
    let config = ClientConfig::new(
        Url::parse(&format!("http://{addr}")).unwrap(),
        Auth::Bearer("t0k3n".into()),
    )
    .with_user_agent("leader-election")
    .with_timeout(Duration::from_secs(5));
    KubeClient::new(&config).unwrap()
}

#[tokio::test]
async fn get_decodes_object_and_sends_credentials() {
    let seen = Shared::default();
    let addr = serve(seen.clone()).await;

    let cm = client(addr).get_config_map("kube-system", "present").await.unwrap();
    assert_eq!(cm.metadata.resource_version.as_deref(), Some("7"));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.authorizations, vec!["Bearer t0k3n".to_owned()]);
    assert!(seen.user_agents[0].ends_with("/leader-election"));
}

#[tokio::test]
async fn missing_object_maps_to_not_found() {
    let addr = serve(Shared::default()).await;

    let err = client(addr).get_config_map("kube-system", "absent").await.unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert!(!err.is_transient());
    match err {
        KubeError::Api { reason, message, .. } => {
            assert_eq!(reason, "NotFound");
            assert!(message.contains("absent"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn create_conflict_maps_to_409() {
    let addr = serve(Shared::default()).await;
    let cm = ConfigMap::new(ObjectMeta::named("kube-system", "present"));

    let err = client(addr).create_config_map("kube-system", &cm).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn events_are_posted_to_namespace() {
    let seen = Shared::default();
    let addr = serve(seen.clone()).await;
    let event = Event::normal(
        ObjectReference {
            api_version: "v1".into(),
            kind: "ConfigMap".into(),
            namespace: "kube-system".into(),
            name: "cluster-version-operator".into(),
            uid: None,
            resource_version: None,
        },
        "cluster-version-operator",
        "LeaderElection",
        "pod-a became leader",
        Utc::now(),
    );

    client(addr).create_event("kube-system", &event).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.events.len(), 1);
    assert_eq!(seen.events[0]["reason"], "LeaderElection");
    assert_eq!(seen.events[0]["involvedObject"]["kind"], "ConfigMap");
}

#[tokio::test]
async fn unreachable_server_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(addr).get_config_map("kube-system", "x").await.unwrap_err();
    assert!(err.is_transient(), "{err}");
}
