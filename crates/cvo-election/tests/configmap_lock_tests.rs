//! ---
//! cvo_section: "15-testing-qa-runbook"
//! cvo_subsection: "tests"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "ConfigMap lock against a fake API server with resourceVersion checks."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use cvo_common::{ElectionConfig, ProcessIdentity};
use cvo_election::{
    AttemptOutcome, ConfigMapLock, LeaderElector, LeaseRecord, LockError, LockResource,
    LEADER_ANNOTATION,
};
use cvo_kube::{Auth, ClientConfig, KubeClient};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use url::Url;

#[derive(Default)]
struct Store {
    object: Option<Value>,
    resource_version: u64,
}

type Shared = Arc<Mutex<Store>>;

fn status(code: StatusCode, reason: &str, message: &str) -> (StatusCode, Json<Value>) {
    (
        code,
        Json(json!({
            "kind": "Status",
            "status": "Failure",
            "reason": reason,
            "message": message,
            "code": code.as_u16()
        })),
    )
}

fn stamp(store: &mut Store, mut object: Value) -> Value {
    store.resource_version += 1;
    object["metadata"]["resourceVersion"] = json!(store.resource_version.to_string());
    store.object = Some(object.clone());
    object
}

async fn read(State(store): State<Shared>, Path((_ns, _name)): Path<(String, String)>) -> (StatusCode, Json<Value>) {
    match store.lock().unwrap().object.clone() {
        Some(object) => (StatusCode::OK, Json(object)),
        None => status(StatusCode::NOT_FOUND, "NotFound", "configmaps not found"),
    }
}

async fn create(State(store): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut store = store.lock().unwrap();
    if store.object.is_some() {
        return status(StatusCode::CONFLICT, "AlreadyExists", "configmaps already exists");
    }
    (StatusCode::CREATED, Json(stamp(&mut store, body)))
}

async fn replace(
    State(store): State<Shared>,
    Path((_ns, _name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut store = store.lock().unwrap();
    if store.object.is_none() {
        return status(StatusCode::NOT_FOUND, "NotFound", "configmaps not found");
    }
    let current = store.resource_version.to_string();
    if body["metadata"]["resourceVersion"] != json!(current) {
        return status(
            StatusCode::CONFLICT,
            "Conflict",
            "the object has been modified; please apply your changes to the latest version",
        );
    }
    (StatusCode::OK, Json(stamp(&mut store, body)))
}

async fn serve(store: Shared) -> SocketAddr {
    let router = Router::new()
        .route(
            "/api/v1/namespaces/:ns/configmaps/:name",
            get(read).put(replace),
        )
        .route("/api/v1/namespaces/:ns/configmaps", post(create))
        .with_state(store);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn lock(addr: SocketAddr) -> ConfigMapLock {
    let config = ClientConfig::new(Url::parse(&format!("http://{addr}")).unwrap(), Auth::None)
        .with_user_agent("leader-election")
        .with_timeout(Duration::from_secs(5));
    ConfigMapLock::new(
        KubeClient::new(&config).unwrap(),
        "kube-system",
        "cluster-version-operator",
    )
}

fn annotation(store: &Shared) -> Value {
    let store = store.lock().unwrap();
    let raw = store.object.as_ref().unwrap()["metadata"]["annotations"][LEADER_ANNOTATION]
        .as_str()
        .unwrap()
        .to_owned();
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn absent_object_is_created_with_the_lease_annotation() {
    let store = Shared::default();
    let addr = serve(store.clone()).await;
    let mut elector = LeaderElector::new(
        ProcessIdentity::from_value(Some("pod-a".into())).unwrap(),
        ElectionConfig::default(),
        Arc::new(lock(addr)),
    )
    .unwrap();

    assert_eq!(elector.try_acquire_or_renew().await.unwrap(), AttemptOutcome::Acquired);
    let record = annotation(&store);
    assert_eq!(record["holderIdentity"], "pod-a");
    assert_eq!(record["leaseDurationSeconds"], 90);
    assert_eq!(record["leaderTransitions"], 0);
    assert!(record["renewTime"].as_str().is_some());

    assert_eq!(elector.try_acquire_or_renew().await.unwrap(), AttemptOutcome::Renewed);
    assert_eq!(store.lock().unwrap().resource_version, 2);
}

#[tokio::test]
async fn existing_object_without_annotation_is_claimed_in_place() {
    let store = Shared::default();
    {
        let mut guard = store.lock().unwrap();
        stamp(
            &mut guard,
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {
                    "name": "cluster-version-operator",
                    "namespace": "kube-system",
                    "labels": {"app": "cluster-version-operator"}
                },
                "data": {"keep": "me"}
            }),
        );
    }
    let addr = serve(store.clone()).await;
    let lock = lock(addr);

    let (record, version) = lock.get().await.unwrap();
    assert!(record.is_vacant());
    assert_eq!(version.as_str(), "1");

    let claim = LeaseRecord::claim("pod-a", 90, Utc::now());
    let next = lock.update(&claim, &version).await.unwrap();
    assert_eq!(next.as_str(), "2");

    let object = store.lock().unwrap().object.clone().unwrap();
    assert_eq!(object["data"]["keep"], "me");
    assert_eq!(object["metadata"]["labels"]["app"], "cluster-version-operator");
    assert_eq!(annotation(&store)["holderIdentity"], "pod-a");
}

#[tokio::test]
async fn stale_resource_version_is_a_conflict() {
    let store = Shared::default();
    let addr = serve(store.clone()).await;
    let first = lock(addr);
    let second = lock(addr);

    let created = first
        .create(&LeaseRecord::claim("pod-a", 90, Utc::now()))
        .await
        .unwrap();
    let err = second
        .create(&LeaseRecord::claim("pod-b", 90, Utc::now()))
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::AlreadyExists(_)), "{err}");

    let (_, seen) = second.get().await.unwrap();
    assert_eq!(seen, created);
    first
        .update(&LeaseRecord::claim("pod-a", 90, Utc::now()), &created)
        .await
        .unwrap();

    let err = second
        .update(&LeaseRecord::claim("pod-b", 90, Utc::now()), &seen)
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::Conflict(_)), "{err}");
    assert_eq!(annotation(&store)["holderIdentity"], "pod-a");
}

#[tokio::test]
async fn garbage_annotation_is_reported_as_malformed() {
    let store = Shared::default();
    {
        let mut guard = store.lock().unwrap();
        stamp(
            &mut guard,
            json!({
                "metadata": {
                    "name": "cluster-version-operator",
                    "namespace": "kube-system",
                    "annotations": {LEADER_ANNOTATION: "{not json"}
                }
            }),
        );
    }
    let addr = serve(store).await;

    let err = lock(addr).get().await.unwrap_err();
    assert!(matches!(err, LockError::Malformed { .. }), "{err}");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn unreachable_server_is_a_store_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = lock(addr).get().await.unwrap_err();
    assert!(matches!(err, LockError::Store { .. }), "{err}");
    assert!(err.is_transient());
}
