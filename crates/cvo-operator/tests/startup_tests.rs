//! ---
//! cvo_section: "15-testing-qa-runbook"
//! cvo_subsection: "tests"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Startup validation order and leadership lifecycle coverage."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cvo_common::{ClientSettings, ElectionConfig, IdentityError, LockConfig, POD_NAME_ENV};
use cvo_election::{
    stop_channel, EventRecorder, LockResource, MemoryLock, StopSignal, Termination,
    TracingRecorder,
};
use cvo_kube::ClientConfig;
use cvo_operator::{RecordedExit, Startup, StartupError, UpdateGraphClient, Workers};

const CLUSTER_ID: &str = "4f0f0b2c-8a1e-4c52-9d8e-2b0d5b6f1a77";

const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: admin@test
clusters:
- name: test
  cluster:
    server: https://api.test.example:6443
contexts:
- name: admin@test
  context:
    cluster: test
    user: admin
users:
- name: admin
  user:
    token: abc123
"#;

fn kubeconfig(dir: &Path) -> PathBuf {
    let path = dir.join("kubeconfig");
    fs::write(&path, KUBECONFIG).unwrap();
    path
}

fn settings() -> ClientSettings {
    ClientSettings {
        request_timeout: Duration::from_secs(3),
    }
}

#[derive(Default)]
struct Capturing {
    seen: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Workers for Capturing {
    async fn start_workers(&self, stop: StopSignal, client: ClientConfig, graph: UpdateGraphClient) {
        self.seen
            .lock()
            .unwrap()
            .push((client.server.to_string(), graph.cluster_id().to_string()));
        stop.stopped().await;
    }
}

#[test]
fn missing_pod_name_is_fatal_before_credentials_are_read() {
    let err = Startup::prepare(
        CLUSTER_ID,
        None,
        Some(Path::new("/nonexistent/kubeconfig")),
        &settings(),
    )
    .unwrap_err();
    assert!(
        matches!(err, StartupError::Identity(IdentityError::MissingIdentity(name)) if name == POD_NAME_ENV),
        "{err}"
    );
}

#[test]
fn cluster_id_is_checked_first() {
    let err = Startup::prepare("not-a-uuid", None, None, &settings()).unwrap_err();
    assert!(matches!(err, StartupError::ClusterId(IdentityError::NotUuid { .. })), "{err}");

    let err = Startup::prepare(
        "c232ab00-9414-11ec-b3c8-9f68deced846",
        Some("pod-a".into()),
        None,
        &settings(),
    )
    .unwrap_err();
    assert!(
        matches!(err, StartupError::ClusterId(IdentityError::WrongVersion { version: 1, .. })),
        "{err}"
    );
}

#[test]
fn unreadable_kubeconfig_is_fatal() {
    let err = Startup::prepare(
        CLUSTER_ID,
        Some("pod-a".into()),
        Some(Path::new("/nonexistent/kubeconfig")),
        &settings(),
    )
    .unwrap_err();
    assert!(matches!(err, StartupError::ClientConfig(_)), "{err}");
}

#[test]
fn lock_is_built_without_contacting_the_server() {
    let dir = tempfile::tempdir().unwrap();
    let path = kubeconfig(dir.path());
    let startup = Startup::prepare(CLUSTER_ID, Some("pod-a".into()), Some(&path), &settings()).unwrap();
    assert_eq!(startup.identity.as_str(), "pod-a");
    assert_eq!(startup.cluster_id.to_string(), CLUSTER_ID);
    assert_eq!(startup.client.timeout, Duration::from_secs(3));

    let (lock, _recorder) = startup.config_map_lock(&LockConfig::default()).unwrap();
    assert_eq!(lock.describe(), "kube-system/cluster-version-operator");
}

#[derive(Clone, Copy)]
enum Interrupt {
    Shutdown,
    Partition,
}

async fn run_with_memory_lock(
    store: &MemoryLock,
    interrupt_with: Interrupt,
) -> (Termination, Arc<Capturing>, Arc<RecordedExit>) {
    let dir = tempfile::tempdir().unwrap();
    let path = kubeconfig(dir.path());
    let startup = Startup::prepare(CLUSTER_ID, Some("pod-a".into()), Some(&path), &settings()).unwrap();

    let handle = Arc::new(store.handle());
    let lock = handle.clone() as Arc<dyn LockResource>;
    let recorder: Arc<dyn EventRecorder> = Arc::new(TracingRecorder::new("memory/cvo"));
    let workers = Arc::new(Capturing::default());
    let exit = Arc::new(RecordedExit::default());
    let (stop, signal) = stop_channel();

    let election = ElectionConfig::default();
    let run = startup.run(
        &election,
        lock,
        recorder,
        workers.clone(),
        exit.clone(),
        signal,
    );
    let interrupt = async {
        tokio::time::sleep(Duration::from_secs(120)).await;
        match interrupt_with {
            Interrupt::Partition => handle.set_partitioned(true),
            Interrupt::Shutdown => stop.stop(),
        }
        std::future::pending::<()>().await;
    };
    let termination = tokio::select! {
        result = run => result.unwrap(),
        _ = interrupt => unreachable!(),
    };
    (termination, workers, exit)
}

#[tokio::test(start_paused = true)]
async fn shutdown_while_leading_stops_workers_and_exits_zero() {
    let store = MemoryLock::new("cvo");
    let (termination, workers, exit) = run_with_memory_lock(&store, Interrupt::Shutdown).await;

    assert_eq!(termination, Termination::Cancelled);
    assert_eq!(
        workers.seen.lock().unwrap().as_slice(),
        [(
            "https://api.test.example:6443/".to_owned(),
            CLUSTER_ID.to_owned()
        )]
    );
    assert_eq!(exit.codes(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn lost_lease_exits_zero_after_workers_stop() {
    let store = MemoryLock::new("cvo");
    let (termination, workers, exit) = run_with_memory_lock(&store, Interrupt::Partition).await;

    assert_eq!(termination, Termination::LeadershipLost);
    assert_eq!(workers.seen.lock().unwrap().len(), 1);
    assert_eq!(exit.codes(), vec![0]);
    assert_eq!(store.snapshot().unwrap().0.holder_identity, "pod-a");
}
