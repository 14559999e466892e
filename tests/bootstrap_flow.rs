//! End-to-end runs of the bootstrap workflow against local stand-ins for the
//! service health endpoint, the download host and the service binary.
#![cfg(unix)]

use axum::{extract::State, http::StatusCode, routing::get, Router};
use byze_bootstrap::{
    BootstrapOutcome, BootstrapProgress, BootstrapSettings, Bootstrapper, UrlOpener, UserDecision,
};
use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use tempfile::{tempdir, TempDir};
use tokio::net::TcpListener;

#[derive(Clone)]
struct HostState {
    healthy: bool,
    binary: Arc<Vec<u8>>,
    downloads: Arc<AtomicUsize>,
}

struct FakeHost {
    base: String,
    downloads: Arc<AtomicUsize>,
}

async fn health(State(state): State<HostState>) -> StatusCode {
    if state.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn binary(State(state): State<HostState>) -> Vec<u8> {
    state.downloads.fetch_add(1, Ordering::SeqCst);
    state.binary.as_ref().clone()
}

async fn spawn_host(healthy: bool, binary_bytes: Vec<u8>) -> FakeHost {
    let downloads = Arc::new(AtomicUsize::new(0));
    let state = HostState {
        healthy,
        binary: Arc::new(binary_bytes),
        downloads: downloads.clone(),
    };
    let app = Router::new()
        .route("/", get(health))
        .route("/byzedev/byze.exe", get(binary))
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    FakeHost {
        base: format!("http://{addr}"),
        downloads,
    }
}

/// Plays the user: records the opened URL and optionally clicks a button.
#[derive(Clone)]
struct ScriptedUser {
    answer: Option<&'static str>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl ScriptedUser {
    fn new(answer: Option<&'static str>) -> Self {
        Self {
            answer,
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl UrlOpener for ScriptedUser {
    fn open(&self, url: &str) {
        self.opened.lock().unwrap().push(url.to_string());
        if let Some(choice) = self.answer {
            let response_url =
                url.replace("/install-prompt", &format!("/user-response?choice={choice}"));
            tokio::spawn(async move {
                reqwest::get(response_url).await.unwrap();
            });
        }
    }
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempdir().unwrap(),
        }
    }

    fn install_dir(&self) -> PathBuf {
        self.dir.path().join("Byze")
    }

    fn binary_path(&self) -> PathBuf {
        self.install_dir().join("byze")
    }

    fn config_file(&self) -> PathBuf {
        self.dir.path().join(".byze")
    }

    fn calls_log(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    /// Shell script standing in for the service binary.
    fn fake_binary(&self, exit_code: i32) -> Vec<u8> {
        format!(
            "#!/bin/sh\necho \"$@\" >> '{}'\nexit {exit_code}\n",
            self.calls_log().display()
        )
        .into_bytes()
    }

    fn preinstall(&self, exit_code: i32) {
        std::fs::create_dir_all(self.install_dir()).unwrap();
        std::fs::write(self.binary_path(), self.fake_binary(exit_code)).unwrap();
        std::fs::set_permissions(self.binary_path(), std::fs::Permissions::from_mode(0o755))
            .unwrap();
    }

    fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.calls_log())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn settings(&self, host: &FakeHost) -> BootstrapSettings {
        BootstrapSettings {
            service_url: format!("{}/", host.base),
            prompt_bind: "127.0.0.1:0".parse().unwrap(),
            prompt_host: "127.0.0.1".to_string(),
            download_url: format!("{}/byzedev/byze.exe", host.base),
            install_dir: Some(self.install_dir()),
            binary_name: "byze".to_string(),
            consent_timeout_secs: 10,
            startup_delay_ms: 300,
            ..BootstrapSettings::default()
        }
    }
}

fn import_call(file: &Path) -> String {
    format!("import --file {}", file.display())
}

async fn run(
    settings: BootstrapSettings,
    user: ScriptedUser,
    file: &Path,
) -> (BootstrapOutcome, Vec<BootstrapProgress>) {
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    let bootstrapper = Bootstrapper::new(settings, user).unwrap();
    let outcome = bootstrapper
        .run(file, move |event| sink.lock().unwrap().push(event))
        .await;
    let events = progress.lock().unwrap().clone();
    (outcome, events)
}

#[tokio::test(flavor = "multi_thread")]
async fn running_service_imports_directly() {
    let ws = Workspace::new();
    ws.preinstall(0);
    let host = spawn_host(true, ws.fake_binary(0)).await;
    let user = ScriptedUser::new(Some("true"));

    let (outcome, events) = run(ws.settings(&host), user.clone(), &ws.config_file()).await;

    assert_eq!(
        outcome,
        BootstrapOutcome::Imported {
            file: ws.config_file(),
            installed: false
        }
    );
    assert_eq!(ws.calls(), vec![import_call(&ws.config_file())]);
    assert_eq!(host.downloads.load(Ordering::SeqCst), 0);
    assert!(user.opened().is_empty(), "no browser when the service is up");
    assert!(events.contains(&BootstrapProgress::ServiceAvailable));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_direct_import_is_reported() {
    let ws = Workspace::new();
    ws.preinstall(2);
    let host = spawn_host(true, ws.fake_binary(0)).await;

    let (outcome, _) = run(ws.settings(&host), ScriptedUser::new(None), &ws.config_file()).await;

    assert!(matches!(
        outcome,
        BootstrapOutcome::ImportFailed {
            installed: false,
            ..
        }
    ));
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(ws.calls(), vec![import_call(&ws.config_file())]);
}

#[tokio::test(flavor = "multi_thread")]
async fn agreeing_downloads_starts_and_imports() {
    let ws = Workspace::new();
    let host = spawn_host(false, ws.fake_binary(0)).await;
    let user = ScriptedUser::new(Some("true"));

    let (outcome, events) = run(ws.settings(&host), user.clone(), &ws.config_file()).await;

    assert_eq!(
        outcome,
        BootstrapOutcome::Imported {
            file: ws.config_file(),
            installed: true
        }
    );
    assert_eq!(host.downloads.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read(ws.binary_path()).unwrap(), ws.fake_binary(0));
    assert_eq!(
        ws.calls(),
        vec!["server start -d".to_string(), import_call(&ws.config_file())]
    );

    let opened = user.opened();
    assert_eq!(opened.len(), 1);
    assert!(opened[0].starts_with("http://127.0.0.1:"));
    assert!(opened[0].ends_with("/install-prompt"));

    let stages: Vec<&str> = events
        .iter()
        .map(|event| match event {
            BootstrapProgress::Checking { .. } => "checking",
            BootstrapProgress::ServiceAvailable => "available",
            BootstrapProgress::ServiceUnavailable => "unavailable",
            BootstrapProgress::AwaitingConsent { .. } => "awaiting",
            BootstrapProgress::ConsentReceived(_) => "consent",
            BootstrapProgress::Downloading { .. } => "downloading",
            BootstrapProgress::Downloaded { .. } => "downloaded",
            BootstrapProgress::Starting { .. } => "starting",
            BootstrapProgress::Importing { .. } => "importing",
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            "checking",
            "unavailable",
            "awaiting",
            "consent",
            "downloading",
            "downloaded",
            "starting",
            "importing"
        ]
    );
    assert!(events.contains(&BootstrapProgress::ConsentReceived(UserDecision::Granted)));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelling_stops_before_download() {
    let ws = Workspace::new();
    let host = spawn_host(false, ws.fake_binary(0)).await;

    let (outcome, _) = run(
        ws.settings(&host),
        ScriptedUser::new(Some("false")),
        &ws.config_file(),
    )
    .await;

    assert_eq!(
        outcome,
        BootstrapOutcome::Refused {
            decision: UserDecision::Denied
        }
    );
    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(host.downloads.load(Ordering::SeqCst), 0);
    assert!(!ws.binary_path().exists());
    assert!(ws.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unanswered_prompt_times_out_as_refusal() {
    let ws = Workspace::new();
    let host = spawn_host(false, ws.fake_binary(0)).await;
    let user = ScriptedUser::new(None);
    let settings = BootstrapSettings {
        consent_timeout_secs: 1,
        ..ws.settings(&host)
    };

    let (outcome, _) = run(settings, user.clone(), &ws.config_file()).await;

    assert_eq!(
        outcome,
        BootstrapOutcome::Refused {
            decision: UserDecision::Unset
        }
    );
    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(user.opened().len(), 1);
    assert_eq!(host.downloads.load(Ordering::SeqCst), 0);
    assert!(ws.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn download_failure_ends_the_run() {
    let ws = Workspace::new();
    let host = spawn_host(false, ws.fake_binary(0)).await;
    let settings = BootstrapSettings {
        download_url: format!("{}/missing", host.base),
        ..ws.settings(&host)
    };

    let (outcome, _) = run(settings, ScriptedUser::new(Some("true")), &ws.config_file()).await;

    assert!(matches!(outcome, BootstrapOutcome::DownloadFailed { .. }));
    assert_eq!(outcome.exit_code(), 3);
    assert!(ws.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unhealthy_service_fails_install_when_verified() {
    let ws = Workspace::new();
    let host = spawn_host(false, ws.fake_binary(0)).await;
    let settings = BootstrapSettings {
        verify_startup: true,
        startup_probe_attempts: 1,
        startup_delay_ms: 100,
        ..ws.settings(&host)
    };

    let (outcome, _) = run(settings, ScriptedUser::new(Some("true")), &ws.config_file()).await;

    assert!(matches!(outcome, BootstrapOutcome::InstallFailed { .. }));
    assert_eq!(outcome.exit_code(), 4);
    assert!(!ws.calls().contains(&import_call(&ws.config_file())));
}

#[tokio::test(flavor = "multi_thread")]
async fn busy_prompt_port_fails_the_prompt() {
    let ws = Workspace::new();
    let host = spawn_host(false, ws.fake_binary(0)).await;
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let settings = BootstrapSettings {
        prompt_bind: taken.local_addr().unwrap(),
        ..ws.settings(&host)
    };

    let user = ScriptedUser::new(Some("true"));
    let (outcome, _) = run(settings, user.clone(), &ws.config_file()).await;

    assert!(matches!(outcome, BootstrapOutcome::PromptFailed { .. }));
    assert_eq!(outcome.exit_code(), 5);
    assert!(user.opened().is_empty());
    assert_eq!(host.downloads.load(Ordering::SeqCst), 0);
}
