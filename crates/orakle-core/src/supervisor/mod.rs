//! Launches, health-checks, and gracefully terminates the two subprocesses
//! Orakle depends on: the skills host and the bridge process. Generalizes
//! the teacher's single-service `SidecarService` to a small
//! `HashMap<ServiceId, ManagedService>`, with `start_all`/`stop_all` run in
//! parallel via `futures::future::join_all` per the concurrency model.

mod error;

pub use error::{SupervisorError, SupervisorResult};

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::process::Child;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

/// Identifies one of the two subprocesses the supervisor manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceId {
    SkillsHost,
    Bridge,
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceId::SkillsHost => write!(f, "skills-host"),
            ServiceId::Bridge => write!(f, "bridge"),
        }
    }
}

/// Static launch configuration for one managed service.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub id: ServiceId,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub port: u16,
    pub health_path: String,
    pub startup_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub health_poll_interval: Duration,
}

impl ServiceSpec {
    fn health_url(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, self.health_path)
    }
}

/// Current status of a managed service, published on every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServiceStatus {
    Stopped,
    Starting { percent: Option<f32>, message: Option<String> },
    Healthy,
    Unhealthy { reason: String },
}

impl ServiceStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ServiceStatus::Healthy)
    }
}

/// Result of a `start_all`/`start_one` call, shaped to match the façade's
/// `{success, message?}` response for the setup flow.
#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    pub success: bool,
    pub message: Option<String>,
}

/// Events observers can subscribe to: status transitions and progress
/// lines parsed from a service's stdout during startup.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorEvent {
    StatusChanged { service: ServiceId, status: ServiceStatus },
    Progress { service: ServiceId, percent: Option<f32>, message: String },
}

/// One subprocess under management: its spec, current status, and child
/// handle. The child handle is held exclusively here — no other component
/// may terminate it, per the data model's ownership rule.
struct ManagedService {
    spec: ServiceSpec,
    status: Mutex<ServiceStatus>,
    child: Mutex<Option<Child>>,
    http: Client,
}

impl ManagedService {
    fn new(spec: ServiceSpec, http: Client) -> Self {
        Self { spec, status: Mutex::new(ServiceStatus::Stopped), child: Mutex::new(None), http }
    }

    async fn status(&self) -> ServiceStatus {
        self.status.lock().await.clone()
    }

    async fn set_status(&self, status: ServiceStatus, events: &broadcast::Sender<SupervisorEvent>) {
        *self.status.lock().await = status.clone();
        let _ = events.send(SupervisorEvent::StatusChanged { service: self.spec.id, status });
    }

    /// Attempt a transient bind on the service's configured port; a
    /// successful bind (immediately dropped) means the port is free.
    async fn ensure_port_free(&self) -> SupervisorResult<()> {
        let addr = format!("127.0.0.1:{}", self.spec.port);
        TcpListener::bind(&addr).await.map(drop).map_err(|_| SupervisorError::PortInUse(self.spec.id))
    }

    async fn start(&self, events: &broadcast::Sender<SupervisorEvent>) -> SupervisorResult<()> {
        self.ensure_port_free().await?;
        self.set_status(ServiceStatus::Starting { percent: None, message: None }, events).await;

        let mut cmd = tokio::process::Command::new(&self.spec.command);
        cmd.args(&self.spec.args);
        for (k, v) in &self.spec.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| SupervisorError::SpawnFailed(self.spec.id, e.to_string()))?;

        if let Some(stdout) = child.stdout.take() {
            spawn_progress_reader(self.spec.id, stdout, events.clone());
        }

        *self.child.lock().await = Some(child);

        if self.wait_for_health().await {
            self.set_status(ServiceStatus::Healthy, events).await;
            Ok(())
        } else {
            let reason = format!("service {} did not become healthy within {:?}", self.spec.id, self.spec.startup_timeout);
            self.set_status(ServiceStatus::Unhealthy { reason }, events).await;
            Err(SupervisorError::StartupTimedOut(self.spec.id))
        }
    }

    async fn wait_for_health(&self) -> bool {
        let deadline = Instant::now() + self.spec.startup_timeout;
        let url = self.spec.health_url();
        loop {
            if Instant::now() >= deadline {
                return false;
            }
            if let Ok(resp) = self.http.get(&url).send().await {
                if resp.status().is_success() {
                    return true;
                }
            }
            tokio::time::sleep(self.spec.health_poll_interval).await;
        }
    }

    /// One-shot health poll, publishing a status transition only when the
    /// observed health differs from the last known status.
    async fn poll_health(&self, events: &broadcast::Sender<SupervisorEvent>) -> bool {
        let healthy = match self.http.get(&self.spec.health_url()).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        };
        let previous = self.status().await;
        if healthy && previous != ServiceStatus::Healthy {
            self.set_status(ServiceStatus::Healthy, events).await;
        } else if !healthy && matches!(previous, ServiceStatus::Healthy) {
            self.set_status(ServiceStatus::Unhealthy { reason: "health check failed".to_owned() }, events).await;
        }
        healthy
    }

    async fn stop(&self, force: bool, events: &broadcast::Sender<SupervisorEvent>) {
        let child_opt = self.child.lock().await.take();
        if let Some(mut child) = child_opt {
            if force {
                let _ = child.kill().await;
            } else {
                send_graceful_term(&child);
                let waited = tokio::time::timeout(self.spec.shutdown_timeout, child.wait()).await;
                if waited.is_err() {
                    let _ = child.kill().await;
                }
            }
        }
        self.set_status(ServiceStatus::Stopped, events).await;
    }
}

#[cfg(unix)]
fn send_graceful_term(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_graceful_term(_child: &Child) {
    // Windows has no SIGTERM equivalent reachable from `tokio::process`;
    // `stop_all` falls straight through to the timeout-then-kill path.
}

/// Parses a child's stdout line by line, looking for the supervisor's
/// structured progress markers (`PROGRESS <json>`) and republishing them
/// as [`SupervisorEvent::Progress`]. Runs until the pipe closes.
fn spawn_progress_reader(service: ServiceId, stdout: tokio::process::ChildStdout, events: broadcast::Sender<SupervisorEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some((percent, message)) = parse_progress_line(&line) {
                let _ = events.send(SupervisorEvent::Progress { service, percent, message });
            }
        }
    });
}

const PROGRESS_PREFIX: &str = "PROGRESS ";

#[derive(Debug, Deserialize)]
struct ProgressMarker {
    #[serde(default)]
    percent: Option<f32>,
    #[serde(default)]
    message: String,
}

fn parse_progress_line(line: &str) -> Option<(Option<f32>, String)> {
    let json = line.strip_prefix(PROGRESS_PREFIX)?;
    let marker: ProgressMarker = serde_json::from_str(json.trim()).ok()?;
    Some((marker.percent, marker.message))
}

/// Manages the skills host and bridge subprocesses: spawns, health-checks,
/// progress-reports, and gracefully terminates them.
pub struct ServiceSupervisor {
    services: HashMap<ServiceId, Arc<ManagedService>>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl ServiceSupervisor {
    pub fn new(specs: Vec<ServiceSpec>) -> Self {
        let http = Client::builder().timeout(Duration::from_secs(5)).build().unwrap_or_default();
        let (events, _) = broadcast::channel(256);
        let services = specs.into_iter().map(|spec| (spec.id, Arc::new(ManagedService::new(spec, http.clone())))).collect();
        Self { services, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self, id: ServiceId) -> SupervisorResult<ServiceStatus> {
        let svc = self.services.get(&id).ok_or(SupervisorError::UnknownService(id))?;
        Ok(svc.status().await)
    }

    pub async fn all_statuses(&self) -> HashMap<ServiceId, ServiceStatus> {
        let mut out = HashMap::with_capacity(self.services.len());
        for (id, svc) in &self.services {
            out.insert(*id, svc.status().await);
        }
        out
    }

    /// Start every managed service in parallel. Succeeds only if every
    /// service becomes healthy within its startup timeout.
    pub async fn start_all(&self) -> StartReport {
        let results = join_all(self.services.values().map(|svc| {
            let svc = Arc::clone(svc);
            let events = self.events.clone();
            async move { (svc.spec.id, svc.start(&events).await) }
        }))
        .await;

        let failures: Vec<String> =
            results.into_iter().filter_map(|(id, res)| res.err().map(|e| format!("{id}: {e}"))).collect();

        if failures.is_empty() {
            StartReport { success: true, message: None }
        } else {
            StartReport { success: false, message: Some(failures.join("; ")) }
        }
    }

    /// Poll every service's health URL once. Does not block start/stop —
    /// callers typically drive this from a `tokio::time::interval` timer.
    pub async fn check_health(&self) {
        join_all(self.services.values().map(|svc| {
            let svc = Arc::clone(svc);
            let events = self.events.clone();
            async move { svc.poll_health(&events).await }
        }))
        .await;
    }

    /// Stop every managed service in parallel.
    pub async fn stop_all(&self, force: bool) {
        join_all(self.services.values().map(|svc| {
            let svc = Arc::clone(svc);
            let events = self.events.clone();
            async move { svc.stop(force, &events).await }
        }))
        .await;
    }

    pub async fn restart_all(&self) -> StartReport {
        self.stop_all(false).await;
        self.start_all().await
    }
}
