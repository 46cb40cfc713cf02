//! In-process cluster implementation
//!
//! Grants slots on a fixed set of host labels and runs every launch command
//! through `sh -c` on this machine. Grants are batched per heartbeat, and
//! process exits are reported back through the same event feed the resource
//! manager hands out on registration.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::core::{SlotCompletion, SlotGrant, SlotId, SlotRequest};
use crate::error::{MasterError, MasterResult};
use crate::traits::{NodeManager, ResourceEvent, ResourceManager};
use shared::{process_debug, process_error, process_info, process_warn, ApplicationReport, FinalApplicationStatus, ProcessId};

pub const DEFAULT_HEARTBEAT_MS: u64 = 1000;
pub const DEFAULT_CLUSTER_HOST: &str = "localhost";

/// Exit status reported for a slot released before it ran
pub const RELEASED_EXIT_CODE: i32 = -100;

/// Exit status reported when a process ended without one (killed by a signal)
pub const UNKNOWN_EXIT_CODE: i32 = -1;

const FEED_CAPACITY: usize = 256;

/// Settings for the local cluster
#[derive(Debug, Clone)]
pub struct LocalClusterConfig {
    pub app_id: String,
    pub log_dir: PathBuf,
    pub hosts: Vec<String>,
    pub heartbeat: Duration,
}

impl LocalClusterConfig {
    pub fn new(app_id: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_id: app_id.into(),
            log_dir: log_dir.into(),
            hosts: vec![DEFAULT_CLUSTER_HOST.to_string()],
            heartbeat: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
        }
    }

    /// Configure host labels (fluent API); an empty list keeps the default
    pub fn with_hosts(mut self, hosts: Vec<String>) -> Self {
        if !hosts.is_empty() {
            self.hosts = hosts;
        }
        self
    }

    /// Configure heartbeat interval (fluent API); never shorter than 1ms
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat.max(Duration::from_millis(1));
        self
    }

    fn knows_host(&self, host: &str) -> bool {
        self.hosts.iter().any(|known| known == host)
    }
}

/// State shared by the resource manager and node manager halves
struct ClusterState {
    config: LocalClusterConfig,
    feed: Mutex<Option<mpsc::Sender<ResourceEvent>>>,
    pending: Mutex<VecDeque<SlotRequest>>,
    next_slot: AtomicU64,
    next_host: AtomicU64,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    running: Mutex<HashMap<SlotId, RunningSlot>>,
}

struct RunningSlot {
    process_id: Option<u32>,
    stop_tx: oneshot::Sender<()>,
}

impl ClusterState {
    async fn feed(&self) -> MasterResult<mpsc::Sender<ResourceEvent>> {
        self.feed
            .lock()
            .await
            .clone()
            .ok_or_else(|| MasterError::transport("not registered with the local cluster"))
    }

    fn next_slot_id(&self) -> String {
        let seq = self.next_slot.fetch_add(1, Ordering::SeqCst) + 1;
        format!("container_{}_{:06}", self.config.app_id, seq)
    }

    /// Pick a host for a request, or `None` if it can never be satisfied
    fn place(&self, request: &SlotRequest) -> Option<String> {
        match &request.host {
            Some(host) if self.config.knows_host(host) => Some(host.clone()),
            Some(_) => None,
            None if self.config.hosts.is_empty() => None,
            None => {
                let index = self.next_host.fetch_add(1, Ordering::SeqCst) as usize % self.config.hosts.len();
                self.config.hosts.get(index).cloned()
            }
        }
    }

    /// Grant every pending request that fits; unknown hosts stay pending
    async fn grant_pending(&self) -> Vec<SlotGrant> {
        let mut pending = self.pending.lock().await;
        let mut unplaced = VecDeque::new();
        let mut granted = Vec::new();

        while let Some(request) = pending.pop_front() {
            match self.place(&request) {
                Some(host) => granted.push(SlotGrant::new(self.next_slot_id(), host)),
                None => unplaced.push_back(request),
            }
        }
        *pending = unplaced;
        granted
    }
}

/// Builder for the paired local resource manager and node manager
pub struct LocalCluster;

impl LocalCluster {
    pub fn new(config: LocalClusterConfig) -> (LocalResourceManager, LocalNodeManager) {
        let state = Arc::new(ClusterState {
            config,
            feed: Mutex::new(None),
            pending: Mutex::new(VecDeque::new()),
            next_slot: AtomicU64::new(0),
            next_host: AtomicU64::new(0),
            heartbeat: Mutex::new(None),
            running: Mutex::new(HashMap::new()),
        });

        (
            LocalResourceManager {
                state: Arc::clone(&state),
            },
            LocalNodeManager { state },
        )
    }
}

/// Resource manager half of the local cluster
pub struct LocalResourceManager {
    state: Arc<ClusterState>,
}

impl LocalResourceManager {
    pub fn config(&self) -> &LocalClusterConfig {
        &self.state.config
    }

    /// Requests not yet granted
    pub async fn pending_requests(&self) -> usize {
        self.state.pending.lock().await.len()
    }

    async fn heartbeat_loop(state: Arc<ClusterState>, feed: mpsc::Sender<ResourceEvent>) {
        let mut ticker = interval(state.config.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let granted = state.grant_pending().await;
            if granted.is_empty() {
                continue;
            }

            process_debug!(ProcessId::current(), "💓 Heartbeat granting {} slots", granted.len());
            if feed.send(ResourceEvent::Allocated(granted)).await.is_err() {
                process_debug!(ProcessId::current(), "Feed receiver dropped; heartbeat stopping");
                break;
            }
        }
    }
}

#[async_trait]
impl ResourceManager for LocalResourceManager {
    async fn register(&self) -> MasterResult<mpsc::Receiver<ResourceEvent>> {
        let mut feed = self.state.feed.lock().await;
        if feed.is_some() {
            return Err(MasterError::transport("already registered with the local cluster"));
        }

        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        *feed = Some(tx.clone());

        let handle = tokio::spawn(Self::heartbeat_loop(Arc::clone(&self.state), tx));
        *self.state.heartbeat.lock().await = Some(handle);

        process_info!(
            ProcessId::current(),
            "🖥️ Local cluster up with hosts [{}] and a {}ms heartbeat",
            self.state.config.hosts.join(", "),
            self.state.config.heartbeat.as_millis()
        );
        Ok(rx)
    }

    async fn request_slots(&self, request: SlotRequest) -> MasterResult<()> {
        if let Some(host) = &request.host {
            if !self.state.config.knows_host(host) {
                process_warn!(
                    ProcessId::current(),
                    "⚠️ Host {} is not part of the local cluster; the request will never be granted",
                    host
                );
            }
        }
        self.state.pending.lock().await.push_back(request);
        Ok(())
    }

    /// Report the slot as released
    ///
    /// Called from inside the feed consumer, so this never waits for room in
    /// the feed; a full feed hands the event to a background send.
    async fn release_slot(&self, slot_id: SlotId) -> MasterResult<()> {
        let feed = self.state.feed().await?;
        let event = ResourceEvent::Completed(vec![SlotCompletion::new(slot_id.as_str(), RELEASED_EXIT_CODE)]);

        match feed.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                process_debug!(ProcessId::current(), "Feed full; deferring release of slot {}", slot_id);
                tokio::spawn(async move {
                    let _ = feed.send(event).await;
                });
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(MasterError::transport("feed closed while releasing a slot")),
        }
    }

    async fn unregister(&self, status: FinalApplicationStatus, report: String) -> MasterResult<()> {
        let config = &self.state.config;
        let application_report = ApplicationReport::new(config.app_id.clone(), status, report);
        let path = ApplicationReport::path_for(&config.log_dir, &config.app_id);

        tokio::fs::create_dir_all(&config.log_dir).await?;
        tokio::fs::write(&path, application_report.to_json()?).await?;
        process_debug!(ProcessId::current(), "📄 Wrote application report to {}", path.display());

        self.stop().await;
        Ok(())
    }

    async fn stop(&self) {
        if let Some(handle) = self.state.heartbeat.lock().await.take() {
            handle.abort();
        }
        self.state.feed.lock().await.take();
    }
}

/// Node manager half of the local cluster
pub struct LocalNodeManager {
    state: Arc<ClusterState>,
}

impl LocalNodeManager {
    /// Slots with a live process
    pub async fn running(&self) -> usize {
        self.state.running.lock().await.len()
    }

    /// Wait for the process to exit or for a stop request, then report its status
    async fn supervise(
        state: Arc<ClusterState>,
        feed: mpsc::Sender<ResourceEvent>,
        slot_id: SlotId,
        mut child: Child,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let status = tokio::select! {
            status = child.wait() => status,
            Ok(()) = &mut stop_rx => {
                Self::terminate(&slot_id, &mut child);
                child.wait().await
            }
        };

        state.running.lock().await.remove(&slot_id);

        let exit_code = match status {
            Ok(status) => status.code().unwrap_or(UNKNOWN_EXIT_CODE),
            Err(e) => {
                process_error!(ProcessId::current(), "❌ Lost track of slot {}: {}", slot_id, e);
                UNKNOWN_EXIT_CODE
            }
        };
        process_debug!(ProcessId::current(), "Slot {} exited with {}", slot_id, exit_code);

        if feed
            .send(ResourceEvent::Completed(vec![SlotCompletion::new(slot_id.as_str(), exit_code)]))
            .await
            .is_err()
        {
            process_debug!(ProcessId::current(), "Feed closed before slot {} reported", slot_id);
        }
    }

    /// Ask the process to exit, SIGTERM where available
    fn terminate(slot_id: &SlotId, child: &mut Child) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    Ok(()) => return,
                    Err(e) => {
                        process_warn!(ProcessId::current(), "⚠️ SIGTERM to slot {} failed: {}", slot_id, e);
                    }
                }
            }
        }

        if let Err(e) = child.start_kill() {
            process_warn!(ProcessId::current(), "⚠️ Failed to kill slot {}: {}", slot_id, e);
        }
    }
}

#[async_trait]
impl NodeManager for LocalNodeManager {
    async fn start_slot(&self, grant: SlotGrant, command: String) -> MasterResult<()> {
        let feed = self.state.feed().await?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&command)
            .env("COHORT_HOST", &grant.host)
            .env("COHORT_SLOT_ID", grant.slot_id.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| MasterError::SlotStartFailed {
            slot_id: grant.slot_id.to_string(),
            host: grant.host.clone(),
            message: e.to_string(),
        })?;

        let process_id = child.id();
        let (stop_tx, stop_rx) = oneshot::channel();
        self.state
            .running
            .lock()
            .await
            .insert(grant.slot_id.clone(), RunningSlot { process_id, stop_tx });

        process_debug!(
            ProcessId::current(),
            "🐚 Slot {} on {} running as PID {}",
            grant.slot_id,
            grant.host,
            process_id.map(|pid| pid.to_string()).unwrap_or_else(|| "?".to_string())
        );

        tokio::spawn(Self::supervise(
            Arc::clone(&self.state),
            feed,
            grant.slot_id,
            child,
            stop_rx,
        ));
        Ok(())
    }

    async fn stop_slot(&self, slot_id: SlotId) -> MasterResult<()> {
        let Some(slot) = self.state.running.lock().await.remove(&slot_id) else {
            return Ok(());
        };

        process_debug!(
            ProcessId::current(),
            "🛑 Stopping slot {} (PID {:?})",
            slot_id,
            slot.process_id
        );
        slot.stop_tx.send(()).map_err(|_| MasterError::SlotStopFailed {
            slot_id: slot_id.to_string(),
            message: "process supervisor already gone".to_string(),
        })
    }
}
