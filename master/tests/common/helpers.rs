//! Test helpers and builder patterns for master tests
//!
//! [`ClusterHarness`] stands in for a real cluster: the test pushes grant,
//! completion and error events into the feed, and every call the master makes
//! is recorded for later assertions.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;

use cohort_master::core::{SlotCompletion, SlotGrant, SlotId, SlotRequest};
use cohort_master::*;
use shared::{FinalApplicationStatus, HostCount};

use super::fixtures::TestFixtures;

pub type TestOrchestrator = Orchestrator<ScriptedResourceManager, ScriptedNodeManager>;

/// Upper bound for any run that is expected to finish
pub const RUN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ClusterRecord {
    requests: Vec<SlotRequest>,
    released: Vec<SlotId>,
    unregistered: Option<(FinalApplicationStatus, String)>,
    stopped: bool,
    started: Vec<(SlotGrant, String)>,
    stopped_slots: Vec<SlotId>,
}

/// Resource manager whose feed is driven by the test
pub struct ScriptedResourceManager {
    feed: StdMutex<Option<mpsc::Receiver<ResourceEvent>>>,
    record: Arc<StdMutex<ClusterRecord>>,
}

#[async_trait]
impl ResourceManager for ScriptedResourceManager {
    async fn register(&self) -> MasterResult<mpsc::Receiver<ResourceEvent>> {
        self.feed
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| MasterError::transport("already registered"))
    }

    async fn request_slots(&self, request: SlotRequest) -> MasterResult<()> {
        self.record.lock().unwrap().requests.push(request);
        Ok(())
    }

    async fn release_slot(&self, slot_id: SlotId) -> MasterResult<()> {
        self.record.lock().unwrap().released.push(slot_id);
        Ok(())
    }

    async fn unregister(&self, status: FinalApplicationStatus, report: String) -> MasterResult<()> {
        self.record.lock().unwrap().unregistered = Some((status, report));
        Ok(())
    }

    async fn stop(&self) {
        self.record.lock().unwrap().stopped = true;
    }
}

/// How the scripted node manager reacts to start requests
#[derive(Debug, Clone, Default)]
pub struct NodeScript {
    auto_complete: bool,
    exit_codes: HashMap<String, i32>,
    failing_hosts: HashSet<String>,
}

impl NodeScript {
    /// Every started slot reports completion right away (exit 0 unless scripted)
    pub fn auto_complete() -> Self {
        Self {
            auto_complete: true,
            ..Self::default()
        }
    }

    /// Completions are only delivered by the test
    pub fn manual() -> Self {
        Self::default()
    }

    pub fn exit_code(mut self, slot_id: impl Into<String>, code: i32) -> Self {
        self.exit_codes.insert(slot_id.into(), code);
        self
    }

    pub fn failing_host(mut self, host: impl Into<String>) -> Self {
        self.failing_hosts.insert(host.into());
        self
    }
}

/// Node manager that records start requests instead of running anything
pub struct ScriptedNodeManager {
    feed: mpsc::WeakSender<ResourceEvent>,
    script: NodeScript,
    record: Arc<StdMutex<ClusterRecord>>,
}

#[async_trait]
impl NodeManager for ScriptedNodeManager {
    async fn start_slot(&self, grant: SlotGrant, command: String) -> MasterResult<()> {
        if self.script.failing_hosts.contains(&grant.host) {
            return Err(MasterError::SlotStartFailed {
                slot_id: grant.slot_id.to_string(),
                host: grant.host,
                message: "host refused the process".to_string(),
            });
        }

        let slot_id = grant.slot_id.clone();
        self.record.lock().unwrap().started.push((grant, command));

        if self.script.auto_complete {
            let exit_code = self.script.exit_codes.get(slot_id.as_str()).copied().unwrap_or(0);
            if let Some(feed) = self.feed.upgrade() {
                let _ = feed
                    .send(ResourceEvent::Completed(vec![SlotCompletion::new(slot_id.as_str(), exit_code)]))
                    .await;
            }
        }
        Ok(())
    }

    async fn stop_slot(&self, slot_id: SlotId) -> MasterResult<()> {
        self.record.lock().unwrap().stopped_slots.push(slot_id);
        Ok(())
    }
}

/// Test-side handle on the scripted cluster
pub struct ClusterHarness {
    feed: mpsc::Sender<ResourceEvent>,
    record: Arc<StdMutex<ClusterRecord>>,
}

impl ClusterHarness {
    pub fn new(script: NodeScript) -> (Self, ScriptedResourceManager, ScriptedNodeManager) {
        let (feed, rx) = mpsc::channel(64);
        let record = Arc::new(StdMutex::new(ClusterRecord::default()));

        let resource_manager = ScriptedResourceManager {
            feed: StdMutex::new(Some(rx)),
            record: Arc::clone(&record),
        };
        let node_manager = ScriptedNodeManager {
            feed: feed.downgrade(),
            script,
            record: Arc::clone(&record),
        };
        (Self { feed, record }, resource_manager, node_manager)
    }

    /// Orchestrator over a fresh harness
    pub fn orchestrator(spec: CohortSpec, script: NodeScript) -> (Self, TestOrchestrator) {
        let (harness, resource_manager, node_manager) = Self::new(script);
        (harness, Orchestrator::new(spec, resource_manager, node_manager))
    }

    pub async fn grant(&self, grants: Vec<SlotGrant>) {
        self.send(ResourceEvent::Allocated(grants)).await;
    }

    pub async fn complete(&self, completions: Vec<SlotCompletion>) {
        self.send(ResourceEvent::Completed(completions)).await;
    }

    pub async fn fail(&self, message: &str) {
        self.send(ResourceEvent::Error(message.to_string())).await;
    }

    pub async fn send(&self, event: ResourceEvent) {
        self.feed.send(event).await.expect("feed receiver dropped");
    }

    /// Drop the test's sender so the feed closes
    pub fn close(self) -> ClusterRecordView {
        ClusterRecordView { record: self.record }
    }

    pub fn requests(&self) -> Vec<SlotRequest> {
        self.record.lock().unwrap().requests.clone()
    }

    pub fn released(&self) -> Vec<SlotId> {
        self.record.lock().unwrap().released.clone()
    }

    pub fn unregistered(&self) -> Option<(FinalApplicationStatus, String)> {
        self.record.lock().unwrap().unregistered.clone()
    }

    pub fn stopped(&self) -> bool {
        self.record.lock().unwrap().stopped
    }

    pub fn stopped_slots(&self) -> Vec<SlotId> {
        self.record.lock().unwrap().stopped_slots.clone()
    }

    /// Start requests keyed by slot id
    pub fn started(&self) -> HashMap<String, String> {
        self.record
            .lock()
            .unwrap()
            .started
            .iter()
            .map(|(grant, command)| (grant.slot_id.to_string(), command.clone()))
            .collect()
    }
}

/// Records of a harness whose feed sender has been dropped
pub struct ClusterRecordView {
    record: Arc<StdMutex<ClusterRecord>>,
}

impl ClusterRecordView {
    pub fn stopped(&self) -> bool {
        self.record.lock().unwrap().stopped
    }

    pub fn unregistered(&self) -> Option<(FinalApplicationStatus, String)> {
        self.record.lock().unwrap().unregistered.clone()
    }
}

/// Builder for cohort specs with fixture defaults
pub struct SpecBuilder {
    processes: Option<u32>,
    hosts: Vec<HostCount>,
    test_mode: bool,
    program: PathBuf,
    log_dir: PathBuf,
}

impl SpecBuilder {
    pub fn new() -> Self {
        Self {
            processes: None,
            hosts: Vec::new(),
            test_mode: false,
            program: PathBuf::from(TestFixtures::PROGRAM),
            log_dir: PathBuf::from(TestFixtures::LOG_DIR),
        }
    }

    pub fn processes(mut self, count: u32) -> Self {
        self.processes = Some(count);
        self
    }

    pub fn hosts(mut self, hosts: &[(&str, u32)]) -> Self {
        self.hosts = hosts.iter().map(|(host, count)| HostCount::new(*host, *count)).collect();
        self
    }

    pub fn test_mode(mut self) -> Self {
        self.test_mode = true;
        self
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn build(self) -> CohortSpec {
        CohortSpec::builder()
            .app_id(TestFixtures::APP_ID)
            .program(self.program)
            .log_dir(self.log_dir)
            .port_base(TestFixtures::PORT_BASE)
            .thread_count(TestFixtures::THREADS)
            .maybe_num_processes(self.processes)
            .host_counts(self.hosts)
            .test_mode(self.test_mode)
            .build()
            .expect("fixture spec should be valid")
    }
}

impl Default for SpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper functions for common test operations
pub struct TestHelpers;

impl TestHelpers {
    /// Run the orchestrator, failing the test if it does not finish
    pub async fn run<R, N>(orchestrator: &mut Orchestrator<R, N>) -> MasterResult<FinalStatus>
    where
        R: ResourceManager + 'static,
        N: NodeManager + 'static,
    {
        tokio::time::timeout(RUN_TIMEOUT, orchestrator.run())
            .await
            .expect("orchestrator run timed out")
    }

    /// The `-p` value of a launch command
    pub fn ordinal_in(command: &str) -> u32 {
        command
            .split_whitespace()
            .skip_while(|word| *word != "-p")
            .nth(1)
            .and_then(|ordinal| ordinal.parse().ok())
            .expect("command carries an ordinal")
    }

    /// The `host:port` list of a launch command
    pub fn addresses_in(command: &str) -> Vec<String> {
        command
            .split_whitespace()
            .skip_while(|word| *word != "-h")
            .skip(1)
            .take_while(|word| !word.starts_with("1>"))
            .map(|word| word.trim_end_matches('\'').to_string())
            .collect()
    }
}
