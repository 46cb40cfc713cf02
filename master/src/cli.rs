//! Command line options shared by the master and the submission client
//!
//! The client validates the same options the master does and forwards them
//! verbatim, so both binaries flatten these structs into their parsers.

use std::path::PathBuf;
use std::time::Duration;

use shared::parse_host_counts;

use crate::core::spec::{
    DEFAULT_APP_PRIORITY, DEFAULT_CONTAINER_MEMORY_MB, DEFAULT_CONTAINER_VCORES, DEFAULT_PORT_BASE,
    DEFAULT_THREAD_COUNT,
};
use crate::core::{CohortSpec, SlotResources};
use crate::error::MasterResult;
use crate::services::local_cluster::{DEFAULT_CLUSTER_HOST, DEFAULT_HEARTBEAT_MS};
use crate::services::LocalClusterConfig;

/// Options describing the cohort to launch
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct CohortArgs {
    /// Application id used in slot ids, log file names and the final report
    #[arg(long, env = "COHORT_APP_ID")]
    pub app_id: Option<String>,

    /// Directory for worker logs and the application report
    #[arg(long, env = "COHORT_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Memory in MB asked for every slot
    #[arg(long, env = "COHORT_CONTAINER_MEMORY", default_value_t = DEFAULT_CONTAINER_MEMORY_MB)]
    pub container_memory: u32,

    /// Virtual cores asked for every slot
    #[arg(long, env = "COHORT_CONTAINER_VCORES", default_value_t = DEFAULT_CONTAINER_VCORES)]
    pub container_vcores: u32,

    /// Priority of the slot requests
    #[arg(long, env = "COHORT_APP_PRIORITY", default_value_t = DEFAULT_APP_PRIORITY)]
    pub app_priority: u32,

    /// Worker program every process runs
    #[arg(long, env = "COHORT_PROGRAM")]
    pub program: Option<PathBuf>,

    /// First port on every host
    #[arg(long, env = "COHORT_PORT", default_value_t = DEFAULT_PORT_BASE)]
    pub port: u32,

    /// Total number of processes
    #[arg(long, env = "COHORT_NUM_PROCESS")]
    pub num_process: Option<u32>,

    /// Processes per host, as `host1:num1,host2:num2,...`
    #[arg(long, env = "COHORT_HOSTS")]
    pub hosts: Option<String>,

    /// Threads per worker process
    #[arg(long, env = "COHORT_NUM_THREAD", default_value_t = DEFAULT_THREAD_COUNT)]
    pub num_thread: u32,

    /// Wrap each worker command in an echo instead of running it
    #[arg(long, env = "COHORT_TEST")]
    pub test: bool,
}

impl CohortArgs {
    /// Validate the options into a cohort specification
    pub fn cohort_spec(&self) -> MasterResult<CohortSpec> {
        let host_counts = match &self.hosts {
            Some(hosts) => parse_host_counts(hosts)?,
            None => Vec::new(),
        };

        let mut builder = CohortSpec::builder()
            .maybe_num_processes(self.num_process)
            .host_counts(host_counts)
            .port_base(self.port)
            .thread_count(self.num_thread)
            .test_mode(self.test)
            .resources(SlotResources {
                memory_mb: self.container_memory,
                vcores: self.container_vcores,
                priority: self.app_priority,
            });
        if let Some(app_id) = &self.app_id {
            builder = builder.app_id(app_id.clone());
        }
        if let Some(log_dir) = &self.log_dir {
            builder = builder.log_dir(log_dir.clone());
        }
        if let Some(program) = &self.program {
            builder = builder.program(program.clone());
        }
        builder.build()
    }

    /// Render the options back into command line arguments
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let mut push = |flag: &str, value: String| {
            args.push(format!("--{flag}"));
            args.push(value);
        };

        if let Some(app_id) = &self.app_id {
            push("app-id", app_id.clone());
        }
        if let Some(log_dir) = &self.log_dir {
            push("log-dir", log_dir.display().to_string());
        }
        push("container-memory", self.container_memory.to_string());
        push("container-vcores", self.container_vcores.to_string());
        push("app-priority", self.app_priority.to_string());
        if let Some(program) = &self.program {
            push("program", program.display().to_string());
        }
        push("port", self.port.to_string());
        if let Some(num_process) = self.num_process {
            push("num-process", num_process.to_string());
        }
        if let Some(hosts) = &self.hosts {
            push("hosts", hosts.clone());
        }
        push("num-thread", self.num_thread.to_string());
        if self.test {
            args.push("--test".to_string());
        }
        args
    }
}

/// Options for the local cluster the master runs on
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct ClusterArgs {
    /// Host labels offered by the local cluster
    #[arg(long, env = "COHORT_CLUSTER_HOSTS", value_delimiter = ',', default_value = DEFAULT_CLUSTER_HOST)]
    pub cluster_hosts: Vec<String>,

    /// Local cluster heartbeat in milliseconds
    #[arg(long, env = "COHORT_HEARTBEAT_MS", default_value_t = DEFAULT_HEARTBEAT_MS)]
    pub heartbeat_ms: u64,
}

impl ClusterArgs {
    pub fn cluster_config(&self, spec: &CohortSpec) -> LocalClusterConfig {
        LocalClusterConfig::new(spec.app_id(), spec.log_dir())
            .with_hosts(self.cluster_hosts.clone())
            .with_heartbeat(Duration::from_millis(self.heartbeat_ms))
    }

    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--cluster-hosts".to_string(),
            self.cluster_hosts.join(","),
            "--heartbeat-ms".to_string(),
            self.heartbeat_ms.to_string(),
        ]
    }
}
