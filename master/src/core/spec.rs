//! Cohort specification
//!
//! Immutable description of the cohort to launch. Every value is validated
//! once, before any slot is requested.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use shared::HostCount;

use crate::error::{MasterError, MasterResult};

pub const DEFAULT_APP_ID: &str = "Unknown";
pub const DEFAULT_PORT_BASE: u32 = 2100;
pub const DEFAULT_THREAD_COUNT: u32 = 1;
pub const DEFAULT_CONTAINER_MEMORY_MB: u32 = 2048;
pub const DEFAULT_CONTAINER_VCORES: u32 = 1;
pub const DEFAULT_APP_PRIORITY: u32 = 1;

/// Resources asked for every slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotResources {
    pub memory_mb: u32,
    pub vcores: u32,
    pub priority: u32,
}

impl Default for SlotResources {
    fn default() -> Self {
        Self {
            memory_mb: DEFAULT_CONTAINER_MEMORY_MB,
            vcores: DEFAULT_CONTAINER_VCORES,
            priority: DEFAULT_APP_PRIORITY,
        }
    }
}

/// A single slot request sent to the resource manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRequest {
    /// Required host, or `None` to accept any host
    pub host: Option<String>,
    pub resources: SlotResources,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortSpec {
    requested_count: u32,
    host_counts: Vec<HostCount>,
    port_base: u16,
    thread_count: u32,
    program: PathBuf,
    test_mode: bool,
    app_id: String,
    log_dir: PathBuf,
    resources: SlotResources,
}

impl CohortSpec {
    pub fn builder() -> CohortSpecBuilder {
        CohortSpecBuilder::default()
    }

    pub fn requested_count(&self) -> u32 {
        self.requested_count
    }

    pub fn host_counts(&self) -> &[HostCount] {
        &self.host_counts
    }

    pub fn port_base(&self) -> u16 {
        self.port_base
    }

    pub fn thread_count(&self) -> u32 {
        self.thread_count
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn resources(&self) -> SlotResources {
        self.resources
    }

    /// One request per process: host-affine in `host_counts` order, otherwise anywhere
    pub fn slot_requests(&self) -> Vec<SlotRequest> {
        if self.host_counts.is_empty() {
            return (0..self.requested_count)
                .map(|_| SlotRequest {
                    host: None,
                    resources: self.resources,
                })
                .collect();
        }

        self.host_counts
            .iter()
            .flat_map(|hc| {
                (0..hc.count).map(move |_| SlotRequest {
                    host: Some(hc.host.clone()),
                    resources: self.resources,
                })
            })
            .collect()
    }
}

/// Collects raw option values and validates them into a [`CohortSpec`]
#[derive(Debug, Clone, Default)]
pub struct CohortSpecBuilder {
    num_processes: Option<u32>,
    host_counts: Vec<HostCount>,
    port_base: Option<u32>,
    thread_count: Option<u32>,
    program: Option<PathBuf>,
    test_mode: bool,
    app_id: Option<String>,
    log_dir: Option<PathBuf>,
    resources: SlotResources,
}

impl CohortSpecBuilder {
    pub fn num_processes(mut self, count: u32) -> Self {
        self.num_processes = Some(count);
        self
    }

    pub fn maybe_num_processes(mut self, count: Option<u32>) -> Self {
        self.num_processes = count;
        self
    }

    pub fn host_counts(mut self, hosts: Vec<HostCount>) -> Self {
        self.host_counts = hosts;
        self
    }

    pub fn port_base(mut self, port: u32) -> Self {
        self.port_base = Some(port);
        self
    }

    pub fn thread_count(mut self, threads: u32) -> Self {
        self.thread_count = Some(threads);
        self
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    pub fn resources(mut self, resources: SlotResources) -> Self {
        self.resources = resources;
        self
    }

    pub fn build(self) -> MasterResult<CohortSpec> {
        let log_dir = self
            .log_dir
            .ok_or_else(|| MasterError::config("Log directory of application master is not set"))?;

        if self.resources.vcores == 0 {
            return Err(MasterError::config(
                "Illegal number of virtual cores specified for container. Specified number of vcores: 0",
            ));
        }
        if self.resources.priority == 0 {
            return Err(MasterError::config(
                "Illegal priority for application. Specified priority: 0",
            ));
        }

        let program = self
            .program
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| MasterError::config("The path to the worker program is not given"))?;

        let hosts_total: u32 = self.host_counts.iter().map(|hc| hc.count).sum();
        let requested_count = match self.num_processes {
            Some(0) => {
                return Err(MasterError::config(
                    "Illegal number of processes specified. Specified number: 0",
                ));
            }
            Some(n) if !self.host_counts.is_empty() && n != hosts_total => {
                return Err(MasterError::config(format!(
                    "Illegal number of processes specified, which is different from the number of processes in `hosts`. \
                     Number of processes given: {n}, number in hosts: {hosts_total}"
                )));
            }
            Some(n) => n,
            None if !self.host_counts.is_empty() => hosts_total,
            None => {
                return Err(MasterError::config(
                    "Either `hosts` or `num_process` needs to be specified",
                ));
            }
        };
        if requested_count == 0 {
            return Err(MasterError::config("`hosts` does not ask for any process"));
        }

        let thread_count = self.thread_count.unwrap_or(DEFAULT_THREAD_COUNT);
        if thread_count == 0 {
            return Err(MasterError::config(
                "Illegal number of threads specified. Specified number: 0",
            ));
        }

        let port = self.port_base.unwrap_or(DEFAULT_PORT_BASE);
        if !(port > 0 && port < 65536) {
            return Err(MasterError::config(format!(
                "Illegal port specified. Specified port: {port}"
            )));
        }

        // Every process on the busiest host needs its own port above the base.
        let busiest_host = if self.host_counts.is_empty() {
            requested_count
        } else {
            let mut per_host: BTreeMap<&str, u32> = BTreeMap::new();
            for hc in &self.host_counts {
                *per_host.entry(hc.host.as_str()).or_default() += hc.count;
            }
            per_host.values().copied().max().unwrap_or(0)
        };
        if u64::from(port) + u64::from(busiest_host) - 1 > u64::from(u16::MAX) {
            return Err(MasterError::config(format!(
                "Illegal port specified. Port {port} leaves no room for {busiest_host} processes on one host"
            )));
        }

        Ok(CohortSpec {
            requested_count,
            host_counts: self.host_counts,
            port_base: port as u16,
            thread_count,
            program,
            test_mode: self.test_mode,
            app_id: self.app_id.unwrap_or_else(|| DEFAULT_APP_ID.to_string()),
            log_dir,
            resources: self.resources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> CohortSpecBuilder {
        CohortSpec::builder().program("/opt/worker").log_dir("/tmp/logs")
    }

    #[test]
    fn test_defaults_applied() {
        let spec = base().num_processes(3).build().unwrap();

        assert_eq!(spec.requested_count(), 3);
        assert_eq!(spec.port_base(), 2100);
        assert_eq!(spec.thread_count(), 1);
        assert_eq!(spec.app_id(), "Unknown");
        assert!(!spec.test_mode());
        assert_eq!(spec.resources(), SlotResources::default());
        assert!(spec.host_counts().is_empty());
    }

    #[test]
    fn test_count_derived_from_hosts() {
        let spec = base()
            .host_counts(vec![HostCount::new("n1", 2), HostCount::new("n2", 1)])
            .build()
            .unwrap();
        assert_eq!(spec.requested_count(), 3);
    }

    #[test]
    fn test_mismatched_hosts_and_count_rejected() {
        let err = base()
            .num_processes(4)
            .host_counts(vec![HostCount::new("n1", 2), HostCount::new("n2", 1)])
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("different from the number"));
    }

    #[test]
    fn test_missing_required_values_rejected() {
        assert!(base().build().is_err(), "needs num_process or hosts");
        assert!(base().num_processes(0).build().is_err());
        assert!(CohortSpec::builder().num_processes(1).log_dir("/tmp").build().is_err());
        assert!(CohortSpec::builder().num_processes(1).program("/bin/w").build().is_err());
        assert!(base().num_processes(1).program("").build().is_err());
    }

    #[test]
    fn test_numeric_ranges_validated() {
        assert!(base().num_processes(1).thread_count(0).build().is_err());
        assert!(base().num_processes(1).port_base(0).build().is_err());
        assert!(base().num_processes(1).port_base(65536).build().is_err());
        assert!(base().num_processes(1).port_base(65535).build().is_ok());
        assert!(base().num_processes(2).port_base(65535).build().is_err());

        let no_cores = SlotResources {
            vcores: 0,
            ..SlotResources::default()
        };
        assert!(base().num_processes(1).resources(no_cores).build().is_err());

        let no_priority = SlotResources {
            priority: 0,
            ..SlotResources::default()
        };
        assert!(base().num_processes(1).resources(no_priority).build().is_err());
    }

    #[test]
    fn test_port_room_checked_per_host() {
        // 2 on n1 and 2 on n2 only need two ports above the base
        let spec = base()
            .host_counts(vec![HostCount::new("n1", 2), HostCount::new("n2", 2)])
            .port_base(65534)
            .build();
        assert!(spec.is_ok());

        let spec = base()
            .host_counts(vec![HostCount::new("n1", 2), HostCount::new("n1", 1)])
            .port_base(65534)
            .build();
        assert!(spec.is_err());
    }

    #[test]
    fn test_slot_requests_follow_host_order() {
        let spec = base()
            .host_counts(vec![HostCount::new("n2", 1), HostCount::new("n1", 2)])
            .build()
            .unwrap();

        let hosts: Vec<_> = spec.slot_requests().into_iter().map(|r| r.host).collect();
        assert_eq!(
            hosts,
            vec![Some("n2".to_string()), Some("n1".to_string()), Some("n1".to_string())]
        );
    }

    #[test]
    fn test_slot_requests_anywhere_without_hosts() {
        let spec = base().num_processes(4).build().unwrap();
        let requests = spec.slot_requests();
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|r| r.host.is_none()));
    }
}
