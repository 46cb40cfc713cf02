//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::errors::{SharedError, SharedResult};

/// Global process ID singleton - set once at startup
static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();

/// Used when a library is exercised without a binary having set the role
static DEFAULT_PROCESS_ID: ProcessId = ProcessId::Master;

/// Role of the running process, stamped on every log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    /// Submission client that starts and monitors the master
    Client,
    /// Application master coordinating the cohort
    Master,
}

impl ProcessId {
    /// Initialize the global process ID for the submission client
    pub fn init_client() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Client)
    }

    /// Initialize the global process ID for the application master
    pub fn init_master() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Master)
    }

    /// Get the global process ID, defaulting to the master role
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get().unwrap_or(&DEFAULT_PROCESS_ID)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Client => write!(f, "client"),
            ProcessId::Master => write!(f, "master"),
        }
    }
}

/// Desired number of processes on one host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostCount {
    pub host: String,
    pub count: u32,
}

impl HostCount {
    pub fn new(host: impl Into<String>, count: u32) -> Self {
        Self {
            host: host.into(),
            count,
        }
    }
}

impl fmt::Display for HostCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.count)
    }
}

/// Parse `host1:num1,host2:num2,...`, keeping the given order
pub fn parse_host_counts(input: &str) -> SharedResult<Vec<HostCount>> {
    let invalid = || SharedError::InvalidHostList {
        input: input.to_string(),
    };

    input
        .split(',')
        .map(|pair| {
            let (host, count) = pair.trim().split_once(':').ok_or_else(invalid)?;
            let host = host.trim();
            let count: u32 = count.trim().parse().map_err(|_| invalid())?;
            if host.is_empty() || count == 0 {
                return Err(invalid());
            }
            Ok(HostCount::new(host, count))
        })
        .collect()
}

/// Render host counts back into the `host1:num1,host2:num2` form
pub fn format_host_counts(hosts: &[HostCount]) -> String {
    hosts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Final verdict recorded for an application run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalApplicationStatus {
    Succeeded,
    Failed,
    Killed,
    Undefined,
}

impl fmt::Display for FinalApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalApplicationStatus::Succeeded => write!(f, "SUCCEEDED"),
            FinalApplicationStatus::Failed => write!(f, "FAILED"),
            FinalApplicationStatus::Killed => write!(f, "KILLED"),
            FinalApplicationStatus::Undefined => write!(f, "UNDEFINED"),
        }
    }
}

impl FromStr for FinalApplicationStatus {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SUCCEEDED" => Ok(FinalApplicationStatus::Succeeded),
            "FAILED" => Ok(FinalApplicationStatus::Failed),
            "KILLED" => Ok(FinalApplicationStatus::Killed),
            "UNDEFINED" => Ok(FinalApplicationStatus::Undefined),
            _ => Err(SharedError::InvalidConfig {
                field: "final_status".to_string(),
                value: s.to_string(),
            }),
        }
    }
}
