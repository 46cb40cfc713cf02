//! Final status of a cohort run

use std::fmt;

use shared::FinalApplicationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub requested: u32,
    pub allocated: u32,
    pub completed: u32,
    pub succeeded: u32,
}

impl StatusReport {
    pub fn failed(&self) -> u32 {
        self.completed.saturating_sub(self.succeeded)
    }

    /// SUCCEEDED only when every requested process exited 0
    pub fn verdict(&self) -> FinalApplicationStatus {
        if self.succeeded == self.requested {
            FinalApplicationStatus::Succeeded
        } else {
            FinalApplicationStatus::Failed
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Requested: {}, Allocated: {}, Completed: {}, Succeeded: {}, Failed: {}",
            self.requested,
            self.allocated,
            self.completed,
            self.succeeded,
            self.failed()
        )
    }
}

/// Outcome of [`crate::Orchestrator::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalStatus {
    pub state: FinalApplicationStatus,
    pub succeeded: u32,
    pub total: u32,
    pub report: String,
}

impl FinalStatus {
    pub fn from_report(report: StatusReport) -> Self {
        Self {
            state: report.verdict(),
            succeeded: report.succeeded,
            total: report.requested,
            report: report.to_string(),
        }
    }

    /// A run cut short before its quorum was reached
    pub fn interrupted(report: StatusReport) -> Self {
        Self {
            state: FinalApplicationStatus::Failed,
            succeeded: report.succeeded,
            total: report.requested,
            report: format!("Interrupted. {report}"),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == FinalApplicationStatus::Succeeded
    }
}
