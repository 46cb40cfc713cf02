//! Application monitoring
//!
//! Polls the master once per interval until it exits, then reads the final
//! application report it left behind.

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use shared::{logging, process_debug, process_info, process_warn, ApplicationReport, FinalApplicationStatus, ProcessId};

use crate::error::{ClientError, ClientResult};
use crate::traits::MasterHandle;

pub const DEFAULT_POLL_MS: u64 = 1000;

/// How a submitted application ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationOutcome {
    pub app_id: String,
    pub final_status: FinalApplicationStatus,
    pub diagnostics: String,
    pub master_exit_code: i32,
}

impl ApplicationOutcome {
    pub fn is_success(&self) -> bool {
        self.final_status == FinalApplicationStatus::Succeeded
    }
}

pub struct ApplicationMonitor {
    app_id: String,
    report_path: PathBuf,
    poll_interval: Duration,
}

impl ApplicationMonitor {
    pub fn new(app_id: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        let app_id = app_id.into();
        let report_path = ApplicationReport::path_for(&log_dir.into(), &app_id);
        Self {
            app_id,
            report_path,
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
        }
    }

    /// Configure polling interval (fluent API)
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn report_path(&self) -> &PathBuf {
        &self.report_path
    }

    /// Poll until the master exits
    ///
    /// A message on `interrupt` forwards an interrupt to the master once; the
    /// application is then reported as KILLED regardless of what the master
    /// writes.
    pub async fn monitor<H: MasterHandle>(
        &self,
        master: &mut H,
        mut interrupt: mpsc::Receiver<()>,
    ) -> ClientResult<ApplicationOutcome> {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut killed = false;
        let mut polls: u64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(exit_code) = master.try_exit_code().await? {
                        return self.finish(exit_code, killed).await;
                    }
                    polls += 1;
                    process_debug!(
                        ProcessId::current(),
                        "⏳ Application {} still running ({} polls)",
                        self.app_id,
                        polls
                    );
                },

                Some(_) = interrupt.recv(), if !killed => {
                    logging::log_shutdown(ProcessId::current(), "interrupting application master");
                    master.interrupt().await?;
                    killed = true;
                },
            }
        }
    }

    async fn finish(&self, exit_code: i32, killed: bool) -> ClientResult<ApplicationOutcome> {
        let report = match tokio::fs::read_to_string(&self.report_path).await {
            Ok(json) => Some(ApplicationReport::from_json(&self.report_path, &json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let outcome = match (report, killed) {
            (Some(report), false) => ApplicationOutcome {
                app_id: self.app_id.clone(),
                final_status: report.final_status,
                diagnostics: report.diagnostics,
                master_exit_code: exit_code,
            },
            (report, true) => ApplicationOutcome {
                app_id: self.app_id.clone(),
                final_status: FinalApplicationStatus::Killed,
                diagnostics: report
                    .map(|report| report.diagnostics)
                    .unwrap_or_else(|| "Interrupted before the master reported".to_string()),
                master_exit_code: exit_code,
            },
            (None, false) => {
                return Err(ClientError::ReportMissing {
                    path: self.report_path.display().to_string(),
                    exit_code,
                });
            }
        };

        match outcome.final_status {
            FinalApplicationStatus::Succeeded => {
                logging::log_success(
                    ProcessId::current(),
                    &format!("Application {} completed successfully", self.app_id),
                );
            }
            status => {
                process_warn!(
                    ProcessId::current(),
                    "⚠️ Application {} finished unsuccessfully with {}",
                    self.app_id,
                    status
                );
            }
        }
        process_info!(ProcessId::current(), "📋 {}", outcome.diagnostics);
        Ok(outcome)
    }
}
