//! Submission of the application master
//!
//! Assembles the master's launch command from the validated cohort options
//! and starts it with stdout and stderr redirected into the log directory.

use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use uuid::Uuid;

use cohort_master::cli::{ClusterArgs, CohortArgs};
use shared::{process_debug, process_info, process_warn, ApplicationReport, ProcessId};

use crate::error::{ClientError, ClientResult};
use crate::traits::MasterHandle;

/// Exit status used when the master was ended by a signal
pub const SIGNALLED_EXIT_CODE: i32 = -1;

/// Name of the master binary expected next to the client
pub fn default_master_binary() -> ClientResult<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(exe.with_file_name(format!("cohort-master{}", std::env::consts::EXE_SUFFIX)))
}

/// A fresh application id, unique per submission
pub fn generate_app_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("application_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}

/// Fully assembled master launch command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterCommand {
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl MasterCommand {
    /// Build the command for an app id and log directory that are already settled
    pub fn new(
        binary: impl Into<PathBuf>,
        cohort: &CohortArgs,
        cluster: &ClusterArgs,
        log_level: &str,
        app_id: &str,
        log_dir: &Path,
    ) -> Self {
        let mut args = cohort.to_args();
        args.extend(cluster.to_args());
        args.push("--log-level".to_string());
        args.push(log_level.to_string());

        Self {
            binary: binary.into(),
            args,
            stdout: log_dir.join(format!("{app_id}-master.stdout")),
            stderr: log_dir.join(format!("{app_id}-master.stderr")),
        }
    }

    /// Start the master
    pub fn spawn(&self) -> ClientResult<ChildMaster> {
        let stdout = File::create(&self.stdout)?;
        let stderr = File::create(&self.stderr)?;

        let child = Command::new(&self.binary)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| ClientError::launch(self.binary.display(), e.to_string()))?;

        process_debug!(
            ProcessId::current(),
            "🚀 Application master running as PID {}",
            child.id().map(|pid| pid.to_string()).unwrap_or_else(|| "?".to_string())
        );
        Ok(ChildMaster { child })
    }
}

impl fmt::Display for MasterCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.binary.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        write!(f, " 1>{} 2>{}", self.stdout.display(), self.stderr.display())
    }
}

/// Validated submission: options with a settled app id and log directory
#[derive(Debug, Clone)]
pub struct Submission {
    pub app_id: String,
    pub log_dir: PathBuf,
    pub command: MasterCommand,
}

impl Submission {
    /// Validate the cohort options and assemble the master command
    ///
    /// A missing app id is generated here so the client and master agree on
    /// the report location.
    pub fn prepare(
        master_binary: impl Into<PathBuf>,
        mut cohort: CohortArgs,
        cluster: &ClusterArgs,
        log_level: &str,
    ) -> ClientResult<Self> {
        let app_id = cohort.app_id.get_or_insert_with(generate_app_id).clone();
        let spec = cohort.cohort_spec()?;
        let log_dir = spec.log_dir().to_path_buf();

        let command = MasterCommand::new(master_binary, &cohort, cluster, log_level, &app_id, &log_dir);
        Ok(Self {
            app_id,
            log_dir,
            command,
        })
    }

    /// Where the master leaves its final report
    pub fn report_path(&self) -> PathBuf {
        ApplicationReport::path_for(&self.log_dir, &self.app_id)
    }

    /// Create the log directory and start the master
    ///
    /// A report left by an earlier run with the same app id is removed first,
    /// so the outcome always comes from this master.
    pub async fn launch(&self) -> ClientResult<ChildMaster> {
        tokio::fs::create_dir_all(&self.log_dir).await?;
        self.remove_stale_report().await?;
        process_info!(
            ProcessId::current(),
            "📨 Submitting application {} with command: {}",
            self.app_id,
            self.command
        );
        self.command.spawn()
    }

    async fn remove_stale_report(&self) -> ClientResult<()> {
        let path = self.report_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                process_warn!(
                    ProcessId::current(),
                    "⚠️ Removed report {} left by an earlier run of {}",
                    path.display(),
                    self.app_id
                );
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A master started as a child process
#[derive(Debug)]
pub struct ChildMaster {
    child: Child,
}

#[async_trait]
impl MasterHandle for ChildMaster {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn try_exit_code(&mut self) -> ClientResult<Option<i32>> {
        let status = self.child.try_wait()?;
        Ok(status.map(|status| status.code().unwrap_or(SIGNALLED_EXIT_CODE)))
    }

    async fn interrupt(&mut self) -> ClientResult<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                return signal::kill(Pid::from_raw(pid as i32), Signal::SIGINT).map_err(|e| {
                    ClientError::SignalFailed {
                        message: e.to_string(),
                    }
                });
            }
        }

        self.child.start_kill().map_err(|e| ClientError::SignalFailed {
            message: e.to_string(),
        })
    }
}
