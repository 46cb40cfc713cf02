//! Main entry point for the submission client binary

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;

use cohort_client::{
    monitor::DEFAULT_POLL_MS, submit::default_master_binary, ApplicationMonitor, ClientResult, MasterHandle,
    Submission,
};
use cohort_master::cli::{ClusterArgs, CohortArgs};
use shared::{logging, process_debug, ProcessId};

/// Submits a cohort to the application master and waits for its verdict
#[derive(Parser, Debug)]
#[command(name = "cohort-client")]
#[command(about = "Starts the cohort application master and reports its final status")]
pub struct Args {
    #[command(flatten)]
    pub cohort: CohortArgs,

    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Path to the master binary (defaults to `cohort-master` next to this binary)
    #[arg(long, env = "COHORT_MASTER_BINARY")]
    pub master_binary: Option<PathBuf>,

    /// How often to check on the master, in milliseconds
    #[arg(long, env = "COHORT_POLL_MS", default_value_t = DEFAULT_POLL_MS)]
    pub poll_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "COHORT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> ClientResult<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    ProcessId::init_client();
    logging::init_tracing_with_level(Some(&args.log_level));

    let master_binary = match args.master_binary {
        Some(path) => path,
        None => default_master_binary()?,
    };

    let submission = match Submission::prepare(master_binary, args.cohort, &args.cluster, &args.log_level) {
        Ok(submission) => submission,
        Err(e) => {
            logging::log_error(ProcessId::current(), "Invalid cohort options", &e);
            return Err(e);
        }
    };

    logging::log_startup(ProcessId::current(), &format!("submission of {}", submission.app_id));
    let mut master = submission.launch().await?;
    process_debug!(ProcessId::current(), "Monitoring master PID {:?}", master.id());

    // Forward Ctrl+C to the master
    let (interrupt_tx, interrupt_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                logging::log_shutdown(ProcessId::current(), "Received Ctrl+C signal");
                let _ = interrupt_tx.send(()).await;
            }
            Err(err) => {
                logging::log_error(ProcessId::current(), "Signal handling", &err);
            }
        }
    });

    let monitor = ApplicationMonitor::new(submission.app_id.clone(), submission.log_dir.clone())
        .with_poll_interval(Duration::from_millis(args.poll_ms));
    let outcome = monitor.monitor(&mut master, interrupt_rx).await?;

    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
