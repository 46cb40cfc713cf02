//! Main entry point for the application master binary
//!
//! Validates the cohort options, wires the orchestrator to the local cluster
//! and runs the cohort to completion.

use clap::Parser;
use tokio::signal;

use cohort_master::{
    cli::{ClusterArgs, CohortArgs},
    services::LocalCluster,
    MasterResult, Orchestrator,
};
use shared::{format_host_counts, logging, process_debug, process_info, ProcessId};

/// Application master that launches a fixed-size cohort of cooperating processes
#[derive(Parser, Debug)]
#[command(name = "cohort-master")]
#[command(about = "Launches a cohort of worker processes once every slot is granted")]
pub struct Args {
    #[command(flatten)]
    pub cohort: CohortArgs,

    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "COHORT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> MasterResult<()> {
    // Load .env before clap reads environment fallbacks
    dotenv::dotenv().ok();
    let args = Args::parse();

    ProcessId::init_master();
    logging::init_tracing_with_level(Some(&args.log_level));

    let spec = match args.cohort.cohort_spec() {
        Ok(spec) => spec,
        Err(e) => {
            logging::log_error(ProcessId::current(), "Invalid cohort options", &e);
            return Err(e);
        }
    };

    process_info!(
        ProcessId::current(),
        "🧾 Cohort of {} processes running {}",
        spec.requested_count(),
        spec.program().display()
    );
    if !spec.host_counts().is_empty() {
        process_debug!(ProcessId::current(), "Host layout: {}", format_host_counts(spec.host_counts()));
    }

    let (resource_manager, node_manager) = LocalCluster::new(args.cluster.cluster_config(&spec));
    let mut orchestrator = Orchestrator::new(spec, resource_manager, node_manager);

    // Set up graceful shutdown
    let shutdown_sender = orchestrator.get_shutdown_sender();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                logging::log_shutdown(ProcessId::current(), "Received Ctrl+C signal");
                let _ = shutdown_sender.send(()).await;
            }
            Err(err) => {
                logging::log_error(ProcessId::current(), "Signal handling", &err);
            }
        }
    });

    let status = orchestrator.run().await?;
    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
