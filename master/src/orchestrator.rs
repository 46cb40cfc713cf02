//! Application master orchestration
//!
//! Registers with the resource manager, asks for the whole cohort, routes the
//! resulting event feed into the allocation barrier and completion quorum, and
//! reports the final verdict once every process has exited.

use std::sync::Arc;

use shared::{logging, process_debug, process_error, process_info, process_warn, FinalApplicationStatus, ProcessId};
use tokio::sync::mpsc;

use crate::core::{
    AllocationBarrier, CohortSpec, CompletionQuorum, FinalStatus, LaunchDispatcher, SlotCompletion, SlotGrant,
    StatusReport,
};
use crate::error::{MasterError, MasterResult};
use crate::traits::{NodeManager, ResourceEvent, ResourceManager};

/// Main orchestrator that coordinates one cohort run
pub struct Orchestrator<R, N>
where
    R: ResourceManager + 'static,
    N: NodeManager + 'static,
{
    spec: Arc<CohortSpec>,

    /// Injected services
    resource_manager: R,

    /// Coordination state
    allocation: Arc<AllocationBarrier>,
    completion: Arc<CompletionQuorum>,
    dispatcher: LaunchDispatcher<N>,

    /// Shutdown signal
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

enum RunEnd {
    Quorum,
    Interrupted,
}

impl<R, N> Orchestrator<R, N>
where
    R: ResourceManager + 'static,
    N: NodeManager + 'static,
{
    /// Create new orchestrator with injected dependencies
    pub fn new(spec: CohortSpec, resource_manager: R, node_manager: N) -> Self {
        let spec = Arc::new(spec);
        let allocation = Arc::new(AllocationBarrier::new(Arc::clone(&spec)));
        let completion = Arc::new(CompletionQuorum::new(spec.requested_count() as usize));
        let dispatcher = LaunchDispatcher::new(Arc::new(node_manager), Arc::clone(&allocation));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Self {
            spec,
            resource_manager,
            allocation,
            completion,
            dispatcher,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn spec(&self) -> &CohortSpec {
        &self.spec
    }

    pub fn allocation(&self) -> Arc<AllocationBarrier> {
        Arc::clone(&self.allocation)
    }

    pub fn completion(&self) -> Arc<CompletionQuorum> {
        Arc::clone(&self.completion)
    }

    /// Get shutdown sender for external shutdown requests
    pub fn get_shutdown_sender(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run the cohort to completion
    ///
    /// Blocks until every requested process has reported an exit status. If
    /// the resource manager never grants the whole cohort, or a process never
    /// starts, this does not return until an external shutdown is requested.
    pub async fn run(&mut self) -> MasterResult<FinalStatus> {
        logging::log_startup(
            ProcessId::current(),
            &format!("application master for {}", self.spec.app_id()),
        );

        process_debug!(ProcessId::current(), "📝 Registering with the resource manager");
        let mut feed = self.resource_manager.register().await?;
        process_debug!(ProcessId::current(), "📝 Registered with the resource manager");

        process_info!(
            ProcessId::current(),
            "📨 Asking the resource manager for {} slots",
            self.spec.requested_count()
        );
        for request in self.spec.slot_requests() {
            if let Err(e) = self.resource_manager.request_slots(request).await {
                return Err(self.abandon(e).await);
            }
        }

        let end = loop {
            tokio::select! {
                _ = self.completion.await_quorum() => break RunEnd::Quorum,

                event = feed.recv() => {
                    let result = match event {
                        Some(event) => self.handle_event(event).await,
                        None => Err(MasterError::transport("resource manager feed closed")),
                    };
                    if let Err(e) = result {
                        return Err(self.abandon(e).await);
                    }
                },

                Some(_) = self.shutdown_rx.recv() => break RunEnd::Interrupted,
            }
        };

        let report = self.status_report().await;
        let status = match end {
            RunEnd::Quorum => {
                self.dispatcher.join_all().await;
                FinalStatus::from_report(report)
            }
            RunEnd::Interrupted => {
                logging::log_shutdown(ProcessId::current(), "interrupted before all processes completed");
                let cancelled = self.dispatcher.cancel_pending().await;
                process_debug!(ProcessId::current(), "🛑 Cancelled {} pending launches", cancelled);
                self.dispatcher.stop_launched().await;
                FinalStatus::interrupted(report)
            }
        };

        match status.state {
            FinalApplicationStatus::Succeeded => logging::log_success(ProcessId::current(), &status.report),
            _ => process_error!(ProcessId::current(), "❌ Cohort failed. {}", status.report),
        }

        self.resource_manager
            .unregister(status.state, status.report.clone())
            .await?;
        process_debug!(ProcessId::current(), "📝 Unregistered from the resource manager");

        Ok(status)
    }

    /// Route one event from the resource manager feed
    async fn handle_event(&self, event: ResourceEvent) -> MasterResult<()> {
        match event {
            ResourceEvent::Allocated(batch) => self.handle_allocated(batch).await,
            ResourceEvent::Completed(batch) => {
                self.handle_completed(batch).await;
                Ok(())
            }
            ResourceEvent::ShutdownRequested => {
                process_warn!(
                    ProcessId::current(),
                    "⚠️ Resource manager requested shutdown; continuing until the cohort completes"
                );
                Ok(())
            }
            ResourceEvent::Error(message) => Err(MasterError::transport(message)),
        }
    }

    async fn handle_allocated(&self, batch: Vec<SlotGrant>) -> MasterResult<()> {
        process_info!(ProcessId::current(), "📦 Resource manager granted {} slots", batch.len());

        let outcome = self.allocation.on_grants(batch).await;

        for grant in outcome.duplicates {
            process_warn!(
                ProcessId::current(),
                "⚠️ Slot {} on {} was granted twice; ignoring the repeat",
                grant.slot_id,
                grant.host
            );
        }
        for grant in outcome.surplus {
            process_warn!(
                ProcessId::current(),
                "⚠️ Releasing surplus slot {} on {}",
                grant.slot_id,
                grant.host
            );
            if let Err(e) = self.resource_manager.release_slot(grant.slot_id.clone()).await {
                process_warn!(ProcessId::current(), "⚠️ Failed to release slot {}: {}", grant.slot_id, e);
            }
        }

        self.dispatcher.dispatch(outcome.assigned).await;

        if let Some(plan) = outcome.opened {
            process_info!(
                ProcessId::current(),
                "🧭 Slots are ready. Command template is `{}`. Launching {} worker processes",
                plan.template,
                plan.table.len()
            );
        }
        Ok(())
    }

    async fn handle_completed(&self, batch: Vec<SlotCompletion>) {
        let mut members = Vec::with_capacity(batch.len());
        for completion in batch {
            if self.allocation.is_member(&completion.slot_id).await {
                process_info!(
                    ProcessId::current(),
                    "🏁 Slot {} exited with status {}",
                    completion.slot_id,
                    completion.exit_code
                );
                members.push(completion);
            } else {
                process_debug!(
                    ProcessId::current(),
                    "Ignoring completion of slot {} outside the cohort",
                    completion.slot_id
                );
            }
        }

        let outcome = self.completion.on_completions(members).await;
        for completion in &outcome.duplicates {
            process_debug!(
                ProcessId::current(),
                "Ignoring repeated completion of slot {}",
                completion.slot_id
            );
        }

        let counts = self.completion.snapshot().await;
        logging::log_progress(
            ProcessId::current(),
            "Completion",
            &format!(
                "{}/{} processes completed ({:.0}%)",
                counts.completed,
                self.spec.requested_count(),
                self.completion.progress().await * 100.0
            ),
        );
    }

    /// Stop the feed and abandon pending launches after a fatal error
    async fn abandon(&self, error: MasterError) -> MasterError {
        logging::log_error(ProcessId::current(), "Resource manager transport", &error);
        self.resource_manager.stop().await;
        self.dispatcher.cancel_pending().await;
        error
    }

    /// Counts for the final status line
    pub async fn status_report(&self) -> StatusReport {
        let counts = self.completion.snapshot().await;
        StatusReport {
            requested: self.spec.requested_count(),
            allocated: self.allocation.allocated().await as u32,
            completed: counts.completed,
            succeeded: counts.succeeded,
        }
    }
}
