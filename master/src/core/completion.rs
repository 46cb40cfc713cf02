//! Completion quorum
//!
//! Counts terminal exit statuses until every cohort member has reported.

use std::collections::HashSet;

use super::barrier::{Accumulator, CountingBarrier, Rejection};
use super::slot::{SlotCompletion, SlotId};

/// Aggregate counts at the moment the quorum was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuorumResult {
    pub completed: u32,
    pub succeeded: u32,
}

impl QuorumResult {
    pub fn failed(&self) -> u32 {
        self.completed - self.succeeded
    }
}

#[derive(Default)]
pub struct CompletionTally {
    seen: HashSet<SlotId>,
    counts: QuorumResult,
}

impl Accumulator for CompletionTally {
    type Event = SlotCompletion;
    type Accepted = SlotCompletion;
    type Output = QuorumResult;

    fn is_duplicate(&self, event: &SlotCompletion) -> bool {
        self.seen.contains(&event.slot_id)
    }

    fn accumulate(&mut self, event: SlotCompletion) -> SlotCompletion {
        self.seen.insert(event.slot_id.clone());
        self.counts.completed += 1;
        if event.succeeded() {
            self.counts.succeeded += 1;
        }
        event
    }

    fn finalize(&mut self) -> QuorumResult {
        self.counts
    }
}

/// What one batch of completions did to the tally
#[derive(Debug, Default)]
pub struct CompletionOutcome {
    pub counted: Vec<SlotCompletion>,
    pub duplicates: Vec<SlotCompletion>,
    pub surplus: Vec<SlotCompletion>,
    /// Set only by the batch that reached the quorum
    pub reached: Option<QuorumResult>,
}

pub struct CompletionQuorum {
    barrier: CountingBarrier<CompletionTally>,
}

impl CompletionQuorum {
    pub fn new(expected: usize) -> Self {
        Self {
            barrier: CountingBarrier::new(expected, CompletionTally::default()),
        }
    }

    pub fn expected(&self) -> usize {
        self.barrier.target()
    }

    /// Fold a batch of completions; callable concurrently from the event feed
    pub async fn on_completions(&self, batch: Vec<SlotCompletion>) -> CompletionOutcome {
        let outcome = self.barrier.accept_batch(batch).await;

        let mut result = CompletionOutcome {
            counted: outcome.accepted,
            ..CompletionOutcome::default()
        };
        for (event, reason) in outcome.rejected {
            match reason {
                Rejection::Duplicate => result.duplicates.push(event),
                Rejection::Surplus => result.surplus.push(event),
            }
        }
        if outcome.opened {
            result.reached = self.barrier.output().await;
        }
        result
    }

    /// Suspend until every member has completed; returns the success count
    ///
    /// Returns at once if the quorum was already reached. Never returns if a
    /// member never reports.
    pub async fn await_quorum(&self) -> u32 {
        self.barrier.wait().await.succeeded
    }

    /// Current counts, whether or not the quorum has been reached
    pub async fn snapshot(&self) -> QuorumResult {
        self.barrier.inspect(|tally| tally.counts).await
    }

    /// Fraction of members that have completed
    pub async fn progress(&self) -> f32 {
        let expected = self.expected();
        if expected == 0 {
            return 1.0;
        }
        self.snapshot().await.completed as f32 / expected as f32
    }
}
