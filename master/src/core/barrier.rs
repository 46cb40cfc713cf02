//! Target-count barrier
//!
//! Both slot allocation and completion tracking wait for a fixed number of
//! events. This module owns that mechanic once: events are folded into an
//! [`Accumulator`] under the barrier's own mutex, and when the target count is
//! reached the accumulator is finalized exactly once and every waiter wakes.

use tokio::sync::{Mutex, Notify};

/// Per-event logic plugged into a [`CountingBarrier`]
pub trait Accumulator: Send + 'static {
    type Event: Send;
    /// What the caller gets back for every counted event
    type Accepted: Send;
    /// Built once when the target is reached and handed to every waiter
    type Output: Clone + Send + Sync;

    /// Whether `event` has already been counted
    fn is_duplicate(&self, _event: &Self::Event) -> bool {
        false
    }

    fn accumulate(&mut self, event: Self::Event) -> Self::Accepted;

    fn finalize(&mut self) -> Self::Output;
}

/// Why an event was not counted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The target had already been reached
    Surplus,
    /// The same event was counted before
    Duplicate,
}

/// Result of folding one batch into the barrier
pub struct BatchOutcome<A: Accumulator> {
    pub accepted: Vec<A::Accepted>,
    pub rejected: Vec<(A::Event, Rejection)>,
    /// True only for the batch that reached the target
    pub opened: bool,
    /// Events counted so far, including this batch
    pub count: usize,
}

struct BarrierState<A: Accumulator> {
    accumulator: A,
    count: usize,
    output: Option<A::Output>,
}

pub struct CountingBarrier<A: Accumulator> {
    target: usize,
    state: Mutex<BarrierState<A>>,
    opened: Notify,
}

impl<A: Accumulator> CountingBarrier<A> {
    /// A zero target opens immediately
    pub fn new(target: usize, mut accumulator: A) -> Self {
        let output = (target == 0).then(|| accumulator.finalize());
        Self {
            target,
            state: Mutex::new(BarrierState {
                accumulator,
                count: 0,
                output,
            }),
            opened: Notify::new(),
        }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Fold a batch of events in arrival order
    ///
    /// Events past the target are returned as [`Rejection::Surplus`]; the
    /// accumulator is finalized at most once, by the batch that reaches the
    /// target.
    pub async fn accept_batch<I>(&self, batch: I) -> BatchOutcome<A>
    where
        I: IntoIterator<Item = A::Event>,
    {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut opened = false;

        let count = {
            let mut state = self.state.lock().await;
            for event in batch {
                if state.accumulator.is_duplicate(&event) {
                    rejected.push((event, Rejection::Duplicate));
                    continue;
                }
                if state.count >= self.target {
                    rejected.push((event, Rejection::Surplus));
                    continue;
                }
                accepted.push(state.accumulator.accumulate(event));
                state.count += 1;
            }

            if state.count == self.target && state.output.is_none() {
                let output = state.accumulator.finalize();
                state.output = Some(output);
                opened = true;
            }
            state.count
        };

        if opened {
            self.opened.notify_waiters();
        }

        BatchOutcome {
            accepted,
            rejected,
            opened,
            count,
        }
    }

    /// Suspend until the target is reached, then return the finalized output
    ///
    /// Returns at once if the barrier is already open. There is no timeout:
    /// if the target is never reached this never returns.
    pub async fn wait(&self) -> A::Output {
        loop {
            let notified = self.opened.notified();
            tokio::pin!(notified);
            // Register before checking so an open between the check and the
            // await still wakes us.
            notified.as_mut().enable();

            if let Some(output) = self.output().await {
                return output;
            }
            notified.await;
        }
    }

    /// Finalized output, if the barrier is open
    pub async fn output(&self) -> Option<A::Output> {
        self.state.lock().await.output.clone()
    }

    pub async fn is_open(&self) -> bool {
        self.state.lock().await.output.is_some()
    }

    pub async fn count(&self) -> usize {
        self.state.lock().await.count
    }

    /// Read the accumulator under the barrier's lock
    pub async fn inspect<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        let state = self.state.lock().await;
        f(&state.accumulator)
    }
}
