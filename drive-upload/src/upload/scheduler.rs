use std::collections::HashMap;
use std::future::Future;

use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use super::aimd::AimdLimit;
use super::queue::PendingQueue;

/// Lets the scheduler tell a cancelled item apart from a failed one, so that
/// cancellation never triggers back-off.
pub trait CancelAware {
    fn is_cancelled(&self) -> bool;
}

/// Terminal outcome of one launched item, under the key it was launched with.
#[derive(Debug)]
pub struct Settled<T, E> {
    pub key: String,
    pub outcome: Result<T, E>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleKind {
    Succeeded,
    Failed,
    Cancelled,
}

impl<T, E: CancelAware> Settled<T, E> {
    pub fn kind(&self) -> SettleKind {
        match &self.outcome {
            Ok(_) => SettleKind::Succeeded,
            Err(err) if err.is_cancelled() => SettleKind::Cancelled,
            Err(_) => SettleKind::Failed,
        }
    }
}

/// Self-tuning bounded-parallelism drain over a pending queue.
///
/// The driver alternates [`pump`](Self::pump), which launches queued items
/// while `in_flight < limit`, with [`next_settled`](Self::next_settled), which
/// waits for any in-flight item and applies the AIMD rule exactly once for
/// it. `next_settled` returning `None` means quiescence: nothing is in flight
/// and nothing more will be launched.
pub struct Scheduler<I, T, E> {
    queue: PendingQueue<I>,
    in_flight: JoinSet<Result<T, E>>,
    /// Keys live outside the tasks so a panicked item still reports its key.
    keys: HashMap<Id, String>,
    limit: AimdLimit,
}

impl<I, T, E> Scheduler<I, T, E>
where
    T: Send + 'static,
    E: CancelAware + From<JoinError> + Send + 'static,
{
    pub fn new(items: impl IntoIterator<Item = I>, limit: AimdLimit) -> Self {
        Self {
            queue: items.into_iter().collect(),
            in_flight: JoinSet::new(),
            keys: HashMap::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit.current()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_quiescent(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }

    /// Launches queued items until the limit is reached, the queue is empty,
    /// or cancellation is requested. `launch` maps an item to its key and the
    /// future performing it; the future is spawned, not awaited.
    pub fn pump<F, Fut>(&mut self, cancel: &CancellationToken, mut launch: F) -> usize
    where
        F: FnMut(I) -> (String, Fut),
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut launched = 0;
        while !cancel.is_cancelled() && self.in_flight.len() < self.limit.current() {
            let Ok(item) = self.queue.dequeue() else {
                break;
            };
            let (key, work) = launch(item);
            tracing::debug!(
                key = %key,
                in_flight = self.in_flight.len() + 1,
                limit = self.limit.current(),
                "launching upload"
            );
            let handle = self.in_flight.spawn(work);
            self.keys.insert(handle.id(), key);
            launched += 1;
        }
        launched
    }

    pub async fn next_settled(&mut self) -> Option<Settled<T, E>> {
        let (id, outcome) = match self.in_flight.join_next_with_id().await? {
            Ok((id, outcome)) => (id, outcome),
            Err(err) => (err.id(), Err(E::from(err))),
        };
        let settled = Settled {
            key: self.keys.remove(&id).unwrap_or_default(),
            outcome,
        };
        let previous = self.limit.current();
        match settled.kind() {
            SettleKind::Succeeded => {
                self.limit.on_success();
            }
            SettleKind::Failed => {
                self.limit.on_failure();
            }
            SettleKind::Cancelled => {}
        }
        if previous != self.limit.current() {
            tracing::debug!(from = previous, to = self.limit.current(), "concurrency limit adjusted");
        }
        Some(settled)
    }

    /// Items that were never launched, e.g. after cancellation.
    pub fn abandon_queued(&mut self) -> Vec<I> {
        self.queue.drain()
    }
}
