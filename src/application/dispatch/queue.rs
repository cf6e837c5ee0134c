//! Queue discipline: calls for a key run one at a time, in dispatch order.
//!
//! Each key has a bounded FIFO and at most one worker task. The worker waits
//! until the key's not-before deadline, runs the front item, and repeats until
//! the queue is empty. Hints reported by an action therefore delay the next
//! item, never the one already running.

use super::{run_guarded, DispatchContext};
use crate::application::error::DispatchError;
use crate::application::ports::Storage;
use crate::application::registry::{Action, KeyState, OnDrained, Pop, Step, WorkItem};
use tracing::{debug, error, warn};

/// Serializes calls per key.
#[derive(Clone)]
pub struct QueueDispatcher<S>
where
    S: Storage<String, KeyState> + Clone,
{
    ctx: DispatchContext<S>,
}

impl<S> QueueDispatcher<S>
where
    S: Storage<String, KeyState> + Clone + 'static,
{
    /// Create a dispatcher over `ctx`.
    pub fn new(ctx: DispatchContext<S>) -> Self {
        Self { ctx }
    }

    /// Get the shared context.
    pub fn context(&self) -> &DispatchContext<S> {
        &self.ctx
    }

    /// Append `action` to the key's queue and start a worker if none runs.
    ///
    /// `on_drained` runs only if this item turns out to be the one that
    /// empties the queue.
    ///
    /// # Errors
    /// Returns `QueueFull` if the queue already holds `limit` items.
    pub fn dispatch(
        &self,
        key: &str,
        action: Action,
        on_drained: OnDrained,
    ) -> Result<(), DispatchError> {
        let capacity = self.ctx.limit();
        let item = WorkItem { action, on_drained };

        let queued = self.ctx.registry().with_state(key, |state, _| {
            state.queue.push(item, capacity).ok()?;

            let token = self.ctx.next_id();
            if state.queue.claim_worker(token) {
                let worker = self
                    .ctx
                    .runtime()
                    .spawn(drain(self.ctx.clone(), key.to_string(), token));
                state.queue.attach_worker(worker.abort_handle());
            }
            Some(state.queue.len())
        });

        match queued {
            Some(queued) => {
                self.ctx.metrics().record_dispatched();
                debug!(key, queued, "call queued");
                Ok(())
            }
            None => {
                self.ctx.metrics().record_queue_full();
                warn!(key, capacity = %capacity, "call queue full");
                Err(DispatchError::queue_full(key, capacity))
            }
        }
    }
}

/// Worker loop for one key.
///
/// Stops quietly once it no longer owns the queue (cleared by a reset or a
/// shutdown, or the key was removed).
async fn drain<S>(ctx: DispatchContext<S>, key: String, token: u64)
where
    S: Storage<String, KeyState> + Clone + 'static,
{
    let reporter = ctx.reporter(&key);

    loop {
        let wait = ctx
            .registry()
            .with_existing(&key, |state, now| state.call.wait(now))
            .unwrap_or_default();
        tokio::time::sleep(wait).await;

        let popped = ctx
            .registry()
            .with_existing_mut(&key, |state, _| state.queue.pop_for(token));
        let item = match popped {
            Some(Pop::Item(item)) => item,
            Some(Pop::Empty) => {
                error!(key = %key, "queue worker found its queue empty");
                ctx.registry()
                    .with_existing_mut(&key, |state, _| state.queue.release());
                debug_assert!(false, "queue worker for `{key}` found its queue empty");
                return;
            }
            Some(Pop::Superseded) | None => return,
        };

        run_guarded(ctx.metrics(), &key, || (item.action)(&reporter));

        let step = ctx
            .registry()
            .with_existing_mut(&key, |state, _| state.queue.after_step(token));
        match step {
            Some(Step::Continue) => {}
            Some(Step::Drained) => {
                debug!(key = %key, "call queue drained");
                (item.on_drained)();
                return;
            }
            Some(Step::Superseded) | None => return,
        }
    }
}
