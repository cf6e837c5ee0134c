//! Immediate discipline: every accepted call gets its own timer.
//!
//! Calls dispatched for the same key while a hint is in force all fire at the
//! key's not-before deadline. Nothing serializes them.

use super::{run_guarded, DispatchContext};
use crate::application::error::DispatchError;
use crate::application::ports::Storage;
use crate::application::registry::{Action, KeyState, OnDrained};

/// Schedules each call independently.
#[derive(Clone)]
pub struct ImmediateDispatcher<S>
where
    S: Storage<String, KeyState> + Clone,
{
    ctx: DispatchContext<S>,
}

impl<S> ImmediateDispatcher<S>
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

    /// Schedule `action` at the key's not-before deadline.
    ///
    /// `on_drained` runs right after the action returns. It is skipped if the
    /// action panics or the timer is cancelled.
    ///
    /// # Errors
    /// Returns `LimitExceeded` if the deadline is further away than the
    /// maximum delay. Nothing is scheduled in that case.
    pub fn dispatch(
        &self,
        key: &str,
        action: Action,
        on_drained: OnDrained,
    ) -> Result<(), DispatchError> {
        let wait = self.ctx.check_delay(key)?;

        let reporter = self.ctx.reporter(key);
        let metrics = self.ctx.metrics().clone();
        self.ctx.schedule(key, wait, move || {
            if run_guarded(&metrics, reporter.key(), || action(&reporter)) {
                on_drained();
            }
        });
        Ok(())
    }
}
