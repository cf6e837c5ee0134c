//! Deferred discipline: the caller receives a future for the action's outcome.
//!
//! Scheduling works like the immediate discipline. The action gets a
//! [`Resolver`] and owns its [`HeaderReporter`], so it can finish its external
//! call asynchronously and settle the future later.

use super::{run_guarded, DispatchContext};
use crate::application::error::{DeferredError, DispatchError};
use crate::application::ports::Storage;
use crate::application::registry::KeyState;
use crate::application::reporter::HeaderReporter;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Settles a deferred call.
///
/// Dropping it without settling makes the caller's future resolve to
/// [`DeferredError::Abandoned`].
pub struct Resolver<T, E> {
    tx: oneshot::Sender<Result<T, E>>,
}

impl<T, E> Resolver<T, E> {
    /// Fulfil the call with `value`.
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    /// Fail the call with `error`.
    pub fn reject(self, error: E) {
        self.settle(Err(error));
    }

    /// Settle the call with a ready result.
    pub fn settle(self, result: Result<T, E>) {
        // The caller may have dropped its future; nothing to do then.
        let _ = self.tx.send(result);
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Outcome of a deferred dispatch.
///
/// Resolves to the action's value, its rejection, the synchronous dispatch
/// failure, or [`DeferredError::Abandoned`] if the action never settled.
#[must_use = "futures do nothing unless polled"]
pub struct Deferred<T, E> {
    state: DeferredState<T, E>,
}

enum DeferredState<T, E> {
    Failed(Option<DispatchError>),
    Pending(oneshot::Receiver<Result<T, E>>),
}

impl<T, E> Deferred<T, E> {
    pub(crate) fn failed(err: DispatchError) -> Self {
        Self {
            state: DeferredState::Failed(Some(err)),
        }
    }

    fn pending(rx: oneshot::Receiver<Result<T, E>>) -> Self {
        Self {
            state: DeferredState::Pending(rx),
        }
    }

    /// Check whether the dispatch was refused before anything was scheduled.
    pub fn is_refused(&self) -> bool {
        matches!(self.state, DeferredState::Failed(_))
    }
}

impl<T, E> Unpin for Deferred<T, E> {}

impl<T, E> Future for Deferred<T, E> {
    type Output = Result<T, DeferredError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            DeferredState::Failed(err) => match err.take() {
                Some(err) => Poll::Ready(Err(DeferredError::Dispatch(err))),
                None => Poll::Ready(Err(DeferredError::Abandoned)),
            },
            DeferredState::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
                Poll::Ready(Ok(Err(error))) => Poll::Ready(Err(DeferredError::Rejected(error))),
                Poll::Ready(Err(_)) => Poll::Ready(Err(DeferredError::Abandoned)),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            DeferredState::Failed(_) => "refused",
            DeferredState::Pending(_) => "pending",
        };
        f.debug_struct("Deferred").field("state", &state).finish()
    }
}

/// Schedules calls whose outcome is delivered through a future.
#[derive(Clone)]
pub struct DeferredDispatcher<S>
where
    S: Storage<String, KeyState> + Clone,
{
    ctx: DispatchContext<S>,
}

impl<S> DeferredDispatcher<S>
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
    /// A `LimitExceeded` refusal is reported through the returned future, as
    /// [`DeferredError::Dispatch`]; the action is not run in that case.
    pub fn dispatch<T, E, F>(&self, key: &str, action: F) -> Deferred<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(Resolver<T, E>, HeaderReporter) + Send + 'static,
    {
        let wait = match self.ctx.check_delay(key) {
            Ok(wait) => wait,
            Err(err) => return Deferred::failed(err),
        };

        let (tx, rx) = oneshot::channel();
        let reporter = self.ctx.reporter(key);
        let metrics = self.ctx.metrics().clone();
        let owned_key = key.to_string();
        self.ctx.schedule(key, wait, move || {
            run_guarded(&metrics, &owned_key, || action(Resolver { tx }, reporter));
        });
        Deferred::pending(rx)
    }
}
