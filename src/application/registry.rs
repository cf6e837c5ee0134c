//! Central registry of per-key limiter state.
//!
//! The registry maintains, for each call-key, its timing state, its pending
//! work queue (queue discipline only) and the timers scheduled on its behalf.
//! Entries are registered explicitly by dispatches and header reports; read-only
//! queries never create state.

use crate::application::ports::{Clock, Storage};
use crate::application::reporter::HeaderReporter;
use crate::application::timer::PendingTimers;
use crate::domain::{call_state::CallState, headers::Headers, hint::HintParser, limit::Limit};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::task::AbortHandle;

/// Action run by the immediate and queue disciplines.
pub type Action = Box<dyn FnOnce(&HeaderReporter) + Send + 'static>;

/// Callback run once an action (immediate) or a key's queue (queue) is done.
pub type OnDrained = Box<dyn FnOnce() + Send + 'static>;

/// A queued action together with its drain callback.
pub struct WorkItem {
    /// Action to run.
    pub action: Action,
    /// Called if this item is the one that empties the queue.
    pub on_drained: OnDrained,
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem").finish_non_exhaustive()
    }
}

/// Result of a worker trying to take the next item.
#[derive(Debug)]
pub enum Pop {
    /// The next item to run.
    Item(WorkItem),
    /// The worker no longer owns the queue (it was cleared or reset); stop quietly.
    Superseded,
    /// The worker is current but the queue is empty: a logic defect.
    Empty,
}

/// What a worker should do after running an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The queue is empty and the key is idle again.
    Drained,
    /// More items are waiting.
    Continue,
    /// The worker no longer owns the queue.
    Superseded,
}

/// Per-key FIFO of pending work and the single-worker flag.
///
/// A worker owns the queue through a token handed out when it claims it.
/// Tokens are unique per limiter, so a worker left over from a cleared or
/// reset queue can never act on a newer one.
///
/// Items are only `Send`. The mutex makes the queue `Sync` so it can live in
/// shared storage; mutation goes through `&mut self` and never contends.
#[derive(Debug, Default)]
pub struct LimiterQueue {
    items: Mutex<VecDeque<WorkItem>>,
    owner: Option<u64>,
    worker: Option<AbortHandle>,
}

impl LimiterQueue {
    /// Number of items waiting (the item being run is not counted).
    pub fn len(&self) -> usize {
        self.locked().len()
    }

    /// Check if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.locked().is_empty()
    }

    fn locked(&self) -> MutexGuard<'_, VecDeque<WorkItem>> {
        // No user code runs while the lock is held, so poisoning carries no
        // broken invariant.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn items_mut(&mut self) -> &mut VecDeque<WorkItem> {
        self.items.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check whether a worker currently owns this queue.
    pub fn is_worker_active(&self) -> bool {
        self.owner.is_some()
    }

    /// Append an item if the capacity allows it.
    ///
    /// Returns the item back when the queue is full.
    pub fn push(&mut self, item: WorkItem, capacity: Limit) -> Result<(), WorkItem> {
        let items = self.items_mut();
        if !capacity.has_room(items.len()) {
            return Err(item);
        }
        items.push_back(item);
        Ok(())
    }

    /// Claim the queue for a new worker identified by `token`.
    ///
    /// Returns false if another worker already owns it.
    pub fn claim_worker(&mut self, token: u64) -> bool {
        if self.owner.is_some() {
            return false;
        }
        self.owner = Some(token);
        true
    }

    /// Remember the running worker's abort handle.
    pub fn attach_worker(&mut self, handle: AbortHandle) {
        self.worker = Some(handle);
    }

    /// Take the front item on behalf of the worker holding `token`.
    pub fn pop_for(&mut self, token: u64) -> Pop {
        if self.owner != Some(token) {
            return Pop::Superseded;
        }
        match self.items_mut().pop_front() {
            Some(item) => Pop::Item(item),
            None => Pop::Empty,
        }
    }

    /// Decide the worker's next step after it ran an item.
    ///
    /// Releases the queue when it is empty.
    pub fn after_step(&mut self, token: u64) -> Step {
        if self.owner != Some(token) {
            return Step::Superseded;
        }
        if self.items_mut().is_empty() {
            self.release();
            Step::Drained
        } else {
            Step::Continue
        }
    }

    /// Release the queue without draining it.
    pub fn release(&mut self) {
        self.owner = None;
        self.worker = None;
    }

    /// Abort the worker and drop all pending items.
    ///
    /// Returns how many items were discarded.
    pub fn clear(&mut self) -> usize {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        self.owner = None;
        let items = self.items_mut();
        let discarded = items.len();
        items.clear();
        discarded
    }
}

/// State tracked for each call-key.
#[derive(Debug)]
pub struct KeyState {
    /// Not-before timing
    pub call: CallState,
    /// Pending work (queue discipline only)
    pub queue: LimiterQueue,
    /// Timers scheduled by the immediate and deferred disciplines
    pub timers: PendingTimers,
}

impl KeyState {
    /// Create unrestricted state.
    pub fn new(now: Instant) -> Self {
        Self {
            call: CallState::new(now),
            queue: LimiterQueue::default(),
            timers: PendingTimers::new(),
        }
    }
}

/// Registry managing all call-key state.
///
/// Uses the Storage port for concurrent access.
///
/// This type is generic over the storage implementation, allowing different
/// storage backends to be used. In production, use `Arc<ShardedStorage>`.
#[derive(Clone)]
pub struct CallRegistry<S>
where
    S: Storage<String, KeyState> + Clone,
{
    storage: S,
    clock: Arc<dyn Clock>,
    parser: Arc<HintParser>,
}

impl<S> CallRegistry<S>
where
    S: Storage<String, KeyState> + Clone,
{
    /// Create a new registry with storage, clock and hint parser.
    pub fn new(storage: S, clock: Arc<dyn Clock>, parser: HintParser) -> Self {
        Self {
            storage,
            clock,
            parser: Arc::new(parser),
        }
    }

    /// Access a key's state, registering it first if it is unknown.
    ///
    /// The callback receives the state and the current instant.
    pub fn with_state<F, R>(&self, key: &str, f: F) -> R
    where
        F: FnOnce(&mut KeyState, Instant) -> R,
    {
        let now = self.clock.now();
        self.storage
            .with_entry_mut(key.to_string(), || KeyState::new(now), |state| f(state, now))
    }

    /// Read a registered key's state.
    pub fn with_existing<F, R>(&self, key: &str, f: F) -> Option<R>
    where
        F: FnOnce(&KeyState, Instant) -> R,
    {
        let now = self.clock.now();
        self.storage.with_existing(key, |state| f(state, now))
    }

    /// Mutate a registered key's state.
    pub fn with_existing_mut<F, R>(&self, key: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut KeyState, Instant) -> R,
    {
        let now = self.clock.now();
        self.storage.with_existing_mut(key, |state| f(state, now))
    }

    /// Parse `headers` and fold the resulting hint into the key's state.
    ///
    /// Returns the new not-before instant if the hint moved it forward.
    pub fn report_headers(&self, key: &str, headers: &Headers) -> Option<Instant> {
        let now = self.clock.now();
        let candidate = self.parser.parse(headers, now, self.clock.wall_now())?;
        self.with_state(key, |state, _| {
            state.call.merge(candidate).then_some(candidate)
        })
    }

    /// Apply `f` to every registered key.
    pub fn for_each_mut<F>(&self, mut f: F)
    where
        F: FnMut(&str, &mut KeyState),
    {
        self.storage.for_each_mut(|key, state| f(key, state));
    }

    /// Forget a key entirely.
    pub fn remove(&self, key: &str) -> Option<KeyState> {
        self.storage.remove(key)
    }

    /// All registered keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.storage.len());
        self.storage.for_each(|key, _| keys.push(key.clone()));
        keys
    }

    /// Get the number of registered keys.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if no key is registered.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Get the current monotonic instant.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Get the hint parser.
    pub fn parser(&self) -> &HintParser {
        &self.parser
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;
    use crate::infrastructure::storage::ShardedStorage;
    use std::time::Duration;

    fn registry() -> (CallRegistry<Arc<ShardedStorage<String, KeyState>>>, MockClock) {
        let clock = MockClock::new(Instant::now());
        let registry = CallRegistry::new(
            Arc::new(ShardedStorage::new()),
            Arc::new(clock.clone()),
            HintParser::new(),
        );
        (registry, clock)
    }

    fn item() -> WorkItem {
        WorkItem {
            action: Box::new(|_: &HeaderReporter| {}),
            on_drained: Box::new(|| {}),
        }
    }

    #[test]
    fn test_registry_creation() {
        let (registry, _clock) = registry();

        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_queries_do_not_register() {
        let (registry, _clock) = registry();

        assert!(registry.with_existing("k", |_, _| ()).is_none());
        assert!(registry.with_existing_mut("k", |_, _| ()).is_none());
        assert!(registry.is_empty());

        registry.with_state("k", |_, _| ());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.keys(), vec!["k".to_string()]);
    }

    #[test]
    fn test_new_state_is_unrestricted() {
        let (registry, clock) = registry();

        let delay = registry.with_state("k", |state, now| state.call.delay_ms(now));
        assert_eq!(delay, 0);

        clock.advance(Duration::from_secs(1));
        let delay = registry.with_existing("k", |state, now| state.call.delay_ms(now));
        assert_eq!(delay, Some(-1000));
    }

    #[test]
    fn test_report_headers_is_monotonic() {
        let (registry, clock) = registry();
        let start = clock.now();

        let raised = registry.report_headers("k", &Headers::new().with("Retry-After", 5));
        assert_eq!(raised, Some(start + Duration::from_secs(5)));

        let smaller = registry.report_headers("k", &Headers::new().with("Retry-After", 1));
        assert_eq!(smaller, None);

        let not_before = registry.with_existing("k", |state, _| state.call.not_before());
        assert_eq!(not_before, Some(start + Duration::from_secs(5)));
    }

    #[test]
    fn test_report_without_hint_leaves_key_unregistered() {
        let (registry, _clock) = registry();

        let raised = registry.report_headers("k", &Headers::new().with("Server", "nginx"));
        assert_eq!(raised, None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_queue_capacity() {
        let mut queue = LimiterQueue::default();

        assert!(queue.push(item(), Limit::Max(2)).is_ok());
        assert!(queue.push(item(), Limit::Max(2)).is_ok());
        assert!(queue.push(item(), Limit::Max(2)).is_err());
        assert_eq!(queue.len(), 2);

        assert!(queue.push(item(), Limit::Disabled).is_ok());
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_single_worker_claim() {
        let mut queue = LimiterQueue::default();

        assert!(queue.claim_worker(1));
        assert!(queue.is_worker_active());
        assert!(!queue.claim_worker(2));

        queue.release();
        assert!(!queue.is_worker_active());
        assert!(queue.claim_worker(2));
    }

    #[test]
    fn test_worker_steps() {
        let mut queue = LimiterQueue::default();
        queue.push(item(), Limit::Disabled).unwrap();
        queue.push(item(), Limit::Disabled).unwrap();
        assert!(queue.claim_worker(1));

        assert!(matches!(queue.pop_for(2), Pop::Superseded));
        assert!(matches!(queue.pop_for(1), Pop::Item(_)));
        assert_eq!(queue.after_step(1), Step::Continue);
        assert!(queue.is_worker_active());

        assert!(matches!(queue.pop_for(1), Pop::Item(_)));
        assert_eq!(queue.after_step(1), Step::Drained);
        assert!(!queue.is_worker_active());

        queue.claim_worker(3);
        assert!(matches!(queue.pop_for(3), Pop::Empty));
    }

    #[test]
    fn test_key_state_is_shareable_with_send_only_actions() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KeyState>();

        let counter = std::cell::Cell::new(0u32);
        let mut queue = LimiterQueue::default();
        let item = WorkItem {
            action: Box::new(move |_: &HeaderReporter| counter.set(counter.get() + 1)),
            on_drained: Box::new(|| {}),
        };
        assert!(queue.push(item, Limit::Disabled).is_ok());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear_supersedes_worker() {
        let mut queue = LimiterQueue::default();
        queue.push(item(), Limit::Disabled).unwrap();
        queue.push(item(), Limit::Disabled).unwrap();
        assert!(queue.claim_worker(1));

        assert_eq!(queue.clear(), 2);
        assert!(!queue.is_worker_active());
        assert!(matches!(queue.pop_for(1), Pop::Superseded));
        assert_eq!(queue.after_step(1), Step::Superseded);
        assert!(queue.claim_worker(2));
    }
}
