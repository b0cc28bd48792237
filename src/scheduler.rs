//! Priority-ordered recompute queue.
//!
//! Every derived node owns a [`DepId`] whose priority is one more than the
//! highest priority among the dependencies it used in its latest evaluation.
//! When a dependency changes, the node is *enqueued* rather than recomputed
//! on the spot. [`drain()`] then pops nodes lowest priority first, so a node
//! only runs after everything it depends on has settled for this batch, and
//! runs at most once per batch as long as its dependencies stay the same.
//!
//! The queue is per thread and lives for the lifetime of the thread. All of
//! the engine's cells call [`drain()`] after a write; [`bundle_changes`]
//! holds draining off until the outermost bundle exits.

use crate::arena::{DepId, EnqueueOutcome};
use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Default number of times one node may recompute within a single drain.
///
/// Only cyclic graphs get anywhere near this; see [`SchedulerConfig`].
pub const DEFAULT_RECOMPUTE_LIMIT: u32 = 100;

/// Per-thread scheduler settings.
///
/// ```ignore
/// scheduler::configure(SchedulerConfig::new().recompute_limit(16));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    recompute_limit: u32,
}

impl SchedulerConfig {
    /// Settings with all defaults.
    pub const fn new() -> Self {
        Self {
            recompute_limit: DEFAULT_RECOMPUTE_LIMIT,
        }
    }

    /// Cap on recomputations of a single node within one drain.
    ///
    /// A node that hits the cap is not enqueued again until the next drain,
    /// which is what makes cyclic graphs terminate. Values below 1 are
    /// treated as 1.
    pub const fn recompute_limit(mut self, limit: u32) -> Self {
        self.recompute_limit = if limit == 0 { 1 } else { limit };
        self
    }

    /// The configured recompute limit.
    pub const fn get_recompute_limit(&self) -> u32 {
        self.recompute_limit
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
struct QueueEntry {
    priority: u32,
    sequence: u64,
    dep: DepId,
}

thread_local! {
    static QUEUE: RefCell<BinaryHeap<Reverse<QueueEntry>>> = const { RefCell::new(BinaryHeap::new()) };
    // Shared by drain() and bundle_changes(): while > 0, drain() is a no-op.
    static COMPUTE_DEPTH: Cell<usize> = const { Cell::new(0) };
    static DRAINING: Cell<bool> = const { Cell::new(false) };
    static DRAIN_EPOCH: Cell<u64> = const { Cell::new(0) };
    static SEQUENCE: Cell<u64> = const { Cell::new(0) };
    static CONFIG: Cell<SchedulerConfig> = const { Cell::new(SchedulerConfig::new()) };
}

/// Install scheduler settings for the current thread.
pub fn configure(config: SchedulerConfig) {
    CONFIG.with(|c| c.set(config));
}

/// The scheduler settings of the current thread.
pub fn config() -> SchedulerConfig {
    CONFIG.with(Cell::get)
}

/// True while a drain is running on this thread.
pub fn is_draining() -> bool {
    DRAINING.with(Cell::get)
}

/// Number of nodes waiting in the queue (including entries for disposed nodes
/// that have not been popped yet).
pub fn pending_count() -> usize {
    QUEUE.with_borrow(BinaryHeap::len)
}

pub(crate) fn enter_compute() {
    COMPUTE_DEPTH.with(|d| d.set(d.get() + 1));
}

/// Returns true when the outermost level was left.
pub(crate) fn exit_compute() -> bool {
    COMPUTE_DEPTH.with(|d| {
        let depth = d.get().saturating_sub(1);
        d.set(depth);
        depth == 0
    })
}

/// Put `dep` on the recompute queue.
///
/// Enqueueing a node that is already queued is a no-op. A node that invalidates
/// itself while its own callback runs is queued again and picked up later in the
/// same drain, up to the configured recompute limit.
pub fn enqueue(dep: DepId) {
    let epoch = is_draining().then(|| DRAIN_EPOCH.with(Cell::get));
    let limit = config().recompute_limit;
    match dep.try_enqueue(epoch, limit) {
        Some(EnqueueOutcome::Queued {
            priority,
            self_invalidated,
        }) => {
            if self_invalidated {
                cov_mark::hit!(self_invalidation_requeued);
            }
            let sequence = SEQUENCE.with(|s| {
                let next = s.get();
                s.set(next + 1);
                next
            });
            QUEUE.with_borrow_mut(|queue| {
                queue.push(Reverse(QueueEntry {
                    priority,
                    sequence,
                    dep,
                }))
            });
        }
        Some(EnqueueOutcome::LimitReached) => {
            cov_mark::hit!(recompute_limit_reached);
            tracing::warn!(
                ?dep,
                limit,
                "node recomputed too often in one drain; dependency graph is probably cyclic"
            );
        }
        Some(EnqueueOutcome::AlreadyQueued) | None => {}
    }
}

fn pop_next() -> Option<DepId> {
    loop {
        let Reverse(entry) = QUEUE.with_borrow_mut(BinaryHeap::pop)?;
        if entry.dep.dequeue() {
            return Some(entry.dep);
        }
    }
}

/// RAII guard for one drain pass; restores the flags even if a recompute panics.
struct DrainGuard;

impl DrainGuard {
    fn enter() -> Self {
        enter_compute();
        DRAINING.with(|d| d.set(true));
        DRAIN_EPOCH.with(|e| e.set(e.get() + 1));
        DrainGuard
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        DRAINING.with(|d| d.set(false));
        exit_compute();
    }
}

/// Recompute queued nodes in priority order until the queue is empty.
///
/// Calls made while a drain or a bundle is already active return immediately;
/// anything they would have processed is picked up by the active drain (or by
/// the drain at the end of the outermost bundle). A panic from a recompute
/// callback propagates to the caller; nodes still queued stay queued for the
/// next drain.
///
/// Returns the number of recomputations performed.
pub fn drain() -> usize {
    if COMPUTE_DEPTH.with(Cell::get) > 0 {
        cov_mark::hit!(drain_reentry_suppressed);
        return 0;
    }
    let _guard = DrainGuard::enter();
    let epoch = DRAIN_EPOCH.with(Cell::get);

    let mut total = 0;
    while let Some(dep) = pop_next() {
        dep.count_recompute(epoch);
        dep.reset_priority();
        dep.run_callback();
        total += 1;
    }

    if total > 0 {
        tracing::trace!(recomputed = total, epoch, "drain finished");
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{dep_arena_insert, dep_arena_remove};
    use std::rc::Rc;

    fn recording_dep(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> DepId {
        let log = log.clone();
        dep_arena_insert(Box::new(move || log.borrow_mut().push(name)))
    }

    #[test]
    fn drain_pops_lowest_priority_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let high = recording_dep(&log, "high");
        let low = recording_dep(&log, "low");
        let leaf = dep_arena_insert(Box::new(|| {}));

        leaf.use_dep(None);
        high.use_dep(Some(leaf));
        low.use_dep(None);

        enqueue(high);
        enqueue(low);
        assert_eq!(drain(), 2);
        assert_eq!(*log.borrow(), vec!["low", "high"]);

        for dep in [high, low, leaf] {
            dep_arena_remove(dep);
        }
    }

    #[test]
    fn equal_priorities_run_in_enqueue_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = recording_dep(&log, "first");
        let second = recording_dep(&log, "second");

        enqueue(second);
        enqueue(first);
        enqueue(second);
        drain();
        assert_eq!(*log.borrow(), vec!["second", "first"]);

        dep_arena_remove(first);
        dep_arena_remove(second);
    }

    #[test]
    fn removed_dep_is_skipped() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let dep = recording_dep(&log, "gone");
        enqueue(dep);
        dep_arena_remove(dep);

        assert_eq!(drain(), 0);
        assert!(log.borrow().is_empty());
        assert_eq!(pending_count(), 0);
    }

    #[test]
    fn nested_drain_is_suppressed() {
        cov_mark::check!(drain_reentry_suppressed);
        let inner_result = Rc::new(Cell::new(usize::MAX));
        let inner_clone = inner_result.clone();
        let dep = dep_arena_insert(Box::new(move || inner_clone.set(drain())));

        enqueue(dep);
        assert_eq!(drain(), 1);
        assert_eq!(inner_result.get(), 0);
        assert!(!is_draining());
        dep_arena_remove(dep);
    }

    #[test]
    fn recompute_limit_stops_self_invalidation() {
        cov_mark::check!(recompute_limit_reached);
        configure(SchedulerConfig::new().recompute_limit(3));

        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let id = Rc::new(Cell::new(None::<DepId>));
        let id_clone = id.clone();
        let dep = dep_arena_insert(Box::new(move || {
            runs_clone.set(runs_clone.get() + 1);
            if let Some(me) = id_clone.get() {
                enqueue(me);
            }
        }));
        id.set(Some(dep));

        enqueue(dep);
        drain();
        assert_eq!(runs.get(), 3);

        // A new drain starts a new budget.
        enqueue(dep);
        drain();
        assert_eq!(runs.get(), 6);

        configure(SchedulerConfig::default());
        dep_arena_remove(dep);
    }

    #[test]
    fn zero_limit_is_clamped() {
        assert_eq!(
            SchedulerConfig::new().recompute_limit(0).get_recompute_limit(),
            1
        );
    }
}
