// Dependency-token arena - storage for the scheduler's per-node metadata
//
// Every Subscription (and therefore every Computed, active PureComputed and
// mapped array) owns exactly one DepId. The metadata stored here holds:
// - priority: one more than the highest priority among the dependencies used
//   in the latest evaluation (0 for a node that used nothing)
// - enqueued: the node sits in the recompute queue
// - draining: the node's callback is on the stack right now
// - drain_epoch / recomputes: how often the node ran during the current drain
// - callback: the recompute function, stored directly in the arena
//
// The arena is thread-local. The engine is single-threaded and callbacks hold
// `Rc` handles, so nothing in here is `Send`.

use slab::Slab;
use std::cell::{Cell, RefCell};

thread_local! {
    static DEP_ARENA: RefCell<Slab<DepMetadata>> = const { RefCell::new(Slab::new()) };
    static NEXT_GENERATION: Cell<u32> = const { Cell::new(1) };
}

/// Scheduler token identifying one derived node in the recompute queue.
///
/// A `DepId` stays valid until its owning subscription is disposed. Accessing
/// a stale id is harmless: reads return defaults and writes are ignored, and
/// the generation counter keeps a reused slab slot from answering for an old
/// id.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct DepId {
    index: u32,
    generation: u32,
}

pub(crate) struct DepMetadata {
    generation: u32,
    priority: u32,
    enqueued: bool,
    draining: bool,
    drain_epoch: u64,
    recomputes: u32,
    callback: Option<Box<dyn FnMut()>>,
}

/// Result of trying to put a node on the recompute queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum EnqueueOutcome {
    /// Newly queued at the given priority.
    Queued { priority: u32, self_invalidated: bool },
    /// Already waiting in the queue.
    AlreadyQueued,
    /// The node ran `limit` times in this drain already.
    LimitReached,
}

impl DepId {
    fn with<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&DepMetadata) -> R,
    {
        DEP_ARENA.with_borrow(|arena| {
            arena
                .get(self.index as usize)
                .filter(|meta| meta.generation == self.generation)
                .map(f)
        })
    }

    fn with_mut<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&mut DepMetadata) -> R,
    {
        DEP_ARENA.with_borrow_mut(|arena| {
            arena
                .get_mut(self.index as usize)
                .filter(|meta| meta.generation == self.generation)
                .map(f)
        })
    }

    /// Current priority of this node (0 for stale ids).
    pub fn priority(self) -> u32 {
        self.with(|meta| meta.priority).unwrap_or(0)
    }

    /// Whether the owning subscription is still alive.
    pub fn is_live(self) -> bool {
        self.with(|_| ()).is_some()
    }

    pub(crate) fn reset_priority(self) {
        self.with_mut(|meta| meta.priority = 0);
    }

    /// Record that this node consulted `dep` during its current evaluation.
    ///
    /// Plain cells have no token; they count as priority 0, so a node that
    /// reads any cell ends up with priority of at least 1.
    pub(crate) fn use_dep(self, dep: Option<DepId>) {
        let dep_priority = dep.map_or(0, DepId::priority);
        self.with_mut(|meta| {
            if dep_priority >= meta.priority {
                meta.priority = dep_priority + 1;
            }
        });
    }

    pub(crate) fn try_enqueue(self, epoch: Option<u64>, limit: u32) -> Option<EnqueueOutcome> {
        self.with_mut(|meta| {
            if meta.enqueued {
                return EnqueueOutcome::AlreadyQueued;
            }
            if epoch == Some(meta.drain_epoch) && meta.recomputes >= limit {
                return EnqueueOutcome::LimitReached;
            }
            meta.enqueued = true;
            EnqueueOutcome::Queued {
                priority: meta.priority,
                self_invalidated: meta.draining,
            }
        })
    }

    /// Take this node off the queue. Returns false for stale entries.
    pub(crate) fn dequeue(self) -> bool {
        self.with_mut(|meta| std::mem::replace(&mut meta.enqueued, false))
            .unwrap_or(false)
    }

    /// Count one recomputation of this node within drain `epoch`.
    pub(crate) fn count_recompute(self, epoch: u64) {
        self.with_mut(|meta| {
            if meta.drain_epoch != epoch {
                meta.drain_epoch = epoch;
                meta.recomputes = 0;
            }
            meta.recomputes += 1;
        });
    }

    /// Run the recompute callback stored in the arena for this node.
    ///
    /// The callback is taken out of the arena while it runs, so it can create
    /// and dispose other nodes (both need the arena borrowed mutably). A drop
    /// guard puts it back and clears the draining flag, even on panic.
    pub(crate) fn run_callback(self) {
        struct CallbackGuard {
            dep: DepId,
            callback: Option<Box<dyn FnMut()>>,
        }

        impl Drop for CallbackGuard {
            fn drop(&mut self) {
                let Some(callback) = self.callback.take() else {
                    return;
                };
                // Disposed while running: drop the callback outside the arena borrow.
                if !self.dep.is_live() {
                    return;
                }
                self.dep.with_mut(|meta| {
                    meta.draining = false;
                    meta.callback.get_or_insert(callback);
                });
            }
        }

        let callback = self
            .with_mut(|meta| {
                let callback = meta.callback.take();
                if callback.is_some() {
                    meta.draining = true;
                }
                callback
            })
            .flatten();
        // Arena borrow released - the callback may touch other nodes.

        // None: disposed, or already running further up the stack.
        let Some(callback) = callback else {
            return;
        };
        let mut guard = CallbackGuard {
            dep: self,
            callback: Some(callback),
        };
        if let Some(callback) = guard.callback.as_mut() {
            callback();
        }
    }
}

/// Allocate a token with priority 0 and the given recompute callback.
pub(crate) fn dep_arena_insert(callback: Box<dyn FnMut()>) -> DepId {
    let generation = NEXT_GENERATION.with(|next| {
        let generation = next.get();
        next.set(generation.wrapping_add(1).max(1));
        generation
    });
    let index = DEP_ARENA.with_borrow_mut(|arena| {
        arena.insert(DepMetadata {
            generation,
            priority: 0,
            enqueued: false,
            draining: false,
            drain_epoch: 0,
            recomputes: 0,
            callback: Some(callback),
        })
    });
    DepId {
        index: index as u32,
        generation,
    }
}

/// Free a token. Queue entries still pointing at it are skipped when popped.
pub(crate) fn dep_arena_remove(id: DepId) {
    let removed = DEP_ARENA.with_borrow_mut(|arena| {
        let index = id.index as usize;
        match arena.get(index) {
            Some(meta) if meta.generation == id.generation => Some(arena.remove(index)),
            _ => None,
        }
    });
    // Dropping the callback may drop subscriptions that remove their own
    // tokens, so it must happen outside the arena borrow.
    drop(removed);
}

/// Number of live tokens on this thread.
pub(crate) fn dep_count() -> usize {
    DEP_ARENA.with_borrow(Slab::len)
}
