use crate::arena::DepId;
use crate::bundle::bundle_changes;
use crate::cell::{CellCore, CellKey, Subscribable};
use crate::computed::WriteCallback;
use crate::dispose::Disposable;
use crate::error::{Error, Result};
use crate::notifier::Listener;
use crate::subscription::{Dependencies, Subscription, Use};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Activate<T> = Box<dyn Fn(Weak<PureInner<T>>) -> Subscription>;

struct PureInner<T: 'static> {
    core: CellCore<T>,
    // Untracked evaluation used while idle.
    evaluate: Box<dyn Fn() -> T>,
    activate: Activate<T>,
    subscription: RefCell<Option<Subscription>>,
    write: RefCell<Option<WriteCallback<T>>>,
}

impl<T: Clone + PartialEq + 'static> PureInner<T> {
    fn activate(self: &Rc<Self>) {
        if self.subscription.borrow().is_some() || self.core.is_disposed() {
            return;
        }
        let subscription = (self.activate)(Rc::downgrade(self));
        tracing::trace!(key = ?self.core.key, dep = ?subscription.dep_id(), "pure computed activated");
        *self.subscription.borrow_mut() = Some(subscription);
    }

    fn deactivate(&self) {
        let subscription = self.subscription.borrow_mut().take();
        if let Some(subscription) = subscription {
            tracing::trace!(key = ?self.core.key, "pure computed deactivated");
            subscription.dispose();
        }
    }

    fn is_active(&self) -> bool {
        self.subscription.borrow().is_some()
    }
}

/// A derived cell that only subscribes to its dependencies while it is
/// itself observed.
///
/// With no listeners, [`get`](PureComputed::get) evaluates the read function
/// on every call and holds no subscriptions, so an unobserved pure computed
/// never keeps its dependencies busy. The first listener creates a live
/// [`Subscription`] that keeps the cached value current; losing the last
/// listener tears it down again.
///
/// ```ignore
/// let items = Observable::new(vec![1, 2, 3]);
/// let total = pure_computed(move |u| u.get(&items).iter().sum::<i32>());
/// assert_eq!(total.get(), 6); // evaluated on demand
/// ```
///
/// Reading a pure computed through [`Use::get`] inside another
/// subscription counts as observing it.
pub struct PureComputed<T: 'static> {
    inner: Rc<PureInner<T>>,
}

impl<T: Clone + PartialEq + 'static> PureComputed<T> {
    /// Derive a value from cells read through the accessor.
    pub fn new(read: impl Fn(&Use<'_>) -> T + 'static) -> Self {
        Self::with_deps((), move |tracker, ()| read(tracker))
    }

    /// Derive a value from a static dependency list plus any cells read
    /// through the accessor.
    pub fn with_deps<D>(deps: D, read: impl Fn(&Use<'_>, D::Values) -> T + 'static) -> Self
    where
        D: Dependencies + 'static,
    {
        let deps = Rc::new(deps);
        let read = Rc::new(read);

        let evaluate = {
            let deps = Rc::clone(&deps);
            let read = Rc::clone(&read);
            Box::new(move || {
                let tracker = Use::untracked();
                let values = deps.read(&tracker);
                read(&tracker, values)
            })
        };
        let activate: Activate<T> = Box::new(move |weak: Weak<PureInner<T>>| {
            let read = Rc::clone(&read);
            Subscription::with_deps(Rc::clone(&deps), move |tracker, values| {
                let value = read(tracker, values);
                if let Some(inner) = weak.upgrade() {
                    inner.core.set_if_changed(value);
                }
            })
        });

        let inner = Rc::new(PureInner {
            core: CellCore::new(None),
            evaluate,
            activate,
            subscription: RefCell::new(None),
            write: RefCell::new(None),
        });
        let weak = Rc::downgrade(&inner);
        inner.core.notifier.set_count_changed(move |has_listeners| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if has_listeners {
                inner.activate();
            } else {
                inner.deactivate();
            }
        });
        Self { inner }
    }

    /// Make the cell writable: [`set`](PureComputed::set) calls `write`.
    pub fn on_write(self, write: impl Fn(T) + 'static) -> Self {
        *self.inner.write.borrow_mut() = Some(Rc::new(write));
        self
    }

    /// Pass `value` to the write-back callback, as one bundle.
    ///
    /// Returns [`Error::NotWritable`] if no callback was installed.
    pub fn set(&self, value: T) -> Result<()> {
        let write = self.inner.write.borrow().clone();
        let Some(write) = write else {
            return Err(Error::NotWritable);
        };
        bundle_changes(|| write(value));
        Ok(())
    }

    /// Whether [`on_write`](PureComputed::on_write) was called.
    pub fn is_writable(&self) -> bool {
        self.inner.write.borrow().is_some()
    }

    /// The current value: cached while observed, evaluated fresh otherwise.
    pub fn get(&self) -> T {
        let inner = &self.inner;
        if !inner.is_active() && (!inner.core.is_disposed() || !inner.core.has_value()) {
            let value = (inner.evaluate)();
            inner.core.store(value);
        }
        inner.core.get()
    }

    /// Whether a live subscription currently keeps the value up to date.
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Call `listener` with `(new, old)` whenever the result changes.
    ///
    /// The first listener activates the cell.
    pub fn add_listener(&self, listener: impl Fn(&T, &T) + 'static) -> Listener {
        self.inner.core.notifier.add_listener(Rc::new(listener))
    }

    /// Whether anything listens to this cell.
    pub fn has_listeners(&self) -> bool {
        self.inner.core.notifier.has_listeners()
    }

    /// Number of listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.core.notifier.listener_count()
    }

    /// Tear down the live subscription, if any, and detach all listeners.
    pub fn dispose(&self) {
        self.inner.core.dispose();
        self.inner.deactivate();
        self.inner.write.borrow_mut().take();
    }

    /// Whether [`dispose`](PureComputed::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.inner.core.is_disposed()
    }
}

impl<T: 'static> Clone for PureComputed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> PartialEq for PureComputed<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> fmt::Debug for PureComputed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PureComputed")
            .field("key", &self.inner.core.key)
            .field("active", &self.inner.subscription.borrow().is_some())
            .field("disposed", &self.inner.core.is_disposed())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Disposable for PureComputed<T> {
    fn dispose(&self) {
        PureComputed::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        PureComputed::is_disposed(self)
    }
}

impl<T: Clone + PartialEq + 'static> Subscribable for PureComputed<T> {
    type Value = T;

    fn get(&self) -> T {
        PureComputed::get(self)
    }

    fn cell_key(&self) -> CellKey {
        self.inner.core.key
    }

    fn dep_id(&self) -> Option<DepId> {
        self.inner
            .subscription
            .borrow()
            .as_ref()
            .map(Subscription::dep_id)
    }

    fn subscribe_changes(&self, on_change: Rc<dyn Fn()>) -> Listener {
        self.inner.core.subscribe_changes(on_change)
    }
}

/// Shorthand for [`PureComputed::new`].
pub fn pure_computed<T: Clone + PartialEq + 'static>(
    read: impl Fn(&Use<'_>) -> T + 'static,
) -> PureComputed<T> {
    PureComputed::new(read)
}

/// Shorthand for [`PureComputed::with_deps`].
pub fn pure_computed_with<D, T>(
    deps: D,
    read: impl Fn(&Use<'_>, D::Values) -> T + 'static,
) -> PureComputed<T>
where
    D: Dependencies + 'static,
    T: Clone + PartialEq + 'static,
{
    PureComputed::with_deps(deps, read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Observable, computed, subscribe};
    use std::cell::Cell;

    fn counted_double(source: &Observable<i32>) -> (PureComputed<i32>, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let reader = source.clone();
        let pure = pure_computed(move |u| {
            runs_clone.set(runs_clone.get() + 1);
            u.get(&reader) * 2
        });
        (pure, runs)
    }

    #[test]
    fn idle_reads_evaluate_fresh_without_subscribing() {
        let source = Observable::new(1);
        let (pure, runs) = counted_double(&source);
        assert_eq!(runs.get(), 0);
        assert_eq!(source.listener_count(), 0);

        for n in 2..5 {
            source.set(n);
            assert_eq!(pure.get(), n * 2);
            assert_eq!(source.listener_count(), 0);
        }
        assert_eq!(runs.get(), 3);
        assert!(!pure.is_active());
    }

    #[test]
    fn listener_activates_and_removal_deactivates() {
        let source = Observable::new(1);
        let (pure, runs) = counted_double(&source);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let listener = pure.add_listener(move |new, old| seen_clone.borrow_mut().push((*new, *old)));
        assert!(pure.is_active());
        assert_eq!(source.listener_count(), 1);
        assert_eq!(runs.get(), 1);

        source.set(5);
        assert_eq!(*seen.borrow(), vec![(10, 2)]);
        // Cached while active.
        assert_eq!(pure.get(), 10);
        assert_eq!(runs.get(), 2);

        listener.dispose();
        assert!(!pure.is_active());
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn tracked_read_counts_as_observing() {
        let source = Observable::new(3);
        let (pure, _runs) = counted_double(&source);
        let reader = pure.clone();
        let outer = computed(move |u| u.get(&reader) + 1);

        assert!(pure.is_active());
        assert_eq!(outer.get(), 7);
        source.set(4);
        assert_eq!(outer.get(), 9);

        outer.dispose();
        assert!(!pure.is_active());
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn dependent_ranks_above_active_pure_computed() {
        let source = Observable::new(1);
        let (pure, _runs) = counted_double(&source);
        let reader = pure.clone();
        let _sub = subscribe(move |u| {
            u.get(&reader);
        });
        assert_eq!(pure.dep_id().map(DepId::priority), Some(1));
    }

    #[test]
    fn dispose_tears_down_live_subscription() {
        let source = Observable::new(1);
        let (pure, _runs) = counted_double(&source);
        let _listener = pure.add_listener(|_, _| {});
        assert_eq!(source.listener_count(), 1);

        pure.dispose();
        assert!(pure.is_disposed());
        assert_eq!(source.listener_count(), 0);
        source.set(2);
        assert_eq!(pure.get(), 2);
    }

    #[test]
    fn static_dependencies_while_idle_and_active() {
        let a = Observable::new(2);
        let b = Observable::new(5);
        let pure = pure_computed_with((a.clone(), b.clone()), |_, (a, b)| a + b);
        assert_eq!(pure.get(), 7);
        assert!(!a.has_listeners());

        let _listener = pure.add_listener(|_, _| {});
        assert_eq!(a.listener_count(), 1);
        b.set(6);
        assert_eq!(pure.get(), 8);
    }

    #[test]
    fn write_back() {
        let source = Observable::new(1);
        let reader = source.clone();
        let writer = source.clone();
        let pure = pure_computed(move |u| u.get(&reader) * 10).on_write(move |v| writer.set(v / 10));

        assert_eq!(pure.set(50), Ok(()));
        assert_eq!(source.get(), 5);
        assert_eq!(pure.get(), 50);

        let read_only = pure_computed(|_| 0);
        assert_eq!(read_only.set(1), Err(Error::NotWritable));
    }
}
