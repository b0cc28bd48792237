use crate::arena::DepId;
use crate::bundle::bundle_changes;
use crate::cell::{CellCore, CellKey, Subscribable};
use crate::dispose::Disposable;
use crate::error::{Error, Result};
use crate::notifier::Listener;
use crate::subscription::{Dependencies, Subscription, Use};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub(crate) type WriteCallback<T> = Rc<dyn Fn(T)>;

struct ComputedInner<T: 'static> {
    core: CellCore<T>,
    subscription: RefCell<Option<Subscription>>,
    write: RefCell<Option<WriteCallback<T>>>,
}

/// A derived cell that stays subscribed to its dependencies.
///
/// The read function runs once during construction and again, in dependency
/// order, whenever a dependency changes. Listeners are only notified when the
/// result differs from the previous one (`T: PartialEq`).
///
/// # How it works
/// A `Computed` is a cell plus a [`Subscription`] whose evaluation writes
/// into the cell through an internal path. Writing a derived cell from
/// outside goes through the write-back callback installed with
/// [`on_write`](Computed::on_write), never through the internal path.
///
/// # Example
/// ```ignore
/// let a = Observable::new(5);
/// let b = Observable::new(12);
/// let sum = computed(move |u| u.get(&a) + u.get(&b));
/// assert_eq!(sum.get(), 17);
/// ```
///
/// Dropping the last handle disposes the computed and its subscription.
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
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
        let inner = Rc::new(ComputedInner {
            core: CellCore::new(None),
            subscription: RefCell::new(None),
            write: RefCell::new(None),
        });
        let weak = Rc::downgrade(&inner);
        let subscription = Subscription::with_deps(deps, move |tracker, values| {
            let value = read(tracker, values);
            if let Some(inner) = weak.upgrade() {
                inner.core.set_if_changed(value);
            }
        });
        *inner.subscription.borrow_mut() = Some(subscription);
        Self { inner }
    }

    /// Make the computed writable: [`set`](Computed::set) calls `write`.
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

    /// Whether [`on_write`](Computed::on_write) was called.
    pub fn is_writable(&self) -> bool {
        self.inner.write.borrow().is_some()
    }

    /// The latest computed value.
    pub fn get(&self) -> T {
        self.inner.core.get()
    }

    /// Borrow the latest computed value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.core.with(f)
    }

    /// Call `listener` with `(new, old)` whenever the result changes.
    pub fn add_listener(&self, listener: impl Fn(&T, &T) + 'static) -> Listener {
        self.inner.core.notifier.add_listener(Rc::new(listener))
    }

    /// Whether anything listens to this computed.
    pub fn has_listeners(&self) -> bool {
        self.inner.core.notifier.has_listeners()
    }

    /// Number of listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.core.notifier.listener_count()
    }

    /// Stop recomputing and detach all listeners. The last value stays
    /// readable.
    pub fn dispose(&self) {
        let subscription = self.inner.subscription.borrow_mut().take();
        if let Some(subscription) = subscription {
            subscription.dispose();
        }
        self.inner.write.borrow_mut().take();
        self.inner.core.dispose();
    }

    /// Whether [`dispose`](Computed::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.inner.core.is_disposed()
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> PartialEq for Computed<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Computed");
        s.field("key", &self.inner.core.key);
        if self.inner.core.has_value() {
            self.inner.core.with(|value| {
                s.field("value", value);
            });
        }
        s.field("disposed", &self.inner.core.is_disposed()).finish()
    }
}

impl<T: Clone + PartialEq + 'static> Disposable for Computed<T> {
    fn dispose(&self) {
        Computed::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Computed::is_disposed(self)
    }
}

impl<T: Clone + PartialEq + 'static> Subscribable for Computed<T> {
    type Value = T;

    fn get(&self) -> T {
        Computed::get(self)
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

/// Shorthand for [`Computed::new`].
pub fn computed<T: Clone + PartialEq + 'static>(read: impl Fn(&Use<'_>) -> T + 'static) -> Computed<T> {
    Computed::new(read)
}

/// Shorthand for [`Computed::with_deps`].
pub fn computed_with<D, T>(deps: D, read: impl Fn(&Use<'_>, D::Values) -> T + 'static) -> Computed<T>
where
    D: Dependencies + 'static,
    T: Clone + PartialEq + 'static,
{
    Computed::with_deps(deps, read)
}
