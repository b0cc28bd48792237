//! Dependency-tracking subscriptions.
//!
//! A [`Subscription`] runs a callback now and again whenever one of its
//! dependencies changes. Dependencies come from two places:
//!
//! - **Static**: a fixed list given at construction ([`Dependencies`]). Their
//!   values are read before every evaluation and passed to the callback.
//!   Static dependencies stay subscribed until the subscription is disposed.
//! - **Dynamic**: cells read through [`Use::get`] during an evaluation. A
//!   cell read for the first time is subscribed to; after each evaluation,
//!   cells that were not read in it are unsubscribed.
//!
//! A dependency change never re-runs the callback synchronously. It enqueues
//! the subscription's [`DepId`] and the scheduler re-runs it in priority
//! order on the next drain.

use crate::arena::{DepId, dep_arena_insert, dep_arena_remove};
use crate::cell::{CellKey, Subscribable};
use crate::dispose::Disposable;
use crate::hash::FastIndexMap;
use crate::notifier::Listener;
use crate::scheduler::enqueue;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

type EvalCallback = Box<dyn FnMut(&Use<'_>)>;

fn boxed_callback<F: FnMut(&Use<'_>) + 'static>(f: F) -> EvalCallback {
    Box::new(f)
}

struct DynamicDep {
    listener: Listener,
    in_use: bool,
}

pub(crate) struct SubscriptionInner {
    dep: DepId,
    on_change: Rc<dyn Fn()>,
    static_listeners: RefCell<Vec<Listener>>,
    dynamic: RefCell<FastIndexMap<CellKey, DynamicDep>>,
    // Taken out while the callback runs.
    callback: RefCell<Option<EvalCallback>>,
    disposed: Cell<bool>,
}

impl SubscriptionInner {
    fn evaluate(&self) {
        struct EvaluationGuard<'a> {
            inner: &'a SubscriptionInner,
            callback: Option<EvalCallback>,
        }

        impl Drop for EvaluationGuard<'_> {
            fn drop(&mut self) {
                let callback = self.callback.take();
                if !self.inner.disposed.get() {
                    *self.inner.callback.borrow_mut() = callback;
                    self.inner.prune_unused();
                }
                // Disposed mid-evaluation: the callback drops here, outside any borrow.
            }
        }

        if self.disposed.get() {
            return;
        }
        let Some(callback) = self.callback.borrow_mut().take() else {
            tracing::trace!(dep = ?self.dep, "skipping reentrant evaluation");
            return;
        };
        self.dep.reset_priority();

        let mut guard = EvaluationGuard {
            inner: self,
            callback: Some(callback),
        };
        let tracker = Use {
            tracker: Some(self),
        };
        if let Some(callback) = guard.callback.as_mut() {
            callback(&tracker);
        }
    }

    fn track<S: Subscribable + ?Sized>(&self, cell: &S) {
        if self.disposed.get() {
            return;
        }
        let key = cell.cell_key();
        let known = match self.dynamic.borrow_mut().get_mut(&key) {
            Some(dep) => {
                dep.in_use = true;
                true
            }
            None => false,
        };
        if !known {
            // Subscribing may evaluate the cell (an idle pure computed), so
            // the table is not borrowed across this call.
            let listener = cell.subscribe_changes(Rc::clone(&self.on_change));
            self.dynamic.borrow_mut().insert(
                key,
                DynamicDep {
                    listener,
                    in_use: true,
                },
            );
        }
        self.dep.use_dep(cell.dep_id());
    }

    fn prune_unused(&self) {
        let mut stale = Vec::new();
        self.dynamic.borrow_mut().retain(|_, dep| {
            if dep.in_use {
                dep.in_use = false;
                true
            } else {
                stale.push(dep.listener.clone());
                false
            }
        });
        if !stale.is_empty() {
            cov_mark::hit!(dynamic_dependency_pruned);
            tracing::trace!(dep = ?self.dep, pruned = stale.len(), "dropped unused dependencies");
        }
        for listener in stale {
            listener.dispose();
        }
    }

    fn dependency_count(&self) -> usize {
        self.static_listeners.borrow().len() + self.dynamic.borrow().len()
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            tracing::trace!(dep = ?self.dep, "redundant subscription dispose");
            return;
        }
        let static_listeners = std::mem::take(&mut *self.static_listeners.borrow_mut());
        let dynamic_listeners: Vec<Listener> = self
            .dynamic
            .borrow_mut()
            .drain(..)
            .map(|(_, dep)| dep.listener)
            .collect();
        for listener in static_listeners.iter().chain(&dynamic_listeners) {
            listener.dispose();
        }
        let callback = self.callback.borrow_mut().take();
        drop(callback);
        dep_arena_remove(self.dep);
    }
}

impl Drop for SubscriptionInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Accessor handed to evaluation callbacks.
///
/// [`get`](Use::get) reads a cell and, inside a subscription, makes it a
/// dependency of the running evaluation.
pub struct Use<'a> {
    tracker: Option<&'a SubscriptionInner>,
}

impl Use<'static> {
    /// An accessor that reads without tracking.
    pub(crate) fn untracked() -> Self {
        Use { tracker: None }
    }
}

impl Use<'_> {
    /// Read `cell` and depend on it for this evaluation.
    ///
    /// Reading the same cell several times in one evaluation subscribes once.
    pub fn get<S: Subscribable + ?Sized>(&self, cell: &S) -> S::Value {
        if let Some(inner) = self.tracker {
            inner.track(cell);
        }
        cell.get()
    }

    /// Read a static dependency: ranks the evaluation after it without
    /// touching the dynamic table.
    fn read_static<S: Subscribable + ?Sized>(&self, cell: &S) -> S::Value {
        if let Some(inner) = self.tracker {
            inner.dep.use_dep(cell.dep_id());
        }
        cell.get()
    }

    /// Whether reads through this accessor are recorded as dependencies.
    pub fn is_tracking(&self) -> bool {
        self.tracker.is_some()
    }
}

impl fmt::Debug for Use<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Use")
            .field("dep", &self.tracker.map(|inner| inner.dep))
            .finish()
    }
}

/// A fixed list of cells a subscription depends on for its whole lifetime.
///
/// Implemented for `()`, tuples of up to six cells (of any mix of cell
/// types) and `Vec`s of cells of one type.
pub trait Dependencies {
    /// Values passed to the evaluation callback, in dependency order.
    type Values;

    /// Subscribe `on_change` to every dependency.
    fn subscribe(&self, on_change: &Rc<dyn Fn()>) -> Vec<Listener>;

    /// Read every dependency for one evaluation.
    fn read(&self, tracker: &Use<'_>) -> Self::Values;
}

impl Dependencies for () {
    type Values = ();

    fn subscribe(&self, _on_change: &Rc<dyn Fn()>) -> Vec<Listener> {
        Vec::new()
    }

    fn read(&self, _tracker: &Use<'_>) -> Self::Values {}
}

macro_rules! impl_dependencies {
    ($($ty:ident $var:ident),+) => {
        impl<$($ty: Subscribable),+> Dependencies for ($($ty,)+) {
            type Values = ($(<$ty as Subscribable>::Value,)+);

            fn subscribe(&self, on_change: &Rc<dyn Fn()>) -> Vec<Listener> {
                let ($($var,)+) = self;
                vec![$($var.subscribe_changes(Rc::clone(on_change))),+]
            }

            fn read(&self, tracker: &Use<'_>) -> Self::Values {
                let ($($var,)+) = self;
                ($(tracker.read_static($var),)+)
            }
        }
    };
}

impl_dependencies!(A a);
impl_dependencies!(A a, B b);
impl_dependencies!(A a, B b, C c);
impl_dependencies!(A a, B b, C c, D d);
impl_dependencies!(A a, B b, C c, D d, E e);
impl_dependencies!(A a, B b, C c, D d, E e, F f);

impl<S: Subscribable> Dependencies for Vec<S> {
    type Values = Vec<S::Value>;

    fn subscribe(&self, on_change: &Rc<dyn Fn()>) -> Vec<Listener> {
        self.iter()
            .map(|cell| cell.subscribe_changes(Rc::clone(on_change)))
            .collect()
    }

    fn read(&self, tracker: &Use<'_>) -> Self::Values {
        self.iter().map(|cell| tracker.read_static(cell)).collect()
    }
}

impl<D: Dependencies + ?Sized> Dependencies for Rc<D> {
    type Values = D::Values;

    fn subscribe(&self, on_change: &Rc<dyn Fn()>) -> Vec<Listener> {
        (**self).subscribe(on_change)
    }

    fn read(&self, tracker: &Use<'_>) -> Self::Values {
        (**self).read(tracker)
    }
}

/// A side-effecting reaction to cell changes.
///
/// The callback runs once during construction and again, through the
/// scheduler, after any dependency changes. Cloning clones the handle; the
/// subscription is disposed by [`dispose`](Subscription::dispose) or when the
/// last handle is dropped.
///
/// # Example
/// ```ignore
/// let name = Observable::new("world".to_string());
/// let greeting = subscribe(move |u| println!("hello {}", u.get(&name)));
/// ```
#[derive(Clone)]
#[must_use = "a subscription is disposed when dropped"]
pub struct Subscription {
    inner: Rc<SubscriptionInner>,
}

impl Subscription {
    /// Subscribe with dynamic dependencies only.
    pub fn new(mut callback: impl FnMut(&Use<'_>) + 'static) -> Self {
        Self::with_deps((), move |tracker, ()| callback(tracker))
    }

    /// Subscribe with a static dependency list; `callback` receives the
    /// dependencies' current values after the accessor.
    pub fn with_deps<D>(deps: D, mut callback: impl FnMut(&Use<'_>, D::Values) + 'static) -> Self
    where
        D: Dependencies + 'static,
    {
        let inner = Rc::new_cyclic(|weak: &Weak<SubscriptionInner>| {
            let weak = weak.clone();
            let dep = dep_arena_insert(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.evaluate();
                }
            }));
            let on_change: Rc<dyn Fn()> = Rc::new(move || enqueue(dep));
            let static_listeners = deps.subscribe(&on_change);
            let evaluate = boxed_callback(move |tracker| {
                let values = deps.read(tracker);
                callback(tracker, values);
            });
            SubscriptionInner {
                dep,
                on_change,
                static_listeners: RefCell::new(static_listeners),
                dynamic: RefCell::new(FastIndexMap::default()),
                callback: RefCell::new(Some(evaluate)),
                disposed: Cell::new(false),
            }
        });
        inner.evaluate();
        Self { inner }
    }

    /// Scheduler token of this subscription.
    pub fn dep_id(&self) -> DepId {
        self.inner.dep
    }

    /// Number of cells currently subscribed to, static and dynamic.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependency_count()
    }

    /// Unsubscribe from everything and drop the callback. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Whether the subscription was disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl Disposable for Subscription {
    fn dispose(&self) {
        Subscription::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Subscription::is_disposed(self)
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("dep", &self.inner.dep)
            .field("dependencies", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Shorthand for [`Subscription::new`].
pub fn subscribe(callback: impl FnMut(&Use<'_>) + 'static) -> Subscription {
    Subscription::new(callback)
}

/// Shorthand for [`Subscription::with_deps`].
pub fn subscribe_with<D>(deps: D, callback: impl FnMut(&Use<'_>, D::Values) + 'static) -> Subscription
where
    D: Dependencies + 'static,
{
    Subscription::with_deps(deps, callback)
}
