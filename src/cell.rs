//! State shared by every scalar cell type.

use crate::arena::DepId;
use crate::notifier::{Listener, Notifier};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

thread_local! {
    static NEXT_CELL_KEY: Cell<u64> = const { Cell::new(0) };
}

/// Identity of a cell, stable for its lifetime.
///
/// Used as the key of a subscription's dynamic dependency table.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CellKey(u64);

impl CellKey {
    pub(crate) fn next() -> Self {
        NEXT_CELL_KEY.with(|next| {
            let key = next.get();
            next.set(key + 1);
            CellKey(key)
        })
    }
}

/// A cell that can be read and depended upon.
///
/// Implemented by [`Observable`](crate::Observable),
/// [`Computed`](crate::Computed), [`PureComputed`](crate::PureComputed) and
/// [`ArrayCell`](crate::ArrayCell); this is what [`Use::get`](crate::Use::get)
/// and explicit dependency lists accept.
pub trait Subscribable {
    /// Type returned by [`get`](Subscribable::get).
    type Value;

    /// Current value.
    fn get(&self) -> Self::Value;

    /// Identity of the cell.
    fn cell_key(&self) -> CellKey;

    /// Scheduler token of a derived cell; `None` for plain cells.
    fn dep_id(&self) -> Option<DepId>;

    /// Call `on_change` on every change of the cell, without arguments.
    fn subscribe_changes(&self, on_change: Rc<dyn Fn()>) -> Listener;
}

impl<S: Subscribable + ?Sized> Subscribable for Rc<S> {
    type Value = S::Value;

    fn get(&self) -> Self::Value {
        (**self).get()
    }

    fn cell_key(&self) -> CellKey {
        (**self).cell_key()
    }

    fn dep_id(&self) -> Option<DepId> {
        (**self).dep_id()
    }

    fn subscribe_changes(&self, on_change: Rc<dyn Fn()>) -> Listener {
        (**self).subscribe_changes(on_change)
    }
}

pub(crate) struct CellCore<T: 'static> {
    pub(crate) key: CellKey,
    value: RefCell<Option<T>>,
    pub(crate) notifier: Notifier<dyn Fn(&T, &T)>,
    // Set while the current value is owned by the cell.
    owned: Cell<Option<fn(&T)>>,
    disposed: Cell<bool>,
}

impl<T: 'static> CellCore<T> {
    pub(crate) fn new(value: Option<T>) -> Self {
        Self {
            key: CellKey::next(),
            value: RefCell::new(value),
            notifier: Notifier::new(),
            owned: Cell::new(None),
            disposed: Cell::new(false),
        }
    }

    pub(crate) fn has_value(&self) -> bool {
        self.value.borrow().is_some()
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.value.borrow();
        f(value
            .as_ref()
            .expect("derived cell read before its first evaluation"))
    }

    /// Store without notifying anyone.
    pub(crate) fn store(&self, value: T) {
        *self.value.borrow_mut() = Some(value);
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub(crate) fn subscribe_changes(&self, on_change: Rc<dyn Fn()>) -> Listener {
        self.notifier
            .add_listener(Rc::new(move |_: &T, _: &T| on_change()))
    }

    pub(crate) fn dispose(&self) {
        if self.disposed.replace(true) {
            tracing::trace!(key = ?self.key, "redundant cell dispose");
            return;
        }
        self.notifier.dispose();
        if let Some(dispose) = self.owned.take() {
            // Writes are ignored from here on, so the shared borrow is safe.
            if let Some(value) = self.value.borrow().as_ref() {
                dispose(value);
            }
        }
    }
}

impl<T: Clone + 'static> CellCore<T> {
    pub(crate) fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Store `value`, then call listeners with `(new, old)`.
    ///
    /// The first value of a derived cell is stored without notification. A
    /// value owned by the cell is disposed after the listeners ran.
    pub(crate) fn set_and_trigger(&self, value: T) {
        if let Some((old, dispose)) = self.swap(value, None) {
            dispose(&old);
        }
    }

    /// Store `value`, owned through `adopt` if given, and notify.
    ///
    /// Returns the previous value with its disposer if the cell owned it;
    /// disposing it is left to the caller. On a disposed cell an adopted
    /// value is disposed right away.
    pub(crate) fn swap(&self, value: T, adopt: Option<fn(&T)>) -> Option<(T, fn(&T))> {
        if self.disposed.get() {
            tracing::debug!(key = ?self.key, "write to a disposed cell ignored");
            if let Some(dispose) = adopt {
                dispose(&value);
            }
            return None;
        }
        let owned = self.owned.replace(adopt);
        let new = value.clone();
        let old = self.value.replace(Some(value));
        if let Some(old) = &old {
            self.notifier.emit(|cb| cb(&new, old));
        }
        owned.zip(old).map(|(dispose, old)| (old, dispose))
    }
}

impl<T: Clone + PartialEq + 'static> CellCore<T> {
    /// Returns whether the value changed.
    pub(crate) fn set_if_changed(&self, value: T) -> bool {
        let unchanged = self.value.borrow().as_ref() == Some(&value);
        if unchanged || self.disposed.get() {
            if self.disposed.get() {
                tracing::debug!(key = ?self.key, "write to a disposed cell ignored");
            }
            return false;
        }
        self.set_and_trigger(value);
        true
    }
}

impl<T: 'static> Drop for CellCore<T> {
    fn drop(&mut self) {
        if let (Some(dispose), Some(value)) = (self.owned.get(), self.value.get_mut().as_ref()) {
            dispose(value);
        }
    }
}
