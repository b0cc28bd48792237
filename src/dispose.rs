//! Ownership and disposal.
//!
//! An [`Owner`] records the resources it acquires and disposes them in the
//! exact reverse of acquisition order. A disposer that panics is caught and
//! logged; its siblings are still disposed. Construction that fails partway
//! ([`Owner::try_build`]) disposes whatever was acquired before the error and
//! hands the error back unchanged.
//!
//! ```ignore
//! let (owner, widget) = Owner::build(|owner| {
//!     let count = owner.auto_dispose(Observable::new(0));
//!     let label = owner.auto_dispose(computed(move |u| format!("{}", u.get(&count))));
//!     Widget { label }
//! });
//! owner.dispose(); // disposes `label`, then `count`
//! ```

use crate::error::{DisplayErrors, DisposeError};
use crate::hash::FastIndexMap;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::{Rc, Weak};

/// Something with an explicit, idempotent end of life.
pub trait Disposable {
    /// Release the object's resources. Calling it again is a no-op.
    fn dispose(&self);

    /// Whether [`dispose`](Disposable::dispose) has been called.
    fn is_disposed(&self) -> bool;
}

/// Callback registered with [`Owner::on_dispose`].
pub type DisposeCallback = Box<dyn FnOnce()>;

struct OwnedEntry {
    label: &'static str,
    // Kept typed-erased so a release can hand it back.
    item: Box<dyn Any>,
    dispose: fn(Box<dyn Any>),
}

fn dispose_boxed<D: Disposable + 'static>(item: Box<dyn Any>) {
    if let Ok(item) = item.downcast::<D>() {
        item.dispose();
    }
}

fn run_boxed(item: Box<dyn Any>) {
    if let Ok(callback) = item.downcast::<DisposeCallback>() {
        (*callback)();
    }
}

struct OwnerInner {
    entries: RefCell<FastIndexMap<u64, OwnedEntry>>,
    next_id: Cell<u64>,
    disposed: Cell<bool>,
    warned: Cell<bool>,
}

impl OwnerInner {
    fn dispose_entries(&self) -> Vec<DisposeError> {
        if self.disposed.replace(true) {
            if !self.warned.replace(true) {
                tracing::warn!("owner disposed more than once; ignoring");
            } else {
                tracing::trace!("redundant owner dispose");
            }
            return Vec::new();
        }

        let mut errors = Vec::new();
        loop {
            // Pop one at a time: a disposer may release or add entries.
            let Some((_, OwnedEntry { label, item, dispose })) = self.entries.borrow_mut().pop()
            else {
                break;
            };
            if let Err(payload) = catch_unwind(AssertUnwindSafe(move || dispose(item))) {
                let err = DisposeError::from_panic(label, payload.as_ref());
                tracing::error!(label = err.label, message = %err.message, "disposer panicked");
                errors.push(err);
            }
        }
        if !errors.is_empty() {
            tracing::debug!(failures = errors.len(), errors = %DisplayErrors(&errors), "owner disposed with failures");
        }
        errors
    }
}

impl Drop for OwnerInner {
    fn drop(&mut self) {
        if !self.disposed.get() {
            self.dispose_entries();
        }
    }
}

/// A node of the disposal tree.
///
/// Cloning an `Owner` clones the handle. When the last handle is dropped
/// the owner disposes its entries as if [`dispose`](Owner::dispose) had
/// been called.
#[derive(Clone)]
pub struct Owner {
    inner: Rc<OwnerInner>,
}

impl Owner {
    /// An owner with nothing acquired yet.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(OwnerInner {
                entries: RefCell::new(FastIndexMap::default()),
                next_id: Cell::new(0),
                disposed: Cell::new(false),
                warned: Cell::new(false),
            }),
        }
    }

    /// Run `setup` against a fresh owner.
    ///
    /// If `setup` returns `Err` or panics, everything it acquired through the
    /// owner is disposed in reverse order before the error is returned or the
    /// panic resumed.
    pub fn try_build<T, E>(setup: impl FnOnce(&Owner) -> Result<T, E>) -> Result<(Owner, T), E> {
        let owner = Owner::new();
        match catch_unwind(AssertUnwindSafe(|| setup(&owner))) {
            Ok(Ok(value)) => Ok((owner, value)),
            Ok(Err(err)) => {
                cov_mark::hit!(construction_rolled_back);
                tracing::debug!(acquired = owner.len(), "construction failed; disposing partial state");
                owner.dispose();
                Err(err)
            }
            Err(payload) => {
                cov_mark::hit!(construction_rolled_back);
                tracing::debug!(acquired = owner.len(), "construction panicked; disposing partial state");
                owner.dispose();
                resume_unwind(payload)
            }
        }
    }

    /// Infallible form of [`try_build`](Owner::try_build); still rolls back
    /// on panic.
    pub fn build<T>(setup: impl FnOnce(&Owner) -> T) -> (Owner, T) {
        match Self::try_build(|owner| Ok::<T, std::convert::Infallible>(setup(owner))) {
            Ok(built) => built,
            Err(never) => match never {},
        }
    }

    fn push<D: 'static>(&self, label: &'static str, item: D, dispose: fn(Box<dyn Any>)) -> DisposeHandle<D> {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let entry = OwnedEntry {
            label,
            item: Box::new(item),
            dispose,
        };
        self.inner.entries.borrow_mut().insert(id, entry);
        DisposeHandle {
            owner: Rc::downgrade(&self.inner),
            id,
            _item: PhantomData,
        }
    }

    /// Take ownership of `obj`; it is disposed together with this owner.
    ///
    /// Owning something after the owner was disposed disposes it right away.
    pub fn own<D: Disposable + 'static>(&self, obj: D) -> DisposeHandle<D> {
        if self.is_disposed() {
            tracing::warn!(label = std::any::type_name::<D>(), "owning an object after disposal; disposing it now");
            obj.dispose();
            return DisposeHandle::detached();
        }
        self.push(std::any::type_name::<D>(), obj, dispose_boxed::<D>)
    }

    /// Own a clone of `obj` and hand `obj` back, for use in expressions.
    pub fn auto_dispose<D: Disposable + Clone + 'static>(&self, obj: D) -> D {
        let _ = self.own(obj.clone());
        obj
    }

    /// Run `callback` when this owner is disposed.
    ///
    /// Registering on a disposed owner runs the callback immediately.
    pub fn on_dispose(&self, callback: impl FnOnce() + 'static) -> DisposeHandle<DisposeCallback> {
        if self.is_disposed() {
            tracing::warn!("on_dispose registered on a disposed owner; running it now");
            callback();
            return DisposeHandle::detached();
        }
        let callback: DisposeCallback = Box::new(callback);
        self.push("on_dispose callback", callback, run_boxed)
    }

    /// Dispose everything owned, in reverse acquisition order, and return
    /// the disposers that panicked.
    ///
    /// A second call is a no-op returning no errors.
    pub fn dispose_collect(&self) -> Vec<DisposeError> {
        self.inner.dispose_entries()
    }

    /// Dispose everything owned. Failures are logged, see
    /// [`dispose_collect`](Owner::dispose_collect).
    pub fn dispose(&self) {
        self.inner.dispose_entries();
    }

    /// Whether this owner was disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Number of items currently owned.
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    /// True when nothing is owned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable for Owner {
    fn dispose(&self) {
        Owner::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Owner::is_disposed(self)
    }
}

impl PartialEq for Owner {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("owned", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Handle to one entry of an [`Owner`].
///
/// Dropping the handle keeps the entry; [`release`](DisposeHandle::release)
/// takes the object back out without disposing it.
pub struct DisposeHandle<D> {
    owner: Weak<OwnerInner>,
    id: u64,
    _item: PhantomData<fn() -> D>,
}

impl<D: 'static> DisposeHandle<D> {
    fn detached() -> Self {
        Self {
            owner: Weak::new(),
            id: u64::MAX,
            _item: PhantomData,
        }
    }

    /// Remove the entry from its owner and return the object, undisposed.
    /// The owner will not dispose it again.
    ///
    /// Returns `None` if the entry was already disposed or released.
    pub fn release(&self) -> Option<D> {
        let owner = self.owner.upgrade()?;
        let entry = owner.entries.borrow_mut().shift_remove(&self.id)?;
        entry.item.downcast::<D>().ok().map(|item| *item)
    }
}

impl<D> Clone for DisposeHandle<D> {
    fn clone(&self) -> Self {
        Self {
            owner: Weak::clone(&self.owner),
            id: self.id,
            _item: PhantomData,
        }
    }
}

impl<D> fmt::Debug for DisposeHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposeHandle")
            .field("id", &self.id)
            .field("owner_alive", &(self.owner.strong_count() > 0))
            .finish()
    }
}

/// Holds at most one disposable.
///
/// Replacing or clearing the value disposes the previous one. Dropping the
/// holder disposes the current value.
pub struct Holder<D: Disposable> {
    value: RefCell<Option<D>>,
    disposed: Cell<bool>,
}

impl<D: Disposable> Holder<D> {
    /// An empty holder.
    pub fn new() -> Self {
        Self {
            value: RefCell::new(None),
            disposed: Cell::new(false),
        }
    }

    /// Hold `value`, disposing whatever was held before.
    ///
    /// On a disposed holder the new value is disposed immediately.
    pub fn set(&self, value: D) {
        if self.disposed.get() {
            value.dispose();
            return;
        }
        let previous = self.value.borrow_mut().replace(value);
        if let Some(previous) = previous {
            previous.dispose();
        }
    }

    /// Dispose and drop the held value.
    pub fn clear(&self) {
        let previous = self.value.borrow_mut().take();
        if let Some(previous) = previous {
            previous.dispose();
        }
    }

    /// Hand back the held value without disposing it.
    pub fn release(&self) -> Option<D> {
        self.value.borrow_mut().take()
    }

    /// True when nothing is held.
    pub fn is_empty(&self) -> bool {
        self.value.borrow().is_none()
    }

    /// A clone of the held value.
    pub fn get(&self) -> Option<D>
    where
        D: Clone,
    {
        self.value.borrow().clone()
    }
}

impl<D: Disposable> Default for Holder<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Disposable> Disposable for Holder<D> {
    fn dispose(&self) {
        self.disposed.set(true);
        self.clear();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl<D: Disposable> Drop for Holder<D> {
    fn drop(&mut self) {
        self.clear();
    }
}
