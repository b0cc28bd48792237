//! Array cells with splice-aware change notification.
//!
//! Mutations through [`MutableArrayCell`] describe themselves as a
//! [`Splice`] instead of "the whole array changed", which lets listeners such
//! as [`computed_array`] patch their own state instead of rebuilding it.
//! Listeners that ignore the descriptor can treat every notification as a
//! full change.

mod live_index;
mod mapped;

pub use live_index::{LiveIndex, make_live_index};
pub use mapped::computed_array;

use crate::arena::DepId;
use crate::bundle::bundle_changes;
use crate::cell::{CellKey, Subscribable};
use crate::dispose::{Disposable, Owner};
use crate::notifier::{Listener, Notifier};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// One contiguous edit of an array.
///
/// Relative to the array as it was *before* the edit: `deleted` were the
/// elements at `start..start + deleted.len()`, and `num_added` new elements
/// now start at `start`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Splice<T> {
    /// Index of the first changed element.
    pub start: usize,
    /// Number of elements inserted at `start`.
    pub num_added: usize,
    /// Elements removed at `start`.
    pub deleted: Vec<T>,
}

/// Listener signature for array cells: `(new, prev, splice)`.
///
/// For splice notifications the array was edited in place, `prev` is the
/// same slice as `new` and the descriptor is the description of the edit.
/// `splice` is `None` when the whole array was replaced.
pub type ArrayListener<T> = dyn Fn(&[T], &[T], Option<&Splice<T>>);

/// Which elements of an array the array owns.
///
/// Ownership is tracked per slot, so equal elements are told apart by
/// position. Adopted items wait in `pending` until an edit places them.
struct Ownership<T> {
    // Set by the first adoption; until then `slots` is not maintained.
    dispose: Option<fn(&T)>,
    // Parallel to the array while `dispose` is set.
    slots: Vec<bool>,
    pending: Vec<T>,
}

impl<T: Clone + PartialEq> Ownership<T> {
    fn new() -> Self {
        Self {
            dispose: None,
            slots: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn adopt(&mut self, item: T, dispose: fn(&T), len: usize) {
        if self.dispose.is_none() {
            self.dispose = Some(dispose);
            self.slots = vec![false; len];
        }
        self.pending.push(item);
    }

    /// Whether an item about to be placed was adopted. Each adoption is
    /// claimed by at most one item.
    fn claim(&mut self, item: &T) -> bool {
        match self.pending.iter().position(|pending| pending == item) {
            Some(pos) => {
                self.pending.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Update the slots for a splice; returns the owned deleted elements.
    fn splice(&mut self, start: usize, deleted: &[T], inserted: &[T]) -> Vec<T> {
        if self.dispose.is_none() {
            return Vec::new();
        }
        let claimed: Vec<bool> = inserted.iter().map(|item| self.claim(item)).collect();
        let removed: Vec<bool> = self
            .slots
            .splice(start..start + deleted.len(), claimed)
            .collect();
        deleted
            .iter()
            .zip(removed)
            .filter_map(|(item, owned)| owned.then(|| item.clone()))
            .collect()
    }

    /// Update the slots for a full replacement; returns the owned elements
    /// of `old` that did not carry over into `new`.
    ///
    /// Positions do not survive a replacement, so an owned old element
    /// carries over to one equal new element.
    fn replace(&mut self, old: &[T], new: &[T]) -> Vec<T> {
        if self.dispose.is_none() {
            return Vec::new();
        }
        let mut kept: Vec<usize> = (0..old.len()).filter(|&i| self.slots[i]).collect();
        let mut slots = Vec::with_capacity(new.len());
        for item in new {
            if let Some(pos) = kept.iter().position(|&i| old[i] == *item) {
                kept.remove(pos);
                slots.push(true);
            } else {
                slots.push(self.claim(item));
            }
        }
        self.slots = slots;
        kept.into_iter().map(|i| old[i].clone()).collect()
    }
}

pub(crate) struct ArrayInner<T: 'static> {
    key: CellKey,
    value: RefCell<Rc<Vec<T>>>,
    notifier: Notifier<ArrayListener<T>>,
    ownership: RefCell<Ownership<T>>,
    // Machinery of derived arrays, torn down with the cell.
    resources: Owner,
    dep: Cell<Option<DepId>>,
    disposed: Cell<bool>,
}

impl<T: Clone + PartialEq + 'static> ArrayInner<T> {
    fn new(items: Vec<T>) -> Self {
        Self {
            key: CellKey::next(),
            value: RefCell::new(Rc::new(items)),
            notifier: Notifier::new(),
            ownership: RefCell::new(Ownership::new()),
            resources: Owner::new(),
            dep: Cell::new(None),
            disposed: Cell::new(false),
        }
    }

    fn snapshot(&self) -> Rc<Vec<T>> {
        Rc::clone(&self.value.borrow())
    }

    fn len(&self) -> usize {
        self.value.borrow().len()
    }

    /// Replace `delete_count` elements at `start` with `items` and notify.
    ///
    /// Callers clamp the range. Does not drain.
    pub(crate) fn apply_splice(&self, start: usize, delete_count: usize, items: Vec<T>) -> Vec<T> {
        if self.disposed.get() {
            tracing::debug!(key = ?self.key, "splice on a disposed array ignored");
            return Vec::new();
        }
        if delete_count == 0 && items.is_empty() {
            self.dispose_unplaced();
            return Vec::new();
        }
        let num_added = items.len();
        let deleted: Vec<T> = {
            let mut value = self.value.borrow_mut();
            // Copies only if a listener still holds an older snapshot.
            Rc::make_mut(&mut *value)
                .splice(start..start + delete_count, items)
                .collect()
        };
        let snapshot = self.snapshot();
        let released = self.ownership.borrow_mut().splice(
            start,
            &deleted,
            &snapshot[start..start + num_added],
        );
        let splice = Splice {
            start,
            num_added,
            deleted,
        };
        self.notifier
            .emit(|cb| cb(&snapshot, &snapshot, Some(&splice)));
        self.release(&released);
        self.dispose_unplaced();
        splice.deleted
    }

    /// Replace the whole array and notify with no splice. Does not drain.
    pub(crate) fn replace(&self, items: Vec<T>, force: bool) {
        if self.disposed.get() {
            tracing::debug!(key = ?self.key, "write to a disposed array ignored");
            return;
        }
        if !force && **self.value.borrow() == items {
            self.dispose_unplaced();
            return;
        }
        let new = Rc::new(items);
        let old = self.value.replace(Rc::clone(&new));
        let released = self.ownership.borrow_mut().replace(&old, &new);
        self.notifier.emit(|cb| cb(&new, &old, None));
        self.release(&released);
        self.dispose_unplaced();
    }

    fn release(&self, items: &[T]) {
        let dispose = self.ownership.borrow().dispose;
        if let Some(dispose) = dispose {
            for item in items {
                dispose(item);
            }
        }
    }

    /// Dispose adopted items the last edit did not place in the array.
    fn dispose_unplaced(&self) {
        let unplaced = std::mem::take(&mut self.ownership.borrow_mut().pending);
        if !unplaced.is_empty() {
            tracing::trace!(key = ?self.key, count = unplaced.len(), "disposing adopted items that were not placed");
            self.release(&unplaced);
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            tracing::trace!(key = ?self.key, "redundant array dispose");
            return;
        }
        self.notifier.dispose();
        self.resources.dispose();
        self.dep.set(None);

        let owned: Vec<T> = {
            let mut ownership = self.ownership.borrow_mut();
            let slots = std::mem::take(&mut ownership.slots);
            let mut owned: Vec<T> = self
                .value
                .borrow()
                .iter()
                .zip(slots)
                .filter_map(|(item, owned)| owned.then(|| item.clone()))
                .collect();
            owned.append(&mut ownership.pending);
            owned
        };
        self.release(&owned);
    }
}

impl<T: 'static> Drop for ArrayInner<T> {
    fn drop(&mut self) {
        if self.disposed.get() {
            return;
        }
        let ownership = self.ownership.get_mut();
        let Some(dispose) = ownership.dispose else {
            return;
        };
        for (item, owned) in self.value.get_mut().iter().zip(&ownership.slots) {
            if *owned {
                dispose(item);
            }
        }
        for item in &ownership.pending {
            dispose(item);
        }
    }
}

/// A read-only array cell.
///
/// The value is kept behind an `Rc`, so [`snapshot`](ArrayCell::snapshot)
/// and dependency reads through [`Use::get`](crate::Use::get) are cheap.
/// Derived arrays ([`computed_array`]) are `ArrayCell`s; writable arrays are
/// [`MutableArrayCell`]s, which dereference to `ArrayCell`.
pub struct ArrayCell<T: 'static> {
    pub(crate) inner: Rc<ArrayInner<T>>,
}

impl<T: Clone + PartialEq + 'static> ArrayCell<T> {
    pub(crate) fn from_vec(items: Vec<T>) -> Self {
        Self {
            inner: Rc::new(ArrayInner::new(items)),
        }
    }

    /// A copy of the current elements.
    pub fn get(&self) -> Vec<T> {
        Vec::clone(&self.inner.value.borrow())
    }

    /// Shared handle to the current elements; later edits do not affect it.
    pub fn snapshot(&self) -> Rc<Vec<T>> {
        self.inner.snapshot()
    }

    /// Borrow the current elements.
    ///
    /// Mutating this array from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `listener` with `(new, prev, splice)` after every change.
    pub fn add_listener(
        &self,
        listener: impl Fn(&[T], &[T], Option<&Splice<T>>) + 'static,
    ) -> Listener {
        self.inner.notifier.add_listener(Rc::new(listener))
    }

    /// Whether anything listens to this array.
    pub fn has_listeners(&self) -> bool {
        self.inner.notifier.has_listeners()
    }

    /// Number of listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.notifier.listener_count()
    }

    /// Adopt `item`: it is disposed when an edit removes it from the array,
    /// or when the array is disposed while still holding it.
    ///
    /// ```ignore
    /// let rows = MutableArrayCell::new(Vec::new());
    /// rows.push(rows.auto_dispose(Row::create()));
    /// ```
    pub fn auto_dispose(&self, item: T) -> T
    where
        T: Disposable,
    {
        if self.inner.disposed.get() {
            tracing::warn!(key = ?self.inner.key, "adopting an item into a disposed array; disposing it now");
            item.dispose();
            return item;
        }
        let len = self.inner.len();
        self.inner
            .ownership
            .borrow_mut()
            .adopt(item.clone(), |item: &T| item.dispose(), len);
        item
    }

    /// Detach all listeners and dispose adopted items still present.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Whether [`dispose`](ArrayCell::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl<T: 'static> Clone for ArrayCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> PartialEq for ArrayCell<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ArrayCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayCell")
            .field("key", &self.inner.key)
            .field("items", &self.inner.value.borrow())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Disposable for ArrayCell<T> {
    fn dispose(&self) {
        ArrayCell::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        ArrayCell::is_disposed(self)
    }
}

impl<T: Clone + PartialEq + 'static> Subscribable for ArrayCell<T> {
    /// Tracked reads return the shared snapshot rather than a copy.
    type Value = Rc<Vec<T>>;

    fn get(&self) -> Rc<Vec<T>> {
        self.snapshot()
    }

    fn cell_key(&self) -> CellKey {
        self.inner.key
    }

    fn dep_id(&self) -> Option<DepId> {
        self.inner.dep.get()
    }

    fn subscribe_changes(&self, on_change: Rc<dyn Fn()>) -> Listener {
        self.inner
            .notifier
            .add_listener(Rc::new(move |_: &[T], _: &[T], _: Option<&Splice<T>>| on_change()))
    }
}

/// Resolve a possibly negative `start` the way array splicing does: negative
/// values count from the end, and the result is clamped to `0..=len`.
fn resolve_start(start: isize, len: usize) -> usize {
    if start < 0 {
        len.saturating_sub(start.unsigned_abs())
    } else {
        start.unsigned_abs().min(len)
    }
}

/// A writable array cell.
///
/// Every mutator runs as a bundle: listeners see the edit immediately, and
/// derived cells recompute once after all listeners ran.
///
/// # Example
/// ```ignore
/// let arr = MutableArrayCell::new(vec![1, 2, 3]);
/// let _l = arr.add_listener(|_, _, splice| println!("{splice:?}"));
/// arr.push(4); // Some(Splice { start: 3, num_added: 1, deleted: [] })
/// ```
pub struct MutableArrayCell<T: 'static> {
    cell: ArrayCell<T>,
}

impl<T: Clone + PartialEq + 'static> MutableArrayCell<T> {
    /// Create a cell holding `items`.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            cell: ArrayCell::from_vec(items),
        }
    }

    /// A copy of the current elements.
    pub fn get(&self) -> Vec<T> {
        self.cell.get()
    }

    /// The read-only view of this cell.
    pub fn as_array(&self) -> &ArrayCell<T> {
        &self.cell
    }

    fn edit<R>(&self, f: impl FnOnce(&ArrayInner<T>) -> R) -> R {
        let inner = &self.cell.inner;
        bundle_changes(|| f(inner))
    }

    /// Append `item`; returns the new length.
    pub fn push(&self, item: T) -> usize {
        self.extend([item])
    }

    /// Append `items`; returns the new length.
    pub fn extend(&self, items: impl IntoIterator<Item = T>) -> usize {
        let items: Vec<T> = items.into_iter().collect();
        self.edit(|inner| {
            inner.apply_splice(inner.len(), 0, items);
            inner.len()
        })
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<T> {
        self.edit(|inner| {
            let len = inner.len();
            if len == 0 {
                return None;
            }
            inner.apply_splice(len - 1, 1, Vec::new()).pop()
        })
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<T> {
        self.edit(|inner| {
            if inner.len() == 0 {
                return None;
            }
            inner.apply_splice(0, 1, Vec::new()).pop()
        })
    }

    /// Insert `item` at the front; returns the new length.
    pub fn unshift(&self, item: T) -> usize {
        self.unshift_all([item])
    }

    /// Insert `items` at the front, keeping their order; returns the new
    /// length.
    pub fn unshift_all(&self, items: impl IntoIterator<Item = T>) -> usize {
        let items: Vec<T> = items.into_iter().collect();
        self.edit(|inner| {
            inner.apply_splice(0, 0, items);
            inner.len()
        })
    }

    /// Remove up to `delete_count` elements at `start` and insert `items`
    /// there. Returns the removed elements.
    ///
    /// A negative `start` counts from the end; out-of-range values are
    /// clamped, so this never panics.
    pub fn splice(
        &self,
        start: isize,
        delete_count: usize,
        items: impl IntoIterator<Item = T>,
    ) -> Vec<T> {
        let items: Vec<T> = items.into_iter().collect();
        self.edit(|inner| {
            let len = inner.len();
            let start = resolve_start(start, len);
            let delete_count = delete_count.min(len - start);
            inner.apply_splice(start, delete_count, items)
        })
    }

    /// Replace the whole array if it differs from `items`.
    pub fn set(&self, items: Vec<T>) {
        self.edit(|inner| inner.replace(items, false));
    }

    /// Replace the whole array and notify even if nothing changed.
    pub fn set_and_trigger(&self, items: Vec<T>) {
        self.edit(|inner| inner.replace(items, true));
    }
}

impl<T: 'static> Deref for MutableArrayCell<T> {
    type Target = ArrayCell<T>;

    fn deref(&self) -> &ArrayCell<T> {
        &self.cell
    }
}

impl<T: 'static> Clone for MutableArrayCell<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: 'static> PartialEq for MutableArrayCell<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cell == other.cell
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for MutableArrayCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.cell, f)
    }
}

impl<T: Clone + PartialEq + 'static> Default for MutableArrayCell<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: Clone + PartialEq + 'static> Disposable for MutableArrayCell<T> {
    fn dispose(&self) {
        self.cell.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.cell.is_disposed()
    }
}

impl<T: Clone + PartialEq + 'static> Subscribable for MutableArrayCell<T> {
    type Value = Rc<Vec<T>>;

    fn get(&self) -> Rc<Vec<T>> {
        self.cell.snapshot()
    }

    fn cell_key(&self) -> CellKey {
        self.cell.inner.key
    }

    fn dep_id(&self) -> Option<DepId> {
        None
    }

    fn subscribe_changes(&self, on_change: Rc<dyn Fn()>) -> Listener {
        self.cell.subscribe_changes(on_change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Emissions<T> = Rc<RefCell<Vec<(Vec<T>, Option<Splice<T>>)>>>;

    fn record<T: Clone + PartialEq + 'static>(arr: &ArrayCell<T>) -> (Emissions<T>, Listener) {
        let log: Emissions<T> = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let listener = arr.add_listener(move |new, _, splice| {
            log_clone.borrow_mut().push((new.to_vec(), splice.cloned()))
        });
        (log, listener)
    }

    #[test]
    fn push_emits_splice() {
        let arr = MutableArrayCell::new(vec![1, 2, 3]);
        let (log, _listener) = record(&arr);

        assert_eq!(arr.push(4), 4);
        assert_eq!(arr.get(), vec![1, 2, 3, 4]);
        assert_eq!(
            *log.borrow(),
            vec![(
                vec![1, 2, 3, 4],
                Some(Splice {
                    start: 3,
                    num_added: 1,
                    deleted: vec![]
                })
            )]
        );
    }

    #[test]
    fn mutators_return_array_method_results() {
        let arr = MutableArrayCell::new(vec!['b', 'c']);
        assert_eq!(arr.unshift('a'), 3);
        assert_eq!(arr.pop(), Some('c'));
        assert_eq!(arr.shift(), Some('a'));
        assert_eq!(arr.extend(['x', 'y']), 3);
        assert_eq!(arr.unshift_all(['0', '1']), 5);
        assert_eq!(arr.get(), vec!['0', '1', 'b', 'x', 'y']);

        let empty: MutableArrayCell<char> = MutableArrayCell::default();
        let (log, _listener) = record(&empty);
        assert_eq!(empty.pop(), None);
        assert_eq!(empty.shift(), None);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn splice_clamps_like_array_splice() {
        let arr = MutableArrayCell::new(vec![10, 20, 30, 40]);
        let (log, _listener) = record(&arr);

        assert_eq!(arr.splice(-2, 1, [35, 36]), vec![30]);
        assert_eq!(arr.get(), vec![10, 20, 35, 36, 40]);
        assert_eq!(
            log.borrow()[0].1,
            Some(Splice {
                start: 2,
                num_added: 2,
                deleted: vec![30]
            })
        );

        assert_eq!(arr.splice(-100, 2, []), vec![10, 20]);
        assert_eq!(arr.splice(100, 5, [50]), Vec::<i32>::new());
        assert_eq!(arr.splice(1, 100, []), vec![36, 40, 50]);
        assert_eq!(arr.get(), vec![35]);
    }

    #[test]
    fn set_compares_contents() {
        let arr = MutableArrayCell::new(vec![1, 2]);
        let (log, _listener) = record(&arr);

        arr.set(vec![1, 2]);
        assert!(log.borrow().is_empty());
        arr.set(vec![3]);
        arr.set_and_trigger(vec![3]);
        assert_eq!(*log.borrow(), vec![(vec![3], None), (vec![3], None)]);
    }

    #[test]
    fn listener_snapshot_survives_nested_edit() {
        let arr = MutableArrayCell::new(vec![1]);
        let writer = arr.clone();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let _listener = arr.add_listener(move |new, _, _| {
            if new.len() < 3 {
                writer.push(new.len() as i32 + 1);
            }
            seen_clone.borrow_mut().push(new.to_vec());
        });

        arr.push(2);
        assert_eq!(arr.get(), vec![1, 2, 3]);
        assert_eq!(*seen.borrow(), vec![vec![1, 2, 3], vec![1, 2]]);
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Item {
        id: u32,
        disposed: Rc<Cell<bool>>,
    }

    impl Item {
        fn new(id: u32) -> Self {
            Self {
                id,
                disposed: Rc::new(Cell::new(false)),
            }
        }
    }

    impl Disposable for Item {
        fn dispose(&self) {
            self.disposed.set(true);
        }

        fn is_disposed(&self) -> bool {
            self.disposed.get()
        }
    }

    #[test]
    fn adopted_items_are_disposed_on_removal_and_disposal() {
        let arr = MutableArrayCell::new(Vec::new());
        let a = arr.auto_dispose(Item::new(1));
        let b = arr.auto_dispose(Item::new(2));
        let foreign = Item::new(3);
        arr.extend([a.clone(), b.clone(), foreign.clone()]);

        arr.shift();
        assert!(a.is_disposed());
        arr.pop();
        assert!(!foreign.is_disposed());

        arr.dispose();
        assert!(b.is_disposed());
    }

    #[test]
    fn full_replacement_disposes_adopted_items_not_kept() {
        let arr = MutableArrayCell::new(Vec::new());
        let a = arr.auto_dispose(Item::new(1));
        let b = arr.auto_dispose(Item::new(2));
        arr.extend([a.clone(), b.clone()]);

        arr.set(vec![b.clone()]);
        assert!(a.is_disposed());
        assert!(!b.is_disposed());
    }

    #[test]
    fn equal_adopted_items_are_tracked_by_position() {
        let arr = MutableArrayCell::new(Vec::new());
        let first = arr.auto_dispose(Item::new(1));
        let second = arr.auto_dispose(Item::new(1));
        assert_eq!(first, second);
        arr.extend([first.clone(), second.clone()]);

        arr.pop();
        assert!(second.is_disposed());
        assert!(!first.is_disposed());

        arr.unshift(Item::new(1));
        arr.shift();
        assert!(!first.is_disposed());

        arr.dispose();
        assert!(first.is_disposed());
    }

    #[test]
    fn adopted_item_left_out_of_an_edit_is_disposed() {
        let arr = MutableArrayCell::new(vec![Item::new(1)]);
        let stray = arr.auto_dispose(Item::new(2));
        arr.push(Item::new(3));
        assert!(stray.is_disposed());
    }

    #[test]
    fn disposed_array_ignores_edits() {
        let arr = MutableArrayCell::new(vec![1]);
        let (log, listener) = record(&arr);
        arr.dispose();
        arr.dispose();

        assert!(listener.is_disposed());
        assert_eq!(arr.push(2), 1);
        assert_eq!(arr.get(), vec![1]);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn resolve_start_handles_negative_and_overflow() {
        assert_eq!(resolve_start(-1, 4), 3);
        assert_eq!(resolve_start(-10, 4), 0);
        assert_eq!(resolve_start(2, 4), 2);
        assert_eq!(resolve_start(9, 4), 4);
        assert_eq!(resolve_start(isize::MIN, 4), 0);
    }
}
