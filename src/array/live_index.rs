use super::{ArrayCell, ArrayInner, Splice};
use crate::arena::DepId;
use crate::cell::{CellKey, Subscribable};
use crate::dispose::Disposable;
use crate::notifier::Listener;
use crate::observable::Observable;
use std::fmt;
use std::rc::{Rc, Weak};

/// Where an index ends up after `splice`.
///
/// Indices before the edit stay put and indices after it shift by the size
/// difference. An index inside the deleted range stays if an inserted
/// element now occupies it, otherwise it moves to just past the insertion.
fn follow_splice<T>(index: usize, splice: &Splice<T>) -> usize {
    let deleted_end = splice.start + splice.deleted.len();
    let added_end = splice.start + splice.num_added;
    if index < splice.start {
        index
    } else if index < deleted_end {
        index.min(added_end)
    } else {
        index - splice.deleted.len() + splice.num_added
    }
}

fn clamp(index: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    index.map(|index| index.min(len - 1))
}

struct LiveIndexInner {
    index: Observable<Option<usize>>,
    listener: Listener,
    len: Box<dyn Fn() -> usize>,
}

impl Drop for LiveIndexInner {
    fn drop(&mut self) {
        self.listener.dispose();
    }
}

/// An index into an array cell that follows its element across edits.
///
/// Always within bounds: `None` while the array is empty, otherwise at most
/// `len - 1`. Created by [`make_live_index`]. Readable as a cell, so
/// computeds can depend on it.
#[derive(Clone)]
pub struct LiveIndex {
    inner: Rc<LiveIndexInner>,
}

/// Track `initial` in `array`.
///
/// ```ignore
/// let items = MutableArrayCell::new(vec!["a", "b", "c"]);
/// let selected = make_live_index(&items, Some(1)); // "b"
/// items.unshift("z");
/// assert_eq!(selected.get(), Some(2)); // still "b"
/// ```
pub fn make_live_index<T>(array: &ArrayCell<T>, initial: Option<usize>) -> LiveIndex
where
    T: Clone + PartialEq + 'static,
{
    let index = Observable::new(clamp(initial, array.len()));
    let listener = {
        let index = index.clone();
        array.add_listener(move |new, _, splice| {
            let next = match (index.get(), splice) {
                (Some(current), Some(splice)) => Some(follow_splice(current, splice)),
                (current, _) => current,
            };
            index.set(clamp(next, new.len()));
        })
    };
    let weak: Weak<ArrayInner<T>> = Rc::downgrade(&array.inner);
    let len = Box::new(move || weak.upgrade().map_or(0, |inner| inner.len()));
    LiveIndex {
        inner: Rc::new(LiveIndexInner {
            index,
            listener,
            len,
        }),
    }
}

impl LiveIndex {
    /// Current index.
    pub fn get(&self) -> Option<usize> {
        self.inner.index.get()
    }

    /// Move to `index`, clamped to the array bounds.
    pub fn set(&self, index: Option<usize>) {
        let len = (self.inner.len)();
        self.inner.index.set(clamp(index, len));
    }

    /// Call `listener` with `(new, old)` whenever the index moves.
    pub fn add_listener(&self, listener: impl Fn(&Option<usize>, &Option<usize>) + 'static) -> Listener {
        self.inner.index.add_listener(listener)
    }

    /// Stop following the array.
    pub fn dispose(&self) {
        self.inner.listener.dispose();
        self.inner.index.dispose();
    }

    /// Whether [`dispose`](LiveIndex::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.inner.index.is_disposed()
    }
}

impl fmt::Debug for LiveIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LiveIndex").field(&self.get()).finish()
    }
}

impl Disposable for LiveIndex {
    fn dispose(&self) {
        LiveIndex::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        LiveIndex::is_disposed(self)
    }
}

impl Subscribable for LiveIndex {
    type Value = Option<usize>;

    fn get(&self) -> Option<usize> {
        LiveIndex::get(self)
    }

    fn cell_key(&self) -> CellKey {
        self.inner.index.cell_key()
    }

    fn dep_id(&self) -> Option<DepId> {
        None
    }

    fn subscribe_changes(&self, on_change: Rc<dyn Fn()>) -> Listener {
        self.inner.index.subscribe_changes(on_change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::MutableArrayCell;
    use crate::computed;

    #[test]
    fn follows_element_across_edits() {
        let items = MutableArrayCell::new(vec!['a', 'b', 'c', 'd']);
        let index = make_live_index(&items, Some(2));

        items.unshift('z');
        assert_eq!(index.get(), Some(3));
        items.splice(0, 2, []);
        assert_eq!(index.get(), Some(1));
        items.push('e');
        assert_eq!(index.get(), Some(1));
        assert_eq!(items.get()[1], 'c');
    }

    #[test]
    fn index_inside_deleted_range() {
        let splice = Splice {
            start: 1,
            num_added: 1,
            deleted: vec![0, 0, 0],
        };
        assert_eq!(follow_splice(1, &splice), 1);
        assert_eq!(follow_splice(3, &splice), 2);
        assert_eq!(follow_splice(4, &splice), 2);
        assert_eq!(follow_splice(0, &splice), 0);
    }

    #[test]
    fn stays_in_bounds() {
        let items = MutableArrayCell::new(vec![1, 2, 3]);
        let index = make_live_index(&items, Some(10));
        assert_eq!(index.get(), Some(2));

        items.pop();
        assert_eq!(index.get(), Some(1));
        items.set(Vec::new());
        assert_eq!(index.get(), None);

        index.set(Some(0));
        assert_eq!(index.get(), None);
        items.push(7);
        assert_eq!(index.get(), None);
        index.set(Some(5));
        assert_eq!(index.get(), Some(0));
    }

    #[test]
    fn readable_as_dependency() {
        let items = MutableArrayCell::new(vec!["x", "y"]);
        let index = make_live_index(&items, Some(1));
        let (reader_items, reader_index) = (items.as_array().clone(), index.clone());
        let selected = computed(move |u| {
            let items = u.get(&reader_items);
            u.get(&reader_index).map(|i| items[i])
        });
        assert_eq!(selected.get(), Some("y"));

        items.unshift("w");
        assert_eq!(selected.get(), Some("y"));
        index.set(Some(0));
        assert_eq!(selected.get(), Some("w"));
    }

    #[test]
    fn dropping_last_handle_detaches() {
        let items = MutableArrayCell::new(vec![1]);
        let index = make_live_index(&items, Some(0));
        assert_eq!(items.listener_count(), 1);
        drop(index);
        assert_eq!(items.listener_count(), 0);
    }
}
