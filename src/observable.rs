use crate::arena::DepId;
use crate::cell::{CellCore, CellKey, Subscribable};
use crate::dispose::Disposable;
use crate::notifier::Listener;
use crate::scheduler::drain;
use std::fmt;
use std::rc::Rc;

/// A mutable value cell.
///
/// Writes that change the value notify listeners synchronously with
/// `(new, old)`, then let the scheduler recompute dependent derived cells.
///
/// # Example
/// ```ignore
/// let count = Observable::new(1);
/// let listener = count.add_listener(|new, old| println!("{old} -> {new}"));
///
/// count.set(2);   // prints "1 -> 2"
/// count.set(2);   // equal value, no notification
/// count.update(|n| n * 10);
/// ```
///
/// Cloning an `Observable` clones the handle, not the value.
pub struct Observable<T: 'static> {
    core: Rc<CellCore<T>>,
}

impl<T: Clone + 'static> Observable<T> {
    /// Create a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            core: Rc::new(CellCore::new(Some(value))),
        }
    }

    /// A clone of the current value. Never triggers recomputation.
    pub fn get(&self) -> T {
        self.core.get()
    }

    /// Borrow the current value.
    ///
    /// Writing to this cell from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.core.with(f)
    }

    /// Store `value` if it differs from the current one, notify listeners
    /// and recompute dependents.
    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        if self.core.set_if_changed(value) {
            drain();
        }
    }

    /// Store `value` and notify listeners even if it equals the current one.
    pub fn set_and_trigger(&self, value: T) {
        self.core.set_and_trigger(value);
        drain();
    }

    /// Replace the value with `f(&current)`, under the same rules as
    /// [`set`](Observable::set).
    pub fn update(&self, f: impl FnOnce(&T) -> T)
    where
        T: PartialEq,
    {
        let next = self.core.with(f);
        self.set(next);
    }

    /// Call `listener` with `(new, old)` after every change.
    pub fn add_listener(&self, listener: impl Fn(&T, &T) + 'static) -> Listener {
        self.core.notifier.add_listener(Rc::new(listener))
    }

    /// Whether anything listens to this cell, including subscriptions.
    pub fn has_listeners(&self) -> bool {
        self.core.notifier.has_listeners()
    }

    /// Number of listeners, including subscriptions.
    pub fn listener_count(&self) -> usize {
        self.core.notifier.listener_count()
    }

    /// Set the value and take ownership of it.
    ///
    /// The value is disposed when it is replaced by a later write (after
    /// that write's listeners ran) or when the cell is disposed. Assigning
    /// a value equal to the owned one keeps it alive.
    pub fn auto_dispose(&self, value: T)
    where
        T: Disposable + PartialEq,
    {
        let previous = self.core.swap(value, Some(|value: &T| value.dispose()));
        if let Some((old, dispose)) = previous {
            if self.core.with(|current| *current != old) {
                dispose(&old);
            }
        }
        drain();
    }

    /// Detach all listeners and dispose an owned value.
    ///
    /// The last value stays readable.
    pub fn dispose(&self) {
        self.core.dispose();
    }

    /// Whether [`dispose`](Observable::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }
}

impl<T: 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T: 'static> PartialEq for Observable<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl<T: Clone + Default + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.with(|value| {
            f.debug_struct("Observable")
                .field("key", &self.core.key)
                .field("value", value)
                .finish()
        })
    }
}

impl<T: Clone + 'static> Disposable for Observable<T> {
    fn dispose(&self) {
        Observable::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Observable::is_disposed(self)
    }
}

impl<T: Clone + 'static> Subscribable for Observable<T> {
    type Value = T;

    fn get(&self) -> T {
        self.core.get()
    }

    fn cell_key(&self) -> CellKey {
        self.core.key
    }

    fn dep_id(&self) -> Option<DepId> {
        None
    }

    fn subscribe_changes(&self, on_change: Rc<dyn Fn()>) -> Listener {
        self.core.subscribe_changes(on_change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn set_notifies_only_on_change() {
        let cell = Observable::new(5);
        let calls = Rc::new(RefCell::new(Vec::new()));
        let calls_clone = calls.clone();
        let _listener = cell.add_listener(move |new, old| calls_clone.borrow_mut().push((*new, *old)));

        cell.set(5);
        cell.set(6);
        cell.set(6);
        cell.update(|n| n + 1);
        assert_eq!(*calls.borrow(), vec![(6, 5), (7, 6)]);
        assert_eq!(cell.get(), 7);
    }

    #[test]
    fn set_and_trigger_always_notifies() {
        let cell = Observable::new("x".to_string());
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let _listener = cell.add_listener(move |_, _| calls_clone.set(calls_clone.get() + 1));

        cell.set_and_trigger("x".to_string());
        cell.set_and_trigger("x".to_string());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn listener_may_write_back_to_its_cell() {
        let cell = Observable::new(0);
        let writer = cell.clone();
        let _clamp = cell.add_listener(move |new, _| {
            if *new > 10 {
                writer.set(10);
            }
        });

        cell.set(42);
        assert_eq!(cell.get(), 10);
    }

    #[test]
    fn disposed_cell_ignores_writes_and_keeps_last_value() {
        let cell = Observable::new(1);
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let listener = cell.add_listener(move |_, _| calls_clone.set(calls_clone.get() + 1));

        cell.dispose();
        cell.dispose();
        cell.set(2);
        assert!(cell.is_disposed());
        assert!(listener.is_disposed());
        assert_eq!(cell.get(), 1);
        assert_eq!(calls.get(), 0);
    }

    #[derive(Clone, PartialEq)]
    struct Resource {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Disposable for Resource {
        fn dispose(&self) {
            self.log.borrow_mut().push(format!("dispose {}", self.name));
        }

        fn is_disposed(&self) -> bool {
            false
        }
    }

    #[test]
    fn owned_value_is_disposed_after_listeners_on_replacement() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = Resource {
            name: "first",
            log: log.clone(),
        };
        let cell = Observable::new(first.clone());
        cell.auto_dispose(first);

        let log_clone = log.clone();
        let _listener = cell.add_listener(move |new: &Resource, _| {
            log_clone.borrow_mut().push(format!("listener {}", new.name))
        });

        cell.auto_dispose(Resource {
            name: "second",
            log: log.clone(),
        });
        assert_eq!(*log.borrow(), vec!["listener second", "dispose first"]);

        cell.dispose();
        assert_eq!(
            *log.borrow(),
            vec!["listener second", "dispose first", "dispose second"]
        );
    }

    #[test]
    fn reassigning_owned_value_keeps_it_alive() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let item = Resource {
            name: "item",
            log: log.clone(),
        };
        let cell = Observable::new(item.clone());
        cell.auto_dispose(item.clone());
        cell.auto_dispose(item.clone());
        assert!(log.borrow().is_empty());

        // Still owned: replacing it disposes it once.
        cell.set_and_trigger(Resource {
            name: "other",
            log: log.clone(),
        });
        assert_eq!(*log.borrow(), vec!["dispose item"]);
        cell.dispose();
        assert_eq!(*log.borrow(), vec!["dispose item"]);
    }

    #[test]
    fn handles_compare_by_identity() {
        let a = Observable::new(1);
        let b = Observable::new(1);
        assert!(a == a.clone());
        assert!(a != b);
    }
}
