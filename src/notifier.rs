//! Ordered listener lists with O(1) add and remove.
//!
//! # Design
//!
//! Listeners live in a slab and are chained into a doubly linked list, so a
//! [`Listener`] handle removes its node in O(1) without searching. Emission
//! walks the list structurally, re-reading `next` after every call instead of
//! iterating a snapshot. A node removed while an emission is running is
//! unlinked from the live list but its slot is parked until the outermost
//! emission finishes, so a walker standing on it can still follow its `next`
//! pointer.
//!
//! # Invariants
//!
//! 1. Listeners are called in insertion order.
//! 2. A listener removed before the walk reaches it is not called, even when
//!    it is removed by another listener of the same emission.
//! 3. Removing a listener never causes another live listener to be skipped
//!    or called twice.
//! 4. The count-changed callback sees every 0 -> 1 transition before the new
//!    listener is linked, and every 1 -> 0 transition after the last one is
//!    unlinked.

use crate::dispose::Disposable;
use slab::Slab;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct ListenerKey {
    index: usize,
    serial: u64,
}

impl ListenerKey {
    const DETACHED: ListenerKey = ListenerKey {
        index: usize::MAX,
        serial: u64::MAX,
    };
}

struct ListenerNode<F: ?Sized> {
    callback: Rc<F>,
    prev: Option<usize>,
    next: Option<usize>,
    serial: u64,
    alive: bool,
}

struct ListenerList<F: ?Sized> {
    nodes: Slab<ListenerNode<F>>,
    head: Option<usize>,
    tail: Option<usize>,
    live: usize,
    emitting: usize,
    // Slots unlinked during an emission, freed when the outermost one ends.
    parked: Vec<usize>,
    next_serial: u64,
    disposed: bool,
}

impl<F: ?Sized> ListenerList<F> {
    fn new() -> Self {
        Self {
            nodes: Slab::new(),
            head: None,
            tail: None,
            live: 0,
            emitting: 0,
            parked: Vec::new(),
            next_serial: 0,
            disposed: false,
        }
    }

    fn push(&mut self, callback: Rc<F>) -> ListenerKey {
        let serial = self.next_serial;
        self.next_serial += 1;
        let index = self.nodes.insert(ListenerNode {
            callback,
            prev: self.tail,
            next: None,
            serial,
            alive: true,
        });
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.live += 1;
        ListenerKey { index, serial }
    }

    fn contains(&self, key: ListenerKey) -> bool {
        self.nodes
            .get(key.index)
            .is_some_and(|node| node.serial == key.serial && node.alive)
    }

    /// Unlink `key`. Callbacks freed right away are pushed onto `freed` so the
    /// caller can drop them once the list is no longer borrowed.
    fn unlink(&mut self, key: ListenerKey, freed: &mut Vec<Rc<F>>) -> bool {
        if !self.contains(key) {
            return false;
        }
        let node = &mut self.nodes[key.index];
        node.alive = false;
        let (prev, next) = (node.prev, node.next);
        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
        self.live -= 1;
        if self.emitting > 0 {
            self.parked.push(key.index);
        } else {
            freed.push(self.nodes.remove(key.index).callback);
        }
        true
    }

    fn free_parked(&mut self, freed: &mut Vec<Rc<F>>) {
        for index in std::mem::take(&mut self.parked) {
            freed.push(self.nodes.remove(index).callback);
        }
    }
}

/// Type-erased removal, so [`Listener`] does not carry the callback type.
pub(crate) trait ListenerSource {
    fn remove(&self, key: ListenerKey);
    fn contains(&self, key: ListenerKey) -> bool;
}

struct NotifierInner<F: ?Sized> {
    list: RefCell<ListenerList<F>>,
    count_changed: RefCell<Option<Rc<dyn Fn(bool)>>>,
}

impl<F: ?Sized> NotifierInner<F> {
    fn fire_count_changed(&self, has_listeners: bool) {
        let callback = self.count_changed.borrow().clone();
        if let Some(callback) = callback {
            callback(has_listeners);
        }
    }
}

impl<F: ?Sized + 'static> ListenerSource for NotifierInner<F> {
    fn remove(&self, key: ListenerKey) {
        let mut freed = Vec::new();
        let now_empty = {
            let mut list = self.list.borrow_mut();
            if !list.unlink(key, &mut freed) {
                return;
            }
            list.live == 0 && !list.disposed
        };
        drop(freed);
        if now_empty {
            self.fire_count_changed(false);
        }
    }

    fn contains(&self, key: ListenerKey) -> bool {
        self.list.borrow().contains(key)
    }
}

/// Ordered multiset of callbacks of type `F`.
///
/// `F` is usually an unsized closure type such as `dyn Fn(&T, &T)`; the
/// caller decides how to invoke it in [`emit`](Notifier::emit).
///
/// ```ignore
/// let notifier: Notifier<dyn Fn(&str)> = Notifier::new();
/// let listener = notifier.add_listener(Rc::new(|msg: &str| println!("{msg}")));
/// notifier.emit(|cb| cb("hello"));
/// listener.dispose();
/// ```
pub struct Notifier<F: ?Sized + 'static> {
    inner: Rc<NotifierInner<F>>,
}

impl<F: ?Sized + 'static> Notifier<F> {
    /// Create an empty notifier.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(NotifierInner {
                list: RefCell::new(ListenerList::new()),
                count_changed: RefCell::new(None),
            }),
        }
    }

    /// Append a listener. Returns the handle that removes it.
    ///
    /// Adding to a disposed notifier returns an inert handle.
    pub fn add_listener(&self, callback: Rc<F>) -> Listener {
        let (disposed, was_empty) = {
            let list = self.inner.list.borrow();
            (list.disposed, list.live == 0)
        };
        if disposed {
            tracing::debug!("listener added to a disposed notifier; ignoring");
            return self.handle(ListenerKey::DETACHED);
        }
        if was_empty {
            self.inner.fire_count_changed(true);
        }
        let key = self.inner.list.borrow_mut().push(callback);
        self.handle(key)
    }

    fn handle(&self, key: ListenerKey) -> Listener {
        let source: Weak<dyn ListenerSource> = Rc::downgrade(&self.inner) as Weak<dyn ListenerSource>;
        Listener { source, key }
    }

    /// Invoke every live listener through `call`, in insertion order.
    pub fn emit(&self, mut call: impl FnMut(&F)) {
        struct EmitGuard<'a, F: ?Sized> {
            inner: &'a NotifierInner<F>,
        }

        impl<F: ?Sized> Drop for EmitGuard<'_, F> {
            fn drop(&mut self) {
                let mut freed = Vec::new();
                {
                    let mut list = self.inner.list.borrow_mut();
                    list.emitting -= 1;
                    if list.emitting == 0 {
                        list.free_parked(&mut freed);
                    }
                }
                drop(freed);
            }
        }

        let mut cursor = {
            let mut list = self.inner.list.borrow_mut();
            if list.live == 0 {
                return;
            }
            list.emitting += 1;
            list.head
        };
        let _guard = EmitGuard { inner: &self.inner };

        while let Some(index) = cursor {
            let callback = {
                let list = self.inner.list.borrow();
                list.nodes
                    .get(index)
                    .filter(|node| node.alive)
                    .map(|node| Rc::clone(&node.callback))
            };
            if let Some(callback) = callback {
                call(&callback);
            }
            // Re-read after the call: the listener may have edited the list.
            cursor = self
                .inner
                .list
                .borrow()
                .nodes
                .get(index)
                .and_then(|node| node.next);
        }
    }

    /// Whether at least one listener is registered.
    pub fn has_listeners(&self) -> bool {
        self.inner.list.borrow().live > 0
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.list.borrow().live
    }

    /// Install the callback told about transitions between zero and non-zero
    /// listeners. Replaces any previous one.
    pub fn set_count_changed(&self, callback: impl Fn(bool) + 'static) {
        *self.inner.count_changed.borrow_mut() = Some(Rc::new(callback));
    }

    /// Remove every listener and the count-changed callback.
    ///
    /// The count-changed callback is not told about this final transition.
    pub fn dispose(&self) {
        let callback = self.inner.count_changed.borrow_mut().take();
        drop(callback);

        let mut freed = Vec::new();
        {
            let mut list = self.inner.list.borrow_mut();
            if list.disposed {
                return;
            }
            list.disposed = true;
            let mut cursor = list.head;
            while let Some(index) = cursor {
                let node = &list.nodes[index];
                cursor = node.next;
                let key = ListenerKey {
                    index,
                    serial: node.serial,
                };
                list.unlink(key, &mut freed);
            }
        }
        drop(freed);
    }

    /// Whether [`dispose`](Notifier::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.inner.list.borrow().disposed
    }
}

impl<F: ?Sized + 'static> Default for Notifier<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized + 'static> fmt::Debug for Notifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = self.inner.list.borrow();
        f.debug_struct("Notifier")
            .field("listeners", &list.live)
            .field("disposed", &list.disposed)
            .finish()
    }
}

/// Handle to one registered listener.
///
/// Dropping the handle does not remove the listener; call
/// [`dispose`](Listener::dispose) or hand the handle to an
/// [`Owner`](crate::Owner).
#[derive(Clone)]
#[must_use = "a listener can only be removed through its handle"]
pub struct Listener {
    source: Weak<dyn ListenerSource>,
    key: ListenerKey,
}

impl Listener {
    /// Remove the listener. Idempotent, and safe to call while its notifier
    /// is emitting (including from inside the listener itself).
    pub fn dispose(&self) {
        if let Some(source) = self.source.upgrade() {
            source.remove(self.key);
        }
    }

    /// Whether the listener is no longer registered.
    pub fn is_disposed(&self) -> bool {
        self.source
            .upgrade()
            .is_none_or(|source| !source.contains(self.key))
    }
}

impl Disposable for Listener {
    fn dispose(&self) {
        Listener::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Listener::is_disposed(self)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("key", &self.key)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    type LogNotifier = Notifier<dyn Fn(&mut Vec<u32>)>;

    fn listener(id: u32) -> Rc<dyn Fn(&mut Vec<u32>)> {
        Rc::new(move |log: &mut Vec<u32>| log.push(id))
    }

    fn emit_log(notifier: &LogNotifier) -> Vec<u32> {
        let mut log = Vec::new();
        notifier.emit(|cb| cb(&mut log));
        log
    }

    #[test]
    fn emits_in_insertion_order() {
        let notifier = LogNotifier::new();
        let _a = notifier.add_listener(listener(1));
        let _b = notifier.add_listener(listener(2));
        let _c = notifier.add_listener(listener(3));

        assert_eq!(emit_log(&notifier), vec![1, 2, 3]);
        assert_eq!(notifier.listener_count(), 3);
    }

    #[test]
    fn removal_is_idempotent() {
        let notifier = LogNotifier::new();
        let a = notifier.add_listener(listener(1));
        let _b = notifier.add_listener(listener(2));

        a.dispose();
        a.dispose();
        assert!(a.is_disposed());
        assert_eq!(emit_log(&notifier), vec![2]);
        assert_eq!(notifier.listener_count(), 1);
    }

    #[test]
    fn listener_removing_itself_does_not_skip_next() {
        let notifier: Notifier<dyn Fn()> = Notifier::new();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let own_handle: Rc<RefCell<Option<Listener>>> = Rc::new(RefCell::new(None));

        let calls_a = calls.clone();
        let handle_a = own_handle.clone();
        let a = notifier.add_listener(Rc::new(move || {
            calls_a.borrow_mut().push("a");
            if let Some(me) = handle_a.borrow().as_ref() {
                me.dispose();
            }
        }));
        *own_handle.borrow_mut() = Some(a);

        let calls_b = calls.clone();
        let _b = notifier.add_listener(Rc::new(move || calls_b.borrow_mut().push("b")));

        notifier.emit(|cb| cb());
        notifier.emit(|cb| cb());
        assert_eq!(*calls.borrow(), vec!["a", "b", "b"]);
    }

    #[test]
    fn listener_removing_a_later_listener_prevents_its_call() {
        let notifier: Notifier<dyn Fn()> = Notifier::new();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let victim: Rc<RefCell<Option<Listener>>> = Rc::new(RefCell::new(None));

        let calls_a = calls.clone();
        let victim_a = victim.clone();
        let _a = notifier.add_listener(Rc::new(move || {
            calls_a.borrow_mut().push("a");
            if let Some(victim) = victim_a.borrow().as_ref() {
                victim.dispose();
            }
        }));
        let calls_b = calls.clone();
        let b = notifier.add_listener(Rc::new(move || calls_b.borrow_mut().push("b")));
        let calls_c = calls.clone();
        let _c = notifier.add_listener(Rc::new(move || calls_c.borrow_mut().push("c")));
        *victim.borrow_mut() = Some(b);

        notifier.emit(|cb| cb());
        assert_eq!(*calls.borrow(), vec!["a", "c"]);
    }

    #[test]
    fn removing_current_and_next_during_emit_keeps_walk_intact() {
        let notifier: Notifier<dyn Fn()> = Notifier::new();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let handles: Rc<RefCell<Vec<Listener>>> = Rc::new(RefCell::new(Vec::new()));

        for id in 0..4u32 {
            let calls = calls.clone();
            let handles_for_cb = handles.clone();
            let handle = notifier.add_listener(Rc::new(move || {
                calls.borrow_mut().push(id);
                if id == 1 {
                    // Remove self and the following listener.
                    let handles = handles_for_cb.borrow();
                    handles[1].dispose();
                    handles[2].dispose();
                }
            }));
            handles.borrow_mut().push(handle);
        }

        notifier.emit(|cb| cb());
        assert_eq!(*calls.borrow(), vec![0, 1, 3]);
        assert_eq!(notifier.listener_count(), 2);

        notifier.emit(|cb| cb());
        assert_eq!(*calls.borrow(), vec![0, 1, 3, 0, 3]);
    }

    #[test]
    fn count_changed_fires_on_transitions_only() {
        let notifier = LogNotifier::new();
        let transitions = Rc::new(RefCell::new(Vec::new()));
        let transitions_clone = transitions.clone();
        notifier.set_count_changed(move |has| transitions_clone.borrow_mut().push(has));

        let a = notifier.add_listener(listener(1));
        let b = notifier.add_listener(listener(2));
        a.dispose();
        b.dispose();
        let _c = notifier.add_listener(listener(3));

        assert_eq!(*transitions.borrow(), vec![true, false, true]);
    }

    #[test]
    fn count_changed_runs_before_first_listener_is_linked() {
        let notifier = Rc::new(LogNotifier::new());
        let seen_count = Rc::new(Cell::new(usize::MAX));
        let seen = seen_count.clone();
        let weak = Rc::downgrade(&notifier);
        notifier.set_count_changed(move |has| {
            if has {
                if let Some(notifier) = weak.upgrade() {
                    seen.set(notifier.listener_count());
                }
            }
        });

        let _a = notifier.add_listener(listener(1));
        assert_eq!(seen_count.get(), 0);
    }

    #[test]
    fn dispose_detaches_everything() {
        let notifier = LogNotifier::new();
        let a = notifier.add_listener(listener(1));
        notifier.dispose();

        assert!(a.is_disposed());
        assert!(!notifier.has_listeners());
        assert!(emit_log(&notifier).is_empty());

        let late = notifier.add_listener(listener(2));
        assert!(late.is_disposed());
        assert!(emit_log(&notifier).is_empty());
    }

    #[test]
    fn dispose_during_emit_stops_remaining_listeners() {
        let notifier = Rc::new(Notifier::<dyn Fn()>::new());
        let calls = Rc::new(Cell::new(0));
        let weak = Rc::downgrade(&notifier);
        let calls_a = calls.clone();
        let _a = notifier.add_listener(Rc::new(move || {
            calls_a.set(calls_a.get() + 1);
            if let Some(notifier) = weak.upgrade() {
                notifier.dispose();
            }
        }));
        let calls_b = calls.clone();
        let _b = notifier.add_listener(Rc::new(move || calls_b.set(calls_b.get() + 1)));

        notifier.emit(|cb| cb());
        assert_eq!(calls.get(), 1);
    }
}
