//! Inputs that may be a plain value, a cell or a function of cells.
//!
//! Consumers that accept "anything bindable" take a [`Bindable`] and resolve
//! it once with [`subscribe_bindable`], instead of inspecting the input at
//! every use.

use crate::cell::Subscribable;
use crate::computed::Computed;
use crate::observable::Observable;
use crate::pure_computed::PureComputed;
use crate::subscription::{Subscription, Use};
use std::fmt;
use std::rc::Rc;

/// A value source.
pub enum Bindable<T> {
    /// A constant.
    Value(T),
    /// Any cell.
    Cell(Rc<dyn Subscribable<Value = T>>),
    /// A function of cells, re-evaluated when the cells it reads change.
    Func(Rc<dyn Fn(&Use<'_>) -> T>),
}

impl<T: Clone + PartialEq + 'static> Bindable<T> {
    /// A constant source.
    pub fn value(value: T) -> Self {
        Bindable::Value(value)
    }

    /// A cell source.
    pub fn cell(cell: impl Subscribable<Value = T> + 'static) -> Self {
        Bindable::Cell(Rc::new(cell))
    }

    /// A derived source.
    pub fn func(f: impl Fn(&Use<'_>) -> T + 'static) -> Self {
        Bindable::Func(Rc::new(f))
    }

    /// The current value, without subscribing to anything.
    pub fn get(&self) -> T {
        match self {
            Bindable::Value(value) => value.clone(),
            Bindable::Cell(cell) => cell.get(),
            Bindable::Func(f) => f(&Use::untracked()),
        }
    }
}

impl<T: Clone> Clone for Bindable<T> {
    fn clone(&self) -> Self {
        match self {
            Bindable::Value(value) => Bindable::Value(value.clone()),
            Bindable::Cell(cell) => Bindable::Cell(Rc::clone(cell)),
            Bindable::Func(f) => Bindable::Func(Rc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Bindable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bindable::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Bindable::Cell(cell) => f.debug_tuple("Cell").field(&cell.cell_key()).finish(),
            Bindable::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl<T: Clone + 'static> From<Observable<T>> for Bindable<T> {
    fn from(cell: Observable<T>) -> Self {
        Bindable::Cell(Rc::new(cell))
    }
}

impl<T: Clone + PartialEq + 'static> From<Computed<T>> for Bindable<T> {
    fn from(cell: Computed<T>) -> Self {
        Bindable::Cell(Rc::new(cell))
    }
}

impl<T: Clone + PartialEq + 'static> From<PureComputed<T>> for Bindable<T> {
    fn from(cell: PureComputed<T>) -> Self {
        Bindable::Cell(Rc::new(cell))
    }
}

/// Call `callback` with the value of `bindable` now and on every change.
///
/// A constant calls back once and returns `None`. Cells and functions return
/// the subscription that keeps calling back; a function only calls back when
/// its result actually changes.
pub fn subscribe_bindable<T>(
    bindable: &Bindable<T>,
    mut callback: impl FnMut(T) + 'static,
) -> Option<Subscription>
where
    T: Clone + PartialEq + 'static,
{
    match bindable {
        Bindable::Value(value) => {
            callback(value.clone());
            None
        }
        Bindable::Cell(cell) => Some(Subscription::with_deps(
            (Rc::clone(cell),),
            move |_, (value,)| callback(value),
        )),
        Bindable::Func(f) => {
            let f = Rc::clone(f);
            let derived = Computed::new(move |tracker| f(tracker));
            Some(Subscription::with_deps((derived,), move |_, (value,)| {
                callback(value)
            }))
        }
    }
}
