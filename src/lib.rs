#![deny(missing_docs)]

//! Fine-grained reactive cells with priority-ordered recomputation.
//!
//! Values live in cells. Derived cells and subscriptions discover what they
//! read while they run, and are recomputed by a per-thread scheduler in
//! dependency order, so every derived cell sees each batch of changes exactly
//! once. Resource lifetimes follow an explicit ownership tree.
//!
//! # Quick Start
//!
//! ```ignore
//! use cellgraph::{Observable, bundle_changes, computed, subscribe};
//!
//! let a = Observable::new(5);
//! let b = Observable::new(12);
//!
//! let sum = computed({
//!     let (a, b) = (a.clone(), b.clone());
//!     move |u| u.get(&a) + u.get(&b)
//! });
//! assert_eq!(sum.get(), 17);
//!
//! let log = subscribe({
//!     let sum = sum.clone();
//!     move |u| println!("sum is {}", u.get(&sum))
//! });
//!
//! // One recomputation of `sum`, one line printed.
//! bundle_changes(|| {
//!     a.set(6);
//!     b.set(13);
//! });
//! ```
//!
//! # Core Types
//!
//! - [`Observable<T>`] - Mutable cell. [`set`](Observable::set) notifies on change.
//! - [`Computed<T>`] - Derived cell, always subscribed to what it reads.
//! - [`PureComputed<T>`] - Derived cell that only subscribes while observed.
//! - [`Subscription`] - Side-effecting reaction, see [`subscribe`].
//! - [`MutableArrayCell<T>`] / [`ArrayCell<T>`] - Arrays whose edits are
//!   reported as [`Splice`]s; [`computed_array`] maps them incrementally.
//! - [`Owner`] - Disposes what it owns in reverse acquisition order.
//!
//! # Dependencies
//!
//! ```ignore
//! // Dynamic: whatever the callback reads through `u.get`
//! let label = computed(move |u| if u.get(&flag) { u.get(&on) } else { u.get(&off) });
//!
//! // Static: a fixed list, values passed in order
//! let area = computed_with((width.clone(), height.clone()), |_, (w, h)| w * h);
//! ```
//!
//! Dynamic dependencies not read in an evaluation are dropped after it.
//!
//! # Scheduling
//!
//! ```ignore
//! bundle_changes(|| { ... });   // defer recomputation to the end of the bundle
//! scheduler::drain();           // recompute queued cells now (cells do this on write)
//! scheduler::configure(SchedulerConfig::new().recompute_limit(16));
//! ```
//!
//! Everything is single-threaded: cells are `!Send` and the scheduler queue
//! belongs to the thread that created the cells.
//!
//! # Disposal
//!
//! ```ignore
//! let (owner, view) = Owner::build(|owner| {
//!     let count = owner.auto_dispose(Observable::new(0));
//!     owner.on_dispose(|| println!("gone"));
//!     View { count }
//! });
//! owner.dispose();
//! ```
//!
//! Dropping the last handle of a subscription, derived cell or owner disposes
//! it as well.

// Internal modules
pub(crate) mod arena;
mod array;
mod binding;
mod bundle;
mod cell;
mod computed;
mod dispose;
mod error;
mod hash;
mod notifier;
mod observable;
mod pure_computed;
pub mod scheduler;
mod subscription;

// Core types
pub use arena::DepId;
pub use array::{
    ArrayCell, ArrayListener, LiveIndex, MutableArrayCell, Splice, computed_array,
    make_live_index,
};
pub use binding::{Bindable, subscribe_bindable};
pub use cell::{CellKey, Subscribable};
pub use computed::{Computed, computed, computed_with};
pub use dispose::{Disposable, DisposeCallback, DisposeHandle, Holder, Owner};
pub use error::{DisposeError, Error, Result};
pub use notifier::{Listener, Notifier};
pub use observable::Observable;
pub use pure_computed::{PureComputed, pure_computed, pure_computed_with};
pub use subscription::{Dependencies, Subscription, Use, subscribe, subscribe_with};

// Key functions
pub use bundle::bundle_changes;
pub use scheduler::{DEFAULT_RECOMPUTE_LIMIT, SchedulerConfig};
