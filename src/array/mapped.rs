use super::{ArrayCell, ArrayInner};
use crate::subscription::Subscription;
use std::cell::Cell;
use std::rc::{Rc, Weak};

/// What the source array did since the mapped array last synced.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PendingChange {
    Clean,
    Splice {
        start: usize,
        num_added: usize,
        num_deleted: usize,
    },
    Replaced,
}

/// Map every element of `source` through `mapper` into a derived array.
///
/// When the source reports exactly one splice between two syncs, only the
/// inserted elements are mapped and the removed outputs are dropped from the
/// result. Anything else (a full replacement, or several edits inside one
/// bundle) remaps the whole source. Either way the output equals mapping the
/// whole source.
///
/// `mapper` receives the output array, so a mapped value can be adopted with
/// [`ArrayCell::auto_dispose`] and is disposed once it leaves the output.
///
/// ```ignore
/// let names = MutableArrayCell::new(vec!["a".to_string()]);
/// let upper = computed_array(&names, |name, _| name.to_uppercase());
/// names.push("b".to_string()); // maps "b" only
/// assert_eq!(upper.get(), ["A", "B"]);
/// ```
///
/// The mapper is not tracked: cells it reads do not cause remapping.
pub fn computed_array<T, U>(
    source: &ArrayCell<T>,
    mapper: impl Fn(&T, &ArrayCell<U>) -> U + 'static,
) -> ArrayCell<U>
where
    T: Clone + PartialEq + 'static,
    U: Clone + PartialEq + 'static,
{
    let output = ArrayCell::from_vec(Vec::new());
    let pending = Rc::new(Cell::new(PendingChange::Clean));

    // Registered before the subscription so the change is recorded before
    // the sync is enqueued.
    let recorder = {
        let pending = Rc::clone(&pending);
        source.add_listener(move |_, _, splice| {
            let next = match (pending.get(), splice) {
                (PendingChange::Clean, Some(splice)) => PendingChange::Splice {
                    start: splice.start,
                    num_added: splice.num_added,
                    num_deleted: splice.deleted.len(),
                },
                _ => PendingChange::Replaced,
            };
            pending.set(next);
        })
    };

    let weak: Weak<ArrayInner<U>> = Rc::downgrade(&output.inner);
    let subscription = Subscription::with_deps((source.clone(),), move |_, (items,)| {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let out = ArrayCell { inner };
        match pending.replace(PendingChange::Clean) {
            PendingChange::Splice {
                start,
                num_added,
                num_deleted,
            } if start + num_added <= items.len() && start + num_deleted <= out.len() => {
                cov_mark::hit!(mapped_array_applied_splice);
                let mapped = items[start..start + num_added]
                    .iter()
                    .map(|item| mapper(item, &out))
                    .collect();
                out.inner.apply_splice(start, num_deleted, mapped);
            }
            _ => {
                cov_mark::hit!(mapped_array_full_remap);
                let mapped = items.iter().map(|item| mapper(item, &out)).collect();
                out.inner.replace(mapped, false);
            }
        }
    });

    output.inner.dep.set(Some(subscription.dep_id()));
    output.inner.resources.own(recorder);
    output.inner.resources.own(subscription);
    output
}
