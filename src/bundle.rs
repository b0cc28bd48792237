use crate::scheduler::{drain, enter_compute, exit_compute};

/// RAII guard that ends a bundle even if the bundled function panics.
///
/// Leaving the outermost bundle drains the recompute queue, except while
/// unwinding: a recompute panicking on top of an unwinding panic would abort.
/// Whatever stays queued then runs on the next drain.
struct BundleGuard;

impl Drop for BundleGuard {
    fn drop(&mut self) {
        if exit_compute() && !std::thread::panicking() {
            drain();
        }
    }
}

/// Batch several writes so dependent derived cells recompute once.
///
/// Writes inside the bundle take effect immediately and direct listeners of
/// the written cells are still called synchronously. Recomputation of derived
/// cells waits until the outermost bundle returns, then runs in dependency
/// order, so a computed reading two cells that both change in the bundle
/// evaluates exactly once and never observes one new and one old value.
///
/// # Example
/// ```ignore
/// let a = Observable::new(1);
/// let b = Observable::new(2);
/// let sum = computed(move |u| u.get(&a) + u.get(&b));
///
/// bundle_changes(|| {
///     a.set(10);
///     b.set(20);
/// }); // `sum` evaluates once here
/// ```
///
/// Bundles nest; only the outermost exit drains. The bundled function's
/// return value is passed through.
pub fn bundle_changes<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    enter_compute();
    let _guard = BundleGuard;
    f()
}
