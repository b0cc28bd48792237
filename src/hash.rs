//! Hashing for the engine's bookkeeping maps.
//!
//! Subscriptions key their dependency tables by [`CellKey`](crate::CellKey)
//! and owners key their entries by a running counter. Both keys are issued
//! by the engine itself, never by untrusted input, so a fixed-seed foldhash
//! is enough.

use foldhash::fast::{FixedState, FoldHasher};
use std::hash::BuildHasher;

const SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Stateless foldhash builder.
///
/// Carries no data, so every map built with it stays the size of the map
/// itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct FastHashBuilder;

impl BuildHasher for FastHashBuilder {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(SEED).build_hasher()
    }
}

/// Map that iterates in insertion order, hashed with [`FastHashBuilder`].
pub type FastIndexMap<K, V> = indexmap::IndexMap<K, V, FastHashBuilder>;
