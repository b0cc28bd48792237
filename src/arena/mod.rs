// Arena-based storage for scheduler metadata
//
// The dependency-token arena stores one DepMetadata per derived node
// (priority, queue flags, recompute callback). DepId is a lightweight
// generation-checked index into the slab.

pub mod dep_arena;

pub use dep_arena::DepId;
pub(crate) use dep_arena::{EnqueueOutcome, dep_arena_insert, dep_arena_remove, dep_count};
