//! Hierarchical path index: a tree keyed by kinded-path segments, each node
//! holding an ordered multiset of [LogSegment] records.

mod segment;
mod tree;
mod walk;

pub use segment::{scope_matches, LogFileId, LogSegment};
pub use tree::{Direction, IndexIterator, IndexTree};
pub use walk::{index_patch, IndexWriteParams};
