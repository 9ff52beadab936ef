//! Point-in-time document snapshots: a self-indexed binary dump of an
//! entire document's event stream, written by [SnapshotBuilder] and read
//! back path-at-a-time by [PathFinder] without decoding the whole blob.

mod builder;
mod finder;
mod format;

pub use builder::{SnapshotBuilder, DEFAULT_MAX_CHUNK_SIZE};
pub use finder::{PathFinder, SectionReader};
pub use format::{decode_header, decode_index, encode_header, encode_index, IndexEntry, HEADER_LEN};
