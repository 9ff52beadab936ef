//! tonystore is a storage engine for a single append-only, path-indexed
//! document. Mutations arrive as patches; each patch is appended to one of
//! two double-buffered log files, then walked to emit one index segment per
//! visited kinded path. Point-in-time reads resolve a path by finding the
//! freshest index segment covering the requested commit and decoding just
//! that patch's bytes, without replaying the whole log.
//!
//! The storage core has no notion of multiple documents, multi-writer
//! replication, secondary indexes, or a decoded-document cache: a single
//! `Storage` instance owns one document's dlog, index, and sequence
//! allocator for its whole lifetime.

#[macro_use]
mod error;

mod codec;
mod dlog;
mod event;
mod index;
mod ir;
mod path;
mod schema;
mod seq;
mod snapshot;
mod storage;
pub mod util;

pub use crate::codec::{Decoder, Encoder, EncoderOpts, Token, Tokenizer};
pub use crate::error::{Error, Result};
pub use crate::event::{Event, Tag};
pub use crate::index::{Direction, IndexIterator, IndexTree, LogFileId, LogSegment};
pub use crate::ir::{events_to_value, value_to_events, Node, Value};
pub use crate::path::{ContainerKind, Frame, KPath, PathState, Segment};
pub use crate::schema::Schema;
pub use crate::seq::Seq;
pub use crate::snapshot::{PathFinder, SectionReader, SnapshotBuilder};
pub use crate::storage::{CommitResult, Patcher, Storage, StorageConfig, Tx};
