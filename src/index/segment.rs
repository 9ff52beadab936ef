use std::cmp;

use cbordata::Cborize;

use crate::path::KPath;

/// Which of the dlog's two files a [LogSegment] points into.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Cborize)]
pub enum LogFileId {
    A,
    B,
}

impl LogFileId {
    const ID: u32 = 0x0;

    pub fn other(self) -> LogFileId {
        match self {
            LogFileId::A => LogFileId::B,
            LogFileId::B => LogFileId::A,
        }
    }
}

/// Index record stating that commit range `[start_commit, end_commit]`
/// produced content at `kinded_path`, stored at `log_file`/`log_position`.
#[derive(Debug, Clone, Eq, PartialEq, Cborize)]
pub struct LogSegment {
    pub kinded_path: KPath,
    pub start_commit: u64,
    pub end_commit: u64,
    pub start_tx: u64,
    pub end_tx: u64,
    pub log_file: LogFileId,
    pub log_position: u64,
    pub log_file_generation: u64,
    pub scope_id: Option<String>,
    pub array_key: Option<String>,
    pub array_key_field: Option<String>,
}

impl LogSegment {
    const ID: u32 = 0x0;

    /// True when this record is itself a snapshot marker rather than a
    /// patch range: `start_commit == end_commit` implies snapshot.
    pub fn is_snapshot(&self) -> bool {
        self.start_commit == self.end_commit
    }
}

/// Total order: `(start_commit, start_tx, end_commit, end_tx, kinded_path,
/// scope_id)`.
impl Ord for LogSegment {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.start_commit
            .cmp(&other.start_commit)
            .then(self.start_tx.cmp(&other.start_tx))
            .then(self.end_commit.cmp(&other.end_commit))
            .then(self.end_tx.cmp(&other.end_tx))
            .then(self.kinded_path.cmp(&other.kinded_path))
            .then(self.scope_id.cmp(&other.scope_id))
    }
}

impl PartialOrd for LogSegment {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Scope matching rule: a nil request scope matches only nil-scope
/// segments; a named request scope matches nil-scope segments (baseline) or
/// segments tagged with that same scope (overlay).
pub fn scope_matches(requested: Option<&str>, segment_scope: Option<&str>) -> bool {
    match (requested, segment_scope) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some(_), None) => true,
        (Some(r), Some(s)) => r == s,
    }
}

#[cfg(test)]
#[path = "segment_test.rs"]
mod segment_test;
