use cbordata::Cborize;

/// One record in a dlog file. `commit` and `timestamp` are common to every
/// variant; everything else lives in [EntryKind] rather than as nullable
/// fields on a flat struct.
#[derive(Debug, Clone, PartialEq, Cborize)]
pub struct Entry {
    pub commit: u64,
    pub timestamp: u64,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq, Cborize)]
pub enum EntryKind {
    /// `LastCommit = Commit - 1`.
    Patch { last_commit: u64, tx_seq: u64, patch: Vec<u8> },
    /// A patch entry additionally carrying its originating transaction.
    Transaction { last_commit: u64, tx_seq: u64, patch: Vec<u8>, tx_source: String },
    /// `SnapPos` points at the blob header preceding this entry in the
    /// same log file.
    Snapshot { snap_pos: u64 },
    /// A patch whose `Commit - LastCommit > 1`, i.e. compaction collapsed
    /// one or more intervening commits into this one.
    Compaction { last_commit: u64, tx_seq: u64, patch: Vec<u8> },
    /// A snapshot entry that also carries a schema change.
    SchemaChange { snap_pos: u64, schema_entry: Vec<u8> },
}

impl Entry {
    const ID: u32 = 0x0;

    pub fn new(commit: u64, timestamp: u64, kind: EntryKind) -> Entry {
        Entry { commit, timestamp, kind }
    }

    pub fn last_commit(&self) -> Option<u64> {
        match &self.kind {
            EntryKind::Patch { last_commit, .. }
            | EntryKind::Transaction { last_commit, .. }
            | EntryKind::Compaction { last_commit, .. } => Some(*last_commit),
            EntryKind::Snapshot { .. } | EntryKind::SchemaChange { .. } => None,
        }
    }

    pub fn snap_pos(&self) -> Option<u64> {
        match &self.kind {
            EntryKind::Snapshot { snap_pos } | EntryKind::SchemaChange { snap_pos, .. } => Some(*snap_pos),
            _ => None,
        }
    }

    pub fn patch(&self) -> Option<&[u8]> {
        match &self.kind {
            EntryKind::Patch { patch, .. }
            | EntryKind::Transaction { patch, .. }
            | EntryKind::Compaction { patch, .. } => Some(patch),
            _ => None,
        }
    }

    /// True for the marker entries that follow a snapshot blob: the blob
    /// itself always precedes its marker entry in the same log file, with
    /// a distinguished header.
    pub fn is_snapshot(&self) -> bool {
        matches!(self.kind, EntryKind::Snapshot { .. } | EntryKind::SchemaChange { .. })
    }

    pub fn is_compaction(&self) -> bool {
        matches!(self.kind, EntryKind::Compaction { .. })
    }

    /// Point `snap_pos` at its new location after compaction moved the blob
    /// it refers to.
    pub fn rewrite_snap_pos(&mut self, new_snap_pos: u64) {
        match &mut self.kind {
            EntryKind::Snapshot { snap_pos } | EntryKind::SchemaChange { snap_pos, .. } => {
                *snap_pos = new_snap_pos;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "entry_test.rs"]
mod entry_test;
