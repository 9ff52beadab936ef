//! Commit and transaction sequence allocator. Backed by a 16-byte file,
//! rewritten atomically on every increment; a process-wide mutex serializes
//! the read-modify-write cycle the same way the dlog's `dlog.state` rewrite
//! is serialized by the master lock.

use std::{
    convert::TryInto,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{util, Result};

/// Counters are masked to 56 bits; the top 8 bits of each 64-bit field are
/// reserved.
const COUNTER_MASK: u64 = (1u64 << 56) - 1;

pub struct Seq {
    path: PathBuf,
    state: Mutex<(u64, u64)>,
    fsync: bool,
}

impl Seq {
    /// Open the counters file at `path` (typically `meta/seq`), creating
    /// it zeroed if absent. Rejects a file whose reserved high byte is
    /// nonzero, defending the 56-bit contract.
    pub fn open(path: &Path, fsync: bool) -> Result<Seq> {
        let state = if path.exists() {
            read_seq_file(path)?
        } else {
            if let Some(parent) = path.parent() {
                err_at!(IOError, std::fs::create_dir_all(parent))?;
            }
            write_seq_file(path, 0, 0, fsync)?;
            (0, 0)
        };
        Ok(Seq { path: path.to_path_buf(), state: Mutex::new(state), fsync })
    }

    /// Both counters, without incrementing either.
    pub fn current_state(&self) -> (u64, u64) {
        *self.state.lock().expect("sequence lock poisoned")
    }

    /// Allocate the next commit number.
    pub fn next_commit(&self) -> Result<u64> {
        let mut guard = self.state.lock().expect("sequence lock poisoned");
        let (commit, tx_seq) = *guard;
        let next = (commit + 1) & COUNTER_MASK;
        write_seq_file(&self.path, next, tx_seq, self.fsync)?;
        *guard = (next, tx_seq);
        Ok(next)
    }

    /// Allocate the next transaction sequence number.
    pub fn next_tx_seq(&self) -> Result<u64> {
        let mut guard = self.state.lock().expect("sequence lock poisoned");
        let (commit, tx_seq) = *guard;
        let next = (tx_seq + 1) & COUNTER_MASK;
        write_seq_file(&self.path, commit, next, self.fsync)?;
        *guard = (commit, next);
        Ok(next)
    }
}

fn read_seq_file(path: &Path) -> Result<(u64, u64)> {
    let bytes = err_at!(IOError, std::fs::read(path))?;
    if bytes.len() != 16 {
        return err_at!(InvalidFile, msg: "sequence file {:?} is {} bytes, expected 16", path, bytes.len());
    }
    let commit_raw = u64::from_le_bytes(bytes[0..8].try_into().expect("slice is exactly 8 bytes"));
    let tx_raw = u64::from_le_bytes(bytes[8..16].try_into().expect("slice is exactly 8 bytes"));
    if commit_raw >> 56 != 0 || tx_raw >> 56 != 0 {
        return err_at!(InvalidFile, msg: "sequence file {:?} has a nonzero reserved byte", path);
    }
    Ok((commit_raw & COUNTER_MASK, tx_raw & COUNTER_MASK))
}

fn write_seq_file(path: &Path, commit: u64, tx_seq: u64, fsync: bool) -> Result<()> {
    let mut buf = [0u8; 16];
    buf[0..8].copy_from_slice(&(commit & COUNTER_MASK).to_le_bytes());
    buf[8..16].copy_from_slice(&(tx_seq & COUNTER_MASK).to_le_bytes());

    let mut tmp_path = path.to_path_buf();
    let tmp_name = format!("{}.tmp", tmp_path.file_name().and_then(|n| n.to_str()).unwrap_or("seq"));
    tmp_path.set_file_name(tmp_name);

    let mut f = util::create_file_a(tmp_path.as_os_str())?;
    util::sync_write(&mut f, &buf, fsync)?;
    err_at!(IOError, std::fs::rename(&tmp_path, path))
}

#[cfg(test)]
#[path = "seq_test.rs"]
mod seq_test;
