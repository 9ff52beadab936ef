use std::{
    fs,
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard, RwLock,
    },
};

use fs2::FileExt as _;

use crate::{
    dlog::entry::{Entry, EntryKind},
    index::LogFileId,
    util, Result,
};

/// Reserved entry-length value marking a snapshot blob header rather than
/// an ordinary entry. Forbidden as an ordinary entry's length.
pub const SNAPSHOT_MAGIC: u32 = 0xFFFF_FFFF;

/// Take an exclusive advisory lock on `handle`, held for as long as the
/// `fs::File` stays open, guarding against a second process opening the
/// same dlog file underneath this one (mirrors `robt`'s `purge_file`
/// locking its index file before touching it).
fn lock_exclusive(handle: &fs::File, path: &Path) -> Result<()> {
    err_at!(Locked, handle.try_lock_exclusive(), "dlog file {:?} is locked by another process", path)
}

/// One of the dlog's two on-disk files. Owns the write handle (append-mode,
/// serialized by `append_handle`'s lock — the per-file data lock,
/// additionally guarded by an exclusive fs2 advisory lock against a second
/// process), a `snap_mu` that serializes snapshot construction, a reader
/// refcount, and a generation counter bumped on every compaction.
pub struct LogFile {
    pub id: LogFileId,
    path: PathBuf,
    append_handle: Mutex<fs::File>,
    read_handle: RwLock<fs::File>,
    snap_mu: Mutex<()>,
    reader_count: AtomicU64,
    generation: AtomicU64,
    fsync: bool,
}

impl LogFile {
    /// Open or create the file at `path` for appends, also opening a
    /// second read-only handle for positional reads (`read_at`) that never
    /// contend with the appender's lock.
    pub fn open(id: LogFileId, path: &Path, fsync: bool) -> Result<LogFile> {
        let append_handle = if path.exists() {
            util::open_file_a(path.as_os_str())?
        } else {
            util::create_file_a(path.as_os_str())?
        };
        lock_exclusive(&append_handle, path)?;
        let read_handle = util::open_file_r(path.as_os_str())?;
        Ok(LogFile {
            id,
            path: path.to_path_buf(),
            append_handle: Mutex::new(append_handle),
            read_handle: RwLock::new(read_handle),
            snap_mu: Mutex::new(()),
            reader_count: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            fsync,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn acquire_reader(&self) {
        self.reader_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn release_reader(&self) {
        self.reader_count.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn reader_count(&self) -> u64 {
        self.reader_count.load(Ordering::SeqCst)
    }

    /// Current length of the file, via the read handle.
    pub fn len(&self) -> Result<u64> {
        let f = self.read_handle.read().expect("read lock poisoned");
        Ok(err_at!(IOError, f.metadata())?.len())
    }

    /// Discard everything past `new_len`, used by startup recovery to drop
    /// a dangling length-prefixed record a crash left half-written.
    pub fn truncate_to(&self, new_len: u64) -> Result<()> {
        let f = self.append_handle.lock().expect("append lock poisoned");
        err_at!(IOError, f.set_len(new_len))
    }

    /// Reopen this file's handles at the same path. Used after
    /// compaction's rename-into-place so subsequent reads/appends observe
    /// the new content.
    pub(crate) fn reopen(&self) -> Result<()> {
        let new_append = if self.path.exists() {
            util::open_file_a(self.path.as_os_str())?
        } else {
            util::create_file_a(self.path.as_os_str())?
        };
        // Not re-locked: flock is per open-file-description, so taking a
        // second exclusive lock here while the old handle (same process,
        // same file) still holds one would itself report `WouldBlock`.
        // The lock from the original `open()` already establishes this
        // process as the sole owner of the path for the life of the
        // `LogFile`.
        let new_read = util::open_file_r(self.path.as_os_str())?;
        *self.append_handle.lock().expect("append lock poisoned") = new_append;
        *self.read_handle.write().expect("read lock poisoned") = new_read;
        Ok(())
    }

    /// Block until no snapshot write is in progress on this file: the
    /// synchronization point `Dlog::switch_active` needs before flipping
    /// which file is active.
    pub(crate) fn wait_for_snapshot_idle(&self) {
        drop(self.snap_mu.lock().expect("snapMu poisoned"));
    }

    /// Serialize `entry`, write `[u32 length][payload]` at the current end
    /// of file, and return the byte offset the entry starts at.
    pub fn append_entry(&self, entry: &Entry) -> Result<u64> {
        let payload = util::into_cbor_bytes(entry.clone())?;
        if payload.len() > u32::MAX as usize {
            return err_at!(TooLarge, msg: "entry of {} bytes exceeds 32-bit length prefix", payload.len());
        }

        let mut f = self.append_handle.lock().expect("append lock poisoned");
        let offset = err_at!(IOError, f.metadata())?.len();
        let mut buf = Vec::with_capacity(4 + payload.len());
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&payload);
        util::sync_write(&mut f, &buf, self.fsync)?;
        Ok(offset)
    }

    /// Read the length-prefixed entry at `pos` via a positional read, safe
    /// to call concurrently with an in-flight append. Returns the entry and
    /// the offset just past it.
    pub fn read_entry_at(&self, pos: u64) -> Result<(Entry, u64)> {
        let f = self.read_handle.read().expect("read lock poisoned");
        let mut len_buf = [0u8; 4];
        err_at!(IOError, f.read_at(&mut len_buf, pos))?;
        let length = u32::from_be_bytes(len_buf);
        if length == SNAPSHOT_MAGIC {
            return err_at!(InvalidFile, msg: "position {} is a blob header, not an entry", pos);
        }
        let mut payload = vec![0u8; length as usize];
        err_at!(IOError, f.read_at(&mut payload, pos + 4))?;
        let (entry, _): (Entry, usize) = util::from_cbor_bytes(&payload)?;
        Ok((entry, pos + 4 + length as u64))
    }

    /// Read `len` raw bytes at `pos`, for pulling a snapshot blob's event
    /// stream out from between its header and its trailing entry.
    pub fn read_at(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        let f = self.read_handle.read().expect("read lock poisoned");
        let mut buf = vec![0u8; len];
        err_at!(IOError, f.read_at(&mut buf, pos))?;
        Ok(buf)
    }

    /// Iterate entries from `start`, in file order, transparently skipping
    /// over snapshot blobs. Yields `(entry, offset-the-entry-starts-at)`.
    pub fn iter_from(&self, start: u64) -> Result<LogFileIter<'_>> {
        Ok(LogFileIter { file: self, pos: start, len: self.len()? })
    }

    /// Begin writing a snapshot blob into this file. `snap_mu` is taken
    /// with `try_lock`: held already (another snapshot in flight) yields
    /// `SnapshotBusy` rather than blocking.
    pub fn begin_snapshot(&self) -> Result<SnapshotSection<'_>> {
        let guard = match self.snap_mu.try_lock() {
            Ok(g) => g,
            Err(_) => return err_at!(SnapshotBusy, msg: "snapMu already held for {:?}", self.path),
        };

        let blob_start = {
            let mut f = self.append_handle.lock().expect("append lock poisoned");
            let start = err_at!(IOError, f.metadata())?.len();
            let mut header = Vec::with_capacity(8);
            header.extend_from_slice(&SNAPSHOT_MAGIC.to_be_bytes());
            header.extend_from_slice(&0u32.to_be_bytes());
            util::sync_write(&mut f, &header, self.fsync)?;
            start
        };

        Ok(SnapshotSection { file: self, _guard: guard, blob_start, len: 0 })
    }

    /// Rename this file's path to `path.old`, so compaction's rename dance
    /// can reverse on failure.
    pub fn rename_aside(&self) -> Result<PathBuf> {
        let mut old = self.path.clone();
        let name = format!("{}.old", old.file_name().and_then(|n| n.to_str()).unwrap_or("log"));
        old.set_file_name(name);
        err_at!(RenameFail, std::fs::rename(&self.path, &old))?;
        Ok(old)
    }
}

pub struct LogFileIter<'a> {
    file: &'a LogFile,
    pos: u64,
    len: u64,
}

impl<'a> Iterator for LogFileIter<'a> {
    type Item = Result<(Entry, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.len {
            return None;
        }

        let mut marker_buf = [0u8; 4];
        {
            let f = self.file.read_handle.read().expect("read lock poisoned");
            if let Err(err) = err_at!(IOError, f.read_at(&mut marker_buf, self.pos)) {
                return Some(Err(err));
            }
        }
        let marker = u32::from_be_bytes(marker_buf);

        let entry_pos = if marker == SNAPSHOT_MAGIC {
            let mut blob_len_buf = [0u8; 4];
            {
                let f = self.file.read_handle.read().expect("read lock poisoned");
                if let Err(err) = err_at!(IOError, f.read_at(&mut blob_len_buf, self.pos + 4)) {
                    return Some(Err(err));
                }
            }
            let blob_len = u32::from_be_bytes(blob_len_buf) as u64;
            self.pos + 8 + blob_len
        } else {
            self.pos
        };

        match self.file.read_entry_at(entry_pos) {
            Ok((entry, next)) => {
                self.pos = next;
                Some(Ok((entry, entry_pos)))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Write-only handle into an in-progress snapshot blob, holding the
/// file's `snap_mu` for its lifetime. Never closes the underlying log
/// file — only `close`/`abandon` release `snap_mu`.
pub struct SnapshotSection<'a> {
    file: &'a LogFile,
    _guard: MutexGuard<'a, ()>,
    blob_start: u64,
    len: u64,
}

impl<'a> SnapshotSection<'a> {
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut f = self.file.append_handle.lock().expect("append lock poisoned");
        util::sync_write(&mut f, bytes, false)?;
        self.len += bytes.len() as u64;
        Ok(())
    }

    /// Bytes written into the blob so far.
    pub fn offset(&self) -> u64 {
        self.len
    }

    /// Patch the blob header with the final length, append the trailing
    /// `Snapshot` entry, and release `snap_mu`. Returns `(entry_pos,
    /// snap_pos)`: the file position of the appended entry itself (so
    /// callers can index it like any other entry via `read_entry_at`), and
    /// the byte offset the event stream starts at (the entry's `SnapPos`).
    pub fn close(self, commit: u64, timestamp: u64) -> Result<(u64, u64)> {
        let snap_pos = self.blob_start + 8;
        {
            // The append handle is opened O_APPEND, so it always writes at
            // EOF regardless of a prior seek; patch the placeholder length
            // through a separate read/write handle instead.
            let rw = util::open_file_rw(self.file.path.as_os_str())?;
            err_at!(IOError, rw.write_at(&(self.len as u32).to_be_bytes(), self.blob_start + 4))?;
        }
        let entry = Entry::new(commit, timestamp, EntryKind::Snapshot { snap_pos });
        let entry_pos = self.file.append_entry(&entry)?;
        Ok((entry_pos, snap_pos))
    }

    /// Release `snap_mu` without finalizing. The placeholder blob header
    /// (length still 0) is left behind; startup recovery truncates it away
    /// on the next `Dlog::open`.
    pub fn abandon(self) {}
}

#[cfg(test)]
#[path = "file_test.rs"]
mod file_test;
