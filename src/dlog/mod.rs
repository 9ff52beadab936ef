//! Double-buffered append log. Two files, `logA`/`logB`, with a sibling
//! `dlog.state` recording which one currently accepts appends; the other
//! is available to the snapshot builder and to compaction.

mod entry;
mod file;

pub use entry::{Entry, EntryKind};
pub use file::{LogFile, SnapshotSection, SNAPSHOT_MAGIC};

use std::{
    collections::HashMap,
    convert::TryInto,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use crate::{index::LogFileId, util, Result};

/// One kept position carried forward by a compaction, mapping its old byte
/// offset to where it lands in the rewritten file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactedSegment {
    pub old_entry_pos: u64,
    pub new_entry_pos: u64,
    pub new_snap_pos: Option<u64>,
}

impl CompactedSegment {
    pub fn is_snapshot(&self) -> bool {
        self.new_snap_pos.is_some()
    }
}

/// A dry-run compaction result: where every kept position would land, and
/// the resulting file length, without touching disk.
#[derive(Debug, Clone, Default)]
pub struct CompactionPlan {
    pub segments: Vec<CompactedSegment>,
    pub total_len: u64,
}

pub struct Dlog {
    log_a: Arc<LogFile>,
    log_b: Arc<LogFile>,
    state_path: PathBuf,
    active: Mutex<LogFileId>,
    fsync: bool,
}

impl Dlog {
    /// Open (or initialize) the dlog rooted at `dir`: creates `logA`,
    /// `logB` and `dlog.state` if absent, runs the startup truncation
    /// recovery pass on each file, and defaults the active file to `A` for
    /// a fresh store.
    pub fn open(dir: &Path, fsync: bool) -> Result<Dlog> {
        err_at!(IOError, std::fs::create_dir_all(dir))?;

        let path_a = dir.join("logA");
        let path_b = dir.join("logB");
        let state_path = dir.join("dlog.state");

        let log_a = Arc::new(LogFile::open(LogFileId::A, &path_a, fsync)?);
        let log_b = Arc::new(LogFile::open(LogFileId::B, &path_b, fsync)?);

        validate_and_truncate(&log_a)?;
        validate_and_truncate(&log_b)?;

        let active = if state_path.exists() {
            read_active_state(&state_path)?
        } else {
            write_active_state(&state_path, LogFileId::A, fsync)?;
            LogFileId::A
        };

        Ok(Dlog { log_a, log_b, state_path, active: Mutex::new(active), fsync })
    }

    fn file(&self, id: LogFileId) -> &Arc<LogFile> {
        match id {
            LogFileId::A => &self.log_a,
            LogFileId::B => &self.log_b,
        }
    }

    pub fn active_id(&self) -> LogFileId {
        *self.active.lock().expect("dlog master lock poisoned")
    }

    pub fn inactive_id(&self) -> LogFileId {
        self.active_id().other()
    }

    pub fn active_file(&self) -> Arc<LogFile> {
        self.file(self.active_id()).clone()
    }

    pub fn inactive_file(&self) -> Arc<LogFile> {
        self.file(self.inactive_id()).clone()
    }

    /// Either file by id, for callers (the storage facade's indexer) that
    /// already know which file an entry landed in rather than caring which
    /// one is currently active.
    pub fn file_ref(&self, id: LogFileId) -> Arc<LogFile> {
        self.file(id).clone()
    }

    pub fn file_generation(&self, id: LogFileId) -> u64 {
        self.file(id).generation()
    }

    /// Append to whichever file is currently active. The master lock is
    /// only held long enough to read the active identifier; the actual
    /// write is serialized by the file's own data lock.
    pub fn append_entry(&self, entry: &Entry) -> Result<(LogFileId, u64)> {
        let id = self.active_id();
        let pos = self.file(id).append_entry(entry)?;
        Ok((id, pos))
    }

    pub fn read_entry_at(&self, id: LogFileId, pos: u64) -> Result<(Entry, u64)> {
        self.file(id).read_entry_at(pos)
    }

    pub fn acquire_reader(&self, id: LogFileId) {
        self.file(id).acquire_reader();
    }

    pub fn release_reader(&self, id: LogFileId) {
        self.file(id).release_reader();
    }

    /// Merge both files in ascending commit order, keeping only entries
    /// with `commit > from_commit` — used by startup rebuild from the
    /// latest snapshot's commit.
    pub fn iter_merged(&self, from_commit: u64) -> Result<Vec<(Entry, LogFileId, u64)>> {
        let mut out = vec![];
        for (id, file) in [(LogFileId::A, self.log_a.as_ref()), (LogFileId::B, self.log_b.as_ref())] {
            for item in file.iter_from(0)? {
                let (entry, pos) = item?;
                if entry.commit > from_commit {
                    out.push((entry, id, pos));
                }
            }
        }
        out.sort_by_key(|(entry, _, _)| entry.commit);
        Ok(out)
    }

    /// Flip the active file. Blocks on the file about to become inactive's
    /// `snapMu`, so a write-in-progress snapshot there finishes first, then
    /// atomically rewrites `dlog.state`.
    pub fn switch_active(&self) -> Result<LogFileId> {
        let mut guard = self.active.lock().expect("dlog master lock poisoned");
        let next_inactive = *guard;
        self.file(next_inactive).wait_for_snapshot_idle();

        let next_active = next_inactive.other();
        write_active_state(&self.state_path, next_active, self.fsync)?;
        *guard = next_active;
        Ok(next_active)
    }

    /// Start a snapshot blob on the currently inactive file.
    pub fn begin_snapshot_on_inactive(&self) -> Result<SnapshotSection<'_>> {
        let id = self.inactive_id();
        self.file(id).begin_snapshot()
    }

    /// Compute where each of `keep_positions` (already sorted ascending)
    /// would land in a compacted file, without touching disk.
    pub fn plan_compaction(&self, id: LogFileId, keep_positions: &[u64]) -> Result<CompactionPlan> {
        let file = self.file(id);
        let mut segments = vec![];
        let mut cursor = 0u64;

        for &pos in keep_positions {
            let (entry, next) = file.read_entry_at(pos)?;
            let entry_len = next - pos;

            match entry.snap_pos() {
                Some(old_snap_pos) => {
                    let blob_header_pos = old_snap_pos - 8;
                    let blob_len = read_u32_at(file, blob_header_pos + 4)? as u64;
                    let new_blob_header_pos = cursor;
                    let new_snap_pos = new_blob_header_pos + 8;
                    let new_entry_pos = new_snap_pos + blob_len;
                    segments.push(CompactedSegment {
                        old_entry_pos: pos,
                        new_entry_pos,
                        new_snap_pos: Some(new_snap_pos),
                    });
                    cursor = new_entry_pos + entry_len;
                }
                None => {
                    segments.push(CompactedSegment { old_entry_pos: pos, new_entry_pos: cursor, new_snap_pos: None });
                    cursor += entry_len;
                }
            }
        }

        Ok(CompactionPlan { segments, total_len: cursor })
    }

    /// Execute compaction of `id`'s file down to `keep_positions`: write a
    /// temp file holding only the kept bytes (rewriting `snap_pos` where it
    /// moved), fsync, rename the old file aside, rename the temp file into
    /// place, reopen handles, bump the generation counter, and schedule
    /// `old.old`'s deletion once readers drain or `grace_period` elapses.
    /// Returns the old→new position mapping from the plan.
    pub fn compact(
        &self,
        id: LogFileId,
        keep_positions: &[u64],
        grace_period: Duration,
    ) -> Result<HashMap<u64, u64>> {
        let file = self.file(id).clone();
        let plan = self.plan_compaction(id, keep_positions)?;

        let tmp_path = sibling_path(file.path(), "compact.tmp");
        std::fs::remove_file(&tmp_path).ok();
        let mut tmp = util::create_file_a(tmp_path.as_os_str())?;

        for seg in &plan.segments {
            let (mut entry, _) = file.read_entry_at(seg.old_entry_pos)?;

            if let Some(new_snap_pos) = seg.new_snap_pos {
                let old_snap_pos = entry.snap_pos().expect("plan only sets new_snap_pos for SnapPos entries");
                let blob_header_pos = old_snap_pos - 8;
                let blob_len = read_u32_at(&file, blob_header_pos + 4)? as u64;
                let blob = file.read_at(blob_header_pos, (8 + blob_len) as usize)?;
                util::sync_write(&mut tmp, &blob, false)?;
                entry.rewrite_snap_pos(new_snap_pos);
            }

            let payload = util::into_cbor_bytes(entry)?;
            if payload.len() > u32::MAX as usize {
                return err_at!(TooLarge, msg: "compacted entry of {} bytes exceeds 32-bit length prefix", payload.len());
            }
            let mut buf = Vec::with_capacity(4 + payload.len());
            buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            buf.extend_from_slice(&payload);
            util::sync_write(&mut tmp, &buf, false)?;
        }

        err_at!(IOError, tmp.sync_all())?;
        drop(tmp);

        let final_path = file.path().to_path_buf();
        let old_aside = file.rename_aside()?;
        match std::fs::rename(&tmp_path, &final_path) {
            Ok(()) => {}
            Err(err) => {
                err_at!(RenameFail, std::fs::rename(&old_aside, &final_path))?;
                return err_at!(RenameFail, msg: "renaming compaction temp file over {:?}: {}", final_path, err);
            }
        }

        file.reopen()?;
        file.bump_generation();

        let mapping: HashMap<u64, u64> =
            plan.segments.iter().map(|s| (s.old_entry_pos, s.new_entry_pos)).collect();

        spawn_grace_period_cleanup(file, old_aside, grace_period);

        Ok(mapping)
    }
}

fn read_u32_at(file: &LogFile, pos: u64) -> Result<u32> {
    let bytes = file.read_at(pos, 4)?;
    let arr: [u8; 4] = bytes.try_into().expect("read_at(_, 4) returns exactly 4 bytes");
    Ok(u32::from_be_bytes(arr))
}

/// `old.old` lingers until every reader that acquired a refcount on `file`
/// before the swap has released it, or `grace_period` elapses, whichever
/// first.
fn spawn_grace_period_cleanup(file: Arc<LogFile>, stale_path: PathBuf, grace_period: Duration) {
    thread::spawn(move || {
        let deadline = Instant::now() + grace_period;
        while file.reader_count() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        if file.reader_count() > 0 {
            snap_debug!("grace period elapsed with readers still on {:?}; leaving it in place", stale_path);
        } else {
            std::fs::remove_file(&stale_path).ok();
        }
    });
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut p = path.to_path_buf();
    let name = format!("{}.{}", p.file_name().and_then(|n| n.to_str()).unwrap_or("file"), suffix);
    p.set_file_name(name);
    p
}

fn read_active_state(path: &Path) -> Result<LogFileId> {
    let bytes = err_at!(IOError, std::fs::read(path))?;
    match bytes.first() {
        Some(b'A') => Ok(LogFileId::A),
        Some(b'B') => Ok(LogFileId::B),
        _ => err_at!(InvalidFile, msg: "dlog.state at {:?} does not hold 'A' or 'B'", path),
    }
}

fn write_active_state(path: &Path, id: LogFileId, fsync: bool) -> Result<()> {
    let byte = match id {
        LogFileId::A => b'A',
        LogFileId::B => b'B',
    };
    let tmp_path = sibling_path(path, "tmp");
    let mut f = util::create_file_a(tmp_path.as_os_str())?;
    util::sync_write(&mut f, &[byte], fsync)?;
    err_at!(IOError, std::fs::rename(&tmp_path, path))
}

/// Startup recovery: walk `file` validating every length-prefixed record
/// (entry, or blob header + blob + entry) against the remaining file size,
/// and truncate at the last position fully backed by on-disk bytes. A crash
/// mid-append or mid-snapshot-close leaves a dangling tail shorter than its
/// declared length; this drops it rather than failing to open.
fn validate_and_truncate(file: &LogFile) -> Result<()> {
    let total = file.len()?;
    let mut pos = 0u64;

    loop {
        if pos + 4 > total {
            break;
        }
        let marker = read_u32_at(file, pos)?;

        let next = if marker == SNAPSHOT_MAGIC {
            if pos + 8 > total {
                break;
            }
            let blob_len = read_u32_at(file, pos + 4)? as u64;
            let entry_len_pos = pos + 8 + blob_len;
            if entry_len_pos + 4 > total {
                break;
            }
            let entry_len = read_u32_at(file, entry_len_pos)? as u64;
            let entry_end = entry_len_pos + 4 + entry_len;
            if entry_end > total {
                break;
            }
            entry_end
        } else {
            let entry_end = pos + 4 + marker as u64;
            if entry_end > total {
                break;
            }
            entry_end
        };

        pos = next;
    }

    if pos < total {
        file.truncate_to(pos)?;
    }
    Ok(())
}
