//! Storage facade: ties the dlog, path index, sequence allocator and schema
//! registry into the single entry point a caller drives — submit a patch,
//! read a path as of a commit, or fold the whole document down into a fresh
//! snapshot.

use std::{
    io::Cursor,
    path::{Path, PathBuf},
    sync::{Mutex, RwLock},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{
    dlog::{Dlog, Entry, EntryKind},
    event::Event,
    index::{index_patch, IndexTree, IndexWriteParams, LogFileId, LogSegment},
    ir::{events_to_value, value_to_events, Node, Value},
    path::{KPath, Segment},
    schema::Schema,
    seq::Seq,
    snapshot::{self, SnapshotBuilder},
    util, Result,
};

/// Default threshold, in bytes, at which an active log file is switched out
/// and folded into a snapshot. Not mandated by any particular figure; 16 MiB
/// keeps the log files small enough that a rebuild-from-dlog startup stays
/// fast.
const DEFAULT_LOG_ROTATE_LIMIT: u64 = 16 * 1024 * 1024;

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Open/tuning parameters for a [Storage] instance, shaped like
/// `wral::Config`/`robt::Config`: a plain struct with a `new` constructor
/// carrying sane defaults and `set_*` builder methods.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    dir: PathBuf,
    name: String,
    log_rotate_limit: u64,
    snapshot_max_chunk_size: usize,
    fsync: bool,
    grace_period: Duration,
}

impl StorageConfig {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> StorageConfig {
        StorageConfig {
            dir: dir.into(),
            name: name.into(),
            log_rotate_limit: DEFAULT_LOG_ROTATE_LIMIT,
            snapshot_max_chunk_size: snapshot::DEFAULT_MAX_CHUNK_SIZE,
            fsync: false,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn set_log_rotate_limit(&mut self, n: u64) -> &mut Self {
        self.log_rotate_limit = n;
        self
    }

    pub fn set_snapshot_max_chunk_size(&mut self, n: usize) -> &mut Self {
        self.snapshot_max_chunk_size = n;
        self
    }

    pub fn set_fsync(&mut self, fsync: bool) -> &mut Self {
        self.fsync = fsync;
        self
    }

    pub fn set_grace_period(&mut self, grace_period: Duration) -> &mut Self {
        self.grace_period = grace_period;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// What a successful [Patcher::commit] produced: the allocated commit and
/// transaction sequence numbers, and where the entry landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitResult {
    pub commit: u64,
    pub tx_seq: u64,
    pub log_file: LogFileId,
    pub log_position: u64,
}

/// A single document's dlog, path index, sequence allocator and keyed-array
/// schema, open for the lifetime of the process: no multi-document support,
/// no multi-writer replication.
pub struct Storage {
    config: StorageConfig,
    dlog: Dlog,
    tree: IndexTree,
    schema: RwLock<Schema>,
    seq: Seq,
    /// Serializes the allocate-commit / append-entry / index-patch
    /// sequence so concurrent commits cannot interleave.
    commit_mu: Mutex<()>,
}

impl Storage {
    /// Open (or initialize) the store rooted at `config.dir()`: the dlog's
    /// `logA`/`logB`/`dlog.state`, the sequence file at `meta/seq`, and a
    /// freshly rebuilt path index.
    pub fn open(config: StorageConfig) -> Result<Storage> {
        err_at!(IOError, std::fs::create_dir_all(&config.dir))?;

        let dlog = Dlog::open(&config.dir.join("dlog"), config.fsync)?;
        let seq = Seq::open(&config.dir.join("meta").join("seq"), config.fsync)?;
        let tree = IndexTree::new();
        let schema = Schema::new();

        rebuild_index(&dlog, &tree, &schema)?;

        Ok(Storage { config, dlog, tree, schema: RwLock::new(schema), seq, commit_mu: Mutex::new(()) })
    }

    /// Register `path` (the keyed array's own kpath) as keyed by
    /// `key_field`, consulted the next time a patch touching that array is
    /// indexed or a query descends into a keyed element.
    pub fn register_keyed_array(&self, path: KPath, key_field: impl Into<String>) {
        self.schema.write().expect("schema lock poisoned").register_keyed_array(path, key_field);
    }

    /// Start a transaction context: a version tag and an optional scope
    /// that every [Patcher] it mints will carry through to commit.
    pub fn new_tx(&self, version: u64, scope: Option<String>) -> Tx<'_> {
        Tx { storage: self, version, scope }
    }

    pub fn get_current_commit(&self) -> u64 {
        self.seq.current_state().0
    }

    /// Resolve `path` as of `commit` under `scope`.
    ///
    /// A patch entry only ever carries what its own commit actually touched,
    /// but `walk` re-inserts a segment at every ancestor node on the path to
    /// whatever it did touch — so the freshest segment covering an ancestor
    /// of `path` is not necessarily a patch that contains `path` at all (a
    /// later sibling-only write re-stamps the root without saying anything
    /// about `path`). Try candidates newest-commit-first and fall through to
    /// an older one when navigation comes up empty, rather than trusting the
    /// single freshest candidate. The only entries that can decode to a full
    /// document root regardless of what `path` asks for are snapshots
    /// (`Entry::is_snapshot`), which `switch_and_snapshot` deliberately
    /// indexes as a single root segment rather than walking per field.
    ///
    /// Once a patch is found whose content actually reaches `path`, and the
    /// resolved node is a container, recurse into its children via the index
    /// rather than trusting that one patch's own literal child list, since
    /// an older or newer sibling write may not be part of the same patch.
    pub fn query(&self, path: &KPath, commit: u64, scope: Option<&str>) -> Result<Option<Value>> {
        let mut candidates = self.tree.lookup_range(path, 0, commit, scope);
        candidates.sort_by(|a, b| b.end_commit.cmp(&a.end_commit));

        let shaped = {
            let schema = self.schema.read().expect("schema lock poisoned");
            let mut found = None;
            for seg in &candidates {
                let root_value = self.decode_segment_root(seg)?;
                if let Some(v) = navigate(&root_value, path, &schema) {
                    found = Some(v);
                    break;
                }
            }
            found
        };
        let shaped = match shaped {
            Some(v) => v,
            None => return Ok(None),
        };

        match &shaped.node {
            Node::Object(_) => self.reassemble_object(path, &shaped, commit, scope),
            Node::SparseArray(_) => self.reassemble_sparse(path, &shaped, commit, scope),
            Node::Array(_) => self.reassemble_array(path, &shaped, commit, scope),
            _ => Ok(Some(shaped)),
        }
    }

    /// Switch the active log file, then fold the document as of the new
    /// commit into a snapshot blob written to the file that just became
    /// inactive, registering a root [LogSegment] at commit range `[C,C]`.
    pub fn switch_and_snapshot(&self) -> Result<u64> {
        self.dlog.switch_active()?;
        let commit = self.get_current_commit();

        let root_value = self.query(&KPath::root(), commit, None)?.unwrap_or_else(|| Value::new(Node::Object(vec![])));
        let events = value_to_events(&root_value);

        let cursor = Cursor::new(Vec::new());
        let mut builder = SnapshotBuilder::with_max_chunk_size(cursor, self.config.snapshot_max_chunk_size)?;
        for event in events {
            builder.write_event(event)?;
        }
        let blob_bytes = builder.close()?.into_inner();

        let mut section = self.dlog.begin_snapshot_on_inactive()?;
        if let Err(err) = section.write(&blob_bytes) {
            section.abandon();
            return Err(err);
        }

        let timestamp = now_secs();
        let (entry_pos, _snap_pos) = section.close(commit, timestamp)?;

        let id = self.dlog.inactive_id();
        self.tree.insert(LogSegment {
            kinded_path: KPath::root(),
            start_commit: commit,
            end_commit: commit,
            start_tx: 0,
            end_tx: 0,
            log_file: id,
            log_position: entry_pos,
            log_file_generation: self.dlog.file_generation(id),
            scope_id: None,
            array_key: None,
            array_key_field: None,
        });

        Ok(commit)
    }

    /// Release the store. There is no separate handle to tear down beyond
    /// what `Drop` already does for the underlying files; this persists the
    /// path index to `index/tree` as a debugging/inspection artifact. It is
    /// deliberately not consulted by `open` — a `LogFile`'s generation
    /// counter always restarts at zero, so a persisted
    /// `log_file_generation` surviving past a compaction that happened
    /// before the last close would misreport staleness; rebuilding straight
    /// from the dlog sidesteps that.
    pub fn close(self) -> Result<()> {
        self.tree.persist_to_file(self.config.dir.join("index").join("tree").as_os_str())
    }

    fn decode_segment_root(&self, seg: &LogSegment) -> Result<Value> {
        let (entry, _) = self.dlog.read_entry_at(seg.log_file, seg.log_position)?;
        if entry.is_snapshot() {
            self.decode_snapshot_root(&entry, seg.log_file)
        } else {
            let bytes = match entry.patch() {
                Some(bytes) => bytes,
                None => {
                    return err_at!(
                        Fatal,
                        msg: "log entry at {:?}:{} carries neither a patch nor a snapshot",
                        seg.log_file,
                        seg.log_position
                    )
                }
            };
            decode_patch_bytes(bytes)
        }
    }

    fn decode_snapshot_root(&self, entry: &Entry, id: LogFileId) -> Result<Value> {
        let snap_pos = entry.snap_pos().expect("is_snapshot() entries always carry snap_pos");
        let file = self.dlog.file_ref(id);

        let header = file.read_at(snap_pos, snapshot::HEADER_LEN)?;
        let (event_stream_len, _index_len) = snapshot::decode_header(&header)?;
        let stream = file.read_at(snap_pos + snapshot::HEADER_LEN as u64, event_stream_len as usize)?;

        let mut events = vec![];
        let mut slice: &[u8] = &stream;
        while !slice.is_empty() {
            let (event, n): (Event, usize) = util::from_cbor_bytes(slice)?;
            slice = &slice[n..];
            events.push(event);
        }
        events_to_value(events)
    }

    fn reassemble_object(&self, path: &KPath, shaped: &Value, commit: u64, scope: Option<&str>) -> Result<Option<Value>> {
        let mut fields = vec![];
        for seg in self.tree.list_range(path, 0, commit, scope) {
            if let Segment::Field(name) = &seg {
                if let Some(v) = self.query(&path.push(seg.clone()), commit, scope)? {
                    fields.push((name.clone(), v));
                }
            }
        }
        Ok(Some(Value { tag: shaped.tag.clone(), head_comment: None, line_comment: None, node: Node::Object(fields) }))
    }

    fn reassemble_sparse(&self, path: &KPath, shaped: &Value, commit: u64, scope: Option<&str>) -> Result<Option<Value>> {
        let mut items = vec![];
        for seg in self.tree.list_range(path, 0, commit, scope) {
            if let Segment::Sparse(n) = seg {
                if let Some(v) = self.query(&path.push(Segment::Sparse(n)), commit, scope)? {
                    items.push((n, v));
                }
            }
        }
        items.sort_by_key(|(n, _)| *n);
        Ok(Some(Value {
            tag: shaped.tag.clone(),
            head_comment: None,
            line_comment: None,
            node: Node::SparseArray(items),
        }))
    }

    /// Reassembles either a dense or a keyed array under `path`. A keyed
    /// array's elements no longer carry their original position once
    /// indexed — only `users(joe)`/`users(alice)` are ever indexed, never
    /// `users[0]`/`users[1]` — so its elements come back ordered by key
    /// rather than original array order.
    fn reassemble_array(&self, path: &KPath, shaped: &Value, commit: u64, scope: Option<&str>) -> Result<Option<Value>> {
        let mut dense = vec![];
        let mut keyed = vec![];
        for seg in self.tree.list_range(path, 0, commit, scope) {
            match &seg {
                Segment::Dense(i) => {
                    if let Some(v) = self.query(&path.push(seg.clone()), commit, scope)? {
                        dense.push((*i, v));
                    }
                }
                Segment::Keyed(Some(k)) => {
                    if let Some(v) = self.query(&path.push(seg.clone()), commit, scope)? {
                        keyed.push((k.clone(), v));
                    }
                }
                Segment::Keyed(None) | Segment::Field(_) | Segment::Sparse(_) => {}
            }
        }

        let items = if !keyed.is_empty() {
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            keyed.into_iter().map(|(_, v)| v).collect()
        } else {
            dense.sort_by_key(|(i, _)| *i);
            dense.into_iter().map(|(_, v)| v).collect()
        };
        Ok(Some(Value { tag: shaped.tag.clone(), head_comment: None, line_comment: None, node: Node::Array(items) }))
    }

    fn commit_patch(&self, patch: Value, scope: Option<String>, tx_source: Option<String>) -> Result<CommitResult> {
        let guard = self.commit_mu.lock().expect("commit lock poisoned");

        let last_commit = self.seq.current_state().0;
        let commit = self.seq.next_commit()?;
        let tx_seq = self.seq.next_tx_seq()?;
        let timestamp = now_secs();

        let patch_bytes = encode_patch_value(&patch)?;
        let kind = match tx_source {
            Some(tx_source) => EntryKind::Transaction { last_commit, tx_seq, patch: patch_bytes, tx_source },
            None => EntryKind::Patch { last_commit, tx_seq, patch: patch_bytes },
        };
        let entry = Entry::new(commit, timestamp, kind);

        let (log_file, log_position) = self.dlog.append_entry(&entry)?;
        let log_file_generation = self.dlog.file_generation(log_file);

        {
            let schema = self.schema.read().expect("schema lock poisoned");
            index_patch(
                &self.tree,
                &schema,
                &patch,
                &IndexWriteParams {
                    start_commit: commit,
                    end_commit: commit,
                    start_tx: tx_seq,
                    end_tx: tx_seq,
                    log_file,
                    log_position,
                    log_file_generation,
                    scope_id: scope,
                },
            );
        }

        drop(guard);

        if self.dlog.active_file().len()? >= self.config.log_rotate_limit {
            self.switch_and_snapshot()?;
        }

        Ok(CommitResult { commit, tx_seq, log_file, log_position })
    }
}

/// A transaction context minted by [Storage::new_tx]: carries the version
/// tag and scope that every [Patcher] built from it will commit under.
pub struct Tx<'s> {
    storage: &'s Storage,
    version: u64,
    scope: Option<String>,
}

impl<'s> Tx<'s> {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn new_patcher(&self, patch: Value) -> Patcher<'s> {
        Patcher { storage: self.storage, scope: self.scope.clone(), tx_source: None, patch }
    }
}

/// One pending write, ready to commit.
pub struct Patcher<'s> {
    storage: &'s Storage,
    scope: Option<String>,
    tx_source: Option<String>,
    patch: Value,
}

impl<'s> Patcher<'s> {
    /// Tag this commit with a transaction source, switching it from a plain
    /// `Patch` entry to a `Transaction` entry.
    pub fn with_tx_source(mut self, source: impl Into<String>) -> Patcher<'s> {
        self.tx_source = Some(source.into());
        self
    }

    pub fn commit(self) -> Result<CommitResult> {
        self.storage.commit_patch(self.patch, self.scope, self.tx_source)
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn decode_patch_bytes(bytes: &[u8]) -> Result<Value> {
    let (events, _): (Vec<Event>, usize) = util::from_cbor_bytes(bytes)?;
    events_to_value(events)
}

fn encode_patch_value(value: &Value) -> Result<Vec<u8>> {
    util::into_cbor_bytes(value_to_events(value))
}

/// Descend `root` along `path`, one segment at a time, resolving keyed-array
/// segments against the array's own `!key(field)` tag or a schema
/// registration the same way [crate::index::index_patch] does.
fn navigate(root: &Value, path: &KPath, schema: &Schema) -> Option<Value> {
    let mut current = root.clone();
    let mut prefix = KPath::root();
    for seg in path.segments() {
        current = descend(&current, seg, schema, &prefix)?;
        prefix = prefix.push(seg.clone());
    }
    Some(current)
}

fn descend(value: &Value, seg: &Segment, schema: &Schema, array_path: &KPath) -> Option<Value> {
    match (&value.node, seg) {
        (Node::Object(fields), Segment::Field(name)) => {
            fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
        }
        (Node::SparseArray(items), Segment::Sparse(n)) => items.iter().find(|(k, _)| k == n).map(|(_, v)| v.clone()),
        (Node::Array(items), Segment::Dense(i)) => items.get(*i as usize).cloned(),
        (Node::Array(items), Segment::Keyed(Some(key))) => {
            let key_field = value
                .tag
                .as_ref()
                .filter(|t| t.name == "key")
                .and_then(|t| t.args.first().cloned())
                .or_else(|| schema.key_field_for(array_path).map(str::to_string))?;
            items.iter().find(|v| element_key(v, &key_field).as_deref() == Some(key.as_str())).cloned()
        }
        _ => None,
    }
}

fn element_key(element: &Value, field: &str) -> Option<String> {
    match &element.node {
        Node::Object(fields) => fields.iter().find(|(k, _)| k == field).and_then(|(_, v)| match &v.node {
            Node::String(s) => Some(s.clone()),
            Node::Int(n) => Some(n.to_string()),
            _ => None,
        }),
        _ => None,
    }
}

/// Startup index rebuild: merge both log files in commit order, find the
/// latest full-document snapshot (if any), insert its root segment, then
/// walk every patch committed after it. Patches at or before the snapshot's
/// commit are already subsumed by that snapshot and are skipped.
fn rebuild_index(dlog: &Dlog, tree: &IndexTree, schema: &Schema) -> Result<()> {
    let merged = dlog.iter_merged(0)?;
    let snap_commit = merged.iter().filter(|(e, _, _)| e.is_snapshot()).map(|(e, _, _)| e.commit).max().unwrap_or(0);

    for (entry, id, pos) in &merged {
        if entry.is_snapshot() {
            if entry.commit == snap_commit {
                tree.insert(LogSegment {
                    kinded_path: KPath::root(),
                    start_commit: entry.commit,
                    end_commit: entry.commit,
                    start_tx: 0,
                    end_tx: 0,
                    log_file: *id,
                    log_position: *pos,
                    log_file_generation: dlog.file_generation(*id),
                    scope_id: None,
                    array_key: None,
                    array_key_field: None,
                });
            }
            continue;
        }
        if entry.commit <= snap_commit {
            continue;
        }

        let patch_bytes = entry.patch().expect("non-snapshot dlog entries always carry a patch");
        let value = decode_patch_bytes(patch_bytes)?;
        let tx_seq = entry_tx_seq(entry);

        index_patch(
            tree,
            schema,
            &value,
            &IndexWriteParams {
                start_commit: entry.commit,
                end_commit: entry.commit,
                start_tx: tx_seq,
                end_tx: tx_seq,
                log_file: *id,
                log_position: *pos,
                log_file_generation: dlog.file_generation(*id),
                scope_id: None,
            },
        );
    }

    Ok(())
}

fn entry_tx_seq(entry: &Entry) -> u64 {
    match &entry.kind {
        EntryKind::Patch { tx_seq, .. } | EntryKind::Transaction { tx_seq, .. } | EntryKind::Compaction { tx_seq, .. } => {
            *tx_seq
        }
        EntryKind::Snapshot { .. } | EntryKind::SchemaChange { .. } => 0,
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;
