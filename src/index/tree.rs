use std::{
    collections::{BTreeMap, BTreeSet},
    ffi::OsStr,
    sync::{Arc, RwLock},
};

use crate::{
    index::segment::{scope_matches, LogSegment},
    path::{KPath, Segment},
    util,
    Result,
};

struct Node {
    children: RwLock<BTreeMap<Segment, Arc<Node>>>,
    local: RwLock<BTreeSet<LogSegment>>,
}

impl Node {
    fn new() -> Node {
        Node { children: RwLock::new(BTreeMap::new()), local: RwLock::new(BTreeSet::new()) }
    }

    fn child(&self, seg: &Segment) -> Option<Arc<Node>> {
        self.children.read().unwrap().get(seg).cloned()
    }

    fn child_or_insert(&self, seg: &Segment) -> Arc<Node> {
        if let Some(child) = self.child(seg) {
            return child;
        }
        let mut children = self.children.write().unwrap();
        children.entry(seg.clone()).or_insert_with(|| Arc::new(Node::new())).clone()
    }
}

/// Direction of traversal/iteration over a node's local segment set.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// Hierarchical tree keyed by kinded-path segments; every node holds a
/// sorted multiset of [LogSegment] records local to that exact path.
pub struct IndexTree {
    root: Arc<Node>,
}

impl Default for IndexTree {
    fn default() -> IndexTree {
        IndexTree::new()
    }
}

impl IndexTree {
    pub fn new() -> IndexTree {
        IndexTree { root: Arc::new(Node::new()) }
    }

    /// Insert `seg` at the node reached by its own kinded path, creating
    /// intermediate nodes as needed.
    pub fn insert(&self, seg: LogSegment) {
        let path = seg.kinded_path.clone();
        let mut node = self.root.clone();
        for s in path.segments() {
            node = node.child_or_insert(s);
        }
        node.local.write().unwrap().insert(seg);
    }

    /// Remove the exact-equal record at its kinded path. Returns whether a
    /// matching record was present.
    pub fn remove(&self, seg: &LogSegment) -> bool {
        let mut node = self.root.clone();
        for s in seg.kinded_path.segments() {
            match node.child(s) {
                Some(c) => node = c,
                None => return false,
            }
        }
        node.local.write().unwrap().remove(seg)
    }

    fn node_at(&self, kp: &KPath) -> Option<Arc<Node>> {
        let mut node = self.root.clone();
        for s in kp.segments() {
            node = node.child(s)?;
        }
        Some(node)
    }

    /// Collect segments along the traversal path to `kp` (root, then each
    /// prefix of `kp` in turn) whose `end_commit` falls in `[from, to]` and
    /// whose scope matches.
    pub fn lookup_range(
        &self,
        kp: &KPath,
        from: u64,
        to: u64,
        scope: Option<&str>,
    ) -> Vec<LogSegment> {
        let pred = |s: &LogSegment| s.end_commit >= from && s.end_commit <= to;
        let mut out = vec![];
        let mut node = self.root.clone();
        collect_matching(&node, scope, &mut out, pred);
        for seg in kp.segments() {
            node = match node.child(seg) {
                Some(c) => c,
                None => break,
            };
            collect_matching(&node, scope, &mut out, pred);
        }
        out.sort();
        out
    }

    /// Like `lookup_range`, but the predicate is `start_commit <= commit <=
    /// end_commit`.
    pub fn lookup_within(&self, kp: &KPath, commit: u64, scope: Option<&str>) -> Vec<LogSegment> {
        let pred = |s: &LogSegment| s.start_commit <= commit && commit <= s.end_commit;
        let mut out = vec![];
        let mut node = self.root.clone();
        collect_matching(&node, scope, &mut out, pred);
        for seg in kp.segments() {
            node = match node.child(seg) {
                Some(c) => c,
                None => break,
            };
            collect_matching(&node, scope, &mut out, pred);
        }
        out.sort();
        out
    }

    /// Immediate child segment-names of the node at `kp` that have at
    /// least one local record satisfying the range/scope filter.
    pub fn list_range(&self, kp: &KPath, from: u64, to: u64, scope: Option<&str>) -> Vec<Segment> {
        let node = match self.node_at(kp) {
            Some(n) => n,
            None => return vec![],
        };
        let children = node.children.read().unwrap();
        let mut out = vec![];
        for (name, child) in children.iter() {
            let local = child.local.read().unwrap();
            let matches = local
                .iter()
                .any(|s| s.end_commit >= from && s.end_commit <= to && scope_matches(scope, s.scope_id.as_deref()));
            if matches {
                out.push(name.clone());
            }
        }
        out
    }

    /// Remove every segment tagged with `scope_id`, anywhere in the tree.
    /// Returns the count removed.
    pub fn delete_scope(&self, scope_id: &str) -> usize {
        delete_scope_at(&self.root, scope_id)
    }

    pub fn iter(&self) -> IndexIterator {
        IndexIterator { root: self.root.clone(), stack: vec![self.root.clone()] }
    }

    /// Every record in the tree, in no particular order. Used to persist
    /// the index and to rebuild a snapshot from the indexed path order.
    pub fn all_segments(&self) -> Vec<LogSegment> {
        let mut out = vec![];
        collect_all(&self.root, &mut out);
        out
    }

    /// Serialize every record to `file` via atomic temp-file-and-rename.
    pub fn persist_to_file(&self, file: &OsStr) -> Result<()> {
        let segments = self.all_segments();
        let bytes = util::into_cbor_bytes(segments)?;

        let mut tmp = std::path::PathBuf::from(file);
        let tmp_name = format!("{}.tmp", tmp.file_name().and_then(|n| n.to_str()).unwrap_or("index"));
        tmp.set_file_name(tmp_name);

        let mut f = util::create_file_a(tmp.as_os_str())?;
        util::sync_write(&mut f, &bytes, true)?;
        err_at!(IOError, std::fs::rename(&tmp, file))
    }

    /// Reinstantiate the tree (and its comparator-ordered local sets) from
    /// a file written by `persist_to_file`.
    pub fn load_from_file(file: &OsStr) -> Result<IndexTree> {
        let bytes = err_at!(IOError, std::fs::read(file))?;
        let (segments, _): (Vec<LogSegment>, usize) = util::from_cbor_bytes(&bytes)?;

        let tree = IndexTree::new();
        for seg in segments {
            tree.insert(seg);
        }
        Ok(tree)
    }
}

fn collect_all(node: &Arc<Node>, out: &mut Vec<LogSegment>) {
    out.extend(node.local.read().unwrap().iter().cloned());
    let children: Vec<Arc<Node>> = node.children.read().unwrap().values().cloned().collect();
    for child in children {
        collect_all(&child, out);
    }
}

fn collect_matching(
    node: &Arc<Node>,
    scope: Option<&str>,
    out: &mut Vec<LogSegment>,
    pred: impl Fn(&LogSegment) -> bool,
) {
    let local = node.local.read().unwrap();
    for seg in local.iter() {
        if pred(seg) && scope_matches(scope, seg.scope_id.as_deref()) {
            out.push(seg.clone());
        }
    }
}

fn delete_scope_at(node: &Arc<Node>, scope_id: &str) -> usize {
    let mut count = {
        let mut local = node.local.write().unwrap();
        let before = local.len();
        let kept: BTreeSet<LogSegment> =
            local.iter().filter(|s| s.scope_id.as_deref() != Some(scope_id)).cloned().collect();
        let removed = before - kept.len();
        *local = kept;
        removed
    };
    let children: Vec<Arc<Node>> = node.children.read().unwrap().values().cloned().collect();
    for child in children {
        count += delete_scope_at(&child, scope_id);
    }
    count
}

/// Navigation cursor over an [IndexTree]: `down`/`up` move one level at a
/// time, `to_path` jumps from the root, and `commits`/`commits_at` read the
/// current node's local set.
pub struct IndexIterator {
    root: Arc<Node>,
    stack: Vec<Arc<Node>>,
}

impl IndexIterator {
    pub fn down(&mut self, seg: &Segment) -> bool {
        let top = self.stack.last().expect("stack always has the root");
        match top.child(seg) {
            Some(child) => {
                self.stack.push(child);
                true
            }
            None => false,
        }
    }

    /// Ascend one level. Returns `false` (no-op) if already at the root.
    pub fn up(&mut self) -> bool {
        if self.stack.len() > 1 {
            self.stack.pop();
            true
        } else {
            false
        }
    }

    pub fn to_path(&mut self, kp: &KPath) -> bool {
        self.stack = vec![self.root.clone()];
        for seg in kp.segments() {
            if !self.down(seg) {
                return false;
            }
        }
        true
    }

    pub fn current_depth(&self) -> usize {
        self.stack.len() - 1
    }

    /// The current node's local set, in the requested order.
    pub fn commits(&self, dir: Direction) -> Vec<LogSegment> {
        let node = self.stack.last().expect("stack always has the root");
        let local = node.local.read().unwrap();
        match dir {
            Direction::Forward => local.iter().cloned().collect(),
            Direction::Reverse => local.iter().rev().cloned().collect(),
        }
    }

    /// Segments from the current node's local set with `EndCommit` on the
    /// requested side of `commit`, ordered per `dir`.
    pub fn commits_at(&self, commit: u64, dir: Direction) -> Vec<LogSegment> {
        let mut all = self.commits(Direction::Forward);
        match dir {
            Direction::Forward => {
                all.retain(|s| s.end_commit >= commit);
                all
            }
            Direction::Reverse => {
                all.retain(|s| s.end_commit <= commit);
                all.reverse();
                all
            }
        }
    }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
