//! Path-state stack: consumes [Event]s and exposes the current kinded path,
//! depth and container kind. Shared by both the streaming decoder and the
//! snapshot builder/`PathFinder` so that all three derive a kpath from
//! structural position the same way.

use crate::{
    event::Event,
    path::{KPath, Segment},
    Error, Result,
};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ContainerKind {
    Object,
    DenseArray,
    SparseArray,
}

/// One stack frame per open container.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: ContainerKind,
    /// Segment reaching the *current* child slot of this container; `None`
    /// until the first key/index is seen.
    pub segment: Option<Segment>,
    /// Number of children emitted so far; dense arrays start at -1 (modeled
    /// as `i64`) so the first value synthesizes index 0.
    pub child_count: i64,
    /// True after a `Key`/`IntKey` event and before its value arrives.
    pub has_key: bool,
}

impl Frame {
    fn object() -> Frame {
        Frame { kind: ContainerKind::Object, segment: None, child_count: 0, has_key: false }
    }

    fn dense_array() -> Frame {
        Frame { kind: ContainerKind::DenseArray, segment: None, child_count: -1, has_key: false }
    }

    fn sparse_array() -> Frame {
        Frame { kind: ContainerKind::SparseArray, segment: None, child_count: 0, has_key: false }
    }
}

/// Tracks the kinded path implied by a sequence of [Event]s.
#[derive(Debug, Clone, Default)]
pub struct PathState {
    stack: Vec<Frame>,
}

impl PathState {
    pub fn new() -> PathState {
        PathState { stack: vec![] }
    }

    /// Build a state whose stack reproduces `p`, for initializing a decoder
    /// at an indexed snapshot offset.
    pub fn from_path(p: &KPath) -> PathState {
        let mut state = PathState::new();
        let segs = p.segments();

        for (i, seg) in segs.iter().enumerate() {
            let is_leaf = i == segs.len() - 1;
            match seg {
                Segment::Field(s) => {
                    let mut frame = Frame::object();
                    frame.segment = Some(Segment::Field(s.clone()));
                    frame.has_key = is_leaf;
                    state.stack.push(frame);
                }
                Segment::Sparse(n) => {
                    let mut frame = Frame::sparse_array();
                    frame.segment = Some(Segment::Sparse(*n));
                    frame.has_key = is_leaf;
                    state.stack.push(frame);
                }
                Segment::Dense(n) => {
                    let mut frame = Frame::dense_array();
                    if is_leaf {
                        // Pre-seed at n-1: the next value event synthesizes n.
                        frame.child_count = (*n as i64) - 1;
                    } else {
                        // Already resolved: we are inside child n's content.
                        frame.child_count = *n as i64;
                        frame.segment = Some(Segment::Dense(*n));
                    }
                    state.stack.push(frame);
                }
                Segment::Keyed(k) => {
                    // Keyed segments address an array element; the parent
                    // array frame precedes this one structurally, but since
                    // PathState only tracks containers we *are* inside of,
                    // we model the keyed element itself as an object frame
                    // (its fields are addressed as normal object fields).
                    let mut frame = Frame::object();
                    frame.segment = Some(Segment::Keyed(k.clone()));
                    frame.has_key = is_leaf;
                    state.stack.push(frame);
                }
            }
        }
        state
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn top(&self) -> Option<&Frame> {
        self.stack.last()
    }

    pub fn is_in_object(&self) -> bool {
        matches!(self.top().map(|f| f.kind), Some(ContainerKind::Object))
    }

    pub fn is_in_array(&self) -> bool {
        matches!(
            self.top().map(|f| f.kind),
            Some(ContainerKind::DenseArray) | Some(ContainerKind::SparseArray)
        )
    }

    pub fn is_in_sparse_array(&self) -> bool {
        matches!(self.top().map(|f| f.kind), Some(ContainerKind::SparseArray))
    }

    pub fn current_key(&self) -> Option<&str> {
        match self.top() {
            Some(Frame { segment: Some(Segment::Field(s)), .. }) => Some(s),
            _ => None,
        }
    }

    pub fn current_index(&self) -> Option<u64> {
        match self.top() {
            Some(Frame { segment: Some(Segment::Dense(n)), .. }) => Some(*n),
            _ => None,
        }
    }

    pub fn current_int_key(&self) -> Option<u64> {
        match self.top() {
            Some(Frame { segment: Some(Segment::Sparse(n)), .. }) => Some(*n),
            _ => None,
        }
    }

    /// The kinded path reaching the current position: concatenation of
    /// stack-frame segments, bottom to top.
    pub fn current_path(&self) -> KPath {
        let segs: Vec<Segment> =
            self.stack.iter().filter_map(|f| f.segment.clone()).collect();
        KPath::from_segments(segs)
    }

    /// Advance the state machine by one event, following the per-event
    /// transition table for the current container kind.
    pub fn process_event(&mut self, e: &Event) -> Result<()> {
        match e {
            Event::BeginObject(_) => {
                self.on_value_arriving();
                self.stack.push(Frame::object());
            }
            Event::BeginArray(_) => {
                self.on_value_arriving();
                self.stack.push(Frame::dense_array());
            }
            Event::EndObject => {
                match self.stack.last() {
                    Some(f) if f.kind == ContainerKind::Object && !f.has_key => {}
                    Some(f) if f.kind == ContainerKind::Object && f.has_key => {
                        return err_at!(
                            InvariantViolation,
                            msg: "EndObject while a key is pending a value"
                        );
                    }
                    Some(f) if f.kind == ContainerKind::SparseArray && !f.has_key => {}
                    Some(f) if f.kind == ContainerKind::SparseArray && f.has_key => {
                        return err_at!(
                            InvariantViolation,
                            msg: "EndObject while a sparse key is pending a value"
                        );
                    }
                    _ => {
                        return err_at!(
                            InvariantViolation,
                            msg: "EndObject with no matching object/sparse-array frame"
                        );
                    }
                }
                self.stack.pop();
            }
            Event::EndArray => {
                match self.stack.last() {
                    Some(f) if f.kind == ContainerKind::DenseArray => {}
                    _ => {
                        return err_at!(
                            InvariantViolation,
                            msg: "EndArray with no matching array frame"
                        );
                    }
                }
                self.stack.pop();
            }
            Event::Key(s) => {
                let frame = self.top_mut_object("Key")?;
                if frame.has_key {
                    return err_at!(InvariantViolation, msg: "Key following Key");
                }
                frame.segment = Some(Segment::Field(s.clone()));
                frame.has_key = true;
            }
            Event::IntKey(n) => {
                let n = *n as u64;
                let frame = self.stack.last_mut().ok_or_else(|| {
                    Error::InvariantViolation(
                        "IntKey outside any container".to_string(),
                        file!().to_string(),
                        line!(),
                    )
                })?;
                match frame.kind {
                    ContainerKind::Object if frame.child_count == 0 && !frame.has_key => {
                        frame.kind = ContainerKind::SparseArray;
                    }
                    ContainerKind::SparseArray if !frame.has_key => {}
                    _ => {
                        return err_at!(
                            InvariantViolation,
                            msg: "IntKey only valid at the start of an object or in a sparse array"
                        );
                    }
                }
                frame.segment = Some(Segment::Sparse(n));
                frame.has_key = true;
            }
            Event::HeadComment(_) | Event::LineComment(_) => {}
            // Value event: String/Int/Float/Bool/Null.
            _ => self.on_value_arriving(),
        }
        Ok(())
    }

    fn top_mut_object(&mut self, ctx: &str) -> Result<&mut Frame> {
        match self.stack.last_mut() {
            Some(f) if f.kind == ContainerKind::Object => Ok(f),
            Some(_) => err_at!(InvariantViolation, msg: "{} outside an object", ctx),
            None => err_at!(InvariantViolation, msg: "{} outside any container", ctx),
        }
    }

    /// Shared tail of every value-producing transition: if we are sitting
    /// directly inside a dense array, synthesize the next index segment;
    /// either way, clear `has_key` on the way out (object/sparse-array key
    /// has been consumed by its value).
    fn on_value_arriving(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            match frame.kind {
                ContainerKind::DenseArray => {
                    frame.child_count += 1;
                    frame.segment = Some(Segment::Dense(frame.child_count as u64));
                }
                ContainerKind::Object | ContainerKind::SparseArray => {
                    frame.child_count += 1;
                    frame.has_key = false;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;
