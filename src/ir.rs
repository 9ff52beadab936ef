//! In-memory document tree (IR) and the event<->IR conversion used by the
//! storage facade's `Query` and by the decoder/encoder boundary.
//!
//! Parent navigation is external: nodes only own their children, so a walker
//! that needs to go back up carries its own stack rather than the tree
//! carrying back-pointers.

use crate::{event::Event, event::Tag, Error, Result};

/// A node plus whatever comments/tag were attached to it in the source
/// event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub tag: Option<Tag>,
    pub head_comment: Option<Vec<String>>,
    pub line_comment: Option<Vec<String>>,
    pub node: Node,
}

impl Value {
    pub fn new(node: Node) -> Value {
        Value { tag: None, head_comment: None, line_comment: None, node }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Object(Vec<(String, Value)>),
    SparseArray(Vec<(u64, Value)>),
    Array(Vec<Value>),
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

enum Frame {
    Object { tag: Option<Tag>, head: Option<Vec<String>>, fields: Vec<(String, Value)> },
    Sparse { tag: Option<Tag>, head: Option<Vec<String>>, items: Vec<(u64, Value)> },
    Array { tag: Option<Tag>, head: Option<Vec<String>>, items: Vec<Value> },
}

enum PendingKey {
    Field(String),
    Sparse(u64),
}

/// Build an IR [Value] from a sequence of [Event]s.
pub fn events_to_value<I>(events: I) -> Result<Value>
where
    I: IntoIterator<Item = Event>,
{
    let mut stack: Vec<Frame> = vec![];
    let mut pending_key: Option<PendingKey> = None;
    let mut pending_head: Option<Vec<String>> = None;
    let mut root: Option<Value> = None;

    for e in events {
        match e {
            Event::HeadComment(lines) => pending_head = Some(lines),
            Event::LineComment(lines) => attach_line_comment(&mut stack, &mut root, lines),
            Event::Key(s) => pending_key = Some(PendingKey::Field(s)),
            Event::IntKey(n) => {
                pending_key = Some(PendingKey::Sparse(n as u64));
                // An object whose first key is numeric becomes a
                // sparse-array at that level.
                let should_promote =
                    matches!(stack.last(), Some(Frame::Object { fields, .. }) if fields.is_empty());
                if should_promote {
                    if let Some(Frame::Object { tag, head, .. }) = stack.pop() {
                        stack.push(Frame::Sparse { tag, head, items: vec![] });
                    }
                }
            }
            Event::BeginObject(tag) => {
                stack.push(Frame::Object { tag, head: pending_head.take(), fields: vec![] });
            }
            Event::BeginArray(tag) => {
                stack.push(Frame::Array { tag, head: pending_head.take(), items: vec![] });
            }
            Event::EndObject => {
                let value = match stack.pop() {
                    Some(Frame::Object { tag, head, fields }) => {
                        Value { tag, head_comment: head, line_comment: None, node: Node::Object(fields) }
                    }
                    Some(Frame::Sparse { tag, head, items }) => Value {
                        tag,
                        head_comment: head,
                        line_comment: None,
                        node: Node::SparseArray(items),
                    },
                    _ => return err_at!(InvariantViolation, msg: "EndObject without matching frame"),
                };
                place(&mut stack, &mut root, &mut pending_key, value)?;
            }
            Event::EndArray => {
                let value = match stack.pop() {
                    Some(Frame::Array { tag, head, items }) => {
                        Value { tag, head_comment: head, line_comment: None, node: Node::Array(items) }
                    }
                    _ => return err_at!(InvariantViolation, msg: "EndArray without matching frame"),
                };
                place(&mut stack, &mut root, &mut pending_key, value)?;
            }
            scalar => {
                let (tag, node) = match scalar {
                    Event::String(s, t) => (t, Node::String(s)),
                    Event::Int(n, t) => (t, Node::Int(n)),
                    Event::Float(f, t) => (t, Node::Float(f)),
                    Event::Bool(b, t) => (t, Node::Bool(b)),
                    Event::Null(t) => (t, Node::Null),
                    _ => unreachable!("Key/IntKey/comments handled above"),
                };
                let value = Value { tag, head_comment: pending_head.take(), line_comment: None, node };
                place(&mut stack, &mut root, &mut pending_key, value)?;
            }
        }
    }

    root.ok_or_else(|| Error::AmbiguousStream("empty event stream".to_string(), file!().to_string(), line!()))
}

fn place(
    stack: &mut Vec<Frame>,
    root: &mut Option<Value>,
    pending_key: &mut Option<PendingKey>,
    value: Value,
) -> Result<()> {
    match stack.last_mut() {
        None => *root = Some(value),
        Some(Frame::Array { items, .. }) => items.push(value),
        Some(Frame::Object { fields, .. }) => match pending_key.take() {
            Some(PendingKey::Field(k)) => fields.push((k, value)),
            _ => return err_at!(InvariantViolation, msg: "value inside object without a key"),
        },
        Some(Frame::Sparse { items, .. }) => match pending_key.take() {
            Some(PendingKey::Sparse(n)) => items.push((n, value)),
            _ => return err_at!(InvariantViolation, msg: "value inside sparse-array without an int-key"),
        },
    }
    Ok(())
}

fn attach_line_comment(stack: &mut [Frame], root: &mut Option<Value>, lines: Vec<String>) {
    let target: Option<&mut Value> = match stack.last_mut() {
        Some(Frame::Array { items, .. }) => items.last_mut(),
        Some(Frame::Object { fields, .. }) => fields.last_mut().map(|(_, v)| v),
        Some(Frame::Sparse { items, .. }) => items.last_mut().map(|(_, v)| v),
        None => root.as_mut(),
    };
    if let Some(v) = target {
        v.line_comment = Some(lines);
    }
}

/// Flatten an IR [Value] back into its [Event] sequence.
pub fn value_to_events(value: &Value) -> Vec<Event> {
    let mut out = vec![];
    push_value(value, &mut out);
    out
}

fn push_value(value: &Value, out: &mut Vec<Event>) {
    if let Some(lines) = &value.head_comment {
        out.push(Event::HeadComment(lines.clone()));
    }
    match &value.node {
        Node::Object(fields) => {
            out.push(Event::BeginObject(value.tag.clone()));
            for (k, v) in fields {
                out.push(Event::Key(k.clone()));
                push_value(v, out);
            }
            out.push(Event::EndObject);
        }
        Node::SparseArray(items) => {
            out.push(Event::BeginObject(value.tag.clone()));
            for (n, v) in items {
                out.push(Event::IntKey(*n as i64));
                push_value(v, out);
            }
            out.push(Event::EndObject);
        }
        Node::Array(items) => {
            out.push(Event::BeginArray(value.tag.clone()));
            for v in items {
                push_value(v, out);
            }
            out.push(Event::EndArray);
        }
        Node::String(s) => out.push(Event::String(s.clone(), value.tag.clone())),
        Node::Int(n) => out.push(Event::Int(*n, value.tag.clone())),
        Node::Float(f) => out.push(Event::Float(*f, value.tag.clone())),
        Node::Bool(b) => out.push(Event::Bool(*b, value.tag.clone())),
        Node::Null => out.push(Event::Null(value.tag.clone())),
    }
    if let Some(lines) = &value.line_comment {
        out.push(Event::LineComment(lines.clone()));
    }
}

#[cfg(test)]
#[path = "ir_test.rs"]
mod ir_test;
