//! The structural event stream that flows between the tokenizer, the
//! encoder/decoder, the path-state tracker, the index and the snapshot
//! builder.

use cbordata::Cborize;

use std::fmt;

/// A textual type annotation attached to the value that immediately
/// follows it in the event stream.
#[derive(Debug, Clone, Eq, PartialEq, Cborize)]
pub struct Tag {
    pub name: String,
    pub args: Vec<String>,
}

impl Tag {
    const ID: u32 = 0x0;

    pub fn new(name: impl Into<String>) -> Tag {
        Tag { name: name.into(), args: vec![] }
    }

    pub fn with_args(name: impl Into<String>, args: Vec<String>) -> Tag {
        Tag { name: name.into(), args }
    }

    /// Compose a nested tag name: a new head tag named `outer`, carrying
    /// `args`, is prepended to any already-pending tag's name. The inner
    /// tag's own args are dropped; `args` on the call is authoritative for
    /// the composed tag.
    pub fn compose(outer: &str, args: Vec<String>, inner: Option<Tag>) -> Tag {
        let name = match inner {
            Some(inner) => format!("{}.{}", outer, inner.name),
            None => outer.to_string(),
        };
        Tag { name, args }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "!{}", self.name)?;
        if !self.args.is_empty() {
            write!(f, "({})", self.args.join(","))?;
        }
        Ok(())
    }
}

/// One structural unit of a Tony document, as produced by the decoder and
/// consumed by the path-state tracker, the index and the snapshot builder.
#[derive(Debug, Clone, PartialEq, Cborize)]
pub enum Event {
    BeginObject(Option<Tag>),
    EndObject,
    BeginArray(Option<Tag>),
    EndArray,
    Key(String),
    IntKey(i64),
    String(String, Option<Tag>),
    Int(i64, Option<Tag>),
    Float(f64, Option<Tag>),
    Bool(bool, Option<Tag>),
    Null(Option<Tag>),
    HeadComment(Vec<String>),
    LineComment(Vec<String>),
}

impl Event {
    const ID: u32 = 0x0;

    /// True for events that begin a value at the current path position:
    /// scalars and the two container-opening events. Used by the chunk
    /// policy in the snapshot builder and by the `PathFinder` collector
    /// state machine.
    pub fn is_value_start(&self) -> bool {
        matches!(
            self,
            Event::BeginObject(_)
                | Event::BeginArray(_)
                | Event::String(..)
                | Event::Int(..)
                | Event::Float(..)
                | Event::Bool(..)
                | Event::Null(_)
        )
    }

    pub fn is_key(&self) -> bool {
        matches!(self, Event::Key(_) | Event::IntKey(_))
    }

    pub fn is_begin(&self) -> bool {
        matches!(self, Event::BeginObject(_) | Event::BeginArray(_))
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Event::EndObject | Event::EndArray)
    }

    pub fn tag(&self) -> Option<&Tag> {
        match self {
            Event::BeginObject(t) | Event::BeginArray(t) => t.as_ref(),
            Event::String(_, t) | Event::Int(_, t) | Event::Float(_, t) | Event::Bool(_, t) => {
                t.as_ref()
            }
            Event::Null(t) => t.as_ref(),
            _ => None,
        }
    }
}
