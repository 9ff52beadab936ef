//! Kinded paths (kpath): the hierarchical selector over a Tony document that
//! every [LogSegment][crate::index::LogSegment] and every snapshot chunk is
//! addressed by.

mod state;

pub use state::{ContainerKind, Frame, PathState};

use arbitrary::Arbitrary;
use cbordata::Cborize;

use std::{cmp, fmt, result};

use crate::{Error, Result};

/// One component of a kinded path.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Cborize, Arbitrary)]
pub enum Segment {
    /// An object field, reached by string key.
    Field(String),
    /// A dense-array index: position in a contiguous array.
    Dense(u64),
    /// A sparse-array index: position in a map-backed array.
    Sparse(u64),
    /// A keyed-array entry, reached by the element's key-field value.
    /// `None` denotes an element with no usable key (textual form `()`).
    Keyed(Option<String>),
}

impl Segment {
    const ID: u32 = 0x0;

    /// Kind rank used by the total ordering: field < dense < sparse < keyed.
    fn kind_rank(&self) -> u8 {
        match self {
            Segment::Field(_) => 0,
            Segment::Dense(_) => 1,
            Segment::Sparse(_) => 2,
            Segment::Keyed(_) => 3,
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        use Segment::*;

        match self.kind_rank().cmp(&other.kind_rank()) {
            cmp::Ordering::Equal => match (self, other) {
                (Field(a), Field(b)) => a.cmp(b),
                (Dense(a), Dense(b)) => a.cmp(b),
                (Sparse(a), Sparse(b)) => a.cmp(b),
                (Keyed(a), Keyed(b)) => a.cmp(b),
                _ => unreachable!("kind_rank equality implies same variant"),
            },
            ord => ord,
        }
    }
}

fn field_needs_quoting(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {
            !chars.all(|c| c == '_' || c == '-' || c.is_ascii_alphanumeric())
        }
        _ => true,
    }
}

fn write_quoted(f: &mut fmt::Formatter, s: &str) -> result::Result<(), fmt::Error> {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' | '\\' => write!(f, "\\{}", ch)?,
            _ => write!(f, "{}", ch)?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Segment::Field(s) if field_needs_quoting(s) => write_quoted(f, s),
            Segment::Field(s) => write!(f, "{}", s),
            Segment::Dense(n) => write!(f, "[{}]", n),
            Segment::Sparse(n) => write!(f, "{{{}}}", n),
            Segment::Keyed(Some(k)) if field_needs_quoting(k) => {
                write!(f, "(")?;
                write_quoted(f, k)?;
                write!(f, ")")
            }
            Segment::Keyed(Some(k)) => write!(f, "({})", k),
            Segment::Keyed(None) => write!(f, "()"),
        }
    }
}

/// An ordered list of [Segment]s. The empty path denotes the document root.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default, Cborize, Arbitrary)]
pub struct KPath(Vec<Segment>);

impl KPath {
    const ID: u32 = 0x0;

    pub fn root() -> KPath {
        KPath(vec![])
    }

    pub fn from_segments(segs: Vec<Segment>) -> KPath {
        KPath(segs)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn push(&self, seg: Segment) -> KPath {
        let mut segs = self.0.clone();
        segs.push(seg);
        KPath(segs)
    }

    pub fn parent(&self) -> Option<KPath> {
        if self.0.is_empty() {
            None
        } else {
            Some(KPath(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    pub fn first(&self) -> Option<&Segment> {
        self.0.first()
    }

    /// Split off the first segment, returning it along with the remaining
    /// suffix path. Used by [crate::index::IndexTree::insert]/`remove`/
    /// lookups to walk one tree-level at a time.
    pub fn split_first(&self) -> Option<(Segment, KPath)> {
        self.0.split_first().map(|(h, t)| (h.clone(), KPath(t.to_vec())))
    }

    /// True if `self` is `other`, or an ancestor of `other` (prefix match).
    pub fn is_ancestor_of(&self, other: &KPath) -> bool {
        self.0.len() <= other.0.len() && self.0 == other.0[..self.0.len()]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for KPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        for (i, seg) in self.0.iter().enumerate() {
            match seg {
                Segment::Field(_) if i > 0 => write!(f, ".{}", seg)?,
                Segment::Field(_) => write!(f, "{}", seg)?,
                _ => write!(f, "{}", seg)?,
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for KPath {
    type Err = Error;

    /// Parse a path's textual form back into a [KPath]. Accepts exactly the
    /// grammar this crate's own `Display` impl emits.
    fn from_str(s: &str) -> Result<KPath> {
        let mut segs = vec![];
        let chars: Vec<char> = s.chars().collect();
        let mut i = 0;
        let mut expect_field_sep = false;

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    i += 1;
                    expect_field_sep = false;
                }
                '[' => {
                    let (n, next) = parse_number(&chars, i + 1, ']')?;
                    segs.push(Segment::Dense(n));
                    i = next;
                    expect_field_sep = false;
                }
                '{' => {
                    let (n, next) = parse_number(&chars, i + 1, '}')?;
                    segs.push(Segment::Sparse(n));
                    i = next;
                    expect_field_sep = false;
                }
                '(' => {
                    let (key, next) = parse_key(&chars, i + 1, ')')?;
                    segs.push(Segment::Keyed(key));
                    i = next;
                    expect_field_sep = false;
                }
                '"' => {
                    let (key, next) = parse_quoted(&chars, i + 1)?;
                    segs.push(Segment::Field(key));
                    i = next;
                    expect_field_sep = true;
                }
                _ => {
                    let (key, next) = parse_bare(&chars, i);
                    segs.push(Segment::Field(key));
                    i = next;
                    expect_field_sep = true;
                }
            }
        }
        let _ = expect_field_sep;

        Ok(KPath(segs))
    }
}

fn parse_number(chars: &[char], mut i: usize, close: char) -> Result<(u64, usize)> {
    let start = i;
    while i < chars.len() && chars[i] != close {
        i += 1;
    }
    if i >= chars.len() {
        return err_at!(InvalidInput, msg: "unterminated path segment");
    }
    let s: String = chars[start..i].iter().collect();
    let n = err_at!(InvalidInput, s.parse::<u64>())?;
    Ok((n, i + 1))
}

fn parse_key(chars: &[char], i: usize, close: char) -> Result<(Option<String>, usize)> {
    if i < chars.len() && chars[i] == close {
        return Ok((None, i + 1));
    }
    if i < chars.len() && chars[i] == '"' {
        let (key, next) = parse_quoted(chars, i + 1)?;
        if next >= chars.len() || chars[next] != close {
            return err_at!(InvalidInput, msg: "unterminated keyed segment");
        }
        return Ok((Some(key), next + 1));
    }
    let start = i;
    let mut j = i;
    while j < chars.len() && chars[j] != close {
        j += 1;
    }
    if j >= chars.len() {
        return err_at!(InvalidInput, msg: "unterminated keyed segment");
    }
    let key: String = chars[start..j].iter().collect();
    Ok((Some(key), j + 1))
}

fn parse_quoted(chars: &[char], mut i: usize) -> Result<(String, usize)> {
    let mut s = String::new();
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                s.push(chars[i + 1]);
                i += 2;
            }
            '"' => return Ok((s, i + 1)),
            c => {
                s.push(c);
                i += 1;
            }
        }
    }
    err_at!(InvalidInput, msg: "unterminated quoted field")
}

fn parse_bare(chars: &[char], mut i: usize) -> (String, usize) {
    let start = i;
    while i < chars.len() && chars[i] != '.' && chars[i] != '[' && chars[i] != '{' && chars[i] != '(' {
        i += 1;
    }
    (chars[start..i].iter().collect(), i)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
