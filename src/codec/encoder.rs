use std::io;

use crate::{
    event::{Event, Tag},
    path::PathState,
    Result,
};

/// Formatting knobs for [Encoder]. The default is the compact form used by
/// the dlog and snapshot builder; `pretty` is for human-facing dumps.
#[derive(Debug, Clone)]
pub struct EncoderOpts {
    pub pretty: bool,
    pub indent_width: usize,
}

impl Default for EncoderOpts {
    fn default() -> EncoderOpts {
        EncoderOpts { pretty: false, indent_width: 2 }
    }
}

/// Writes an [Event] stream out as Tony-format text.
///
/// Keeps its own [PathState] purely to know, from `process_event`'s depth
/// and key bookkeeping, when a comma is owed before the next key or value —
/// the same state machine the decoder runs in reverse. `last_was_value`
/// records whether the item just written needs a trailing separator before
/// whatever comes next.
pub struct Encoder<W> {
    w: W,
    opts: EncoderOpts,
    state: PathState,
    last_was_value: bool,
    pending_tag: Option<Tag>,
    offset: u64,
}

impl<W: io::Write> Encoder<W> {
    pub fn new(w: W) -> Encoder<W> {
        Encoder::with_opts(w, EncoderOpts::default())
    }

    pub fn with_opts(w: W, opts: EncoderOpts) -> Encoder<W> {
        Encoder {
            w,
            opts,
            state: PathState::new(),
            last_was_value: false,
            pending_tag: None,
            offset: 0,
        }
    }

    /// Bytes written so far through this encoder.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Swap in a new writer and formatting options, clearing all encoder
    /// state. Used to reuse one `Encoder` value across chunk boundaries
    /// when the snapshot builder starts a fresh section.
    pub fn reset(&mut self, w: W, opts: EncoderOpts) {
        self.w = w;
        self.opts = opts;
        self.state = PathState::new();
        self.last_was_value = false;
        self.pending_tag = None;
        self.offset = 0;
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        err_at!(IOError, self.w.write_all(bytes))?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    fn write_indent(&mut self) -> Result<()> {
        if self.opts.pretty {
            self.write_raw(b"\n")?;
            let n = self.state.depth() * self.opts.indent_width;
            self.write_raw(" ".repeat(n).as_bytes())?;
        }
        Ok(())
    }

    fn write_separator(&mut self) -> Result<()> {
        if self.last_was_value {
            self.write_raw(b",")?;
        }
        self.write_indent()
    }

    fn write_tag(&mut self) -> Result<()> {
        if let Some(tag) = self.pending_tag.take() {
            self.write_raw(tag.to_string().as_bytes())?;
        }
        Ok(())
    }

    pub fn begin_object(&mut self) -> Result<()> {
        self.write_separator()?;
        self.write_tag()?;
        self.write_raw(b"{")?;
        self.state.process_event(&Event::BeginObject(None))?;
        self.last_was_value = false;
        Ok(())
    }

    pub fn end_object(&mut self) -> Result<()> {
        self.state.process_event(&Event::EndObject)?;
        self.write_indent()?;
        self.write_raw(b"}")?;
        self.last_was_value = true;
        Ok(())
    }

    pub fn begin_array(&mut self) -> Result<()> {
        self.write_separator()?;
        self.write_tag()?;
        self.write_raw(b"[")?;
        self.state.process_event(&Event::BeginArray(None))?;
        self.last_was_value = false;
        Ok(())
    }

    pub fn end_array(&mut self) -> Result<()> {
        self.state.process_event(&Event::EndArray)?;
        self.write_indent()?;
        self.write_raw(b"]")?;
        self.last_was_value = true;
        Ok(())
    }

    pub fn write_key(&mut self, k: &str) -> Result<()> {
        self.write_separator()?;
        write_text(self, k)?;
        self.write_raw(b":")?;
        self.state.process_event(&Event::Key(k.to_string()))?;
        self.last_was_value = false;
        Ok(())
    }

    pub fn write_int_key(&mut self, n: i64) -> Result<()> {
        self.write_separator()?;
        self.write_raw(n.to_string().as_bytes())?;
        self.write_raw(b":")?;
        self.state.process_event(&Event::IntKey(n))?;
        self.last_was_value = false;
        Ok(())
    }

    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_separator()?;
        self.write_tag()?;
        write_quoted(self, s)?;
        self.state.process_event(&Event::String(s.to_string(), None))?;
        self.last_was_value = true;
        Ok(())
    }

    pub fn write_int(&mut self, n: i64) -> Result<()> {
        self.write_separator()?;
        self.write_tag()?;
        self.write_raw(n.to_string().as_bytes())?;
        self.state.process_event(&Event::Int(n, None))?;
        self.last_was_value = true;
        Ok(())
    }

    pub fn write_float(&mut self, f: f64) -> Result<()> {
        self.write_separator()?;
        self.write_tag()?;
        self.write_raw(f.to_string().as_bytes())?;
        self.state.process_event(&Event::Float(f, None))?;
        self.last_was_value = true;
        Ok(())
    }

    pub fn write_bool(&mut self, b: bool) -> Result<()> {
        self.write_separator()?;
        self.write_tag()?;
        self.write_raw(if b { b"true" } else { b"false" })?;
        self.state.process_event(&Event::Bool(b, None))?;
        self.last_was_value = true;
        Ok(())
    }

    pub fn write_null(&mut self) -> Result<()> {
        self.write_separator()?;
        self.write_tag()?;
        self.write_raw(b"null")?;
        self.state.process_event(&Event::Null(None))?;
        self.last_was_value = true;
        Ok(())
    }

    /// Attach a textual type annotation to the value that follows.
    pub fn tag(&mut self, name: &str, args: Vec<String>) -> Result<()> {
        if self.pending_tag.is_some() {
            return err_at!(InvariantViolation, msg: "tag already pending for next value");
        }
        self.pending_tag = Some(Tag::with_args(name, args));
        Ok(())
    }

    /// Compose `outer` onto whatever tag is already pending.
    pub fn tag_compose(&mut self, outer: &str, args: Vec<String>) -> Result<()> {
        self.pending_tag = Some(Tag::compose(outer, args, self.pending_tag.take()));
        Ok(())
    }

    pub fn write_head_comment(&mut self, lines: Vec<String>) -> Result<()> {
        self.write_indent()?;
        for line in &lines {
            self.write_raw(format!("# {}\n", line).as_bytes())?;
        }
        Ok(())
    }

    pub fn write_line_comment(&mut self, lines: Vec<String>) -> Result<()> {
        for line in &lines {
            self.write_raw(format!(" # {}", line).as_bytes())?;
        }
        Ok(())
    }
}

fn needs_quoting(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {
            !chars.all(|c| c == '_' || c == '-' || c.is_ascii_alphanumeric())
        }
        _ => true,
    }
}

fn write_text<W: io::Write>(enc: &mut Encoder<W>, s: &str) -> Result<()> {
    if needs_quoting(s) {
        write_quoted(enc, s)
    } else {
        enc.write_raw(s.as_bytes())
    }
}

fn write_quoted<W: io::Write>(enc: &mut Encoder<W>, s: &str) -> Result<()> {
    enc.write_raw(b"\"")?;
    for ch in s.chars() {
        match ch {
            '"' | '\\' => enc.write_raw(format!("\\{}", ch).as_bytes())?,
            _ => enc.write_raw(ch.to_string().as_bytes())?,
        }
    }
    enc.write_raw(b"\"")
}

#[cfg(test)]
#[path = "encoder_test.rs"]
mod encoder_test;
