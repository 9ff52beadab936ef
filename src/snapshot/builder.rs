use std::io::{self, Seek, Write};

use crate::{
    event::Event,
    path::{KPath, PathState},
    snapshot::format::{self, IndexEntry},
    util, Result,
};

/// Default chunk size: large enough that most documents fit a handful of
/// chunks, small enough that a path lookup only has to decode one chunk's
/// worth of bytes.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 48 * 1024;

struct OpenChunk {
    path: KPath,
    start_offset: u64,
}

/// Consumes an event stream and writes it out as a self-indexed snapshot
/// blob: a 12-byte header, the event stream itself, and a trailing index
/// mapping chunk-boundary paths to byte offsets.
///
/// A chunk boundary only ever falls at the start of a value (a scalar, or a
/// `BeginObject`/`BeginArray`); a buffered key is carried along with the
/// value it introduces so a chunk never splits a key from its value.
pub struct SnapshotBuilder<W> {
    w: W,
    max_chunk_size: usize,
    offset: u64,
    state: PathState,
    index: Vec<IndexEntry>,
    chunk: Option<OpenChunk>,
    pending_key: Option<Event>,
}

impl<W: Write + Seek> SnapshotBuilder<W> {
    pub fn new(w: W) -> Result<SnapshotBuilder<W>> {
        SnapshotBuilder::with_max_chunk_size(w, DEFAULT_MAX_CHUNK_SIZE)
    }

    pub fn with_max_chunk_size(mut w: W, max_chunk_size: usize) -> Result<SnapshotBuilder<W>> {
        err_at!(IOError, w.write_all(&[0u8; format::HEADER_LEN]))?;
        Ok(SnapshotBuilder {
            w,
            max_chunk_size,
            offset: 0,
            state: PathState::new(),
            index: vec![],
            chunk: None,
            pending_key: None,
        })
    }

    /// Bytes written into the event stream so far (header excluded).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Feed the next event. `Key`/`IntKey` events are buffered until the
    /// value they introduce arrives, so the two are always written as a
    /// pair.
    pub fn write_event(&mut self, event: Event) -> Result<()> {
        if event.is_key() {
            if self.pending_key.is_some() {
                return err_at!(InvariantViolation, msg: "key arrived while another key is still pending a value");
            }
            self.pending_key = Some(event);
            return Ok(());
        }
        self.emit(event)
    }

    fn write_raw_event(&mut self, event: &Event) -> Result<()> {
        let bytes = util::into_cbor_bytes(event.clone())?;
        err_at!(IOError, self.w.write_all(&bytes))?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    fn emit(&mut self, event: Event) -> Result<()> {
        let is_value_start = event.is_value_start();
        let pending_key = self.pending_key.take();
        let pre_offset = self.offset;

        if let Some(key) = &pending_key {
            self.state.process_event(key)?;
            self.write_raw_event(key)?;
        }
        self.state.process_event(&event)?;

        if is_value_start && self.chunk.is_none() {
            self.chunk = Some(OpenChunk { path: self.state.current_path(), start_offset: pre_offset });
        }

        self.write_raw_event(&event)?;

        if is_value_start {
            let hit_limit = self
                .chunk
                .as_ref()
                .map(|c| (self.offset - c.start_offset) as usize >= self.max_chunk_size)
                .unwrap_or(false);
            if hit_limit {
                let chunk = self.chunk.take().expect("checked above");
                self.index.push(IndexEntry::new(chunk.path, chunk.start_offset));
            }
        }
        Ok(())
    }

    /// Flush the pending chunk, write the trailing index, then seek back and
    /// patch the header with the measured lengths. Returns the underlying
    /// writer.
    pub fn close(mut self) -> Result<W> {
        if let Some(chunk) = self.chunk.take() {
            self.index.push(IndexEntry::new(chunk.path, chunk.start_offset));
        }
        if !self.index.iter().any(|e| e.path.is_root() && e.offset == 0) {
            self.index.insert(0, IndexEntry::new(KPath::root(), 0));
        }
        self.index.sort_by_key(|e| e.offset);

        let event_stream_len = self.offset;
        let index_bytes = format::encode_index(&self.index)?;
        if index_bytes.len() > u32::MAX as usize {
            return err_at!(TooLarge, msg: "trailing index of {} bytes exceeds 32-bit length", index_bytes.len());
        }
        err_at!(IOError, self.w.write_all(&index_bytes))?;

        let header = format::encode_header(event_stream_len, index_bytes.len() as u32);
        err_at!(IOError, self.w.seek(io::SeekFrom::Start(0)))?;
        err_at!(IOError, self.w.write_all(&header))?;
        err_at!(IOError, self.w.seek(io::SeekFrom::End(0)))?;
        err_at!(IOError, self.w.flush())?;
        Ok(self.w)
    }
}

#[cfg(test)]
#[path = "builder_test.rs"]
mod builder_test;
