use crate::{
    dlog::LogFile,
    event::Event,
    path::{KPath, PathState, Segment},
    snapshot::format::IndexEntry,
    util, Result,
};

/// A read-only window into one snapshot blob's event stream, addressed by
/// offsets relative to the blob's own start. Holds a reader-refcount on the
/// underlying log file for its lifetime so a concurrent compaction knows
/// not to reclaim the bytes out from under it; releasing that count is
/// handled by `Drop`, so both a normal return and an early `abandon` leave
/// the file in a consistent state.
pub struct SectionReader<'a> {
    file: &'a LogFile,
    base: u64,
    event_stream_size: u64,
}

impl<'a> SectionReader<'a> {
    pub fn new(file: &'a LogFile, base: u64, event_stream_size: u64) -> SectionReader<'a> {
        file.acquire_reader();
        SectionReader { file, base, event_stream_size }
    }

    fn read_range(&self, rel_offset: u64, len: usize) -> Result<Vec<u8>> {
        self.file.read_at(self.base + rel_offset, len)
    }

    /// Release the reader hold without reading anything further. Equivalent
    /// to dropping the value; spelled out for call sites that want the
    /// release to be explicit on a failure path.
    pub fn abandon(self) {}
}

impl<'a> Drop for SectionReader<'a> {
    fn drop(&mut self) {
        self.file.release_reader();
    }
}

/// Locates and extracts the event subsequence for one path out of a
/// snapshot's event stream, without decoding the whole blob.
///
/// `idx_path` is the path recorded against the trailing-index entry the
/// caller chose to start from (either an exact match for `des_path`, or the
/// nearest ancestor chunk); `des_path` is the path actually wanted. Reading
/// starts at that entry's offset and walks forward, chunk by chunk,
/// tracking path state the same way the builder did, until the value at
/// `des_path` has been fully collected.
pub struct PathFinder<'a> {
    reader: SectionReader<'a>,
    index: Vec<IndexEntry>,
    idx_path: KPath,
    des_path: KPath,
    start_offset: u64,
}

impl<'a> PathFinder<'a> {
    pub fn new(
        reader: SectionReader<'a>,
        index: Vec<IndexEntry>,
        idx_path: KPath,
        des_path: KPath,
        start_offset: u64,
    ) -> PathFinder<'a> {
        PathFinder { reader, index, idx_path, des_path, start_offset }
    }

    pub fn find(&self) -> Result<Vec<Event>> {
        let mut state = PathState::from_path(&self.idx_path);
        if matches!(self.idx_path.last(), Some(Segment::Field(_)) | Some(Segment::Sparse(_))) {
            // `from_path` leaves the leaf frame expecting a value next, but
            // the byte stream at `start_offset` still begins with the real
            // Key/IntKey event for that leaf. Consuming a synthetic null
            // clears the pending-key flag so that real event can be
            // reprocessed without tripping the "key after key" check.
            state.process_event(&Event::Null(None))?;
        }

        let mut boundaries: Vec<u64> =
            self.index.iter().map(|e| e.offset).filter(|&o| o > self.start_offset).collect();
        boundaries.sort_unstable();
        boundaries.push(self.reader.event_stream_size);

        let mut pos = self.start_offset;
        let mut collecting = false;
        let mut depth: i64 = 0;
        let mut out = vec![];

        for boundary in boundaries {
            if pos >= boundary {
                continue;
            }
            let bytes = self.reader.read_range(pos, (boundary - pos) as usize)?;
            let mut slice: &[u8] = &bytes;

            while !slice.is_empty() {
                let (event, n): (Event, usize) = util::from_cbor_bytes(slice)?;
                slice = &slice[n..];
                pos += n as u64;

                state.process_event(&event)?;

                if collecting {
                    let is_begin = event.is_begin();
                    let is_end = event.is_end();
                    out.push(event);
                    if is_begin {
                        depth += 1;
                    }
                    if is_end {
                        depth -= 1;
                        if depth == 0 {
                            return Ok(out);
                        }
                    }
                } else if event.is_value_start() && state.current_path() == self.des_path {
                    collecting = true;
                    let is_begin = event.is_begin();
                    out.push(event);
                    if is_begin {
                        depth = 1;
                    } else {
                        return Ok(out);
                    }
                }
            }
        }

        err_at!(NotFound, msg: "path {} not found from snapshot offset {}", self.des_path, self.start_offset)
    }
}

#[cfg(test)]
#[path = "finder_test.rs"]
mod finder_test;
