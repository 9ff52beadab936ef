use std::io::Cursor;

use super::*;
use crate::{index::LogFileId, snapshot::{builder::SnapshotBuilder, format}};

fn temp_path(name: &str) -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("tonystore-finder-test-{}-{}", std::process::id(), name));
    p
}

fn sample_events() -> Vec<Event> {
    vec![
        Event::BeginObject(None),
        Event::Key("a".to_string()),
        Event::BeginObject(None),
        Event::Key("b".to_string()),
        Event::BeginArray(None),
        Event::Int(10, None),
        Event::Int(20, None),
        Event::Int(30, None),
        Event::EndArray,
        Event::Key("c".to_string()),
        Event::String("x".to_string(), None),
        Event::EndObject,
        Event::Key("d".to_string()),
        Event::Bool(true, None),
        Event::EndObject,
    ]
}

/// Builds the sample document into a fresh `LogFile`'s snapshot blob with a
/// tiny chunk size (forcing `a` and `a.b` to each start their own chunk),
/// and returns the file plus the absolute offset the event stream begins at.
fn build_sample_snapshot(path: &std::path::Path) -> (LogFile, u64, u64, Vec<format::IndexEntry>) {
    std::fs::remove_file(path).ok();
    let file = LogFile::open(LogFileId::A, path, false).unwrap();

    let mut builder = SnapshotBuilder::with_max_chunk_size(Cursor::new(vec![]), 1).unwrap();
    for e in sample_events() {
        builder.write_event(e).unwrap();
    }
    let buf = builder.close().unwrap().into_inner();

    let mut section = file.begin_snapshot().unwrap();
    section.write(&buf).unwrap();
    let (_entry_pos, snap_pos) = section.close(1, 0).unwrap();

    let header = file.read_at(snap_pos, format::HEADER_LEN).unwrap();
    let (event_len, index_len) = format::decode_header(&header).unwrap();
    let event_start = snap_pos + format::HEADER_LEN as u64;
    let index_bytes = file.read_at(event_start + event_len, index_len as usize).unwrap();
    let index = format::decode_index(&index_bytes).unwrap();

    (file, event_start, event_len, index)
}

#[test]
fn test_exact_chunk_match_returns_subtree() {
    let path = temp_path("exact");
    let (file, event_start, event_len, index) = build_sample_snapshot(&path);

    let ab_path = KPath::from_segments(vec![Segment::Field("a".to_string()), Segment::Field("b".to_string())]);
    let entry = index.iter().find(|e| e.path == ab_path).unwrap();

    let reader = SectionReader::new(&file, event_start, event_len);
    let finder = PathFinder::new(reader, index.clone(), ab_path.clone(), ab_path, entry.offset);
    let events = finder.find().unwrap();

    assert_eq!(
        events,
        vec![
            Event::BeginArray(None),
            Event::Int(10, None),
            Event::Int(20, None),
            Event::Int(30, None),
            Event::EndArray,
        ]
    );
    drop(finder);
    assert_eq!(file.reader_count(), 0);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_ancestor_chunk_walks_forward_to_desired_path() {
    let path = temp_path("ancestor");
    let (file, event_start, event_len, index) = build_sample_snapshot(&path);

    let a_path = KPath::from_segments(vec![Segment::Field("a".to_string())]);
    let ab_path = KPath::from_segments(vec![Segment::Field("a".to_string()), Segment::Field("b".to_string())]);
    let entry = index.iter().find(|e| e.path == a_path).unwrap();

    let reader = SectionReader::new(&file, event_start, event_len);
    let finder = PathFinder::new(reader, index.clone(), a_path, ab_path, entry.offset);
    let events = finder.find().unwrap();

    assert_eq!(events.first(), Some(&Event::BeginArray(None)));
    assert_eq!(events.last(), Some(&Event::EndArray));

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_root_chunk_reconstructs_whole_document() {
    let path = temp_path("root");
    let (file, event_start, event_len, index) = build_sample_snapshot(&path);

    let root = KPath::root();
    let entry = index.iter().find(|e| e.path.is_root()).unwrap();

    let reader = SectionReader::new(&file, event_start, event_len);
    let finder = PathFinder::new(reader, index.clone(), root.clone(), root, entry.offset);
    let events = finder.find().unwrap();

    assert_eq!(events, sample_events());

    std::fs::remove_file(&path).ok();
}
