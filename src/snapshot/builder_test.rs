use std::io::Cursor;

use super::*;
use crate::{event::Event, path::Segment, snapshot::format};

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

fn decode_all_events(bytes: &[u8]) -> Vec<Event> {
    let mut slice = bytes;
    let mut out = vec![];
    while !slice.is_empty() {
        let (event, n): (Event, usize) = util::from_cbor_bytes(slice).unwrap();
        out.push(event);
        slice = &slice[n..];
    }
    out
}

#[test]
fn test_event_stream_round_trips_through_header() {
    let mut builder = SnapshotBuilder::new(Cursor::new(vec![])).unwrap();
    for e in sample_events() {
        builder.write_event(e).unwrap();
    }
    let cursor = builder.close().unwrap();
    let bytes = cursor.into_inner();

    let (event_len, index_len) = format::decode_header(&bytes[0..format::HEADER_LEN]).unwrap();
    let event_start = format::HEADER_LEN;
    let event_bytes = &bytes[event_start..event_start + event_len as usize];
    let index_bytes =
        &bytes[event_start + event_len as usize..event_start + event_len as usize + index_len as usize];

    assert_eq!(decode_all_events(event_bytes), sample_events());
    assert_eq!(bytes.len(), format::HEADER_LEN + event_len as usize + index_len as usize);

    let index = format::decode_index(index_bytes).unwrap();
    assert!(index.iter().any(|e| e.path.is_root() && e.offset == 0));
}

#[test]
fn test_small_chunk_size_indexes_nested_paths() {
    let mut builder = SnapshotBuilder::with_max_chunk_size(Cursor::new(vec![]), 1).unwrap();
    for e in sample_events() {
        builder.write_event(e).unwrap();
    }
    let cursor = builder.close().unwrap();
    let bytes = cursor.into_inner();

    let (event_len, index_len) = format::decode_header(&bytes[0..format::HEADER_LEN]).unwrap();
    let event_start = format::HEADER_LEN;
    let index_bytes =
        &bytes[event_start + event_len as usize..event_start + event_len as usize + index_len as usize];
    let index = format::decode_index(index_bytes).unwrap();

    let a_path = KPath::from_segments(vec![Segment::Field("a".to_string())]);
    let ab_path = KPath::from_segments(vec![Segment::Field("a".to_string()), Segment::Field("b".to_string())]);

    assert!(index.iter().any(|e| e.path == a_path));
    assert!(index.iter().any(|e| e.path == ab_path));

    // Ascending offset order, as the format requires.
    let offsets: Vec<u64> = index.iter().map(|e| e.offset).collect();
    let mut sorted = offsets.clone();
    sorted.sort_unstable();
    assert_eq!(offsets, sorted);
}

#[test]
fn test_rejects_second_key_before_a_value() {
    let mut builder = SnapshotBuilder::new(Cursor::new(vec![])).unwrap();
    builder.write_event(Event::BeginObject(None)).unwrap();
    builder.write_event(Event::Key("a".to_string())).unwrap();
    let err = builder.write_event(Event::Key("b".to_string())).unwrap_err();
    assert!(matches!(err, crate::Error::InvariantViolation(..)));
}
