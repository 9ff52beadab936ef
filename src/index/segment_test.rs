use super::*;
use crate::path::KPath;

fn seg(start_commit: u64, start_tx: u64, end_commit: u64, end_tx: u64) -> LogSegment {
    LogSegment {
        kinded_path: KPath::root(),
        start_commit,
        end_commit,
        start_tx,
        end_tx,
        log_file: LogFileId::A,
        log_position: 0,
        log_file_generation: 0,
        scope_id: None,
        array_key: None,
        array_key_field: None,
    }
}

#[test]
fn test_total_order_by_start_commit_first() {
    let a = seg(1, 0, 5, 0);
    let b = seg(2, 0, 3, 0);
    assert!(a < b);
}

#[test]
fn test_total_order_tiebreak_on_start_tx() {
    let a = seg(1, 0, 5, 0);
    let b = seg(1, 1, 5, 0);
    assert!(a < b);
}

#[test]
fn test_is_snapshot_when_start_equals_end() {
    assert!(seg(4, 0, 4, 0).is_snapshot());
    assert!(!seg(4, 0, 5, 0).is_snapshot());
}

#[test]
fn test_scope_matches_nil_request_only_matches_nil() {
    assert!(scope_matches(None, None));
    assert!(!scope_matches(None, Some("x")));
}

#[test]
fn test_scope_matches_named_request_matches_nil_or_same() {
    assert!(scope_matches(Some("x"), None));
    assert!(scope_matches(Some("x"), Some("x")));
    assert!(!scope_matches(Some("x"), Some("y")));
}
