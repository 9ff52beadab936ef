use super::*;

fn temp_path(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("tonystore-seq-test-{}-{}", std::process::id(), name));
    p
}

#[test]
fn test_open_creates_zeroed_file_when_absent() {
    let path = temp_path("fresh");
    std::fs::remove_file(&path).ok();
    let seq = Seq::open(&path, false).unwrap();
    assert_eq!(seq.current_state(), (0, 0));
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 16);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_next_commit_and_next_tx_seq_are_independent_counters() {
    let path = temp_path("independent");
    std::fs::remove_file(&path).ok();
    let seq = Seq::open(&path, false).unwrap();

    assert_eq!(seq.next_commit().unwrap(), 1);
    assert_eq!(seq.next_commit().unwrap(), 2);
    assert_eq!(seq.next_tx_seq().unwrap(), 1);
    assert_eq!(seq.current_state(), (2, 1));

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_state_survives_reopen() {
    let path = temp_path("reopen");
    std::fs::remove_file(&path).ok();
    {
        let seq = Seq::open(&path, false).unwrap();
        seq.next_commit().unwrap();
        seq.next_commit().unwrap();
        seq.next_tx_seq().unwrap();
    }
    let seq = Seq::open(&path, false).unwrap();
    assert_eq!(seq.current_state(), (2, 1));
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_open_rejects_nonzero_reserved_byte() {
    let path = temp_path("reserved-byte");
    std::fs::remove_file(&path).ok();

    let mut buf = [0u8; 16];
    buf[7] = 0x01; // top byte of the little-endian commit counter
    std::fs::write(&path, buf).unwrap();

    let err = Seq::open(&path, false).unwrap_err();
    assert!(matches!(err, crate::Error::InvalidFile(..)));

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_open_rejects_wrong_length_file() {
    let path = temp_path("wrong-length");
    std::fs::remove_file(&path).ok();
    std::fs::write(&path, [0u8; 10]).unwrap();

    let err = Seq::open(&path, false).unwrap_err();
    assert!(matches!(err, crate::Error::InvalidFile(..)));

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_counter_wraps_at_56_bits() {
    let path = temp_path("wraps");
    std::fs::remove_file(&path).ok();

    let mut buf = [0u8; 16];
    buf[0..8].copy_from_slice(&COUNTER_MASK.to_le_bytes());
    std::fs::write(&path, buf).unwrap();

    let seq = Seq::open(&path, false).unwrap();
    assert_eq!(seq.current_state().0, COUNTER_MASK);
    assert_eq!(seq.next_commit().unwrap(), 0);

    std::fs::remove_file(&path).ok();
}
