use super::*;
use crate::path::Segment;

fn temp_dir(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("tonystore-storage-test-{}-{}", std::process::id(), name));
    std::fs::remove_dir_all(&p).ok();
    p
}

fn obj(fields: Vec<(&str, Value)>) -> Value {
    Value::new(Node::Object(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect()))
}

fn s(v: &str) -> Value {
    Value::new(Node::String(v.to_string()))
}

fn n(v: i64) -> Value {
    Value::new(Node::Int(v))
}

fn field(path: &KPath, name: &str) -> KPath {
    path.push(Segment::Field(name.to_string()))
}

#[test]
fn test_open_creates_layout_and_starts_at_commit_zero() {
    let dir = temp_dir("open-layout");
    let storage = Storage::open(StorageConfig::new(&dir, "doc")).unwrap();

    assert_eq!(storage.get_current_commit(), 0);
    assert!(dir.join("dlog").join("logA").exists());
    assert!(dir.join("meta").join("seq").exists());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_commit_then_query_round_trips_a_field() {
    let dir = temp_dir("commit-query");
    let storage = Storage::open(StorageConfig::new(&dir, "doc")).unwrap();

    let patch = obj(vec![("name", s("alice")), ("age", n(30))]);
    let tx = storage.new_tx(1, None);
    let result = tx.new_patcher(patch).commit().unwrap();
    assert_eq!(result.commit, 1);

    let got = storage.query(&KPath::root(), result.commit, None).unwrap().unwrap();
    assert_eq!(got, obj(vec![("name", s("alice")), ("age", n(30))]));

    let name_path = field(&KPath::root(), "name");
    let got_name = storage.query(&name_path, result.commit, None).unwrap().unwrap();
    assert_eq!(got_name, s("alice"));

    std::fs::remove_dir_all(&dir).ok();
}

/// A later, narrower patch touching only `users` must not hide an earlier
/// sibling field still covered by the first patch.
#[test]
fn test_partial_patch_does_not_shadow_unrelated_sibling_fields() {
    let dir = temp_dir("partial-patch");
    let storage = Storage::open(StorageConfig::new(&dir, "doc")).unwrap();

    let first = obj(vec![("title", s("doc")), ("users", Value::new(Node::Array(vec![])))]);
    let c1 = storage.new_tx(1, None).new_patcher(first).commit().unwrap().commit;

    let second = obj(vec![("users", Value::new(Node::Array(vec![obj(vec![("id", s("joe"))])])))]);
    let c2 = storage.new_tx(1, None).new_patcher(second).commit().unwrap().commit;

    let title = storage.query(&field(&KPath::root(), "title"), c2, None).unwrap().unwrap();
    assert_eq!(title, s("doc"));

    let root = storage.query(&KPath::root(), c2, None).unwrap().unwrap();
    match root.node {
        Node::Object(fields) => {
            assert!(fields.iter().any(|(k, _)| k == "title"));
            assert!(fields.iter().any(|(k, _)| k == "users"));
        }
        other => panic!("expected object root, got {:?}", other),
    }

    let _ = c1;
    std::fs::remove_dir_all(&dir).ok();
}

/// A keyed array is addressed by key, never by position —
/// `users[0]`/`users[1]` are never produced as segments.
#[test]
fn test_keyed_array_round_trips_by_key() {
    let dir = temp_dir("keyed-array");
    let storage = Storage::open(StorageConfig::new(&dir, "doc")).unwrap();

    let users_path = field(&KPath::root(), "users");
    storage.register_keyed_array(users_path.clone(), "id");

    let joe = obj(vec![("id", s("joe")), ("role", s("admin"))]);
    let alice = obj(vec![("id", s("alice")), ("role", s("member"))]);
    let patch = obj(vec![("users", Value::new(Node::Array(vec![joe.clone(), alice.clone()])))]);

    let commit = storage.new_tx(1, None).new_patcher(patch).commit().unwrap().commit;

    let joe_path = users_path.push(Segment::Keyed(Some("joe".to_string())));
    let got_joe = storage.query(&joe_path, commit, None).unwrap().unwrap();
    assert_eq!(got_joe, joe);

    let users = storage.query(&users_path, commit, None).unwrap().unwrap();
    match users.node {
        Node::Array(items) => {
            assert_eq!(items.len(), 2);
            assert!(items.contains(&joe));
            assert!(items.contains(&alice));
        }
        other => panic!("expected array, got {:?}", other),
    }

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_scoped_patch_is_invisible_without_the_scope() {
    let dir = temp_dir("scoped-patch");
    let storage = Storage::open(StorageConfig::new(&dir, "doc")).unwrap();

    let baseline = obj(vec![("draft", s("no"))]);
    storage.new_tx(1, None).new_patcher(baseline).commit().unwrap();

    let overlay = obj(vec![("draft", s("yes"))]);
    let tx = storage.new_tx(1, Some("preview-1".to_string()));
    let commit = tx.new_patcher(overlay).commit().unwrap().commit;

    let draft_path = field(&KPath::root(), "draft");
    let baseline_view = storage.query(&draft_path, commit, None).unwrap().unwrap();
    assert_eq!(baseline_view, s("no"));

    let preview_view = storage.query(&draft_path, commit, Some("preview-1")).unwrap().unwrap();
    assert_eq!(preview_view, s("yes"));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_switch_and_snapshot_preserves_the_document_at_that_commit() {
    let dir = temp_dir("switch-snapshot");
    let storage = Storage::open(StorageConfig::new(&dir, "doc")).unwrap();

    storage.new_tx(1, None).new_patcher(obj(vec![("a", n(1))])).commit().unwrap();
    storage.new_tx(1, None).new_patcher(obj(vec![("b", n(2))])).commit().unwrap();

    let snap_commit = storage.switch_and_snapshot().unwrap();
    assert_eq!(snap_commit, 2);

    let root = storage.query(&KPath::root(), snap_commit, None).unwrap().unwrap();
    match root.node {
        Node::Object(fields) => {
            assert!(fields.iter().any(|(k, v)| k == "a" && *v == n(1)));
            assert!(fields.iter().any(|(k, v)| k == "b" && *v == n(2)));
        }
        other => panic!("expected object root, got {:?}", other),
    }

    std::fs::remove_dir_all(&dir).ok();
}

/// On startup, the index must rebuild correctly across a process restart,
/// including content written after the latest snapshot.
#[test]
fn test_reopen_rebuilds_index_across_snapshot_and_later_patches() {
    let dir = temp_dir("reopen-rebuild");
    {
        let storage = Storage::open(StorageConfig::new(&dir, "doc")).unwrap();
        storage.new_tx(1, None).new_patcher(obj(vec![("a", n(1))])).commit().unwrap();
        storage.switch_and_snapshot().unwrap();
        storage.new_tx(1, None).new_patcher(obj(vec![("b", n(2))])).commit().unwrap();
    }

    let reopened = Storage::open(StorageConfig::new(&dir, "doc")).unwrap();
    let commit = reopened.get_current_commit();
    assert_eq!(commit, 2);

    let root = reopened.query(&KPath::root(), commit, None).unwrap().unwrap();
    match root.node {
        Node::Object(fields) => {
            assert!(fields.iter().any(|(k, v)| k == "a" && *v == n(1)));
            assert!(fields.iter().any(|(k, v)| k == "b" && *v == n(2)));
        }
        other => panic!("expected object root, got {:?}", other),
    }

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_query_unknown_path_returns_none() {
    let dir = temp_dir("unknown-path");
    let storage = Storage::open(StorageConfig::new(&dir, "doc")).unwrap();
    storage.new_tx(1, None).new_patcher(obj(vec![("a", n(1))])).commit().unwrap();

    let missing = field(&KPath::root(), "nope");
    assert_eq!(storage.query(&missing, 1, None).unwrap(), None);

    std::fs::remove_dir_all(&dir).ok();
}

/// A 1-byte rotate threshold guarantees every commit below trips
/// `switch_and_snapshot`; the document must still read back correctly
/// across however many automatic rotations that produces.
#[test]
fn test_log_rotate_limit_triggers_automatic_snapshot() {
    let dir = temp_dir("auto-rotate");
    let mut config = StorageConfig::new(&dir, "doc");
    config.set_log_rotate_limit(1);
    let storage = Storage::open(config).unwrap();

    storage.new_tx(1, None).new_patcher(obj(vec![("a", n(1))])).commit().unwrap();
    let c2 = storage.new_tx(1, None).new_patcher(obj(vec![("b", n(2))])).commit().unwrap().commit;

    let root = storage.query(&KPath::root(), c2, None).unwrap().unwrap();
    match root.node {
        Node::Object(fields) => {
            assert!(fields.iter().any(|(k, v)| k == "a" && *v == n(1)));
            assert!(fields.iter().any(|(k, v)| k == "b" && *v == n(2)));
        }
        other => panic!("expected object root, got {:?}", other),
    }

    std::fs::remove_dir_all(&dir).ok();
}
