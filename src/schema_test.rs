use super::*;
use crate::path::Segment;

#[test]
fn test_register_and_lookup_key_field() {
    let mut schema = Schema::new();
    let users_path = KPath::from_segments(vec![Segment::Field("users".to_string())]);
    schema.register_keyed_array(users_path.clone(), "id");
    assert_eq!(schema.key_field_for(&users_path), Some("id"));
    assert_eq!(schema.key_field_for(&KPath::root()), None);
}
