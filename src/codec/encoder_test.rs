use super::*;

#[test]
fn test_object_with_key_and_string_value() {
    let mut buf = vec![];
    let mut enc = Encoder::new(&mut buf);
    enc.begin_object().unwrap();
    enc.write_key("name").unwrap();
    enc.write_string("alice").unwrap();
    enc.end_object().unwrap();
    assert_eq!(String::from_utf8(buf).unwrap(), r#"{name:"alice"}"#);
}

#[test]
fn test_comma_between_fields() {
    let mut buf = vec![];
    let mut enc = Encoder::new(&mut buf);
    enc.begin_object().unwrap();
    enc.write_key("a").unwrap();
    enc.write_int(1).unwrap();
    enc.write_key("b").unwrap();
    enc.write_int(2).unwrap();
    enc.end_object().unwrap();
    assert_eq!(String::from_utf8(buf).unwrap(), "{a:1,b:2}");
}

#[test]
fn test_array_comma_insertion() {
    let mut buf = vec![];
    let mut enc = Encoder::new(&mut buf);
    enc.begin_array().unwrap();
    enc.write_int(1).unwrap();
    enc.write_int(2).unwrap();
    enc.write_int(3).unwrap();
    enc.end_array().unwrap();
    assert_eq!(String::from_utf8(buf).unwrap(), "[1,2,3]");
}

#[test]
fn test_tag_written_before_value() {
    let mut buf = vec![];
    let mut enc = Encoder::new(&mut buf);
    enc.tag("point", vec!["3".to_string()]).unwrap();
    enc.begin_object().unwrap();
    enc.end_object().unwrap();
    assert_eq!(String::from_utf8(buf).unwrap(), "!point(3){}");
}

#[test]
fn test_double_tag_before_consuming_value_is_an_error() {
    let mut buf = vec![];
    let mut enc = Encoder::new(&mut buf);
    enc.tag("a", vec![]).unwrap();
    assert!(enc.tag("b", vec![]).is_err());
}

#[test]
fn test_tag_compose_prefixes_outer_onto_inner() {
    let mut buf = vec![];
    let mut enc = Encoder::new(&mut buf);
    enc.tag("inner", vec!["1".to_string()]).unwrap();
    enc.tag_compose("outer", vec!["2".to_string()]).unwrap();
    enc.write_int(7).unwrap();
    assert_eq!(String::from_utf8(buf).unwrap(), "!outer.inner(2)7");
}

#[test]
fn test_sparse_array_int_key() {
    let mut buf = vec![];
    let mut enc = Encoder::new(&mut buf);
    enc.begin_object().unwrap();
    enc.write_int_key(5).unwrap();
    enc.write_string("five").unwrap();
    enc.end_object().unwrap();
    assert_eq!(String::from_utf8(buf).unwrap(), r#"{5:"five"}"#);
}

#[test]
fn test_offset_tracks_bytes_written() {
    let mut buf = vec![];
    let mut enc = Encoder::new(&mut buf);
    enc.write_null().unwrap();
    assert_eq!(enc.offset(), 4);
}

#[test]
fn test_reset_clears_state() {
    let mut buf = vec![];
    let mut enc = Encoder::new(&mut buf);
    enc.begin_object().unwrap();
    let mut buf2 = vec![];
    enc.reset(&mut buf2, EncoderOpts::default());
    enc.write_null().unwrap();
    assert_eq!(String::from_utf8(buf2).unwrap(), "null");
}
