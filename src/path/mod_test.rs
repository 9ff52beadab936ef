use arbitrary::Unstructured;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use super::*;
use std::str::FromStr;

fn arbitrary_segment(rng: &mut SmallRng) -> Segment {
    let bytes = rng.gen::<[u8; 32]>();
    Unstructured::new(&bytes).arbitrary().unwrap()
}

fn segment_kind_rank(seg: &Segment) -> u8 {
    match seg {
        Segment::Field(_) => 0,
        Segment::Dense(_) => 1,
        Segment::Sparse(_) => 2,
        Segment::Keyed(_) => 3,
    }
}

#[test]
fn test_segment_ordering() {
    let mut segs = vec![
        Segment::Keyed(Some("b".to_string())),
        Segment::Dense(5),
        Segment::Field("z".to_string()),
        Segment::Sparse(2),
        Segment::Field("a".to_string()),
        Segment::Dense(1),
    ];
    segs.sort();
    assert_eq!(
        segs,
        vec![
            Segment::Field("a".to_string()),
            Segment::Field("z".to_string()),
            Segment::Dense(1),
            Segment::Dense(5),
            Segment::Sparse(2),
            Segment::Keyed(Some("b".to_string())),
        ]
    );
}

#[test]
fn test_display_and_parse_roundtrip() {
    let path = KPath::from_segments(vec![
        Segment::Field("users".to_string()),
        Segment::Keyed(Some("joe".to_string())),
        Segment::Field("name".to_string()),
    ]);
    assert_eq!(path.to_string(), "users(joe).name");
    assert_eq!(KPath::from_str("users(joe).name").unwrap(), path);
}

#[test]
fn test_field_quoting() {
    let path = KPath::from_segments(vec![Segment::Field("needs quoting".to_string())]);
    assert_eq!(path.to_string(), "\"needs quoting\"");
    assert_eq!(KPath::from_str("\"needs quoting\"").unwrap(), path);
}

#[test]
fn test_empty_path_is_root() {
    assert_eq!(KPath::root().to_string(), "");
    assert!(KPath::root().is_root());
}

#[test]
fn test_is_ancestor_of() {
    let root = KPath::root();
    let a = KPath::from_segments(vec![Segment::Field("a".to_string())]);
    let ab = a.push(Segment::Field("b".to_string()));
    assert!(root.is_ancestor_of(&a));
    assert!(a.is_ancestor_of(&ab));
    assert!(!ab.is_ancestor_of(&a));
}

#[test]
fn test_dense_and_sparse_and_keyed_display() {
    assert_eq!(Segment::Dense(3).to_string(), "[3]");
    assert_eq!(Segment::Sparse(7).to_string(), "{7}");
    assert_eq!(Segment::Keyed(None).to_string(), "()");
}

#[test]
fn test_arbitrary_segments_sort_by_kind_before_value() {
    let seed: u64 = rand::random();
    println!("test_arbitrary_segments_sort_by_kind_before_value seed {}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    for _ in 0..200 {
        let mut segs: Vec<Segment> = (0..16).map(|_| arbitrary_segment(&mut rng)).collect();
        segs.sort();

        let ranks: Vec<u8> = segs.iter().map(segment_kind_rank).collect();
        let mut sorted_ranks = ranks.clone();
        sorted_ranks.sort_unstable();
        assert_eq!(ranks, sorted_ranks, "segments of a lower kind_rank must sort first");

        for pair in segs.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }
}

#[test]
fn test_arbitrary_kpath_ordering_is_a_total_order() {
    let seed: u64 = rand::random();
    println!("test_arbitrary_kpath_ordering_is_a_total_order seed {}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    for _ in 0..200 {
        let depth = rng.gen_range(0..5);
        let a = KPath::from_segments((0..depth).map(|_| arbitrary_segment(&mut rng)).collect());
        let depth = rng.gen_range(0..5);
        let b = KPath::from_segments((0..depth).map(|_| arbitrary_segment(&mut rng)).collect());

        // Exactly one of the three trichotomy relations holds.
        let (lt, eq, gt) = (a < b, a == b, a > b);
        assert_eq!([lt, eq, gt].iter().filter(|x| **x).count(), 1);

        // Comparing in the opposite order flips the relation consistently.
        assert_eq!(a.cmp(&b).reverse(), b.cmp(&a));
    }
}
