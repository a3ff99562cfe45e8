//! Property-based tests for the value types and the scan cursor.
//!
//! Run more cases with: `PROPTEST_CASES=10000 cargo test --test properties`

use bytes::Bytes;
use keel::config::Config;
use keel::engine::Engine;
use keel::glob::glob_match;
use keel::reply::Reply;
use keel::scan;
use keel::types::bitmap::{self, BitOp};
use keel::types::geo::{self, GeoPoint, LAT_MAX, LAT_MIN};
use keel::types::sorted_set::RedisSortedSet;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

fn arb_member() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}"
}

fn arb_score() -> impl Strategy<Value = f64> {
    prop_oneof![(-1e6..1e6f64), Just(0.0), Just(1.5), Just(-1.5)]
}

fn arb_point() -> impl Strategy<Value = (f64, f64)> {
    (-180.0..=180.0f64, LAT_MIN..=LAT_MAX)
}

fn arb_bitmap() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..16)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Iteration order is (score, member) and the last write per member wins.
    #[test]
    fn prop_zset_ordering(entries in prop::collection::vec((arb_member(), arb_score()), 0..64)) {
        let mut zset = RedisSortedSet::new();
        let mut expected: HashMap<String, f64> = HashMap::new();
        for (member, score) in &entries {
            zset.insert(member.as_bytes(), *score);
            expected.insert(member.clone(), *score);
        }
        prop_assert_eq!(zset.len(), expected.len());

        let items: Vec<_> = zset.iter().collect();
        for pair in items.windows(2) {
            prop_assert!(pair[0] < pair[1], "entries out of order");
        }
        for (rank, item) in items.iter().enumerate() {
            let member = String::from_utf8(item.member.clone()).unwrap();
            prop_assert_eq!(expected[&member], item.score);
            prop_assert_eq!(zset.rank(&item.member), Some(rank));
            prop_assert_eq!(zset.rev_rank(&item.member), Some(items.len() - 1 - rank));
        }
    }

    /// Removing members keeps ranks dense and ordering intact.
    #[test]
    fn prop_zset_remove(
        entries in prop::collection::vec((arb_member(), arb_score()), 1..48),
        doomed in prop::collection::vec(arb_member(), 0..16),
    ) {
        let mut zset = RedisSortedSet::new();
        for (member, score) in &entries {
            zset.insert(member.as_bytes(), *score);
        }
        for member in &doomed {
            zset.remove(member.as_bytes());
        }
        for member in &doomed {
            prop_assert_eq!(zset.score(member.as_bytes()), None);
        }
        let ranks: Vec<_> = zset.iter().map(|e| zset.rank(&e.member)).collect();
        let dense: Vec<_> = (0..zset.len()).map(Some).collect();
        prop_assert_eq!(ranks, dense);
    }

    /// Every result bit is the operator applied to the source bits, with
    /// shorter sources reading as zero.
    #[test]
    fn prop_bitop_truth_table(a in arb_bitmap(), b in arb_bitmap()) {
        let sources = [a.clone(), b.clone()];
        let len = a.len().max(b.len());
        let ops: [(BitOp, fn(bool, bool) -> bool); 3] = [
            (BitOp::And, |x, y| x & y),
            (BitOp::Or, |x, y| x | y),
            (BitOp::Xor, |x, y| x ^ y),
        ];
        for (op, f) in ops {
            let out = bitmap::bitop(op, &sources);
            prop_assert_eq!(out.len(), len);
            for bit in 0..len * 8 {
                prop_assert_eq!(
                    bitmap::getbit(&out, bit),
                    f(bitmap::getbit(&a, bit), bitmap::getbit(&b, bit))
                );
            }
        }

        let not = bitmap::bitop(BitOp::Not, &sources);
        prop_assert_eq!(not.len(), a.len());
        for bit in 0..a.len() * 8 {
            prop_assert_eq!(bitmap::getbit(&not, bit), !bitmap::getbit(&a, bit));
        }
    }

    /// SETBIT then GETBIT agrees with a plain set of offsets, and BITCOUNT
    /// counts them.
    #[test]
    fn prop_setbit_model(offsets in prop::collection::vec(0usize..512, 0..64)) {
        let mut data = Vec::new();
        let mut model = HashSet::new();
        for &offset in &offsets {
            let was = bitmap::setbit(&mut data, offset, true);
            prop_assert_eq!(was, !model.insert(offset));
        }
        for bit in 0..512 {
            prop_assert_eq!(bitmap::getbit(&data, bit), model.contains(&bit));
        }
        prop_assert_eq!(
            bitmap::bitcount(&data, None, bitmap::RangeUnit::Byte),
            model.len() as u64
        );
    }

    /// A stored point decodes to within one cell of where it was put.
    #[test]
    fn prop_geo_encode_decode((lon, lat) in arb_point()) {
        let point = GeoPoint::new(lon, lat).unwrap();
        let back = geo::decode(geo::encode(point));
        prop_assert!((back.lon - lon).abs() < 1e-4, "lon {} -> {}", lon, back.lon);
        prop_assert!((back.lat - lat).abs() < 1e-4, "lat {} -> {}", lat, back.lat);
    }

    #[test]
    fn prop_geo_distance_symmetric(a in arb_point(), b in arb_point()) {
        let a = GeoPoint::new(a.0, a.1).unwrap();
        let b = GeoPoint::new(b.0, b.1).unwrap();
        let ab = geo::distance(a, b);
        let ba = geo::distance(b, a);
        prop_assert!(ab >= 0.0);
        prop_assert!((ab - ba).abs() < 1e-6);
        prop_assert!(geo::distance(a, a) < 1e-6);
        // Half the equator is the furthest two points can be.
        prop_assert!(ab <= std::f64::consts::PI * geo::EARTH_RADIUS_M + 1e-3);
    }

    /// Paging through any collection with any page size yields every
    /// element exactly once and terminates.
    #[test]
    fn prop_scan_completeness(
        names in prop::collection::hash_set("[a-z:]{1,12}", 0..200),
        count in 1usize..40,
    ) {
        let all: Vec<String> = names.iter().cloned().collect();
        let mut seen = Vec::new();
        let mut cursor = 0;
        for _ in 0..=all.len() {
            let (next, items) = scan::page(all.clone(), |s| s.as_bytes(), cursor, count);
            seen.extend(items);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        prop_assert_eq!(cursor, 0, "scan did not terminate");
        prop_assert_eq!(seen.len(), names.len());
        let unique: HashSet<String> = seen.into_iter().collect();
        prop_assert_eq!(unique, names);
    }

    #[test]
    fn prop_glob_literal_and_star(subject in "[a-zA-Z0-9:_]{0,24}") {
        prop_assert!(glob_match(subject.as_bytes(), subject.as_bytes()));
        prop_assert!(glob_match(b"*", subject.as_bytes()));
        let prefixed = format!("{subject}*");
        let tailed = format!("{subject}tail");
        prop_assert!(glob_match(prefixed.as_bytes(), tailed.as_bytes()));
    }

    /// HINCRBY through the engine matches a running sum per field.
    #[test]
    fn prop_hincrby_model(ops in prop::collection::vec((0usize..4, -1000i64..1000), 1..64)) {
        let engine = Engine::new(Config::default());
        let mut model = [0i64; 4];
        for (field, delta) in ops {
            model[field] += delta;
            let args = [
                Bytes::from_static(b"h"),
                Bytes::from(format!("f{field}")),
                Bytes::from(delta.to_string()),
            ];
            prop_assert_eq!(engine.execute("HINCRBY", &args), Reply::integer(model[field]));
        }
    }
}

/// A full SCAN over a large keyspace stays cheap per page and visits
/// every key exactly once.
#[test]
fn scan_covers_ten_thousand_keys() {
    let engine = Engine::new(Config::default());
    for i in 0..10_000 {
        let key = Bytes::from(format!("key:{i}"));
        engine.execute("SET", &[key, Bytes::from_static(b"v")]);
    }

    let mut seen = HashSet::new();
    let mut cursor = Bytes::from_static(b"0");
    let mut pages = 0;
    loop {
        let reply = engine.execute("SCAN", &[cursor, Bytes::from_static(b"COUNT"), Bytes::from_static(b"100")]);
        let Reply::Array(parts) = reply else { panic!("bad SCAN reply") };
        for key in parts[1].as_array().expect("page") {
            assert!(seen.insert(key.as_bytes().expect("key").to_vec()), "key returned twice");
        }
        let next = parts[0].as_bytes().expect("cursor").to_vec();
        pages += 1;
        if next == b"0" {
            break;
        }
        cursor = Bytes::from(next);
    }
    assert_eq!(seen.len(), 10_000);
    assert!(pages <= 101, "took {pages} pages");
}
