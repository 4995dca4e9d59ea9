//! Property tests for expression parsing and threshold gate construction.

use conclave_core::threshold::build_k_of_n;
use conclave_core::{Expression, Identity};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn leaf_key() -> impl Strategy<Value = String> {
    proptest::collection::vec(proptest::num::u8::ANY, 4)
        .prop_map(|bytes| hex::encode(bytes))
}

fn member_set(max: usize) -> impl Strategy<Value = Vec<Identity>> {
    proptest::collection::btree_set(leaf_key(), 1..=max)
        .prop_map(|keys| keys.into_iter().map(Identity::leaf).collect())
}

proptest! {
    #[test]
    fn display_parse_round_trip(members in member_set(6), k in 1usize..=3) {
        prop_assume!(k <= members.len());
        let expr = build_k_of_n(&members, k).expect("build");
        let reparsed = Expression::parse(&expr.to_string()).expect("reparse");
        prop_assert_eq!(reparsed, expr);
    }

    #[test]
    fn gate_is_satisfied_exactly_by_k_subsets(members in member_set(6), k in 1usize..=3) {
        prop_assume!(k <= members.len());
        let expr = build_k_of_n(&members, k).expect("build");

        // Any k-subset satisfies the gate; any (k-1)-subset does not.
        let some_k: BTreeSet<Identity> = members.iter().take(k).cloned().collect();
        prop_assert!(expr.evaluate(&some_k));

        let short: BTreeSet<Identity> = members.iter().take(k - 1).cloned().collect();
        prop_assert!(!expr.evaluate(&short));
    }

    #[test]
    fn independent_builds_agree(members in member_set(5), k in 1usize..=5) {
        prop_assume!(k <= members.len());
        let a = build_k_of_n(&members, k).expect("build");
        let b = build_k_of_n(&members, k).expect("build");
        prop_assert_eq!(a.to_string(), b.to_string());
    }
}
