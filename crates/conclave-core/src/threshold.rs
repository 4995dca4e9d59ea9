//! Deterministic k-of-n threshold gate construction
//!
//! A k-of-n gate is the DNF enumeration of every size-k combination of the
//! member list: AND within a combination, OR across combinations, emitted in
//! lexicographic combination order. Two parties that hold the same member
//! snapshot therefore produce byte-identical formulas without coordinating.
//!
//! `C(n, k)` grows factorially, so construction is refused above
//! [`MAX_MEMBERS`] members. This is a stated scalability boundary of the
//! design, not a tunable.

use crate::errors::{EngineError, EngineResult};
use crate::expression::{Clause, Expression};
use crate::identity::Identity;
use std::collections::BTreeSet;

/// Hard bound on threshold gate membership.
pub const MAX_MEMBERS: usize = 20;

/// Build the k-of-n gate over `identities`.
///
/// Preconditions: `identities` sorted and deduplicated, `0 < k <= n`, and
/// `n <= MAX_MEMBERS`. `k == 1` degenerates to an OR of singletons; `k == n`
/// to a single AND clause.
pub fn build_k_of_n(identities: &[Identity], k: usize) -> EngineResult<Expression> {
    let n = identities.len();
    if n > MAX_MEMBERS {
        return Err(EngineError::ThresholdTooLarge {
            members: n,
            limit: MAX_MEMBERS,
        });
    }
    if k == 0 || k > n {
        return Err(EngineError::InvalidThreshold { k, n });
    }
    if !is_sorted_deduplicated(identities) {
        return Err(EngineError::invalid_expression(
            "threshold members must be sorted and deduplicated",
        ));
    }

    let clauses = combinations(n, k)
        .into_iter()
        .map(|combo| Clause::new(combo.into_iter().map(|i| identities[i].clone())));
    Ok(Expression::from_clauses(clauses))
}

/// Rebuild a gate after the member list changes.
///
/// The updated membership is computed from `old_members` plus `added` minus
/// `removed`, then the gate is rebuilt from scratch; the old formula is never
/// patched incrementally, which keeps the result a provably valid
/// k-of-(new n) gate.
pub fn rebuild_after_membership_change(
    old_members: &[Identity],
    added: &[Identity],
    removed: &[Identity],
    k: usize,
) -> EngineResult<Expression> {
    let mut members: BTreeSet<Identity> = old_members.iter().cloned().collect();
    members.extend(added.iter().cloned());
    for gone in removed {
        members.remove(gone);
    }
    let members: Vec<Identity> = members.into_iter().collect();
    build_k_of_n(&members, k)
}

/// Enumerate all size-k index combinations of `0..n` in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut combo: Vec<usize> = (0..k).collect();
    loop {
        out.push(combo.clone());
        // Advance to the next combination: bump the rightmost index that can
        // still move, then reset everything to its right.
        let mut i = k;
        loop {
            if i == 0 {
                return out;
            }
            i -= 1;
            if combo[i] != i + n - k {
                break;
            }
        }
        combo[i] += 1;
        for j in i + 1..k {
            combo[j] = combo[j - 1] + 1;
        }
    }
}

fn is_sorted_deduplicated(identities: &[Identity]) -> bool {
    identities.windows(2).all(|pair| pair[0] < pair[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn leaves(keys: &[&str]) -> Vec<Identity> {
        keys.iter().map(|k| Identity::leaf(*k)).collect()
    }

    fn signers(keys: &[&str]) -> BTreeSet<Identity> {
        keys.iter().map(|k| Identity::leaf(*k)).collect()
    }

    #[test]
    fn two_of_three_enumerates_all_pairs() {
        let expr = build_k_of_n(&leaves(&["aa", "bb", "cc"]), 2).expect("build");
        assert_eq!(
            expr.to_string(),
            "(ed25519:aa & ed25519:bb) | (ed25519:aa & ed25519:cc) | (ed25519:bb & ed25519:cc)"
        );
        assert!(expr.evaluate(&signers(&["aa", "bb"])));
        assert!(expr.evaluate(&signers(&["aa", "bb", "cc"])));
        assert!(!expr.evaluate(&signers(&["aa"])));
    }

    #[test]
    fn k_equals_one_is_any_of() {
        let expr = build_k_of_n(&leaves(&["aa", "bb"]), 1).expect("build");
        assert_eq!(expr, Expression::any_of(leaves(&["aa", "bb"])));
    }

    #[test]
    fn k_equals_n_is_all_of() {
        let expr = build_k_of_n(&leaves(&["aa", "bb", "cc"]), 3).expect("build");
        assert_eq!(expr, Expression::all_of(leaves(&["aa", "bb", "cc"])));
    }

    #[test]
    fn rejects_out_of_range_k() {
        let members = leaves(&["aa", "bb"]);
        assert_matches!(
            build_k_of_n(&members, 0),
            Err(EngineError::InvalidThreshold { k: 0, n: 2 })
        );
        assert_matches!(
            build_k_of_n(&members, 3),
            Err(EngineError::InvalidThreshold { k: 3, n: 2 })
        );
    }

    #[test]
    fn rejects_oversized_membership() {
        let members: Vec<Identity> = (0..21)
            .map(|i| Identity::leaf(format!("{i:02x}")))
            .collect();
        let mut sorted = members.clone();
        sorted.sort();
        assert_matches!(
            build_k_of_n(&sorted, 2),
            Err(EngineError::ThresholdTooLarge {
                members: 21,
                limit: MAX_MEMBERS
            })
        );
    }

    #[test]
    fn rejects_unsorted_or_duplicated_members() {
        assert_matches!(
            build_k_of_n(&leaves(&["bb", "aa"]), 1),
            Err(EngineError::InvalidExpression { .. })
        );
        assert_matches!(
            build_k_of_n(&leaves(&["aa", "aa"]), 1),
            Err(EngineError::InvalidExpression { .. })
        );
    }

    #[test]
    fn independent_builds_are_byte_identical() {
        let members = leaves(&["aa", "bb", "cc", "dd", "ee"]);
        let first = build_k_of_n(&members, 3).expect("build");
        let second = build_k_of_n(&members, 3).expect("build");
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn membership_change_rebuilds_from_scratch() {
        let old = leaves(&["aa", "bb", "cc"]);
        let rebuilt = rebuild_after_membership_change(
            &old,
            &leaves(&["dd"]),
            &leaves(&["aa"]),
            2,
        )
        .expect("rebuild");
        let direct = build_k_of_n(&leaves(&["bb", "cc", "dd"]), 2).expect("build");
        assert_eq!(rebuilt, direct);
    }

    #[test]
    fn combination_count_matches_binomial() {
        assert_eq!(combinations(5, 2).len(), 10);
        assert_eq!(combinations(6, 3).len(), 20);
        assert_eq!(combinations(4, 4).len(), 1);
    }
}
