//! Boolean authorization expressions in disjunctive normal form
//!
//! An [`Expression`] is an OR of AND-clauses over [`Identity`] atoms. The
//! textual mini-language is kept as surface syntax (`a & b | c`, with
//! optional parentheses around clauses), but the engine always works on the
//! structured form, so evaluation never re-parses strings.
//!
//! The empty expression evaluates to `false`: an absent or emptied rule
//! authorizes nobody (fail-closed).

use crate::errors::{EngineError, EngineResult};
use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Surface separator for OR (lower precedence).
const OR_SEPARATOR: char = '|';

/// Surface separator for AND (higher precedence).
const AND_SEPARATOR: char = '&';

/// One AND-clause: satisfied when every atom is present in the signer set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Clause {
    atoms: Vec<Identity>,
}

impl Clause {
    /// Build a clause from atoms, sorting and deduplicating them.
    pub fn new(atoms: impl IntoIterator<Item = Identity>) -> Self {
        let mut atoms: Vec<Identity> = atoms.into_iter().collect();
        atoms.sort();
        atoms.dedup();
        Self { atoms }
    }

    /// The sorted atoms of this clause.
    pub fn atoms(&self) -> &[Identity] {
        &self.atoms
    }

    /// True when every atom is present in `signers`.
    pub fn satisfied_by(&self, signers: &BTreeSet<Identity>) -> bool {
        !self.atoms.is_empty() && self.atoms.iter().all(|atom| signers.contains(atom))
    }
}

/// A boolean formula over identities, canonically an OR of AND-clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Expression {
    clauses: Vec<Clause>,
}

impl Expression {
    /// The empty expression; evaluates to `false` for every signer set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// An expression with a single one-atom clause.
    pub fn single(identity: Identity) -> Self {
        Self::from_clauses([Clause::new([identity])])
    }

    /// OR of singletons: satisfied by any one of the given identities.
    pub fn any_of(identities: impl IntoIterator<Item = Identity>) -> Self {
        Self::from_clauses(identities.into_iter().map(|id| Clause::new([id])))
    }

    /// A single AND-clause: satisfied only by all of the given identities.
    pub fn all_of(identities: impl IntoIterator<Item = Identity>) -> Self {
        Self::from_clauses([Clause::new(identities)])
    }

    /// Build from clauses, dropping duplicates while keeping first-seen order.
    pub fn from_clauses(clauses: impl IntoIterator<Item = Clause>) -> Self {
        let mut seen = BTreeSet::new();
        let clauses = clauses
            .into_iter()
            .filter(|clause| !clause.atoms.is_empty() && seen.insert(clause.clone()))
            .collect();
        Self { clauses }
    }

    /// Parse surface syntax: clauses joined by `|`, atoms by `&`.
    ///
    /// Whitespace around tokens is trimmed and parentheses around clauses or
    /// atoms are stripped. Unknown tokens and empty clauses are rejected.
    pub fn parse(text: &str) -> EngineResult<Self> {
        if text.trim().is_empty() {
            return Err(EngineError::invalid_expression("empty expression text"));
        }
        let mut clauses = Vec::new();
        for clause_text in text.split(OR_SEPARATOR) {
            let clause_text = strip_parens(clause_text);
            if clause_text.is_empty() {
                return Err(EngineError::invalid_expression(format!(
                    "empty clause in {text:?}"
                )));
            }
            let mut atoms = Vec::new();
            for token in clause_text.split(AND_SEPARATOR) {
                let token = strip_parens(token);
                if token.is_empty() {
                    return Err(EngineError::invalid_expression(format!(
                        "empty atom in clause {clause_text:?}"
                    )));
                }
                atoms.push(Identity::from_str(token)?);
            }
            clauses.push(Clause::new(atoms));
        }
        Ok(Self::from_clauses(clauses))
    }

    /// True iff at least one clause has every atom present in `signers`.
    ///
    /// Atoms are matched by exact set membership; delegation references are
    /// expected to have been resolved away before evaluation.
    pub fn evaluate(&self, signers: &BTreeSet<Identity>) -> bool {
        self.clauses.iter().any(|clause| clause.satisfied_by(signers))
    }

    /// The clauses of this expression.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Iterate over every atom across all clauses.
    pub fn atoms(&self) -> impl Iterator<Item = &Identity> {
        self.clauses.iter().flat_map(|clause| clause.atoms.iter())
    }

    /// The deduplicated set of atoms referenced anywhere in the expression.
    pub fn atom_set(&self) -> BTreeSet<Identity> {
        self.atoms().cloned().collect()
    }

    /// True when this expression has no clauses.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// True when every atom is a leaf signer key.
    pub fn is_leaf_only(&self) -> bool {
        self.atoms().all(Identity::is_leaf)
    }
}

/// Trim whitespace and any balanced outer parentheses.
fn strip_parens(token: &str) -> &str {
    let mut token = token.trim();
    while token.len() >= 2 && token.starts_with('(') && token.ends_with(')') {
        token = token[1..token.len() - 1].trim();
    }
    token
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parenthesize = self.clauses.len() > 1;
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, " {OR_SEPARATOR} ")?;
            }
            let wrap = parenthesize && clause.atoms.len() > 1;
            if wrap {
                f.write_str("(")?;
            }
            for (j, atom) in clause.atoms.iter().enumerate() {
                if j > 0 {
                    write!(f, " {AND_SEPARATOR} ")?;
                }
                write!(f, "{atom}")?;
            }
            if wrap {
                f.write_str(")")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Expression {
    type Err = EngineError;

    fn from_str(text: &str) -> EngineResult<Self> {
        Self::parse(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn leaf(key: &str) -> Identity {
        Identity::leaf(key)
    }

    fn signers(keys: &[&str]) -> BTreeSet<Identity> {
        keys.iter().map(|k| leaf(k)).collect()
    }

    #[test]
    fn or_has_lower_precedence_than_and() {
        let expr = Expression::parse("ed25519:aa & ed25519:bb | ed25519:cc").expect("parse");
        assert_eq!(expr.clauses().len(), 2);
        assert!(expr.evaluate(&signers(&["aa", "bb"])));
        assert!(expr.evaluate(&signers(&["cc"])));
        assert!(!expr.evaluate(&signers(&["aa"])));
    }

    #[test]
    fn parses_parenthesized_clauses() {
        let expr =
            Expression::parse("(ed25519:aa & ed25519:bb) | (ed25519:cc & ed25519:dd)")
                .expect("parse");
        assert_eq!(expr.clauses().len(), 2);
        assert!(expr.evaluate(&signers(&["cc", "dd"])));
    }

    #[test]
    fn rejects_unknown_tokens_and_empty_clauses() {
        assert_matches!(
            Expression::parse("ed25519:aa | bogus"),
            Err(EngineError::InvalidExpression { .. })
        );
        assert_matches!(
            Expression::parse("ed25519:aa | "),
            Err(EngineError::InvalidExpression { .. })
        );
        assert_matches!(
            Expression::parse("ed25519:aa & & ed25519:bb"),
            Err(EngineError::InvalidExpression { .. })
        );
        assert_matches!(
            Expression::parse("   "),
            Err(EngineError::InvalidExpression { .. })
        );
    }

    #[test]
    fn empty_expression_is_fail_closed() {
        let expr = Expression::empty();
        assert!(!expr.evaluate(&BTreeSet::new()));
        assert!(!expr.evaluate(&signers(&["aa", "bb"])));
    }

    #[test]
    fn superset_of_a_clause_satisfies_it() {
        let expr = Expression::all_of([leaf("aa"), leaf("bb")]);
        assert!(expr.evaluate(&signers(&["aa", "bb", "cc"])));
    }

    #[test]
    fn clause_atoms_are_sorted_and_deduplicated() {
        let clause = Clause::new([leaf("bb"), leaf("aa"), leaf("bb")]);
        assert_eq!(clause.atoms(), &[leaf("aa"), leaf("bb")]);
    }

    #[test]
    fn duplicate_clauses_collapse() {
        let expr = Expression::from_clauses([
            Clause::new([leaf("aa"), leaf("bb")]),
            Clause::new([leaf("bb"), leaf("aa")]),
        ]);
        assert_eq!(expr.clauses().len(), 1);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let expr = Expression::from_clauses([
            Clause::new([leaf("aa"), leaf("bb")]),
            Clause::new([leaf("cc")]),
        ]);
        let text = expr.to_string();
        assert_eq!(text, "(ed25519:aa & ed25519:bb) | ed25519:cc");
        assert_eq!(Expression::parse(&text).expect("reparse"), expr);
    }

    #[test]
    fn node_references_parse_but_do_not_match_leaves() {
        let expr = Expression::parse("node:admins").expect("parse");
        assert!(!expr.is_leaf_only());
        // A delegation reference only matches the exact same atom, never a
        // leaf key; resolution happens before evaluation.
        assert!(!expr.evaluate(&signers(&["aa"])));
    }
}
