//! The policy node: a versioned, immutable authorization unit

use conclave_core::threshold;
use conclave_core::{EngineResult, Expression, Identity, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known action names used by administrative hierarchies.
pub mod actions {
    /// Evolve a node to its next version.
    pub const EVOLVE: &str = "invoke:evolve";
    /// Spawn a subordinate node.
    pub const SPAWN_NODE: &str = "spawn:node";
    /// Spawn a deferred proposal anchored at this node.
    pub const SPAWN_DEFERRED: &str = "spawn:deferred";
    /// Attach a signature to a pending proposal.
    pub const ADD_PROOF: &str = "invoke:deferred.add_proof";
    /// Trigger execution of a pending proposal.
    pub const EXECUTE_DEFERRED: &str = "invoke:deferred.execute";
}

/// An authorization unit in the delegation hierarchy.
///
/// Nodes are immutable once stored: evolution produces a new value with the
/// same id and `version + 1` rather than mutating in place, so any
/// `(id, version)` pair names a stable snapshot that resolution results can
/// safely be memoized against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyNode {
    /// Stable identifier, kept across evolutions.
    pub id: NodeId,
    /// Version counter, bumped by [`PolicyNode::evolve`].
    pub version: u64,
    /// Human-readable description.
    pub description: String,
    /// Who may administer (evolve) this node.
    pub owner_expr: Expression,
    /// Default signing gate, used when an action has no dedicated rule.
    pub sign_expr: Expression,
    /// Action-gated rules.
    rules: BTreeMap<String, Expression>,
}

impl PolicyNode {
    /// Create version 0 of a node.
    pub fn new(
        id: impl Into<NodeId>,
        owner_expr: Expression,
        sign_expr: Expression,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            version: 0,
            description: description.into(),
            owner_expr,
            sign_expr,
            rules: BTreeMap::new(),
        }
    }

    /// Attach a rule for an action, builder-style.
    pub fn with_rule(mut self, action: impl Into<String>, expr: Expression) -> Self {
        self.rules.insert(action.into(), expr);
        self
    }

    /// The rule for `action`, if one is defined.
    pub fn rule(&self, action: &str) -> Option<&Expression> {
        self.rules.get(action)
    }

    /// All action-gated rules.
    pub fn rules(&self) -> &BTreeMap<String, Expression> {
        &self.rules
    }

    /// Produce the next version of this node.
    ///
    /// The returned node starts as a copy; callers adjust expressions or
    /// rules on it before storing. The receiver is left untouched.
    pub fn evolve(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next
    }

    /// Evolve this node for a changed member list.
    ///
    /// Rebuilds the standard administrative gates from scratch: the evolve
    /// rule requires all members, the sign expression accepts any one member.
    /// `members` must be sorted and deduplicated.
    pub fn evolve_membership(&self, members: &[Identity]) -> EngineResult<Self> {
        let all = threshold::build_k_of_n(members, members.len())?;
        let any = threshold::build_k_of_n(members, 1)?;
        let mut next = self.evolve();
        next.sign_expr = any;
        next.rules.insert(actions::EVOLVE.to_string(), all);
        Ok(next)
    }
}
