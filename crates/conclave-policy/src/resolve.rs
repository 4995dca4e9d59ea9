//! Recursive signer resolution over the delegation hierarchy
//!
//! Resolution walks `node:` references down to leaf signer keys, tracking
//! the current path so a revisited node fails with `CyclicDelegation`
//! instead of looping. Results are sorted lexicographically, so independent
//! resolutions of the same snapshot are byte-identical.
//!
//! Leaf sets are memoized per `(id, version)`; node snapshots are immutable
//! once stored, which makes the cache sound for the resolved node itself.
//! Delegation references are followed by id, so a cached result reflects the
//! delegate snapshots seen at first resolution: if a referenced node evolves
//! afterwards, the cached parent entry does not pick the change up. Callers
//! that need current membership should resolve the evolved node directly or
//! use a fresh resolver.

use crate::node::PolicyNode;
use crate::store::NodeStore;
use conclave_core::{Clause, EngineError, EngineResult, Expression, Identity, NodeId};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// Flattens delegation hierarchies into leaf signer identities.
#[derive(Debug, Default)]
pub struct SignerResolver {
    leaf_cache: RwLock<HashMap<(NodeId, u64), Vec<Identity>>>,
}

impl SignerResolver {
    /// Create a resolver with an empty memoization cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the leaf identities that can satisfy `node.sign_expr`,
    /// sorted lexicographically and deduplicated.
    pub fn resolve_leaves(
        &self,
        node: &PolicyNode,
        store: &dyn NodeStore,
    ) -> EngineResult<Vec<Identity>> {
        let key = (node.id.clone(), node.version);
        if let Some(hit) = self.leaf_cache.read().get(&key) {
            return Ok(hit.clone());
        }

        let mut path = vec![node.id.clone()];
        let mut leaves = BTreeSet::new();
        collect_leaves(&node.sign_expr, store, &mut path, &mut leaves)?;
        let leaves: Vec<Identity> = leaves.into_iter().collect();

        tracing::debug!(
            node = %node.id,
            version = node.version,
            count = leaves.len(),
            "resolved leaf signers"
        );
        self.leaf_cache.write().insert(key, leaves.clone());
        Ok(leaves)
    }

    /// The expression required to authorize `action` on `node`.
    ///
    /// Returns the action's rule if defined, falling back to the node's sign
    /// expression; fails with `NoRuleDefined` when neither exists.
    pub fn required_signers<'a>(
        &self,
        node: &'a PolicyNode,
        action: &str,
    ) -> EngineResult<&'a Expression> {
        if let Some(rule) = node.rule(action) {
            return Ok(rule);
        }
        if !node.sign_expr.is_empty() {
            return Ok(&node.sign_expr);
        }
        Err(EngineError::NoRuleDefined {
            action: action.to_string(),
        })
    }

    /// Rewrite an expression to leaf-only DNF.
    ///
    /// Every `node:` atom is substituted by the referenced node's resolved
    /// sign expression, distributing over the containing clause so the
    /// result stays in DNF. Clauses are emitted in sorted order, making the
    /// rewrite deterministic across parties.
    pub fn resolve_expression(
        &self,
        expr: &Expression,
        store: &dyn NodeStore,
    ) -> EngineResult<Expression> {
        let mut path = Vec::new();
        let clauses = resolve_to_clauses(expr, store, &mut path)?;
        Ok(Expression::from_clauses(
            clauses.into_iter().map(Clause::new),
        ))
    }
}

/// Accumulate the leaf atoms reachable from `expr` into `leaves`.
fn collect_leaves(
    expr: &Expression,
    store: &dyn NodeStore,
    path: &mut Vec<NodeId>,
    leaves: &mut BTreeSet<Identity>,
) -> EngineResult<()> {
    for atom in expr.atoms() {
        match atom {
            Identity::Leaf(_) => {
                leaves.insert(atom.clone());
            }
            Identity::Node(id) => {
                let referenced = fetch_on_path(id, store, path)?;
                path.push(id.clone());
                collect_leaves(&referenced.sign_expr, store, path, leaves)?;
                path.pop();
            }
        }
    }
    Ok(())
}

/// Rewrite `expr` into a sorted set of leaf-only clauses.
fn resolve_to_clauses(
    expr: &Expression,
    store: &dyn NodeStore,
    path: &mut Vec<NodeId>,
) -> EngineResult<BTreeSet<BTreeSet<Identity>>> {
    let mut resolved = BTreeSet::new();
    for clause in expr.clauses() {
        // Distribute each atom's DNF over the clause: a leaf extends every
        // partial clause, a node reference multiplies them by its own
        // resolved clauses.
        let mut partials: Vec<BTreeSet<Identity>> = vec![BTreeSet::new()];
        for atom in clause.atoms() {
            match atom {
                Identity::Leaf(_) => {
                    for partial in &mut partials {
                        partial.insert(atom.clone());
                    }
                }
                Identity::Node(id) => {
                    let referenced = fetch_on_path(id, store, path)?;
                    path.push(id.clone());
                    let sub = resolve_to_clauses(&referenced.sign_expr, store, path)?;
                    path.pop();

                    let mut expanded = Vec::with_capacity(partials.len() * sub.len());
                    for partial in &partials {
                        for sub_clause in &sub {
                            let mut merged = partial.clone();
                            merged.extend(sub_clause.iter().cloned());
                            expanded.push(merged);
                        }
                    }
                    // An empty sub-expression authorizes nobody, so the
                    // whole clause collapses (fail-closed).
                    partials = expanded;
                }
            }
        }
        resolved.extend(partials.into_iter().filter(|clause| !clause.is_empty()));
    }
    Ok(resolved)
}

fn fetch_on_path(
    id: &NodeId,
    store: &dyn NodeStore,
    path: &[NodeId],
) -> EngineResult<PolicyNode> {
    if path.contains(id) {
        return Err(EngineError::CyclicDelegation {
            node_id: id.to_string(),
        });
    }
    store.node(id)?.ok_or_else(|| EngineError::NodeNotFound {
        node_id: id.to_string(),
    })
}
