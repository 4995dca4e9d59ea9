//! Read access to stored policy nodes
//!
//! The resolver only needs to look nodes up by id; the full ledger trait
//! lives with the deferred-transaction crate and extends this one.

use crate::node::PolicyNode;
use conclave_core::{EngineResult, NodeId};

/// Read-only access to the policy node records of a store.
pub trait NodeStore {
    /// Fetch the current snapshot of a node, if it exists.
    fn node(&self, id: &NodeId) -> EngineResult<Option<PolicyNode>>;
}

impl<S: NodeStore + ?Sized> NodeStore for &S {
    fn node(&self, id: &NodeId) -> EngineResult<Option<PolicyNode>> {
        (**self).node(id)
    }
}
