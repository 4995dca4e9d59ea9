//! Proposal creation
//!
//! `propose` captures, for every instruction, the leaf-resolved guard the
//! target node requires at this moment. Any resolution failure aborts the
//! whole call, so a proposal is never stored partially initialized. The
//! gossip announcement that follows the durable write is an availability
//! convenience only; its failure is logged and swallowed.

use crate::ledger::{Gossip, Ledger};
use crate::proposal::{Instruction, InstructionDraft, Proposal, DEFAULT_EXPIRY_BLOCKS};
use conclave_core::{EngineError, EngineResult, ProposalId};
use conclave_policy::SignerResolver;
use std::sync::Arc;

/// Creates deferred proposals bound to policy nodes.
pub struct ProposalCoordinator<L: Ledger, G: Gossip> {
    ledger: Arc<L>,
    gossip: Arc<G>,
    resolver: Arc<SignerResolver>,
}

impl<L: Ledger, G: Gossip> ProposalCoordinator<L, G> {
    /// Create a coordinator with a fresh resolver cache.
    pub fn new(ledger: Arc<L>, gossip: Arc<G>) -> Self {
        Self::with_resolver(ledger, gossip, Arc::new(SignerResolver::new()))
    }

    /// Create a coordinator sharing an existing resolver cache.
    pub fn with_resolver(
        ledger: Arc<L>,
        gossip: Arc<G>,
        resolver: Arc<SignerResolver>,
    ) -> Self {
        Self {
            ledger,
            gossip,
            resolver,
        }
    }

    /// Create and durably record a proposal.
    ///
    /// Each draft's guard comes from its target node's rule for the drafted
    /// action (falling back to the node's sign expression) and is resolved
    /// to leaf-only form before the proposal is stored. `expire_after_blocks`
    /// defaults to [`DEFAULT_EXPIRY_BLOCKS`].
    pub fn propose(
        &self,
        drafts: Vec<InstructionDraft>,
        expire_after_blocks: Option<u64>,
        max_executions: u32,
    ) -> EngineResult<ProposalId> {
        if drafts.is_empty() {
            return Err(EngineError::invalid_proposal("no instructions"));
        }
        if max_executions == 0 {
            return Err(EngineError::invalid_proposal(
                "max_executions must be at least 1",
            ));
        }

        let mut instructions = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let node = self.ledger.node(&draft.target_node)?.ok_or_else(|| {
                EngineError::NodeNotFound {
                    node_id: draft.target_node.to_string(),
                }
            })?;
            let required = self
                .resolver
                .required_signers(&node, &draft.target_action)?
                .clone();
            let required = self.resolver.resolve_expression(&required, &*self.ledger)?;
            instructions.push(Instruction {
                target_node: draft.target_node,
                target_action: draft.target_action,
                payload: draft.payload,
                required,
            });
        }

        let created_at_height = self.ledger.height()?;
        let expire_at_height =
            created_at_height.saturating_add(expire_after_blocks.unwrap_or(DEFAULT_EXPIRY_BLOCKS));
        let id = ProposalId::new();
        let proposal = Proposal::new(
            id,
            instructions,
            created_at_height,
            expire_at_height,
            max_executions,
        );
        self.ledger.put_proposal(proposal)?;
        tracing::debug!(proposal = %id, expire_at_height, max_executions, "proposal recorded");

        // The proposal is already durable; peer discovery is best effort.
        if let Err(err) = self.gossip.announce(&id) {
            tracing::warn!(proposal = %id, error = %err, "proposal announcement failed");
        }
        Ok(id)
    }
}
