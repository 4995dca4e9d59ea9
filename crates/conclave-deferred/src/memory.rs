//! In-memory collaborators
//!
//! [`MemoryLedger`] is the reference ledger implementation used by tests and
//! simulations. A single mutex over the whole state stands in for the real
//! ledger's global commit order: every write, and in particular
//! `apply_atomic`, runs under it, which gives the same mutual-exclusion
//! guarantee a consensus-backed store provides. Block production is driven
//! explicitly by the harness through [`MemoryLedger::advance_height`].

use crate::ledger::{Gossip, Ledger};
use crate::proposal::Proposal;
use conclave_core::{EngineError, EngineResult, Identity, NodeId, ProposalId};
use conclave_policy::{NodeStore, PolicyNode};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

/// One instruction as applied to the ledger, for test inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedInstruction {
    /// Proposal the instruction came from.
    pub proposal_id: ProposalId,
    /// Index within the proposal.
    pub index: usize,
    /// Node the instruction targeted.
    pub target_node: NodeId,
    /// Action performed.
    pub target_action: String,
    /// Instruction payload.
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    height: u64,
    nodes: HashMap<NodeId, PolicyNode>,
    proposals: HashMap<ProposalId, Proposal>,
    applied: Vec<AppliedInstruction>,
}

/// In-memory ledger with a single global commit order.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    /// Create an empty ledger at height 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the block height by `blocks`.
    pub fn advance_height(&self, blocks: u64) {
        self.state.lock().height += blocks;
    }

    /// Every instruction applied so far, in commit order.
    pub fn applied(&self) -> Vec<AppliedInstruction> {
        self.state.lock().applied.clone()
    }
}

impl NodeStore for MemoryLedger {
    fn node(&self, id: &NodeId) -> EngineResult<Option<PolicyNode>> {
        Ok(self.state.lock().nodes.get(id).cloned())
    }
}

impl Ledger for MemoryLedger {
    fn height(&self) -> EngineResult<u64> {
        Ok(self.state.lock().height)
    }

    fn put_node(&self, node: PolicyNode) -> EngineResult<()> {
        self.state.lock().nodes.insert(node.id.clone(), node);
        Ok(())
    }

    fn proposal(&self, id: &ProposalId) -> EngineResult<Option<Proposal>> {
        Ok(self.state.lock().proposals.get(id).cloned())
    }

    fn put_proposal(&self, proposal: Proposal) -> EngineResult<()> {
        let mut state = self.state.lock();
        match state.proposals.entry(proposal.id) {
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                slot.get_mut().merge_signatures(&proposal);
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(proposal);
            }
        }
        Ok(())
    }

    fn verify_signature(
        &self,
        identity: &Identity,
        digest: &[u8; 32],
        signature: &[u8],
    ) -> EngineResult<bool> {
        let Some(key_hex) = identity.leaf_key() else {
            return Ok(false);
        };
        let Ok(key_bytes) = hex::decode(key_hex) else {
            return Ok(false);
        };
        let key_bytes: [u8; 32] = match key_bytes.try_into() {
            Ok(bytes) => bytes,
            Err(_) => return Ok(false),
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            return Ok(false);
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return Ok(false);
        };
        Ok(verifying_key.verify(digest, &signature).is_ok())
    }

    fn apply_atomic(&self, id: &ProposalId) -> EngineResult<Option<u32>> {
        let mut state = self.state.lock();
        let height = state.height;
        let proposal = state.proposals.get(id).ok_or_else(|| {
            EngineError::ProposalNotFound {
                proposal_id: id.to_string(),
            }
        })?;
        if proposal.is_expired(height) {
            return Err(EngineError::ProposalExpired {
                expire_at_height: proposal.expire_at_height,
                height,
            });
        }
        if proposal.executions_remaining() == 0 {
            return Err(EngineError::ExhaustedExecutions {
                max_executions: proposal.max_executions,
            });
        }
        if !proposal.quorum_met() {
            return Ok(None);
        }

        let entries: Vec<AppliedInstruction> = proposal
            .instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| AppliedInstruction {
                proposal_id: *id,
                index,
                target_node: instruction.target_node.clone(),
                target_action: instruction.target_action.clone(),
                payload: instruction.payload.clone(),
            })
            .collect();
        state.applied.extend(entries);
        let proposal = state
            .proposals
            .get_mut(id)
            .ok_or_else(|| EngineError::storage("proposal vanished during commit"))?;
        proposal.executions_done += 1;
        Ok(Some(proposal.executions_done))
    }
}

/// Best-effort gossip over a fixed peer set.
///
/// Deliveries are recorded for inspection; peers marked unreachable are
/// skipped with a warning. Announcing fails only when no peer could be
/// reached at all.
#[derive(Debug, Default)]
pub struct StaticPeers {
    peers: Vec<String>,
    unreachable: Mutex<BTreeSet<String>>,
    delivered: Mutex<Vec<(String, ProposalId)>>,
}

impl StaticPeers {
    /// Create a fan-out over the given peer names.
    pub fn new(peers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            peers: peers.into_iter().map(Into::into).collect(),
            unreachable: Mutex::new(BTreeSet::new()),
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Simulate a peer going offline.
    pub fn mark_unreachable(&self, peer: &str) {
        self.unreachable.lock().insert(peer.to_string());
    }

    /// Announcements delivered so far, as `(peer, proposal)` pairs.
    pub fn delivered(&self) -> Vec<(String, ProposalId)> {
        self.delivered.lock().clone()
    }
}

impl Gossip for StaticPeers {
    fn announce(&self, proposal_id: &ProposalId) -> EngineResult<()> {
        if self.peers.is_empty() {
            return Ok(());
        }
        let unreachable = self.unreachable.lock();
        let mut reached = 0usize;
        for peer in &self.peers {
            if unreachable.contains(peer) {
                tracing::warn!(peer = %peer, proposal = %proposal_id, "peer unreachable");
                continue;
            }
            self.delivered.lock().push((peer.clone(), *proposal_id));
            reached += 1;
        }
        if reached == 0 {
            return Err(EngineError::storage("no gossip peer reachable"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::{Instruction, SignatureRecord};
    use assert_matches::assert_matches;
    use conclave_core::Expression;
    use ed25519_dalek::{Signer, SigningKey};

    fn keypair(seed: u8) -> (SigningKey, Identity) {
        let signing = SigningKey::from_bytes(&[seed; 32]);
        let identity = Identity::leaf(hex::encode(signing.verifying_key().to_bytes()));
        (signing, identity)
    }

    fn proposal_signed_by(identity: &Identity, signing: &SigningKey) -> Proposal {
        let instruction = Instruction {
            target_node: NodeId::new("n"),
            target_action: "invoke:update".into(),
            payload: b"{}".to_vec(),
            required: Expression::any_of([identity.clone()]),
        };
        let id = ProposalId::new();
        let digest = instruction.digest(&id, 0);
        let mut proposal = Proposal::new(id, vec![instruction], 0, 50, 2);
        proposal.record_signature(
            0,
            identity.clone(),
            SignatureRecord {
                signature: signing.sign(&digest).to_bytes().to_vec(),
                sequence: 1,
            },
        );
        proposal
    }

    #[test]
    fn verifies_real_signatures_and_rejects_noise() {
        let ledger = MemoryLedger::new();
        let (signing, identity) = keypair(7);
        let digest = [42u8; 32];
        let signature = signing.sign(&digest).to_bytes().to_vec();

        assert!(ledger.verify_signature(&identity, &digest, &signature).unwrap());
        assert!(!ledger
            .verify_signature(&identity, &[0u8; 32], &signature)
            .unwrap());
        assert!(!ledger
            .verify_signature(&identity, &digest, &[0u8; 64])
            .unwrap());
        assert!(!ledger
            .verify_signature(&Identity::node("n"), &digest, &signature)
            .unwrap());
    }

    #[test]
    fn put_proposal_merges_grow_only() {
        let ledger = MemoryLedger::new();
        let (signing, identity) = keypair(1);
        let base = proposal_signed_by(&identity, &signing);
        ledger.put_proposal(base.clone()).unwrap();

        // A stale copy without the signature must not erase it.
        let stale = Proposal::new(
            base.id,
            base.instructions.clone(),
            base.created_at_height,
            base.expire_at_height,
            base.max_executions,
        );
        ledger.put_proposal(stale).unwrap();

        let stored = ledger.proposal(&base.id).unwrap().unwrap();
        assert_eq!(stored.signers_for(0), [identity].into());
    }

    #[test]
    fn apply_atomic_consumes_slots_until_exhausted() {
        let ledger = MemoryLedger::new();
        let (signing, identity) = keypair(2);
        let proposal = proposal_signed_by(&identity, &signing);
        let id = proposal.id;
        ledger.put_proposal(proposal).unwrap();

        assert_eq!(ledger.apply_atomic(&id).unwrap(), Some(1));
        assert_eq!(ledger.apply_atomic(&id).unwrap(), Some(2));
        assert_matches!(
            ledger.apply_atomic(&id),
            Err(EngineError::ExhaustedExecutions { max_executions: 2 })
        );
        assert_eq!(ledger.applied().len(), 2);
    }

    #[test]
    fn apply_atomic_respects_expiry() {
        let ledger = MemoryLedger::new();
        let (signing, identity) = keypair(3);
        let proposal = proposal_signed_by(&identity, &signing);
        let id = proposal.id;
        ledger.put_proposal(proposal).unwrap();

        ledger.advance_height(51);
        assert_matches!(
            ledger.apply_atomic(&id),
            Err(EngineError::ProposalExpired { .. })
        );
        assert!(ledger.applied().is_empty());
    }

    #[test]
    fn gossip_records_deliveries_and_fails_only_when_isolated() {
        let peers = StaticPeers::new(["alpha", "beta"]);
        let id = ProposalId::new();
        peers.announce(&id).unwrap();
        assert_eq!(peers.delivered().len(), 2);

        peers.mark_unreachable("alpha");
        peers.announce(&id).unwrap();
        assert_eq!(peers.delivered().len(), 3);

        peers.mark_unreachable("beta");
        assert_matches!(peers.announce(&id), Err(EngineError::Storage { .. }));
    }
}
