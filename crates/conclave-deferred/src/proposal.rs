//! Proposal and instruction records
//!
//! Signature maps are grow-only: a record, once inserted for an
//! `(instruction, identity)` pair, is never replaced or removed. Merging two
//! copies of the same proposal is therefore commutative, associative and
//! idempotent, so concurrent writers converge regardless of call order.

use conclave_core::{Expression, Identity, NodeId, ProposalId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Validity window, in blocks, used when a caller does not pass one.
pub const DEFAULT_EXPIRY_BLOCKS: u64 = 50;

/// Input to `propose`: an instruction before its guard is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionDraft {
    /// Node whose rules gate this instruction.
    pub target_node: NodeId,
    /// Action the instruction performs on the target node.
    pub target_action: String,
    /// Opaque instruction payload.
    pub payload: Vec<u8>,
}

impl InstructionDraft {
    /// Create a draft instruction.
    pub fn new(
        target_node: impl Into<NodeId>,
        target_action: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            target_node: target_node.into(),
            target_action: target_action.into(),
            payload,
        }
    }
}

/// One step of a proposal, with its guard captured at creation time.
///
/// `required` is the leaf-resolved expression the coordinator computed from
/// the target node's rules when the proposal was created; later evolution of
/// the node does not affect an already-created proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Node whose rules gate this instruction.
    pub target_node: NodeId,
    /// Action the instruction performs on the target node.
    pub target_action: String,
    /// Opaque instruction payload.
    pub payload: Vec<u8>,
    /// Leaf-resolved authorization guard.
    pub required: Expression,
}

impl Instruction {
    /// The canonical digest co-signers sign for this instruction.
    ///
    /// Every field is length-prefixed so the encoding is unambiguous and
    /// reproducible across independently operated parties.
    pub fn digest(&self, proposal_id: &ProposalId, index: usize) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(proposal_id.0.as_bytes());
        hasher.update((index as u32).to_le_bytes());
        for field in [
            self.target_node.as_str().as_bytes(),
            self.target_action.as_bytes(),
            self.payload.as_slice(),
        ] {
            hasher.update((field.len() as u32).to_le_bytes());
            hasher.update(field);
        }
        hasher.finalize().into()
    }
}

/// A collected signature with its replay-protection sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// Raw signature bytes over the instruction digest.
    pub signature: Vec<u8>,
    /// Sequence number the signer submitted with this signature.
    pub sequence: u64,
}

/// Coarse proposal state derived from heights and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Open for signatures; quorum not yet met on every instruction.
    Proposed,
    /// Every instruction currently has quorum.
    Ready,
    /// All execution slots consumed (terminal success).
    Exhausted,
    /// Ledger height passed the expiry height (terminal, passive).
    Expired,
}

/// A pending deferred transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Unique identifier.
    pub id: ProposalId,
    /// Ordered instruction list; executed all-or-nothing.
    pub instructions: Vec<Instruction>,
    /// Ledger height at creation.
    pub created_at_height: u64,
    /// Height after which the proposal is inert.
    pub expire_at_height: u64,
    /// How many times the proposal may execute. Values above one re-arm the
    /// proposal after each execution; collected signatures deliberately
    /// persist across executions until this budget is consumed.
    pub max_executions: u32,
    /// Executions performed so far.
    pub executions_done: u32,
    /// Per-instruction collected signatures, keyed by signer identity.
    signatures: BTreeMap<u32, BTreeMap<Identity, SignatureRecord>>,
    /// Highest accepted sequence number per signer.
    sequences: BTreeMap<Identity, u64>,
}

impl Proposal {
    /// Create a fresh proposal with no collected signatures.
    pub fn new(
        id: ProposalId,
        instructions: Vec<Instruction>,
        created_at_height: u64,
        expire_at_height: u64,
        max_executions: u32,
    ) -> Self {
        Self {
            id,
            instructions,
            created_at_height,
            expire_at_height,
            max_executions,
            executions_done: 0,
            signatures: BTreeMap::new(),
            sequences: BTreeMap::new(),
        }
    }

    /// The identities with a collected signature for `index`.
    pub fn signers_for(&self, index: usize) -> BTreeSet<Identity> {
        self.signatures
            .get(&(index as u32))
            .map(|sigs| sigs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// The collected record for `(index, identity)`, if any.
    pub fn signature(&self, index: usize, identity: &Identity) -> Option<&SignatureRecord> {
        self.signatures.get(&(index as u32))?.get(identity)
    }

    /// The highest sequence number accepted from `identity`.
    pub fn last_sequence(&self, identity: &Identity) -> Option<u64> {
        self.sequences.get(identity).copied()
    }

    /// Record a signature; first write for an `(index, identity)` pair wins.
    ///
    /// Returns whether the record was newly inserted.
    pub fn record_signature(
        &mut self,
        index: usize,
        identity: Identity,
        record: SignatureRecord,
    ) -> bool {
        let sequence = record.sequence;
        let inserted = match self
            .signatures
            .entry(index as u32)
            .or_default()
            .entry(identity.clone())
        {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        };
        if inserted {
            let last = self.sequences.entry(identity).or_insert(0);
            *last = (*last).max(sequence);
        }
        inserted
    }

    /// Grow-only merge of another copy of this proposal.
    ///
    /// Signature maps union (first record wins per pair), sequence floors
    /// and the execution counter take the maximum. Never loses a previously
    /// collected signature, which rules out last-writer-wins behavior.
    pub fn merge_signatures(&mut self, other: &Proposal) {
        for (index, sigs) in &other.signatures {
            let ours = self.signatures.entry(*index).or_default();
            for (identity, record) in sigs {
                ours.entry(identity.clone()).or_insert_with(|| record.clone());
            }
        }
        for (identity, seq) in &other.sequences {
            let last = self.sequences.entry(identity.clone()).or_insert(0);
            *last = (*last).max(*seq);
        }
        self.executions_done = self.executions_done.max(other.executions_done);
    }

    /// Whether the proposal is past its expiry height.
    pub fn is_expired(&self, height: u64) -> bool {
        height > self.expire_at_height
    }

    /// Execution slots left.
    pub fn executions_remaining(&self) -> u32 {
        self.max_executions.saturating_sub(self.executions_done)
    }

    /// True iff every instruction's guard is satisfied by its collected
    /// signer identities.
    pub fn quorum_met(&self) -> bool {
        !self.instructions.is_empty()
            && self
                .instructions
                .iter()
                .enumerate()
                .all(|(index, instruction)| {
                    instruction.required.evaluate(&self.signers_for(index))
                })
    }

    /// Coarse status at the given ledger height.
    pub fn status(&self, height: u64) -> ProposalStatus {
        if self.executions_remaining() == 0 {
            ProposalStatus::Exhausted
        } else if self.is_expired(height) {
            ProposalStatus::Expired
        } else if self.quorum_met() {
            ProposalStatus::Ready
        } else {
            ProposalStatus::Proposed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::Expression;

    fn leaf(key: &str) -> Identity {
        Identity::leaf(key)
    }

    fn record(byte: u8, sequence: u64) -> SignatureRecord {
        SignatureRecord {
            signature: vec![byte; 64],
            sequence,
        }
    }

    fn proposal_with_guard(guard: Expression) -> Proposal {
        let instruction = Instruction {
            target_node: NodeId::new("n"),
            target_action: "invoke:update".into(),
            payload: b"{}".to_vec(),
            required: guard,
        };
        Proposal::new(ProposalId::new(), vec![instruction], 0, 50, 1)
    }

    #[test]
    fn recording_is_first_write_wins() {
        let mut p = proposal_with_guard(Expression::any_of([leaf("aa")]));
        assert!(p.record_signature(0, leaf("aa"), record(1, 1)));
        assert!(!p.record_signature(0, leaf("aa"), record(2, 2)));
        assert_eq!(p.signature(0, &leaf("aa")), Some(&record(1, 1)));
    }

    #[test]
    fn merge_is_commutative_and_idempotent() {
        let base = proposal_with_guard(Expression::all_of([leaf("aa"), leaf("bb")]));

        let mut with_alice = base.clone();
        with_alice.record_signature(0, leaf("aa"), record(1, 1));
        let mut with_bob = base.clone();
        with_bob.record_signature(0, leaf("bb"), record(2, 1));

        let mut ab = with_alice.clone();
        ab.merge_signatures(&with_bob);
        let mut ba = with_bob.clone();
        ba.merge_signatures(&with_alice);
        assert_eq!(ab, ba);

        let mut again = ab.clone();
        again.merge_signatures(&with_bob);
        assert_eq!(again, ab);

        assert_eq!(ab.signers_for(0), [leaf("aa"), leaf("bb")].into());
    }

    #[test]
    fn quorum_requires_every_instruction() {
        let guard = Expression::any_of([leaf("aa")]);
        let instruction = |action: &str| Instruction {
            target_node: NodeId::new("n"),
            target_action: action.into(),
            payload: vec![],
            required: guard.clone(),
        };
        let mut p = Proposal::new(
            ProposalId::new(),
            vec![instruction("one"), instruction("two")],
            0,
            50,
            1,
        );

        p.record_signature(0, leaf("aa"), record(1, 1));
        assert!(!p.quorum_met());
        p.record_signature(1, leaf("aa"), record(1, 2));
        assert!(p.quorum_met());
    }

    #[test]
    fn status_transitions() {
        let mut p = proposal_with_guard(Expression::any_of([leaf("aa")]));
        assert_eq!(p.status(0), ProposalStatus::Proposed);

        p.record_signature(0, leaf("aa"), record(1, 1));
        assert_eq!(p.status(0), ProposalStatus::Ready);
        assert_eq!(p.status(51), ProposalStatus::Expired);

        p.executions_done = 1;
        assert_eq!(p.status(0), ProposalStatus::Exhausted);
        // Terminal success is reported even past the expiry height.
        assert_eq!(p.status(51), ProposalStatus::Exhausted);
    }

    #[test]
    fn digests_differ_per_instruction_and_proposal() {
        let instruction = Instruction {
            target_node: NodeId::new("n"),
            target_action: "invoke:update".into(),
            payload: b"{}".to_vec(),
            required: Expression::empty(),
        };
        let a = ProposalId::new();
        let b = ProposalId::new();
        assert_ne!(instruction.digest(&a, 0), instruction.digest(&a, 1));
        assert_ne!(instruction.digest(&a, 0), instruction.digest(&b, 0));
        assert_eq!(instruction.digest(&a, 0), instruction.digest(&a, 0));
    }
}
