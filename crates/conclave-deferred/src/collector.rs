//! Signature accumulation
//!
//! Validation order is fixed: proposal state, index range, signer
//! eligibility, then cryptographic verification. Eligibility is checked
//! before the signature so a cryptographically valid but out-of-scope signer
//! is rejected without touching state (`SignerNotEligible`), which keeps
//! griefing noise out of the collected sets.

use crate::ledger::Ledger;
use crate::proposal::SignatureRecord;
use conclave_core::{EngineError, EngineResult, Identity, ProposalId};
use std::sync::Arc;

/// Accumulates per-instruction signatures on pending proposals.
pub struct SignatureCollector<L: Ledger> {
    ledger: Arc<L>,
}

impl<L: Ledger> SignatureCollector<L> {
    /// Create a collector over the given ledger.
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Attach a signature to one instruction of a pending proposal.
    ///
    /// `sequence` is the signer's replay-protection counter: it must be
    /// strictly greater than the last value accepted from this identity on
    /// this proposal. Re-submitting an identical, already-collected
    /// signature is a no-op success, so client retries are always safe.
    pub fn add_signature(
        &self,
        proposal_id: &ProposalId,
        index: usize,
        identity: &Identity,
        signature: Vec<u8>,
        sequence: u64,
    ) -> EngineResult<()> {
        let mut proposal = self.ledger.proposal(proposal_id)?.ok_or_else(|| {
            EngineError::ProposalNotFound {
                proposal_id: proposal_id.to_string(),
            }
        })?;

        let height = self.ledger.height()?;
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

        let len = proposal.instructions.len();
        let instruction = proposal
            .instructions
            .get(index)
            .ok_or(EngineError::IndexOutOfRange { index, len })?;

        if !instruction.required.atom_set().contains(identity) {
            return Err(EngineError::SignerNotEligible {
                identity: identity.to_string(),
            });
        }

        // Idempotent replay of an already-collected signature.
        if let Some(existing) = proposal.signature(index, identity) {
            if existing.signature == signature {
                return Ok(());
            }
        }

        if let Some(last) = proposal.last_sequence(identity) {
            if sequence <= last {
                return Err(EngineError::StaleSequence {
                    identity: identity.to_string(),
                    got: sequence,
                    last,
                });
            }
        }

        let digest = instruction.digest(proposal_id, index);
        if !self.ledger.verify_signature(identity, &digest, &signature)? {
            return Err(EngineError::InvalidSignature {
                identity: identity.to_string(),
            });
        }

        proposal.record_signature(
            index,
            identity.clone(),
            SignatureRecord {
                signature,
                sequence,
            },
        );
        tracing::debug!(proposal = %proposal_id, index, signer = %identity, "signature collected");
        self.ledger.put_proposal(proposal)
    }
}
