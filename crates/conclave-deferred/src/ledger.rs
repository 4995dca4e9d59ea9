//! Collaborator interfaces: the ledger and the gossip fan-out
//!
//! The ledger is an append-only, globally ordered, BFT store. This crate
//! never implements consensus; it issues reads and writes and relies on two
//! guarantees: writes land in a single global commit order, and
//! [`Ledger::apply_atomic`] applies a proposal's instructions as one
//! all-or-nothing unit. That commit order is also what makes concurrent
//! `execute` calls on one proposal mutually exclusive.

use crate::proposal::Proposal;
use conclave_core::{EngineResult, Identity, ProposalId};
use conclave_policy::{NodeStore, PolicyNode};

/// Durable, ordered storage plus signature verification.
pub trait Ledger: NodeStore {
    /// Current ledger height, a monotonically increasing block counter.
    fn height(&self) -> EngineResult<u64>;

    /// Durably store a policy node snapshot.
    fn put_node(&self, node: PolicyNode) -> EngineResult<()>;

    /// Fetch a proposal by id.
    fn proposal(&self, id: &ProposalId) -> EngineResult<Option<Proposal>>;

    /// Durably store a proposal.
    ///
    /// Writes for an existing id must merge grow-only with the stored copy
    /// (see [`Proposal::merge_signatures`]); a plain overwrite could lose
    /// signatures collected by a concurrent writer.
    fn put_proposal(&self, proposal: Proposal) -> EngineResult<()>;

    /// Verify `signature` over `digest` under the leaf identity's key.
    ///
    /// Malformed identities or signature bytes verify as `false`; `Err` is
    /// reserved for collaborator failures.
    fn verify_signature(
        &self,
        identity: &Identity,
        digest: &[u8; 32],
        signature: &[u8],
    ) -> EngineResult<bool>;

    /// Apply a proposal's instructions as one atomic unit.
    ///
    /// Runs entirely inside the ledger's commit order: the stored proposal
    /// is re-read and re-validated there, so two racing calls can never
    /// consume the same execution slot. Returns the new execution count, or
    /// `None` when quorum was not met at commit time (a normal outcome, not
    /// a fault). Expired or exhausted proposals fail with the matching
    /// state error.
    fn apply_atomic(&self, id: &ProposalId) -> EngineResult<Option<u32>>;
}

/// Best-effort discovery broadcast for newly created proposal ids.
///
/// Failures here never affect correctness: the proposal is already durable
/// when an announcement goes out, and co-signers can always fall back to
/// reading the ledger.
pub trait Gossip {
    /// Announce a new proposal id to the peer set.
    fn announce(&self, proposal_id: &ProposalId) -> EngineResult<()>;
}
