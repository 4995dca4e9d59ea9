//! Quorum checking and atomic execution
//!
//! Execution is all-or-nothing across the whole proposal: quorum on a
//! subset of instructions never triggers partial application. Quorum
//! shortfall is a normal outcome, not a fault — the proposal and its
//! collected signatures are left untouched for future signing.

use crate::ledger::Ledger;
use crate::proposal::Proposal;
use conclave_core::{EngineError, EngineResult, ProposalId};
use std::sync::Arc;

/// Outcome of an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// All instructions were applied atomically.
    Applied {
        /// Executions performed so far, including this one.
        executions_done: u32,
        /// Whether the execution budget is now consumed.
        terminal: bool,
    },
    /// At least one instruction lacks quorum; nothing was applied.
    QuorumNotMet,
}

/// Evaluates readiness and drives atomic execution.
pub struct Executor<L: Ledger> {
    ledger: Arc<L>,
}

impl<L: Ledger> Executor<L> {
    /// Create an executor over the given ledger.
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// True iff every instruction's guard is satisfied by its collected
    /// signatures. Fails with `ProposalExpired` past the expiry height.
    pub fn is_ready(&self, proposal_id: &ProposalId) -> EngineResult<bool> {
        let proposal = self.fetch_live(proposal_id)?;
        Ok(proposal.quorum_met())
    }

    /// Execute the proposal if every instruction has quorum.
    ///
    /// On success the ledger applies all instructions as one atomic unit
    /// and the execution counter advances; with executions left the
    /// proposal stays armed and may execute again later. `QuorumNotMet`
    /// leaves all prior progress intact.
    pub fn execute(&self, proposal_id: &ProposalId) -> EngineResult<ExecutionOutcome> {
        let proposal = self.fetch_live(proposal_id)?;
        if proposal.executions_remaining() == 0 {
            return Err(EngineError::ExhaustedExecutions {
                max_executions: proposal.max_executions,
            });
        }
        if !proposal.quorum_met() {
            return Ok(ExecutionOutcome::QuorumNotMet);
        }

        // The ledger re-validates inside its commit order; a concurrent
        // execution that won the race surfaces there, never as a double
        // consumption of the same slot.
        match self.ledger.apply_atomic(proposal_id)? {
            Some(executions_done) => {
                let terminal = executions_done >= proposal.max_executions;
                tracing::debug!(
                    proposal = %proposal_id,
                    executions_done,
                    terminal,
                    "proposal executed"
                );
                Ok(ExecutionOutcome::Applied {
                    executions_done,
                    terminal,
                })
            }
            None => Ok(ExecutionOutcome::QuorumNotMet),
        }
    }

    /// Fetch a proposal, failing on unknown ids and past-expiry heights.
    fn fetch_live(&self, proposal_id: &ProposalId) -> EngineResult<Proposal> {
        let proposal = self.ledger.proposal(proposal_id)?.ok_or_else(|| {
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
        Ok(proposal)
    }
}
