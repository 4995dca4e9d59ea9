//! Unified error type for the Conclave engine
//!
//! A single enum covers every failure the engine can surface, with a
//! [`ErrorKind`] classification that encodes retry semantics: validation
//! errors are caller bugs, authorization errors are safe to retry with
//! corrected input, and state errors are terminal for the affected record.
//!
//! Quorum shortfall is deliberately *not* an error: `execute` reports it as
//! a normal outcome value so that it is never logged or retried as a fault.

use serde::{Deserialize, Serialize};

/// Retry classification for [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input; never auto-retried.
    Validation,
    /// No side effect occurred; safe to retry with corrected input.
    Authorization,
    /// Terminal for the affected proposal or node; not retryable.
    State,
    /// Infrastructure failure in a collaborator.
    Storage,
}

/// Unified error type for all engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum EngineError {
    /// Expression text could not be parsed into DNF.
    #[error("invalid expression: {message}")]
    InvalidExpression {
        /// What was wrong with the expression text.
        message: String,
    },

    /// A proposal request was malformed before any resolution happened.
    #[error("invalid proposal: {message}")]
    InvalidProposal {
        /// What was wrong with the request.
        message: String,
    },

    /// Threshold gate construction over too many members.
    #[error("threshold over {members} members exceeds the {limit}-member bound")]
    ThresholdTooLarge {
        /// Number of members requested.
        members: usize,
        /// Hard combinatorial bound.
        limit: usize,
    },

    /// Threshold parameters outside `0 < k <= n`.
    #[error("invalid threshold: k={k} over {n} members")]
    InvalidThreshold {
        /// Required signer count.
        k: usize,
        /// Member count.
        n: usize,
    },

    /// Instruction index outside the proposal's instruction list.
    #[error("instruction index {index} out of range for {len} instructions")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of instructions in the proposal.
        len: usize,
    },

    /// Signer is not reachable from the instruction's required expression.
    #[error("signer {identity} is not eligible for this instruction")]
    SignerNotEligible {
        /// The rejected identity, in surface syntax.
        identity: String,
    },

    /// Signature bytes did not verify against the instruction digest.
    #[error("signature from {identity} does not verify")]
    InvalidSignature {
        /// The identity whose signature failed.
        identity: String,
    },

    /// Replay-protection sequence number was not strictly increasing.
    #[error("stale sequence {got} for {identity}: last accepted was {last}")]
    StaleSequence {
        /// The identity that submitted the stale sequence.
        identity: String,
        /// Sequence number submitted.
        got: u64,
        /// Highest sequence number previously accepted.
        last: u64,
    },

    /// Ledger height has passed the proposal's expiration height.
    #[error("proposal expired at height {expire_at_height} (current height {height})")]
    ProposalExpired {
        /// Height after which the proposal is inert.
        expire_at_height: u64,
        /// Current ledger height.
        height: u64,
    },

    /// The proposal has consumed every execution slot.
    #[error("proposal has exhausted its {max_executions} executions")]
    ExhaustedExecutions {
        /// Configured execution budget.
        max_executions: u32,
    },

    /// Delegation graph revisited a node on the current resolution path.
    #[error("cyclic delegation through node {node_id}")]
    CyclicDelegation {
        /// Node encountered twice on one path.
        node_id: String,
    },

    /// Neither an action rule nor a sign expression exists on the node.
    #[error("no rule defined for action {action}")]
    NoRuleDefined {
        /// The action that had no rule.
        action: String,
    },

    /// Delegation reference to a node the store does not know.
    #[error("node not found: {node_id}")]
    NodeNotFound {
        /// The missing node id.
        node_id: String,
    },

    /// Operation on a proposal id the ledger does not know.
    #[error("proposal not found: {proposal_id}")]
    ProposalNotFound {
        /// The missing proposal id.
        proposal_id: String,
    },

    /// Collaborator (ledger, gossip) infrastructure failure.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },
}

impl EngineError {
    /// Create an invalid-expression error.
    pub fn invalid_expression(message: impl Into<String>) -> Self {
        Self::InvalidExpression {
            message: message.into(),
        }
    }

    /// Create an invalid-proposal error.
    pub fn invalid_proposal(message: impl Into<String>) -> Self {
        Self::InvalidProposal {
            message: message.into(),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Classify this error for retry handling.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidExpression { .. }
            | Self::InvalidProposal { .. }
            | Self::ThresholdTooLarge { .. }
            | Self::InvalidThreshold { .. }
            | Self::IndexOutOfRange { .. } => ErrorKind::Validation,
            Self::SignerNotEligible { .. }
            | Self::InvalidSignature { .. }
            | Self::StaleSequence { .. } => ErrorKind::Authorization,
            Self::ProposalExpired { .. }
            | Self::ExhaustedExecutions { .. }
            | Self::CyclicDelegation { .. }
            | Self::NoRuleDefined { .. }
            | Self::NodeNotFound { .. }
            | Self::ProposalNotFound { .. } => ErrorKind::State,
            Self::Storage { .. } => ErrorKind::Storage,
        }
    }
}

/// Result alias used across the workspace.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(
            EngineError::invalid_expression("x").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            EngineError::SignerNotEligible {
                identity: "ed25519:aa".into()
            }
            .kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            EngineError::CyclicDelegation {
                node_id: "a".into()
            }
            .kind(),
            ErrorKind::State
        );
        assert_eq!(EngineError::storage("down").kind(), ErrorKind::Storage);
    }

    #[test]
    fn display_is_stable() {
        let err = EngineError::ProposalExpired {
            expire_at_height: 10,
            height: 12,
        };
        assert_eq!(
            err.to_string(),
            "proposal expired at height 10 (current height 12)"
        );
    }
}
