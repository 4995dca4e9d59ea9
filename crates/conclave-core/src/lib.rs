//! Conclave Core - foundational types for the authorization engine
//!
//! This crate provides the pure, collaborator-free building blocks shared by
//! the rest of the workspace:
//!
//! - [`Identity`]: leaf signer keys and delegation references
//! - [`Expression`]: boolean formulas over identities, held canonically in
//!   disjunctive normal form (OR of AND-clauses)
//! - [`threshold`]: deterministic k-of-n gate construction
//! - [`EngineError`]: the unified error type with its retry taxonomy
//!
//! Everything here is deterministic: the same inputs produce byte-identical
//! outputs on independent machines, which is what allows separately operated
//! parties to agree on the exact formula guarding an action.

#![forbid(unsafe_code)]

pub mod errors;
pub mod expression;
pub mod identifiers;
pub mod identity;
pub mod threshold;

pub use errors::{EngineError, EngineResult, ErrorKind};
pub use expression::{Clause, Expression};
pub use identifiers::{NodeId, ProposalId};
pub use identity::Identity;
