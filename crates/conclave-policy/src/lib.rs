//! Conclave Policy - authorization units and signer resolution
//!
//! A [`PolicyNode`] is an authorization unit: it owns a sign expression, an
//! owner expression, and a map of action-gated rules. Nodes delegate to one
//! another through `node:` references; the [`SignerResolver`] flattens that
//! hierarchy into concrete leaf signer keys, detecting cycles and memoizing
//! per immutable `(id, version)` snapshot.

#![forbid(unsafe_code)]

pub mod node;
pub mod resolve;
pub mod store;

pub use conclave_core::{EngineError, EngineResult};
pub use node::PolicyNode;
pub use resolve::SignerResolver;
pub use store::NodeStore;
