//! Conclave Deferred - pending multi-instruction proposals
//!
//! A deferred proposal bundles one or more instructions, each guarded by a
//! leaf-resolved authorization expression captured at creation time.
//! Co-signers attach signatures over per-instruction digests; once every
//! instruction has quorum the proposal executes atomically through the
//! ledger collaborator, which is the single serialization point for commits.
//!
//! Lifecycle: `Proposed` → (accumulate signatures, any order or repetition)
//! → `Ready` (computed on demand) → `Exhausted` (terminal success) or
//! `Expired` (terminal, passive — no garbage collection, a proposal past its
//! expiry height is simply inert).

#![forbid(unsafe_code)]

pub mod collector;
pub mod coordinator;
pub mod executor;
pub mod ledger;
pub mod memory;
pub mod proposal;

pub use collector::SignatureCollector;
pub use conclave_core::{EngineError, EngineResult};
pub use coordinator::ProposalCoordinator;
pub use executor::{ExecutionOutcome, Executor};
pub use ledger::{Gossip, Ledger};
pub use memory::{MemoryLedger, StaticPeers};
pub use proposal::{Instruction, InstructionDraft, Proposal, ProposalStatus, SignatureRecord};
