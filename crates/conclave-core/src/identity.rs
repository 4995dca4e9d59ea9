//! Signer identities: leaf public keys and delegation references
//!
//! The surface syntax follows the original hierarchy format: a leaf signer
//! is written `ed25519:<hex public key>` and a delegation reference to
//! another policy node is written `node:<node id>`. Any other prefix is
//! rejected at parse time.

use crate::errors::{EngineError, EngineResult};
use crate::identifiers::NodeId;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Surface prefix for leaf signer keys.
pub const LEAF_PREFIX: &str = "ed25519:";

/// Surface prefix for delegation references.
pub const NODE_PREFIX: &str = "node:";

/// An atom in an authorization expression.
///
/// `Identity` is ordered and hashable; leaf identities sort by their hex key,
/// which gives the lexicographic order the threshold builder relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Identity {
    /// A primitive signer: a hex-encoded ed25519 public key.
    Leaf(String),
    /// A reference to another policy node, resolved recursively.
    Node(NodeId),
}

impl Identity {
    /// Create a leaf identity from a hex-encoded public key.
    pub fn leaf(key_hex: impl Into<String>) -> Self {
        Self::Leaf(key_hex.into())
    }

    /// Create a delegation reference.
    pub fn node(id: impl Into<NodeId>) -> Self {
        Self::Node(id.into())
    }

    /// Whether this is a leaf signer key.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// The hex public key, if this is a leaf.
    pub fn leaf_key(&self) -> Option<&str> {
        match self {
            Self::Leaf(key) => Some(key),
            Self::Node(_) => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(key) => write!(f, "{LEAF_PREFIX}{key}"),
            Self::Node(id) => write!(f, "{NODE_PREFIX}{id}"),
        }
    }
}

impl FromStr for Identity {
    type Err = EngineError;

    fn from_str(token: &str) -> EngineResult<Self> {
        if let Some(key) = token.strip_prefix(LEAF_PREFIX) {
            if key.is_empty() || !key.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(EngineError::invalid_expression(format!(
                    "malformed leaf key in token {token:?}"
                )));
            }
            return Ok(Self::Leaf(key.to_ascii_lowercase()));
        }
        if let Some(id) = token.strip_prefix(NODE_PREFIX) {
            if id.is_empty() {
                return Err(EngineError::invalid_expression(
                    "empty node reference".to_string(),
                ));
            }
            return Ok(Self::Node(NodeId::new(id)));
        }
        Err(EngineError::invalid_expression(format!(
            "unknown identity token {token:?}"
        )))
    }
}

// Serialized in surface syntax so stored expressions stay human-readable
// and map keys remain plain strings.
impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        token.parse().map_err(D::Error::custom)
    }
}
