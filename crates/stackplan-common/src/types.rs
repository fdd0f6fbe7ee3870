//! Domain primitive types used across the stackplan workspace.

use std::borrow::Borrow;
use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, StackError};

/// Unique identifier for a resource node.
///
/// Ids are non-empty and limited to ASCII alphanumerics, `-`, `_` and `.`
/// so they can be used verbatim as keys in the emitted descriptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a resource id, validating its characters.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::InvalidNode`] if the id is empty or contains
    /// characters outside `[A-Za-z0-9._-]`.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(StackError::invalid_node(id, "resource id must not be empty"));
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(StackError::invalid_node(
                id.clone(),
                format!("resource id contains invalid character {bad:?}"),
            ));
        }
        Ok(Self(id))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ResourceId {
    type Error = StackError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 digest used to fingerprint synthesized descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Hashes the given bytes.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut hex = String::with_capacity(crate::constants::SHA256_HEX_LENGTH);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Returns the hex-encoded hash string.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// Whole-system lifecycle phase of a stack.
///
/// Transitions only move forward: `Building → Sealed → Resolved → Synthesized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Nodes and edges are still being declared.
    Building,
    /// The graph is frozen; no more nodes or edges.
    Sealed,
    /// A deployment plan has been computed.
    Resolved,
    /// A deployment descriptor has been emitted.
    Synthesized,
}

impl Phase {
    /// Returns the phase that legally follows this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Building => Some(Self::Sealed),
            Self::Sealed => Some(Self::Resolved),
            Self::Resolved => Some(Self::Synthesized),
            Self::Synthesized => None,
        }
    }

    /// Checks that moving from `self` to `to` is the single legal forward step.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::IllegalStateTransition`] otherwise.
    pub fn advance(self, to: Self) -> Result<Self> {
        if self.next() == Some(to) {
            Ok(to)
        } else {
            Err(StackError::IllegalStateTransition { from: self, to })
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Building => write!(f, "building"),
            Self::Sealed => write!(f, "sealed"),
            Self::Resolved => write!(f, "resolved"),
            Self::Synthesized => write!(f, "synthesized"),
        }
    }
}

/// Provisioning status of a single node during a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Not reached yet.
    Pending,
    /// Its layer is in flight.
    Provisioning,
    /// Provisioned successfully.
    Ready,
    /// The provisioner reported a failure.
    Failed,
    /// Never attempted because an earlier layer failed or the rollout was cancelled.
    Skipped,
}

impl NodeStatus {
    /// Returns `true` once the status can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Provisioning => write!(f, "provisioning"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}
