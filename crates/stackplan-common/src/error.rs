//! Unified error types for the stackplan workspace.
//!
//! Every variant describes a construction or validation problem in a topology
//! declaration. None of them are transient, so nothing in the workspace
//! retries on them.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Phase;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum StackError {
    /// A node with this id is already part of the graph.
    #[error("duplicate resource id: {id}")]
    DuplicateId {
        /// Identifier that was declared twice.
        id: String,
    },

    /// An edge (or a node's own `dependsOn`) named an id that was never added.
    #[error("unknown resource id: {id}")]
    UnknownId {
        /// Identifier that could not be found.
        id: String,
    },

    /// A dependency or reference attribute points at a node absent from the graph.
    #[error("resource {from} references unknown resource {to}")]
    UnknownReference {
        /// Node holding the dangling reference.
        from: String,
        /// Identifier that could not be found.
        to: String,
    },

    /// The dependency graph contains at least one cycle.
    #[error("cyclic dependency detected: {}", format_cycle(.cycle))]
    CyclicDependency {
        /// One representative cycle, in dependency order.
        cycle: Vec<String>,
    },

    /// The graph was sealed and can no longer be mutated.
    #[error("graph is sealed; cannot {operation}")]
    SealedGraph {
        /// Mutation that was attempted.
        operation: &'static str,
    },

    /// A node is missing an attribute its kind requires, or carries an invalid value.
    #[error("invalid resource {id}: {reason}")]
    InvalidNode {
        /// Offending node id.
        id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A lifecycle stage was run out of order.
    #[error("illegal state transition: {from} -> {to}")]
    IllegalStateTransition {
        /// Phase the stack was in.
        from: Phase,
        /// Phase that was requested.
        to: Phase,
    },

    /// A thread panicked while holding a shared lock; the guarded state can
    /// no longer be trusted.
    #[error("{resource} lock poisoned by a panicked writer")]
    LockPoisoned {
        /// What the lock guards.
        resource: &'static str,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// YAML serialization or deserialization failed.
    #[error("yaml error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

impl StackError {
    /// Shorthand for an [`StackError::InvalidNode`] error.
    pub fn invalid_node(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNode {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

fn format_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => format!("{} -> {first}", cycle.join(" -> ")),
        None => String::from("<empty>"),
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, StackError>;
