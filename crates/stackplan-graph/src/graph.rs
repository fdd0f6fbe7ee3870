//! Resource graph construction.
//!
//! [`GraphBuilder`] is the single writer of the working graph. It keeps all
//! state behind one mutex, so `add_node`/`add_dependency` calls never
//! interleave with `seal`. Sealing hands out an immutable [`ResourceGraph`]
//! and every later mutation is rejected.
//!
//! The builder also holds the graph-wide shape rules that a single node
//! cannot check on its own: one network, one container cluster, and at most
//! one health check per target.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use stackplan_common::error::{Result, StackError};
use stackplan_common::types::{Phase, ResourceId};

use crate::model::{ResourceKind, ResourceNode, attr};

/// Kinds a graph may hold at most one of.
const SINGLETON_KINDS: [ResourceKind; 2] = [ResourceKind::Network, ResourceKind::ContainerCluster];

#[derive(Debug, Default)]
struct BuilderState {
    nodes: BTreeMap<ResourceId, ResourceNode>,
    sealed: bool,
}

/// Accumulates resource nodes and dependency edges until sealed.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    state: Mutex<BuilderState>,
}

impl GraphBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BuilderState>> {
        self.state
            .lock()
            .map_err(|_| StackError::LockPoisoned { resource: "graph builder" })
    }

    /// Adds a node.
    ///
    /// The graph is left unchanged when this fails.
    ///
    /// # Errors
    ///
    /// - [`StackError::SealedGraph`] after [`GraphBuilder::seal`].
    /// - [`StackError::DuplicateId`] if the id is already present.
    /// - [`StackError::UnknownId`] if the node's own `dependsOn` names an
    ///   id that has not been added yet.
    /// - [`StackError::InvalidNode`] for a second network or container
    ///   cluster, or a second health check on the same target.
    pub fn add_node(&self, node: ResourceNode) -> Result<()> {
        let mut state = self.lock()?;
        if state.sealed {
            return Err(StackError::SealedGraph { operation: "add node" });
        }
        if state.nodes.contains_key(node.id()) {
            return Err(StackError::DuplicateId {
                id: node.id().to_string(),
            });
        }
        if let Some(missing) = node
            .depends_on()
            .iter()
            .find(|dep| !state.nodes.contains_key(*dep))
        {
            return Err(StackError::UnknownId {
                id: missing.to_string(),
            });
        }
        if let Some(reason) = shape_conflict(&state.nodes, &node) {
            return Err(StackError::invalid_node(node.id().as_str(), reason));
        }
        tracing::debug!(id = %node.id(), kind = %node.kind(), "node added");
        let _ = state.nodes.insert(node.id().clone(), node);
        Ok(())
    }

    /// Adds an edge: `from` must not be considered ready before `to`.
    ///
    /// Edges only accumulate; adding the same edge twice is a no-op.
    ///
    /// # Errors
    ///
    /// - [`StackError::SealedGraph`] after [`GraphBuilder::seal`].
    /// - [`StackError::UnknownId`] if either endpoint has not been added.
    pub fn add_dependency(&self, from: &str, to: &str) -> Result<()> {
        let mut state = self.lock()?;
        if state.sealed {
            return Err(StackError::SealedGraph {
                operation: "add dependency",
            });
        }
        let Some(target) = state.nodes.get_key_value(to).map(|(id, _)| id.clone()) else {
            return Err(StackError::UnknownId { id: to.to_string() });
        };
        let Some(source) = state.nodes.get_mut(from) else {
            return Err(StackError::UnknownId {
                id: from.to_string(),
            });
        };
        if source.insert_dependency(target) {
            tracing::debug!(from, to, "dependency added");
        }
        Ok(())
    }

    /// Returns a copy of a declared node.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::UnknownId`] if the id has not been added, or
    /// [`StackError::SealedGraph`] once the nodes have moved into a
    /// [`ResourceGraph`].
    pub fn node(&self, id: &str) -> Result<ResourceNode> {
        let state = self.lock()?;
        if state.sealed {
            return Err(StackError::SealedGraph { operation: "read node" });
        }
        state
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| StackError::UnknownId { id: id.to_string() })
    }

    /// Returns `true` if a node with this id has been added.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().is_ok_and(|state| state.nodes.contains_key(id))
    }

    /// Number of nodes added so far (zero once sealed).
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |state| state.nodes.len())
    }

    /// Returns `true` if no node has been added.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once [`GraphBuilder::seal`] has succeeded.
    pub fn is_sealed(&self) -> bool {
        self.lock().is_ok_and(|state| state.sealed)
    }

    /// Freezes the builder and returns the finished graph.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::IllegalStateTransition`] if already sealed.
    pub fn seal(&self) -> Result<ResourceGraph> {
        let mut state = self.lock()?;
        if state.sealed {
            return Err(StackError::IllegalStateTransition {
                from: Phase::Sealed,
                to: Phase::Sealed,
            });
        }
        state.sealed = true;
        let nodes = std::mem::take(&mut state.nodes);
        tracing::info!(nodes = nodes.len(), "graph sealed");
        Ok(ResourceGraph { nodes })
    }
}

fn shape_conflict(nodes: &BTreeMap<ResourceId, ResourceNode>, node: &ResourceNode) -> Option<String> {
    let kind = node.kind();
    if SINGLETON_KINDS.contains(&kind) {
        return nodes
            .values()
            .find(|n| n.kind() == kind)
            .map(|existing| format!("graph already has a {kind}: {}", existing.id()));
    }
    if kind == ResourceKind::HealthCheck {
        let target = node.str_attr(attr::TARGET_ID)?;
        return nodes
            .values()
            .find(|n| n.kind() == kind && n.str_attr(attr::TARGET_ID) == Some(target))
            .map(|existing| format!("{target} is already checked by {}", existing.id()));
    }
    None
}

/// An immutable, sealed resource graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceGraph {
    nodes: BTreeMap<ResourceId, ResourceNode>,
}

impl ResourceGraph {
    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    /// Returns the canonical id stored in the graph for `id`.
    #[must_use]
    pub fn id_of(&self, id: &str) -> Option<&ResourceId> {
        self.nodes.get_key_value(id).map(|(key, _)| key)
    }

    /// Returns `true` if the graph has a node with this id.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.values()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
