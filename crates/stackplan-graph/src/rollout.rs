//! Layer-by-layer rollout bookkeeping.
//!
//! [`RolloutTracker`] encodes how an executor must react to provisioning
//! outcomes. A layer is a barrier: the next layer only starts once every
//! node of the current one has reported. A single failure halts the rollout
//! and marks every node in later layers `Skipped`. Cancellation marks every
//! node not yet started `Skipped`. Nodes that already finished keep their
//! status.

use std::collections::BTreeMap;

use stackplan_common::types::{NodeStatus, ResourceId};

use crate::plan::OrderedPlan;

/// Result of closing a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerOutcome {
    /// Every node in the layer is ready.
    Completed,
    /// At least one node failed; the rollout is halted.
    Failed {
        /// Nodes of this layer that failed.
        failed: Vec<ResourceId>,
        /// Number of nodes in later layers that were marked skipped.
        skipped: usize,
    },
}

/// Tracks node statuses across one rollout of a plan.
#[derive(Debug, Clone)]
pub struct RolloutTracker {
    layers: Vec<Vec<ResourceId>>,
    statuses: BTreeMap<ResourceId, NodeStatus>,
    failures: BTreeMap<ResourceId, String>,
    next_layer: usize,
    active_layer: Option<usize>,
    halted: bool,
}

impl RolloutTracker {
    /// Starts tracking a plan; every node begins `Pending`.
    #[must_use]
    pub fn new(plan: &OrderedPlan) -> Self {
        Self::from_layers(plan.layers().to_vec())
    }

    /// Starts tracking raw layers, e.g. a descriptor's `order`.
    #[must_use]
    pub fn from_layers(layers: Vec<Vec<ResourceId>>) -> Self {
        let statuses = layers
            .iter()
            .flatten()
            .map(|id| (id.clone(), NodeStatus::Pending))
            .collect();
        Self {
            layers,
            statuses,
            failures: BTreeMap::new(),
            next_layer: 0,
            active_layer: None,
            halted: false,
        }
    }

    /// Number of layers.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Moves the next layer to `Provisioning` and returns its index and ids.
    ///
    /// Returns `None` while a layer is still open, after a halt, or when all
    /// layers have run.
    pub fn start_next_layer(&mut self) -> Option<(usize, Vec<ResourceId>)> {
        if self.halted || self.active_layer.is_some() || self.next_layer >= self.layers.len() {
            return None;
        }
        let index = self.next_layer;
        self.next_layer += 1;
        self.active_layer = Some(index);
        let ids = self.layers[index].clone();
        for id in &ids {
            let _ = self.statuses.insert(id.clone(), NodeStatus::Provisioning);
        }
        tracing::debug!(layer = index, nodes = ids.len(), "layer started");
        Some((index, ids))
    }

    /// Records a successful provision. Ignored unless the node is provisioning.
    pub fn record_ready(&mut self, id: &str) -> bool {
        self.transition(id, NodeStatus::Ready)
    }

    /// Records a failed provision. Ignored unless the node is provisioning.
    pub fn record_failed(&mut self, id: &str, reason: impl Into<String>) -> bool {
        let applied = self.transition(id, NodeStatus::Failed);
        if applied {
            if let Some((key, _)) = self.statuses.get_key_value(id) {
                let _ = self.failures.insert(key.clone(), reason.into());
            }
        }
        applied
    }

    fn transition(&mut self, id: &str, to: NodeStatus) -> bool {
        match self.statuses.get_mut(id) {
            Some(status) if *status == NodeStatus::Provisioning => {
                *status = to;
                true
            }
            _ => false,
        }
    }

    /// Closes the open layer.
    ///
    /// A node that never reported counts as failed. On any failure every
    /// node of a later layer becomes `Skipped` and the rollout halts.
    /// Returns `None` when no layer is open.
    pub fn finish_layer(&mut self) -> Option<LayerOutcome> {
        let index = self.active_layer.take()?;
        let mut failed = Vec::new();
        for id in &self.layers[index] {
            match self.statuses.get(id) {
                Some(NodeStatus::Failed) => failed.push(id.clone()),
                Some(NodeStatus::Provisioning) => {
                    let _ = self.statuses.insert(id.clone(), NodeStatus::Failed);
                    let _ = self.failures.insert(id.clone(), "no result reported".into());
                    failed.push(id.clone());
                }
                _ => {}
            }
        }
        if failed.is_empty() {
            tracing::debug!(layer = index, "layer completed");
            return Some(LayerOutcome::Completed);
        }
        self.halted = true;
        let skipped = self.skip_pending();
        tracing::warn!(layer = index, failed = failed.len(), skipped, "layer failed; halting rollout");
        Some(LayerOutcome::Failed { failed, skipped })
    }

    /// Cancels the rollout: every node not yet started becomes `Skipped`.
    ///
    /// Nodes of an open layer keep running and can still be recorded.
    /// Returns the number of nodes skipped.
    pub fn cancel(&mut self) -> usize {
        self.halted = true;
        let skipped = self.skip_pending();
        tracing::warn!(skipped, "rollout cancelled");
        skipped
    }

    fn skip_pending(&mut self) -> usize {
        let mut skipped = 0;
        for status in self.statuses.values_mut() {
            if *status == NodeStatus::Pending {
                *status = NodeStatus::Skipped;
                skipped += 1;
            }
        }
        skipped
    }

    /// Status of one node.
    #[must_use]
    pub fn status(&self, id: &str) -> Option<NodeStatus> {
        self.statuses.get(id).copied()
    }

    /// Every node's status, by id.
    #[must_use]
    pub const fn statuses(&self) -> &BTreeMap<ResourceId, NodeStatus> {
        &self.statuses
    }

    /// Failure reasons, by id.
    #[must_use]
    pub const fn failures(&self) -> &BTreeMap<ResourceId, String> {
        &self.failures
    }

    /// Returns `true` after a failed layer or a cancel.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Returns `true` once every node has a terminal status.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.statuses.values().all(|s| s.is_terminal())
    }
}
