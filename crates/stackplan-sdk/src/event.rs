//! Rollout progress events.
//!
//! A [`Rollout`](crate::rollout::Rollout) publishes these on an optional
//! channel so callers can render progress while layers are in flight.

use stackplan_common::types::ResourceId;

/// A rollout progress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutEvent {
    /// A layer's nodes were handed to the provisioner.
    LayerStarted {
        /// Layer index.
        layer: usize,
        /// Nodes in the layer.
        nodes: Vec<ResourceId>,
    },
    /// A node was provisioned.
    NodeReady {
        /// Node id.
        id: ResourceId,
    },
    /// A node failed to provision.
    NodeFailed {
        /// Node id.
        id: ResourceId,
        /// Provisioner's reason.
        reason: String,
    },
    /// Every node in a layer is ready.
    LayerCompleted {
        /// Layer index.
        layer: usize,
    },
    /// A layer failed and later layers were skipped.
    Halted {
        /// Index of the failed layer.
        layer: usize,
        /// Number of skipped nodes.
        skipped: usize,
    },
    /// The rollout was cancelled before reaching every layer.
    Cancelled {
        /// Number of skipped nodes.
        skipped: usize,
    },
}
