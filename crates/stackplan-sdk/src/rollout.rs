//! Async layer-by-layer rollout of a deployment descriptor.
//!
//! Every node of the current layer is handed to the [`Provisioner`] on its
//! own task; the layer is awaited as a whole before the next one starts.
//! Fail-fast and cancellation rules come from [`RolloutTracker`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use stackplan_common::types::{NodeStatus, ResourceId};
use stackplan_graph::rollout::{LayerOutcome, RolloutTracker};
use stackplan_graph::synth::{DeploymentDescriptor, ResourceFragment};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::event::RolloutEvent;

/// Failure reported by a provisioner for a single node.
#[derive(Debug, thiserror::Error)]
#[error("provisioning {id} failed: {reason}")]
pub struct ProvisionError {
    /// Node id.
    pub id: String,
    /// Why it failed.
    pub reason: String,
}

impl ProvisionError {
    /// Creates a failure for `id`.
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Brings a single resource into existence.
pub trait Provisioner: Send + Sync + 'static {
    /// Provisions one node from its descriptor fragment.
    fn provision(
        &self,
        id: &ResourceId,
        fragment: &ResourceFragment,
    ) -> impl Future<Output = Result<(), ProvisionError>> + Send;
}

/// Shared cancellation flag for a running rollout.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Requests cancellation; the current layer still finishes.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a rollout ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RolloutOutcome {
    /// Every node is ready.
    Succeeded,
    /// A layer failed; later layers were skipped.
    Failed,
    /// Cancelled before every layer ran.
    Cancelled,
}

/// Summary of one rollout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutReport {
    /// Rollout id.
    pub id: Uuid,
    /// When the first layer started.
    pub started_at: DateTime<Utc>,
    /// When the rollout stopped.
    pub finished_at: DateTime<Utc>,
    /// How it ended.
    pub outcome: RolloutOutcome,
    /// Final status of every node.
    pub statuses: BTreeMap<ResourceId, NodeStatus>,
    /// Failure reason of every failed node.
    pub failures: BTreeMap<ResourceId, String>,
}

impl RolloutReport {
    /// Final status of one node.
    #[must_use]
    pub fn status(&self, id: &str) -> Option<NodeStatus> {
        self.statuses.get(id).copied()
    }

    /// Number of nodes that ended with `status`.
    #[must_use]
    pub fn count(&self, status: NodeStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }

    /// Returns `true` if every node is ready.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome == RolloutOutcome::Succeeded
    }
}

/// Drives a [`Provisioner`] across a descriptor's layers.
#[derive(Debug)]
pub struct Rollout<P> {
    provisioner: Arc<P>,
    cancel: CancelHandle,
    events: Option<UnboundedSender<RolloutEvent>>,
}

impl<P: Provisioner> Rollout<P> {
    /// Creates a rollout over `provisioner`.
    #[must_use]
    pub fn new(provisioner: P) -> Self {
        Self {
            provisioner: Arc::new(provisioner),
            cancel: CancelHandle::default(),
            events: None,
        }
    }

    /// Publishes progress events on `sender`.
    #[must_use]
    pub fn with_events(mut self, sender: UnboundedSender<RolloutEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Handle that cancels this rollout.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn emit(&self, event: RolloutEvent) {
        if let Some(sender) = &self.events {
            // A dropped receiver only means nobody is listening.
            let _ = sender.send(event);
        }
    }

    /// Rolls out every layer of `descriptor` in order.
    ///
    /// Stops after the first layer with a failed node, or before the next
    /// layer once cancellation is requested. Provisioning failures are
    /// recorded in the report, never returned as errors.
    pub async fn run(&self, descriptor: &DeploymentDescriptor) -> RolloutReport {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut tracker = RolloutTracker::from_layers(descriptor.order().to_vec());
        tracing::info!(rollout = %id, layers = tracker.layer_count(), "rollout started");

        let mut cancelled = false;
        loop {
            if self.cancel.is_cancelled() && !tracker.is_finished() {
                let skipped = tracker.cancel();
                self.emit(RolloutEvent::Cancelled { skipped });
                cancelled = true;
                break;
            }
            let Some((layer, nodes)) = tracker.start_next_layer() else {
                break;
            };
            tracing::info!(rollout = %id, layer, nodes = nodes.len(), "provisioning layer");
            self.emit(RolloutEvent::LayerStarted {
                layer,
                nodes: nodes.clone(),
            });

            let mut tasks = JoinSet::new();
            for node in nodes {
                let Some(fragment) = descriptor.resource(node.as_str()).cloned() else {
                    let reason = "node is missing from the descriptor".to_string();
                    let _ = tracker.record_failed(node.as_str(), reason.clone());
                    self.emit(RolloutEvent::NodeFailed { id: node, reason });
                    continue;
                };
                let provisioner = Arc::clone(&self.provisioner);
                let _ = tasks.spawn(async move {
                    let outcome = provisioner.provision(&node, &fragment).await;
                    (node, outcome)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((node, Ok(()))) => {
                        let _ = tracker.record_ready(node.as_str());
                        self.emit(RolloutEvent::NodeReady { id: node });
                    }
                    Ok((node, Err(e))) => {
                        let reason = e.to_string();
                        tracing::warn!(rollout = %id, node = %node, error = %reason, "node failed");
                        let _ = tracker.record_failed(node.as_str(), reason.clone());
                        self.emit(RolloutEvent::NodeFailed { id: node, reason });
                    }
                    Err(e) => {
                        tracing::warn!(rollout = %id, error = %e, "provisioning task aborted");
                    }
                }
            }

            match tracker.finish_layer() {
                Some(LayerOutcome::Completed) => {
                    self.emit(RolloutEvent::LayerCompleted { layer });
                }
                Some(LayerOutcome::Failed { skipped, .. }) => {
                    self.emit(RolloutEvent::Halted { layer, skipped });
                    break;
                }
                None => break,
            }
        }

        let outcome = if cancelled {
            RolloutOutcome::Cancelled
        } else if tracker.is_halted() {
            RolloutOutcome::Failed
        } else {
            RolloutOutcome::Succeeded
        };
        let report = RolloutReport {
            id,
            started_at,
            finished_at: Utc::now(),
            outcome,
            statuses: tracker.statuses().clone(),
            failures: tracker.failures().clone(),
        };
        tracing::info!(
            rollout = %id,
            outcome = ?outcome,
            ready = report.count(NodeStatus::Ready),
            failed = report.count(NodeStatus::Failed),
            skipped = report.count(NodeStatus::Skipped),
            "rollout finished"
        );
        report
    }
}
