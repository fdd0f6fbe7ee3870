//! Deployment descriptor synthesis.
//!
//! Walks a resolved plan layer by layer and emits one fragment per node from
//! that node's own attributes. Cross-node values were already copied in at
//! declaration time, so nothing is re-derived here and the graph is only read.

use std::collections::BTreeSet;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use stackplan_common::error::{Result, StackError};
use stackplan_common::types::{ResourceId, Sha256Hash};

use crate::graph::ResourceGraph;
use crate::model::{Attributes, ResourceKind};
use crate::plan::OrderedPlan;
use crate::validator::validate_node;

/// Descriptor entry for a single node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFragment {
    /// Node kind.
    pub kind: ResourceKind,
    /// Node attributes, verbatim.
    pub attributes: Attributes,
    /// Explicit and implicit dependencies, sorted.
    pub depends_on: Vec<ResourceId>,
}

/// Flat, ordered output consumed by a provisioning executor.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentDescriptor {
    order: Vec<Vec<ResourceId>>,
    resources: Vec<(ResourceId, ResourceFragment)>,
    fingerprint: Sha256Hash,
}

/// Serializes `(id, fragment)` pairs as a map that keeps plan order.
struct OrderedResources<'a>(&'a [(ResourceId, ResourceFragment)]);

impl Serialize for OrderedResources<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, fragment) in self.0 {
            map.serialize_entry(id, fragment)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct Body<'a> {
    order: &'a [Vec<ResourceId>],
    resources: OrderedResources<'a>,
}

#[derive(Serialize)]
struct Document<'a> {
    order: &'a [Vec<ResourceId>],
    resources: OrderedResources<'a>,
    fingerprint: &'a str,
}

impl Serialize for DeploymentDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        Document {
            order: &self.order,
            resources: OrderedResources(&self.resources),
            fingerprint: self.fingerprint.as_hex(),
        }
        .serialize(serializer)
    }
}

impl DeploymentDescriptor {
    /// Layers of ids, as resolved.
    #[must_use]
    pub fn order(&self) -> &[Vec<ResourceId>] {
        &self.order
    }

    /// Fragments in plan order.
    pub fn resources(&self) -> impl Iterator<Item = (&ResourceId, &ResourceFragment)> {
        self.resources.iter().map(|(id, fragment)| (id, fragment))
    }

    /// Fragment of a single node.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&ResourceFragment> {
        self.resources
            .iter()
            .find(|(rid, _)| rid.as_str() == id)
            .map(|(_, fragment)| fragment)
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if the descriptor holds no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// SHA-256 of the canonical JSON of `order` and `resources`.
    #[must_use]
    pub const fn fingerprint(&self) -> &Sha256Hash {
        &self.fingerprint
    }

    /// Pretty-printed JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Synthesizes the descriptor for a resolved graph.
///
/// # Errors
///
/// Returns [`StackError::InvalidNode`] if the plan names a node the graph
/// lacks, leaves a graph node out, lists a node twice, or if a node is missing
/// an attribute its kind requires.
pub fn synthesize(graph: &ResourceGraph, plan: &OrderedPlan) -> Result<DeploymentDescriptor> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut resources = Vec::with_capacity(graph.len());

    for (index, layer) in plan.layers().iter().enumerate() {
        tracing::debug!(layer = index, nodes = layer.len(), "synthesizing layer");
        for id in layer {
            let Some(node) = graph.node(id.as_str()) else {
                return Err(StackError::invalid_node(id.as_str(), "planned node is not in the graph"));
            };
            if !seen.insert(id.as_str()) {
                return Err(StackError::invalid_node(id.as_str(), "node appears twice in the plan"));
            }
            validate_node(node)?;
            let depends_on = node
                .dependencies()?
                .into_iter()
                .filter_map(|dep| graph.id_of(dep).cloned())
                .collect();
            resources.push((
                node.id().clone(),
                ResourceFragment {
                    kind: node.kind(),
                    attributes: node.attributes().clone(),
                    depends_on,
                },
            ));
        }
    }

    if let Some(missing) = graph.nodes().find(|n| !seen.contains(n.id().as_str())) {
        return Err(StackError::invalid_node(
            missing.id().as_str(),
            "node is not covered by the plan",
        ));
    }

    let order = plan.layers().to_vec();
    let canonical = serde_json::to_vec(&Body {
        order: &order,
        resources: OrderedResources(&resources),
    })?;
    let fingerprint = Sha256Hash::of(&canonical);
    tracing::info!(resources = resources.len(), fingerprint = %fingerprint, "descriptor synthesized");

    Ok(DeploymentDescriptor {
        order,
        resources,
        fingerprint,
    })
}
