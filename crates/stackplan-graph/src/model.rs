//! Resource node model.
//!
//! A [`ResourceNode`] is a tagged record: a [`ResourceKind`] plus a flat
//! attribute map. Nodes never hold handles to each other; cross-node links
//! are plain ids stored either in `dependsOn` or in one of the
//! [`REFERENCE_ATTRIBUTES`], and are looked up through the graph.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use stackplan_common::error::{Result, StackError};
use stackplan_common::types::ResourceId;

/// Attribute value type.
pub type Value = serde_json::Value;

/// Attribute map of a node, sorted by key.
pub type Attributes = BTreeMap<String, Value>;

/// Attribute keys understood by the planner.
pub mod attr {
    /// Human-readable name.
    pub const NAME: &str = "name";
    /// Number of availability zones a network spans.
    pub const AVAILABILITY_ZONE_COUNT: &str = "availabilityZoneCount";
    /// Database engine.
    pub const ENGINE: &str = "engine";
    /// Database engine version.
    pub const VERSION: &str = "version";
    /// Database instance class.
    pub const INSTANCE_CLASS: &str = "instanceClass";
    /// Allocated storage in GiB.
    pub const STORAGE_GIB: &str = "storageGiB";
    /// Logical database name.
    pub const DATABASE_NAME: &str = "databaseName";
    /// Master username.
    pub const USERNAME: &str = "username";
    /// Opaque credentials handle.
    pub const CREDENTIALS_REF: &str = "credentialsRef";
    /// What happens to the resource when the stack is torn down.
    pub const REMOVAL_POLICY: &str = "removalPolicy";
    /// Endpoint host.
    pub const ADDRESS: &str = "address";
    /// Endpoint port.
    pub const PORT: &str = "port";
    /// Node probed by a health check.
    pub const TARGET_ID: &str = "targetId";
    /// Health check protocol.
    pub const PROTOCOL: &str = "protocol";
    /// Seconds between probes.
    pub const INTERVAL_SECONDS: &str = "intervalSeconds";
    /// Consecutive failures before unhealthy.
    pub const FAILURE_THRESHOLD: &str = "failureThreshold";
    /// Messaging broker version.
    pub const BROKER_VERSION: &str = "brokerVersion";
    /// Number of broker nodes.
    pub const BROKER_COUNT: &str = "brokerCount";
    /// Broker instance type.
    pub const INSTANCE_TYPE: &str = "instanceType";
    /// Broker distribution across availability zones.
    pub const BROKER_AZ_DISTRIBUTION: &str = "brokerAzDistribution";
    /// Network a node is placed in.
    pub const NETWORK_ID: &str = "networkId";
    /// Container cluster a service runs on.
    pub const CLUSTER_ID: &str = "clusterId";
    /// Database a service is attached to.
    pub const DATABASE_REF: &str = "databaseRef";
    /// Task definition a service runs.
    pub const TASK_DEFINITION_ID: &str = "taskDefinitionId";
    /// Task definition family.
    pub const FAMILY: &str = "family";
    /// CPU units.
    pub const CPU_UNITS: &str = "cpuUnits";
    /// Memory in MiB.
    pub const MEMORY_MIB: &str = "memoryMiB";
    /// Log group name.
    pub const LOG_GROUP: &str = "logGroup";
    /// Log retention in days.
    pub const LOG_RETENTION_DAYS: &str = "logRetentionDays";
    /// Log stream prefix.
    pub const STREAM_PREFIX: &str = "streamPrefix";
    /// Container image.
    pub const IMAGE: &str = "image";
    /// Container ports, in declaration order.
    pub const PORTS: &str = "ports";
    /// Composed container environment.
    pub const ENVIRONMENT: &str = "environment";
    /// Whether the service gets a public address.
    pub const PUBLICLY_REACHABLE: &str = "publiclyReachable";
    /// Number of task replicas.
    pub const DESIRED_COUNT: &str = "desiredCount";
    /// Grace period before load balancer health checks count.
    pub const HEALTH_CHECK_GRACE_PERIOD_SECONDS: &str = "healthCheckGracePeriodSeconds";
    /// Load balancer listener port.
    pub const LISTENER_PORT: &str = "listenerPort";
    /// Public entry point of a load-balanced service.
    pub const PUBLIC_ENDPOINT: &str = "publicEndpoint";
}

/// Attributes whose string value names another node and therefore implies
/// a dependency edge.
pub const REFERENCE_ATTRIBUTES: [&str; 5] = [
    attr::NETWORK_ID,
    attr::CLUSTER_ID,
    attr::DATABASE_REF,
    attr::TARGET_ID,
    attr::TASK_DEFINITION_ID,
];

/// Kinds a reference attribute may point at; empty for any other key.
#[must_use]
pub fn reference_targets(key: &str) -> &'static [ResourceKind] {
    match key {
        attr::NETWORK_ID => &[ResourceKind::Network],
        attr::CLUSTER_ID => &[ResourceKind::ContainerCluster],
        attr::DATABASE_REF => &[ResourceKind::Database],
        attr::TARGET_ID => &[
            ResourceKind::Database,
            ResourceKind::ContainerService,
            ResourceKind::LoadBalancedService,
        ],
        attr::TASK_DEFINITION_ID => &[ResourceKind::ContainerTaskDefinition],
        _ => &[],
    }
}

const NETWORK_ATTRS: &[&str] = &[attr::NAME, attr::AVAILABILITY_ZONE_COUNT];
const DATABASE_ATTRS: &[&str] = &[
    attr::ENGINE,
    attr::VERSION,
    attr::INSTANCE_CLASS,
    attr::STORAGE_GIB,
    attr::DATABASE_NAME,
    attr::CREDENTIALS_REF,
    attr::REMOVAL_POLICY,
    attr::NETWORK_ID,
    attr::ADDRESS,
    attr::PORT,
];
const HEALTH_CHECK_ATTRS: &[&str] = &[
    attr::TARGET_ID,
    attr::PROTOCOL,
    attr::INTERVAL_SECONDS,
    attr::FAILURE_THRESHOLD,
    attr::ADDRESS,
    attr::PORT,
];
const MESSAGING_CLUSTER_ATTRS: &[&str] = &[
    attr::NAME,
    attr::BROKER_VERSION,
    attr::BROKER_COUNT,
    attr::INSTANCE_TYPE,
    attr::NETWORK_ID,
];
const CONTAINER_CLUSTER_ATTRS: &[&str] = &[attr::NAME, attr::NETWORK_ID];
const TASK_DEFINITION_ATTRS: &[&str] = &[attr::FAMILY, attr::CPU_UNITS, attr::MEMORY_MIB, attr::CLUSTER_ID];
const CONTAINER_SERVICE_ATTRS: &[&str] = &[
    attr::IMAGE,
    attr::PORTS,
    attr::CPU_UNITS,
    attr::MEMORY_MIB,
    attr::ENVIRONMENT,
    attr::CLUSTER_ID,
    attr::NETWORK_ID,
    attr::PUBLICLY_REACHABLE,
];
const LOAD_BALANCED_SERVICE_ATTRS: &[&str] = &[
    attr::IMAGE,
    attr::PORTS,
    attr::CPU_UNITS,
    attr::MEMORY_MIB,
    attr::ENVIRONMENT,
    attr::CLUSTER_ID,
    attr::NETWORK_ID,
    attr::PUBLICLY_REACHABLE,
    attr::HEALTH_CHECK_GRACE_PERIOD_SECONDS,
    attr::PUBLIC_ENDPOINT,
];

/// Kind of infrastructure a node describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Virtual network.
    Network,
    /// Relational database instance.
    Database,
    /// Endpoint health check.
    HealthCheck,
    /// Message broker cluster.
    MessagingCluster,
    /// Container orchestration cluster.
    ContainerCluster,
    /// Task definition (resources and logging) for a container service.
    ContainerTaskDefinition,
    /// Long-running container service.
    ContainerService,
    /// Container service fronted by a public load balancer.
    LoadBalancedService,
}

impl ResourceKind {
    /// Attributes a node of this kind must carry to be synthesized.
    #[must_use]
    pub const fn required_attributes(self) -> &'static [&'static str] {
        match self {
            Self::Network => NETWORK_ATTRS,
            Self::Database => DATABASE_ATTRS,
            Self::HealthCheck => HEALTH_CHECK_ATTRS,
            Self::MessagingCluster => MESSAGING_CLUSTER_ATTRS,
            Self::ContainerCluster => CONTAINER_CLUSTER_ATTRS,
            Self::ContainerTaskDefinition => TASK_DEFINITION_ATTRS,
            Self::ContainerService => CONTAINER_SERVICE_ATTRS,
            Self::LoadBalancedService => LOAD_BALANCED_SERVICE_ATTRS,
        }
    }

    /// Returns `true` for both plain and load-balanced container services.
    #[must_use]
    pub const fn is_service(self) -> bool {
        matches!(self, Self::ContainerService | Self::LoadBalancedService)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "Network",
            Self::Database => "Database",
            Self::HealthCheck => "HealthCheck",
            Self::MessagingCluster => "MessagingCluster",
            Self::ContainerCluster => "ContainerCluster",
            Self::ContainerTaskDefinition => "ContainerTaskDefinition",
            Self::ContainerService => "ContainerService",
            Self::LoadBalancedService => "LoadBalancedService",
        };
        f.write_str(name)
    }
}

/// One declared unit of infrastructure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNode {
    id: ResourceId,
    kind: ResourceKind,
    attributes: Attributes,
    depends_on: BTreeSet<ResourceId>,
}

impl ResourceNode {
    /// Creates a node with no explicit dependencies.
    #[must_use]
    pub const fn new(id: ResourceId, kind: ResourceKind, attributes: Attributes) -> Self {
        Self {
            id,
            kind,
            attributes,
            depends_on: BTreeSet::new(),
        }
    }

    /// Returns a copy of this node with extra explicit dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, ids: impl IntoIterator<Item = ResourceId>) -> Self {
        self.depends_on.extend(ids);
        self
    }

    /// Node identifier.
    #[must_use]
    pub const fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Node kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// All attributes.
    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// A single attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// A string attribute; `None` if absent or not a string.
    #[must_use]
    pub fn str_attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// An unsigned integer attribute; `None` if absent or not an integer.
    #[must_use]
    pub fn u64_attr(&self, key: &str) -> Option<u64> {
        self.attributes.get(key).and_then(Value::as_u64)
    }

    /// Explicitly declared dependencies.
    #[must_use]
    pub const fn depends_on(&self) -> &BTreeSet<ResourceId> {
        &self.depends_on
    }

    pub(crate) fn insert_dependency(&mut self, id: ResourceId) -> bool {
        self.depends_on.insert(id)
    }

    /// Ids named by reference attributes, paired with the attribute name.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::InvalidNode`] if a reference attribute is present
    /// but is not a string.
    pub fn references(&self) -> Result<Vec<(&'static str, &str)>> {
        let mut refs = Vec::new();
        for key in REFERENCE_ATTRIBUTES {
            match self.attributes.get(key) {
                None | Some(Value::Null) => {}
                Some(Value::String(target)) => refs.push((key, target.as_str())),
                Some(other) => {
                    return Err(StackError::invalid_node(
                        self.id.as_str(),
                        format!("reference attribute `{key}` must be a string id, got {other}"),
                    ));
                }
            }
        }
        Ok(refs)
    }

    /// Every id this node must wait for: explicit edges plus references.
    ///
    /// # Errors
    ///
    /// Propagates [`ResourceNode::references`] errors.
    pub fn dependencies(&self) -> Result<BTreeSet<&str>> {
        let mut all: BTreeSet<&str> = self.depends_on.iter().map(ResourceId::as_str).collect();
        all.extend(self.references()?.into_iter().map(|(_, target)| target));
        Ok(all)
    }

    /// The `address`/`port` pair this node exposes, if it exposes one.
    #[must_use]
    pub fn endpoint(&self) -> Option<(&str, u64)> {
        Some((self.str_attr(attr::ADDRESS)?, self.u64_attr(attr::PORT)?))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn node(id: &str, kind: ResourceKind, attrs: Value) -> ResourceNode {
        let attributes = match attrs {
            Value::Object(map) => map.into_iter().collect(),
            _ => Attributes::new(),
        };
        ResourceNode::new(ResourceId::new(id).expect("id"), kind, attributes)
    }

    #[test]
    fn references_pick_up_known_attributes_only() {
        let svc = node(
            "svc",
            ResourceKind::ContainerService,
            json!({"clusterId": "cl", "networkId": "net", "image": "svc:latest"}),
        );
        let refs = svc.references().expect("refs");
        assert_eq!(refs, vec![("networkId", "net"), ("clusterId", "cl")]);
    }

    #[test]
    fn non_string_reference_is_invalid() {
        let db = node("db", ResourceKind::Database, json!({"networkId": 7}));
        let err = db.references().unwrap_err();
        assert!(err.to_string().contains("networkId"), "got: {err}");
    }

    #[test]
    fn null_reference_is_ignored() {
        let svc = node("svc", ResourceKind::ContainerService, json!({"databaseRef": null}));
        assert!(svc.references().expect("refs").is_empty());
    }

    #[test]
    fn dependencies_merge_explicit_and_implicit() {
        let svc = node("svc", ResourceKind::ContainerService, json!({"clusterId": "cl"}))
            .with_dependencies([ResourceId::new("db").expect("id"), ResourceId::new("cl").expect("id")]);
        let deps = svc.dependencies().expect("deps");
        assert_eq!(deps.into_iter().collect::<Vec<_>>(), vec!["cl", "db"]);
    }

    #[test]
    fn endpoint_requires_both_halves() {
        let db = node("db", ResourceKind::Database, json!({"address": "db.local", "port": 5432}));
        assert_eq!(db.endpoint(), Some(("db.local", 5432)));
        let half = node("x", ResourceKind::Database, json!({"address": "db.local"}));
        assert_eq!(half.endpoint(), None);
    }

    #[test]
    fn load_balanced_requirements_extend_service_requirements() {
        let base = ResourceKind::ContainerService.required_attributes();
        let lb = ResourceKind::LoadBalancedService.required_attributes();
        assert!(base.iter().all(|a| lb.contains(a)));
        assert!(lb.contains(&attr::PUBLIC_ENDPOINT));
    }

    #[test]
    fn every_reference_attribute_has_target_kinds() {
        for key in REFERENCE_ATTRIBUTES {
            assert!(!reference_targets(key).is_empty(), "{key}");
        }
        assert_eq!(reference_targets(attr::CLUSTER_ID), &[ResourceKind::ContainerCluster]);
        assert!(reference_targets(attr::TARGET_ID).contains(&ResourceKind::LoadBalancedService));
        assert!(reference_targets(attr::IMAGE).is_empty());
    }

    #[test]
    fn kind_serializes_as_variant_name() {
        let json = serde_json::to_string(&ResourceKind::LoadBalancedService).expect("serialize");
        assert_eq!(json, "\"LoadBalancedService\"");
        assert_eq!(ResourceKind::HealthCheck.to_string(), "HealthCheck");
    }
}
