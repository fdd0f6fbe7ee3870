//! Typed declarations and one factory per resource kind.
//!
//! Each factory takes a fully populated spec, validates it, and returns an
//! immutable [`ResourceNode`]. References to other nodes are ids only; the
//! graph turns them into dependency edges.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use stackplan_common::config::{DatabaseDefaults, HealthCheckDefaults, ServiceDefaults};
use stackplan_common::constants;
use stackplan_common::error::{Result, StackError};
use stackplan_common::types::ResourceId;

use crate::model::{Attributes, ResourceKind, ResourceNode, Value, attr};

/// What happens to a resource when its stack is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalPolicy {
    /// Delete the resource.
    #[default]
    Destroy,
    /// Keep the resource.
    Retain,
    /// Keep a final snapshot, then delete.
    Snapshot,
}

impl RemovalPolicy {
    /// Wire name used in descriptors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Destroy => "DESTROY",
            Self::Retain => "RETAIN",
            Self::Snapshot => "SNAPSHOT",
        }
    }
}

/// Health check probe protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthCheckProtocol {
    /// Plain TCP connect.
    #[default]
    Tcp,
    /// HTTP GET.
    Http,
    /// HTTPS GET.
    Https,
}

impl HealthCheckProtocol {
    /// Wire name used in descriptors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
        }
    }
}

/// Opaque handle to database credentials held by an external secret store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialsRef(String);

impl CredentialsRef {
    /// Wraps an existing handle.
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Handle for credentials generated alongside the given database.
    #[must_use]
    pub fn generated_for(database_id: &str) -> Self {
        Self(format!("secret://{database_id}/credentials"))
    }

    /// The handle string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Virtual network declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    /// Network name.
    pub name: String,
    /// Number of availability zones to span.
    pub availability_zone_count: u8,
}

/// Relational database declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSpec {
    /// Engine name.
    pub engine: String,
    /// Engine version.
    pub version: String,
    /// Instance class.
    pub instance_class: String,
    /// Allocated storage, in GiB.
    pub storage_gib: u32,
    /// Logical database name.
    pub database_name: String,
    /// Master username.
    pub username: String,
    /// Credentials handle.
    pub credentials_ref: CredentialsRef,
    /// Teardown behavior.
    pub removal_policy: RemovalPolicy,
    /// Network the instance is placed in.
    pub network_id: String,
    /// Endpoint host.
    pub address: String,
    /// Endpoint port.
    pub port: u16,
}

impl DatabaseSpec {
    /// Builds a spec from configured defaults, deriving the endpoint address
    /// and the credentials handle from the database id.
    #[must_use]
    pub fn from_defaults(
        defaults: &DatabaseDefaults,
        id: &str,
        database_name: impl Into<String>,
        network_id: impl Into<String>,
    ) -> Self {
        Self {
            engine: defaults.engine.clone(),
            version: defaults.version.clone(),
            instance_class: defaults.instance_class.clone(),
            storage_gib: defaults.storage_gib,
            database_name: database_name.into(),
            username: defaults.username.clone(),
            credentials_ref: CredentialsRef::generated_for(id),
            removal_policy: RemovalPolicy::Destroy,
            network_id: network_id.into(),
            address: format!("{id}.{}", defaults.endpoint_suffix),
            port: defaults.port,
        }
    }
}

/// Health check declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckSpec {
    /// Probe protocol.
    pub protocol: HealthCheckProtocol,
    /// Seconds between probes.
    pub interval_seconds: u32,
    /// Consecutive failures before unhealthy.
    pub failure_threshold: u32,
}

impl HealthCheckSpec {
    /// A TCP check using configured defaults.
    #[must_use]
    pub const fn tcp(defaults: &HealthCheckDefaults) -> Self {
        Self {
            protocol: HealthCheckProtocol::Tcp,
            interval_seconds: defaults.interval_seconds,
            failure_threshold: defaults.failure_threshold,
        }
    }
}

/// Message broker cluster declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingClusterSpec {
    /// Cluster name.
    pub name: String,
    /// Broker software version.
    pub broker_version: String,
    /// Number of broker nodes.
    pub broker_count: u32,
    /// Broker instance type.
    pub instance_type: String,
    /// Broker placement across availability zones.
    pub broker_az_distribution: String,
    /// Network the brokers are placed in.
    pub network_id: String,
}

/// Container cluster declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerClusterSpec {
    /// Cluster name.
    pub name: String,
    /// Network the cluster runs in.
    pub network_id: String,
}

/// Task definition declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinitionSpec {
    /// Task family.
    pub family: String,
    /// CPU units.
    pub cpu_units: u32,
    /// Memory, in MiB.
    pub memory_mib: u32,
    /// Log group name.
    pub log_group: String,
    /// Log retention, in days.
    pub log_retention_days: u32,
    /// Log stream prefix.
    pub stream_prefix: String,
    /// Cluster the tasks are scheduled on.
    pub cluster_id: String,
}

impl TaskDefinitionSpec {
    /// A task definition for `image` on `cluster_id` using configured
    /// defaults, logging to `/ecs/<image>`.
    #[must_use]
    pub fn from_defaults(defaults: &ServiceDefaults, image: &str, cluster_id: &str) -> Self {
        Self {
            family: image.to_string(),
            cpu_units: defaults.cpu_units,
            memory_mib: defaults.memory_mib,
            log_group: format!("/ecs/{image}"),
            log_retention_days: defaults.log_retention_days,
            stream_prefix: image.to_string(),
            cluster_id: cluster_id.to_string(),
        }
    }
}

/// Container service declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerServiceSpec {
    /// Container image.
    pub image: String,
    /// Exposed ports, in order; the first is the service's health endpoint.
    pub ports: Vec<u16>,
    /// CPU units.
    pub cpu_units: u32,
    /// Memory, in MiB.
    pub memory_mib: u32,
    /// Final environment, as produced by [`crate::env::compose_environment`].
    pub environment: BTreeMap<String, String>,
    /// Cluster the service runs on.
    pub cluster_id: String,
    /// Network the service runs in.
    pub network_id: String,
    /// Whether the service is publicly reachable.
    pub publicly_reachable: bool,
    /// Attached database, if any.
    pub database_ref: Option<String>,
    /// Task definition, if declared separately.
    pub task_definition_id: Option<String>,
    /// Number of replicas.
    pub desired_count: u32,
}

/// Load-balanced container service declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancedServiceSpec {
    /// Underlying service.
    pub service: ContainerServiceSpec,
    /// Seconds before load balancer health checks count.
    pub health_check_grace_period_seconds: u32,
    /// Public listener port.
    pub listener_port: u16,
}

fn parse_id(raw: &str) -> Result<ResourceId> {
    ResourceId::new(raw)
}

fn require(id: &ResourceId, ok: bool, reason: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(StackError::invalid_node(id.as_str(), reason))
    }
}

fn require_non_empty(id: &ResourceId, value: &str, field: &str) -> Result<()> {
    require(id, !value.trim().is_empty(), &format!("{field} must not be empty"))
}

fn reference(id: &ResourceId, target: &str, field: &str) -> Result<Value> {
    let target = ResourceId::new(target).map_err(|_| {
        StackError::invalid_node(id.as_str(), format!("{field} {target:?} is not a valid resource id"))
    })?;
    require(id, &target != id, &format!("{field} must not point at the node itself"))?;
    Ok(Value::String(target.into()))
}

/// Declares a virtual network.
///
/// # Errors
///
/// Returns [`StackError::InvalidNode`] for an empty name or zero zones.
pub fn network(id: &str, spec: &NetworkSpec) -> Result<ResourceNode> {
    let id = parse_id(id)?;
    require_non_empty(&id, &spec.name, "name")?;
    require(&id, spec.availability_zone_count > 0, "availabilityZoneCount must be at least 1")?;

    let mut attributes = Attributes::new();
    let _ = attributes.insert(attr::NAME.into(), json!(spec.name));
    let _ = attributes.insert(
        attr::AVAILABILITY_ZONE_COUNT.into(),
        json!(spec.availability_zone_count),
    );
    Ok(ResourceNode::new(id, ResourceKind::Network, attributes))
}

/// Declares a relational database.
///
/// # Errors
///
/// Returns [`StackError::InvalidNode`] for empty names, zero storage or port,
/// or an invalid network reference.
pub fn database(id: &str, spec: &DatabaseSpec) -> Result<ResourceNode> {
    let id = parse_id(id)?;
    require_non_empty(&id, &spec.engine, "engine")?;
    require_non_empty(&id, &spec.version, "version")?;
    require_non_empty(&id, &spec.database_name, "databaseName")?;
    require_non_empty(&id, &spec.username, "username")?;
    require_non_empty(&id, spec.credentials_ref.as_str(), "credentialsRef")?;
    require_non_empty(&id, &spec.address, "address")?;
    require(&id, spec.storage_gib > 0, "storageGiB must be positive")?;
    require(&id, spec.port > 0, "port must be positive")?;
    let network = reference(&id, &spec.network_id, attr::NETWORK_ID)?;

    let mut attributes = Attributes::new();
    let _ = attributes.insert(attr::ENGINE.into(), json!(spec.engine));
    let _ = attributes.insert(attr::VERSION.into(), json!(spec.version));
    let _ = attributes.insert(attr::INSTANCE_CLASS.into(), json!(spec.instance_class));
    let _ = attributes.insert(attr::STORAGE_GIB.into(), json!(spec.storage_gib));
    let _ = attributes.insert(attr::DATABASE_NAME.into(), json!(spec.database_name));
    let _ = attributes.insert(attr::USERNAME.into(), json!(spec.username));
    let _ = attributes.insert(attr::CREDENTIALS_REF.into(), json!(spec.credentials_ref.as_str()));
    let _ = attributes.insert(attr::REMOVAL_POLICY.into(), json!(spec.removal_policy.as_str()));
    let _ = attributes.insert(attr::NETWORK_ID.into(), network);
    let _ = attributes.insert(attr::ADDRESS.into(), json!(spec.address));
    let _ = attributes.insert(attr::PORT.into(), json!(spec.port));
    Ok(ResourceNode::new(id, ResourceKind::Database, attributes))
}

/// Declares a health check against `target`, copying its endpoint literally.
///
/// # Errors
///
/// Returns [`StackError::InvalidNode`] if the target exposes no
/// `address`/`port` pair, or the interval or threshold is zero.
pub fn health_check(id: &str, spec: &HealthCheckSpec, target: &ResourceNode) -> Result<ResourceNode> {
    let id = parse_id(id)?;
    require(&id, spec.interval_seconds > 0, "intervalSeconds must be positive")?;
    require(&id, spec.failure_threshold > 0, "failureThreshold must be positive")?;
    let Some((address, port)) = target.endpoint() else {
        return Err(StackError::invalid_node(
            id.as_str(),
            format!("health check target {} exposes no address/port", target.id()),
        ));
    };
    let target_ref = reference(&id, target.id().as_str(), attr::TARGET_ID)?;

    let mut attributes = Attributes::new();
    let _ = attributes.insert(attr::TARGET_ID.into(), target_ref);
    let _ = attributes.insert(attr::PROTOCOL.into(), json!(spec.protocol.as_str()));
    let _ = attributes.insert(attr::INTERVAL_SECONDS.into(), json!(spec.interval_seconds));
    let _ = attributes.insert(attr::FAILURE_THRESHOLD.into(), json!(spec.failure_threshold));
    let _ = attributes.insert(attr::ADDRESS.into(), json!(address));
    let _ = attributes.insert(attr::PORT.into(), json!(port));
    Ok(ResourceNode::new(id, ResourceKind::HealthCheck, attributes))
}

/// Declares a message broker cluster.
///
/// # Errors
///
/// Returns [`StackError::InvalidNode`] for empty names or zero brokers.
pub fn messaging_cluster(id: &str, spec: &MessagingClusterSpec) -> Result<ResourceNode> {
    let id = parse_id(id)?;
    require_non_empty(&id, &spec.name, "name")?;
    require_non_empty(&id, &spec.broker_version, "brokerVersion")?;
    require_non_empty(&id, &spec.instance_type, "instanceType")?;
    require(&id, spec.broker_count > 0, "brokerCount must be at least 1")?;
    let network = reference(&id, &spec.network_id, attr::NETWORK_ID)?;

    let mut attributes = Attributes::new();
    let _ = attributes.insert(attr::NAME.into(), json!(spec.name));
    let _ = attributes.insert(attr::BROKER_VERSION.into(), json!(spec.broker_version));
    let _ = attributes.insert(attr::BROKER_COUNT.into(), json!(spec.broker_count));
    let _ = attributes.insert(attr::INSTANCE_TYPE.into(), json!(spec.instance_type));
    let _ = attributes.insert(
        attr::BROKER_AZ_DISTRIBUTION.into(),
        json!(spec.broker_az_distribution),
    );
    let _ = attributes.insert(attr::NETWORK_ID.into(), network);
    Ok(ResourceNode::new(id, ResourceKind::MessagingCluster, attributes))
}

/// Declares a container orchestration cluster.
///
/// # Errors
///
/// Returns [`StackError::InvalidNode`] for an empty name.
pub fn container_cluster(id: &str, spec: &ContainerClusterSpec) -> Result<ResourceNode> {
    let id = parse_id(id)?;
    require_non_empty(&id, &spec.name, "name")?;
    let network = reference(&id, &spec.network_id, attr::NETWORK_ID)?;

    let mut attributes = Attributes::new();
    let _ = attributes.insert(attr::NAME.into(), json!(spec.name));
    let _ = attributes.insert(attr::NETWORK_ID.into(), network);
    Ok(ResourceNode::new(id, ResourceKind::ContainerCluster, attributes))
}

/// Declares a task definition.
///
/// # Errors
///
/// Returns [`StackError::InvalidNode`] for an empty family, zero CPU/memory
/// or an invalid cluster reference.
pub fn task_definition(id: &str, spec: &TaskDefinitionSpec) -> Result<ResourceNode> {
    let id = parse_id(id)?;
    require_non_empty(&id, &spec.family, "family")?;
    require(&id, spec.cpu_units > 0, "cpuUnits must be positive")?;
    require(&id, spec.memory_mib > 0, "memoryMiB must be positive")?;
    let cluster = reference(&id, &spec.cluster_id, attr::CLUSTER_ID)?;

    let mut attributes = Attributes::new();
    let _ = attributes.insert(attr::FAMILY.into(), json!(spec.family));
    let _ = attributes.insert(attr::CPU_UNITS.into(), json!(spec.cpu_units));
    let _ = attributes.insert(attr::MEMORY_MIB.into(), json!(spec.memory_mib));
    let _ = attributes.insert(attr::LOG_GROUP.into(), json!(spec.log_group));
    let _ = attributes.insert(attr::LOG_RETENTION_DAYS.into(), json!(spec.log_retention_days));
    let _ = attributes.insert(attr::STREAM_PREFIX.into(), json!(spec.stream_prefix));
    let _ = attributes.insert(attr::CLUSTER_ID.into(), cluster);
    Ok(ResourceNode::new(id, ResourceKind::ContainerTaskDefinition, attributes))
}

fn service_attributes(id: &ResourceId, spec: &ContainerServiceSpec) -> Result<Attributes> {
    require_non_empty(id, &spec.image, "image")?;
    require(id, !spec.ports.is_empty(), "ports must not be empty")?;
    require(id, spec.ports.iter().all(|p| *p > 0), "ports must be positive")?;
    require(id, spec.cpu_units > 0, "cpuUnits must be positive")?;
    require(id, spec.memory_mib > 0, "memoryMiB must be positive")?;
    require(id, spec.desired_count > 0, "desiredCount must be at least 1")?;
    let cluster = reference(id, &spec.cluster_id, attr::CLUSTER_ID)?;
    let network = reference(id, &spec.network_id, attr::NETWORK_ID)?;

    let mut attributes = Attributes::new();
    let _ = attributes.insert(attr::IMAGE.into(), json!(spec.image));
    let _ = attributes.insert(attr::PORTS.into(), json!(spec.ports));
    let _ = attributes.insert(attr::CPU_UNITS.into(), json!(spec.cpu_units));
    let _ = attributes.insert(attr::MEMORY_MIB.into(), json!(spec.memory_mib));
    let _ = attributes.insert(attr::ENVIRONMENT.into(), json!(spec.environment));
    let _ = attributes.insert(attr::CLUSTER_ID.into(), cluster);
    let _ = attributes.insert(attr::NETWORK_ID.into(), network);
    let _ = attributes.insert(attr::PUBLICLY_REACHABLE.into(), json!(spec.publicly_reachable));
    let _ = attributes.insert(attr::DESIRED_COUNT.into(), json!(spec.desired_count));
    let _ = attributes.insert(attr::ADDRESS.into(), json!(id.as_str()));
    let _ = attributes.insert(attr::PORT.into(), json!(spec.ports[0]));
    if let Some(db) = &spec.database_ref {
        let _ = attributes.insert(attr::DATABASE_REF.into(), reference(id, db, attr::DATABASE_REF)?);
    }
    if let Some(task) = &spec.task_definition_id {
        let _ = attributes.insert(
            attr::TASK_DEFINITION_ID.into(),
            reference(id, task, attr::TASK_DEFINITION_ID)?,
        );
    }
    Ok(attributes)
}

/// Declares a container service.
///
/// The service exposes `address` (its id) and `port` (its first port) so it
/// can be the target of a health check.
///
/// # Errors
///
/// Returns [`StackError::InvalidNode`] for an empty image, no ports, zero
/// resources, or invalid references.
pub fn container_service(id: &str, spec: &ContainerServiceSpec) -> Result<ResourceNode> {
    let id = parse_id(id)?;
    let attributes = service_attributes(&id, spec)?;
    Ok(ResourceNode::new(id, ResourceKind::ContainerService, attributes))
}

/// Declares a load-balanced container service with a public entry point.
///
/// # Errors
///
/// Same as [`container_service`], plus a zero listener port.
pub fn load_balanced_service(id: &str, spec: &LoadBalancedServiceSpec) -> Result<ResourceNode> {
    let id = parse_id(id)?;
    require(&id, spec.listener_port > 0, "listenerPort must be positive")?;
    let mut attributes = service_attributes(&id, &spec.service)?;
    let _ = attributes.insert(
        attr::HEALTH_CHECK_GRACE_PERIOD_SECONDS.into(),
        json!(spec.health_check_grace_period_seconds),
    );
    let _ = attributes.insert(attr::LISTENER_PORT.into(), json!(spec.listener_port));
    let _ = attributes.insert(
        attr::PUBLIC_ENDPOINT.into(),
        json!(format!(
            "http://{id}.{}:{}",
            constants::PUBLIC_ENDPOINT_SUFFIX,
            spec.listener_port
        )),
    );
    Ok(ResourceNode::new(id, ResourceKind::LoadBalancedService, attributes))
}
