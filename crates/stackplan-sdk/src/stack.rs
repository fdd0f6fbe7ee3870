//! Stack lifecycle: declare, seal, resolve, synthesize.
//!
//! [`Stack`] owns the planner configuration, the graph builder and the
//! artifacts of each phase. Phases only move forward
//! (`Building → Sealed → Resolved → Synthesized`); each step checks the
//! current phase before doing any work.

use std::path::{Path, PathBuf};

use stackplan_common::config::PlannerConfig;
use stackplan_common::error::{Result, StackError};
use stackplan_common::types::{Phase, ResourceId};
use stackplan_graph::env::{Environment, compose_environment};
use stackplan_graph::graph::{GraphBuilder, ResourceGraph};
use stackplan_graph::model::ResourceNode;
use stackplan_graph::plan::{OrderedPlan, resolve};
use stackplan_graph::resources::{
    self, ContainerClusterSpec, ContainerServiceSpec, DatabaseSpec, HealthCheckSpec,
    LoadBalancedServiceSpec, MessagingClusterSpec, NetworkSpec, TaskDefinitionSpec,
};
use stackplan_graph::synth::{DeploymentDescriptor, synthesize};

/// Declaration of a container service, before defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDecl {
    /// Container image.
    pub image: String,
    /// Exposed ports; the first one is the service's health-check port.
    pub ports: Vec<u16>,
    /// Owning container cluster id.
    pub cluster_id: String,
    /// Network id.
    pub network_id: String,
    /// Attached database id, if any.
    pub database_ref: Option<String>,
    /// Task definition id, if any.
    pub task_definition_id: Option<String>,
    /// Caller-supplied environment entries.
    pub overrides: Option<Environment>,
    /// Explicit dependencies on already-declared nodes.
    pub depends_on: Vec<String>,
    /// Whether the service gets a public address.
    pub publicly_reachable: bool,
    /// Number of running copies.
    pub desired_count: u32,
}

impl ServiceDecl {
    /// A private, single-copy service with no database and no overrides.
    #[must_use]
    pub fn new(
        image: impl Into<String>,
        ports: Vec<u16>,
        cluster_id: impl Into<String>,
        network_id: impl Into<String>,
    ) -> Self {
        Self {
            image: image.into(),
            ports,
            cluster_id: cluster_id.into(),
            network_id: network_id.into(),
            database_ref: None,
            task_definition_id: None,
            overrides: None,
            depends_on: Vec::new(),
            publicly_reachable: false,
            desired_count: 1,
        }
    }
}

/// Output format of a written descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DescriptorFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// YAML.
    Yaml,
}

impl DescriptorFormat {
    /// File extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

/// A stack being planned.
#[derive(Debug)]
pub struct Stack {
    config: PlannerConfig,
    builder: GraphBuilder,
    phase: Phase,
    graph: Option<ResourceGraph>,
    plan: Option<OrderedPlan>,
    descriptor: Option<DeploymentDescriptor>,
}

impl Default for Stack {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

impl Stack {
    /// Starts an empty stack in the `Building` phase.
    #[must_use]
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            builder: GraphBuilder::new(),
            phase: Phase::Building,
            graph: None,
            plan: None,
            descriptor: None,
        }
    }

    /// Configuration the stack was created with.
    #[must_use]
    pub const fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of declared nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph
            .as_ref()
            .map_or_else(|| self.builder.len(), ResourceGraph::len)
    }

    /// Returns `true` if nothing has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of a declared node while the stack is building.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::UnknownId`] for an undeclared id, or
    /// [`StackError::SealedGraph`] once sealed.
    pub fn node(&self, id: &str) -> Result<ResourceNode> {
        self.builder.node(id)
    }

    /// Adds a node built elsewhere and returns its id.
    ///
    /// # Errors
    ///
    /// Propagates [`GraphBuilder::add_node`] errors.
    pub fn add(&self, node: ResourceNode) -> Result<ResourceId> {
        let id = node.id().clone();
        self.builder.add_node(node)?;
        Ok(id)
    }

    /// Declares that `from` must wait for `to`.
    ///
    /// # Errors
    ///
    /// Propagates [`GraphBuilder::add_dependency`] errors.
    pub fn depends_on(&self, from: &str, to: &str) -> Result<()> {
        self.builder.add_dependency(from, to)
    }

    /// Declares a network.
    ///
    /// # Errors
    ///
    /// Propagates factory and builder errors.
    pub fn network(&self, id: &str, name: &str, availability_zone_count: u8) -> Result<ResourceId> {
        self.add(resources::network(
            id,
            &NetworkSpec {
                name: name.to_string(),
                availability_zone_count,
            },
        )?)
    }

    /// Declares a database using configured defaults.
    ///
    /// # Errors
    ///
    /// Propagates factory and builder errors.
    pub fn database(&self, id: &str, database_name: &str, network_id: &str) -> Result<ResourceId> {
        let spec = DatabaseSpec::from_defaults(&self.config.database, id, database_name, network_id);
        self.database_with(id, &spec)
    }

    /// Declares a database from a full spec.
    ///
    /// # Errors
    ///
    /// Propagates factory and builder errors.
    pub fn database_with(&self, id: &str, spec: &DatabaseSpec) -> Result<ResourceId> {
        self.add(resources::database(id, spec)?)
    }

    /// Declares a TCP health check against an already-declared target.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::UnknownId`] if the target is not declared, plus
    /// factory and builder errors.
    pub fn health_check(&self, id: &str, target_id: &str) -> Result<ResourceId> {
        let target = self.builder.node(target_id)?;
        let spec = HealthCheckSpec::tcp(&self.config.health_check);
        self.add(resources::health_check(id, &spec, &target)?)
    }

    /// Declares a messaging cluster.
    ///
    /// # Errors
    ///
    /// Propagates factory and builder errors.
    pub fn messaging_cluster(&self, id: &str, spec: &MessagingClusterSpec) -> Result<ResourceId> {
        self.add(resources::messaging_cluster(id, spec)?)
    }

    /// Declares a container cluster.
    ///
    /// # Errors
    ///
    /// Propagates factory and builder errors.
    pub fn container_cluster(&self, id: &str, name: &str, network_id: &str) -> Result<ResourceId> {
        self.add(resources::container_cluster(
            id,
            &ContainerClusterSpec {
                name: name.to_string(),
                network_id: network_id.to_string(),
            },
        )?)
    }

    /// Declares a task definition for `image` on `cluster_id` using
    /// configured defaults.
    ///
    /// # Errors
    ///
    /// Propagates factory and builder errors.
    pub fn task_definition(&self, id: &str, image: &str, cluster_id: &str) -> Result<ResourceId> {
        let spec = TaskDefinitionSpec::from_defaults(&self.config.service, image, cluster_id);
        self.add(resources::task_definition(id, &spec)?)
    }

    fn service_spec(&self, id: &str, decl: &ServiceDecl) -> Result<ContainerServiceSpec> {
        let database = match &decl.database_ref {
            Some(db) => Some(self.builder.node(db)?),
            None => None,
        };
        let environment =
            compose_environment(&self.config.composer, decl.overrides.as_ref(), database.as_ref())?;
        tracing::debug!(id, keys = environment.len(), "environment composed");
        Ok(ContainerServiceSpec {
            image: decl.image.clone(),
            ports: decl.ports.clone(),
            cpu_units: self.config.service.cpu_units,
            memory_mib: self.config.service.memory_mib,
            environment,
            cluster_id: decl.cluster_id.clone(),
            network_id: decl.network_id.clone(),
            publicly_reachable: decl.publicly_reachable,
            database_ref: decl.database_ref.clone(),
            task_definition_id: decl.task_definition_id.clone(),
            desired_count: decl.desired_count,
        })
    }

    fn explicit_dependencies(decl: &ServiceDecl) -> Result<Vec<ResourceId>> {
        decl.depends_on.iter().map(ResourceId::new).collect()
    }

    /// Declares a container service, composing its environment first.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::UnknownId`] if the attached database or an
    /// explicit dependency is not declared, plus composer, factory and
    /// builder errors.
    pub fn service(&self, id: &str, decl: &ServiceDecl) -> Result<ResourceId> {
        let spec = self.service_spec(id, decl)?;
        let node = resources::container_service(id, &spec)?
            .with_dependencies(Self::explicit_dependencies(decl)?);
        self.add(node)
    }

    /// Declares a load-balanced service with a public listener.
    ///
    /// # Errors
    ///
    /// Same as [`Stack::service`].
    pub fn load_balanced_service(
        &self,
        id: &str,
        decl: &ServiceDecl,
        listener_port: u16,
    ) -> Result<ResourceId> {
        let spec = LoadBalancedServiceSpec {
            service: self.service_spec(id, decl)?,
            health_check_grace_period_seconds: self.config.service.health_check_grace_period_seconds,
            listener_port,
        };
        let node = resources::load_balanced_service(id, &spec)?
            .with_dependencies(Self::explicit_dependencies(decl)?);
        self.add(node)
    }

    /// Freezes the graph.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::IllegalStateTransition`] unless building.
    pub fn seal(&mut self) -> Result<&ResourceGraph> {
        let next = self.phase.advance(Phase::Sealed)?;
        let graph = self.builder.seal()?;
        self.phase = next;
        Ok(self.graph.insert(graph))
    }

    /// Resolves the sealed graph into a layered plan.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::IllegalStateTransition`] unless sealed, plus
    /// every [`resolve`] error. A failed resolution leaves the stack sealed.
    pub fn resolve(&mut self) -> Result<&OrderedPlan> {
        let next = self.phase.advance(Phase::Resolved)?;
        let graph = self.graph.as_ref().ok_or(StackError::IllegalStateTransition {
            from: self.phase,
            to: next,
        })?;
        let plan = resolve(graph)?;
        self.phase = next;
        Ok(self.plan.insert(plan))
    }

    /// Synthesizes the deployment descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::IllegalStateTransition`] unless resolved, plus
    /// every [`synthesize`] error.
    pub fn synthesize(&mut self) -> Result<&DeploymentDescriptor> {
        let next = self.phase.advance(Phase::Synthesized)?;
        let (Some(graph), Some(plan)) = (self.graph.as_ref(), self.plan.as_ref()) else {
            return Err(StackError::IllegalStateTransition {
                from: self.phase,
                to: next,
            });
        };
        let descriptor = synthesize(graph, plan)?;
        self.phase = next;
        Ok(self.descriptor.insert(descriptor))
    }

    /// Runs every remaining phase up to `Synthesized`.
    ///
    /// # Errors
    ///
    /// Propagates the first failing phase's error.
    pub fn plan_all(&mut self) -> Result<&DeploymentDescriptor> {
        if self.phase == Phase::Building {
            let _ = self.seal()?;
        }
        if self.phase == Phase::Sealed {
            let _ = self.resolve()?;
        }
        self.synthesize()
    }

    /// Sealed graph, once sealed.
    #[must_use]
    pub const fn graph(&self) -> Option<&ResourceGraph> {
        self.graph.as_ref()
    }

    /// Resolved plan, once resolved.
    #[must_use]
    pub const fn plan(&self) -> Option<&OrderedPlan> {
        self.plan.as_ref()
    }

    /// Synthesized descriptor, once synthesized.
    #[must_use]
    pub const fn descriptor(&self) -> Option<&DeploymentDescriptor> {
        self.descriptor.as_ref()
    }

    /// Writes the descriptor to `<dir>/<stack_name>.descriptor.<ext>`.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::IllegalStateTransition`] before synthesis, or
    /// [`StackError::Io`] if the directory or file cannot be written.
    pub fn write_descriptor(&self, dir: &Path, format: DescriptorFormat) -> Result<PathBuf> {
        let Some(descriptor) = &self.descriptor else {
            return Err(StackError::IllegalStateTransition {
                from: self.phase,
                to: Phase::Synthesized,
            });
        };
        let body = match format {
            DescriptorFormat::Json => descriptor.to_json_pretty()?,
            DescriptorFormat::Yaml => descriptor.to_yaml()?,
        };
        std::fs::create_dir_all(dir).map_err(|e| StackError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = dir.join(format!(
            "{}.descriptor.{}",
            self.config.stack_name,
            format.extension()
        ));
        std::fs::write(&path, body).map_err(|e| StackError::Io {
            path: path.clone(),
            source: e,
        })?;
        tracing::info!(path = %path.display(), "descriptor written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use stackplan_graph::env::{DATASOURCE_URL, MESSAGE_BUS_BOOTSTRAP};
    use stackplan_graph::model::{ResourceKind, attr};

    use super::*;

    fn building() -> Stack {
        let stack = Stack::default();
        let _ = stack.network("net-1", "vpc", 2).expect("network");
        let _ = stack.database("db-1", "orders", "net-1").expect("database");
        let _ = stack.container_cluster("cl-1", "ecs", "net-1").expect("cluster");
        stack
    }

    #[test]
    fn service_with_database_gets_datasource_env() {
        let stack = building();
        let mut decl = ServiceDecl::new("orders", vec![4000], "cl-1", "net-1");
        decl.database_ref = Some("db-1".into());
        let _ = stack.service("svc-1", &decl).expect("service");

        let node = stack.node("svc-1").expect("node");
        let env = node.attribute(attr::ENVIRONMENT).expect("env");
        assert_eq!(
            env[DATASOURCE_URL],
            "jdbc:postgresql://db-1.rds.localhost.localstack.cloud:5432/orders"
        );
        assert!(env.get(MESSAGE_BUS_BOOTSTRAP).is_some());
    }

    #[test]
    fn service_attached_to_unknown_database_fails() {
        let stack = building();
        let mut decl = ServiceDecl::new("orders", vec![4000], "cl-1", "net-1");
        decl.database_ref = Some("ghost".into());
        let err = stack.service("svc-1", &decl).unwrap_err();
        assert!(matches!(err, StackError::UnknownId { ref id } if id == "ghost"));
        assert!(!stack.builder.contains("svc-1"));
    }

    #[test]
    fn health_check_needs_declared_target() {
        let stack = building();
        let err = stack.health_check("hc-1", "db-2").unwrap_err();
        assert!(matches!(err, StackError::UnknownId { .. }));
        let _ = stack.health_check("hc-1", "db-1").expect("health check");
        assert_eq!(stack.node("hc-1").expect("node").kind(), ResourceKind::HealthCheck);
    }

    #[test]
    fn task_definition_follows_its_cluster() {
        let mut stack = building();
        let _ = stack.task_definition("orders-task", "orders", "cl-1").expect("task");
        let mut decl = ServiceDecl::new("orders", vec![4000], "cl-1", "net-1");
        decl.task_definition_id = Some("orders-task".into());
        let _ = stack.service("svc-1", &decl).expect("service");
        let _ = stack.plan_all().expect("plan");

        let plan = stack.plan().expect("plan");
        let layer = |id: &str| plan.layer_of(id).expect("placed");
        assert!(layer("cl-1") < layer("orders-task"));
        assert!(layer("orders-task") < layer("svc-1"));
        let task = stack.descriptor().and_then(|d| d.resource("orders-task")).expect("fragment");
        assert_eq!(task.attributes[attr::CLUSTER_ID], "cl-1");
        assert_eq!(task.depends_on, vec![ResourceId::new("cl-1").expect("id")]);
    }

    #[test]
    fn second_cluster_and_health_check_are_rejected() {
        let stack = building();
        let err = stack.container_cluster("cl-2", "ecs", "net-1").unwrap_err();
        assert!(matches!(err, StackError::InvalidNode { ref id, .. } if id == "cl-2"));

        let _ = stack.health_check("hc-1", "db-1").expect("health check");
        let err = stack.health_check("hc-2", "db-1").unwrap_err();
        assert!(matches!(err, StackError::InvalidNode { ref id, .. } if id == "hc-2"));
        assert_eq!(stack.len(), 4);
    }

    #[test]
    fn phases_only_move_forward() {
        let mut stack = building();
        assert!(matches!(
            stack.resolve().unwrap_err(),
            StackError::IllegalStateTransition {
                from: Phase::Building,
                to: Phase::Resolved
            }
        ));
        assert!(matches!(
            stack.synthesize().unwrap_err(),
            StackError::IllegalStateTransition { .. }
        ));

        let _ = stack.seal().expect("seal");
        assert_eq!(stack.phase(), Phase::Sealed);
        assert!(matches!(
            stack.network("net-2", "vpc", 1).unwrap_err(),
            StackError::SealedGraph { .. }
        ));
        assert!(matches!(
            stack.seal().unwrap_err(),
            StackError::IllegalStateTransition { .. }
        ));

        let _ = stack.resolve().expect("resolve");
        let _ = stack.synthesize().expect("synthesize");
        assert_eq!(stack.phase(), Phase::Synthesized);
        assert!(stack.resolve().is_err());
        assert!(stack.synthesize().is_err());
    }

    #[test]
    fn failed_resolution_leaves_stack_sealed() {
        let mut stack = building();
        stack.depends_on("net-1", "cl-1").expect("edge");
        let _ = stack.seal().expect("seal");
        assert!(matches!(
            stack.resolve().unwrap_err(),
            StackError::CyclicDependency { .. }
        ));
        assert_eq!(stack.phase(), Phase::Sealed);
        assert!(stack.plan().is_none());
    }

    #[test]
    fn plan_all_runs_remaining_phases() {
        let mut stack = building();
        let descriptor = stack.plan_all().expect("plan");
        assert_eq!(descriptor.len(), 3);
        assert_eq!(stack.len(), 3);
        assert!(stack.graph().is_some());
        assert!(stack.plan().is_some());
    }

    #[test]
    fn write_descriptor_before_synthesis_fails() {
        let stack = building();
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(stack.write_descriptor(dir.path(), DescriptorFormat::Json).is_err());
    }

    #[test]
    fn write_descriptor_names_file_after_stack() {
        let mut stack = building();
        let _ = stack.plan_all().expect("plan");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = stack
            .write_descriptor(&dir.path().join("out"), DescriptorFormat::Yaml)
            .expect("write");
        assert!(path.ends_with("LocalStack.descriptor.yaml"));
        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.contains("fingerprint:"));
    }
}
