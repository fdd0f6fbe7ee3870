//! The patient-management reference stack.
//!
//! One network, two Postgres databases each watched by a TCP health check,
//! a Kafka cluster, a container cluster, four internal services and a
//! load-balanced API gateway.

use stackplan_common::config::PlannerConfig;
use stackplan_common::error::Result;
use stackplan_graph::env::Environment;
use stackplan_graph::resources::MessagingClusterSpec;

use crate::stack::{ServiceDecl, Stack};

/// Network id.
pub const NETWORK: &str = "patient-management-vpc";
/// Auth service database id.
pub const AUTH_DB: &str = "auth-service-db";
/// Patient service database id.
pub const PATIENT_DB: &str = "patient-service-db";
/// Auth database health check id.
pub const AUTH_DB_HEALTH_CHECK: &str = "auth-service-db-health-check";
/// Patient database health check id.
pub const PATIENT_DB_HEALTH_CHECK: &str = "patient-service-db-health-check";
/// Kafka cluster id.
pub const MESSAGING: &str = "msk-cluster";
/// Container cluster id.
pub const CLUSTER: &str = "ecs-cluster";
/// Auth service id.
pub const AUTH_SERVICE: &str = "auth-service";
/// Billing service id.
pub const BILLING_SERVICE: &str = "billing-service";
/// Analytics service id.
pub const ANALYTICS_SERVICE: &str = "analytics-service";
/// Patient service id.
pub const PATIENT_SERVICE: &str = "patient-service";
/// API gateway id.
pub const API_GATEWAY: &str = "api-gateway";

const HOST_ALIAS: &str = "host.docker.internal";

fn overrides<const N: usize>(pairs: [(&str, String); N]) -> Environment {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn declare_service(
    stack: &Stack,
    id: &str,
    ports: Vec<u16>,
    database: Option<&str>,
    env: Option<Environment>,
) -> Result<()> {
    let task = format!("{id}-task");
    let _ = stack.task_definition(&task, id, CLUSTER)?;
    let mut decl = ServiceDecl::new(id, ports, CLUSTER, NETWORK);
    decl.database_ref = database.map(str::to_string);
    decl.task_definition_id = Some(task);
    decl.overrides = env;
    let _ = stack.service(id, &decl)?;
    Ok(())
}

/// Declares the reference stack into a fresh [`Stack`].
///
/// # Errors
///
/// Propagates declaration errors; none occur with a valid configuration.
pub fn patient_management(config: PlannerConfig) -> Result<Stack> {
    let stack = Stack::new(config);

    let _ = stack.network(NETWORK, "PatientManagementVPC", 2)?;
    let _ = stack.database(AUTH_DB, AUTH_DB, NETWORK)?;
    let _ = stack.database(PATIENT_DB, PATIENT_DB, NETWORK)?;
    let _ = stack.health_check(AUTH_DB_HEALTH_CHECK, AUTH_DB)?;
    let _ = stack.health_check(PATIENT_DB_HEALTH_CHECK, PATIENT_DB)?;
    let _ = stack.messaging_cluster(
        MESSAGING,
        &MessagingClusterSpec {
            name: "kafka-cluster".into(),
            broker_version: "2.8.0".into(),
            broker_count: 1,
            instance_type: "kafka.m5.xlarge".into(),
            broker_az_distribution: "DEFAULT".into(),
            network_id: NETWORK.into(),
        },
    )?;
    let _ = stack.container_cluster(CLUSTER, "PatientManagementEcsCluster", NETWORK)?;

    declare_service(
        &stack,
        AUTH_SERVICE,
        vec![4005],
        Some(AUTH_DB),
        Some(overrides([("JWT_SECRET", "secret://auth-service/jwt".to_string())])),
    )?;
    stack.depends_on(AUTH_SERVICE, AUTH_DB_HEALTH_CHECK)?;

    declare_service(&stack, BILLING_SERVICE, vec![4001, 9001], None, None)?;

    declare_service(&stack, ANALYTICS_SERVICE, vec![4002], None, None)?;
    stack.depends_on(ANALYTICS_SERVICE, MESSAGING)?;

    declare_service(
        &stack,
        PATIENT_SERVICE,
        vec![4000],
        Some(PATIENT_DB),
        Some(overrides([
            ("BILLING_SERVICE_ADDRESS", HOST_ALIAS.to_string()),
            ("BILLING_SERVICE_GRPC_PORT", "9001".to_string()),
        ])),
    )?;
    for dep in [PATIENT_DB_HEALTH_CHECK, BILLING_SERVICE, MESSAGING] {
        stack.depends_on(PATIENT_SERVICE, dep)?;
    }

    let gateway_task = format!("{API_GATEWAY}-task");
    let _ = stack.task_definition(&gateway_task, API_GATEWAY, CLUSTER)?;
    let mut gateway = ServiceDecl::new(API_GATEWAY, vec![4004], CLUSTER, NETWORK);
    gateway.task_definition_id = Some(gateway_task);
    gateway.publicly_reachable = true;
    gateway.overrides = Some(overrides([
        ("SPRING_PROFILES_ACTIVE", "prod".to_string()),
        ("AUTH_SERVICE_URL", format!("http://{HOST_ALIAS}:4005")),
    ]));
    let _ = stack.load_balanced_service(API_GATEWAY, &gateway, 4004)?;

    tracing::info!(nodes = stack.len(), "reference stack declared");
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use stackplan_graph::env::{DATABASE_KEYS, DATASOURCE_URL, MESSAGE_BUS_BOOTSTRAP};
    use stackplan_graph::model::{ResourceKind, attr};

    use super::*;

    #[test]
    fn reference_stack_plans() {
        let mut stack = patient_management(PlannerConfig::default()).expect("declare");
        assert_eq!(stack.len(), 17);
        let descriptor = stack.plan_all().expect("plan").clone();
        let plan = stack.plan().expect("plan");

        let layer = |id: &str| plan.layer_of(id).expect("placed");
        assert_eq!(layer(NETWORK), 0);
        assert!(layer(AUTH_DB) < layer(AUTH_DB_HEALTH_CHECK));
        assert!(layer(AUTH_DB_HEALTH_CHECK) < layer(AUTH_SERVICE));
        assert!(layer(PATIENT_DB_HEALTH_CHECK) < layer(PATIENT_SERVICE));
        assert!(layer(BILLING_SERVICE) < layer(PATIENT_SERVICE));
        assert!(layer(MESSAGING) < layer(ANALYTICS_SERVICE));
        assert!(layer(CLUSTER) < layer(API_GATEWAY));
        for service in [AUTH_SERVICE, BILLING_SERVICE, ANALYTICS_SERVICE, PATIENT_SERVICE, API_GATEWAY] {
            let task = format!("{service}-task");
            assert!(layer(CLUSTER) < layer(&task), "{task} before its cluster");
            assert!(layer(&task) < layer(service), "{service} before its task");
        }
        assert_eq!(plan.layers()[0].len(), 1, "only the network has no dependencies");

        let gateway = descriptor.resource(API_GATEWAY).expect("gateway");
        assert_eq!(gateway.kind, ResourceKind::LoadBalancedService);
        assert_eq!(
            gateway.attributes[attr::PUBLIC_ENDPOINT],
            "http://api-gateway.elb.localhost.localstack.cloud:4004"
        );
    }

    #[test]
    fn only_database_services_get_datasource_keys() {
        let mut stack = patient_management(PlannerConfig::default()).expect("declare");
        let descriptor = stack.plan_all().expect("plan");

        let env = |id: &str| descriptor.resource(id).expect("resource").attributes[attr::ENVIRONMENT].clone();
        let patient = env(PATIENT_SERVICE);
        assert_eq!(
            patient[DATASOURCE_URL],
            "jdbc:postgresql://patient-service-db.rds.localhost.localstack.cloud:5432/patient-service-db"
        );
        assert_eq!(patient["BILLING_SERVICE_GRPC_PORT"], "9001");

        let billing = env(BILLING_SERVICE);
        assert!(billing.get(MESSAGE_BUS_BOOTSTRAP).is_some());
        for key in DATABASE_KEYS {
            assert!(billing.get(key).is_none(), "{key} leaked into billing");
        }
    }

    #[test]
    fn health_checks_copy_database_endpoint() {
        let stack = patient_management(PlannerConfig::default()).expect("declare");
        let hc = stack.node(AUTH_DB_HEALTH_CHECK).expect("hc");
        assert_eq!(
            hc.str_attr(attr::ADDRESS),
            Some("auth-service-db.rds.localhost.localstack.cloud")
        );
        assert_eq!(hc.u64_attr(attr::PORT), Some(5432));
        assert_eq!(hc.str_attr(attr::PROTOCOL), Some("TCP"));
    }
}
