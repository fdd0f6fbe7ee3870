//! System-wide constants and defaults.

/// Binary name for the CLI.
pub const BIN_NAME: &str = "stackplan";

/// Default stack name.
pub const DEFAULT_STACK_NAME: &str = "LocalStack";

/// Default directory the synthesized descriptor is written to.
pub const DEFAULT_OUTPUT_DIR: &str = "./stack.out";

/// Environment variable consulted for the config file path.
pub const CONFIG_ENV_VAR: &str = "STACKPLAN_CONFIG";

/// Message-bus bootstrap servers injected into every container service.
pub const DEFAULT_MESSAGE_BUS_BOOTSTRAP: &str = "localhost.localstack.cloud:4510, localhost.localstack.cloud:4511, localhost.localstack.cloud:4512";

/// Schema management mode for database-attached services.
pub const DEFAULT_DDL_AUTO: &str = "update";

/// SQL init mode for database-attached services.
pub const DEFAULT_SQL_INIT_MODE: &str = "always";

/// Connection pool initialization fail timeout, in milliseconds.
pub const DEFAULT_POOL_INIT_FAIL_TIMEOUT_MS: u64 = 60_000;

/// Default relational database engine.
pub const DEFAULT_DB_ENGINE: &str = "postgres";

/// Default relational database engine version.
pub const DEFAULT_DB_VERSION: &str = "17.2";

/// Default database instance class.
pub const DEFAULT_DB_INSTANCE_CLASS: &str = "db.t2.micro";

/// Default allocated storage, in GiB.
pub const DEFAULT_DB_STORAGE_GIB: u32 = 20;

/// Default master username for generated credentials.
pub const DEFAULT_DB_USERNAME: &str = "admin_user";

/// Default database port (`PostgreSQL`).
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Suffix appended to a database id to form its endpoint address.
pub const DEFAULT_DB_ENDPOINT_SUFFIX: &str = "rds.localhost.localstack.cloud";

/// Default Fargate-style CPU units (0.25 vCPU).
pub const DEFAULT_SERVICE_CPU_UNITS: u32 = 256;

/// Default task memory, in MiB.
pub const DEFAULT_SERVICE_MEMORY_MIB: u32 = 512;

/// Default log retention for service log groups, in days.
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 1;

/// Default grace period before load balancer health checks count, in seconds.
pub const DEFAULT_HEALTH_CHECK_GRACE_PERIOD_SECONDS: u32 = 60;

/// Default interval between health check probes, in seconds.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECONDS: u32 = 30;

/// Default consecutive failures before a target is unhealthy.
pub const DEFAULT_HEALTH_CHECK_FAILURE_THRESHOLD: u32 = 3;

/// Suffix appended to a load-balanced service id to form its public host name.
pub const PUBLIC_ENDPOINT_SUFFIX: &str = "elb.localhost.localstack.cloud";

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;
