//! Planner configuration model.
//!
//! Every field has a default, so a config file only needs to name the values
//! it changes. Files ending in `.yaml`/`.yml` are read as YAML, anything else
//! as JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, StackError};

/// Root configuration for planning a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerConfig {
    /// Name of the stack; also the descriptor file stem.
    pub stack_name: String,
    /// Directory synthesized descriptors are written to.
    pub output_dir: PathBuf,
    /// Environment composition defaults.
    pub composer: ComposerSettings,
    /// Defaults for declared databases.
    pub database: DatabaseDefaults,
    /// Defaults for declared container services.
    pub service: ServiceDefaults,
    /// Defaults for declared health checks.
    pub health_check: HealthCheckDefaults,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            stack_name: constants::DEFAULT_STACK_NAME.into(),
            output_dir: PathBuf::from(constants::DEFAULT_OUTPUT_DIR),
            composer: ComposerSettings::default(),
            database: DatabaseDefaults::default(),
            service: ServiceDefaults::default(),
            health_check: HealthCheckDefaults::default(),
        }
    }
}

impl PlannerConfig {
    /// Loads a configuration file, picking the format from its extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, cannot be parsed, or
    /// fails [`PlannerConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "loading planner config");
        let content = std::fs::read_to_string(path).map_err(|e| StackError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        let config: Self = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks values that serde cannot constrain on its own.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str); 7] = [
            (self.stack_name.trim().is_empty(), "stack_name must not be empty"),
            (
                self.composer.message_bus_bootstrap.trim().is_empty(),
                "composer.message_bus_bootstrap must not be empty",
            ),
            (self.database.storage_gib == 0, "database.storage_gib must be positive"),
            (self.database.port == 0, "database.port must be positive"),
            (self.service.cpu_units == 0, "service.cpu_units must be positive"),
            (self.service.memory_mib == 0, "service.memory_mib must be positive"),
            (
                self.health_check.failure_threshold == 0,
                "health_check.failure_threshold must be positive",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(StackError::Config {
                message: (*message).to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Defaults fed into the environment composer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComposerSettings {
    /// Message-bus bootstrap servers every service receives.
    pub message_bus_bootstrap: String,
    /// Schema management mode for database-attached services.
    pub ddl_auto: String,
    /// SQL init mode for database-attached services.
    pub sql_init_mode: String,
    /// Connection pool init fail timeout, in milliseconds.
    pub pool_init_fail_timeout_ms: u64,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            message_bus_bootstrap: constants::DEFAULT_MESSAGE_BUS_BOOTSTRAP.into(),
            ddl_auto: constants::DEFAULT_DDL_AUTO.into(),
            sql_init_mode: constants::DEFAULT_SQL_INIT_MODE.into(),
            pool_init_fail_timeout_ms: constants::DEFAULT_POOL_INIT_FAIL_TIMEOUT_MS,
        }
    }
}

/// Defaults for declared databases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseDefaults {
    /// Database engine.
    pub engine: String,
    /// Engine version.
    pub version: String,
    /// Instance class.
    pub instance_class: String,
    /// Allocated storage, in GiB.
    pub storage_gib: u32,
    /// Master username.
    pub username: String,
    /// Listening port.
    pub port: u16,
    /// Suffix used to derive endpoint addresses.
    pub endpoint_suffix: String,
}

impl Default for DatabaseDefaults {
    fn default() -> Self {
        Self {
            engine: constants::DEFAULT_DB_ENGINE.into(),
            version: constants::DEFAULT_DB_VERSION.into(),
            instance_class: constants::DEFAULT_DB_INSTANCE_CLASS.into(),
            storage_gib: constants::DEFAULT_DB_STORAGE_GIB,
            username: constants::DEFAULT_DB_USERNAME.into(),
            port: constants::DEFAULT_DB_PORT,
            endpoint_suffix: constants::DEFAULT_DB_ENDPOINT_SUFFIX.into(),
        }
    }
}

/// Defaults for declared container services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceDefaults {
    /// CPU units per task.
    pub cpu_units: u32,
    /// Memory per task, in MiB.
    pub memory_mib: u32,
    /// Log group retention, in days.
    pub log_retention_days: u32,
    /// Load balancer health check grace period, in seconds.
    pub health_check_grace_period_seconds: u32,
}

impl Default for ServiceDefaults {
    fn default() -> Self {
        Self {
            cpu_units: constants::DEFAULT_SERVICE_CPU_UNITS,
            memory_mib: constants::DEFAULT_SERVICE_MEMORY_MIB,
            log_retention_days: constants::DEFAULT_LOG_RETENTION_DAYS,
            health_check_grace_period_seconds: constants::DEFAULT_HEALTH_CHECK_GRACE_PERIOD_SECONDS,
        }
    }
}

/// Defaults for declared health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthCheckDefaults {
    /// Seconds between probes.
    pub interval_seconds: u32,
    /// Consecutive failures before unhealthy.
    pub failure_threshold: u32,
}

impl Default for HealthCheckDefaults {
    fn default() -> Self {
        Self {
            interval_seconds: constants::DEFAULT_HEALTH_CHECK_INTERVAL_SECONDS,
            failure_threshold: constants::DEFAULT_HEALTH_CHECK_FAILURE_THRESHOLD,
        }
    }
}
