//! Environment composition for container services.
//!
//! A service's environment is built from three tiers, later tiers winning
//! on key collisions:
//!
//! 1. Global defaults (the message-bus bootstrap address).
//! 2. Caller-supplied overrides.
//! 3. Database-derived fields, only when the service is attached to a database.
//!
//! Composition is a pure function over already-declared nodes; nothing here
//! performs I/O or keeps shared state between calls.

use std::collections::BTreeMap;

use stackplan_common::config::ComposerSettings;
use stackplan_common::error::{Result, StackError};

use crate::model::{ResourceKind, ResourceNode, attr};

/// Message-bus bootstrap servers.
pub const MESSAGE_BUS_BOOTSTRAP: &str = "SPRING_KAFKA_BOOTSTRAP_SERVERS";
/// JDBC connection URL.
pub const DATASOURCE_URL: &str = "SPRING_DATASOURCE_URL";
/// Database username.
pub const DATASOURCE_USERNAME: &str = "SPRING_DATASOURCE_USERNAME";
/// Handle the workload resolves to obtain the database password.
pub const DATASOURCE_PASSWORD_REF: &str = "SPRING_DATASOURCE_PASSWORD_REF";
/// Schema management mode.
pub const DDL_AUTO: &str = "SPRING_JPA_HIBERNATE_DDL_AUTO";
/// SQL init mode.
pub const SQL_INIT_MODE: &str = "SPRING_SQL_INIT_MODE";
/// Connection pool initialization fail timeout.
pub const POOL_INIT_FAIL_TIMEOUT: &str = "SPRING_DATASOURCE_HIKARI_INITIALIZATION_FAIL_TIMEOUT";

/// Keys only ever emitted for database-attached services.
pub const DATABASE_KEYS: [&str; 6] = [
    DATASOURCE_URL,
    DATASOURCE_USERNAME,
    DATASOURCE_PASSWORD_REF,
    DDL_AUTO,
    SQL_INIT_MODE,
    POOL_INIT_FAIL_TIMEOUT,
];

/// Final environment of a container service.
pub type Environment = BTreeMap<String, String>;

/// Tier 1: values every service receives.
#[must_use]
pub fn default_environment(settings: &ComposerSettings) -> Environment {
    let mut env = Environment::new();
    let _ = env.insert(
        MESSAGE_BUS_BOOTSTRAP.into(),
        settings.message_bus_bootstrap.clone(),
    );
    env
}

/// Tier 3: values derived from an attached database node.
///
/// # Errors
///
/// Returns [`StackError::InvalidNode`] if `database` is not a database or is
/// missing its endpoint, name, username, or credentials handle.
pub fn database_environment(settings: &ComposerSettings, database: &ResourceNode) -> Result<Environment> {
    if database.kind() != ResourceKind::Database {
        return Err(StackError::invalid_node(
            database.id().as_str(),
            format!("cannot attach a {} as a database", database.kind()),
        ));
    }
    let missing = |key: &str| {
        StackError::invalid_node(
            database.id().as_str(),
            format!("database is missing attribute `{key}`"),
        )
    };
    let (address, port) = database.endpoint().ok_or_else(|| missing(attr::ADDRESS))?;
    let name = database
        .str_attr(attr::DATABASE_NAME)
        .ok_or_else(|| missing(attr::DATABASE_NAME))?;
    let username = database
        .str_attr(attr::USERNAME)
        .ok_or_else(|| missing(attr::USERNAME))?;
    let credentials = database
        .str_attr(attr::CREDENTIALS_REF)
        .ok_or_else(|| missing(attr::CREDENTIALS_REF))?;

    let mut env = Environment::new();
    let _ = env.insert(
        DATASOURCE_URL.into(),
        format!("jdbc:postgresql://{address}:{port}/{name}"),
    );
    let _ = env.insert(DATASOURCE_USERNAME.into(), username.to_string());
    let _ = env.insert(DATASOURCE_PASSWORD_REF.into(), format!("{credentials}#password"));
    let _ = env.insert(DDL_AUTO.into(), settings.ddl_auto.clone());
    let _ = env.insert(SQL_INIT_MODE.into(), settings.sql_init_mode.clone());
    let _ = env.insert(
        POOL_INIT_FAIL_TIMEOUT.into(),
        settings.pool_init_fail_timeout_ms.to_string(),
    );
    Ok(env)
}

/// Composes the final environment of a container service.
///
/// `overrides` of `None` means the caller has nothing to add; `database` of
/// `None` means the service is not attached to a database, in which case no
/// database-derived key is emitted at all.
///
/// # Errors
///
/// Propagates [`database_environment`] errors.
pub fn compose_environment(
    settings: &ComposerSettings,
    overrides: Option<&Environment>,
    database: Option<&ResourceNode>,
) -> Result<Environment> {
    let mut env = default_environment(settings);
    if let Some(overrides) = overrides {
        env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(db) = database {
        env.extend(database_environment(settings, db)?);
        tracing::debug!(database = %db.id(), "injected database environment");
    }
    Ok(env)
}
