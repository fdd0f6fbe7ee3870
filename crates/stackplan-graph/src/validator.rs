//! Per-kind attribute checks run before a node is synthesized.
//!
//! Nodes built through [`crate::resources`] always pass. The checks exist
//! for nodes assembled by hand with [`ResourceNode::new`].

use stackplan_common::error::{Result, StackError};

use crate::model::{ResourceKind, ResourceNode, Value, attr};

/// Validates that a node carries everything its kind requires.
///
/// # Checks performed
///
/// 1. Every attribute in [`ResourceKind::required_attributes`] is present
///    and not null.
/// 2. Service `ports` is a non-empty array of integers.
/// 3. Service `environment` is an object of string values.
/// 4. Health check `port` is an integer.
///
/// # Errors
///
/// Returns [`StackError::InvalidNode`] naming the first problem found.
pub fn validate_node(node: &ResourceNode) -> Result<()> {
    check_required(node)?;
    if node.kind().is_service() {
        check_ports(node)?;
        check_environment(node)?;
    }
    if node.kind() == ResourceKind::HealthCheck && node.u64_attr(attr::PORT).is_none() {
        return Err(invalid(node, "health check `port` must be an integer"));
    }
    Ok(())
}

fn invalid(node: &ResourceNode, reason: impl Into<String>) -> StackError {
    StackError::invalid_node(node.id().as_str(), reason)
}

fn check_required(node: &ResourceNode) -> Result<()> {
    for key in node.kind().required_attributes() {
        match node.attribute(key) {
            None | Some(Value::Null) => {
                return Err(invalid(
                    node,
                    format!("{} is missing required attribute `{key}`", node.kind()),
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn check_ports(node: &ResourceNode) -> Result<()> {
    let ports = node
        .attribute(attr::PORTS)
        .and_then(Value::as_array)
        .ok_or_else(|| invalid(node, "`ports` must be an array"))?;
    if ports.is_empty() {
        return Err(invalid(node, "`ports` must not be empty"));
    }
    if !ports.iter().all(|p| p.as_u64().is_some_and(|p| p > 0 && p <= u64::from(u16::MAX))) {
        return Err(invalid(node, "`ports` must hold port numbers"));
    }
    Ok(())
}

fn check_environment(node: &ResourceNode) -> Result<()> {
    let env = node
        .attribute(attr::ENVIRONMENT)
        .and_then(Value::as_object)
        .ok_or_else(|| invalid(node, "`environment` must be an object"))?;
    if let Some((key, _)) = env.iter().find(|(_, v)| !v.is_string()) {
        return Err(invalid(node, format!("environment value for `{key}` must be a string")));
    }
    Ok(())
}
