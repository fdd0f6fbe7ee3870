//! # stackplan-graph
//!
//! Resource model and planning pipeline for multi-service stacks.
//!
//! Handles:
//! - **Model**: Typed resource nodes and their attribute maps.
//! - **Resources**: Per-kind factories that fill in defaults.
//! - **Env**: Composition of service environment variables.
//! - **Graph**: Concurrent-safe graph builder and the sealed graph.
//! - **Plan**: Layered dependency resolution with cycle reporting.
//! - **Synth**: Deployment descriptor synthesis and fingerprinting.
//! - **Rollout**: Fail-fast layer bookkeeping for executors.

pub mod env;
pub mod graph;
pub mod model;
pub mod plan;
pub mod resources;
pub mod rollout;
pub mod synth;
pub mod validator;
