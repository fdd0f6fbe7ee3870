//! # stackplan-sdk
//!
//! Public SDK for planning and rolling out stacks as a Rust library.
//!
//! Provides four entry points:
//! - [`Stack`](stack::Stack): Declares resources and walks the
//!   `Building → Sealed → Resolved → Synthesized` lifecycle.
//! - [`patient_management`](topology::patient_management): The reference stack.
//! - [`Rollout`](rollout::Rollout): Drives a provisioner layer by layer.
//! - [`RolloutEvent`](event::RolloutEvent): Progress published during a rollout.
//!
//! # Example
//!
//! ```rust,no_run
//! use stackplan_sdk::stack::Stack;
//!
//! let mut stack = Stack::default();
//! stack.network("net-1", "vpc", 2)?;
//! stack.database("db-1", "orders", "net-1")?;
//! let descriptor = stack.plan_all()?;
//! println!("{}", descriptor.to_json_pretty()?);
//! # Ok::<(), stackplan_common::error::StackError>(())
//! ```

pub mod event;
pub mod rollout;
pub mod stack;
pub mod topology;
