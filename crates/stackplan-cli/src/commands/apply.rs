//! `stackplan apply` — Dry-run a layered rollout of the reference stack.

use std::collections::BTreeSet;
use std::time::Duration;

use clap::Args;
use stackplan_common::config::PlannerConfig;
use stackplan_common::types::ResourceId;
use stackplan_graph::synth::ResourceFragment;
use stackplan_sdk::rollout::{ProvisionError, Provisioner, Rollout, RolloutOutcome};

use crate::output;

/// Arguments for the `apply` command.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Resource id the simulated provisioner should fail (repeatable).
    #[arg(long = "fail", value_name = "ID")]
    pub fail: Vec<String>,

    /// Simulated provisioning time per resource, in milliseconds.
    #[arg(long, default_value_t = 200)]
    pub delay_ms: u64,
}

/// Provisioner that only waits, failing the ids it was told to fail.
#[derive(Debug)]
struct SimulatedProvisioner {
    fail: BTreeSet<String>,
    delay: Duration,
}

impl Provisioner for SimulatedProvisioner {
    async fn provision(&self, id: &ResourceId, fragment: &ResourceFragment) -> Result<(), ProvisionError> {
        tracing::debug!(id = %id, kind = %fragment.kind, "simulating provision");
        tokio::time::sleep(self.delay).await;
        if self.fail.contains(id.as_str()) {
            return Err(ProvisionError::new(id.as_str(), "simulated failure"));
        }
        Ok(())
    }
}

/// Executes the `apply` command.
///
/// Ctrl+C cancels the rollout once the layer in flight finishes.
///
/// # Errors
///
/// Returns an error if planning fails, the Ctrl+C handler cannot be
/// installed, or the rollout does not succeed.
pub fn execute(args: ApplyArgs, config: PlannerConfig) -> anyhow::Result<()> {
    let stack = super::planned_stack(config)?;
    let descriptor = stack
        .descriptor()
        .ok_or_else(|| anyhow::anyhow!("stack was not synthesized"))?;

    let unknown: Vec<&str> = args
        .fail
        .iter()
        .map(String::as_str)
        .filter(|id| descriptor.resource(id).is_none())
        .collect();
    if !unknown.is_empty() {
        return Err(anyhow::anyhow!("unknown resource id(s): {}", unknown.join(", ")));
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let rollout = Rollout::new(SimulatedProvisioner {
        fail: args.fail.into_iter().collect(),
        delay: Duration::from_millis(args.delay_ms),
    })
    .with_events(tx);

    let handle = rollout.cancel_handle();
    ctrlc::set_handler(move || handle.cancel())
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(async move {
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                eprintln!("{}", output::format_event(&event));
            }
        });
        let report = rollout.run(descriptor).await;
        drop(rollout);
        let _ = printer.await;
        report
    });

    eprintln!();
    print!("{}", output::format_report(&report));

    match report.outcome {
        RolloutOutcome::Succeeded => Ok(()),
        RolloutOutcome::Failed => Err(anyhow::anyhow!(
            "rollout {} failed: {} resource(s) failed",
            report.id,
            report.failures.len()
        )),
        RolloutOutcome::Cancelled => Err(anyhow::anyhow!("rollout {} was cancelled", report.id)),
    }
}

