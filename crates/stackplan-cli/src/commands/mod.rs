//! CLI command definitions and dispatch.

pub mod apply;
pub mod plan;
pub mod synth;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stackplan_common::config::PlannerConfig;
use stackplan_common::constants;
use stackplan_sdk::stack::Stack;
use stackplan_sdk::topology;

/// stackplan — Plan, synthesize and dry-run multi-service stacks.
#[derive(Parser, Debug)]
#[command(name = constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to a planner config file (YAML or JSON).
    #[arg(long, global = true, env = constants::CONFIG_ENV_VAR)]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the layered deployment plan.
    Plan(plan::PlanArgs),
    /// Write the deployment descriptor.
    Synth(synth::SynthArgs),
    /// Dry-run a rollout with a simulated provisioner.
    Apply(apply::ApplyArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Plan(args) => plan::execute(args, config),
        Command::Synth(args) => synth::execute(args, config),
        Command::Apply(args) => apply::execute(args, config),
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<PlannerConfig> {
    match path {
        Some(path) => PlannerConfig::load(path)
            .map_err(|e| anyhow::anyhow!("failed to load config {}: {e}", path.display())),
        None => Ok(PlannerConfig::default()),
    }
}

/// Declares the reference stack and runs it through synthesis.
pub(crate) fn planned_stack(config: PlannerConfig) -> anyhow::Result<Stack> {
    let mut stack = topology::patient_management(config)?;
    let _ = stack.plan_all()?;
    Ok(stack)
}
