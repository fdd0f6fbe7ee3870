//! `stackplan plan` — Display the layered deployment plan.

use clap::{Args, ValueEnum};
use stackplan_common::config::PlannerConfig;

use crate::output;

/// Output format for `plan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PlanFormat {
    /// Human-readable layers.
    #[default]
    Text,
    /// The plan as nested JSON arrays.
    Json,
}

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Output format.
    #[arg(long, value_enum, default_value_t = PlanFormat::Text)]
    pub format: PlanFormat,
}

/// Executes the `plan` command.
///
/// Declares the reference stack, resolves it and prints one line per layer.
///
/// # Errors
///
/// Returns an error if declaration, resolution or synthesis fails.
pub fn execute(args: PlanArgs, config: PlannerConfig) -> anyhow::Result<()> {
    let stack = super::planned_stack(config)?;
    let plan = stack
        .plan()
        .ok_or_else(|| anyhow::anyhow!("stack was not resolved"))?;

    match args.format {
        PlanFormat::Json => println!("{}", serde_json::to_string_pretty(plan)?),
        PlanFormat::Text => {
            println!("Deployment plan for: {}", stack.config().stack_name);
            println!();
            print!("{}", output::format_layers(plan));
            println!();
            println!(
                "  {} resource(s) in {} layer(s).",
                plan.node_count(),
                plan.len()
            );
        }
    }
    Ok(())
}
