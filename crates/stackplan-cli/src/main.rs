//! # stackplan — Stack planner CLI
//!
//! Declares the reference stack, prints its layered plan, writes its
//! deployment descriptor and dry-runs layered rollouts.

mod commands;
mod output;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
