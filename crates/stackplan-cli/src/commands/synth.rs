//! `stackplan synth` — Write the deployment descriptor.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use stackplan_common::config::PlannerConfig;
use stackplan_sdk::stack::DescriptorFormat;

/// Descriptor file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SynthFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// YAML.
    Yaml,
}

impl From<SynthFormat> for DescriptorFormat {
    fn from(format: SynthFormat) -> Self {
        match format {
            SynthFormat::Json => Self::Json,
            SynthFormat::Yaml => Self::Yaml,
        }
    }
}

/// Arguments for the `synth` command.
#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Output directory; defaults to the configured `output_dir`.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Descriptor format.
    #[arg(long, value_enum, default_value_t = SynthFormat::Json)]
    pub format: SynthFormat,
}

/// Executes the `synth` command.
///
/// # Errors
///
/// Returns an error if planning fails or the descriptor cannot be written.
pub fn execute(args: SynthArgs, config: PlannerConfig) -> anyhow::Result<()> {
    let stack = super::planned_stack(config)?;
    let dir = args
        .out
        .unwrap_or_else(|| stack.config().output_dir.clone());
    let path = stack.write_descriptor(&dir, args.format.into())?;
    let fingerprint = stack
        .descriptor()
        .map(|d| d.fingerprint().to_string())
        .unwrap_or_default();

    println!("Wrote {}", path.display());
    println!("  {fingerprint}");
    Ok(())
}
