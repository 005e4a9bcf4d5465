//! Model conversion CLI Tool
//!
//! Re-serializes a saved classifier into the other on-disk format and checks
//! that the copy gives the same predictions as the original.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use grain_core::{default_device, setup_cli_logging, DefaultBackend};
use grain_training::{convert, ModelFormat};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// Single .mpk file
    Archive,
    /// Directory with manifest.json and weights.bin
    Bundle,
}

impl From<FormatArg> for ModelFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Archive => ModelFormat::Archive,
            FormatArg::Bundle => ModelFormat::Bundle,
        }
    }
}

/// Grain Classifier Conversion Tool
#[derive(Parser, Debug)]
#[command(
    name = "convert",
    about = "Convert a saved grain classifier between formats",
    long_about = "Load a saved classifier (archive file or bundle directory), write it in the \
                  requested format and verify the copy predicts identically."
)]
struct Args {
    /// Saved model to convert
    #[arg(value_name = "SOURCE", default_value = "rice.mpk")]
    source: PathBuf,

    /// Where to write the converted model
    #[arg(value_name = "DESTINATION", default_value = "rice_saved_model")]
    destination: PathBuf,

    /// Target format
    #[arg(short, long, value_enum, default_value_t = FormatArg::Bundle)]
    format: FormatArg,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_cli_logging(args.verbose)?;

    info!("Grain Classification - Conversion Tool");

    let report = convert::<DefaultBackend>(
        &args.source,
        &args.destination,
        args.format.into(),
        &default_device(),
    )
    .with_context(|| format!("Failed to convert {}", args.source.display()))?;

    println!("{}", "Conversion Complete!".green().bold());
    println!("  {} {} ({})", "Source:".cyan(), report.source.display(), report.source_format);
    println!(
        "  {} {} ({})",
        "Destination:".cyan(),
        report.destination.display(),
        report.target_format
    );
    println!(
        "  {} identical on {} probe images (max |diff| {:.2e})",
        "Predictions:".cyan(),
        report.probe_samples,
        report.max_abs_diff
    );

    Ok(())
}
