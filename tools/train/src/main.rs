//! Training CLI Tool
//!
//! Fine-tunes a dense softmax head on top of a frozen MobileNetV2 feature
//! extractor, then evaluates, reports and saves the model.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use grain_core::{
    backend_name, default_device, load_toml_config, setup_cli_logging, DefaultBackend,
    PipelineConfig, TrainingBackend,
};
use grain_dataset::AugmentationPresets;
use grain_training::{export_extractor, Pipeline, PipelineOutcome};
use tracing::info;

/// Grain Classification Training Tool
#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Train a grain image classifier",
    long_about = "Train a grain image classifier on top of a frozen pretrained MobileNetV2 \
                  feature extractor, then report on a held-out test set and save the model.",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the training pipeline (default)
    Run(RunArgs),
    /// Write a freshly initialized extractor record for offline runs
    ExportExtractor(ExportArgs),
}

#[derive(Args, Debug, Clone, Default)]
struct RunArgs {
    /// Path to training configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override training dataset root
    #[arg(long, value_name = "DIR")]
    train_dir: Option<PathBuf>,

    /// Override test dataset root
    #[arg(long, value_name = "DIR")]
    test_dir: Option<PathBuf>,

    /// Override output directory
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Override saved model path
    #[arg(long, value_name = "FILE")]
    model_path: Option<PathBuf>,

    /// Override pretrained extractor URL or path
    #[arg(long, value_name = "SOURCE")]
    extractor: Option<String>,

    /// Override number of epochs
    #[arg(short, long, value_name = "N")]
    epochs: Option<usize>,

    /// Override learning rate
    #[arg(short, long, value_name = "LR")]
    lr: Option<f64>,

    /// Override batch size
    #[arg(short, long, value_name = "SIZE")]
    batch_size: Option<usize>,

    /// Override input image size
    #[arg(long, value_name = "PIXELS")]
    image_size: Option<usize>,

    /// Override MobileNetV2 width multiplier
    #[arg(long, value_name = "ALPHA")]
    width_multiplier: Option<f64>,

    /// Augmentation preset (none, light, medium)
    #[arg(long, value_name = "PRESET")]
    augmentation: Option<String>,

    /// Override random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Validate and print the configuration without training
    #[arg(long)]
    dry_run: bool,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Destination of the extractor record (.mpk)
    #[arg(short, long, value_name = "FILE", default_value = grain_core::DEFAULT_EXTRACTOR_SOURCE)]
    output: PathBuf,

    /// MobileNetV2 width multiplier
    #[arg(long, value_name = "ALPHA", default_value_t = 1.0)]
    width_multiplier: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_cli_logging(cli.verbose)?;

    match cli.command {
        Some(Command::ExportExtractor(args)) => {
            let path = export_extractor::<DefaultBackend>(
                args.width_multiplier,
                &args.output,
                &default_device(),
            )
            .context("Failed to export extractor")?;
            println!("{} {}", "Extractor written to".green().bold(), path.display());
            Ok(())
        }
        Some(Command::Run(args)) => run(&args),
        None => run(&cli.run),
    }
}

fn run(args: &RunArgs) -> Result<()> {
    info!("Grain Classification - Training Tool");
    info!("====================================");

    let mut config = match &args.config {
        Some(path) => load_toml_config::<PipelineConfig>(path)
            .with_context(|| format!("Failed to load configuration file {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    apply_overrides(&mut config, args)?;

    let pipeline = Pipeline::new(config).context("Invalid configuration")?;
    print_config_summary(pipeline.config());

    if args.dry_run {
        println!("{}", toml::to_string_pretty(pipeline.config())?);
        info!("Configuration validated successfully (dry run)");
        return Ok(());
    }

    let outcome = pipeline
        .with_progress(!args.no_progress)
        .run::<TrainingBackend>(&default_device())
        .context("Training pipeline failed")?;

    print_outcome(&outcome);
    Ok(())
}

fn apply_overrides(config: &mut PipelineConfig, args: &RunArgs) -> Result<()> {
    if let Some(ref dir) = args.train_dir {
        config.data.train_dir = dir.clone();
    }
    if let Some(ref dir) = args.test_dir {
        config.data.test_dir = dir.clone();
    }
    if let Some(ref output) = args.output {
        config.output.output_dir = output.clone();
    }
    if let Some(ref path) = args.model_path {
        config.output.model_path = path.clone();
    }
    if let Some(ref source) = args.extractor {
        config.model.extractor_source = source.clone();
    }
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }
    if let Some(lr) = args.lr {
        config.training.adam.learning_rate = lr;
    }
    if let Some(batch_size) = args.batch_size {
        config.data.batch_size = batch_size;
    }
    if let Some(image_size) = args.image_size {
        config.data.image_size = image_size;
    }
    if let Some(alpha) = args.width_multiplier {
        config.model.width_multiplier = alpha;
    }
    if let Some(ref preset) = args.augmentation {
        config.data.augmentation = AugmentationPresets::by_name(preset)
            .with_context(|| {
                format!("Unknown augmentation preset '{preset}' (none, light, medium)")
            })?;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    Ok(())
}

fn print_config_summary(config: &PipelineConfig) {
    info!("");
    info!("Configuration Summary:");
    info!("  Backend: {}", backend_name());
    info!("  Extractor: {} (alpha {})", config.model.extractor, config.model.width_multiplier);
    info!("  Pretrained: {}", config.model.extractor_source);
    info!("  Epochs: {}", config.training.epochs);
    info!("  Batch size: {}", config.data.batch_size);
    info!("  Image size: {}", config.data.image_size);
    info!("  Learning rate: {}", config.training.adam.learning_rate);
    info!("  Validation split: {}", config.data.validation_split);
    info!("  Train dir: {}", config.data.train_dir.display());
    info!("  Test dir: {}", config.data.test_dir.display());
    info!("  Output dir: {}", config.output.output_dir.display());
    info!("  Seed: {}", config.seed);
    info!("");
}

fn print_outcome(outcome: &PipelineOutcome) {
    println!();
    println!("{}", "Training Complete!".green().bold());
    println!(
        "  Validation Accuracy: {}",
        format!("{:.2}%", outcome.validation.accuracy * 100.0).cyan()
    );
    println!(
        "  Test Accuracy:       {}",
        format!("{:.2}%", outcome.test.accuracy * 100.0).cyan()
    );
    if let (Some(best), Some(epoch)) =
        (outcome.history.best_val_accuracy(), outcome.history.best_epoch())
    {
        println!("  Best validation accuracy: {:.2}% (epoch {})", best * 100.0, epoch);
    }

    println!();
    println!("{}", "Classification Report:".cyan().bold());
    println!("{}", outcome.report);

    println!();
    println!("{}", "Artifacts:".cyan().bold());
    println!("  Model: {}", outcome.model_path.display());
    for artifact in &outcome.artifacts {
        println!("  {}", artifact.display());
    }
    println!();
    println!(
        "  Convert with: convert {} rice_saved_model",
        outcome.model_path.display()
    );
}
