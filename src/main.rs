//! Face Attribute CNN CLI
//!
//! Trains the VGG-style attribute regressor for one attribute and reports
//! target-distribution statistics for the weighted sampler.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use face_attribute_cnn::backend::{backend_name, default_device, BurnDeviceQuery, DeviceInventory, TrainingBackend};
use face_attribute_cnn::dataset::annotations::AnnotationTable;
use face_attribute_cnn::dataset::sampler::SamplingWeights;
use face_attribute_cnn::model::config::{AttributePaths, HyperparameterSpace, Monitor, TrainingConfig};
use face_attribute_cnn::training::trainer::run_training;
use face_attribute_cnn::utils::logging::{init_logging, LogConfig};
use face_attribute_cnn::utils::{format_bar, format_duration};

/// Facial attribute regression with Burn
#[derive(Parser, Debug)]
#[command(name = "face_attribute_cnn")]
#[command(version)]
#[command(about = "Train a CNN to regress facial attribute scores", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a model for one attribute
    Train {
        /// Attribute column to regress
        #[arg(short, long, default_value = "Dominance")]
        attribute: String,

        /// Root containing Annotations/, Images/, Spaces/ and Models/
        #[arg(short, long, default_value = ".")]
        data_dir: PathBuf,

        /// Maximum number of epochs
        #[arg(short, long, default_value = "50")]
        epochs: usize,

        /// Generator batches per epoch
        #[arg(long, default_value = "1")]
        steps_per_epoch: usize,

        /// Epochs without improvement before stopping
        #[arg(long, default_value = "6")]
        patience: usize,

        /// Minimum R² improvement over the best so far
        #[arg(long, default_value = "0.01")]
        delta: f64,

        /// Split whose R² drives early stopping (train or validate)
        #[arg(long, default_value = "validate")]
        monitor: Monitor,

        /// Random seed for splitting, sampling and augmentation
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Hyperparameter space file (default: Spaces/<attribute>_space.json)
        #[arg(long)]
        space_file: Option<PathBuf>,

        /// Output directory for model, history and plots (default: Models/)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Show target statistics and sampling weights for one attribute
    Stats {
        /// Attribute column to inspect
        #[arg(short, long, default_value = "Dominance")]
        attribute: String,

        /// Root containing Annotations/ and Spaces/
        #[arg(short, long, default_value = ".")]
        data_dir: PathBuf,

        /// Hyperparameter space file supplying sampling_factor/sampling_intercept
        #[arg(long)]
        space_file: Option<PathBuf>,

        /// Rows in the printed histogram
        #[arg(long, default_value = "20")]
        rows: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train {
            attribute,
            data_dir,
            epochs,
            steps_per_epoch,
            patience,
            delta,
            monitor,
            seed,
            space_file,
            output_dir,
        } => {
            let mut paths = AttributePaths::new(&data_dir, &attribute);
            if let Some(space_file) = space_file {
                paths = paths.with_space_file(space_file);
            }
            if let Some(output_dir) = output_dir {
                paths = paths.with_models_dir(output_dir);
            }

            let config = TrainingConfig {
                epochs,
                steps_per_epoch,
                patience,
                delta,
                monitor,
                seed,
                ..TrainingConfig::default()
            };

            cmd_train(&paths, &config)?;
        }

        Commands::Stats {
            attribute,
            data_dir,
            space_file,
            rows,
        } => {
            let mut paths = AttributePaths::new(&data_dir, &attribute);
            if let Some(space_file) = space_file {
                paths = paths.with_space_file(space_file);
            }
            cmd_stats(&paths, rows)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════╗
 ║   Face Attribute CNN                                     ║
 ║   Weighted-sampling attribute regression with Burn       ║
 ╚══════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_train(paths: &AttributePaths, config: &TrainingConfig) -> Result<()> {
    let inventory = DeviceInventory::probe(&BurnDeviceQuery);
    println!("{}", "Devices:".cyan().bold());
    println!("  Backend: {}", backend_name());
    for device in &inventory.devices {
        println!("  {}", device);
    }
    if !inventory.has_gpu() {
        println!("  {}", "No GPU available, training on CPU".yellow());
    }
    println!();

    let space = HyperparameterSpace::load(&paths.space_file)
        .with_context(|| format!("Failed to load hyperparameter space {:?}", paths.space_file))?;

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Attribute:        {}", paths.attribute);
    println!("  Space file:       {:?}", paths.space_file);
    println!("  Epochs:           {}", config.epochs);
    println!("  Steps per epoch:  {}", config.steps_per_epoch);
    println!("  Batch size:       {}", space.batch_size);
    println!("  Learning rate:    {:e}", space.step_size());
    println!("  Weighted sampling: {}", space.weighted_sampling);
    println!("  Augmentation:     {}", space.augment);
    println!(
        "  Early stopping:   {} r2, patience {}, delta {}",
        config.monitor, config.patience, config.delta
    );
    println!();

    let start = std::time::Instant::now();
    let outcome = run_training::<TrainingBackend>(paths, &space, config, default_device())?;
    let history = &outcome.history;

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!("  Epochs run:       {}", history.epochs_run);
    println!("  Recorded epoch:   {} (zero-based)", history.num_epochs);
    println!("  Best {} r2:  {:.4}", config.monitor, history.best_r2);
    match history.test_r2 {
        Some(r2) => println!("  Test r2:          {:.4}", r2),
        None => println!("  Test r2:          n/a"),
    }
    println!("  Duration:         {}", format_duration(start.elapsed().as_secs_f64()));
    println!("  Model:            {:?}", outcome.model_path.with_extension("mpk"));
    println!("  History:          {:?}", outcome.history_path);
    println!("  Plots:            {:?}", outcome.plots_dir);

    Ok(())
}

fn cmd_stats(paths: &AttributePaths, rows: usize) -> Result<()> {
    info!("Computing target statistics for: {}", paths.attribute);

    let table = AnnotationTable::load(&paths.annotations)
        .with_context(|| format!("Failed to read annotations {:?}", paths.annotations))?;
    let targets = table.values(&paths.attribute)?;
    if targets.is_empty() {
        anyhow::bail!("No values found for attribute '{}'", paths.attribute);
    }

    let space = if paths.space_file.exists() {
        HyperparameterSpace::load(&paths.space_file)?
    } else {
        println!(
            "{} {:?} not found, using default sampling parameters",
            "Note:".yellow(),
            paths.space_file
        );
        HyperparameterSpace::default()
    };

    let weights = SamplingWeights::new(&targets, space.sampling_factor, space.sampling_intercept)?;
    let histogram = weights.histogram();

    let n = targets.len() as f64;
    let mean = targets.iter().map(|&t| t as f64).sum::<f64>() / n;
    let min = targets.iter().copied().fold(f32::INFINITY, f32::min);
    let max = targets.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    println!("{}", "Target Statistics:".cyan().bold());
    println!("  Annotated images: {}", targets.len());
    println!("  Min / mean / max: {:.3} / {:.3} / {:.3}", min, mean, max);
    println!(
        "  Sampling:         factor {}, floor {:.4}",
        space.sampling_factor,
        space.sampling_floor()
    );
    println!();

    let rows = rows.clamp(1, histogram.num_bins());
    let per_row = histogram.num_bins().div_ceil(rows);
    let grouped: Vec<(f64, usize, f64)> = (0..histogram.num_bins())
        .step_by(per_row)
        .map(|start| {
            let end = (start + per_row).min(histogram.num_bins());
            let count: usize = histogram.counts[start..end].iter().sum();
            let weight = weights.bin_weights()[start..end].iter().sum::<f64>() / (end - start) as f64;
            (histogram.edges[start], count, weight)
        })
        .collect();
    let max_count = grouped.iter().map(|(_, c, _)| *c).max().unwrap_or(0);

    println!("{}", "Target Distribution:".cyan().bold());
    for (lower, count, weight) in grouped {
        println!(
            "  {:>8.3} {:>6}  w={:.3}  {}",
            lower,
            count,
            weight,
            format_bar(count, max_count, 40)
        );
    }

    Ok(())
}
