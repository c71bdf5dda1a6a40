//! Training orchestrator
//!
//! Loads the splits for one attribute, normalises the targets against the
//! training split, trains the VGG variant with RMSprop on MSE while the
//! early-stopping controller watches the per-epoch R², and persists the best
//! snapshot together with its history and evaluation plots.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    nn::loss::{MseLoss, Reduction},
    optim::{GradientsParams, Optimizer, RmsPropConfig},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion,
    },
};
use chrono::Local;
use serde::Serialize;
use tracing::{info, warn};

use super::early_stopping::{CorrelationEarlyStopping, CorrelationHistory, StoppingStatus};
use super::evaluator::{evaluate, Evaluation};
use crate::dataset::annotations::AnnotationTable;
use crate::dataset::generator::{BatchGenerator, FaceBatcher};
use crate::dataset::loader::{load_data_into_memory, TargetNormalizer};
use crate::dataset::split::{split_dataset, DatasetSplits, SplitConfig};
use crate::model::cnn::{save_model, VggVariant};
use crate::model::config::{AttributePaths, HyperparameterSpace, TrainingConfig};
use crate::utils::charts::{
    generate_line_chart, generate_scatter_chart, DataSeries, COLOR_PRIMARY, COLOR_SECONDARY,
};
use crate::utils::logging::TrainingLogger;
use crate::utils::error::FaceAttributeError;
use crate::utils::metrics::RunningAverage;
use crate::{IMAGE_HEIGHT, IMAGE_WIDTH};

/// Load train / validate / test for an attribute
///
/// Uses `Images/<A>/{Train,Validate,Test}` when all three exist, otherwise
/// splits the pooled `Images/<A>` directory with the configured seed.
pub fn load_splits(paths: &AttributePaths, config: &TrainingConfig) -> Result<DatasetSplits> {
    let table = AnnotationTable::load(&paths.annotations)
        .with_context(|| format!("Failed to read annotations {:?}", paths.annotations))?;

    let splits = if paths.is_pre_split() {
        info!("Using pre-split directories under {:?}", paths.images_dir);
        DatasetSplits {
            train: load_data_into_memory(&paths.train_dir(), &table, &paths.attribute)?,
            validate: load_data_into_memory(&paths.validate_dir(), &table, &paths.attribute)?,
            test: load_data_into_memory(&paths.test_dir(), &table, &paths.attribute)?,
        }
    } else {
        let pooled = load_data_into_memory(&paths.images_dir, &table, &paths.attribute)
            .with_context(|| format!("Failed to load images from {:?}", paths.images_dir))?;
        let split_config = SplitConfig::new(config.holdout_fraction, config.seed)?;
        split_dataset(pooled, &split_config)?
    };

    info!(
        "Loaded {} images: {} train, {} validate, {} test",
        splits.total(),
        splits.train.len(),
        splits.validate.len(),
        splits.test.len()
    );

    if splits.train.is_empty() || splits.validate.is_empty() {
        return Err(FaceAttributeError::Training(format!(
            "need training and validation images, found {} and {}",
            splits.train.len(),
            splits.validate.len()
        ))
        .into());
    }

    Ok(splits)
}

/// Fit the normaliser on the training targets and apply it to every split
pub fn normalize_splits(splits: &mut DatasetSplits) -> Result<TargetNormalizer> {
    let normalizer = TargetNormalizer::fit(&splits.train.targets())?;
    splits.train.normalize(&normalizer);
    splits.validate.normalize(&normalizer);
    splits.test.normalize(&normalizer);
    info!(
        "Target normalisation: min {:.4}, range {:.4}",
        normalizer.min, normalizer.range
    );
    Ok(normalizer)
}

/// Outcome of the training loop, with the best model on the inner backend
pub struct TrainingRun<B: Backend> {
    pub model: VggVariant<B>,
    pub history: CorrelationHistory,
    pub losses: Vec<f64>,
    pub best_r2: f64,
    pub best_epoch: Option<usize>,
    pub num_epochs: usize,
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub validate: Evaluation,
    pub test: Option<Evaluation>,
}

/// Train on normalised splits and evaluate the best snapshot
pub fn train_model<B: AutodiffBackend>(
    splits: DatasetSplits,
    space: &HyperparameterSpace,
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<TrainingRun<B::InnerBackend>> {
    config.validate()?;
    let mut model = VggVariant::<B>::new(space, IMAGE_HEIGHT, IMAGE_WIDTH, device)?;
    for line in model.summary() {
        info!("  {}", line);
    }

    let mut optimizer = RmsPropConfig::new()
        .with_alpha(config.rmsprop_rho)
        .with_epsilon(config.rmsprop_epsilon)
        .init();
    let learning_rate = space.step_size();

    let DatasetSplits {
        train,
        validate,
        test,
    } = splits;
    let train = Arc::new(train);
    let mut generator = BatchGenerator::new(Arc::clone(&train), space, config.seed)?;
    let batcher = FaceBatcher::<B>::new();

    let mut controller =
        CorrelationEarlyStopping::new(config.monitor, config.patience, config.delta);
    let mut logger = TrainingLogger::new(config.epochs);
    let mut losses = Vec::with_capacity(config.epochs);
    let mut epochs_run = 0;

    info!(
        "Training on {} examples, validating on {} (lr {:e}, batch {}, {} steps/epoch)",
        train.len(),
        validate.len(),
        learning_rate,
        space.batch_size,
        config.steps_per_epoch
    );

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);
        let mut epoch_loss = RunningAverage::new();

        for _ in 0..config.steps_per_epoch {
            let batch = batcher.batch(generator.next_batch(), device);
            let output = model.forward(batch.images);
            let loss = MseLoss::new().forward(output, batch.targets, Reduction::Mean);

            let loss_value: f64 = loss.clone().into_scalar().elem();
            epoch_loss.add(loss_value);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(learning_rate, model, grads);
        }

        losses.push(epoch_loss.average());
        logger.end_epoch(epoch_loss.average());
        epochs_run = epoch + 1;

        let snapshot = model.valid();
        let train_r2 = evaluate(&snapshot, &train, config.eval_batch_size, device)?.r_squared;
        let validate_r2 =
            evaluate(&snapshot, &validate, config.eval_batch_size, device)?.r_squared;

        match controller.on_epoch_end(epoch, train_r2, validate_r2, &snapshot) {
            StoppingStatus::Improving => logger.log_new_best(controller.best()),
            StoppingStatus::Waiting => {}
            StoppingStatus::Stopped => {
                logger.log_early_stop(config.patience, controller.num_epochs());
                break;
            }
        }
    }

    let best_epoch = controller.best_epoch();
    let best_model = match controller.take_best_model() {
        Some(best) => best,
        None => {
            warn!(
                "Monitored {} r2 never improved, keeping the final model",
                config.monitor
            );
            model.valid()
        }
    };
    logger.log_complete(epochs_run, controller.best());

    let validate_eval = evaluate(&best_model, &validate, config.eval_batch_size, device)?;
    let test_eval = if test.is_empty() {
        warn!("Test split is empty, skipping test evaluation");
        None
    } else {
        let evaluation = evaluate(&best_model, &test, config.eval_batch_size, device)?;
        info!("Test r2 of best model: {:.4}", evaluation.r_squared);
        Some(evaluation)
    };

    Ok(TrainingRun {
        model: best_model,
        history: controller.history().clone(),
        losses,
        best_r2: controller.best(),
        best_epoch,
        num_epochs: controller.num_epochs(),
        epochs_run,
        stopped_early: controller.should_stop(),
        validate: validate_eval,
        test: test_eval,
    })
}

/// Serialisable record of one run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingHistory {
    pub attribute: String,
    pub finished_at: String,
    pub space: HyperparameterSpace,
    pub config: TrainingConfig,
    pub normalizer: TargetNormalizer,
    pub train_r2: Vec<f64>,
    pub validate_r2: Vec<f64>,
    pub losses: Vec<f64>,
    pub best_r2: f64,
    pub best_epoch: Option<usize>,
    pub num_epochs: usize,
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub test_r2: Option<f64>,
}

impl TrainingHistory {
    /// Write as pretty JSON; non-finite values become `null`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Where a run's artifacts were written
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub history: TrainingHistory,
    /// Model path without the recorder's `.mpk` extension
    pub model_path: PathBuf,
    pub history_path: PathBuf,
    pub plots_dir: PathBuf,
}

/// Train one attribute end to end and persist the best model
pub fn run_training<B: AutodiffBackend>(
    paths: &AttributePaths,
    space: &HyperparameterSpace,
    config: &TrainingConfig,
    device: B::Device,
) -> Result<TrainingOutcome> {
    config.validate()?;
    space
        .validate_for_input(IMAGE_HEIGHT, IMAGE_WIDTH)
        .context("Invalid hyperparameter space")?;

    info!("Training attribute '{}'", paths.attribute);
    let mut splits = load_splits(paths, config)?;
    let normalizer = normalize_splits(&mut splits)?;

    let run = train_model::<B>(splits, space, config, &device)?;

    let model_path = paths.model_path();
    save_model(&run.model, &model_path)
        .with_context(|| format!("Failed to save model to {:?}", model_path))?;
    info!("Saved best model to {:?}", model_path);

    let history = TrainingHistory {
        attribute: paths.attribute.clone(),
        finished_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        space: space.clone(),
        config: config.clone(),
        normalizer,
        train_r2: run.history.train.clone(),
        validate_r2: run.history.validate.clone(),
        losses: run.losses.clone(),
        best_r2: run.best_r2,
        best_epoch: run.best_epoch,
        num_epochs: run.num_epochs,
        epochs_run: run.epochs_run,
        stopped_early: run.stopped_early,
        test_r2: run.test.as_ref().map(|e| e.r_squared),
    };
    let history_path = paths.history_path();
    history.save(&history_path)?;

    let plots_dir = paths.plots_dir();
    if let Err(e) = render_plots(&run, &normalizer, &plots_dir) {
        warn!("Failed to render plots: {}", e);
    }

    Ok(TrainingOutcome {
        history,
        model_path,
        history_path,
        plots_dir,
    })
}

/// Scatter plots are drawn on the attribute's original scale
fn render_plots<B: Backend>(
    run: &TrainingRun<B>,
    normalizer: &TargetNormalizer,
    plots_dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(plots_dir)?;

    let r2_series = vec![
        DataSeries::from_history("Train", &run.history.train, COLOR_PRIMARY),
        DataSeries::from_history("Validate", &run.history.validate, COLOR_SECONDARY),
    ];
    generate_line_chart("R² per epoch", "Epoch", "R²", &r2_series, &plots_dir.join("r2_history.svg"))?;

    let loss_series = vec![DataSeries::from_history("MSE", &run.losses, COLOR_PRIMARY)];
    generate_line_chart("Training loss", "Epoch", "MSE", &loss_series, &plots_dir.join("loss.svg"))?;

    let rescale = |values: &[f32]| -> Vec<f32> {
        values.iter().map(|&v| normalizer.invert(v)).collect()
    };

    generate_scatter_chart(
        "Validation: predicted vs true",
        &rescale(&run.validate.targets),
        &rescale(&run.validate.predictions),
        &plots_dir.join("validate_scatter.svg"),
    )?;
    if let Some(test) = &run.test {
        generate_scatter_chart(
            "Test: predicted vs true",
            &rescale(&test.targets),
            &rescale(&test.predictions),
            &plots_dir.join("test_scatter.svg"),
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TrainingBackend;
    use crate::dataset::{Dataset, Example};
    use crate::model::config::Monitor;
    use image::{GrayImage, Luma};
    use tempfile::TempDir;

    fn tiny_space() -> HyperparameterSpace {
        HyperparameterSpace {
            conv0filters: vec![2],
            conv1filters: vec![],
            conv2filters: vec![],
            num_fc: 1,
            fcoutput: 4,
            dropout: 0.0,
            learning_rate: 3.0,
            batch_size: 4,
            weighted_sampling: true,
            augment: false,
            sampling_factor: 3.0,
            sampling_intercept: 1.0,
        }
    }

    fn tiny_config(epochs: usize) -> TrainingConfig {
        TrainingConfig {
            epochs,
            steps_per_epoch: 1,
            patience: 1,
            monitor: Monitor::Validate,
            eval_batch_size: 8,
            ..TrainingConfig::default()
        }
    }

    fn synthetic(count: usize, offset: usize) -> Dataset {
        (0..count)
            .map(|i| {
                let level = ((i + offset) * 20 % 256) as u8;
                let image =
                    GrayImage::from_pixel(IMAGE_WIDTH as u32, IMAGE_HEIGHT as u32, Luma([level]));
                Example::new(format!("{}.png", i + offset), image, level as f32 / 255.0)
            })
            .collect()
    }

    #[test]
    fn test_normalize_splits_uses_train_range() {
        let mut splits = DatasetSplits {
            train: synthetic(4, 1),
            validate: synthetic(2, 0),
            test: synthetic(1, 6),
        };
        let normalizer = normalize_splits(&mut splits).unwrap();

        let train = splits.train.targets();
        assert_eq!(train.iter().copied().fold(f32::INFINITY, f32::min), 0.0);
        assert_eq!(train.iter().copied().fold(f32::NEG_INFINITY, f32::max), 1.0);
        // Held-out examples below the training minimum fall below 0
        assert!(splits.validate.targets()[0] < 0.0);
        assert!(normalizer.range > 0.0);
    }

    #[test]
    fn test_train_model_runs_and_records_history() {
        let mut splits = DatasetSplits {
            train: synthetic(8, 0),
            validate: synthetic(3, 8),
            test: synthetic(2, 11),
        };
        normalize_splits(&mut splits).unwrap();

        let device = Default::default();
        let run = train_model::<TrainingBackend>(splits, &tiny_space(), &tiny_config(3), &device)
            .unwrap();

        assert!(run.epochs_run >= 1 && run.epochs_run <= 3);
        assert_eq!(run.history.train.len(), run.epochs_run);
        assert_eq!(run.history.validate.len(), run.epochs_run);
        assert_eq!(run.losses.len(), run.epochs_run);
        assert!(run.losses.iter().all(|l| l.is_finite()));
        assert_eq!(run.validate.predictions.len(), 3);
        assert_eq!(run.test.as_ref().map(|t| t.predictions.len()), Some(2));
    }

    fn write_fixture(root: &Path, count: usize) -> AttributePaths {
        let paths = AttributePaths::new(root, "Dominance");
        std::fs::create_dir_all(&paths.images_dir).unwrap();
        std::fs::create_dir_all(paths.annotations.parent().unwrap()).unwrap();

        let mut csv = String::from("image,Dominance\n");
        for i in 0..count {
            let name = format!("face_{i:03}.png");
            let level = (i * 9 % 256) as u8;
            GrayImage::from_pixel(IMAGE_WIDTH as u32, IMAGE_HEIGHT as u32, Luma([level]))
                .save(paths.images_dir.join(&name))
                .unwrap();
            csv.push_str(&format!("{},{}\n", name, 1.0 + i as f32 * 0.5));
        }
        std::fs::write(&paths.annotations, csv).unwrap();

        tiny_space().save(&paths.space_file).unwrap();
        paths
    }

    #[test]
    fn test_run_training_end_to_end() {
        let dir = TempDir::new().unwrap();
        let paths = write_fixture(dir.path(), 12);
        let space = HyperparameterSpace::load(&paths.space_file).unwrap();

        let outcome =
            run_training::<TrainingBackend>(&paths, &space, &tiny_config(2), Default::default())
                .unwrap();

        assert!(outcome.model_path.with_extension("mpk").exists());
        assert!(outcome.history_path.exists());
        assert!(outcome.plots_dir.join("r2_history.svg").exists());
        assert!(outcome.plots_dir.join("validate_scatter.svg").exists());
        assert_eq!(outcome.history.attribute, "Dominance");
        assert_eq!(outcome.history.train_r2.len(), outcome.history.epochs_run);

        let json = std::fs::read_to_string(&outcome.history_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["attribute"], "Dominance");
    }

    #[test]
    fn test_invalid_space_fails_before_loading() {
        let dir = TempDir::new().unwrap();
        let paths = AttributePaths::new(dir.path(), "Dominance");
        let space = HyperparameterSpace {
            batch_size: 0,
            ..tiny_space()
        };

        let err = run_training::<TrainingBackend>(&paths, &space, &tiny_config(1), Default::default())
            .unwrap_err();
        assert!(format!("{:#}", err).contains("batch_size"));
    }

    #[test]
    fn test_load_splits_pre_split() {
        let dir = TempDir::new().unwrap();
        let paths = write_fixture(dir.path(), 6);
        for (sub, names) in [
            ("Train", vec![0, 1, 2]),
            ("Validate", vec![3, 4]),
            ("Test", vec![5]),
        ] {
            let target = paths.images_dir.join(sub);
            std::fs::create_dir_all(&target).unwrap();
            for i in names {
                let name = format!("face_{i:03}.png");
                std::fs::copy(paths.images_dir.join(&name), target.join(&name)).unwrap();
            }
        }

        let splits = load_splits(&paths, &TrainingConfig::default()).unwrap();
        assert_eq!(splits.train.len(), 3);
        assert_eq!(splits.validate.len(), 2);
        assert_eq!(splits.test.len(), 1);
    }
}
