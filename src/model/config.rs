//! Model Configuration Module
//!
//! Defines the hyperparameter space that describes the network and sampler,
//! the run-level training configuration, and the filesystem layout derived
//! from an attribute name.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::utils::error::{FaceAttributeError, Result};

/// Declarative description of the network architecture and training knobs.
///
/// Loaded from `Spaces/<attribute>_space.json`. Every key is required; extra
/// keys written by hyperparameter-search tools are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterSpace {
    /// Stage 0: one block of two convolutions + pooling per entry
    #[serde(deserialize_with = "counts")]
    pub conv0filters: Vec<usize>,

    /// Stage 1: one block of two convolutions + pooling per entry
    #[serde(deserialize_with = "counts")]
    pub conv1filters: Vec<usize>,

    /// Stage 2: one block of three convolutions + pooling per entry
    #[serde(deserialize_with = "counts")]
    pub conv2filters: Vec<usize>,

    /// Number of fully-connected blocks before the regression head
    #[serde(deserialize_with = "count")]
    pub num_fc: usize,

    /// Width of each fully-connected block
    #[serde(deserialize_with = "count")]
    pub fcoutput: usize,

    /// Dropout rate after each fully-connected block
    pub dropout: f64,

    /// Negative decade exponent of the step size (`lr = 10^-learning_rate`)
    pub learning_rate: f64,

    /// Examples per training batch
    #[serde(deserialize_with = "count")]
    pub batch_size: usize,

    /// Rejection-sample examples to flatten the target distribution
    pub weighted_sampling: bool,

    /// Apply random augmentation to training images
    pub augment: bool,

    /// Sharpness exponent of the inverse-frequency weights
    pub sampling_factor: f64,

    /// Decade exponent of the weight floor (`floor = 10^-sampling_intercept`)
    pub sampling_intercept: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Count {
    Int(u64),
    Float(f64),
}

impl Count {
    fn into_usize<E: serde::de::Error>(self) -> std::result::Result<usize, E> {
        match self {
            Count::Int(v) => usize::try_from(v).map_err(E::custom),
            Count::Float(v) if v >= 0.0 && v.fract() == 0.0 && v <= usize::MAX as f64 => {
                Ok(v as usize)
            }
            Count::Float(v) => Err(E::custom(format!(
                "expected a non-negative integer, found {}",
                v
            ))),
        }
    }
}

fn count<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<usize, D::Error> {
    Count::deserialize(deserializer)?.into_usize()
}

fn counts<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<usize>, D::Error> {
    Vec::<Count>::deserialize(deserializer)?
        .into_iter()
        .map(Count::into_usize)
        .collect()
}

impl Default for HyperparameterSpace {
    fn default() -> Self {
        Self {
            conv0filters: vec![32],
            conv1filters: vec![64],
            conv2filters: vec![128],
            num_fc: 2,
            fcoutput: 256,
            dropout: 0.5,
            learning_rate: 4.0,
            batch_size: 32,
            weighted_sampling: true,
            augment: true,
            sampling_factor: 3.0,
            sampling_intercept: 2.0,
        }
    }
}

impl HyperparameterSpace {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let space: Self = serde_json::from_str(json)
            .map_err(|e| FaceAttributeError::Config(format!("invalid hyperparameter space: {}", e)))?;
        space.validate()?;
        Ok(space)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate a space file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceAttributeError::PathNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save the space as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Total number of 2x2 pooling steps in the convolutional trunk
    pub fn num_pools(&self) -> usize {
        self.conv0filters.len() + self.conv1filters.len() + self.conv2filters.len()
    }

    /// Spatial size `(height, width)` of the feature map entering the flatten layer
    pub fn pooled_dims(&self, height: usize, width: usize) -> (usize, usize) {
        (0..self.num_pools()).fold((height, width), |(h, w), _| (h / 2, w / 2))
    }

    /// RMSprop step size
    pub fn step_size(&self) -> f64 {
        10f64.powf(-self.learning_rate)
    }

    /// Additive floor of every sampling weight
    pub fn sampling_floor(&self) -> f64 {
        10f64.powf(-self.sampling_intercept)
    }

    /// Check ranges; must pass before any model or optimizer is allocated
    pub fn validate(&self) -> Result<()> {
        let filters = self
            .conv0filters
            .iter()
            .chain(&self.conv1filters)
            .chain(&self.conv2filters);
        for &f in filters {
            if f == 0 {
                return Err(FaceAttributeError::Config(
                    "convolution filter counts must be positive".to_string(),
                ));
            }
        }

        if self.num_fc > 0 && self.fcoutput == 0 {
            return Err(FaceAttributeError::Config(
                "fcoutput must be positive when num_fc > 0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(FaceAttributeError::Config(
                "dropout must be in range [0.0, 1.0)".to_string(),
            ));
        }

        if !self.learning_rate.is_finite() {
            return Err(FaceAttributeError::Config(
                "learning_rate must be finite".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(FaceAttributeError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if !(self.sampling_factor.is_finite() && self.sampling_factor >= 1.0) {
            return Err(FaceAttributeError::Config(
                "sampling_factor must be a finite number >= 1".to_string(),
            ));
        }

        if !(self.sampling_intercept.is_finite() && self.sampling_intercept >= 0.0) {
            return Err(FaceAttributeError::Config(
                "sampling_intercept must be a finite number >= 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate against a concrete input shape as well
    pub fn validate_for_input(&self, height: usize, width: usize) -> Result<()> {
        self.validate()?;
        let (h, w) = self.pooled_dims(height, width);
        if h == 0 || w == 0 {
            return Err(FaceAttributeError::Config(format!(
                "{} pooling steps reduce a {}x{} input to nothing",
                self.num_pools(),
                height,
                width
            )));
        }
        Ok(())
    }
}

/// Which split's correlation drives early stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Monitor {
    Train,
    #[default]
    Validate,
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Monitor::Train => write!(f, "train"),
            Monitor::Validate => write!(f, "validate"),
        }
    }
}

impl FromStr for Monitor {
    type Err = FaceAttributeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "train" => Ok(Monitor::Train),
            "validate" | "validation" | "val" => Ok(Monitor::Validate),
            other => Err(FaceAttributeError::Config(format!(
                "unknown monitor '{}', expected 'train' or 'validate'",
                other
            ))),
        }
    }
}

/// Run-level settings that are not part of the searched hyperparameter space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Maximum number of epochs
    pub epochs: usize,

    /// Generator batches drawn per epoch
    pub steps_per_epoch: usize,

    /// Epochs without improvement tolerated before stopping
    pub patience: usize,

    /// Minimum improvement of the monitored R² over the best so far
    pub delta: f64,

    /// Split whose R² is monitored
    pub monitor: Monitor,

    /// Seed for splitting, sampling and augmentation
    pub seed: u64,

    /// Fraction held out from a pooled dataset; halved into test and validation
    pub holdout_fraction: f64,

    /// Batch size used when predicting for evaluation
    pub eval_batch_size: usize,

    /// RMSprop smoothing constant
    pub rmsprop_rho: f32,

    /// RMSprop numerical epsilon
    pub rmsprop_epsilon: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            steps_per_epoch: 1,
            patience: 6,
            delta: 0.01,
            monitor: Monitor::Validate,
            seed: 42,
            holdout_fraction: 0.1,
            eval_batch_size: 64,
            rmsprop_rho: 0.9,
            rmsprop_epsilon: 1e-8,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 || self.steps_per_epoch == 0 {
            return Err(FaceAttributeError::Config(
                "epochs and steps_per_epoch must be greater than 0".to_string(),
            ));
        }
        if !(self.holdout_fraction > 0.0 && self.holdout_fraction < 1.0) {
            return Err(FaceAttributeError::Config(
                "holdout_fraction must be in range (0.0, 1.0)".to_string(),
            ));
        }
        if self.eval_batch_size == 0 {
            return Err(FaceAttributeError::Config(
                "eval_batch_size must be greater than 0".to_string(),
            ));
        }
        if !self.delta.is_finite() {
            return Err(FaceAttributeError::Config("delta must be finite".to_string()));
        }
        Ok(())
    }
}

/// Filesystem layout for one attribute, rooted at `root`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePaths {
    pub attribute: String,
    pub annotations: PathBuf,
    pub images_dir: PathBuf,
    pub space_file: PathBuf,
    pub models_dir: PathBuf,
}

impl AttributePaths {
    pub fn new<P: AsRef<Path>>(root: P, attribute: &str) -> Self {
        let root = root.as_ref();
        Self {
            attribute: attribute.to_string(),
            annotations: root
                .join("Annotations")
                .join(attribute)
                .join("annotations.csv"),
            images_dir: root.join("Images").join(attribute),
            space_file: root.join("Spaces").join(format!("{}_space.json", attribute)),
            models_dir: root.join("Models"),
        }
    }

    /// Use a different space file
    pub fn with_space_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.space_file = path.into();
        self
    }

    /// Write artifacts somewhere other than `<root>/Models`
    pub fn with_models_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.models_dir = path.into();
        self
    }

    pub fn train_dir(&self) -> PathBuf {
        self.images_dir.join("Train")
    }

    pub fn validate_dir(&self) -> PathBuf {
        self.images_dir.join("Validate")
    }

    pub fn test_dir(&self) -> PathBuf {
        self.images_dir.join("Test")
    }

    /// True when `Train/`, `Validate/` and `Test/` subdirectories exist
    pub fn is_pre_split(&self) -> bool {
        self.train_dir().is_dir() && self.validate_dir().is_dir() && self.test_dir().is_dir()
    }

    /// Model artifact path; the recorder appends its own extension
    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join(&self.attribute)
    }

    pub fn history_path(&self) -> PathBuf {
        self.models_dir
            .join(format!("{}_history.json", self.attribute))
    }

    pub fn plots_dir(&self) -> PathBuf {
        self.models_dir.join(format!("{}_plots", self.attribute))
    }
}
