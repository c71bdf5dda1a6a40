//! # Face Attribute CNN
//!
//! A Rust library for regressing facial attribute scores (e.g. "Dominance") from
//! grayscale face images using the Burn framework.
//!
//! ## Features
//!
//! - **Weighted resampling** that flattens an imbalanced target distribution
//! - **VGG-style CNN** built from a declarative hyperparameter space
//! - **Correlation-based early stopping** driven by the squared Pearson correlation (R²)
//! - **Burn framework** with a CPU (NdArray) backend by default and CUDA behind a feature
//!
//! ## Modules
//!
//! - `dataset`: Annotation parsing, image loading, splitting, sampling, augmentation, batching
//! - `model`: Hyperparameter space and the CNN builder
//! - `training`: Correlation evaluation, early stopping and the training loop
//! - `utils`: Errors, logging, metrics and SVG charts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use face_attribute_cnn::model::config::{AttributePaths, HyperparameterSpace, TrainingConfig};
//! use face_attribute_cnn::training::trainer::run_training;
//! use face_attribute_cnn::backend::{default_device, TrainingBackend};
//!
//! let paths = AttributePaths::new(".", "Dominance");
//! let space = HyperparameterSpace::load(&paths.space_file)?;
//! let outcome = run_training::<TrainingBackend>(&paths, &space, &TrainingConfig::default(), default_device())?;
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::generator::{BatchGenerator, FaceBatch, FaceBatcher, FaceItem};
pub use dataset::sampler::{get_bin_index, SamplingWeights, TargetHistogram};
pub use dataset::{Dataset, Example};
pub use model::cnn::VggVariant;
pub use model::config::{AttributePaths, HyperparameterSpace, Monitor, TrainingConfig};
pub use training::early_stopping::{CorrelationEarlyStopping, StoppingStatus, Transition};
pub use utils::error::{FaceAttributeError, Result};

/// Height of the canonical face crop in pixels
pub const IMAGE_HEIGHT: usize = 150;

/// Width of the canonical face crop in pixels
pub const IMAGE_WIDTH: usize = 130;

/// Number of equal-width histogram bins used by the weighted sampler
pub const NUM_BINS: usize = 200;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
