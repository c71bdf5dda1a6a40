//! Training module for the attribute regressor
//!
//! This module provides:
//! - Correlation (R²) evaluation of a model over a split
//! - The early-stopping transition rule and its epoch-end controller
//! - The training loop with RMSprop, MSE loss and artifact persistence

pub mod early_stopping;
pub mod evaluator;
pub mod trainer;

// Re-export main types for convenience
pub use early_stopping::{
    transition, CorrelationEarlyStopping, CorrelationHistory, StoppingStatus, Transition,
};
pub use evaluator::{correlation, evaluate, predict, Evaluation};
pub use trainer::{run_training, train_model, TrainingHistory, TrainingOutcome, TrainingRun};

// Re-export TrainingConfig from model::config where it's defined
pub use crate::model::config::TrainingConfig;
