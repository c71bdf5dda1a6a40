//! Model module for the attribute regressor using the Burn framework
//!
//! This module provides:
//! - The VGG-style CNN built from a hyperparameter space
//! - Hyperparameter space, run configuration and attribute-derived paths
//! - Model save/load helpers

pub mod cnn;
pub mod config;

// Re-export main types for convenience
pub use cnn::{load_model, save_model, VggVariant};
pub use config::{AttributePaths, HyperparameterSpace, Monitor, TrainingConfig};
