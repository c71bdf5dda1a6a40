//! Train / validate / test splitting
//!
//! A pooled dataset is shuffled with a fixed seed; `holdout_fraction` of it
//! (rounded up) is held out and that holdout is halved, the larger half
//! going to validation and the rest to test.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::Dataset;
use crate::utils::error::{FaceAttributeError, Result};

/// Configuration for dataset splitting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction held out from training (halved into validation and test)
    pub holdout_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            holdout_fraction: 0.10,
            seed: 42,
        }
    }
}

impl SplitConfig {
    pub fn new(holdout_fraction: f64, seed: u64) -> Result<Self> {
        if !(holdout_fraction > 0.0 && holdout_fraction < 1.0) {
            return Err(FaceAttributeError::Config(
                "Holdout fraction must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(Self {
            holdout_fraction,
            seed,
        })
    }
}

/// The three splits used by one training run
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    pub train: Dataset,
    pub validate: Dataset,
    pub test: Dataset,
}

impl DatasetSplits {
    pub fn total(&self) -> usize {
        self.train.len() + self.validate.len() + self.test.len()
    }
}

/// Shuffle and split a pooled dataset
///
/// At least two examples are held out so validation and test are never both
/// empty; the training split must keep at least one example.
pub fn split_dataset(dataset: Dataset, config: &SplitConfig) -> Result<DatasetSplits> {
    let total = dataset.len();
    let holdout = ((total as f64 * config.holdout_fraction).ceil() as usize).max(2);
    if holdout >= total {
        return Err(FaceAttributeError::Dataset(format!(
            "{} examples are too few to hold out {} for validation and test",
            total, holdout
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut examples = dataset.into_examples();
    examples.shuffle(&mut rng);

    let mut holdout_examples = examples.split_off(total - holdout);
    let validate_len = holdout.div_ceil(2);
    let validate_examples = holdout_examples.split_off(holdout - validate_len);

    let splits = DatasetSplits {
        train: Dataset::new(examples),
        validate: Dataset::new(validate_examples),
        test: Dataset::new(holdout_examples),
    };

    info!(
        "Split {} examples: {} train, {} validate, {} test",
        total,
        splits.train.len(),
        splits.validate.len(),
        splits.test.len()
    );

    Ok(splits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::test_support::dataset_with_targets;

    fn targets(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    #[test]
    fn test_split_sizes() {
        let dataset = dataset_with_targets(&targets(100));
        let splits = split_dataset(dataset, &SplitConfig::default()).unwrap();

        assert_eq!(splits.train.len(), 90);
        assert_eq!(splits.validate.len(), 5);
        assert_eq!(splits.test.len(), 5);
        assert_eq!(splits.total(), 100);
    }

    #[test]
    fn test_split_odd_holdout() {
        let dataset = dataset_with_targets(&targets(25));
        let splits = split_dataset(dataset, &SplitConfig::default()).unwrap();

        // ceil(2.5) = 3 held out, validation gets the larger half
        assert_eq!(splits.train.len(), 22);
        assert_eq!(splits.validate.len(), 2);
        assert_eq!(splits.test.len(), 1);
    }

    #[test]
    fn test_split_is_deterministic_and_disjoint() {
        let first = split_dataset(dataset_with_targets(&targets(50)), &SplitConfig::default()).unwrap();
        let second = split_dataset(dataset_with_targets(&targets(50)), &SplitConfig::default()).unwrap();
        assert_eq!(first.train.targets(), second.train.targets());
        assert_eq!(first.test.targets(), second.test.targets());

        let mut all: Vec<f32> = first
            .train
            .targets()
            .into_iter()
            .chain(first.validate.targets())
            .chain(first.test.targets())
            .collect();
        all.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(all, targets(50));
    }

    #[test]
    fn test_seed_changes_split() {
        let a = split_dataset(dataset_with_targets(&targets(50)), &SplitConfig::new(0.1, 1).unwrap()).unwrap();
        let b = split_dataset(dataset_with_targets(&targets(50)), &SplitConfig::new(0.1, 2).unwrap()).unwrap();
        assert_ne!(a.train.targets(), b.train.targets());
    }

    #[test]
    fn test_too_small_dataset() {
        let dataset = dataset_with_targets(&targets(2));
        assert!(split_dataset(dataset, &SplitConfig::default()).is_err());
    }

    #[test]
    fn test_invalid_fraction() {
        assert!(SplitConfig::new(0.0, 42).is_err());
        assert!(SplitConfig::new(1.0, 42).is_err());
    }
}
