//! Infinite batch generator and Burn batcher
//!
//! `BatchGenerator` walks the training set with a single cyclic cursor. With
//! weighted sampling enabled, each slot advances the cursor until a rejection
//! draw against the example's weight succeeds; the accepted example is then
//! optionally augmented, rescaled to [0, 1] and appended. The cursor persists
//! across batches, so the batch sequence depends on call order.

use std::marker::PhantomData;
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use super::augmentation::{Augment, RandomAugmenter};
use super::sampler::SamplingWeights;
use super::{scale_pixels, Dataset, Example};
use crate::model::config::HyperparameterSpace;
use crate::utils::error::{FaceAttributeError, Result};
use crate::{IMAGE_HEIGHT, IMAGE_WIDTH};

/// Full passes over the dataset a single acceptance search may take before
/// the current example is taken regardless of its weight
pub const MAX_SCAN_PASSES: usize = 10;

/// One example ready for batching
#[derive(Clone, Debug)]
pub struct FaceItem {
    /// Row-major `IMAGE_HEIGHT * IMAGE_WIDTH` intensities in [0, 1]
    pub image: Vec<f32>,
    /// Normalised attribute score
    pub target: f32,
}

impl FaceItem {
    pub fn from_example(example: &Example) -> Self {
        Self {
            image: example.pixels(),
            target: example.target,
        }
    }
}

/// Generator over fixed-size training batches that never terminates
pub struct BatchGenerator {
    dataset: Arc<Dataset>,
    space: HyperparameterSpace,
    batch_size: usize,
    weights: Option<SamplingWeights>,
    augmenter: Option<Box<dyn Augment + Send + Sync>>,
    rng: ChaCha8Rng,
    cursor: usize,
}

impl BatchGenerator {
    /// Build a generator following the space's `weighted_sampling` and `augment` toggles
    pub fn new(dataset: Arc<Dataset>, space: &HyperparameterSpace, seed: u64) -> Result<Self> {
        if dataset.is_empty() {
            return Err(FaceAttributeError::Dataset(
                "cannot generate batches from an empty dataset".to_string(),
            ));
        }
        if space.batch_size == 0 {
            return Err(FaceAttributeError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        let weights = if space.weighted_sampling {
            let weights = SamplingWeights::new(
                &dataset.targets(),
                space.sampling_factor,
                space.sampling_intercept,
            )?;
            debug!(
                "Weighted sampling over {} bins, floor {:.4}",
                weights.histogram().num_bins(),
                weights.floor()
            );
            Some(weights)
        } else {
            None
        };

        let augmenter: Option<Box<dyn Augment + Send + Sync>> = if space.augment {
            Some(Box::new(RandomAugmenter::default()))
        } else {
            None
        };

        Ok(Self {
            dataset,
            space: space.clone(),
            batch_size: space.batch_size,
            weights,
            augmenter,
            rng: ChaCha8Rng::seed_from_u64(seed),
            cursor: 0,
        })
    }

    /// Replace the augmenter; only consulted when the space enables `augment`
    pub fn with_augmenter<A: Augment + Send + Sync + 'static>(mut self, augmenter: A) -> Self {
        if self.space.augment {
            self.augmenter = Some(Box::new(augmenter));
        }
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Index the next acceptance search starts from
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn weights(&self) -> Option<&SamplingWeights> {
        self.weights.as_ref()
    }

    /// Advance the cursor through one batch worth of accepted indices
    pub fn next_batch_indices(&mut self) -> Vec<usize> {
        let len = self.dataset.len();
        let mut indices = Vec::with_capacity(self.batch_size);

        while indices.len() < self.batch_size {
            if let Some(weights) = &self.weights {
                let limit = len * MAX_SCAN_PASSES;
                let mut rejections = 0usize;
                while !weights.should_sample(self.cursor, &mut self.rng) {
                    self.cursor = (self.cursor + 1) % len;
                    rejections += 1;
                    if rejections >= limit {
                        warn!(
                            "No example accepted after {} draws, taking index {}",
                            rejections, self.cursor
                        );
                        break;
                    }
                }
            }
            indices.push(self.cursor);
            self.cursor = (self.cursor + 1) % len;
        }

        indices
    }

    /// Draw the next batch of (optionally augmented) items
    pub fn next_batch(&mut self) -> Vec<FaceItem> {
        let indices = self.next_batch_indices();
        let dataset = Arc::clone(&self.dataset);

        indices
            .into_iter()
            .map(|i| {
                let example = &dataset.examples()[i];
                let image = match &self.augmenter {
                    Some(augmenter) => {
                        scale_pixels(&augmenter.augment(&example.image, &self.space, &mut self.rng))
                    }
                    None => example.pixels(),
                };
                FaceItem {
                    image,
                    target: example.target,
                }
            })
            .collect()
    }
}

impl Iterator for BatchGenerator {
    type Item = Vec<FaceItem>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

/// A batch of face images and their targets
#[derive(Clone, Debug)]
pub struct FaceBatch<B: Backend> {
    /// Images with shape [batch_size, 1, IMAGE_HEIGHT, IMAGE_WIDTH]
    pub images: Tensor<B, 4>,
    /// Targets with shape [batch_size, 1]
    pub targets: Tensor<B, 2>,
}

/// Turns `FaceItem`s into tensors
#[derive(Clone, Debug, Default)]
pub struct FaceBatcher<B: Backend> {
    _backend: PhantomData<B>,
}

impl<B: Backend> FaceBatcher<B> {
    pub fn new() -> Self {
        Self {
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, FaceItem, FaceBatch<B>> for FaceBatcher<B> {
    fn batch(&self, items: Vec<FaceItem>, device: &B::Device) -> FaceBatch<B> {
        let batch_size = items.len();

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 1, IMAGE_HEIGHT, IMAGE_WIDTH]),
            device,
        );

        let targets_data: Vec<f32> = items.iter().map(|item| item.target).collect();
        let targets =
            Tensor::<B, 2>::from_floats(TensorData::new(targets_data, [batch_size, 1]), device);

        FaceBatch { images, targets }
    }
}
