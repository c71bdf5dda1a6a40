//! Dataset module for face attribute data
//!
//! This module provides functionality for:
//! - Parsing the annotation table keyed by image filename
//! - Loading grayscale face crops into memory
//! - Splitting a pooled dataset into train / validate / test
//! - Inverse-frequency weighted sampling over the target histogram
//! - Grayscale augmentation and the infinite batch generator

pub mod annotations;
pub mod augmentation;
pub mod generator;
pub mod loader;
pub mod sampler;
pub mod split;

pub use annotations::AnnotationTable;
pub use augmentation::{Augment, AugmentationConfig, NoAugmentation, RandomAugmenter};
pub use generator::{BatchGenerator, FaceBatch, FaceBatcher, FaceItem};
pub use loader::{load_data_into_memory, load_listed_images, TargetNormalizer};
pub use sampler::{get_bin_index, SamplingWeights, TargetHistogram};
pub use split::{split_dataset, DatasetSplits, SplitConfig};

use image::GrayImage;

/// One face crop paired with its attribute score
#[derive(Debug, Clone)]
pub struct Example {
    /// File name the example was loaded from (annotation key)
    pub name: String,
    /// 8-bit grayscale pixels, `IMAGE_WIDTH` x `IMAGE_HEIGHT`
    pub image: GrayImage,
    /// Attribute score; raw after loading, normalised once a `TargetNormalizer` is applied
    pub target: f32,
}

impl Example {
    pub fn new(name: impl Into<String>, image: GrayImage, target: f32) -> Self {
        Self {
            name: name.into(),
            image,
            target,
        }
    }

    /// Pixels rescaled to [0, 1] in row-major (H, W) order
    pub fn pixels(&self) -> Vec<f32> {
        scale_pixels(&self.image)
    }
}

/// Rescale 8-bit intensities to [0, 1]
pub fn scale_pixels(image: &GrayImage) -> Vec<f32> {
    image.as_raw().iter().map(|&p| p as f32 / 255.0).collect()
}

/// Ordered, read-only collection of examples
///
/// Index order matters only to the batch generator, which walks it as a cyclic cursor.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    examples: Vec<Example>,
}

impl Dataset {
    pub fn new(examples: Vec<Example>) -> Self {
        Self { examples }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn into_examples(self) -> Vec<Example> {
        self.examples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Example> {
        self.examples.iter()
    }

    /// Targets in index order
    pub fn targets(&self) -> Vec<f32> {
        self.examples.iter().map(|e| e.target).collect()
    }

    /// Map every target through `normalizer`
    pub fn normalize(&mut self, normalizer: &TargetNormalizer) {
        for example in &mut self.examples {
            example.target = normalizer.apply(example.target);
        }
    }
}

impl FromIterator<Example> for Dataset {
    fn from_iter<I: IntoIterator<Item = Example>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::{IMAGE_HEIGHT, IMAGE_WIDTH};

    #[test]
    fn test_pixels_are_scaled() {
        let example = Example::new("a.png", flat_image(255), 1.0);
        let pixels = example.pixels();
        assert_eq!(pixels.len(), IMAGE_HEIGHT * IMAGE_WIDTH);
        assert!(pixels.iter().all(|&p| (p - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_normalize_dataset() {
        let mut dataset = dataset_with_targets(&[2.0, 4.0, 6.0]);
        let normalizer = TargetNormalizer::fit(&dataset.targets()).unwrap();
        dataset.normalize(&normalizer);
        assert_eq!(dataset.targets(), vec![0.0, 0.5, 1.0]);
    }
}
