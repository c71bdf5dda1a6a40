//! Data Augmentation Module for face crops
//!
//! Provides on-the-fly grayscale augmentations applied by the batch generator
//! when the hyperparameter space enables `augment`. Every transform keeps the
//! image dimensions unchanged.
//!
//! # Augmentation Strategy
//!
//! - **Training**: random flip, small rotation/translation, brightness and contrast jitter
//! - **Validation/Test**: no augmentation (clean evaluation)

use image::{GrayImage, Luma};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::model::config::HyperparameterSpace;

/// Transforms an image into a perturbed image of the same shape
pub trait Augment {
    fn augment(
        &self,
        image: &GrayImage,
        space: &HyperparameterSpace,
        rng: &mut ChaCha8Rng,
    ) -> GrayImage;
}

/// Configuration for data augmentation
#[derive(Clone, Debug)]
pub struct AugmentationConfig {
    /// Probability of applying horizontal flip (0.0 - 1.0)
    pub horizontal_flip_prob: f32,
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Probability of applying rotation
    pub rotation_prob: f32,
    /// Maximum shift as a fraction of width/height
    pub max_shift_fraction: f32,
    /// Probability of applying translation
    pub translation_prob: f32,
    /// Brightness adjustment range (±brightness_delta)
    pub brightness_delta: f32,
    /// Probability of applying brightness adjustment
    pub brightness_prob: f32,
    /// Contrast adjustment range (1.0 ± contrast_delta)
    pub contrast_delta: f32,
    /// Probability of applying contrast adjustment
    pub contrast_prob: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            horizontal_flip_prob: 0.5,
            rotation_degrees: 10.0,
            rotation_prob: 0.5,
            max_shift_fraction: 0.05,
            translation_prob: 0.5,
            brightness_delta: 0.1,
            brightness_prob: 0.5,
            contrast_delta: 0.15,
            contrast_prob: 0.5,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations
    pub fn none() -> Self {
        Self {
            horizontal_flip_prob: 0.0,
            rotation_degrees: 0.0,
            rotation_prob: 0.0,
            max_shift_fraction: 0.0,
            translation_prob: 0.0,
            brightness_delta: 0.0,
            brightness_prob: 0.0,
            contrast_delta: 0.0,
            contrast_prob: 0.0,
        }
    }
}

/// Passes images through unchanged
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAugmentation;

impl Augment for NoAugmentation {
    fn augment(
        &self,
        image: &GrayImage,
        _space: &HyperparameterSpace,
        _rng: &mut ChaCha8Rng,
    ) -> GrayImage {
        image.clone()
    }
}

/// Applies each configured transform with its own probability
#[derive(Clone, Debug, Default)]
pub struct RandomAugmenter {
    config: AugmentationConfig,
}

impl RandomAugmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Rotate by `angle_degrees` about the centre, then shift by `(dx, dy)` pixels
    fn warp(&self, img: &GrayImage, angle_degrees: f32, dx: f32, dy: f32) -> GrayImage {
        let (width, height) = img.dimensions();
        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;
        let (sin_a, cos_a) = angle_degrees.to_radians().sin_cos();

        GrayImage::from_fn(width, height, |x, y| {
            // Inverse map: undo the shift, then the rotation
            let px = x as f32 - dx - cx;
            let py = y as f32 - dy - cy;
            let src_x = cx + px * cos_a + py * sin_a;
            let src_y = cy - px * sin_a + py * cos_a;
            Luma([bilinear_sample(img, src_x, src_y)])
        })
    }

    fn adjust_brightness(&self, img: &GrayImage, delta: f32) -> GrayImage {
        let offset = delta * 255.0;
        map_pixels(img, |p| p + offset)
    }

    /// Scale intensities around the mean
    fn adjust_contrast(&self, img: &GrayImage, factor: f32) -> GrayImage {
        let count = img.as_raw().len().max(1) as f64;
        let mean = (img.as_raw().iter().map(|&p| p as f64).sum::<f64>() / count) as f32;
        map_pixels(img, |p| mean + factor * (p - mean))
    }
}

impl Augment for RandomAugmenter {
    fn augment(
        &self,
        image: &GrayImage,
        _space: &HyperparameterSpace,
        rng: &mut ChaCha8Rng,
    ) -> GrayImage {
        let config = &self.config;
        let mut result = image.clone();

        if rng.gen::<f32>() < config.horizontal_flip_prob {
            result = image::imageops::flip_horizontal(&result);
        }

        let angle = if config.rotation_prob > 0.0
            && config.rotation_degrees > 0.0
            && rng.gen::<f32>() < config.rotation_prob
        {
            rng.gen_range(-config.rotation_degrees..=config.rotation_degrees)
        } else {
            0.0
        };

        let (dx, dy) = if config.translation_prob > 0.0
            && config.max_shift_fraction > 0.0
            && rng.gen::<f32>() < config.translation_prob
        {
            let (width, height) = result.dimensions();
            let max_dx = config.max_shift_fraction * width as f32;
            let max_dy = config.max_shift_fraction * height as f32;
            (
                rng.gen_range(-max_dx..=max_dx),
                rng.gen_range(-max_dy..=max_dy),
            )
        } else {
            (0.0, 0.0)
        };

        if angle.abs() >= 0.1 || dx.abs() >= 0.5 || dy.abs() >= 0.5 {
            result = self.warp(&result, angle, dx, dy);
        }

        if config.brightness_prob > 0.0
            && config.brightness_delta > 0.0
            && rng.gen::<f32>() < config.brightness_prob
        {
            let delta = rng.gen_range(-config.brightness_delta..=config.brightness_delta);
            result = self.adjust_brightness(&result, delta);
        }

        if config.contrast_prob > 0.0
            && config.contrast_delta > 0.0
            && rng.gen::<f32>() < config.contrast_prob
        {
            let factor = 1.0 + rng.gen_range(-config.contrast_delta..=config.contrast_delta);
            result = self.adjust_contrast(&result, factor);
        }

        result
    }
}

fn map_pixels(img: &GrayImage, f: impl Fn(f32) -> f32) -> GrayImage {
    let (width, height) = img.dimensions();
    let data = img
        .as_raw()
        .iter()
        .map(|&p| f(p as f32).round().clamp(0.0, 255.0) as u8)
        .collect();
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| img.clone())
}

/// Bilinear interpolation with edge clamping
fn bilinear_sample(img: &GrayImage, x: f32, y: f32) -> u8 {
    let (width, height) = img.dimensions();
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let v00 = img.get_pixel(x0, y0)[0] as f32;
    let v10 = img.get_pixel(x1, y0)[0] as f32;
    let v01 = img.get_pixel(x0, y1)[0] as f32;
    let v11 = img.get_pixel(x1, y1)[0] as f32;

    let v = v00 * (1.0 - fx) * (1.0 - fy)
        + v10 * fx * (1.0 - fy)
        + v01 * (1.0 - fx) * fy
        + v11 * fx * fy;
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IMAGE_HEIGHT, IMAGE_WIDTH};
    use rand::SeedableRng;

    fn create_test_image() -> GrayImage {
        GrayImage::from_fn(IMAGE_WIDTH as u32, IMAGE_HEIGHT as u32, |x, y| {
            Luma([((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_augment_preserves_shape() {
        let aug = RandomAugmenter::default();
        let space = HyperparameterSpace::default();
        let img = create_test_image();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        for _ in 0..20 {
            let result = aug.augment(&img, &space, &mut rng);
            assert_eq!(result.dimensions(), img.dimensions());
        }
    }

    #[test]
    fn test_no_augmentation_is_identity() {
        let img = create_test_image();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let result = NoAugmentation.augment(&img, &HyperparameterSpace::default(), &mut rng);
        assert_eq!(result, img);

        let disabled = RandomAugmenter::new(AugmentationConfig::none());
        let result = disabled.augment(&img, &HyperparameterSpace::default(), &mut rng);
        assert_eq!(result, img);
    }

    #[test]
    fn test_same_seed_same_result() {
        let aug = RandomAugmenter::default();
        let space = HyperparameterSpace::default();
        let img = create_test_image();

        let a = aug.augment(&img, &space, &mut ChaCha8Rng::seed_from_u64(3));
        let b = aug.augment(&img, &space, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_warp_identity() {
        let aug = RandomAugmenter::default();
        let img = create_test_image();
        assert_eq!(aug.warp(&img, 0.0, 0.0, 0.0), img);
    }

    #[test]
    fn test_warp_shift() {
        let aug = RandomAugmenter::default();
        let img = create_test_image();
        let shifted = aug.warp(&img, 0.0, 2.0, 0.0);
        assert_eq!(shifted.get_pixel(10, 5), img.get_pixel(8, 5));
        // Left border is clamped to the first column
        assert_eq!(shifted.get_pixel(0, 5), img.get_pixel(0, 5));
    }

    #[test]
    fn test_brightness_and_contrast() {
        let aug = RandomAugmenter::default();
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([100 + 20 * x as u8]));

        let brighter = aug.adjust_brightness(&img, 0.1);
        assert!(brighter.get_pixel(0, 0)[0] > img.get_pixel(0, 0)[0]);

        let saturated = aug.adjust_brightness(&GrayImage::from_pixel(2, 2, Luma([250])), 0.2);
        assert_eq!(saturated.get_pixel(0, 0)[0], 255);

        // mean 130: 100 -> 115, 160 -> 145 at factor 0.5
        let flatter = aug.adjust_contrast(&img, 0.5);
        assert_eq!(flatter.get_pixel(0, 0)[0], 115);
        assert_eq!(flatter.get_pixel(3, 0)[0], 145);
    }
}
