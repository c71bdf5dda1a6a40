//! Inverse-frequency weighted sampling
//!
//! Targets are binned into `NUM_BINS` equal-width bins. Each example gets the
//! acceptance probability of its bin:
//!
//! ```text
//! weight = (1 - count / most)^sampling_factor + 10^-sampling_intercept
//! ```
//!
//! so the most populous bin sits at the floor and rare bins approach `1 + floor`.

use rand::Rng;
use serde::Serialize;

use crate::utils::error::{FaceAttributeError, Result};
use crate::NUM_BINS;

/// Bin of `value` given ascending `edges` (`edges.len() == bins + 1`)
///
/// Bins are left-open: `value` lands in the first bin whose upper edge is
/// `>= value`, so the global minimum maps to bin 0. Values above the last edge
/// (or NaN) land in the last bin rather than out of range.
pub fn get_bin_index(edges: &[f64], value: f64) -> usize {
    let bins = edges.len().saturating_sub(1);
    edges
        .iter()
        .skip(1)
        .position(|&upper| value <= upper)
        .unwrap_or(bins.saturating_sub(1))
}

/// Equal-width histogram over the observed target range
#[derive(Debug, Clone, Serialize)]
pub struct TargetHistogram {
    pub counts: Vec<usize>,
    pub edges: Vec<f64>,
}

impl TargetHistogram {
    /// Histogram with `NUM_BINS` bins
    pub fn new(targets: &[f32]) -> Result<Self> {
        Self::with_bins(targets, NUM_BINS)
    }

    pub fn with_bins(targets: &[f32], bins: usize) -> Result<Self> {
        if targets.is_empty() || bins == 0 {
            return Err(FaceAttributeError::Dataset(
                "cannot build a histogram of an empty target array".to_string(),
            ));
        }
        if targets.iter().any(|t| !t.is_finite()) {
            return Err(FaceAttributeError::Dataset(
                "targets must be finite".to_string(),
            ));
        }

        let min = targets.iter().map(|&t| t as f64).fold(f64::INFINITY, f64::min);
        let max = targets
            .iter()
            .map(|&t| t as f64)
            .fold(f64::NEG_INFINITY, f64::max);
        // A constant array gets a unit-wide range centred on the value
        let (lo, hi) = if min == max {
            (min - 0.5, max + 0.5)
        } else {
            (min, max)
        };

        let width = (hi - lo) / bins as f64;
        let mut edges: Vec<f64> = (0..bins).map(|i| lo + width * i as f64).collect();
        edges.push(hi);

        let mut counts = vec![0usize; bins];
        for &t in targets {
            counts[get_bin_index(&edges, t as f64)] += 1;
        }

        Ok(Self { counts, edges })
    }

    pub fn num_bins(&self) -> usize {
        self.counts.len()
    }

    /// Largest bin count
    pub fn most(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn bin_of(&self, value: f32) -> usize {
        get_bin_index(&self.edges, value as f64)
    }
}

/// Per-example acceptance probabilities for rejection sampling
#[derive(Debug, Clone)]
pub struct SamplingWeights {
    histogram: TargetHistogram,
    bin_weights: Vec<f64>,
    weights: Vec<f64>,
    floor: f64,
}

impl SamplingWeights {
    pub fn new(targets: &[f32], sampling_factor: f64, sampling_intercept: f64) -> Result<Self> {
        let histogram = TargetHistogram::new(targets)?;
        let most = histogram.most() as f64;
        let floor = 10f64.powf(-sampling_intercept);

        let bin_weights: Vec<f64> = histogram
            .counts
            .iter()
            .map(|&count| (1.0 - count as f64 / most).powf(sampling_factor) + floor)
            .collect();

        let weights = targets
            .iter()
            .map(|&t| bin_weights[histogram.bin_of(t)])
            .collect();

        Ok(Self {
            histogram,
            bin_weights,
            weights,
            floor,
        })
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Acceptance probability of example `index`
    pub fn weight(&self, index: usize) -> f64 {
        self.weights[index]
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Weight of every histogram bin
    pub fn bin_weights(&self) -> &[f64] {
        &self.bin_weights
    }

    pub fn histogram(&self) -> &TargetHistogram {
        &self.histogram
    }

    /// `10^-sampling_intercept`
    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// Draw `u ~ U[0, 1)` and accept example `index` when `u <= weight`
    pub fn should_sample<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> bool {
        rng.gen::<f64>() <= self.weights[index]
    }
}
