//! Regression Metrics Module
//!
//! Correlation-based metrics used to judge the attribute regressor:
//! Pearson correlation, its square (R²) and an ordinary least-squares fit.
//! All accumulation happens in f64; degenerate inputs yield NaN rather than
//! an error so callers decide how to treat them.

use serde::{Deserialize, Serialize};

/// Least-squares line `y = slope * x + intercept` with the correlation `r`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r: f64,
}

impl LinearFit {
    /// Squared correlation
    pub fn r_squared(&self) -> f64 {
        self.r * self.r
    }

    /// Evaluate the fitted line at `x`
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

fn mean(values: &[f32]) -> f64 {
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

/// Fit `y` against `x` by ordinary least squares.
///
/// Returns NaN fields when the inputs are empty, have different lengths, or
/// `x` has zero variance. `r` is NaN when either side has zero variance.
pub fn linear_fit(x: &[f32], y: &[f32]) -> LinearFit {
    let nan = LinearFit {
        slope: f64::NAN,
        intercept: f64::NAN,
        r: f64::NAN,
    };
    if x.is_empty() || x.len() != y.len() {
        return nan;
    }

    let mean_x = mean(x);
    let mean_y = mean(y);

    let (mut sxx, mut syy, mut sxy) = (0.0f64, 0.0f64, 0.0f64);
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi as f64 - mean_x;
        let dy = yi as f64 - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    if sxx == 0.0 {
        return nan;
    }

    let slope = sxy / sxx;
    let r = if syy == 0.0 {
        f64::NAN
    } else {
        (sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0)
    };

    LinearFit {
        slope,
        intercept: mean_y - slope * mean_x,
        r,
    }
}

/// Pearson correlation coefficient between two equally long series
pub fn pearson_r(x: &[f32], y: &[f32]) -> f64 {
    linear_fit(x, y).r
}

/// Squared Pearson correlation between ground truth and predictions.
///
/// NaN when either series has zero variance.
pub fn r_squared(truth: &[f32], predicted: &[f32]) -> f64 {
    let r = pearson_r(predicted, truth);
    r * r
}

/// Running average for tracking metrics over time
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// Mean of the values added so far, 0 when empty
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_correlation() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson_r(&x, &y) - 1.0).abs() < 1e-12);
        assert!((r_squared(&y, &x) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_correlation_squares_positive() {
        let x = [1.0, 2.0, 3.0];
        let y = [3.0, 2.0, 1.0];
        assert!((pearson_r(&x, &y) + 1.0).abs() < 1e-12);
        assert!((r_squared(&y, &x) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_known_r_squared() {
        // y = x + noise, computed by hand: r = 0.8
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 1.0, 4.0, 3.0, 5.0];
        assert!((pearson_r(&x, &y) - 0.8).abs() < 1e-9);
        assert!((r_squared(&y, &x) - 0.64).abs() < 1e-9);
    }

    #[test]
    fn test_zero_variance_is_nan() {
        let truth = [0.1, 0.5, 0.9];
        let constant = [0.3, 0.3, 0.3];
        assert!(r_squared(&truth, &constant).is_nan());
        assert!(r_squared(&constant, &truth).is_nan());
    }

    #[test]
    fn test_mismatched_or_empty_is_nan() {
        assert!(pearson_r(&[], &[]).is_nan());
        assert!(pearson_r(&[1.0, 2.0], &[1.0]).is_nan());
    }

    #[test]
    fn test_linear_fit_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let fit = linear_fit(&x, &y);
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!((fit.predict(4.0) - 9.0).abs() < 1e-12);
        assert!((fit.r_squared() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_running_average() {
        let mut avg = RunningAverage::new();
        assert_eq!(avg.average(), 0.0);
        avg.add(1.0);
        avg.add(3.0);
        assert_eq!(avg.count(), 2);
        assert!((avg.average() - 2.0).abs() < 1e-12);
        avg.reset();
        assert_eq!(avg.count(), 0);
    }
}
