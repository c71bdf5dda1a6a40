//! Utilities module for logging, metrics, charts and error handling
//!
//! This module provides:
//! - Structured logging with tracing
//! - Correlation metrics (Pearson r, R², least-squares fit)
//! - SVG evaluation plots
//! - Error handling types

pub mod charts;
pub mod error;
pub mod logging;
pub mod metrics;

// Re-export main types for convenience
pub use error::{FaceAttributeError, Result};
pub use logging::init_logging;
pub use metrics::{linear_fit, pearson_r, r_squared, LinearFit};

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

/// Text histogram bar scaled against `max`
pub fn format_bar(count: usize, max: usize, width: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let len = (count as f64 / max as f64 * width as f64).round() as usize;
    "█".repeat(len)
}
