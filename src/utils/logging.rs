//! Logging Module
//!
//! Structured logging using the `tracing` crate, plus a small epoch logger
//! that reports correlation metrics during training.

use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }

    /// Errors only
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            ..Self::default()
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Initialize logging with the given configuration
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Progress bar for loading `total` files
pub fn loading_bar(total: usize, message: &str) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    bar.set_style(style);
    bar.set_message(message.to_string());
    bar
}

/// Early-stop notice; `num_epochs` is the zero-based epoch recorded by the
/// stopping rule, printed as-is like the saved history and CLI summary
pub fn early_stop_message(patience: usize, num_epochs: usize) -> String {
    format!(
        "Early stopping: no improvement for {} epochs, recorded epoch {}",
        patience, num_epochs
    )
}

/// Per-epoch training logger
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();
        tracing::debug!("Epoch {}/{} started", epoch + 1, self.total_epochs);
    }

    /// Log end of an epoch with the mean training loss
    pub fn end_epoch(&self, train_loss: f64) {
        tracing::info!(
            "Epoch {}/{} in {:.1}s | Loss: {:.5}",
            self.epoch + 1,
            self.total_epochs,
            self.epoch_start.elapsed().as_secs_f64(),
            train_loss
        );
    }

    pub fn log_new_best(&self, r2: f64) {
        tracing::info!("New best model! r2: {:.4}", r2);
    }

    pub fn log_early_stop(&self, patience: usize, num_epochs: usize) {
        tracing::warn!("{}", early_stop_message(patience, num_epochs));
    }

    pub fn log_complete(&self, epochs_run: usize, best_r2: f64) {
        tracing::info!(
            "Training complete! {} epochs in {:.1}s | Best r2: {:.4}",
            epochs_run,
            self.training_start.elapsed().as_secs_f64(),
            best_r2
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::default().level, LogLevel::Info);
        assert_eq!(LogConfig::verbose().level, LogLevel::Debug);
        assert_eq!(LogConfig::quiet().level, LogLevel::Error);
    }

    #[test]
    fn test_early_stop_message_uses_recorded_epoch() {
        let message = early_stop_message(3, 2);
        assert!(message.ends_with("recorded epoch 2"));
        assert!(message.contains("3 epochs"));
    }

    #[test]
    fn test_loading_bar_length() {
        let bar = loading_bar(12, "Loading");
        assert_eq!(bar.length(), Some(12));
        bar.finish_and_clear();
    }
}
