//! Correlation-based early stopping
//!
//! The decision rule lives in [`transition`], a pure function of the
//! monitored history and the controller state. [`CorrelationEarlyStopping`]
//! wraps it with the bookkeeping a training loop needs: both R² histories,
//! the epoch count to report and a snapshot of the best model.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::config::Monitor;

/// Controller state after an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoppingStatus {
    /// The monitored value beat the best by at least `delta`
    Improving,
    /// No improvement, patience not yet exhausted
    Waiting,
    /// Patience exhausted; terminal
    Stopped,
}

/// Result of one [`transition`]
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Monitored history with the current value appended
    pub history: Vec<f64>,
    pub best: f64,
    pub wait: usize,
    pub should_stop: bool,
    pub status: StoppingStatus,
}

/// Apply one epoch's monitored value
///
/// Improvement requires `current - delta >= best`. Otherwise the run stops if
/// `wait` has already reached `patience`, and waits one more epoch if not.
/// NaN never compares as an improvement.
pub fn transition(
    mut history: Vec<f64>,
    best: f64,
    wait: usize,
    current: f64,
    delta: f64,
    patience: usize,
) -> Transition {
    history.push(current);

    if current - delta >= best {
        Transition {
            history,
            best: current,
            wait: 0,
            should_stop: false,
            status: StoppingStatus::Improving,
        }
    } else if wait >= patience {
        Transition {
            history,
            best,
            wait,
            should_stop: true,
            status: StoppingStatus::Stopped,
        }
    } else {
        Transition {
            history,
            best,
            wait: wait + 1,
            should_stop: false,
            status: StoppingStatus::Waiting,
        }
    }
}

/// Per-epoch R² of both splits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationHistory {
    pub train: Vec<f64>,
    pub validate: Vec<f64>,
}

impl CorrelationHistory {
    pub fn get(&self, monitor: Monitor) -> &[f64] {
        match monitor {
            Monitor::Train => &self.train,
            Monitor::Validate => &self.validate,
        }
    }

    pub fn len(&self) -> usize {
        self.train.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train.is_empty()
    }
}

/// Epoch-end controller owning the stopping state and best snapshot
#[derive(Debug, Clone)]
pub struct CorrelationEarlyStopping<M> {
    monitor: Monitor,
    patience: usize,
    delta: f64,
    history: CorrelationHistory,
    best: f64,
    wait: usize,
    num_epochs: usize,
    best_epoch: Option<usize>,
    status: StoppingStatus,
    best_model: Option<M>,
}

impl<M: Clone> CorrelationEarlyStopping<M> {
    pub fn new(monitor: Monitor, patience: usize, delta: f64) -> Self {
        Self {
            monitor,
            patience,
            delta,
            history: CorrelationHistory::default(),
            best: 0.0,
            wait: 0,
            num_epochs: 0,
            best_epoch: None,
            status: StoppingStatus::Improving,
            best_model: None,
        }
    }

    /// Record one epoch's correlations; snapshots `model` on improvement
    pub fn on_epoch_end(
        &mut self,
        epoch: usize,
        train_r2: f64,
        validate_r2: f64,
        model: &M,
    ) -> StoppingStatus {
        info!("Train r2: {:.4} | Validate r2: {:.4}", train_r2, validate_r2);

        let (monitored, other, current, other_value) = match self.monitor {
            Monitor::Train => (
                &mut self.history.train,
                &mut self.history.validate,
                train_r2,
                validate_r2,
            ),
            Monitor::Validate => (
                &mut self.history.validate,
                &mut self.history.train,
                validate_r2,
                train_r2,
            ),
        };
        other.push(other_value);

        let step = transition(
            std::mem::take(monitored),
            self.best,
            self.wait,
            current,
            self.delta,
            self.patience,
        );
        *monitored = step.history;
        self.best = step.best;
        self.wait = step.wait;
        self.status = step.status;

        match step.status {
            StoppingStatus::Improving => {
                self.num_epochs = epoch;
                self.best_epoch = Some(epoch);
                self.best_model = Some(model.clone());
            }
            StoppingStatus::Waiting => self.num_epochs = epoch,
            StoppingStatus::Stopped => self.num_epochs = epoch.saturating_sub(self.patience),
        }

        self.status
    }

    pub fn should_stop(&self) -> bool {
        self.status == StoppingStatus::Stopped
    }

    pub fn status(&self) -> StoppingStatus {
        self.status
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn wait(&self) -> usize {
        self.wait
    }

    /// Epoch recorded by the rule; `epoch - patience` once stopped
    pub fn num_epochs(&self) -> usize {
        self.num_epochs
    }

    /// Epoch of the current snapshot, if any epoch improved
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn monitor(&self) -> Monitor {
        self.monitor
    }

    pub fn history(&self) -> &CorrelationHistory {
        &self.history
    }

    pub fn best_model(&self) -> Option<&M> {
        self.best_model.as_ref()
    }

    /// Move the snapshot out before the controller is dropped
    pub fn take_best_model(&mut self) -> Option<M> {
        self.best_model.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQUENCE: [f64; 8] = [0.1, 0.3, 0.29, 0.28, 0.27, 0.26, 0.25, 0.24];

    #[test]
    fn test_transition_improves() {
        let step = transition(vec![], 0.0, 2, 0.5, 0.01, 3);
        assert_eq!(step.history, vec![0.5]);
        assert_eq!(step.best, 0.5);
        assert_eq!(step.wait, 0);
        assert!(!step.should_stop);
        assert_eq!(step.status, StoppingStatus::Improving);
    }

    #[test]
    fn test_transition_requires_delta() {
        let step = transition(vec![0.3], 0.3, 0, 0.305, 0.01, 3);
        assert_eq!(step.best, 0.3);
        assert_eq!(step.wait, 1);
        assert_eq!(step.status, StoppingStatus::Waiting);
    }

    #[test]
    fn test_transition_stops_when_patience_reached() {
        let step = transition(vec![0.3, 0.2, 0.2, 0.2], 0.3, 3, 0.2, 0.01, 3);
        assert!(step.should_stop);
        assert_eq!(step.status, StoppingStatus::Stopped);
        assert_eq!(step.wait, 3);
        assert_eq!(step.history.len(), 5);
    }

    #[test]
    fn test_sequence_stops_after_patience() {
        let mut history = Vec::new();
        let (mut best, mut wait) = (0.0, 0);
        let mut statuses = Vec::new();
        let mut waits = Vec::new();

        for &value in &SEQUENCE {
            let step = transition(history, best, wait, value, 0.01, 3);
            history = step.history;
            best = step.best;
            wait = step.wait;
            statuses.push(step.status);
            waits.push(wait);
            if step.should_stop {
                break;
            }
        }

        use StoppingStatus::*;
        assert_eq!(
            statuses,
            vec![Improving, Improving, Waiting, Waiting, Waiting, Stopped]
        );
        // wait reaches patience at epoch 4, the stop fires on the next epoch
        assert_eq!(waits[4], 3);
        assert_eq!(best, 0.3);
    }

    #[test]
    fn test_controller_records_stop_epoch() {
        let mut controller = CorrelationEarlyStopping::<usize>::new(Monitor::Validate, 3, 0.01);

        let mut stopped_at = None;
        for (epoch, &value) in SEQUENCE.iter().enumerate() {
            let status = controller.on_epoch_end(epoch, 0.9, value, &epoch);
            if status == StoppingStatus::Stopped {
                stopped_at = Some(epoch);
                break;
            }
        }

        assert_eq!(stopped_at, Some(5));
        assert!(controller.should_stop());
        assert_eq!(controller.num_epochs(), 5 - 3);
        assert_eq!(controller.best_epoch(), Some(1));
        assert_eq!(controller.best_model(), Some(&1));
        assert_eq!(controller.history().validate.len(), 6);
        assert_eq!(controller.history().train.len(), 6);
    }

    #[test]
    fn test_nan_never_improves() {
        let mut history = vec![];
        let (mut best, mut wait) = (0.0, 0);
        for expected_wait in 1..=5 {
            let step = transition(history, best, wait, f64::NAN, 0.01, 10);
            assert_eq!(step.best, 0.0);
            assert_eq!(step.wait, expected_wait);
            assert!(!step.should_stop);
            history = step.history;
            best = step.best;
            wait = step.wait;
        }

        let mut controller = CorrelationEarlyStopping::<&str>::new(Monitor::Validate, 10, 0.01);
        controller.on_epoch_end(0, 0.5, f64::NAN, &"model");
        assert!(controller.best_model().is_none());
        assert_eq!(controller.wait(), 1);
    }

    #[test]
    fn test_monitor_train() {
        let mut controller = CorrelationEarlyStopping::<u8>::new(Monitor::Train, 2, 0.0);
        controller.on_epoch_end(0, 0.4, 0.0, &0);
        assert_eq!(controller.best(), 0.4);
        assert_eq!(controller.history().get(Monitor::Train), &[0.4]);
        assert_eq!(controller.history().get(Monitor::Validate), &[0.0]);
    }

    #[test]
    fn test_take_best_model() {
        let mut controller = CorrelationEarlyStopping::<String>::new(Monitor::Validate, 1, 0.01);
        controller.on_epoch_end(0, 0.0, 0.2, &"first".to_string());
        assert_eq!(controller.take_best_model().as_deref(), Some("first"));
        assert!(controller.best_model().is_none());
    }
}
