use crate::training::config::{EarlyStoppingConfig, Monitor};

/// Tracks the monitored quantity across epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    monitor: Monitor,
    patience: usize,
    min_delta: f64,
    best: Option<f64>,
    best_epoch: usize,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(config: &EarlyStoppingConfig) -> Self {
        Self {
            monitor: config.monitor,
            patience: config.patience,
            min_delta: config.min_delta.abs(),
            best: None,
            best_epoch: 0,
            wait: 0,
        }
    }

    pub fn monitor(&self) -> Monitor {
        self.monitor
    }

    /// Best value seen so far, with the epoch it was seen at.
    pub fn best(&self) -> Option<(f64, usize)> {
        self.best.map(|best| (best, self.best_epoch))
    }

    /// Records the value of an epoch; returns whether training should stop.
    pub fn update(&mut self, epoch: usize, value: f64) -> bool {
        let improved = match self.best {
            None => true,
            Some(best) if self.monitor.minimizes() => value < best - self.min_delta,
            Some(best) => value > best + self.min_delta,
        };
        if improved {
            self.best = Some(value);
            self.best_epoch = epoch;
            self.wait = 0;
            return false;
        }
        self.wait += 1;
        self.wait >= self.patience
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_patience_epochs_without_improvement() {
        let mut stopping = EarlyStopping::new(&EarlyStoppingConfig::new().with_patience(3));
        assert!(!stopping.update(1, 1.0));
        assert!(!stopping.update(2, 0.8));
        assert!(!stopping.update(3, 0.9));
        assert!(!stopping.update(4, 0.8));
        assert!(stopping.update(5, 0.85));
        assert_eq!(stopping.best(), Some((0.8, 2)));
    }

    #[test]
    fn improvement_resets_the_wait() {
        let mut stopping = EarlyStopping::new(&EarlyStoppingConfig::new().with_patience(2));
        assert!(!stopping.update(1, 1.0));
        assert!(!stopping.update(2, 1.1));
        assert!(!stopping.update(3, 0.5));
        assert!(!stopping.update(4, 0.6));
        assert!(stopping.update(5, 0.7));
    }

    #[test]
    fn min_delta_and_maximized_quantities() {
        let config = EarlyStoppingConfig::new()
            .with_monitor(Monitor::ValAccuracy)
            .with_patience(1)
            .with_min_delta(0.05);
        let mut stopping = EarlyStopping::new(&config);
        assert!(!stopping.update(1, 0.50));
        assert!(!stopping.update(2, 0.60));
        // not enough of an improvement
        assert!(stopping.update(3, 0.62));
    }
}
