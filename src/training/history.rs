use crate::error::TrainingError;
use crate::training::config::Monitor;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Metrics of one epoch. Accuracies are fractions in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics {
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// Per-epoch metrics, one array per quantity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub loss: Vec<f64>,
    pub accuracy: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
}

impl History {
    pub fn push(&mut self, metrics: EpochMetrics) {
        self.loss.push(metrics.loss);
        self.accuracy.push(metrics.accuracy);
        self.val_loss.push(metrics.val_loss);
        self.val_accuracy.push(metrics.val_accuracy);
    }

    /// Number of recorded epochs.
    pub fn len(&self) -> usize {
        self.loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loss.is_empty()
    }

    pub fn last(&self) -> Option<EpochMetrics> {
        let i = self.len().checked_sub(1)?;
        Some(EpochMetrics {
            loss: self.loss[i],
            accuracy: self.accuracy[i],
            val_loss: self.val_loss[i],
            val_accuracy: self.val_accuracy[i],
        })
    }

    pub fn monitored(&self, monitor: Monitor) -> &[f64] {
        match monitor {
            Monitor::ValLoss => &self.val_loss,
            Monitor::ValAccuracy => &self.val_accuracy,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), TrainingError> {
        let json = serde_json::to_string(self).map_err(|source| TrainingError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| TrainingError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, TrainingError> {
        let json = std::fs::read_to_string(path).map_err(|source| TrainingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| TrainingError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn saved_with_one_array_per_metric() {
        let dir = TempDir::new().unwrap();
        let path = dir.child("history.json");
        let mut history = History::default();
        history.push(EpochMetrics {
            loss: 2.0,
            accuracy: 0.25,
            val_loss: 2.5,
            val_accuracy: 0.5,
        });
        history.push(EpochMetrics {
            loss: 1.0,
            accuracy: 0.5,
            val_loss: 2.0,
            val_accuracy: 0.75,
        });
        history.save(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["loss"], serde_json::json!([2.0, 1.0]));
        assert_eq!(json["val_accuracy"], serde_json::json!([0.5, 0.75]));

        let back = History::load(&path).unwrap();
        assert_eq!(back, history);
        assert_eq!(back.last().unwrap().val_loss, 2.0);
        assert_eq!(back.monitored(Monitor::ValLoss), &[2.5, 2.0]);
    }
}
