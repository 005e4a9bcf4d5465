//! Training history and classification report.

use crate::{ClassIndex, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Per-epoch metrics produced by the optimization loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Mean training loss per epoch
    pub loss: Vec<f64>,
    /// Training accuracy per epoch
    pub accuracy: Vec<f64>,
    /// Validation loss per epoch
    pub val_loss: Vec<f64>,
    /// Validation accuracy per epoch
    pub val_accuracy: Vec<f64>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the metrics of one finished epoch
    pub fn add_epoch(&mut self, loss: f64, accuracy: f64, val_loss: f64, val_accuracy: f64) {
        self.loss.push(loss);
        self.accuracy.push(accuracy);
        self.val_loss.push(val_loss);
        self.val_accuracy.push(val_accuracy);
    }

    /// Number of recorded epochs
    pub fn len(&self) -> usize {
        self.loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loss.is_empty()
    }

    /// Gets the best validation accuracy
    pub fn best_val_accuracy(&self) -> Option<f64> {
        self.val_accuracy.iter().copied().reduce(f64::max)
    }

    /// One-based epoch with the best validation accuracy
    pub fn best_epoch(&self) -> Option<usize> {
        self.val_accuracy
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(idx, _)| idx + 1)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Precision, recall, F1 and support of one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Averaged precision, recall and F1 over all classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class summary of predicted versus true labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// One entry per class, in label order
    pub classes: Vec<ClassMetrics>,
    /// Fraction of correct predictions
    pub accuracy: f64,
    /// Unweighted mean over classes
    pub macro_avg: AveragedMetrics,
    /// Mean over classes weighted by support
    pub weighted_avg: AveragedMetrics,
    /// Confusion matrix (actual x predicted)
    pub confusion_matrix: Vec<Vec<usize>>,
}

impl ClassificationReport {
    /// Builds the report from aligned ground-truth and predicted labels.
    ///
    /// Both slices must have the same length and only contain labels below
    /// `classes.len()`.
    pub fn from_predictions(
        y_true: &[usize],
        y_pred: &[usize],
        classes: &ClassIndex,
    ) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(Error::Model(format!(
                "Prediction count {} does not match label count {}",
                y_pred.len(),
                y_true.len()
            )));
        }

        let num_classes = classes.len();
        let mut matrix = vec![vec![0usize; num_classes]; num_classes];
        for (&actual, &predicted) in y_true.iter().zip(y_pred) {
            if actual >= num_classes || predicted >= num_classes {
                return Err(Error::Model(format!(
                    "Label out of range: actual {actual}, predicted {predicted}, \
                     {num_classes} classes"
                )));
            }
            matrix[actual][predicted] += 1;
        }

        let total = y_true.len();
        let correct: usize = (0..num_classes).map(|i| matrix[i][i]).sum();
        let accuracy = if total > 0 {
            correct as f64 / total as f64
        } else {
            0.0
        };

        let per_class: Vec<ClassMetrics> = classes
            .names()
            .iter()
            .enumerate()
            .map(|(class_id, name)| {
                let tp = matrix[class_id][class_id] as f64;
                let predicted: usize = (0..num_classes).map(|i| matrix[i][class_id]).sum();
                let support: usize = matrix[class_id].iter().sum();

                let precision = if predicted > 0 { tp / predicted as f64 } else { 0.0 };
                let recall = if support > 0 { tp / support as f64 } else { 0.0 };
                let f1_score = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };

                ClassMetrics {
                    class_name: name.clone(),
                    precision,
                    recall,
                    f1_score,
                    support,
                }
            })
            .collect();

        let macro_avg = average(&per_class, |_| 1.0, total);
        let weighted_avg = average(&per_class, |m| m.support as f64, total);

        Ok(Self {
            classes: per_class,
            accuracy,
            macro_avg,
            weighted_avg,
            confusion_matrix: matrix,
        })
    }

    /// Sum of per-class supports, equal to the number of evaluated examples
    pub fn total_support(&self) -> usize {
        self.classes.iter().map(|c| c.support).sum()
    }

    /// Metrics for a class name
    pub fn class(&self, name: &str) -> Option<&ClassMetrics> {
        self.classes.iter().find(|c| c.class_name == name)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn average<F>(classes: &[ClassMetrics], weight: F, support: usize) -> AveragedMetrics
where
    F: Fn(&ClassMetrics) -> f64,
{
    let total_weight: f64 = classes.iter().map(&weight).sum();
    if total_weight == 0.0 {
        return AveragedMetrics {
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            support,
        };
    }

    let weighted = |value: fn(&ClassMetrics) -> f64| -> f64 {
        classes.iter().map(|c| value(c) * weight(c)).sum::<f64>() / total_weight
    };

    AveragedMetrics {
        precision: weighted(|c| c.precision),
        recall: weighted(|c| c.recall),
        f1_score: weighted(|c| c.f1_score),
        support,
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.class_name.len())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(12);

        writeln!(
            f,
            "{:>width$} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>width$} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                c.class_name, c.precision, c.recall, c.f1_score, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.macro_avg.support
        )?;
        for (label, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>width$} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                label, avg.precision, avg.recall, avg.f1_score, avg.support
            )?;
        }
        Ok(())
    }
}
