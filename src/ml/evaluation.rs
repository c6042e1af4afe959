//! Holdout metrics for binary classifiers.
//!
//! Class 0 = other, class 1 = surveillance.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// 2x2 confusion matrix; rows are the true class, columns the predicted class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub cells: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[usize], y_pred: &[usize]) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(PipelineError::Validation(format!(
                "{} true labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }

        let mut cells = [[0usize; 2]; 2];
        for (&truth, &pred) in y_true.iter().zip(y_pred.iter()) {
            if truth > 1 || pred > 1 {
                return Err(PipelineError::Validation(format!(
                    "binary labels expected, got true={} predicted={}",
                    truth, pred
                )));
            }
            cells[truth][pred] += 1;
        }

        Ok(Self { cells })
    }

    pub fn true_negatives(&self) -> usize {
        self.cells[0][0]
    }

    pub fn false_positives(&self) -> usize {
        self.cells[0][1]
    }

    pub fn false_negatives(&self) -> usize {
        self.cells[1][0]
    }

    pub fn true_positives(&self) -> usize {
        self.cells[1][1]
    }

    pub fn total(&self) -> usize {
        self.cells.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        self.true_negatives() + self.true_positives()
    }
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "              pred other  pred surv")?;
        writeln!(
            f,
            "true other    {:>10}  {:>9}",
            self.cells[0][0], self.cells[0][1]
        )?;
        write!(
            f,
            "true surv     {:>10}  {:>9}",
            self.cells[1][0], self.cells[1][1]
        )
    }
}

/// Metrics derived from a confusion matrix
///
/// Precision, recall and F1 refer to the positive class and are 0 when their
/// denominator is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Evaluation {
    pub fn from_confusion(confusion: ConfusionMatrix) -> Self {
        let tp = confusion.true_positives();
        let fp = confusion.false_positives();
        let fn_count = confusion.false_negatives();
        let total = confusion.total();

        let accuracy = if total > 0 {
            confusion.correct() as f64 / total as f64
        } else {
            0.0
        };

        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };

        let recall = if tp + fn_count > 0 {
            tp as f64 / (tp + fn_count) as f64
        } else {
            0.0
        };

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            confusion,
            accuracy,
            precision,
            recall,
            f1,
        }
    }

    pub fn from_predictions(y_true: &[usize], y_pred: &[usize]) -> Result<Self> {
        Ok(Self::from_confusion(ConfusionMatrix::from_predictions(
            y_true, y_pred,
        )?))
    }
}

impl std::fmt::Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "acc={:.4} prec={:.4} rec={:.4} f1={:.4} (tp={} fp={} tn={} fn={})",
            self.accuracy,
            self.precision,
            self.recall,
            self.f1,
            self.confusion.true_positives(),
            self.confusion.false_positives(),
            self.confusion.true_negatives(),
            self.confusion.false_negatives(),
        )
    }
}
