use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::EnumIter;

/// Classifier variant
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// Logistic regression with regularization effectively disabled
    LogisticRegression,

    /// Single depth-bounded CART tree
    DecisionTree,

    /// Bagged CART trees with per-split feature subsampling
    #[default]
    RandomForest,
}

impl std::fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierKind::LogisticRegression => write!(f, "Logistic Regression"),
            ClassifierKind::DecisionTree => write!(f, "Decision Tree"),
            ClassifierKind::RandomForest => write!(f, "Random Forest"),
        }
    }
}

/// Labeled feature matrix handed to a classifier
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    /// Transponder code per row
    pub keys: Vec<String>,

    /// Feature matrix (n_samples × n_features)
    pub features: Array2<f64>,

    /// Binary labels (1 = surveillance)
    pub labels: Array1<usize>,

    /// Column names of `features`
    pub feature_names: Vec<String>,

    /// Fingerprint of the category mapping used to encode `features`
    pub mapping_fingerprint: String,
}

impl TrainingDataset {
    pub fn new(
        keys: Vec<String>,
        features: Array2<f64>,
        labels: Array1<usize>,
        feature_names: Vec<String>,
        mapping_fingerprint: String,
    ) -> Result<Self> {
        if keys.len() != features.nrows() || labels.len() != features.nrows() {
            return Err(PipelineError::Validation(format!(
                "dataset shape mismatch: {} keys, {} feature rows, {} labels",
                keys.len(),
                features.nrows(),
                labels.len()
            )));
        }
        if feature_names.len() != features.ncols() {
            return Err(PipelineError::Validation(format!(
                "dataset has {} feature columns but {} names",
                features.ncols(),
                feature_names.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(PipelineError::Validation(format!(
                "labels must be 0 or 1, found {}",
                bad
            )));
        }

        Ok(Self {
            keys,
            features,
            labels,
            feature_names,
            mapping_fingerprint,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Count of (negative, positive) labels
    pub fn class_counts(&self) -> (usize, usize) {
        let positive = self.labels.iter().filter(|&&l| l == 1).count();
        (self.labels.len() - positive, positive)
    }

    /// Rows at `indices`, in that order
    pub fn select(&self, indices: &[usize]) -> TrainingDataset {
        TrainingDataset {
            keys: indices.iter().map(|&i| self.keys[i].clone()).collect(),
            features: self.features.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
            feature_names: self.feature_names.clone(),
            mapping_fingerprint: self.mapping_fingerprint.clone(),
        }
    }
}

/// What a feature-importance value measures
///
/// Coefficients and impurity decreases live on different scales and mean
/// different things; the kind travels with the values so reports never mix
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceKind {
    /// Signed logistic-regression coefficient
    Coefficient,

    /// Normalized total Gini impurity decrease
    ImpurityDecrease,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub value: f64,
}

/// Per-feature importances of one fitted classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImportances {
    pub kind: ImportanceKind,
    pub entries: Vec<FeatureImportance>,
}

impl FeatureImportances {
    pub fn new(kind: ImportanceKind, names: &[String], values: &[f64]) -> Self {
        Self {
            kind,
            entries: names
                .iter()
                .zip(values.iter())
                .map(|(feature, &value)| FeatureImportance {
                    feature: feature.clone(),
                    value,
                })
                .collect(),
        }
    }

    /// Entries ordered by descending magnitude
    pub fn ranked(&self) -> Vec<FeatureImportance> {
        let mut ranked = self.entries.clone();
        ranked.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
        ranked
    }

    pub fn get(&self, feature: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.feature == feature)
            .map(|e| e.value)
    }
}

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,

    /// Model kind
    pub kind: ClassifierKind,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Number of training samples
    pub n_training_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// Hyperparameters
    pub hyperparameters: BTreeMap<String, String>,

    /// Fingerprint of the category mapping the training data was encoded with
    pub mapping_fingerprint: Option<String>,
}

impl ModelMetadata {
    pub fn new(kind: ClassifierKind, hyperparameters: BTreeMap<String, String>) -> Self {
        Self {
            name: kind.to_string(),
            kind,
            trained_at: chrono::Utc::now(),
            n_training_samples: 0,
            n_features: 0,
            hyperparameters,
            mapping_fingerprint: None,
        }
    }

    /// Record the dataset a model was just fitted on
    pub fn record_fit(&mut self, dataset: &TrainingDataset) {
        self.trained_at = chrono::Utc::now();
        self.n_training_samples = dataset.n_samples();
        self.n_features = dataset.n_features();
        self.mapping_fingerprint = Some(dataset.mapping_fingerprint.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use strum::IntoEnumIterator;

    fn dataset() -> TrainingDataset {
        TrainingDataset::new(
            vec!["A".into(), "B".into(), "C".into()],
            array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
            array![0, 1, 1],
            vec!["speed1".into(), "type_code".into()],
            "abc".into(),
        )
        .unwrap()
    }

    #[test]
    fn test_training_dataset_shape() {
        let ds = dataset();
        assert_eq!(ds.n_samples(), 3);
        assert_eq!(ds.n_features(), 2);
        assert_eq!(ds.class_counts(), (1, 2));
    }

    #[test]
    fn test_training_dataset_rejects_bad_labels() {
        let result = TrainingDataset::new(
            vec!["A".into()],
            array![[1.0]],
            array![2],
            vec!["x".into()],
            String::new(),
        );
        assert!(matches!(result, Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_select_rows() {
        let ds = dataset();
        let subset = ds.select(&[2, 0]);
        assert_eq!(subset.keys, vec!["C", "A"]);
        assert_eq!(subset.features, array![[5.0, 6.0], [1.0, 2.0]]);
        assert_eq!(subset.labels, array![1, 0]);
        assert_eq!(subset.mapping_fingerprint, "abc");
    }

    #[test]
    fn test_importances_ranked_by_magnitude() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let imp = FeatureImportances::new(ImportanceKind::Coefficient, &names, &[0.5, -2.0, 1.0]);
        let ranked = imp.ranked();
        assert_eq!(ranked[0].feature, "b");
        assert_eq!(ranked[1].feature, "c");
        assert_eq!(imp.get("a"), Some(0.5));
    }

    #[test]
    fn test_classifier_kind_display() {
        assert_eq!(ClassifierKind::LogisticRegression.to_string(), "Logistic Regression");
        assert_eq!(ClassifierKind::RandomForest.to_string(), "Random Forest");
        assert_eq!(ClassifierKind::iter().count(), 3);
        assert_eq!(ClassifierKind::default(), ClassifierKind::RandomForest);
    }

    #[test]
    fn test_classifier_kind_serde() {
        let json = serde_json::to_string(&ClassifierKind::DecisionTree).unwrap();
        assert_eq!(json, "\"decision_tree\"");
        let kind: ClassifierKind = serde_json::from_str("\"logistic_regression\"").unwrap();
        assert_eq!(kind, ClassifierKind::LogisticRegression);
    }
}
