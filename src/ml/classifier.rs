use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::ml::forest::{ForestParams, RandomForest};
use crate::ml::models::{
    ClassifierKind, FeatureImportances, ImportanceKind, ModelMetadata, TrainingDataset,
};
use crate::ml::tree::{CartTree, TreeParams};
use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Probability above which a row is predicted positive
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Trait for classifiers
pub trait Classifier: Send + Sync {
    /// Fit on a labeled dataset, replacing any earlier fit
    fn fit(&mut self, dataset: &TrainingDataset) -> Result<()>;

    /// Positive-class probability per row
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array1<f64>>;

    /// Class per row; 1 iff the probability exceeds [`DECISION_THRESHOLD`]
    fn predict(&self, features: &Array2<f64>) -> Result<Array1<usize>> {
        Ok(self
            .predict_proba(features)?
            .mapv(|p| usize::from(p > DECISION_THRESHOLD)))
    }

    /// Per-feature importances of the current fit
    fn feature_importances(&self) -> Result<FeatureImportances>;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;

    fn kind(&self) -> ClassifierKind;

    fn is_trained(&self) -> bool;
}

/// Build an unfitted classifier with hyperparameters from `config`
pub fn build_classifier(kind: ClassifierKind, config: &Config) -> Box<dyn Classifier> {
    match kind {
        ClassifierKind::LogisticRegression => Box::new(LogisticRegressionClassifier::new(
            config.logistic.inverse_regularization,
            config.logistic.max_iterations,
            config.logistic.gradient_tolerance,
        )),
        ClassifierKind::DecisionTree => Box::new(DecisionTreeClassifier::new(
            config.tree.max_depth,
            config.tree.min_samples_split,
        )),
        ClassifierKind::RandomForest => Box::new(RandomForestClassifier::new(ForestParams {
            n_trees: config.forest.n_trees,
            max_depth: config.forest.max_depth,
            min_samples_split: config.forest.min_samples_split,
            seed: config.forest.seed,
        })),
    }
}

fn not_trained(kind: ClassifierKind) -> PipelineError {
    PipelineError::NotTrained(kind.to_string())
}

fn check_width(expected: usize, features: &Array2<f64>) -> Result<()> {
    if features.ncols() != expected {
        return Err(PipelineError::Validation(format!(
            "model was fitted on {} features, got {}",
            expected,
            features.ncols()
        )));
    }
    Ok(())
}

fn check_fit_input(dataset: &TrainingDataset) -> Result<()> {
    if dataset.n_samples() < 2 {
        return Err(PipelineError::InsufficientData {
            required: 2,
            actual: dataset.n_samples(),
        });
    }
    let (negative, positive) = dataset.class_counts();
    if negative == 0 || positive == 0 {
        return Err(PipelineError::Training(format!(
            "training data must contain both classes ({} negative, {} positive)",
            negative, positive
        )));
    }
    Ok(())
}

/// linfa treats the majority class as its positive class; these flip its
/// output around so that probabilities and coefficients always refer to label 1
fn linfa_positive_is_one(model: &FittedLogisticRegression<f64, usize>) -> bool {
    model.labels().pos.class == 1
}

fn positive_probabilities(
    model: &FittedLogisticRegression<f64, usize>,
    features: &Array2<f64>,
) -> Array1<f64> {
    let proba = model.predict_probabilities(features);
    if linfa_positive_is_one(model) {
        proba
    } else {
        proba.mapv(|p| 1.0 - p)
    }
}

fn positive_coefficients(model: &FittedLogisticRegression<f64, usize>) -> Array1<f64> {
    if linfa_positive_is_one(model) {
        model.params().clone()
    } else {
        -model.params()
    }
}

/// Logistic regression on the raw (unscaled) features
///
/// The L2 penalty is `1 / inverse_regularization`; with the default of 1e9 the
/// fit is effectively unregularized.
pub struct LogisticRegressionClassifier {
    metadata: ModelMetadata,
    inverse_regularization: f64,
    max_iterations: u64,
    gradient_tolerance: f64,
    model: Option<FittedLogisticRegression<f64, usize>>,
    feature_names: Vec<String>,
}

impl LogisticRegressionClassifier {
    pub fn new(inverse_regularization: f64, max_iterations: u64, gradient_tolerance: f64) -> Self {
        let hyperparameters: BTreeMap<String, String> = [
            ("C".to_string(), inverse_regularization.to_string()),
            ("max_iterations".to_string(), max_iterations.to_string()),
            ("gradient_tolerance".to_string(), gradient_tolerance.to_string()),
        ]
        .into_iter()
        .collect();

        Self {
            metadata: ModelMetadata::new(ClassifierKind::LogisticRegression, hyperparameters),
            inverse_regularization,
            max_iterations,
            gradient_tolerance,
            model: None,
            feature_names: Vec::new(),
        }
    }

    fn alpha(&self) -> f64 {
        1.0 / self.inverse_regularization
    }

    /// Norm of the penalized log-loss gradient at the fitted parameters
    fn gradient_norm(
        &self,
        model: &FittedLogisticRegression<f64, usize>,
        dataset: &TrainingDataset,
    ) -> f64 {
        let proba = positive_probabilities(model, &dataset.features);
        let residual = &proba - &dataset.labels.mapv(|l| l as f64);

        let mut grad = dataset.features.t().dot(&residual);
        grad.scaled_add(self.alpha(), &positive_coefficients(model));
        let intercept_grad = residual.sum();

        (grad.dot(&grad) + intercept_grad * intercept_grad).sqrt()
    }
}

impl Classifier for LogisticRegressionClassifier {
    fn fit(&mut self, dataset: &TrainingDataset) -> Result<()> {
        check_fit_input(dataset)?;

        let data = Dataset::new(dataset.features.clone(), dataset.labels.clone());
        let model = LogisticRegression::default()
            .alpha(self.alpha())
            .max_iterations(self.max_iterations)
            .gradient_tolerance(self.gradient_tolerance)
            .fit(&data)
            .map_err(|e| {
                PipelineError::Training(format!("Failed to train logistic regression: {}", e))
            })?;

        if !model.intercept().is_finite() || model.params().iter().any(|w| !w.is_finite()) {
            return Err(PipelineError::Training(
                "logistic regression diverged (non-finite coefficients)".to_string(),
            ));
        }

        let gradient_norm = self.gradient_norm(&model, dataset);
        if gradient_norm > self.gradient_tolerance {
            warn!(
                "Logistic regression may not have converged within {} iterations \
                 (gradient norm {:.3e} > tolerance {:.1e}); features are unscaled",
                self.max_iterations, gradient_norm, self.gradient_tolerance
            );
        } else {
            debug!("Logistic regression converged (gradient norm {:.3e})", gradient_norm);
        }

        self.model = Some(model);
        self.feature_names = dataset.feature_names.clone();
        self.metadata.record_fit(dataset);
        Ok(())
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        let model = self.model.as_ref().ok_or_else(|| not_trained(self.kind()))?;
        check_width(self.feature_names.len(), features)?;
        Ok(positive_probabilities(model, features))
    }

    fn feature_importances(&self) -> Result<FeatureImportances> {
        let model = self.model.as_ref().ok_or_else(|| not_trained(self.kind()))?;
        Ok(FeatureImportances::new(
            ImportanceKind::Coefficient,
            &self.feature_names,
            &positive_coefficients(model).to_vec(),
        ))
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::LogisticRegression
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}

/// Single CART tree
pub struct DecisionTreeClassifier {
    metadata: ModelMetadata,
    params: TreeParams,
    tree: Option<CartTree>,
    feature_names: Vec<String>,
}

impl DecisionTreeClassifier {
    pub fn new(max_depth: usize, min_samples_split: usize) -> Self {
        Self {
            metadata: ModelMetadata::new(
                ClassifierKind::DecisionTree,
                [
                    ("max_depth".to_string(), max_depth.to_string()),
                    ("min_samples_split".to_string(), min_samples_split.to_string()),
                    ("criterion".to_string(), "gini".to_string()),
                ]
                .into_iter()
                .collect(),
            ),
            params: TreeParams {
                max_depth,
                min_samples_split,
                max_features: None,
            },
            tree: None,
            feature_names: Vec::new(),
        }
    }
}

impl Classifier for DecisionTreeClassifier {
    fn fit(&mut self, dataset: &TrainingDataset) -> Result<()> {
        check_fit_input(dataset)?;

        let rows: Vec<usize> = (0..dataset.n_samples()).collect();
        // every feature is considered at every split, so the stream is never drawn from
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let tree = CartTree::fit(
            dataset.features.view(),
            dataset.labels.view(),
            &rows,
            &self.params,
            &mut rng,
        )?;

        debug!("Decision tree fitted with depth {}", tree.depth());

        self.tree = Some(tree);
        self.feature_names = dataset.feature_names.clone();
        self.metadata.record_fit(dataset);
        Ok(())
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        let tree = self.tree.as_ref().ok_or_else(|| not_trained(self.kind()))?;
        check_width(tree.n_features(), features)?;
        Ok(tree.predict_proba(features.view()))
    }

    fn feature_importances(&self) -> Result<FeatureImportances> {
        let tree = self.tree.as_ref().ok_or_else(|| not_trained(self.kind()))?;
        Ok(FeatureImportances::new(
            ImportanceKind::ImpurityDecrease,
            &self.feature_names,
            tree.importances(),
        ))
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::DecisionTree
    }

    fn is_trained(&self) -> bool {
        self.tree.is_some()
    }
}

/// Bagged CART trees
pub struct RandomForestClassifier {
    metadata: ModelMetadata,
    params: ForestParams,
    forest: Option<RandomForest>,
    feature_names: Vec<String>,
}

impl RandomForestClassifier {
    pub fn new(params: ForestParams) -> Self {
        Self {
            metadata: ModelMetadata::new(
                ClassifierKind::RandomForest,
                [
                    ("n_trees".to_string(), params.n_trees.to_string()),
                    ("max_depth".to_string(), params.max_depth.to_string()),
                    (
                        "min_samples_split".to_string(),
                        params.min_samples_split.to_string(),
                    ),
                    ("max_features".to_string(), "sqrt".to_string()),
                    ("seed".to_string(), params.seed.to_string()),
                ]
                .into_iter()
                .collect(),
            ),
            params,
            forest: None,
            feature_names: Vec::new(),
        }
    }
}

impl Classifier for RandomForestClassifier {
    fn fit(&mut self, dataset: &TrainingDataset) -> Result<()> {
        check_fit_input(dataset)?;

        let forest = RandomForest::fit(
            dataset.features.view(),
            dataset.labels.view(),
            &self.params,
        )?;

        self.forest = Some(forest);
        self.feature_names = dataset.feature_names.clone();
        self.metadata.record_fit(dataset);
        Ok(())
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        let forest = self.forest.as_ref().ok_or_else(|| not_trained(self.kind()))?;
        check_width(self.feature_names.len(), features)?;
        Ok(forest.predict_proba(features.view()))
    }

    fn feature_importances(&self) -> Result<FeatureImportances> {
        let forest = self.forest.as_ref().ok_or_else(|| not_trained(self.kind()))?;
        Ok(FeatureImportances::new(
            ImportanceKind::ImpurityDecrease,
            &self.feature_names,
            forest.importances(),
        ))
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::RandomForest
    }

    fn is_trained(&self) -> bool {
        self.forest.is_some()
    }
}
