/// Machine learning module for surveillance-plane classification
///
/// This module provides:
/// - Label and aircraft-type encoding into a numeric feature matrix
/// - Seeded train/test splitting
/// - Logistic regression, decision tree and random forest classifiers
/// - Confusion-matrix evaluation and feature importances

pub mod classifier;
pub mod evaluation;
pub mod features;
pub mod forest;
pub mod models;
pub mod split;
pub mod tree;

pub use classifier::{
    build_classifier, Classifier, DecisionTreeClassifier, LogisticRegressionClassifier,
    RandomForestClassifier, DECISION_THRESHOLD,
};
pub use evaluation::{ConfusionMatrix, Evaluation};
pub use features::{
    CategoryMapping, EncodedTable, EncodingSettings, FeatureExtractor, LabelEncoder,
    UnlabeledSet, UNSEEN_CODE,
};
pub use models::{
    ClassifierKind, FeatureImportance, FeatureImportances, ImportanceKind, ModelMetadata,
    TrainingDataset,
};
pub use split::{test_size, train_test_split, TrainTestSplit};
