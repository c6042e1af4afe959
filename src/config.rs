use crate::error::{PipelineError, Result};
use crate::ml::models::ClassifierKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::{Validate, ValidationError};

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Input tables
    #[validate(nested)]
    pub input: InputConfig,

    /// Label text recognized as positive/negative
    #[validate(nested)]
    pub labels: LabelConfig,

    /// Train/test split
    #[validate(nested)]
    pub split: SplitConfig,

    /// Logistic regression hyperparameters
    #[validate(nested)]
    pub logistic: LogisticConfig,

    /// Decision tree hyperparameters
    #[validate(nested)]
    pub tree: TreeConfig,

    /// Random forest hyperparameters
    #[validate(nested)]
    pub forest: ForestConfig,

    /// Scoring and output
    #[validate(nested)]
    pub scoring: ScoringConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file and
    /// the environment (prefix: SPYPLANE_, nested keys separated by `__`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(
            include_str!("../config/default.toml"),
            config::FileFormat::Toml,
        ));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("SPYPLANE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        config.check_columns()?;
        Ok(config)
    }

    /// Key, label and category columns must be distinct
    fn check_columns(&self) -> Result<()> {
        let input = &self.input;
        if input.key_column == input.label_column
            || input.key_column == input.category_column
            || input.label_column == input.category_column
        {
            return Err(PipelineError::Configuration(format!(
                "key ({}), label ({}) and category ({}) columns must be distinct",
                input.key_column, input.label_column, input.category_column
            )));
        }
        if self.labels.positive.eq_ignore_ascii_case(&self.labels.negative) {
            return Err(PipelineError::Configuration(
                "positive and negative label text must differ".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            labels: LabelConfig::default(),
            split: SplitConfig::default(),
            logistic: LogisticConfig::default(),
            tree: TreeConfig::default(),
            forest: ForestConfig::default(),
            scoring: ScoringConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InputConfig {
    /// Flight-pattern feature table
    pub features_path: PathBuf,

    /// Labeled transponder codes
    pub labels_path: PathBuf,

    /// Shared key column (transponder code)
    #[validate(length(min = 1))]
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// Label column in the label table
    #[validate(length(min = 1))]
    #[serde(default = "default_label_column")]
    pub label_column: String,

    /// Categorical aircraft-type column in the feature table
    #[validate(length(min = 1))]
    #[serde(default = "default_category_column")]
    pub category_column: String,

    /// Field delimiter, a single ASCII character
    #[validate(custom(function = "validate_delimiter"))]
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Fail on categories unseen when the mapping was fitted instead of
    /// mapping them to the reserved code
    #[serde(default)]
    pub strict_categories: bool,
}

impl InputConfig {
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter.bytes().next().unwrap_or(b',')
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            features_path: PathBuf::from("data/planes_features.csv"),
            labels_path: PathBuf::from("data/train.csv"),
            key_column: default_key_column(),
            label_column: default_label_column(),
            category_column: default_category_column(),
            delimiter: default_delimiter(),
            strict_categories: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LabelConfig {
    #[validate(length(min = 1))]
    #[serde(default = "default_positive_label")]
    pub positive: String,

    #[validate(length(min = 1))]
    #[serde(default = "default_negative_label")]
    pub negative: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            positive: default_positive_label(),
            negative: default_negative_label(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SplitConfig {
    /// Holdout fraction
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LogisticConfig {
    /// Inverse regularization strength (C); the L2 penalty is 1/C
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default = "default_inverse_regularization")]
    pub inverse_regularization: f64,

    #[validate(range(min = 1))]
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,

    #[validate(range(exclusive_min = 0.0))]
    #[serde(default = "default_gradient_tolerance")]
    pub gradient_tolerance: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            inverse_regularization: default_inverse_regularization(),
            max_iterations: default_max_iterations(),
            gradient_tolerance: default_gradient_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TreeConfig {
    #[validate(range(min = 2, max = 5))]
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[validate(range(min = 2))]
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ForestConfig {
    #[validate(range(min = 1))]
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    #[validate(range(min = 2, max = 5))]
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[validate(range(min = 2))]
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: default_n_trees(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ScoringConfig {
    /// Classifier refit on the full labeled set for scoring
    #[serde(default)]
    pub model: ClassifierKind,

    #[validate(range(min = 1))]
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Append the original feature values to each output row
    #[serde(default)]
    pub include_features: bool,

    /// Where to persist the category mapping used for this run
    #[serde(default)]
    pub mapping_path: Option<PathBuf>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            model: ClassifierKind::default(),
            top_k: default_top_k(),
            output_path: default_output_path(),
            include_features: false,
            mapping_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

// Default value functions
fn default_key_column() -> String {
    "adshex".to_string()
}

fn default_label_column() -> String {
    "class".to_string()
}

fn default_category_column() -> String {
    "type".to_string()
}

/// The csv crate takes the delimiter as one byte
fn validate_delimiter(delimiter: &str) -> std::result::Result<(), ValidationError> {
    if delimiter.len() == 1 && delimiter.is_ascii() {
        Ok(())
    } else {
        Err(ValidationError::new("delimiter_not_single_ascii_byte"))
    }
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_positive_label() -> String {
    "surveillance".to_string()
}

fn default_negative_label() -> String {
    "other".to_string()
}

fn default_test_fraction() -> f64 {
    0.25
}

fn default_seed() -> u64 {
    42
}

fn default_inverse_regularization() -> f64 {
    1e9
}

fn default_max_iterations() -> u64 {
    1000
}

fn default_gradient_tolerance() -> f64 {
    1e-4
}

fn default_max_depth() -> usize {
    4
}

fn default_min_samples_split() -> usize {
    2
}

fn default_n_trees() -> usize {
    100
}

fn default_top_k() -> usize {
    200
}

fn default_output_path() -> PathBuf {
    PathBuf::from("candidates.csv")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.split.test_fraction, 0.25);
        assert_eq!(config.forest.n_trees, 100);
        assert_eq!(config.scoring.top_k, 200);
        assert_eq!(config.scoring.model, ClassifierKind::RandomForest);
        assert_eq!(config.input.delimiter_byte(), b',');
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_embedded_defaults_match_default_impl() {
        let config = Config::load(None).unwrap();
        let default = Config::default();
        assert_eq!(config.input.key_column, default.input.key_column);
        assert_eq!(config.input.features_path, default.input.features_path);
        assert_eq!(config.logistic.max_iterations, default.logistic.max_iterations);
        assert_eq!(
            config.logistic.inverse_regularization,
            default.logistic.inverse_regularization
        );
        assert_eq!(config.tree.max_depth, default.tree.max_depth);
        assert_eq!(config.scoring.output_path, default.scoring.output_path);
        assert!(config.scoring.mapping_path.is_none());
    }

    #[test]
    fn test_depth_out_of_range_rejected() {
        let mut config = Config::default();
        config.tree.max_depth = 8;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.forest.max_depth = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_test_fraction_bounds() {
        let mut config = Config::default();
        config.split.test_fraction = 1.0;
        assert!(config.validate().is_err());

        config.split.test_fraction = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_delimiter_must_be_one_ascii_byte() {
        let mut config = Config::default();
        config.input.delimiter = ";".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.input.delimiter_byte(), b';');

        for bad in ["\u{a7}", "", ",;"] {
            config.input.delimiter = bad.to_string();
            assert!(config.validate().is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_columns_must_be_distinct() {
        let mut config = Config::default();
        config.input.category_column = config.input.key_column.clone();
        assert!(matches!(
            config.check_columns(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("override.toml");
        std::fs::write(
            &path,
            "[scoring]\nmodel = \"decision_tree\"\ntop_k = 50\n\n[tree]\nmax_depth = 3\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.scoring.model, ClassifierKind::DecisionTree);
        assert_eq!(config.scoring.top_k, 50);
        assert_eq!(config.tree.max_depth, 3);
        // untouched sections keep their defaults
        assert_eq!(config.forest.n_trees, 100);
    }
}
