use crate::config::Config;
use crate::data::{load_table, merge_labels, LoadOptions, MergedTable};
use crate::error::Result;
use crate::ml::{
    build_classifier, train_test_split, CategoryMapping, ClassifierKind, EncodedTable,
    EncodingSettings, Evaluation, FeatureExtractor, FeatureImportances, ModelMetadata,
};
use crate::scoring::{score_unlabeled, write_scores, OutputOptions, ScoredRow};
use serde::Serialize;
use std::path::PathBuf;
use strum::IntoEnumIterator;
use tracing::info;

/// Inputs merged and encoded once per run
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub merged: MergedTable,
    pub encoded: EncodedTable,
    pub mapping: CategoryMapping,
    pub summary: DataSummary,
}

/// Row counts of the prepared inputs
#[derive(Debug, Clone, Serialize)]
pub struct DataSummary {
    pub feature_rows: usize,
    pub label_rows: usize,
    pub merged_rows: usize,
    /// Rows whose label encodes to 0 or 1
    pub labeled_rows: usize,
    pub unlabeled_rows: usize,
    /// Label rows with no feature row
    pub unmatched_labels: usize,
    pub categories: usize,
    pub mapping_fingerprint: String,
}

/// Holdout evaluation of one classifier
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub model: ModelMetadata,
    pub train_size: usize,
    pub test_size: usize,
    pub evaluation: Evaluation,
    pub importances: FeatureImportances,
}

/// Result of refitting and scoring the unlabeled rows
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub model: ModelMetadata,
    pub unlabeled_rows: usize,
    pub written_rows: usize,
    pub output_path: PathBuf,
    pub top: Vec<ScoredRow>,
}

/// Everything one full run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub data: DataSummary,
    pub evaluations: Vec<EvaluationReport>,
    pub score: ScoreReport,
}

/// Load, merge, encode, train, evaluate and score
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load both tables, merge them and encode every row
    ///
    /// The category mapping is fitted once over the whole feature table. When
    /// `scoring.mapping_path` names an existing file, that mapping is reused
    /// instead; otherwise the fitted mapping is written there.
    pub fn prepare(&self) -> Result<PreparedData> {
        let input = &self.config.input;
        let options = LoadOptions::new(&input.key_column).with_delimiter(input.delimiter_byte());

        let features = load_table(&input.features_path, &options)?;
        let labels = load_table(&input.labels_path, &options)?;
        let merged = merge_labels(&features, &labels, &input.label_column)?;

        let settings = EncodingSettings::from_config(&self.config);
        let extractor = match &self.config.scoring.mapping_path {
            Some(path) if path.exists() => {
                info!("Reusing category mapping from {}", path.display());
                FeatureExtractor::with_mapping(CategoryMapping::load(path)?, settings)?
            }
            Some(path) => {
                let extractor = FeatureExtractor::fit(&merged, settings)?;
                extractor.mapping().save(path)?;
                extractor
            }
            None => FeatureExtractor::fit(&merged, settings)?,
        };

        let encoded = extractor.transform(&merged)?;
        let labeled_rows = encoded.labeled_indices().len();

        let summary = DataSummary {
            feature_rows: features.len(),
            label_rows: labels.len(),
            merged_rows: merged.len(),
            labeled_rows,
            unlabeled_rows: encoded.len() - labeled_rows,
            unmatched_labels: merged.unmatched_labels(),
            categories: extractor.mapping().len(),
            mapping_fingerprint: extractor.mapping().fingerprint().to_string(),
        };

        info!(
            "Prepared {} rows: {} labeled, {} to score, {} aircraft types",
            summary.merged_rows, summary.labeled_rows, summary.unlabeled_rows, summary.categories
        );

        Ok(PreparedData {
            merged,
            encoded,
            mapping: extractor.mapping().clone(),
            summary,
        })
    }

    /// Fit `kind` on the training partition and score the holdout
    pub fn evaluate(&self, data: &PreparedData, kind: ClassifierKind) -> Result<EvaluationReport> {
        let labeled = data.encoded.labeled()?;
        let split = train_test_split(&labeled, self.config.split.test_fraction, self.config.split.seed)?;

        let mut model = build_classifier(kind, &self.config);
        model.fit(&split.train)?;

        let predictions = model.predict(&split.test.features)?;
        let evaluation =
            Evaluation::from_predictions(&split.test.labels.to_vec(), &predictions.to_vec())?;

        info!("{}: {}", kind, evaluation);

        Ok(EvaluationReport {
            model: model.metadata().clone(),
            train_size: split.train.n_samples(),
            test_size: split.test.n_samples(),
            evaluation,
            importances: model.feature_importances()?,
        })
    }

    /// Refit `kind` on every labeled row, rank the unlabeled rows and write
    /// the top ones
    pub fn score(&self, data: &PreparedData, kind: ClassifierKind) -> Result<ScoreReport> {
        let labeled = data.encoded.labeled()?;
        let mut model = build_classifier(kind, &self.config);
        model.fit(&labeled)?;

        let unlabeled = data.encoded.unlabeled();
        let top = score_unlabeled(model.as_ref(), &unlabeled, self.config.scoring.top_k)?;

        let options = OutputOptions {
            include_features: self.config.scoring.include_features,
            delimiter: self.config.input.delimiter_byte(),
        };
        let output_path = self.config.scoring.output_path.clone();
        let written_rows = write_scores(&output_path, &top, &data.merged, &options)?;

        Ok(ScoreReport {
            model: model.metadata().clone(),
            unlabeled_rows: unlabeled.len(),
            written_rows,
            output_path,
            top,
        })
    }

    /// Evaluate every classifier, then score with the configured one
    pub fn run(&self) -> Result<RunReport> {
        let data = self.prepare()?;

        let evaluations = ClassifierKind::iter()
            .map(|kind| self.evaluate(&data, kind))
            .collect::<Result<Vec<_>>>()?;

        let score = self.score(&data, self.config.scoring.model)?;

        Ok(RunReport {
            data: data.summary,
            evaluations,
            score,
        })
    }
}

impl std::fmt::Display for DataSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Data: {} feature rows, {} label rows ({} unmatched)",
            self.feature_rows, self.label_rows, self.unmatched_labels
        )?;
        write!(
            f,
            "      {} merged, {} labeled, {} unlabeled, {} aircraft types",
            self.merged_rows, self.labeled_rows, self.unlabeled_rows, self.categories
        )
    }
}

impl std::fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "== {} (train {}, test {}) ==",
            self.model.name, self.train_size, self.test_size
        )?;
        writeln!(f, "{}", self.evaluation.confusion)?;
        writeln!(f, "{}", self.evaluation)?;
        writeln!(f, "Top features ({:?}):", self.importances.kind)?;
        for entry in self.importances.ranked().iter().take(10) {
            writeln!(f, "  {:<24} {:>10.4}", entry.feature, entry.value)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ScoreReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "== Scored {} unlabeled rows with {}; wrote {} to {} ==",
            self.unlabeled_rows,
            self.model.name,
            self.written_rows,
            self.output_path.display()
        )?;
        for row in self.top.iter().take(10) {
            writeln!(f, "  {:<10} {:.4} {}", row.key, row.probability, row.prediction)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.data)?;
        for evaluation in &self.evaluations {
            writeln!(f)?;
            write!(f, "{}", evaluation)?;
        }
        writeln!(f)?;
        write!(f, "{}", self.score)
    }
}
