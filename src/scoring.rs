use crate::data::MergedTable;
use crate::error::{PipelineError, Result};
use crate::ml::{Classifier, UnlabeledSet, DECISION_THRESHOLD};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

/// One unlabeled aircraft with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRow {
    /// Transponder code
    pub key: String,

    /// Hard 0/1 prediction
    pub prediction: usize,

    /// Probability of the positive class
    pub probability: f64,

    /// Position of the row in the merged table
    #[serde(skip)]
    pub row_index: usize,
}

/// Score every unlabeled row and keep the `top_k` most probable
///
/// The model and the rows must have been encoded with the same category
/// mapping. Ties keep merged-table order.
pub fn score_unlabeled(
    model: &dyn Classifier,
    unlabeled: &UnlabeledSet,
    top_k: usize,
) -> Result<Vec<ScoredRow>> {
    let fitted_with = model
        .metadata()
        .mapping_fingerprint
        .as_deref()
        .ok_or_else(|| PipelineError::NotTrained(model.kind().to_string()))?;

    if fitted_with != unlabeled.mapping_fingerprint {
        return Err(PipelineError::MappingMismatch {
            expected: fitted_with.to_string(),
            found: unlabeled.mapping_fingerprint.clone(),
        });
    }

    if unlabeled.is_empty() {
        warn!("No unlabeled rows to score");
        return Ok(Vec::new());
    }

    let probabilities = model.predict_proba(&unlabeled.features)?;

    let mut scored: Vec<ScoredRow> = unlabeled
        .keys
        .iter()
        .zip(unlabeled.row_indices.iter())
        .zip(probabilities.iter())
        .map(|((key, &row_index), &probability)| ScoredRow {
            key: key.clone(),
            prediction: usize::from(probability > DECISION_THRESHOLD),
            probability,
            row_index,
        })
        .collect();

    let flagged = scored.iter().filter(|r| r.prediction == 1).count();

    // sort_by is stable
    scored.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    scored.truncate(top_k);

    info!(
        "Scored {} unlabeled rows with {} ({} predicted positive); keeping top {}",
        unlabeled.len(),
        model.kind(),
        flagged,
        scored.len()
    );

    Ok(scored)
}

/// Output file layout
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Append the original feature-table values after the score columns
    pub include_features: bool,

    pub delimiter: u8,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            include_features: false,
            delimiter: b',',
        }
    }
}

/// Write scored rows with a header, replacing any existing file
///
/// Returns the number of data rows written.
pub fn write_scores(
    path: &Path,
    rows: &[ScoredRow],
    merged: &MergedTable,
    options: &OutputOptions,
) -> Result<usize> {
    let file = File::create(path).map_err(|e| {
        PipelineError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let mut writer = WriterBuilder::new()
        .delimiter(options.delimiter)
        .from_writer(file);

    let key_index = merged.column_index(merged.key_column());
    let extra_columns: Vec<usize> = if options.include_features {
        (0..merged.headers().len())
            .filter(|&i| Some(i) != key_index)
            .collect()
    } else {
        Vec::new()
    };

    let mut header: Vec<&str> = vec![merged.key_column(), "prediction", "probability"];
    header.extend(extra_columns.iter().map(|&i| merged.headers()[i].as_str()));
    writer.write_record(&header)?;

    for row in rows {
        let source = merged.rows().get(row.row_index).ok_or_else(|| {
            PipelineError::Validation(format!(
                "scored row '{}' points past the merged table",
                row.key
            ))
        })?;

        let mut record = vec![
            row.key.clone(),
            row.prediction.to_string(),
            row.probability.to_string(),
        ];
        record.extend(extra_columns.iter().map(|&i| source.values[i].clone()));
        writer.write_record(&record)?;
    }

    writer.flush()?;

    info!("Wrote {} scored rows to {}", rows.len(), path.display());
    Ok(rows.len())
}
