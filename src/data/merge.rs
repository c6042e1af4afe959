use crate::data::table::Table;
use crate::error::{PipelineError, Result};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// One feature row with its (optional) raw label text
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    /// Transponder code
    pub key: String,

    /// Every cell of the feature row, in feature-table column order
    pub values: Vec<String>,

    /// Raw label text if the key appears in the label table
    pub label: Option<String>,
}

/// Feature table with labels left-joined on the key
#[derive(Debug, Clone)]
pub struct MergedTable {
    /// Feature-table column names
    headers: Vec<String>,

    /// Key column name
    key_column: String,

    /// One row per feature row, in feature-table order
    rows: Vec<MergedRow>,

    /// Label rows whose key has no feature row
    unmatched_labels: usize,
}

impl MergedTable {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn rows(&self) -> &[MergedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that received a label row (whatever its text)
    pub fn labeled_count(&self) -> usize {
        self.rows.iter().filter(|r| r.label.is_some()).count()
    }

    pub fn unmatched_labels(&self) -> usize {
        self.unmatched_labels
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }
}

/// Left-join the label column of `labels` onto every row of `features`
///
/// Keys must be unique in both tables; a repeated label key would fan out
/// the join, so it is rejected rather than silently duplicating rows.
pub fn merge_labels(features: &Table, labels: &Table, label_column: &str) -> Result<MergedTable> {
    let key_column = features.key_column();
    let label_key_index = labels
        .column_index(key_column)
        .ok_or_else(|| PipelineError::missing_key(labels.name(), key_column))?;
    let label_index = labels.require_column(label_column)?;

    let mut label_by_key: HashMap<&str, &str> = HashMap::with_capacity(labels.len());
    for row in labels.rows() {
        let key = row[label_key_index].as_str();
        if key.is_empty() {
            return Err(PipelineError::SchemaMismatch(format!(
                "{}: blank value in key column '{}'",
                labels.name(),
                key_column
            )));
        }
        if label_by_key.insert(key, row[label_index].as_str()).is_some() {
            return Err(PipelineError::duplicate_key(labels.name(), key));
        }
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(features.len());
    let mut rows = Vec::with_capacity(features.len());
    for (i, row) in features.rows().iter().enumerate() {
        let key = features.key(i);
        if key.is_empty() {
            return Err(PipelineError::SchemaMismatch(format!(
                "{}: blank value in key column '{}' at data row {}",
                features.name(),
                key_column,
                i + 1
            )));
        }
        if !seen.insert(key) {
            return Err(PipelineError::duplicate_key(features.name(), key));
        }

        rows.push(MergedRow {
            key: key.to_string(),
            values: row.clone(),
            label: label_by_key.get(key).map(|l| l.to_string()),
        });
    }

    let unmatched_labels = label_by_key.keys().filter(|k| !seen.contains(*k)).count();
    if unmatched_labels > 0 {
        warn!(
            "{} label rows in {} have no matching row in {} and were dropped",
            unmatched_labels,
            labels.name(),
            features.name()
        );
    }

    let merged = MergedTable {
        headers: features.headers().to_vec(),
        key_column: key_column.to_string(),
        rows,
        unmatched_labels,
    };

    info!(
        "Merged {} feature rows with {} label rows: {} rows carry a label",
        features.len(),
        labels.len(),
        merged.labeled_count()
    );

    Ok(merged)
}
