use crate::config::Config;
use crate::data::MergedTable;
use crate::error::{PipelineError, Result};
use crate::ml::models::TrainingDataset;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

/// Code reserved for missing or unseen category values
pub const UNSEEN_CODE: usize = 0;

/// Maps the two known label strings to 1/0
///
/// Anything else (blank, missing, misspelled) stays unlabeled; it is never
/// coerced to a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    positive: String,
    negative: String,
}

impl LabelEncoder {
    pub fn new(positive: impl Into<String>, negative: impl Into<String>) -> Self {
        Self {
            positive: positive.into(),
            negative: negative.into(),
        }
    }

    pub fn encode(&self, raw: Option<&str>) -> Option<usize> {
        let value = raw?.trim();
        if value.eq_ignore_ascii_case(&self.positive) {
            Some(1)
        } else if value.eq_ignore_ascii_case(&self.negative) {
            Some(0)
        } else {
            None
        }
    }
}

/// Stable enumeration of a categorical column
///
/// Observed values take codes `1..=n` in first-appearance order; code 0 is
/// reserved for blank and unseen values. The mapping is fitted once per run
/// and passed explicitly to every stage that encodes rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryMapping {
    /// Column the mapping was fitted on
    column: String,

    /// Observed categories; code of `categories[i]` is `i + 1`
    categories: Vec<String>,

    /// SHA-256 over column and ordered categories
    fingerprint: String,

    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl CategoryMapping {
    /// Fit on the given values in order
    pub fn fit<'a>(column: impl Into<String>, values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut categories: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for value in values {
            let value = value.trim();
            if value.is_empty() || index.contains_key(value) {
                continue;
            }
            categories.push(value.to_string());
            index.insert(value.to_string(), categories.len());
        }

        let column = column.into();
        let fingerprint = Self::compute_fingerprint(&column, &categories);

        Self {
            column,
            categories,
            fingerprint,
            index,
        }
    }

    fn compute_fingerprint(column: &str, categories: &[String]) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(column.as_bytes());
        for category in categories {
            hasher.update([0u8]);
            hasher.update(category.as_bytes());
        }

        format!("{:x}", hasher.finalize())
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Distinct observed categories
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Number of codes including the reserved one
    pub fn n_codes(&self) -> usize {
        self.categories.len() + 1
    }

    /// Code for `value`; blank and unseen values get [`UNSEEN_CODE`]
    pub fn encode(&self, value: &str) -> usize {
        self.index
            .get(value.trim())
            .copied()
            .unwrap_or(UNSEEN_CODE)
    }

    /// Like [`CategoryMapping::encode`] but an unseen non-blank value is an error
    pub fn encode_strict(&self, value: &str) -> Result<usize> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(UNSEEN_CODE);
        }
        self.index
            .get(value)
            .copied()
            .ok_or_else(|| PipelineError::UnknownCategory {
                column: self.column.clone(),
                value: value.to_string(),
            })
    }

    pub fn decode(&self, code: usize) -> Option<&str> {
        code.checked_sub(1)
            .and_then(|i| self.categories.get(i))
            .map(String::as_str)
    }

    /// Persist as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(
            "Saved category mapping for '{}' ({} categories) to {}",
            self.column,
            self.len(),
            path.display()
        );
        Ok(())
    }

    /// Load a mapping written by [`CategoryMapping::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut mapping: CategoryMapping = serde_json::from_str(&content)?;

        let expected = Self::compute_fingerprint(&mapping.column, &mapping.categories);
        if expected != mapping.fingerprint {
            return Err(PipelineError::Serialization(format!(
                "category mapping at {} is corrupt: fingerprint does not match its categories",
                path.display()
            )));
        }

        mapping.index = mapping
            .categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i + 1))
            .collect();
        if mapping.index.len() != mapping.categories.len() {
            return Err(PipelineError::Serialization(format!(
                "category mapping at {} repeats a category",
                path.display()
            )));
        }

        Ok(mapping)
    }
}

/// Column roles the extractor needs
#[derive(Debug, Clone)]
pub struct EncodingSettings {
    pub category_column: String,
    pub label_column: String,
    pub labels: LabelEncoder,
    pub strict_categories: bool,
}

impl EncodingSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            category_column: config.input.category_column.clone(),
            label_column: config.input.label_column.clone(),
            labels: LabelEncoder::new(&config.labels.positive, &config.labels.negative),
            strict_categories: config.input.strict_categories,
        }
    }
}

/// Merged table turned into a numeric matrix plus optional labels
#[derive(Debug, Clone)]
pub struct EncodedTable {
    /// Transponder code per row, merged-table order
    pub keys: Vec<String>,

    /// Numeric features with the category code as last column
    pub features: Array2<f64>,

    /// Encoded label per row
    pub labels: Vec<Option<usize>>,

    /// Column names of `features`
    pub feature_names: Vec<String>,

    /// Fingerprint of the mapping used for the category code column
    pub mapping_fingerprint: String,
}

impl EncodedTable {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Row positions with a label, in table order
    pub fn labeled_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.labels[i].is_some()).collect()
    }

    /// Row positions without a label, in table order
    pub fn unlabeled_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.labels[i].is_none()).collect()
    }

    /// Labeled rows as a training dataset
    pub fn labeled(&self) -> Result<TrainingDataset> {
        let indices = self.labeled_indices();
        let labels: Array1<usize> = indices
            .iter()
            .filter_map(|&i| self.labels[i])
            .collect();

        TrainingDataset::new(
            indices.iter().map(|&i| self.keys[i].clone()).collect(),
            self.features.select(Axis(0), &indices),
            labels,
            self.feature_names.clone(),
            self.mapping_fingerprint.clone(),
        )
    }

    /// Unlabeled rows, keeping their positions in this table
    pub fn unlabeled(&self) -> UnlabeledSet {
        let indices = self.unlabeled_indices();
        UnlabeledSet {
            keys: indices.iter().map(|&i| self.keys[i].clone()).collect(),
            features: self.features.select(Axis(0), &indices),
            row_indices: indices,
            mapping_fingerprint: self.mapping_fingerprint.clone(),
        }
    }
}

/// Rows to be scored
#[derive(Debug, Clone)]
pub struct UnlabeledSet {
    pub keys: Vec<String>,
    pub features: Array2<f64>,

    /// Position of each row in the merged table
    pub row_indices: Vec<usize>,

    pub mapping_fingerprint: String,
}

impl UnlabeledSet {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Turns a merged table into numeric features
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    settings: EncodingSettings,
    mapping: CategoryMapping,
}

impl FeatureExtractor {
    /// Fit the category mapping over every row of `merged`
    pub fn fit(merged: &MergedTable, settings: EncodingSettings) -> Result<Self> {
        let column = Self::category_index(merged, &settings)?;
        let mapping = CategoryMapping::fit(
            settings.category_column.clone(),
            merged.rows().iter().map(|row| row.values[column].as_str()),
        );

        info!(
            "Fitted category mapping for '{}': {} distinct values (+1 reserved code)",
            mapping.column(),
            mapping.len()
        );

        Ok(Self { settings, mapping })
    }

    /// Reuse a mapping fitted earlier (for example one loaded from disk)
    pub fn with_mapping(mapping: CategoryMapping, settings: EncodingSettings) -> Result<Self> {
        if mapping.column() != settings.category_column {
            return Err(PipelineError::Configuration(format!(
                "category mapping was fitted on '{}' but the category column is '{}'",
                mapping.column(),
                settings.category_column
            )));
        }
        Ok(Self { settings, mapping })
    }

    pub fn mapping(&self) -> &CategoryMapping {
        &self.mapping
    }

    fn category_index(merged: &MergedTable, settings: &EncodingSettings) -> Result<usize> {
        merged.column_index(&settings.category_column).ok_or_else(|| {
            PipelineError::SchemaMismatch(format!(
                "category column '{}' not found in feature table",
                settings.category_column
            ))
        })
    }

    /// Names and positions of the numeric feature columns
    fn numeric_columns(&self, merged: &MergedTable) -> Vec<(usize, String)> {
        merged
            .headers()
            .iter()
            .enumerate()
            .filter(|(_, h)| {
                h.as_str() != merged.key_column()
                    && **h != self.settings.category_column
                    && **h != self.settings.label_column
            })
            .map(|(i, h)| (i, h.clone()))
            .collect()
    }

    /// Encode every row of `merged`
    pub fn transform(&self, merged: &MergedTable) -> Result<EncodedTable> {
        let category_index = Self::category_index(merged, &self.settings)?;
        let numeric = self.numeric_columns(merged);
        let n_features = numeric.len() + 1;

        let mut features = Array2::zeros((merged.len(), n_features));
        let mut labels = Vec::with_capacity(merged.len());
        let mut unknown_labels: BTreeSet<String> = BTreeSet::new();
        let mut unseen_categories = 0usize;

        for (i, row) in merged.rows().iter().enumerate() {
            for (j, (column, name)) in numeric.iter().enumerate() {
                features[[i, j]] = parse_numeric(&row.values[*column], &row.key, name)?;
            }

            let category = row.values[category_index].as_str();
            let code = if self.settings.strict_categories {
                self.mapping.encode_strict(category)?
            } else {
                self.mapping.encode(category)
            };
            if code == UNSEEN_CODE && !category.trim().is_empty() {
                unseen_categories += 1;
            }
            features[[i, n_features - 1]] = code as f64;

            let label = self.settings.labels.encode(row.label.as_deref());
            if label.is_none() {
                if let Some(raw) = row.label.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
                    unknown_labels.insert(raw.to_string());
                }
            }
            labels.push(label);
        }

        if !unknown_labels.is_empty() {
            warn!(
                "Label values left unset (not '{}' or '{}'): {:?}",
                self.settings.labels.positive, self.settings.labels.negative, unknown_labels
            );
        }
        if unseen_categories > 0 {
            warn!(
                "{} rows have a '{}' value unseen by the mapping; encoded as {}",
                unseen_categories, self.settings.category_column, UNSEEN_CODE
            );
        }

        let mut feature_names: Vec<String> = numeric.into_iter().map(|(_, name)| name).collect();
        feature_names.push(format!("{}_code", self.settings.category_column));

        let encoded = EncodedTable {
            keys: merged.rows().iter().map(|r| r.key.clone()).collect(),
            features,
            labels,
            feature_names,
            mapping_fingerprint: self.mapping.fingerprint().to_string(),
        };

        debug!(
            "Encoded {} rows x {} features ({} labeled)",
            encoded.len(),
            n_features,
            encoded.labeled_indices().len()
        );

        Ok(encoded)
    }
}

fn parse_numeric(cell: &str, key: &str, column: &str) -> Result<f64> {
    match cell.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(PipelineError::SchemaMismatch(format!(
            "row '{}': column '{}' value '{}' is not a finite number",
            key, column, cell
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{merge_labels, Table};

    fn settings() -> EncodingSettings {
        EncodingSettings {
            category_column: "type".to_string(),
            label_column: "class".to_string(),
            labels: LabelEncoder::new("surveillance", "other"),
            strict_categories: false,
        }
    }

    fn merged() -> MergedTable {
        let features = Table::new(
            "features",
            vec!["adshex".into(), "speed1".into(), "type".into(), "steer1".into()],
            vec![
                vec!["A1".into(), "120".into(), "C172".into(), "0.1".into()],
                vec!["B2".into(), "95".into(), "PA28".into(), "0.4".into()],
                vec!["C3".into(), "110".into(), "C172".into(), "0.3".into()],
                vec!["D4".into(), "300".into(), "".into(), "0.0".into()],
            ],
            "adshex",
        )
        .unwrap();
        let labels = Table::new(
            "labels",
            vec!["adshex".into(), "class".into()],
            vec![
                vec!["A1".into(), "surveillance".into()],
                vec!["B2".into(), "other".into()],
                vec!["C3".into(), "".into()],
            ],
            "adshex",
        )
        .unwrap();
        merge_labels(&features, &labels, "class").unwrap()
    }

    #[test]
    fn test_label_encoding_totality() {
        let encoder = LabelEncoder::new("surveillance", "other");
        assert_eq!(encoder.encode(Some("surveillance")), Some(1));
        assert_eq!(encoder.encode(Some(" Other ")), Some(0));
        assert_eq!(encoder.encode(Some("")), None);
        assert_eq!(encoder.encode(Some("unknown")), None);
        assert_eq!(encoder.encode(None), None);
    }

    #[test]
    fn test_category_mapping_bijection() {
        let values = ["C172", "PA28", "C172", "", "B350", "PA28"];
        let mapping = CategoryMapping::fit("type", values.iter().copied());

        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.n_codes(), 4);
        assert_eq!(mapping.encode("C172"), 1);
        assert_eq!(mapping.encode("PA28"), 2);
        assert_eq!(mapping.encode("B350"), 3);
        assert_eq!(mapping.encode(""), UNSEEN_CODE);
        assert_eq!(mapping.encode("GLF4"), UNSEEN_CODE);

        let codes: BTreeSet<usize> = values.iter().map(|v| mapping.encode(v)).collect();
        assert_eq!(codes.len(), mapping.n_codes());
        for code in 1..mapping.n_codes() {
            let category = mapping.decode(code).unwrap();
            assert_eq!(mapping.encode(category), code);
        }
        assert_eq!(mapping.decode(UNSEEN_CODE), None);
    }

    #[test]
    fn test_strict_encoding_rejects_unseen() {
        let mapping = CategoryMapping::fit("type", ["C172"]);
        assert_eq!(mapping.encode_strict("C172").unwrap(), 1);
        assert_eq!(mapping.encode_strict(" ").unwrap(), UNSEEN_CODE);
        assert!(matches!(
            mapping.encode_strict("GLF4"),
            Err(PipelineError::UnknownCategory { .. })
        ));
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let a = CategoryMapping::fit("type", ["C172", "PA28"]);
        let b = CategoryMapping::fit("type", ["PA28", "C172"]);
        let c = CategoryMapping::fit("type", ["C172", "PA28", "C172"]);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_mapping_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        let mapping = CategoryMapping::fit("type", ["C172", "PA28", "B350"]);
        mapping.save(&path).unwrap();

        let loaded = CategoryMapping::load(&path).unwrap();
        assert_eq!(loaded.fingerprint(), mapping.fingerprint());
        assert_eq!(loaded.encode("PA28"), 2);
        assert_eq!(loaded.encode("GLF4"), UNSEEN_CODE);
    }

    #[test]
    fn test_tampered_mapping_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        CategoryMapping::fit("type", ["C172", "PA28"]).save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replace("PA28", "B350")).unwrap();

        assert!(matches!(
            CategoryMapping::load(&path),
            Err(PipelineError::Serialization(_))
        ));
    }

    #[test]
    fn test_transform_builds_matrix() {
        let merged = merged();
        let extractor = FeatureExtractor::fit(&merged, settings()).unwrap();
        let encoded = extractor.transform(&merged).unwrap();

        assert_eq!(encoded.feature_names, vec!["speed1", "steer1", "type_code"]);
        assert_eq!(encoded.features.shape(), &[4, 3]);
        assert_eq!(encoded.features[[1, 0]], 95.0);
        assert_eq!(encoded.features[[1, 1]], 0.4);
        assert_eq!(encoded.features[[0, 2]], 1.0);
        assert_eq!(encoded.features[[2, 2]], 1.0);
        assert_eq!(encoded.features[[3, 2]], UNSEEN_CODE as f64);
        assert_eq!(encoded.labels, vec![Some(1), Some(0), None, None]);
        assert_eq!(encoded.mapping_fingerprint, extractor.mapping().fingerprint());
    }

    #[test]
    fn test_labeled_and_unlabeled_partition() {
        let merged = merged();
        let extractor = FeatureExtractor::fit(&merged, settings()).unwrap();
        let encoded = extractor.transform(&merged).unwrap();

        let labeled = encoded.labeled().unwrap();
        assert_eq!(labeled.keys, vec!["A1", "B2"]);
        assert_eq!(labeled.labels.to_vec(), vec![1, 0]);

        let unlabeled = encoded.unlabeled();
        assert_eq!(unlabeled.keys, vec!["C3", "D4"]);
        assert_eq!(unlabeled.row_indices, vec![2, 3]);
        assert_eq!(unlabeled.features.nrows(), 2);
    }

    #[test]
    fn test_non_numeric_cell_is_schema_mismatch() {
        let features = Table::new(
            "features",
            vec!["adshex".into(), "speed1".into(), "type".into()],
            vec![vec!["A1".into(), "fast".into(), "C172".into()]],
            "adshex",
        )
        .unwrap();
        let labels = Table::new("labels", vec!["adshex".into(), "class".into()], vec![], "adshex")
            .unwrap();
        let merged = merge_labels(&features, &labels, "class").unwrap();

        let extractor = FeatureExtractor::fit(&merged, settings()).unwrap();
        let err = extractor.transform(&merged).unwrap_err();
        assert!(err.to_string().contains("speed1"));
    }

    #[test]
    fn test_with_mapping_checks_column() {
        let mapping = CategoryMapping::fit("model", ["C172"]);
        assert!(matches!(
            FeatureExtractor::with_mapping(mapping, settings()),
            Err(PipelineError::Configuration(_))
        ));
    }
}
