use crate::data::table::Table;
use crate::error::{PipelineError, Result};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Options for reading a delimited table
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Column holding the row key
    pub key_column: String,

    /// Field delimiter
    pub delimiter: u8,
}

impl LoadOptions {
    pub fn new(key_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// Load a delimited file with a header row
pub fn load_table(path: &Path, options: &LoadOptions) -> Result<Table> {
    let file = File::open(path).map_err(|e| {
        PipelineError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let table = read_table(file, &name, options)?;
    info!(
        "Loaded {} rows x {} columns from {}",
        table.len(),
        table.headers().len(),
        path.display()
    );
    Ok(table)
}

/// Read a delimited table from any reader
///
/// Rows are accepted with any width here so that a ragged row surfaces as a
/// schema error naming the table rather than a bare CSV error.
pub fn read_table<R: Read>(reader: R, name: &str, options: &LoadOptions) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(PipelineError::SchemaMismatch(format!(
            "{}: missing header row",
            name
        )));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    debug!("{}: read {} data rows", name, rows.len());

    Table::new(name, headers, rows, &options.key_column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_table() {
        let data = "adshex,duration1,type\nA1, 0.5 ,C172\nB2,0.7,PA28\n";
        let table = read_table(data.as_bytes(), "features", &LoadOptions::new("adshex")).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.headers(), &["adshex", "duration1", "type"]);
        // cells are trimmed
        assert_eq!(table.rows()[0][1], "0.5");
    }

    #[test]
    fn test_custom_delimiter() {
        let data = "adshex;class\nA1;surveillance\n";
        let options = LoadOptions::new("adshex").with_delimiter(b';');
        let table = read_table(data.as_bytes(), "labels", &options).unwrap();
        assert_eq!(table.rows()[0][1], "surveillance");
    }

    #[test]
    fn test_missing_key_column() {
        let data = "code,class\nA1,other\n";
        let result = read_table(data.as_bytes(), "labels", &LoadOptions::new("adshex"));
        assert!(matches!(result, Err(PipelineError::MissingKey { .. })));
    }

    #[test]
    fn test_ragged_row_is_schema_mismatch() {
        let data = "adshex,duration1,type\nA1,0.5\n";
        let result = read_table(data.as_bytes(), "features", &LoadOptions::new("adshex"));
        assert!(matches!(result, Err(PipelineError::SchemaMismatch(_))));
    }

    #[test]
    fn test_load_table_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "adshex,class").unwrap();
        writeln!(file, "A1,surveillance").unwrap();
        writeln!(file, "B2,other").unwrap();

        let table = load_table(file.path(), &LoadOptions::new("adshex")).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.key(0), "A1");
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_table(
            Path::new("/nonexistent/planes_features.csv"),
            &LoadOptions::new("adshex"),
        );
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }
}
