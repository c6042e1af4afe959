use crate::error::{PipelineError, Result};

/// In-memory delimited table keyed by one column
///
/// Cells are kept as text; typing happens during encoding so the same table
/// can feed both the numeric feature matrix and the output writer.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Human-readable name used in error messages (usually the file name)
    name: String,

    /// Column names in file order
    headers: Vec<String>,

    /// Position of the key column in `headers`
    key_index: usize,

    /// Data rows, each exactly `headers.len()` wide
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table, checking that the key column exists and every row has
    /// the header's width
    pub fn new(
        name: impl Into<String>,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        key_column: &str,
    ) -> Result<Self> {
        let name = name.into();
        let key_index = headers
            .iter()
            .position(|h| h == key_column)
            .ok_or_else(|| PipelineError::missing_key(name.clone(), key_column))?;

        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != headers.len())
        {
            return Err(PipelineError::SchemaMismatch(format!(
                "{}: data row {} has {} fields, header has {}",
                name,
                i + 1,
                row.len(),
                headers.len()
            )));
        }

        Ok(Self {
            name,
            headers,
            key_index,
            rows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn key_column(&self) -> &str {
        &self.headers[self.key_index]
    }

    pub fn key_index(&self) -> usize {
        self.key_index
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Key of the row at `row`
    pub fn key(&self, row: usize) -> &str {
        &self.rows[row][self.key_index]
    }

    /// Iterate over row keys in file order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(move |row| row[self.key_index].as_str())
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    /// Like [`Table::column_index`] but a missing column is a schema error
    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column).ok_or_else(|| {
            PipelineError::SchemaMismatch(format!(
                "{}: expected column '{}' not found (columns: {})",
                self.name,
                column,
                self.headers.join(", ")
            ))
        })
    }
}
