/// Tabular input handling
///
/// Loads the two delimited inputs (flight-pattern features and labeled
/// transponder codes) and left-joins them on the transponder code.

pub mod loader;
pub mod merge;
pub mod table;

pub use loader::{load_table, LoadOptions};
pub use merge::{merge_labels, MergedRow, MergedTable};
pub use table::Table;
