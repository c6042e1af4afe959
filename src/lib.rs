//! Ranks unlabeled aircraft by the probability of being government
//! surveillance planes.
//!
//! Flight-pattern features keyed by transponder code are left-joined with a
//! smaller table of labeled codes, encoded, and used to train and evaluate
//! logistic regression, decision tree and random forest classifiers. The
//! chosen classifier is refit on every labeled row and the most probable
//! unlabeled aircraft are written to a delimited file.

pub mod config;
pub mod data;
pub mod error;
pub mod ml;
pub mod pipeline;
pub mod scoring;

pub use crate::config::Config;
pub use crate::error::{PipelineError, Result};
pub use crate::pipeline::{DataSummary, EvaluationReport, Pipeline, PreparedData, RunReport, ScoreReport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
