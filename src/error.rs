//! Error and diagnostic types for the segmentation pipeline

use std::fmt;

use polars::prelude::PolarsError;
use serde::Serialize;
use thiserror::Error;

/// Fatal input problems. Any of these aborts the whole analysis.
#[derive(Debug, Error)]
pub enum DataError {
    /// One or more required columns are absent from the dataset
    #[error("dataset is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A required cell is null or could not be read as a number
    #[error("missing or non-numeric value in column '{column}' at row {row}")]
    MissingValue { column: String, row: usize },

    #[error("dataset contains no records")]
    EmptyDataset,

    /// Feature matrix does not have the expected number of columns
    #[error("expected {expected} feature columns, found {found}")]
    FeatureCount { expected: usize, found: usize },

    /// Not enough records to form the requested number of clusters
    #[error("{records} records cannot be partitioned into {clusters} clusters")]
    TooFewRecords { records: usize, clusters: usize },

    #[error("number of clusters must be at least 1")]
    InvalidClusterCount,

    /// Two inputs that must be aligned row by row are not
    #[error("{what}: expected {expected} rows, found {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("unsupported file type '{0}', expected a .csv file")]
    UnsupportedFileType(String),

    #[error("failed to read dataset: {0}")]
    Polars(#[from] PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Non-fatal findings recorded next to a successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A K-Means fit hit the iteration cap; its last iterate was kept.
    ConvergenceWarning { clusters: usize, iterations: usize },
    /// The knee detector found no distinct elbow in the dispersion curve.
    AmbiguousElbow,
    /// A feature had zero variance and was standardized to all zeros.
    DegenerateFeature { feature: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ConvergenceWarning {
                clusters,
                iterations,
            } => write!(
                f,
                "k-means with {} clusters did not converge within {} iterations",
                clusters, iterations
            ),
            Diagnostic::AmbiguousElbow => write!(f, "no distinct elbow in the dispersion curve"),
            Diagnostic::DegenerateFeature { feature } => {
                write!(f, "feature '{}' has zero variance", feature)
            }
        }
    }
}
