//! paxseg: passenger survey segmentation using K-Means clustering
//!
//! Standardizes age, flight distance, seat comfort and cleanliness, estimates
//! a natural cluster count with the elbow heuristic, segments passengers into
//! a fixed number of clusters and summarizes each cluster.

pub mod cli;
pub mod data;
pub mod error;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod search;
pub mod summary;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{load_and_process_data, Record, StandardScaler, SurveyData};
pub use error::{DataError, Diagnostic};
pub use ingest::{load_csv, StagedUpload, UploadConfig};
pub use model::{fit_kmeans, KMeansModel, KMeansParams, SEGMENT_CLUSTERS};
pub use pipeline::{analyze, analyze_dataframe, AnalysisConfig, AnalysisReport, VisualizationInputs};
pub use search::{locate_knee, search_elbow, DispersionCurve, DispersionPoint, K_MAX};
pub use summary::{summarize, ClusterProfile, ClusterSummary};

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, DataError>;
