//! End-to-end analysis: normalize, search the elbow, segment, aggregate

use log::{info, warn};
use ndarray::Array2;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::data::{SurveyData, AGE, FEATURE_COLUMNS, FLIGHT_DISTANCE, N_FEATURES, SEAT_COMFORT};
use crate::error::{DataError, Diagnostic};
use crate::model::{fit_kmeans, KMeansModel, KMeansParams, SEGMENT_CLUSTERS};
use crate::search::{search_elbow, DispersionCurve, ElbowSearch, K_MAX};
use crate::summary::{summarize, ClusterSummary};

/// Tunables for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Seed shared by every K-Means fit
    pub seed: u64,
    pub max_iters: usize,
    pub tolerance: f64,
    pub n_init: usize,
    /// Run the candidate fits and the segmentation on the rayon pool
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_iters: 300,
            tolerance: 1e-4,
            n_init: 10,
            parallel: true,
        }
    }
}

impl AnalysisConfig {
    pub fn kmeans_params(&self, n_clusters: usize) -> KMeansParams {
        KMeansParams {
            n_clusters,
            max_iters: self.max_iters,
            tolerance: self.tolerance,
            n_init: self.n_init,
            seed: self.seed,
        }
    }
}

/// Everything one analysis produces
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub passengers: usize,
    pub curve: DispersionCurve,
    /// Advisory only; the segmentation always uses `SEGMENT_CLUSTERS`
    pub elbow: Option<usize>,
    pub segmentation: KMeansModel,
    /// Segmentation centroids mapped back to original feature units
    pub centroids_original: Array2<f64>,
    pub summary: ClusterSummary,
    pub diagnostics: Vec<Diagnostic>,
}

/// One feature's raw values, for histograms
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureDistribution {
    pub feature: &'static str,
    pub values: Vec<f64>,
}

/// (age, flight distance) of one passenger and its cluster
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScatterPoint2 {
    pub age: f64,
    pub flight_distance: f64,
    pub cluster: usize,
}

/// (age, flight distance, seat comfort) of one passenger and its cluster
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScatterPoint3 {
    pub age: f64,
    pub flight_distance: f64,
    pub seat_comfort: f64,
    pub cluster: usize,
}

/// Chart-ready data handed to the rendering layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationInputs {
    pub distributions: Vec<FeatureDistribution>,
    pub curve: DispersionCurve,
    pub elbow: Option<usize>,
    pub scatter_2d: Vec<ScatterPoint2>,
    /// Denormalized centroids as (age, flight distance)
    pub centroids_2d: Vec<(f64, f64)>,
    pub scatter_3d: Vec<ScatterPoint3>,
    pub summary: ClusterSummary,
}

/// Run the whole analysis on prepared survey data.
///
/// The elbow search and the fixed-k segmentation only read the standardized
/// features, so with `config.parallel` they run side by side. The record
/// count is checked against both before any fitting starts.
pub fn analyze(data: &SurveyData, config: &AnalysisConfig) -> crate::Result<AnalysisReport> {
    check_record_count(data.len())?;
    info!(
        "analyzing {} passengers (seed {}, {} restarts)",
        data.len(),
        config.seed,
        config.n_init
    );

    let segment_params = config.kmeans_params(SEGMENT_CLUSTERS);
    let search_params = config.kmeans_params(1);
    let (search, segmentation) = if config.parallel {
        rayon::join(
            || search_elbow(&data.features, &search_params, true),
            || fit_kmeans(&data.features, &segment_params),
        )
    } else {
        (
            search_elbow(&data.features, &search_params, false),
            fit_kmeans(&data.features, &segment_params),
        )
    };
    let segmentation = segmentation?;
    let ElbowSearch {
        curve,
        elbow,
        diagnostics: search_diagnostics,
    } = search?;

    if let Some(k) = elbow {
        if k != SEGMENT_CLUSTERS {
            warn!(
                "elbow suggests {} clusters, segmentation uses {}",
                k, SEGMENT_CLUSTERS
            );
        }
    }

    let centroids_original = data.scaler.inverse_transform(&segmentation.centroids)?;
    let summary = summarize(
        &data.raw_features,
        &data.passenger_ids,
        &segmentation.labels,
    )?;

    let mut diagnostics = data
        .scaler
        .degenerate_columns()
        .iter()
        .map(|&j| Diagnostic::DegenerateFeature {
            feature: FEATURE_COLUMNS[j].to_string(),
        })
        .collect::<Vec<_>>();
    diagnostics.extend(search_diagnostics);
    if !segmentation.converged {
        diagnostics.push(Diagnostic::ConvergenceWarning {
            clusters: segmentation.n_clusters,
            iterations: segmentation.iterations,
        });
    }

    info!(
        "segmented into {} clusters, inertia {:.4}",
        segmentation.n_clusters, segmentation.inertia
    );

    Ok(AnalysisReport {
        passengers: data.len(),
        curve,
        elbow,
        segmentation,
        centroids_original,
        summary,
        diagnostics,
    })
}

fn check_record_count(records: usize) -> crate::Result<()> {
    if records == 0 {
        return Err(DataError::EmptyDataset);
    }
    for clusters in [SEGMENT_CLUSTERS, K_MAX] {
        if records < clusters {
            return Err(DataError::TooFewRecords { records, clusters });
        }
    }
    Ok(())
}

/// Validate a loaded table and analyze it
pub fn analyze_dataframe(
    df: &DataFrame,
    config: &AnalysisConfig,
) -> crate::Result<(SurveyData, AnalysisReport)> {
    let data = SurveyData::from_dataframe(df)?;
    let report = analyze(&data, config)?;
    Ok((data, report))
}

impl AnalysisReport {
    /// Chart inputs built from this report and the data it was computed on
    pub fn visualization_inputs(&self, data: &SurveyData) -> VisualizationInputs {
        let raw = &data.raw_features;
        let labels = &self.segmentation.labels;

        let distributions = (0..N_FEATURES)
            .map(|j| FeatureDistribution {
                feature: FEATURE_COLUMNS[j],
                values: data.raw_column(j).to_vec(),
            })
            .collect();

        let scatter_2d = raw
            .outer_iter()
            .zip(labels.iter())
            .map(|(row, &cluster)| ScatterPoint2 {
                age: row[AGE],
                flight_distance: row[FLIGHT_DISTANCE],
                cluster,
            })
            .collect();

        let scatter_3d = raw
            .outer_iter()
            .zip(labels.iter())
            .map(|(row, &cluster)| ScatterPoint3 {
                age: row[AGE],
                flight_distance: row[FLIGHT_DISTANCE],
                seat_comfort: row[SEAT_COMFORT],
                cluster,
            })
            .collect();

        let centroids_2d = self
            .centroids_original
            .outer_iter()
            .map(|c| (c[AGE], c[FLIGHT_DISTANCE]))
            .collect();

        VisualizationInputs {
            distributions,
            curve: self.curve.clone(),
            elbow: self.elbow,
            scatter_2d,
            centroids_2d,
            scatter_3d,
            summary: self.summary.clone(),
        }
    }
}
