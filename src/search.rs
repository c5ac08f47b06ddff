//! Elbow search: WCSS over candidate cluster counts and knee detection

use log::{debug, info, warn};
use ndarray::{concatenate, Array2, Axis};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{DataError, Diagnostic};
use crate::model::{farthest_point, fit_kmeans, refine_kmeans, KMeansModel, KMeansParams};

/// Largest candidate cluster count in the dispersion curve
pub const K_MAX: usize = 10;

/// Kneedle sensitivity
const SENSITIVITY: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DispersionPoint {
    pub clusters: usize,
    pub wcss: f64,
}

/// WCSS per candidate cluster count, ordered by count and non-increasing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispersionCurve {
    points: Vec<DispersionPoint>,
}

impl DispersionCurve {
    pub fn points(&self) -> &[DispersionPoint] {
        &self.points
    }

    pub fn wcss(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.wcss).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl From<Vec<DispersionPoint>> for DispersionCurve {
    fn from(points: Vec<DispersionPoint>) -> Self {
        Self { points }
    }
}

/// Result of the elbow search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElbowSearch {
    pub curve: DispersionCurve,
    /// Advisory cluster count; `None` when no distinct knee exists
    pub elbow: Option<usize>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Fit K-Means for every k in `1..=K_MAX` and locate the elbow.
///
/// Fewer than `K_MAX` records cannot fill the curve and are rejected.
/// `params.n_clusters` is ignored; every fit uses `params.seed`. With
/// `parallel` the fits run on the rayon pool and are collected in k order.
pub fn search_elbow(
    features: &Array2<f64>,
    params: &KMeansParams,
    parallel: bool,
) -> crate::Result<ElbowSearch> {
    if features.nrows() == 0 {
        return Err(DataError::EmptyDataset);
    }
    if features.nrows() < K_MAX {
        return Err(DataError::TooFewRecords {
            records: features.nrows(),
            clusters: K_MAX,
        });
    }

    let mut fits = if parallel {
        (1..=K_MAX)
            .into_par_iter()
            .map(|k| fit_kmeans(features, &params.with_clusters(k)))
            .collect::<crate::Result<Vec<_>>>()?
    } else {
        (1..=K_MAX)
            .map(|k| fit_kmeans(features, &params.with_clusters(k)))
            .collect::<crate::Result<Vec<_>>>()?
    };

    enforce_monotone(features, params, &mut fits)?;

    let mut diagnostics = fits
        .iter()
        .filter(|fit| !fit.converged)
        .map(|fit| Diagnostic::ConvergenceWarning {
            clusters: fit.n_clusters,
            iterations: fit.iterations,
        })
        .collect::<Vec<_>>();

    let curve = DispersionCurve::from(
        fits.iter()
            .map(|fit| DispersionPoint {
                clusters: fit.n_clusters,
                wcss: fit.inertia,
            })
            .collect::<Vec<_>>(),
    );

    let elbow = locate_knee(&curve);
    match elbow {
        Some(k) => info!("elbow estimate: {} clusters", k),
        None => {
            warn!("no distinct elbow in the dispersion curve");
            diagnostics.push(Diagnostic::AmbiguousElbow);
        }
    }

    Ok(ElbowSearch {
        curve,
        elbow,
        diagnostics,
    })
}

/// Re-fit any k whose inertia exceeds the k-1 fit, warm-started from the k-1
/// centroids plus its worst-fitting point. Lloyd steps never raise inertia,
/// so the warm start ends at or below the k-1 value.
fn enforce_monotone(
    features: &Array2<f64>,
    params: &KMeansParams,
    fits: &mut [KMeansModel],
) -> crate::Result<()> {
    for i in 1..fits.len() {
        if fits[i].inertia <= fits[i - 1].inertia {
            continue;
        }
        let previous = &fits[i - 1];
        let Some(worst) = farthest_point(features, previous) else {
            continue;
        };
        let init = concatenate(
            Axis(0),
            &[
                previous.centroids.view(),
                features.row(worst).insert_axis(Axis(0)),
            ],
        )
        .map_err(|_| DataError::FeatureCount {
            expected: previous.centroids.ncols(),
            found: features.ncols(),
        })?;

        let warm = refine_kmeans(features, init, &params.with_clusters(previous.n_clusters + 1))?;
        debug!(
            "k={}: warm start inertia {:.4} replaces {:.4}",
            warm.n_clusters, warm.inertia, fits[i].inertia
        );
        if warm.inertia < fits[i].inertia {
            fits[i] = warm;
        }
    }
    Ok(())
}

/// Knee of a convex, decreasing dispersion curve (Kneedle, offline mode).
///
/// Returns the cluster count at the first knee, or `None` when the curve has
/// fewer than three points, is flat, or shows no distinct knee.
pub fn locate_knee(curve: &DispersionCurve) -> Option<usize> {
    let x = curve
        .points()
        .iter()
        .map(|p| p.clusters as f64)
        .collect::<Vec<_>>();
    let index = knee_index(&x, &curve.wcss(), SENSITIVITY)?;
    Some(curve.points()[index].clusters)
}

fn knee_index(x: &[f64], y: &[f64], sensitivity: f64) -> Option<usize> {
    let n = x.len();
    if n < 3 || y.len() != n {
        return None;
    }

    let x_norm = unit_scale(x)?;
    let y_norm = unit_scale(y)?;

    // flipping y turns the convex decreasing curve into a concave increasing one
    let difference = x_norm
        .iter()
        .zip(&y_norm)
        .map(|(xn, yn)| (1.0 - yn) - xn)
        .collect::<Vec<_>>();

    let maxima = local_extrema(&difference, |a, b| a >= b);
    let minima = local_extrema(&difference, |a, b| a <= b);
    let first_max = *maxima.first()?;
    let step = ((x_norm[n - 1] - x_norm[0]) / (n - 1) as f64).abs();

    let mut threshold = 0.0;
    let mut threshold_index = first_max;
    for i in first_max..n - 1 {
        if maxima.contains(&i) {
            threshold = difference[i] - sensitivity * step;
            threshold_index = i;
        }
        if minima.contains(&i) {
            threshold = 0.0;
        }
        if difference[i + 1] < threshold {
            return Some(threshold_index);
        }
    }
    None
}

fn unit_scale(values: &[f64]) -> Option<Vec<f64>> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return None;
    }
    Some(values.iter().map(|v| (v - min) / range).collect())
}

/// Indices where `cmp` holds against both neighbours; the ends compare
/// against themselves.
fn local_extrema(values: &[f64], cmp: impl Fn(f64, f64) -> bool) -> Vec<usize> {
    let last = values.len() - 1;
    (0..values.len())
        .filter(|&i| {
            let left = values[i.saturating_sub(1)];
            let right = values[(i + 1).min(last)];
            cmp(values[i], left) && cmp(values[i], right)
        })
        .collect()
}
