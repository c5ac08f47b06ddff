//! K-Means clustering model implementation

use linfa_nn::distance::{Distance, L2Dist};
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;

use crate::error::DataError;

/// Number of clusters used for the final segmentation.
///
/// Fixed, and deliberately not taken from the elbow estimate.
pub const SEGMENT_CLUSTERS: usize = 3;

/// K-Means hyperparameters
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansParams {
    pub n_clusters: usize,
    pub max_iters: usize,
    /// Convergence threshold, relative to the mean feature variance
    pub tolerance: f64,
    /// Number of k-means++ restarts; the lowest inertia wins
    pub n_init: usize,
    pub seed: u64,
}

impl KMeansParams {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iters: 300,
            tolerance: 1e-4,
            n_init: 10,
            seed: 42,
        }
    }

    pub fn with_clusters(&self, n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..self.clone()
        }
    }
}

/// Fitted K-Means model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignment for every row of the training data
    pub labels: Array1<usize>,
    /// Cluster centroids in normalized space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
    /// Lloyd iterations run by the selected restart
    pub iterations: usize,
    /// False when the iteration cap was hit first
    pub converged: bool,
}

impl KMeansModel {
    /// Index of the nearest centroid; ties go to the lowest index
    pub fn predict(&self, point: ArrayView1<f64>) -> usize {
        nearest_centroid(point, &self.centroids).0
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            sizes[label] += 1;
        }
        sizes
    }

    /// Row indices belonging to each cluster
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.n_clusters];
        for (i, &label) in self.labels.iter().enumerate() {
            members[label].push(i);
        }
        members
    }
}

/// Fit K-Means on standardized features.
///
/// Runs `n_init` k-means++ seeded restarts from a single `Xoshiro256PlusPlus`
/// stream and keeps the one with the lowest inertia (earliest on ties), so
/// the result depends only on the data and `params.seed`.
pub fn fit_kmeans(features: &Array2<f64>, params: &KMeansParams) -> crate::Result<KMeansModel> {
    check_fit_input(features, params.n_clusters)?;

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(params.seed);
    let init = kmeans_plusplus(features, params.n_clusters, &mut rng);
    let mut best = lloyd(features, init, params);

    for run in 1..params.n_init.max(1) {
        let init = kmeans_plusplus(features, params.n_clusters, &mut rng);
        let model = lloyd(features, init, params);
        debug!(
            "k={} restart {}: inertia {:.4} after {} iterations",
            params.n_clusters, run, model.inertia, model.iterations
        );
        if model.inertia < best.inertia {
            best = model;
        }
    }

    if !best.converged {
        warn!(
            "k-means with {} clusters stopped at the iteration cap ({})",
            best.n_clusters, best.iterations
        );
    }
    Ok(best)
}

/// Run Lloyd iterations from given initial centroids (single run, no restarts)
pub fn refine_kmeans(
    features: &Array2<f64>,
    init: Array2<f64>,
    params: &KMeansParams,
) -> crate::Result<KMeansModel> {
    check_fit_input(features, init.nrows())?;
    if init.ncols() != features.ncols() {
        return Err(DataError::FeatureCount {
            expected: features.ncols(),
            found: init.ncols(),
        });
    }
    Ok(lloyd(features, init, params))
}

/// Row index of the point farthest from its assigned centroid
pub fn farthest_point(features: &Array2<f64>, model: &KMeansModel) -> Option<usize> {
    let mut farthest: Option<(usize, f64)> = None;
    for (i, row) in features.outer_iter().enumerate() {
        let d = L2Dist.rdistance(row, model.centroids.row(model.labels[i]));
        if farthest.map_or(true, |(_, best)| d > best) {
            farthest = Some((i, d));
        }
    }
    farthest.map(|(i, _)| i)
}

/// Compute within-cluster sum of squares (inertia)
pub fn compute_inertia(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    centroids: &Array2<f64>,
) -> f64 {
    features
        .outer_iter()
        .zip(labels.iter())
        .map(|(point, &cluster)| L2Dist.rdistance(point, centroids.row(cluster)))
        .sum()
}

fn check_fit_input(features: &Array2<f64>, n_clusters: usize) -> crate::Result<()> {
    if n_clusters == 0 {
        return Err(DataError::InvalidClusterCount);
    }
    if features.nrows() == 0 {
        return Err(DataError::EmptyDataset);
    }
    if features.nrows() < n_clusters {
        return Err(DataError::TooFewRecords {
            records: features.nrows(),
            clusters: n_clusters,
        });
    }
    Ok(())
}

/// Nearest centroid and its squared distance. Strict comparison keeps the
/// lowest index on ties.
fn nearest_centroid(point: ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut closest = (0, f64::INFINITY);
    for (c, centroid) in centroids.outer_iter().enumerate() {
        let d = L2Dist.rdistance(point, centroid);
        if d < closest.1 {
            closest = (c, d);
        }
    }
    closest
}

fn assign(features: &Array2<f64>, centroids: &Array2<f64>) -> Array1<usize> {
    features
        .outer_iter()
        .map(|point| nearest_centroid(point, centroids).0)
        .collect()
}

/// k-means++ seeding: each new centroid is a data point drawn with
/// probability proportional to its squared distance to the closest chosen one.
fn kmeans_plusplus<R: Rng>(features: &Array2<f64>, k: usize, rng: &mut R) -> Array2<f64> {
    let n = features.nrows();
    let mut centroids = Array2::zeros((k, features.ncols()));

    let first = rng.gen_range(0..n);
    centroids.row_mut(0).assign(&features.row(first));
    let mut closest: Vec<f64> = features
        .outer_iter()
        .map(|row| L2Dist.rdistance(row, features.row(first)))
        .collect();

    for c in 1..k {
        let total: f64 = closest.iter().sum();
        let chosen = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            closest
                .iter()
                .position(|&d| {
                    cumulative += d;
                    cumulative > target
                })
                .or_else(|| closest.iter().rposition(|&d| d > 0.0))
                .unwrap_or(0)
        } else {
            // every point already coincides with a centroid
            rng.gen_range(0..n)
        };

        centroids.row_mut(c).assign(&features.row(chosen));
        for (d, row) in closest.iter_mut().zip(features.outer_iter()) {
            *d = d.min(L2Dist.rdistance(row, features.row(chosen)));
        }
    }

    centroids
}

/// Move points into empty clusters.
///
/// Each empty cluster takes the point farthest from its current centroid,
/// picked only from clusters that keep at least one member. If every
/// candidate sits exactly on its centroid the empty cluster is left alone
/// and its centroid does not move.
fn relocate_empty_clusters(
    features: &Array2<f64>,
    centroids: &Array2<f64>,
    labels: &mut Array1<usize>,
) {
    let k = centroids.nrows();
    let mut counts = vec![0usize; k];
    for &label in labels.iter() {
        counts[label] += 1;
    }

    for empty in 0..k {
        if counts[empty] > 0 {
            continue;
        }
        let mut candidate: Option<(usize, f64)> = None;
        for (i, row) in features.outer_iter().enumerate() {
            let owner = labels[i];
            if counts[owner] < 2 {
                continue;
            }
            let d = L2Dist.rdistance(row, centroids.row(owner));
            if d > 0.0 && candidate.map_or(true, |(_, best)| d > best) {
                candidate = Some((i, d));
            }
        }
        if let Some((i, d)) = candidate {
            debug!("re-seeding empty cluster {} at row {} (distance {:.4})", empty, i, d);
            counts[labels[i]] -= 1;
            labels[i] = empty;
            counts[empty] = 1;
        }
    }
}

/// Centroids as the mean of their members; an empty cluster keeps its
/// previous position.
fn recompute_centroids(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    previous: &Array2<f64>,
) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(previous.raw_dim());
    let mut counts = vec![0usize; previous.nrows()];
    for (row, &label) in features.outer_iter().zip(labels.iter()) {
        let mut sum = sums.row_mut(label);
        sum += &row;
        counts[label] += 1;
    }

    for (c, mut centroid) in sums.axis_iter_mut(Axis(0)).enumerate() {
        if counts[c] == 0 {
            centroid.assign(&previous.row(c));
        } else {
            centroid /= counts[c] as f64;
        }
    }
    sums
}

fn mean_variance(features: &Array2<f64>) -> f64 {
    features.var_axis(Axis(0), 0.0).mean().unwrap_or(0.0)
}

/// One Lloyd run from `centroids` until labels stop changing, the total
/// squared centroid shift drops to the threshold, or `max_iters` is reached.
fn lloyd(features: &Array2<f64>, mut centroids: Array2<f64>, params: &KMeansParams) -> KMeansModel {
    let threshold = params.tolerance * mean_variance(features);
    let mut labels: Option<Array1<usize>> = None;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < params.max_iters {
        iterations += 1;
        let mut assigned = assign(features, &centroids);
        if labels.as_ref() == Some(&assigned) {
            converged = true;
            break;
        }

        relocate_empty_clusters(features, &centroids, &mut assigned);
        let updated = recompute_centroids(features, &assigned, &centroids);
        let shift: f64 = updated
            .outer_iter()
            .zip(centroids.outer_iter())
            .map(|(new, old)| L2Dist.rdistance(new, old))
            .sum();
        centroids = updated;
        labels = Some(assigned);

        if shift <= threshold {
            converged = true;
            break;
        }
    }

    let labels = assign(features, &centroids);
    let inertia = compute_inertia(features, &labels, &centroids);

    KMeansModel {
        n_clusters: centroids.nrows(),
        labels,
        centroids,
        inertia,
        iterations,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.1, 0.1],
            [0.2, 0.0],
            [10.0, 10.0],
            [10.1, 10.1],
            [10.2, 10.0],
        ]
    }

    fn create_test_features() -> Array2<f64> {
        // 4 samples, 4 normalized features
        array![
            [-1.0, -1.0, -1.0, -1.0],
            [1.0, 1.0, 1.0, 1.0],
            [-0.5, 0.5, -0.5, 0.5],
            [0.5, -0.5, 0.5, -0.5],
        ]
    }

    #[test]
    fn test_fit_kmeans() {
        let features = create_test_features();
        let model = fit_kmeans(&features, &KMeansParams::new(3)).unwrap();

        assert_eq!(model.n_clusters, 3);
        assert_eq!(model.labels.len(), 4);
        assert_eq!(model.centroids.shape(), &[3, 4]);
        assert!(model.inertia >= 0.0);
    }

    #[test]
    fn test_separates_blobs() {
        let model = fit_kmeans(&two_blobs(), &KMeansParams::new(2)).unwrap();
        assert!(model.converged);
        assert_eq!(model.labels[0], model.labels[1]);
        assert_eq!(model.labels[0], model.labels[2]);
        assert_eq!(model.labels[3], model.labels[4]);
        assert_ne!(model.labels[0], model.labels[3]);
        assert!(model.inertia < 0.1);
    }

    #[test]
    fn test_labels_match_nearest_centroid() {
        let features = two_blobs();
        let model = fit_kmeans(&features, &KMeansParams::new(3)).unwrap();
        for (i, row) in features.outer_iter().enumerate() {
            assert_eq!(model.predict(row), model.labels[i]);
        }
    }

    #[test]
    fn test_same_seed_same_model() {
        let features = create_test_features();
        let a = fit_kmeans(&features, &KMeansParams::new(3)).unwrap();
        let b = fit_kmeans(&features, &KMeansParams::new(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cluster_sizes() {
        let model = fit_kmeans(&create_test_features(), &KMeansParams::new(3)).unwrap();

        let sizes = model.cluster_sizes();
        assert_eq!(sizes.len(), 3);
        assert_eq!(sizes.iter().sum::<usize>(), 4); // Total should equal number of samples
        assert!(sizes.iter().all(|&s| s > 0));
    }

    #[test]
    fn test_too_few_records() {
        let features = array![[0.0, 1.0], [1.0, 0.0]];
        assert!(matches!(
            fit_kmeans(&features, &KMeansParams::new(3)),
            Err(DataError::TooFewRecords {
                records: 2,
                clusters: 3
            })
        ));
    }

    #[test]
    fn test_zero_clusters_rejected() {
        assert!(matches!(
            fit_kmeans(&create_test_features(), &KMeansParams::new(0)),
            Err(DataError::InvalidClusterCount)
        ));
    }

    #[test]
    fn test_tie_goes_to_lowest_centroid() {
        let centroids = array![[-1.0, 0.0], [1.0, 0.0]];
        let (c, d) = nearest_centroid(array![0.0, 0.0].view(), &centroids);
        assert_eq!(c, 0);
        assert_eq!(d, 1.0);
    }

    #[test]
    fn test_empty_cluster_takes_farthest_point() {
        let features = array![[0.0], [1.0], [5.0]];
        let centroids = array![[1.0], [100.0]];
        let mut labels = array![0, 0, 0];
        relocate_empty_clusters(&features, &centroids, &mut labels);
        assert_eq!(labels, array![0, 0, 1]);
    }

    #[test]
    fn test_empty_cluster_stays_when_points_coincide() {
        let features = array![[2.0], [2.0], [2.0]];
        let centroids = array![[2.0], [2.0]];
        let mut labels = array![0, 0, 0];
        relocate_empty_clusters(&features, &centroids, &mut labels);
        assert_eq!(labels, array![0, 0, 0]);

        let updated = recompute_centroids(&features, &labels, &centroids);
        assert_eq!(updated, centroids);
    }

    #[test]
    fn test_iteration_cap_reports_not_converged() {
        let params = KMeansParams {
            max_iters: 1,
            n_init: 1,
            ..KMeansParams::new(2)
        };
        let features = array![[0.0], [1.0], [2.0], [3.0], [10.0], [11.0]];
        let init = array![[0.0], [1.0]];
        let model = refine_kmeans(&features, init, &params).unwrap();
        assert_eq!(model.iterations, 1);
        assert!(!model.converged);
    }

    #[test]
    fn test_refine_never_increases_inertia() {
        let features = two_blobs();
        let params = KMeansParams::new(2);
        let init = array![[0.0, 0.0], [0.1, 0.1]];
        let start = assign(&features, &init);
        let before = compute_inertia(&features, &start, &init);
        let model = refine_kmeans(&features, init, &params).unwrap();
        assert!(model.inertia <= before);
    }

    #[test]
    fn test_farthest_point() {
        let features = array![[0.0], [1.0], [9.0]];
        let model = KMeansModel {
            n_clusters: 1,
            labels: array![0, 0, 0],
            centroids: array![[2.0]],
            inertia: 0.0,
            iterations: 0,
            converged: true,
        };
        assert_eq!(farthest_point(&features, &model), Some(2));
    }
}
