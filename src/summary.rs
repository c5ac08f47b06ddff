//! Per-cluster descriptive statistics

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use serde::Serialize;

use crate::data::{AGE, CLEANLINESS, FLIGHT_DISTANCE, N_FEATURES, SEAT_COMFORT};
use crate::error::DataError;

/// Mean raw feature values and passenger count of one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterProfile {
    pub cluster: usize,
    pub mean_age: f64,
    pub mean_flight_distance: f64,
    pub mean_seat_comfort: f64,
    pub mean_cleanliness: f64,
    pub passengers: usize,
}

/// One profile per cluster label present, ascending by label
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub profiles: Vec<ClusterProfile>,
}

impl ClusterSummary {
    pub fn total_passengers(&self) -> usize {
        self.profiles.iter().map(|p| p.passengers).sum()
    }

    pub fn get(&self, cluster: usize) -> Option<&ClusterProfile> {
        self.profiles.iter().find(|p| p.cluster == cluster)
    }
}

/// Arithmetic means of the raw features per cluster, plus passenger counts.
///
/// `raw_features`, `passenger_ids` and `labels` must be row-aligned; each
/// passenger id counts once towards its cluster.
pub fn summarize(
    raw_features: &Array2<f64>,
    passenger_ids: &[String],
    labels: &Array1<usize>,
) -> crate::Result<ClusterSummary> {
    if raw_features.ncols() != N_FEATURES {
        return Err(DataError::FeatureCount {
            expected: N_FEATURES,
            found: raw_features.ncols(),
        });
    }
    if labels.len() != raw_features.nrows() {
        return Err(DataError::LengthMismatch {
            what: "cluster labels",
            expected: raw_features.nrows(),
            found: labels.len(),
        });
    }
    if passenger_ids.len() != raw_features.nrows() {
        return Err(DataError::LengthMismatch {
            what: "passenger ids",
            expected: raw_features.nrows(),
            found: passenger_ids.len(),
        });
    }

    let mut groups: BTreeMap<usize, (Array1<f64>, usize)> = BTreeMap::new();
    for (row, &label) in raw_features.outer_iter().zip(labels.iter()) {
        let (sum, count) = groups
            .entry(label)
            .or_insert_with(|| (Array1::zeros(N_FEATURES), 0));
        *sum += &row;
        *count += 1;
    }

    let profiles = groups
        .into_iter()
        .map(|(cluster, (sum, count))| {
            let mean = sum / count as f64;
            ClusterProfile {
                cluster,
                mean_age: mean[AGE],
                mean_flight_distance: mean[FLIGHT_DISTANCE],
                mean_seat_comfort: mean[SEAT_COMFORT],
                mean_cleanliness: mean[CLEANLINESS],
                passengers: count,
            }
        })
        .collect();

    Ok(ClusterSummary { profiles })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_summarize_means_and_counts() {
        let raw = array![
            [20.0, 100.0, 1.0, 2.0],
            [30.0, 300.0, 3.0, 4.0],
            [60.0, 4000.0, 5.0, 5.0],
        ];
        let labels = array![2, 2, 0];

        let summary = summarize(&raw, &ids(3), &labels).unwrap();
        assert_eq!(summary.profiles.len(), 2);

        let first = &summary.profiles[0];
        assert_eq!(first.cluster, 0);
        assert_eq!(first.passengers, 1);
        assert_eq!(first.mean_flight_distance, 4000.0);

        let second = &summary.profiles[1];
        assert_eq!(second.cluster, 2);
        assert_eq!(second.passengers, 2);
        assert_eq!(second.mean_age, 25.0);
        assert_eq!(second.mean_flight_distance, 200.0);
        assert_eq!(second.mean_seat_comfort, 2.0);
        assert_eq!(second.mean_cleanliness, 3.0);

        assert_eq!(summary.total_passengers(), 3);
        assert!(summary.get(1).is_none());
    }

    #[test]
    fn test_summarize_rejects_misaligned_labels() {
        let raw = array![[20.0, 100.0, 1.0, 2.0], [30.0, 300.0, 3.0, 4.0]];
        assert!(matches!(
            summarize(&raw, &ids(2), &array![0]),
            Err(DataError::LengthMismatch { .. })
        ));
        assert!(matches!(
            summarize(&raw, &ids(1), &array![0, 1]),
            Err(DataError::LengthMismatch { .. })
        ));
    }
}
