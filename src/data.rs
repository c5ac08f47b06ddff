//! Survey record extraction and feature standardization

use std::path::Path;

use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::DataError;
use crate::ingest;

/// Identifier column required in every dataset
pub const ID_COLUMN: &str = "id";

/// Numeric survey columns used for clustering, in feature order
pub const FEATURE_COLUMNS: [&str; N_FEATURES] =
    ["Age", "Flight Distance", "Seat comfort", "Cleanliness"];

pub const N_FEATURES: usize = 4;

pub const AGE: usize = 0;
pub const FLIGHT_DISTANCE: usize = 1;
pub const SEAT_COMFORT: usize = 2;
pub const CLEANLINESS: usize = 3;

/// One passenger survey row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub age: f64,
    pub flight_distance: f64,
    pub seat_comfort: f64,
    pub cleanliness: f64,
}

impl Record {
    /// Feature vector in `FEATURE_COLUMNS` order
    pub fn features(&self) -> [f64; N_FEATURES] {
        [
            self.age,
            self.flight_distance,
            self.seat_comfort,
            self.cleanliness,
        ]
    }
}

/// Per-column standardization to zero mean and unit variance.
///
/// Statistics are population statistics (`ddof = 0`) over the whole matrix.
/// A column with zero variance keeps a scale of `1.0`, so it standardizes to
/// all zeros instead of dividing by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Array1<f64>,
    scales: Array1<f64>,
    degenerate: Vec<usize>,
}

impl StandardScaler {
    /// Fit column means and standard deviations
    pub fn fit(x: &Array2<f64>) -> crate::Result<Self> {
        if x.nrows() == 0 {
            return Err(DataError::EmptyDataset);
        }

        let means = x.mean_axis(Axis(0)).ok_or(DataError::EmptyDataset)?;
        let stds = x.std_axis(Axis(0), 0.0);

        let mut degenerate = Vec::new();
        let scales = stds
            .iter()
            .zip(means.iter())
            .enumerate()
            .map(|(j, (&std, &mean))| {
                if std <= f64::EPSILON * mean.abs().max(1.0) {
                    degenerate.push(j);
                    1.0
                } else {
                    std
                }
            })
            .collect::<Array1<f64>>();

        Ok(Self {
            means,
            scales,
            degenerate,
        })
    }

    pub fn means(&self) -> &Array1<f64> {
        &self.means
    }

    pub fn scales(&self) -> &Array1<f64> {
        &self.scales
    }

    /// Indices of columns that had zero variance at fit time
    pub fn degenerate_columns(&self) -> &[usize] {
        &self.degenerate
    }

    pub fn transform(&self, x: &Array2<f64>) -> crate::Result<Array2<f64>> {
        self.check_width(x)?;
        Ok((x - &self.means) / &self.scales)
    }

    /// Map standardized points back to original feature space
    pub fn inverse_transform(&self, z: &Array2<f64>) -> crate::Result<Array2<f64>> {
        self.check_width(z)?;
        Ok(z * &self.scales + &self.means)
    }

    fn check_width(&self, x: &Array2<f64>) -> crate::Result<()> {
        if x.ncols() != self.means.len() {
            return Err(DataError::FeatureCount {
                expected: self.means.len(),
                found: x.ncols(),
            });
        }
        Ok(())
    }
}

/// Survey data ready for clustering
#[derive(Debug, Clone)]
pub struct SurveyData {
    /// Standardized features (n_passengers, 4)
    pub features: Array2<f64>,
    /// Passenger identifiers, row-aligned with the features
    pub passenger_ids: Vec<String>,
    /// Scaler fitted on `raw_features`
    pub scaler: StandardScaler,
    /// Feature values before standardization
    pub raw_features: Array2<f64>,
}

impl SurveyData {
    /// Build from ids and a raw `(n, 4)` feature matrix
    pub fn new(passenger_ids: Vec<String>, raw_features: Array2<f64>) -> crate::Result<Self> {
        if raw_features.nrows() == 0 {
            return Err(DataError::EmptyDataset);
        }
        if raw_features.ncols() != N_FEATURES {
            return Err(DataError::FeatureCount {
                expected: N_FEATURES,
                found: raw_features.ncols(),
            });
        }
        if passenger_ids.len() != raw_features.nrows() {
            return Err(DataError::LengthMismatch {
                what: "passenger ids",
                expected: raw_features.nrows(),
                found: passenger_ids.len(),
            });
        }

        let scaler = StandardScaler::fit(&raw_features)?;
        for &j in scaler.degenerate_columns() {
            warn!(
                "column '{}' has zero variance, standardized to zeros",
                FEATURE_COLUMNS[j]
            );
        }
        let features = scaler.transform(&raw_features)?;
        debug!("standardized {} records", features.nrows());

        Ok(Self {
            features,
            passenger_ids,
            scaler,
            raw_features,
        })
    }

    pub fn from_records(records: &[Record]) -> crate::Result<Self> {
        let ids = records.iter().map(|r| r.id.clone()).collect();
        let values = records.iter().flat_map(|r| r.features()).collect::<Vec<f64>>();
        let raw = Array2::from_shape_vec((records.len(), N_FEATURES), values).map_err(|_| {
            DataError::FeatureCount {
                expected: N_FEATURES,
                found: 0,
            }
        })?;
        Self::new(ids, raw)
    }

    /// Extract and validate the required columns from a loaded table.
    ///
    /// Every missing column is reported at once; nothing is extracted unless
    /// all of them are present.
    pub fn from_dataframe(df: &DataFrame) -> crate::Result<Self> {
        let missing = std::iter::once(ID_COLUMN)
            .chain(FEATURE_COLUMNS)
            .filter(|name| df.column(name).is_err())
            .map(str::to_string)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(DataError::MissingColumns(missing));
        }
        if df.height() == 0 {
            return Err(DataError::EmptyDataset);
        }

        let ids = df
            .column(ID_COLUMN)?
            .as_materialized_series()
            .cast(&DataType::String)?;
        let passenger_ids = ids
            .str()?
            .into_iter()
            .enumerate()
            .map(|(row, id)| {
                id.map(str::to_string).ok_or_else(|| DataError::MissingValue {
                    column: ID_COLUMN.to_string(),
                    row,
                })
            })
            .collect::<crate::Result<Vec<_>>>()?;

        let mut raw = Array2::zeros((df.height(), N_FEATURES));
        for (j, name) in FEATURE_COLUMNS.iter().enumerate() {
            let column = df
                .column(name)?
                .as_materialized_series()
                .cast(&DataType::Float64)?;
            for (row, value) in column.f64()?.into_iter().enumerate() {
                raw[[row, j]] = value.ok_or_else(|| DataError::MissingValue {
                    column: name.to_string(),
                    row,
                })?;
            }
        }

        Self::new(passenger_ids, raw)
    }

    pub fn len(&self) -> usize {
        self.passenger_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passenger_ids.is_empty()
    }

    /// Raw values of one feature, for histogramming
    pub fn raw_column(&self, feature: usize) -> ArrayView1<'_, f64> {
        self.raw_features.column(feature)
    }
}

/// Load a survey CSV and standardize its features
pub fn load_and_process_data(path: &Path) -> crate::Result<SurveyData> {
    let df = ingest::load_csv(path)?;
    let data = SurveyData::from_dataframe(&df)?;
    info!("loaded {} passengers from {}", data.len(), path.display());
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample_frame() -> DataFrame {
        df!(
            "id" => [1i64, 2, 3, 4],
            "Gender" => ["Male", "Female", "Female", "Male"],
            "Age" => [25i64, 40, 61, 33],
            "Flight Distance" => [460i64, 235, 1142, 562],
            "Seat comfort" => [5i64, 1, 5, 2],
            "Cleanliness" => [5i64, 1, 5, 2],
        )
        .unwrap()
    }

    #[test]
    fn test_from_dataframe() {
        let data = SurveyData::from_dataframe(&sample_frame()).unwrap();
        assert_eq!(data.features.shape(), &[4, 4]);
        assert_eq!(data.passenger_ids, vec!["1", "2", "3", "4"]);
        assert_eq!(data.raw_features[[2, FLIGHT_DISTANCE]], 1142.0);
    }

    #[test]
    fn test_missing_cleanliness_column() {
        let df = sample_frame().drop("Cleanliness").unwrap();
        match SurveyData::from_dataframe(&df) {
            Err(DataError::MissingColumns(cols)) => assert_eq!(cols, vec!["Cleanliness"]),
            other => panic!("expected missing column error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_columns_are_all_reported() {
        let df = sample_frame().drop("id").unwrap().drop("Age").unwrap();
        match SurveyData::from_dataframe(&df) {
            Err(DataError::MissingColumns(cols)) => assert_eq!(cols, vec!["id", "Age"]),
            other => panic!("expected missing column error, got {:?}", other),
        }
    }

    #[test]
    fn test_null_value_is_rejected() {
        let df = df!(
            "id" => [1i64, 2],
            "Age" => [Some(25.0), None],
            "Flight Distance" => [100.0, 200.0],
            "Seat comfort" => [1.0, 2.0],
            "Cleanliness" => [3.0, 4.0],
        )
        .unwrap();
        match SurveyData::from_dataframe(&df) {
            Err(DataError::MissingValue { column, row }) => {
                assert_eq!(column, "Age");
                assert_eq!(row, 1);
            }
            other => panic!("expected missing value error, got {:?}", other),
        }
    }

    #[test]
    fn test_scaler_standardizes_columns() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let z = scaler.transform(&x).unwrap();

        for column in z.columns() {
            assert!(column.mean().unwrap().abs() < 1e-12);
            assert!((column.std(0.0) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_scaler_inverse_round_trip() {
        let x = array![[25.0, 460.0, 5.0, 3.0], [61.0, 1142.0, 1.0, 4.0], [33.0, 562.0, 2.0, 1.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let back = scaler
            .inverse_transform(&scaler.transform(&x).unwrap())
            .unwrap();
        for (a, b) in x.iter().zip(back.iter()) {
            assert!((a - b).abs() <= 1e-9 * a.abs().max(1.0));
        }
    }

    #[test]
    fn test_zero_variance_column_becomes_zeros() {
        let x = array![[1.0, 3.0], [2.0, 3.0], [4.0, 3.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        assert_eq!(scaler.degenerate_columns(), &[1]);

        let z = scaler.transform(&x).unwrap();
        assert!(z.column(1).iter().all(|&v| v == 0.0));
        let back = scaler.inverse_transform(&z).unwrap();
        assert!(back.column(1).iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_transform_rejects_wrong_width() {
        let scaler = StandardScaler::fit(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        assert!(scaler.transform(&array![[1.0, 2.0, 3.0]]).is_err());
    }

    #[test]
    fn test_from_records_keeps_order() {
        let records = vec![
            Record {
                id: "a".into(),
                age: 20.0,
                flight_distance: 300.0,
                seat_comfort: 2.0,
                cleanliness: 3.0,
            },
            Record {
                id: "b".into(),
                age: 50.0,
                flight_distance: 3000.0,
                seat_comfort: 4.0,
                cleanliness: 5.0,
            },
        ];
        let data = SurveyData::from_records(&records).unwrap();
        assert_eq!(data.passenger_ids, vec!["a", "b"]);
        assert_eq!(data.raw_features.row(1).to_vec(), records[1].features().to_vec());
    }

    #[test]
    fn test_empty_records_rejected() {
        assert!(matches!(
            SurveyData::from_records(&[]),
            Err(DataError::EmptyDataset)
        ));
    }
}
