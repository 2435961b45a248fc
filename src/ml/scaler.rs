//! Feature standardization
//!
//! Means and population standard deviations come from the training rows
//! only; test rows and serving requests reuse the stored parameters.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::FeatureVector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    feature_names: Vec<String>,
    mean: Vec<f64>,
    /// Per-feature divisor; 1.0 for zero-variance features.
    scale: Vec<f64>,
    n_samples_seen: usize,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>], feature_names: Vec<String>) -> Result<Self> {
        if rows.is_empty() {
            anyhow::bail!("Cannot fit scaler on zero rows");
        }
        let n_features = feature_names.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != n_features) {
            anyhow::bail!(
                "Feature count mismatch: expected {}, got {}",
                n_features,
                bad.len()
            );
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; n_features];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }

        let mut var = vec![0.0; n_features];
        for row in rows {
            for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *acc += (v - m).powi(2) / n;
            }
        }

        let scale = var
            .iter()
            .zip(&mean)
            .map(|(v, m)| {
                let std = v.sqrt();
                if std <= 10.0 * f64::EPSILON * m.abs().max(1.0) {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Ok(Self {
            feature_names,
            mean,
            scale,
            n_samples_seen: rows.len(),
        })
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter()
            .map(|row| {
                if row.len() != self.mean.len() {
                    anyhow::bail!(
                        "Feature count mismatch: expected {}, got {}",
                        self.mean.len(),
                        row.len()
                    );
                }
                Ok(row
                    .iter()
                    .zip(self.mean.iter().zip(&self.scale))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect())
            })
            .collect()
    }

    /// Standardize a named feature vector; names must match the fitted schema.
    pub fn transform_vector(&self, features: &FeatureVector) -> Result<FeatureVector> {
        if features.feature_names != self.feature_names {
            anyhow::bail!(
                "Feature schema mismatch: expected {:?}, got {:?}",
                self.feature_names,
                features.feature_names
            );
        }
        features.standardize(&self.mean, &self.scale)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn n_samples_seen(&self) -> usize {
        self.n_samples_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    fn column_stats(rows: &[Vec<f64>], col: usize) -> (f64, f64) {
        let n = rows.len() as f64;
        let mean = rows.iter().map(|r| r[col]).sum::<f64>() / n;
        let var = rows.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / n;
        (mean, var.sqrt())
    }

    #[test]
    fn test_fit_population_statistics() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 10.0]];
        let scaler = StandardScaler::fit(&rows, names(2)).unwrap();
        assert_eq!(scaler.mean(), &[2.0, 10.0]);
        // Population std of [1, 3] is 1; constant column keeps unit scale.
        assert_eq!(scaler.scale(), &[1.0, 1.0]);
        assert_eq!(scaler.n_samples_seen(), 2);

        let out = scaler.transform(&rows).unwrap();
        assert_eq!(out, vec![vec![-1.0, 0.0], vec![1.0, 0.0]]);
    }

    #[test]
    fn test_test_rows_use_training_parameters() {
        let train = vec![vec![0.0], vec![2.0], vec![4.0]];
        let test = vec![vec![10.0], vec![12.0]];
        let scaler = StandardScaler::fit(&train, names(1)).unwrap();

        let std = (8.0f64 / 3.0).sqrt();
        let out = scaler.transform(&test).unwrap();
        assert!((out[0][0] - (10.0 - 2.0) / std).abs() < 1e-12);
        assert!((out[1][0] - (12.0 - 2.0) / std).abs() < 1e-12);

        // Fitting on the training rows alone is unaffected by the test rows.
        assert!((scaler.mean()[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_transform_rejects_wrong_width() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0], vec![2.0, 3.0]], names(2)).unwrap();
        assert!(scaler.transform(&[vec![1.0]]).is_err());
    }

    #[test]
    fn test_transform_vector_checks_schema() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0], vec![3.0, 6.0]], names(2)).unwrap();

        let ok = FeatureVector::new(vec![3.0, 2.0], names(2)).unwrap();
        assert_eq!(scaler.transform_vector(&ok).unwrap().features, vec![1.0, -1.0]);

        let reordered = FeatureVector::new(vec![2.0, 3.0], vec!["f1".into(), "f0".into()]).unwrap();
        assert!(scaler.transform_vector(&reordered).is_err());
    }

    #[test]
    fn test_fit_rejects_empty() {
        assert!(StandardScaler::fit(&[], names(1)).is_err());
    }

    proptest! {
        #[test]
        fn prop_training_rows_standardized(
            rows in prop::collection::vec(prop::collection::vec(-1000.0f64..1000.0, 3), 2..40)
        ) {
            let scaler = StandardScaler::fit(&rows, names(3)).unwrap();
            let out = scaler.transform(&rows).unwrap();
            for col in 0..3 {
                let (_, raw_std) = column_stats(&rows, col);
                if raw_std > 1e-3 {
                    let (mean, std) = column_stats(&out, col);
                    prop_assert!(mean.abs() < 1e-8, "mean {} for column {}", mean, col);
                    prop_assert!((std - 1.0).abs() < 1e-6, "std {} for column {}", std, col);
                }
            }
        }
    }
}
