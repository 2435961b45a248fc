//! Gradient-boosted regression trees
//!
//! Squared-error boosting: start from the mean target, then fit each round's
//! smartcore regression tree to the current residuals and add its output
//! scaled by the learning rate. No row or column subsampling is done, so a
//! fit is fully determined by its inputs.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use tracing::{debug, info};

use super::models::MLModel;
use super::smartcore::{check_training_shape, to_dense_matrix};
use super::{ModelKind, ModelMetadata};
use crate::config::BoostingConfig;
use crate::forecast::ForecastMetrics;

type RegressionTree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Boosted tree ensemble with its metadata and hyperparameters
#[derive(Debug, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    pub metadata: ModelMetadata,
    pub params: BoostingConfig,
    base_score: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    pub fn tree_parameters(config: &BoostingConfig) -> DecisionTreeRegressorParameters {
        DecisionTreeRegressorParameters::default()
            .with_max_depth(config.max_depth)
            .with_min_samples_leaf(config.min_samples_leaf)
            .with_min_samples_split(config.min_samples_split)
    }

    pub fn train(
        x: &[Vec<f64>],
        y: &[f64],
        config: &BoostingConfig,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        check_training_shape(x, y)?;
        if x[0].len() != feature_names.len() {
            anyhow::bail!(
                "Feature name count mismatch: {} columns, {} names",
                x[0].len(),
                feature_names.len()
            );
        }
        let x_matrix = to_dense_matrix(x)?;
        let tree_params = Self::tree_parameters(config);

        let base_score = y.iter().sum::<f64>() / y.len() as f64;
        let mut fitted = vec![base_score; y.len()];
        let mut trees = Vec::with_capacity(config.n_estimators);

        for round in 0..config.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(t, f)| t - f).collect();

            let tree = RegressionTree::fit(&x_matrix, &residuals, tree_params.clone())
                .map_err(|e| anyhow::anyhow!("Boosting round {} failed: {:?}", round, e))?;
            let update = tree
                .predict(&x_matrix)
                .map_err(|e| anyhow::anyhow!("Boosting round {} prediction failed: {:?}", round, e))?;

            for (f, u) in fitted.iter_mut().zip(update) {
                *f += config.learning_rate * u;
            }
            trees.push(tree);

            if round % 50 == 0 {
                let mse = y.iter().zip(&fitted).map(|(t, f)| (t - f).powi(2)).sum::<f64>() / y.len() as f64;
                debug!(round, mse, "boosting progress");
            }
        }

        let metrics = ForecastMetrics::calculate(y, &fitted)?;
        info!(samples = x.len(), rounds = trees.len(), %metrics, "boosted trees trained");

        Ok(Self {
            metadata: ModelMetadata::new(ModelKind::GradientBoosting, x.len(), metrics, feature_names),
            params: config.clone(),
            base_score,
            trees,
        })
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| anyhow::anyhow!("Failed to deserialize model: {}", e))
    }
}

impl MLModel for GradientBoostedTrees {
    fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let x = to_dense_matrix(rows)?;
        let mut out = vec![self.base_score; rows.len()];
        for tree in &self.trees {
            let update = tree
                .predict(&x)
                .map_err(|e| anyhow::anyhow!("Prediction failed: {:?}", e))?;
            for (o, u) in out.iter_mut().zip(update) {
                *o += self.params.learning_rate * u;
            }
        }
        Ok(out)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| anyhow::anyhow!("Failed to serialize model: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..24).map(|i| vec![i as f64, (i % 12) as f64]).collect();
        let y = x.iter().map(|r| 0.5 * r[0] + 10.0 + (r[1] - 6.0).abs()).collect();
        (x, y)
    }

    fn names() -> Vec<String> {
        vec!["t".to_string(), "m".to_string()]
    }

    #[test]
    fn test_single_round_moves_towards_target() {
        let (x, y) = data();
        let config = BoostingConfig {
            n_estimators: 1,
            ..BoostingConfig::default()
        };
        let model = GradientBoostedTrees::train(&x, &y, &config, names()).unwrap();
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        assert!((model.base_score() - mean).abs() < 1e-12);
        assert_eq!(model.n_trees(), 1);

        let pred = model.predict_rows(&x).unwrap();
        let base_sse: f64 = y.iter().map(|t| (t - mean).powi(2)).sum();
        let sse: f64 = y.iter().zip(&pred).map(|(t, p)| (t - p).powi(2)).sum();
        assert!(sse < base_sse);
    }

    #[test]
    fn test_fits_training_data_closely() {
        let (x, y) = data();
        let model = GradientBoostedTrees::train(&x, &y, &BoostingConfig::default(), names()).unwrap();
        assert_eq!(model.n_trees(), 200);
        assert!(model.metadata.training_metrics.r2 > 0.99);
        assert_eq!(model.kind(), ModelKind::GradientBoosting);
    }

    #[test]
    fn test_training_is_deterministic() {
        let (x, y) = data();
        let config = BoostingConfig {
            n_estimators: 30,
            ..BoostingConfig::default()
        };
        let a = GradientBoostedTrees::train(&x, &y, &config, names()).unwrap();
        let b = GradientBoostedTrees::train(&x, &y, &config, names()).unwrap();
        assert_eq!(a.predict_rows(&x).unwrap(), b.predict_rows(&x).unwrap());
    }

    #[test]
    fn test_bytes_round_trip_preserves_predictions() {
        let (x, y) = data();
        let config = BoostingConfig {
            n_estimators: 10,
            ..BoostingConfig::default()
        };
        let model = GradientBoostedTrees::train(&x, &y, &config, names()).unwrap();
        let restored = GradientBoostedTrees::from_bytes(&model.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.predict_rows(&x).unwrap(), model.predict_rows(&x).unwrap());
    }

    #[test]
    fn test_rejects_empty_dataset() {
        assert!(GradientBoostedTrees::train(&[], &[], &BoostingConfig::default(), names()).is_err());
    }
}
