//! SmartCore model glue
//!
//! Dense matrix conversion shared by both regressors, and the random forest
//! wrapper persisted for the serving process.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::{debug, info};

use super::models::MLModel;
use super::{ModelKind, ModelMetadata};
use crate::config::ForestConfig;
use crate::forecast::ForecastMetrics;

pub(crate) type ForestRegressor = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Convert row-major feature rows into a smartcore `DenseMatrix`.
pub(crate) fn to_dense_matrix(rows: &[Vec<f64>]) -> Result<DenseMatrix<f64>> {
    let n_samples = rows.len();
    if n_samples == 0 {
        anyhow::bail!("Cannot build a matrix from zero rows");
    }
    let n_features = rows[0].len();
    if n_features == 0 {
        anyhow::bail!("Cannot build a matrix with zero features");
    }

    let mut flat = Vec::with_capacity(n_samples * n_features);
    for row in rows {
        if row.len() != n_features {
            anyhow::bail!("All feature vectors must have the same length");
        }
        flat.extend_from_slice(row);
    }
    Ok(DenseMatrix::new(n_samples, n_features, flat, false))
}

/// Check the shape of a training set before handing it to smartcore.
pub(crate) fn check_training_shape(x: &[Vec<f64>], y: &[f64]) -> Result<()> {
    if x.is_empty() || y.is_empty() {
        anyhow::bail!("Cannot train on empty dataset");
    }
    if x.len() != y.len() {
        anyhow::bail!(
            "Feature and target count mismatch: {} features, {} targets",
            x.len(),
            y.len()
        );
    }
    Ok(())
}

/// Fitted random forest with its metadata and hyperparameters
#[derive(Debug, Serialize, Deserialize)]
pub struct RandomForestModel {
    pub metadata: ModelMetadata,
    pub params: ForestConfig,
    model: ForestRegressor,
}

impl RandomForestModel {
    /// smartcore parameters for the configured forest.
    ///
    /// Every feature is a split candidate (`m = n_features`), the usual
    /// regression-forest setting.
    pub fn parameters(config: &ForestConfig, n_features: usize) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: config.max_depth,
            min_samples_leaf: config.min_samples_leaf,
            min_samples_split: config.min_samples_split,
            n_trees: config.n_trees,
            m: Some(n_features),
            keep_samples: false,
            seed: config.seed,
        }
    }

    /// Train a new RandomForest model
    pub fn train(
        x: &[Vec<f64>],
        y: &[f64],
        config: &ForestConfig,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        check_training_shape(x, y)?;
        let x_matrix = to_dense_matrix(x)?;
        if x[0].len() != feature_names.len() {
            anyhow::bail!(
                "Feature name count mismatch: {} columns, {} names",
                x[0].len(),
                feature_names.len()
            );
        }

        let params = Self::parameters(config, feature_names.len());
        debug!(n_trees = params.n_trees, seed = params.seed, "fitting random forest");

        let y_vec = y.to_vec();
        let model = RandomForestRegressor::fit(&x_matrix, &y_vec, params)
            .map_err(|e| anyhow::anyhow!("RandomForest training failed: {:?}", e))?;

        let fitted = model
            .predict(&x_matrix)
            .map_err(|e| anyhow::anyhow!("Prediction failed during validation: {:?}", e))?;
        let metrics = ForecastMetrics::calculate(y, &fitted)?;
        info!(samples = x.len(), %metrics, "random forest trained");

        Ok(Self {
            metadata: ModelMetadata::new(ModelKind::RandomForest, x.len(), metrics, feature_names),
            params: config.clone(),
            model,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| anyhow::anyhow!("Failed to deserialize model: {}", e))
    }
}

impl MLModel for RandomForestModel {
    fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let x = to_dense_matrix(rows)?;
        self.model
            .predict(&x)
            .map_err(|e| anyhow::anyhow!("Prediction failed: {:?}", e))
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| anyhow::anyhow!("Failed to serialize model: {}", e))
    }
}
