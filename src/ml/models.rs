//! Common interface over the fitted regressors.

use anyhow::{Context, Result};

use super::{FeatureVector, GradientBoostedTrees, ModelKind, ModelMetadata, Prediction, RandomForestModel};

/// Trait for ML models
pub trait MLModel: Send + Sync {
    /// Predict one value per row of (already scaled) features
    fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;

    /// Encode the fitted model for persistence
    fn to_bytes(&self) -> Result<Vec<u8>>;

    fn kind(&self) -> ModelKind {
        self.metadata().kind
    }

    /// Predict a single value from a scaled feature vector
    fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
        let expected = self.metadata().feature_names.len();
        if features.len() != expected {
            anyhow::bail!(
                "Feature count mismatch: expected {}, got {}",
                expected,
                features.len()
            );
        }

        let values = self.predict_rows(std::slice::from_ref(&features.features))?;
        let value = values
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Model returned empty predictions"))?;

        Ok(Prediction {
            model: self.kind(),
            value,
        })
    }
}

/// Decode a model persisted with [`MLModel::to_bytes`].
pub fn decode_model(kind: ModelKind, bytes: &[u8]) -> Result<Box<dyn MLModel>> {
    let model: Box<dyn MLModel> = match kind {
        ModelKind::RandomForest => Box::new(
            RandomForestModel::from_bytes(bytes).context("Failed to decode random forest")?,
        ),
        ModelKind::GradientBoosting => Box::new(
            GradientBoostedTrees::from_bytes(bytes).context("Failed to decode boosted trees")?,
        ),
    };

    if model.kind() != kind {
        anyhow::bail!("Decoded a {} model where {} was expected", model.kind(), kind);
    }
    Ok(model)
}
