//! Machine Learning Module
//!
//! Regression models for the monthly demand target:
//! - Random forest (smartcore `RandomForestRegressor`)
//! - Gradient-boosted regression trees built on smartcore decision trees
//!
//! # Architecture
//! - `training`: chronological dataset split and model trainer
//! - `scaler`: standardization fitted on training rows only
//! - `inference`: reload persisted artifacts and predict for new months

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::forecast::ForecastMetrics;

pub mod boosting;
pub mod inference;
pub mod models;
pub mod scaler;
pub mod smartcore;
pub mod training;

pub use boosting::GradientBoostedTrees;
pub use inference::ForecastArtifacts;
pub use models::{decode_model, MLModel};
pub use scaler::StandardScaler;
pub use smartcore::RandomForestModel;
pub use training::{ModelTrainer, TrainingDataset};

/// ML Model Type
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[strum(to_string = "Random Forest")]
    RandomForest,
    #[strum(to_string = "Gradient Boosting")]
    GradientBoosting,
}

impl ModelKind {
    /// Short label used in chart legends.
    pub fn short_name(&self) -> &'static str {
        match self {
            ModelKind::RandomForest => "RF",
            ModelKind::GradientBoosting => "GBT",
        }
    }
}

/// ML Model Metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub kind: ModelKind,
    pub version: String,
    pub trained_at: chrono::DateTime<chrono::Utc>,
    pub training_samples: usize,
    /// In-sample fit quality on the (scaled) training rows
    pub training_metrics: ForecastMetrics,
    pub feature_names: Vec<String>,
}

impl ModelMetadata {
    pub fn new(
        kind: ModelKind,
        training_samples: usize,
        training_metrics: ForecastMetrics,
        feature_names: Vec<String>,
    ) -> Self {
        Self {
            model_id: format!("{}_{}", kind.short_name().to_lowercase(), uuid::Uuid::new_v4()),
            kind,
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Utc::now(),
            training_samples,
            training_metrics,
            feature_names,
        }
    }
}

/// Feature Vector for ML models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub features: Vec<f64>,
    pub feature_names: Vec<String>,
}

impl FeatureVector {
    pub fn new(features: Vec<f64>, feature_names: Vec<String>) -> Result<Self> {
        if features.len() != feature_names.len() {
            anyhow::bail!(
                "Feature count mismatch: {} features, {} names",
                features.len(),
                feature_names.len()
            );
        }
        Ok(Self {
            features,
            feature_names,
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Standardize features using z-score normalization
    pub fn standardize(&self, means: &[f64], scales: &[f64]) -> Result<Self> {
        if means.len() != self.features.len() || scales.len() != self.features.len() {
            anyhow::bail!("Standardization parameter count mismatch");
        }

        let standardized = self
            .features
            .iter()
            .zip(means.iter().zip(scales.iter()))
            .map(|(f, (mean, scale))| (f - mean) / scale)
            .collect();

        Ok(Self {
            features: standardized,
            feature_names: self.feature_names.clone(),
        })
    }
}

/// ML Prediction Result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub model: ModelKind,
    pub value: f64,
}
