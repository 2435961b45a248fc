//! ML Model Inference
//!
//! Reloads the scaler, both fitted models and the feature-name list written
//! by a training run, and predicts the target for new months.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, info};

use super::models::{decode_model, MLModel};
use super::{FeatureVector, ModelKind, Prediction, StandardScaler};
use crate::config::OutputConfig;
use crate::forecast::{CalendarFeatures, CALENDAR_FEATURE_NAMES};
use crate::report::artifacts::{read_bincode, read_bytes, read_feature_names};

/// Everything a serving process needs to reproduce the pipeline's predictions
pub struct ForecastArtifacts {
    scaler: StandardScaler,
    feature_names: Vec<String>,
    forest: Box<dyn MLModel>,
    boosting: Box<dyn MLModel>,
}

impl std::fmt::Debug for ForecastArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastArtifacts")
            .field("feature_names", &self.feature_names)
            .field("forest", &self.forest.metadata().model_id)
            .field("boosting", &self.boosting.metadata().model_id)
            .finish()
    }
}

impl ForecastArtifacts {
    /// Assemble artifacts, checking that all parts agree on the feature schema.
    pub fn new(
        scaler: StandardScaler,
        feature_names: Vec<String>,
        forest: Box<dyn MLModel>,
        boosting: Box<dyn MLModel>,
    ) -> Result<Self> {
        if scaler.feature_names() != feature_names.as_slice() {
            anyhow::bail!("Scaler schema does not match the feature-name list");
        }
        for (expected, model) in [(ModelKind::RandomForest, &forest), (ModelKind::GradientBoosting, &boosting)] {
            if model.kind() != expected {
                anyhow::bail!("Expected a {} model, found {}", expected, model.kind());
            }
            if model.metadata().feature_names != feature_names {
                anyhow::bail!("{} model was trained on a different feature schema", expected);
            }
        }

        Ok(Self {
            scaler,
            feature_names,
            forest,
            boosting,
        })
    }

    pub fn load(output: &OutputConfig) -> Result<Self> {
        let scaler_path = output.scaler_path();
        let scaler: StandardScaler = read_bincode(&scaler_path)
            .with_context(|| format!("Failed to load scaler from {}", scaler_path.display()))?;

        let names_path = output.feature_names_path();
        let feature_names = read_feature_names(&names_path)
            .with_context(|| format!("Failed to load feature names from {}", names_path.display()))?;

        let forest = load_model(output, ModelKind::RandomForest)?;
        let boosting = load_model(output, ModelKind::GradientBoosting)?;

        info!(
            dir = %output.dir.display(),
            features = feature_names.len(),
            "forecast artifacts loaded"
        );
        Self::new(scaler, feature_names, forest, boosting)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn model(&self, kind: ModelKind) -> &dyn MLModel {
        match kind {
            ModelKind::RandomForest => self.forest.as_ref(),
            ModelKind::GradientBoosting => self.boosting.as_ref(),
        }
    }

    /// Predict from raw (unscaled) features named exactly as in training.
    pub fn predict(&self, kind: ModelKind, features: &FeatureVector) -> Result<Prediction> {
        let scaled = self.scaler.transform_vector(features)?;
        let prediction = self.model(kind).predict(&scaled)?;
        debug!(model = %kind, value = prediction.value, "prediction");
        Ok(prediction)
    }

    /// Predict for a month given the source predictor values. Calendar
    /// features are derived from `month`.
    pub fn predict_month(
        &self,
        kind: ModelKind,
        month: NaiveDate,
        source_values: &[f64],
    ) -> Result<Prediction> {
        let features = self.month_features(month, source_values)?;
        self.predict(kind, &features)
    }

    /// Feature vector for `month` in training order. Calendar names take the
    /// month's calendar features and `source_values` fill the other names.
    pub fn month_features(&self, month: NaiveDate, source_values: &[f64]) -> Result<FeatureVector> {
        let calendar_slot =
            |name: &str| CALENDAR_FEATURE_NAMES.iter().position(|c| *c == name);
        let source_names: Vec<&str> = self
            .feature_names
            .iter()
            .map(String::as_str)
            .filter(|name| calendar_slot(name).is_none())
            .collect();

        if source_values.len() != source_names.len() {
            anyhow::bail!(
                "Expected {} source values ({:?}), got {}",
                source_names.len(),
                source_names,
                source_values.len()
            );
        }

        let calendar = CalendarFeatures::from_date(month).to_vec();
        let mut source = source_values.iter().copied();
        let values = self
            .feature_names
            .iter()
            .map(|name| match calendar_slot(name) {
                Some(i) => Some(calendar[i]),
                None => source.next(),
            })
            .collect::<Option<Vec<f64>>>()
            .context("Source values ran out while building the feature vector")?;
        FeatureVector::new(values, self.feature_names.clone())
    }
}

fn load_model(output: &OutputConfig, kind: ModelKind) -> Result<Box<dyn MLModel>> {
    let path = output.model_path(kind);
    let bytes = read_bytes(&path)?;
    decode_model(kind, &bytes).with_context(|| format!("Failed to load model from {}", path.display()))
}
