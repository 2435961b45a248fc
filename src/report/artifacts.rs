//! Persisted run artifacts: bincode blobs, the feature-name list and the
//! JSON run summary.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::PredictionRow;
use crate::error::{PipelineError, PipelineResult};
use crate::forecast::ForecastMetrics;
use crate::ml::ModelKind;

/// Create the parent directory of `path` if it does not exist yet.
pub fn ensure_parent(path: &Path) -> PipelineResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))
        }
        _ => Ok(()),
    }
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> PipelineResult<()> {
    ensure_parent(path)?;
    fs::write(path, bytes).map_err(|e| PipelineError::io(path, e))?;
    debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
    Ok(())
}

pub fn read_bytes(path: &Path) -> PipelineResult<Vec<u8>> {
    fs::read(path).map_err(|e| PipelineError::io(path, e))
}

pub fn write_bincode<T: Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    let bytes = bincode::serialize(value)?;
    write_bytes(path, &bytes)
}

pub fn read_bincode<T: DeserializeOwned>(path: &Path) -> PipelineResult<T> {
    let bytes = read_bytes(path)?;
    Ok(bincode::deserialize(&bytes)?)
}

/// One feature name per line, in training column order.
pub fn write_feature_names(path: &Path, names: &[String]) -> PipelineResult<()> {
    let mut contents = names.join("\n");
    contents.push('\n');
    write_bytes(path, contents.as_bytes())
}

pub fn read_feature_names(path: &Path) -> PipelineResult<Vec<String>> {
    let contents = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    Ok(contents
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Per-model section of the run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub kind: ModelKind,
    pub model_id: String,
    pub test_metrics: ForecastMetrics,
    pub model_path: PathBuf,
    pub table_path: PathBuf,
    pub chart_path: PathBuf,
    /// False when the chart was drawn without text for lack of a font.
    pub chart_labeled: bool,
    pub predictions: Vec<PredictionRow>,
}

/// What a pipeline run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub version: String,
    pub input_path: PathBuf,
    pub target_column: String,
    pub total_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    pub feature_names: Vec<String>,
    pub scaler_path: PathBuf,
    pub feature_names_path: PathBuf,
    pub models: Vec<ModelSummary>,
}

impl RunSummary {
    pub fn model(&self, kind: ModelKind) -> Option<&ModelSummary> {
        self.models.iter().find(|m| m.kind == kind)
    }
}

pub fn write_summary(path: &Path, summary: &RunSummary) -> PipelineResult<()> {
    let json = serde_json::to_vec_pretty(summary)?;
    write_bytes(path, &json)
}

pub fn read_summary(path: &Path) -> PipelineResult<RunSummary> {
    let bytes = read_bytes(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
