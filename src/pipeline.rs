//! End-to-end training run.
//!
//! load -> calendar features -> chronological split -> scaler (saved) ->
//! per model: fit, save, predict test tail, table, chart -> feature names ->
//! run summary.

use std::time::Instant;

use anyhow::{Context, Result};
use strum::IntoEnumIterator;
use tracing::{info, info_span};

use crate::config::Config;
use crate::data::load_monthly_table;
use crate::domain::prediction_rows;
use crate::forecast::{add_calendar_features, ForecastMetrics};
use crate::ml::{ModelKind, ModelTrainer, StandardScaler, TrainingDataset};
use crate::report::artifacts::{write_bytes, ModelSummary, RunSummary};
use crate::report::{
    render_prediction_chart, write_bincode, write_feature_names, write_prediction_table,
    write_summary, ChartSpec,
};

/// Scaled train/test partitions shared by both models. Scaling leaves the
/// month index and targets untouched.
struct PreparedData {
    train: TrainingDataset,
    test: TrainingDataset,
}

/// Run the whole pipeline described by `config` and return what it wrote.
pub fn run(config: &Config) -> Result<RunSummary> {
    let started = Instant::now();
    let output = &config.output;

    let mut table = load_monthly_table(&config.data)
        .with_context(|| format!("Failed to load {}", config.data.input_path.display()))?;
    add_calendar_features(&mut table)?;

    let dataset = TrainingDataset::from_table(&table, &config.data.target_column)?;
    let (train, test) = dataset.split(config.split.test_fraction)?;
    info!(
        total = dataset.len(),
        train = train.len(),
        test = test.len(),
        features = dataset.feature_names.len(),
        "chronological split"
    );

    let scaler = StandardScaler::fit(&train.features, train.feature_names.clone())?;
    write_bincode(&output.scaler_path(), &scaler)?;
    info!(path = %output.scaler_path().display(), "scaler saved");

    let prepared = PreparedData {
        train: train.scaled(&scaler)?,
        test: test.scaled(&scaler)?,
    };

    let trainer = ModelTrainer::new(config.forest.clone(), config.boosting.clone());
    let models = ModelKind::iter()
        .map(|kind| run_model(config, &trainer, kind, &prepared))
        .collect::<Result<Vec<_>>>()?;

    write_feature_names(&output.feature_names_path(), &dataset.feature_names)?;

    let summary = RunSummary {
        generated_at: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        input_path: config.data.input_path.clone(),
        target_column: config.data.target_column.clone(),
        total_rows: dataset.len(),
        train_rows: train.len(),
        test_rows: test.len(),
        test_start: test.index[0],
        test_end: test.index[test.len() - 1],
        feature_names: dataset.feature_names.clone(),
        scaler_path: output.scaler_path(),
        feature_names_path: output.feature_names_path(),
        models,
    };
    write_summary(&output.summary_path(), &summary)?;

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        summary = %output.summary_path().display(),
        "pipeline finished"
    );
    Ok(summary)
}

fn run_model(
    config: &Config,
    trainer: &ModelTrainer,
    kind: ModelKind,
    data: &PreparedData,
) -> Result<ModelSummary> {
    let span = info_span!("model", model = kind.short_name());
    let _guard = span.enter();
    let output = &config.output;

    let model = trainer.train(kind, &data.train)?;
    let model_path = output.model_path(kind);
    write_bytes(&model_path, &model.to_bytes()?)?;
    info!(path = %model_path.display(), "model saved");

    let predicted = model.predict_rows(&data.test.features)?;
    let metrics = ForecastMetrics::calculate(&data.test.targets, &predicted)?;
    info!(%metrics, quality = ?metrics.quality(), "test evaluation");

    let rows = prediction_rows(&data.test.index, &data.test.targets, &predicted);

    let table_path = output.table_path(kind);
    write_prediction_table(&table_path, &rows)?;

    let chart_path = output.chart_path(kind);
    let spec = ChartSpec::for_model(kind, &config.data.target_column, &rows);
    let chart_labeled = render_prediction_chart(&chart_path, &spec, &config.chart)?;

    Ok(ModelSummary {
        kind,
        model_id: model.metadata().model_id.clone(),
        test_metrics: metrics,
        model_path,
        table_path,
        chart_path,
        chart_labeled,
        predictions: rows,
    })
}
