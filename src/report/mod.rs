//! Per-model outputs: prediction tables, charts and persisted artifacts.

pub mod artifacts;
pub mod chart;
pub mod table;

pub use artifacts::{
    read_bincode, read_feature_names, read_summary, write_bincode, write_feature_names,
    write_summary, ModelSummary, RunSummary,
};
pub use chart::{render_prediction_chart, ChartSpec};
pub use table::write_prediction_table;
