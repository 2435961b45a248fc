//! Monthly natural gas demand forecasting.
//!
//! Loads a monthly series, derives calendar features, holds out the most
//! recent months, and fits a random forest and gradient-boosted trees on
//! standardized features. Each model gets a prediction table, a chart and a
//! persisted copy; the scaler and feature-name list are saved for serving.

pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod ml;
pub mod pipeline;
pub mod report;
pub mod telemetry;

pub use config::Config;
pub use error::{PipelineError, PipelineResult};
