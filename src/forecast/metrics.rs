//! Hold-out evaluation of the demand forecasts
//!
//! Error metrics computed on the chronological test tail for each model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Actual values at or below this magnitude are left out of MAPE.
const MAPE_EPSILON: f64 = 1e-6;

/// Forecast accuracy metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Square Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error (%)
    pub mape: f64,
    /// R² (coefficient of determination)
    pub r2: f64,
    pub sample_count: usize,
    /// Largest absolute error
    pub max_error: f64,
    /// Smallest absolute error
    pub min_error: f64,
    /// Standard deviation of signed errors
    pub std_dev: f64,
}

impl ForecastMetrics {
    /// Calculate metrics from actual and predicted values
    pub fn calculate(actual: &[f64], predicted: &[f64]) -> Result<Self, ForecastMetricsError> {
        if actual.len() != predicted.len() {
            return Err(ForecastMetricsError::DimensionMismatch {
                actual: actual.len(),
                predicted: predicted.len(),
            });
        }
        if actual.is_empty() {
            return Err(ForecastMetricsError::EmptyData);
        }

        let n = actual.len() as f64;
        let errors: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();

        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
        let sse: f64 = errors.iter().map(|e| e * e).sum();
        let rmse = (sse / n).sqrt();

        let pct: Vec<f64> = actual
            .iter()
            .zip(&errors)
            .filter(|(a, _)| a.abs() > MAPE_EPSILON)
            .map(|(a, e)| e.abs() / a.abs() * 100.0)
            .collect();
        let mape = if pct.is_empty() {
            0.0
        } else {
            pct.iter().sum::<f64>() / pct.len() as f64
        };

        let mean_actual = actual.iter().sum::<f64>() / n;
        let ss_tot: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
        let r2 = if ss_tot > 1e-10 { 1.0 - sse / ss_tot } else { 0.0 };

        let max_error = errors.iter().map(|e| e.abs()).fold(0.0f64, f64::max);
        let min_error = errors.iter().map(|e| e.abs()).fold(f64::INFINITY, f64::min);

        let mean_error = errors.iter().sum::<f64>() / n;
        let std_dev = (errors.iter().map(|e| (e - mean_error).powi(2)).sum::<f64>() / n).sqrt();

        Ok(ForecastMetrics {
            mae,
            rmse,
            mape,
            r2,
            sample_count: actual.len(),
            max_error,
            min_error,
            std_dev,
        })
    }

    /// Assess forecast quality based on MAPE
    pub fn quality(&self) -> ForecastQuality {
        if self.mape < 5.0 {
            ForecastQuality::Excellent
        } else if self.mape < 10.0 {
            ForecastQuality::Good
        } else if self.mape < 20.0 {
            ForecastQuality::Fair
        } else if self.mape < 50.0 {
            ForecastQuality::Poor
        } else {
            ForecastQuality::VeryPoor
        }
    }
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE={:.3}, RMSE={:.3}, MAPE={:.2}%, R²={:.3}, Quality={:?}",
            self.mae,
            self.rmse,
            self.mape,
            self.r2,
            self.quality()
        )
    }
}

/// Forecast quality classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastQuality {
    Excellent, // MAPE < 5%
    Good,      // MAPE 5-10%
    Fair,      // MAPE 10-20%
    Poor,      // MAPE 20-50%
    VeryPoor,  // MAPE > 50%
}

/// Forecast metrics calculation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ForecastMetricsError {
    #[error("Dimension mismatch: actual={actual}, predicted={predicted}")]
    DimensionMismatch { actual: usize, predicted: usize },

    #[error("Empty data provided")]
    EmptyData,
}
