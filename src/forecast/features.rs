//! Calendar feature engineering for the monthly series
//!
//! Every derived column is a pure function of the row's month, so the same
//! code serves both training and the serving-side feature builder.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::domain::MonthlyTable;
use crate::error::PipelineResult;

/// Names of the derived columns, in the order they are appended.
pub const CALENDAR_FEATURE_NAMES: [&str; 5] = ["Year", "Month_num", "Quarter", "Month_sin", "Month_cos"];

/// Calendar features for a single month
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    pub year: i32,
    /// Month (1-12)
    pub month: u32,
    /// Quarter (1-4)
    pub quarter: u32,
    /// sin(2π·month/12)
    pub month_sin: f64,
    /// cos(2π·month/12)
    pub month_cos: f64,
}

impl CalendarFeatures {
    pub fn from_date(date: NaiveDate) -> Self {
        let month = date.month();
        let angle = 2.0 * PI * month as f64 / 12.0;
        Self {
            year: date.year(),
            month,
            quarter: (month - 1) / 3 + 1,
            month_sin: angle.sin(),
            month_cos: angle.cos(),
        }
    }

    /// Values in `CALENDAR_FEATURE_NAMES` order.
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.year as f64,
            self.month as f64,
            self.quarter as f64,
            self.month_sin,
            self.month_cos,
        ]
    }
}

/// Add the calendar columns after the source columns. A source column that
/// already carries one of these names is overwritten where it stands.
pub fn add_calendar_features(table: &mut MonthlyTable) -> PipelineResult<()> {
    let features: Vec<CalendarFeatures> = table
        .index()
        .iter()
        .map(|d| CalendarFeatures::from_date(*d))
        .collect();

    for (i, name) in CALENDAR_FEATURE_NAMES.iter().enumerate() {
        let values = features.iter().map(|f| f.to_vec()[i]).collect();
        table.set_column(*name, values)?;
    }
    Ok(())
}
