use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One test-set month with the observed and predicted target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub month: NaiveDate,
    pub actual: f64,
    pub predicted: f64,
}

impl PredictionRow {
    pub fn error(&self) -> f64 {
        self.actual - self.predicted
    }
}

/// Pair actual and predicted values with their months, keeping index order.
pub fn prediction_rows(months: &[NaiveDate], actual: &[f64], predicted: &[f64]) -> Vec<PredictionRow> {
    months
        .iter()
        .zip(actual.iter().zip(predicted.iter()))
        .map(|(&month, (&actual, &predicted))| PredictionRow {
            month,
            actual,
            predicted,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_rows_keep_order() {
        let months = vec![
            NaiveDate::from_ymd_opt(2021, 11, 1).unwrap(),
            NaiveDate::from_ymd_opt(2021, 12, 1).unwrap(),
        ];
        let rows = prediction_rows(&months, &[5.0, 6.0], &[4.5, 6.5]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].month, months[0]);
        assert_eq!(rows[1].predicted, 6.5);
        assert_eq!(rows[0].error(), 0.5);
    }
}
