//! Monthly time series table
//!
//! Rows are indexed by month and hold named numeric columns in source order.
//! The table never reorders its rows: chronological order is whatever the
//! input provided.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTable {
    index: Vec<NaiveDate>,
    columns: Vec<String>,
    /// Row-major values, one inner vector per month.
    rows: Vec<Vec<f64>>,
}

impl MonthlyTable {
    pub fn new(
        index: Vec<NaiveDate>,
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> PipelineResult<Self> {
        if index.len() != rows.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "{} index entries for {} rows",
                index.len(),
                rows.len()
            )));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(PipelineError::SchemaMismatch(format!(
                "row {} has {} values, expected {}",
                i,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self {
            index,
            columns,
            rows,
        })
    }

    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let pos = self.column_position(name)?;
        Some(self.rows.iter().map(|r| r[pos]).collect())
    }

    /// Append a column at the end of the table.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> PipelineResult<()> {
        let name = name.into();
        if values.len() != self.rows.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "column '{}' has {} values, table has {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        if self.column_position(&name).is_some() {
            return Err(PipelineError::SchemaMismatch(format!(
                "column '{}' already exists",
                name
            )));
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        self.columns.push(name);
        Ok(())
    }

    /// Overwrite the column called `name` where it stands, or append it when
    /// the table has no such column.
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> PipelineResult<()> {
        let name = name.into();
        let Some(pos) = self.column_position(&name) else {
            return self.push_column(name, values);
        };
        if values.len() != self.rows.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "column '{}' has {} values, table has {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[pos] = value;
        }
        Ok(())
    }

    /// True when every month is strictly later than the previous one.
    pub fn is_chronological(&self) -> bool {
        self.index.windows(2).all(|w| w[0] < w[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn sample() -> MonthlyTable {
        MonthlyTable::new(
            vec![month(2020, 1), month(2020, 2), month(2020, 3)],
            vec!["a".to_string(), "b".to_string()],
            vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_column_lookup() {
        let table = sample();
        assert_eq!(table.column_position("b"), Some(1));
        assert_eq!(table.column("b"), Some(vec![10.0, 20.0, 30.0]));
        assert_eq!(table.column("missing"), None);
    }

    #[test]
    fn test_push_column_appends_in_order() {
        let mut table = sample();
        table.push_column("c", vec![0.1, 0.2, 0.3]).unwrap();
        assert_eq!(table.columns(), &["a", "b", "c"]);
        assert_eq!(table.rows()[2], vec![3.0, 30.0, 0.3]);
    }

    #[test]
    fn test_push_column_rejects_length_mismatch() {
        let mut table = sample();
        assert!(table.push_column("c", vec![1.0]).is_err());
        assert!(table.push_column("a", vec![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_new_rejects_ragged_rows() {
        let result = MonthlyTable::new(
            vec![month(2020, 1), month(2020, 2)],
            vec!["a".to_string()],
            vec![vec![1.0], vec![2.0, 3.0]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_chronological_check() {
        assert!(sample().is_chronological());
        let table = MonthlyTable::new(
            vec![month(2020, 2), month(2020, 1)],
            vec!["a".to_string()],
            vec![vec![1.0], vec![2.0]],
        )
        .unwrap();
        assert!(!table.is_chronological());
    }

    #[test]
    fn test_set_column_replaces_in_place() {
        let mut table = sample();
        table.set_column("a", vec![7.0, 8.0, 9.0]).unwrap();
        assert_eq!(table.columns(), &["a", "b"]);
        assert_eq!(table.rows()[2], vec![9.0, 30.0]);

        table.set_column("c", vec![0.5; 3]).unwrap();
        assert_eq!(table.columns(), &["a", "b", "c"]);

        assert!(table.set_column("b", vec![1.0]).is_err());
        assert_eq!(table.column("b"), Some(vec![10.0, 20.0, 30.0]));
    }
}
