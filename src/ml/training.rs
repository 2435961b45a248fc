//! ML Model Training Pipeline
//!
//! Dataset assembly from the monthly table, the chronological hold-out split,
//! and the trainer that fits both regressors with fixed hyperparameters.

use std::time::Instant;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::models::MLModel;
use super::{GradientBoostedTrees, ModelKind, RandomForestModel, StandardScaler};
use crate::config::{BoostingConfig, ForestConfig};
use crate::domain::MonthlyTable;
use crate::error::{PipelineError, PipelineResult};

/// Predictor rows and target values, indexed by month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingDataset {
    pub index: Vec<NaiveDate>,
    pub feature_names: Vec<String>,
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl TrainingDataset {
    pub fn new(
        index: Vec<NaiveDate>,
        feature_names: Vec<String>,
        features: Vec<Vec<f64>>,
        targets: Vec<f64>,
    ) -> PipelineResult<Self> {
        if features.len() != targets.len() || index.len() != targets.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "{} index entries, {} feature rows, {} targets",
                index.len(),
                features.len(),
                targets.len()
            )));
        }
        if let Some(row) = features.iter().find(|r| r.len() != feature_names.len()) {
            return Err(PipelineError::SchemaMismatch(format!(
                "feature row has {} values for {} names",
                row.len(),
                feature_names.len()
            )));
        }
        Ok(Self {
            index,
            feature_names,
            features,
            targets,
        })
    }

    /// Separate the target column from the predictors. Predictors keep the
    /// table's column order.
    pub fn from_table(table: &MonthlyTable, target_column: &str) -> PipelineResult<Self> {
        let target_pos = table
            .column_position(target_column)
            .ok_or_else(|| PipelineError::MissingColumn(target_column.to_string()))?;

        let feature_names: Vec<String> = table
            .columns()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != target_pos)
            .map(|(_, name)| name.clone())
            .collect();

        let mut features = Vec::with_capacity(table.len());
        let mut targets = Vec::with_capacity(table.len());
        for row in table.rows() {
            targets.push(row[target_pos]);
            features.push(
                row.iter()
                    .enumerate()
                    .filter(|(i, _)| *i != target_pos)
                    .map(|(_, v)| *v)
                    .collect(),
            );
        }

        Self::new(table.index().to_vec(), feature_names, features, targets)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Chronological hold-out split: the first rows train, the last
    /// `ceil(n * test_fraction)` rows test. Rows are never shuffled.
    pub fn split(&self, test_fraction: f64) -> PipelineResult<(TrainingDataset, TrainingDataset)> {
        let (n_train, _) = split_sizes(self.len(), test_fraction)?;
        Ok((self.slice(0, n_train), self.slice(n_train, self.len())))
    }

    /// Same rows with standardized features.
    pub fn scaled(&self, scaler: &StandardScaler) -> Result<TrainingDataset> {
        if scaler.feature_names() != self.feature_names.as_slice() {
            anyhow::bail!("Scaler was fitted on a different feature schema");
        }
        Ok(TrainingDataset {
            index: self.index.clone(),
            feature_names: self.feature_names.clone(),
            features: scaler.transform(&self.features)?,
            targets: self.targets.clone(),
        })
    }

    fn slice(&self, start: usize, end: usize) -> TrainingDataset {
        TrainingDataset {
            index: self.index[start..end].to_vec(),
            feature_names: self.feature_names.clone(),
            features: self.features[start..end].to_vec(),
            targets: self.targets[start..end].to_vec(),
        }
    }
}

/// Train/test row counts for `n` rows: `n_test = ceil(n * test_fraction)`.
pub fn split_sizes(n: usize, test_fraction: f64) -> PipelineResult<(usize, usize)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::InvalidFraction(test_fraction));
    }
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::InsufficientRows {
            rows: n,
            test_fraction,
        });
    }
    Ok((n - n_test, n_test))
}

/// Model Trainer
pub struct ModelTrainer {
    forest: ForestConfig,
    boosting: BoostingConfig,
}

impl ModelTrainer {
    pub fn new(forest: ForestConfig, boosting: BoostingConfig) -> Self {
        Self { forest, boosting }
    }

    /// Fit one model on an already scaled dataset.
    pub fn train(&self, kind: ModelKind, dataset: &TrainingDataset) -> Result<Box<dyn MLModel>> {
        if dataset.is_empty() {
            anyhow::bail!("Cannot train on empty dataset");
        }

        let started = Instant::now();
        let model: Box<dyn MLModel> = match kind {
            ModelKind::RandomForest => Box::new(RandomForestModel::train(
                &dataset.features,
                &dataset.targets,
                &self.forest,
                dataset.feature_names.clone(),
            )?),
            ModelKind::GradientBoosting => Box::new(GradientBoostedTrees::train(
                &dataset.features,
                &dataset.targets,
                &self.boosting,
                dataset.feature_names.clone(),
            )?),
        };

        info!(
            model = %kind,
            model_id = %model.metadata().model_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model fitted"
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn monthly_dataset(n: usize) -> TrainingDataset {
        let index: Vec<NaiveDate> = (0..n)
            .map(|i| {
                NaiveDate::from_ymd_opt(2018 + (i / 12) as i32, (i % 12) as u32 + 1, 1).unwrap()
            })
            .collect();
        let features = (0..n).map(|i| vec![i as f64, (i * 2) as f64]).collect();
        let targets = (0..n).map(|i| 3.0 * i as f64 + 1.0).collect();
        TrainingDataset::new(index, vec!["a".into(), "b".into()], features, targets).unwrap()
    }

    #[rstest]
    #[case(24, 19, 5)]
    #[case(10, 8, 2)]
    #[case(5, 4, 1)]
    #[case(2, 1, 1)]
    #[case(100, 80, 20)]
    fn test_split_sizes(#[case] n: usize, #[case] train: usize, #[case] test: usize) {
        assert_eq!(split_sizes(n, 0.2).unwrap(), (train, test));
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    fn test_split_needs_two_rows(#[case] n: usize) {
        assert!(matches!(
            split_sizes(n, 0.2),
            Err(PipelineError::InsufficientRows { .. })
        ));
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    #[case(-0.5)]
    #[case(f64::NAN)]
    fn test_split_rejects_bad_fraction(#[case] fraction: f64) {
        assert!(matches!(
            split_sizes(10, fraction),
            Err(PipelineError::InvalidFraction(_))
        ));
    }

    #[test]
    fn test_split_is_chronological_tail() {
        let dataset = monthly_dataset(24);
        let (train, test) = dataset.split(0.2).unwrap();

        assert_eq!(train.len(), 19);
        assert_eq!(test.len(), 5);
        assert_eq!(train.index, dataset.index[..19].to_vec());
        assert_eq!(test.index, dataset.index[19..].to_vec());
        assert_eq!(test.targets, dataset.targets[19..].to_vec());
        assert_eq!(test.feature_names, dataset.feature_names);
    }

    #[test]
    fn test_from_table_drops_target_and_keeps_order() {
        let index = vec![
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 2, 1).unwrap(),
        ];
        let table = MonthlyTable::new(
            index,
            vec!["x".into(), "target".into(), "z".into()],
            vec![vec![1.0, 100.0, 3.0], vec![4.0, 200.0, 6.0]],
        )
        .unwrap();

        let dataset = TrainingDataset::from_table(&table, "target").unwrap();
        assert_eq!(dataset.feature_names, vec!["x", "z"]);
        assert_eq!(dataset.features, vec![vec![1.0, 3.0], vec![4.0, 6.0]]);
        assert_eq!(dataset.targets, vec![100.0, 200.0]);

        assert!(matches!(
            TrainingDataset::from_table(&table, "absent"),
            Err(PipelineError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_scaled_uses_given_scaler() {
        let dataset = monthly_dataset(12);
        let (train, test) = dataset.split(0.25).unwrap();
        let scaler = StandardScaler::fit(&train.features, train.feature_names.clone()).unwrap();

        let scaled_test = test.scaled(&scaler).unwrap();
        assert_eq!(scaled_test.targets, test.targets);
        // Test rows sit after every training row, so they scale above zero.
        assert!(scaled_test.features.iter().all(|r| r[0] > 0.0));
    }

    #[test]
    fn test_trainer_fits_both_kinds() {
        let dataset = monthly_dataset(24);
        let trainer = ModelTrainer::new(
            ForestConfig {
                n_trees: 10,
                ..ForestConfig::default()
            },
            BoostingConfig {
                n_estimators: 10,
                ..BoostingConfig::default()
            },
        );
        for kind in [ModelKind::RandomForest, ModelKind::GradientBoosting] {
            let model = trainer.train(kind, &dataset).unwrap();
            assert_eq!(model.kind(), kind);
            assert_eq!(model.metadata().feature_names, dataset.feature_names);
            assert_eq!(model.predict_rows(&dataset.features).unwrap().len(), 24);
        }
    }

    proptest! {
        #[test]
        fn prop_split_ratio(n in 2usize..500) {
            let (train, test) = split_sizes(n, 0.2).unwrap();
            prop_assert_eq!(train + test, n);
            prop_assert!(test >= 1 && train >= 1);
            // Within one row of an exact 80/20 split.
            prop_assert!((train as f64 - 0.8 * n as f64).abs() < 1.0 + 1e-9);
        }
    }
}
