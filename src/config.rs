use std::path::{Path, PathBuf};

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::ml::ModelKind;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const CONFIG_PATH_ENV: &str = "GASCAST_CONFIG";
pub const ENV_PREFIX: &str = "GASCAST__";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub data: DataConfig,
    pub split: SplitConfig,
    pub forest: ForestConfig,
    pub boosting: BoostingConfig,
    pub output: OutputConfig,
    pub chart: ChartConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub input_path: PathBuf,
    /// Worksheet name; the first sheet is used when absent.
    pub sheet: Option<String>,
    pub date_column: String,
    pub target_column: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("NaturalGasDemand_Input.xlsx"),
            sheet: None,
            date_column: "Month".to_string(),
            target_column: "India total Consumption of Natural Gas (in BCM)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    pub test_fraction: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self { test_fraction: 0.2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub seed: u64,
    pub max_depth: Option<u16>,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 200,
            seed: 42,
            max_depth: None,
            min_samples_leaf: 1,
            min_samples_split: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: u16,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            learning_rate: 0.3,
            max_depth: 6,
            min_samples_leaf: 1,
            min_samples_split: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOutputConfig {
    pub model_file: String,
    pub table_file: String,
    pub chart_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub scaler_file: String,
    pub feature_names_file: String,
    pub summary_file: String,
    pub forest: ModelOutputConfig,
    pub boosting: ModelOutputConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            scaler_file: "scaler.bin".to_string(),
            feature_names_file: "feature_names.txt".to_string(),
            summary_file: "training_summary.json".to_string(),
            forest: ModelOutputConfig {
                model_file: "natural_gas_rf_model.bin".to_string(),
                table_file: "rf_test_vs_prediction_results.xlsx".to_string(),
                chart_file: "rf_test_vs_prediction.png".to_string(),
            },
            boosting: ModelOutputConfig {
                model_file: "natural_gas_gbt_model.bin".to_string(),
                table_file: "gbt_test_vs_prediction_results.xlsx".to_string(),
                chart_file: "gbt_test_vs_prediction.png".to_string(),
            },
        }
    }
}

impl OutputConfig {
    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn for_model(&self, kind: ModelKind) -> &ModelOutputConfig {
        match kind {
            ModelKind::RandomForest => &self.forest,
            ModelKind::GradientBoosting => &self.boosting,
        }
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.path(&self.scaler_file)
    }

    pub fn feature_names_path(&self) -> PathBuf {
        self.path(&self.feature_names_file)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.path(&self.summary_file)
    }

    pub fn model_path(&self, kind: ModelKind) -> PathBuf {
        self.path(&self.for_model(kind).model_file)
    }

    pub fn table_path(&self, kind: ModelKind) -> PathBuf {
        self.path(&self.for_model(kind).table_file)
    }

    pub fn chart_path(&self, kind: ModelKind) -> PathBuf {
        self.path(&self.for_model(kind).chart_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    pub width: u32,
    pub height: u32,
    /// TrueType font used for titles and labels. Common system locations are
    /// searched when unset.
    pub font_path: Option<PathBuf>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 600,
            font_path: None,
        }
    }
}

impl Config {
    /// Load configuration from `GASCAST_CONFIG` (or `config/default.toml`) and
    /// `GASCAST__` prefixed environment variables, on top of built-in defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        let cfg: Config = figment
            .extract()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        cfg.validate().map_err(PipelineError::Config)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), String> {
        let fraction = self.split.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(format!("split.test_fraction must be in (0, 1), got {fraction}"));
        }
        if self.data.date_column.trim().is_empty() {
            return Err("data.date_column must not be empty".to_string());
        }
        if self.data.target_column.trim().is_empty() {
            return Err("data.target_column must not be empty".to_string());
        }
        if self.data.date_column == self.data.target_column {
            return Err("data.date_column and data.target_column must differ".to_string());
        }
        if self.forest.n_trees == 0 {
            return Err("forest.n_trees must be at least 1".to_string());
        }
        if self.boosting.n_estimators == 0 {
            return Err("boosting.n_estimators must be at least 1".to_string());
        }
        if !(self.boosting.learning_rate > 0.0 && self.boosting.learning_rate.is_finite()) {
            return Err(format!(
                "boosting.learning_rate must be positive, got {}",
                self.boosting.learning_rate
            ));
        }
        if self.boosting.max_depth == 0 {
            return Err("boosting.max_depth must be at least 1".to_string());
        }
        if self.chart.width < 200 || self.chart.height < 150 {
            return Err(format!(
                "chart size {}x{} is too small (minimum 200x150)",
                self.chart.width, self.chart.height
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let cfg = Config::default();
        assert_eq!(cfg.data.date_column, "Month");
        assert_eq!(
            cfg.data.target_column,
            "India total Consumption of Natural Gas (in BCM)"
        );
        assert_eq!(cfg.split.test_fraction, 0.2);
        assert_eq!(cfg.forest.n_trees, 200);
        assert_eq!(cfg.forest.seed, 42);
        assert_eq!(cfg.boosting.n_estimators, 200);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_output_paths_join_dir() {
        let mut output = OutputConfig::default();
        output.dir = PathBuf::from("/tmp/out");
        assert_eq!(output.scaler_path(), PathBuf::from("/tmp/out/scaler.bin"));
        assert_eq!(
            output.chart_path(ModelKind::GradientBoosting),
            PathBuf::from("/tmp/out/gbt_test_vs_prediction.png")
        );
    }

    #[test]
    fn test_validate_rejects_bad_fraction() {
        let mut cfg = Config::default();
        cfg.split.test_fraction = 1.0;
        assert!(cfg.validate().is_err());
        cfg.split.test_fraction = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_trees() {
        let mut cfg = Config::default();
        cfg.forest.n_trees = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_toml_and_env_layering() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "gascast.toml",
                r#"
                [split]
                test_fraction = 0.25

                [forest]
                n_trees = 50
                "#,
            )?;
            jail.set_env("GASCAST__FOREST__N_TREES", "75");

            let cfg = Config::load_from("gascast.toml").map_err(|e| e.to_string())?;
            assert_eq!(cfg.split.test_fraction, 0.25);
            assert_eq!(cfg.forest.n_trees, 75);
            assert_eq!(cfg.forest.seed, 42);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_layers_surface_as_config_errors() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("gascast.toml", "[split]\ntest_fraction = 1.5\n")?;
            let err = Config::load_from("gascast.toml").unwrap_err();
            match err.downcast_ref::<PipelineError>() {
                Some(PipelineError::Config(msg)) => assert!(msg.contains("test_fraction")),
                other => panic!("expected a config error, got {:?}", other),
            }

            jail.set_env("GASCAST__FOREST__N_TREES", "many");
            let err = Config::load_from("missing.toml").unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PipelineError>(),
                Some(PipelineError::Config(_))
            ));
            Ok(())
        });
    }
}
