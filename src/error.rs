use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, splitting and reporting on the monthly series.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("Column not found: {0}")]
    MissingColumn(String),

    #[error("Invalid date at row {row}: '{value}'")]
    InvalidDate { row: usize, value: String },

    #[error("Invalid number at row {row}, column '{column}': '{value}'")]
    InvalidNumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Missing value at row {row}, column '{column}'")]
    MissingValue { row: usize, column: String },

    #[error("Not enough rows to split: {rows} rows with test fraction {test_fraction}")]
    InsufficientRows { rows: usize, test_fraction: f64 },

    #[error("Test fraction must be between 0 and 1 (exclusive), got {0}")]
    InvalidFraction(f64),

    #[error("Feature schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Chart rendering failed: {0}")]
    Chart(String),

    #[error("Spreadsheet writer error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
