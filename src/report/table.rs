//! Test-vs-prediction tables.
//!
//! Written as an xlsx workbook, or as CSV when the target path ends in `.csv`.

use std::path::Path;

use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
use tracing::info;

use super::artifacts::ensure_parent;
use crate::domain::PredictionRow;
use crate::error::{PipelineError, PipelineResult};

pub const TABLE_HEADERS: [&str; 3] = ["Month", "Actual", "Predicted"];

const SHEET_NAME: &str = "Test vs Prediction";

pub fn write_prediction_table(path: &Path, rows: &[PredictionRow]) -> PipelineResult<()> {
    ensure_parent(path)?;
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

    if is_csv {
        write_csv(path, rows)?;
    } else {
        write_xlsx(path, rows)?;
    }
    info!(path = %path.display(), rows = rows.len(), "prediction table written");
    Ok(())
}

fn write_xlsx(path: &Path, rows: &[PredictionRow]) -> PipelineResult<()> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;
    for (col, title) in TABLE_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &header)?;
    }
    sheet.set_column_width(0, 12.0)?;
    sheet.set_column_width(1, 14.0)?;
    sheet.set_column_width(2, 14.0)?;

    for (i, row) in rows.iter().enumerate() {
        let r = i as u32 + 1;
        let month = excel_date(row)?;
        sheet.write_datetime_with_format(r, 0, &month, &date_format)?;
        sheet.write_number(r, 1, row.actual)?;
        sheet.write_number(r, 2, row.predicted)?;
    }

    workbook.save(path)?;
    Ok(())
}

fn excel_date(row: &PredictionRow) -> PipelineResult<ExcelDateTime> {
    use chrono::Datelike;

    let year = u16::try_from(row.month.year()).map_err(|_| PipelineError::InvalidDate {
        row: 0,
        value: row.month.to_string(),
    })?;
    Ok(ExcelDateTime::from_ymd(
        year,
        row.month.month() as u8,
        row.month.day() as u8,
    )?)
}

fn write_csv(path: &Path, rows: &[PredictionRow]) -> PipelineResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(TABLE_HEADERS)?;
    for row in rows {
        writer.write_record([
            row.month.format("%Y-%m-%d").to_string(),
            row.actual.to_string(),
            row.predicted.to_string(),
        ])?;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}
