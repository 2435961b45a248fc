//! Spreadsheet and CSV ingestion
//!
//! The first row is the header. One column holds the month (native
//! spreadsheet dates, Excel serials or text dates); every other column must be
//! numeric and becomes a column of the `MonthlyTable`, in header order.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::config::DataConfig;
use crate::domain::MonthlyTable;
use crate::error::{PipelineError, PipelineResult};

/// Excel day zero for the 1900 date system (accounts for the 1900 leap bug).
const EXCEL_EPOCH: (i32, u32, u32) = (1899, 12, 30);
/// Largest serial Excel accepts (9999-12-31).
const EXCEL_MAX_SERIAL: f64 = 2_958_465.0;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// A raw input cell before typing.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl Cell {
    fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(v) => v.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Date(d) => d.to_string(),
        }
    }
}

/// Header plus data rows, as read from the file.
struct RawGrid {
    header: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// Load the monthly table described by `config`, picking the reader from the
/// file extension.
pub fn load_monthly_table(config: &DataConfig) -> PipelineResult<MonthlyTable> {
    let path = config.input_path.as_path();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let grid = match extension.as_str() {
        "csv" => read_csv(path)?,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path, config.sheet.as_deref())?,
        other => {
            return Err(PipelineError::UnsupportedFormat(format!(
                "'{}' (extension '{}')",
                path.display(),
                other
            )))
        }
    };

    let table = build_table(grid, &config.date_column)?;

    info!(
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().len(),
        "loaded monthly series"
    );
    if !table.is_chronological() {
        warn!(
            path = %path.display(),
            "month index is not strictly increasing; rows are used in file order"
        );
    }
    Ok(table)
}

fn read_csv(path: &Path) -> PipelineResult<RawGrid> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let header = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = record
            .iter()
            // CSV has no cell types: numbers are parsed per column later so a
            // bare number in the date column is never read as a serial.
            .map(|field| {
                if field.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(field.to_string())
                }
            })
            .collect();
        rows.push(row);
    }
    Ok(RawGrid { header, rows })
}

fn read_workbook(path: &Path, sheet: Option<&str>) -> PipelineResult<RawGrid> {
    if !path.exists() {
        return Err(PipelineError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "input workbook not found"),
        ));
    }

    let mut workbook = open_workbook_auto(path)
        .map_err(|e| PipelineError::Workbook(format!("failed to open '{}': {e}", path.display())))?;

    let range = match sheet {
        Some(name) => workbook
            .worksheet_range(name)
            .map_err(|e| PipelineError::Workbook(format!("sheet '{name}': {e}")))?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| PipelineError::Workbook("workbook has no sheets".to_string()))?
            .map_err(|e| PipelineError::Workbook(format!("first sheet: {e}")))?,
    };
    debug!(sheet = ?sheet, size = ?range.get_size(), "read worksheet range");

    let mut rows_iter = range.rows();
    let header = rows_iter
        .next()
        .ok_or_else(|| PipelineError::Workbook("worksheet is empty".to_string()))?
        .iter()
        .map(|c| c.to_string())
        .collect();
    let rows = rows_iter
        .map(|r| r.iter().map(cell_from_data).collect())
        .collect();

    Ok(RawGrid { header, rows })
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Float(v) => Cell::Number(*v),
        Data::Int(v) => Cell::Number(*v as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            if s.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(d) => Cell::Date(d.date()),
            None => Cell::Number(dt.as_f64()),
        },
        Data::Error(e) => Cell::Text(format!("{e:?}")),
    }
}

fn normalize_header(name: &str, idx: usize) -> String {
    // Excel-exported CSVs may carry a BOM on the first header.
    let name = name.trim().trim_start_matches('\u{feff}').trim();
    if name.is_empty() {
        format!("Unnamed: {idx}")
    } else {
        name.to_string()
    }
}

fn build_table(grid: RawGrid, date_column: &str) -> PipelineResult<MonthlyTable> {
    let header: Vec<String> = grid
        .header
        .iter()
        .enumerate()
        .map(|(i, h)| normalize_header(h, i))
        .collect();

    let mut seen = HashSet::new();
    if let Some(dup) = header.iter().find(|h| !seen.insert(h.as_str())) {
        return Err(PipelineError::SchemaMismatch(format!("duplicate column '{dup}'")));
    }

    let date_pos = header
        .iter()
        .position(|h| h == date_column)
        .ok_or_else(|| PipelineError::MissingColumn(date_column.to_string()))?;

    let value_columns: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != date_pos)
        .map(|(i, h)| (i, h.clone()))
        .collect();

    let mut index = Vec::with_capacity(grid.rows.len());
    let mut rows = Vec::with_capacity(grid.rows.len());

    for (offset, raw) in grid.rows.iter().enumerate() {
        // Header is line 1.
        let line = offset + 2;
        if raw.iter().all(|c| *c == Cell::Empty) {
            continue;
        }

        let date_cell = raw.get(date_pos).unwrap_or(&Cell::Empty);
        index.push(parse_date_cell(date_cell, line, date_column)?);

        let mut values = Vec::with_capacity(value_columns.len());
        for (pos, name) in &value_columns {
            let cell = raw.get(*pos).unwrap_or(&Cell::Empty);
            values.push(parse_number_cell(cell, line, name)?);
        }
        rows.push(values);
    }

    let columns = value_columns.into_iter().map(|(_, name)| name).collect();
    MonthlyTable::new(index, columns, rows)
}

fn parse_date_cell(cell: &Cell, row: usize, column: &str) -> PipelineResult<NaiveDate> {
    match cell {
        Cell::Date(d) => Ok(*d),
        Cell::Number(serial) => excel_serial_to_date(*serial).ok_or_else(|| PipelineError::InvalidDate {
            row,
            value: cell.display(),
        }),
        Cell::Text(s) => parse_date_text(s).ok_or_else(|| PipelineError::InvalidDate {
            row,
            value: s.clone(),
        }),
        Cell::Empty => Err(PipelineError::MissingValue {
            row,
            column: column.to_string(),
        }),
    }
}

fn parse_number_cell(cell: &Cell, row: usize, column: &str) -> PipelineResult<f64> {
    match cell {
        Cell::Number(v) => Ok(*v),
        Cell::Text(s) => s
            .trim()
            .replace(',', "")
            .parse::<f64>()
            .map_err(|_| PipelineError::InvalidNumber {
                row,
                column: column.to_string(),
                value: s.clone(),
            }),
        Cell::Date(d) => Err(PipelineError::InvalidNumber {
            row,
            column: column.to_string(),
            value: d.to_string(),
        }),
        Cell::Empty => Err(PipelineError::MissingValue {
            row,
            column: column.to_string(),
        }),
    }
}

pub(crate) fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > EXCEL_MAX_SERIAL {
        return None;
    }
    let (y, m, d) = EXCEL_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// Parse the text date layouts commonly found in monthly demand sheets.
pub(crate) fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    // Month-only layouts: "2020-01", "Jan-2020", "January 2020", "Jan-20".
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d") {
        return Some(d);
    }
    let parts: Vec<&str> = s
        .split(|c: char| c == '-' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    match parts.as_slice() {
        [month, year] => {
            let formats = if year.len() == 2 {
                ["%d %b %y", "%d %B %y"]
            } else {
                ["%d %b %Y", "%d %B %Y"]
            };
            let text = format!("01 {month} {year}");
            formats
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok())
        }
        _ => None,
    }
}
