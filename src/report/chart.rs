//! Actual-vs-predicted line charts rendered to PNG with plotters.
//!
//! Text needs a TrueType font registered with plotters at runtime. When none
//! can be found the chart is still written, with both series but no title,
//! axis labels or legend.

use std::error::Error;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use tracing::{info, warn};

use super::artifacts::ensure_parent;
use crate::config::ChartConfig;
use crate::domain::PredictionRow;
use crate::error::{PipelineError, PipelineResult};
use crate::ml::ModelKind;

const FONT_FAMILY: &str = "sans-serif";

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Result of the last font registration and the font file it was asked for.
#[derive(Debug, Default)]
struct FontCache {
    requested: Option<Option<PathBuf>>,
    ready: bool,
}

impl FontCache {
    /// Register again only when the requested font differs from last time.
    fn get_or_register(
        &mut self,
        requested: Option<&Path>,
        register: impl FnOnce(Option<&Path>) -> bool,
    ) -> bool {
        if self.requested.as_ref().map(|r| r.as_deref()) != Some(requested) {
            self.ready = register(requested);
            self.requested = Some(requested.map(Path::to_path_buf));
        }
        self.ready
    }
}

static FONT_CACHE: Lazy<Mutex<FontCache>> = Lazy::new(Default::default);

/// Everything drawn on one chart
pub struct ChartSpec<'a> {
    pub title: String,
    pub y_label: &'a str,
    pub predicted_label: String,
    pub rows: &'a [PredictionRow],
}

impl<'a> ChartSpec<'a> {
    pub fn for_model(kind: ModelKind, target_column: &'a str, rows: &'a [PredictionRow]) -> Self {
        Self {
            title: format!("{}: Test vs Prediction", kind),
            y_label: target_column,
            predicted_label: format!("{} Predicted", kind.short_name()),
            rows,
        }
    }

    fn months(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.month).collect()
    }

    fn x_range(&self) -> Range<f64> {
        -0.5..(self.rows.len() as f64 - 0.5)
    }

    fn y_range(&self) -> Range<f64> {
        let (lo, hi) = self
            .rows
            .iter()
            .flat_map(|r| [r.actual, r.predicted])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if !lo.is_finite() || !hi.is_finite() {
            return 0.0..1.0;
        }
        let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.05 };
        (lo - pad)..(hi + pad)
    }

    fn actual_points(&self) -> Vec<(f64, f64)> {
        self.rows.iter().enumerate().map(|(i, r)| (i as f64, r.actual)).collect()
    }

    fn predicted_points(&self) -> Vec<(f64, f64)> {
        self.rows.iter().enumerate().map(|(i, r)| (i as f64, r.predicted)).collect()
    }
}

/// Tick label for an x position: the month at that row, blank between rows.
pub fn month_label(months: &[NaiveDate], x: f64) -> String {
    let i = x.round();
    if (x - i).abs() > 1e-6 || i < 0.0 {
        return String::new();
    }
    months
        .get(i as usize)
        .map(|m| m.format("%Y-%m").to_string())
        .unwrap_or_default()
}

/// Make sure a font is registered for `config.font_path`. Plotters keeps a
/// single process-wide font per family, so a different path replaces it.
fn ensure_font(config: &ChartConfig) -> bool {
    let mut cache = FONT_CACHE.lock().unwrap_or_else(PoisonError::into_inner);
    cache.get_or_register(config.font_path.as_deref(), register_first_font)
}

/// Register the first readable font, trying `preferred` before system fonts.
fn register_first_font(preferred: Option<&Path>) -> bool {
    let candidates = preferred
        .map(Path::to_path_buf)
        .into_iter()
        .chain(SYSTEM_FONTS.iter().map(PathBuf::from));

    for path in candidates {
        let Ok(bytes) = fs::read(&path) else {
            continue;
        };
        let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
        match register_font(FONT_FAMILY, FontStyle::Normal, bytes) {
            Ok(()) => {
                info!(font = %path.display(), "chart font registered");
                return true;
            }
            Err(_) => warn!(font = %path.display(), "unusable font file"),
        }
    }
    warn!("no TrueType font found; charts will be drawn without text");
    false
}

/// Render the chart to `path`. Returns whether text was drawn.
pub fn render_prediction_chart(
    path: &Path,
    spec: &ChartSpec<'_>,
    config: &ChartConfig,
) -> PipelineResult<bool> {
    if spec.rows.is_empty() {
        return Err(PipelineError::Chart("no rows to plot".to_string()));
    }
    ensure_parent(path)?;
    let size = (config.width, config.height);

    if ensure_font(config) {
        match draw_labeled(path, spec, size) {
            Ok(()) => {
                info!(path = %path.display(), "chart written");
                return Ok(true);
            }
            Err(e) => warn!(error = %e, "labeled chart failed; drawing without text"),
        }
    }

    draw_plain(path, spec, size).map_err(|e| PipelineError::Chart(e.to_string()))?;
    info!(path = %path.display(), labeled = false, "chart written");
    Ok(false)
}

fn draw_labeled(path: &Path, spec: &ChartSpec<'_>, size: (u32, u32)) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&spec.title, (FONT_FAMILY, 26).into_font())
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(75)
        .build_cartesian_2d(spec.x_range(), spec.y_range())?;

    let months = spec.months();
    let x_fmt = |v: &f64| month_label(&months, *v);
    chart
        .configure_mesh()
        .x_desc("Month")
        .y_desc(spec.y_label)
        .x_labels(months.len().clamp(2, 12))
        .x_label_formatter(&x_fmt)
        .y_label_formatter(&|v| format!("{v:.2}"))
        .label_style((FONT_FAMILY, 14).into_font())
        .draw()?;

    chart
        .draw_series(LineSeries::new(spec.actual_points(), BLUE.stroke_width(2)))?
        .label("Actual")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.stroke_width(2)));
    chart
        .draw_series(LineSeries::new(spec.predicted_points(), RED.stroke_width(2)))?
        .label(spec.predicted_label.as_str())
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));

    chart
        .configure_series_labels()
        .label_font((FONT_FAMILY, 14).into_font())
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_plain(path: &Path, spec: &ChartSpec<'_>, size: (u32, u32)) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(spec.x_range(), spec.y_range())?;
    chart.draw_series(LineSeries::new(spec.actual_points(), BLUE.stroke_width(2)))?;
    chart.draw_series(LineSeries::new(spec.predicted_points(), RED.stroke_width(2)))?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::tempdir;

    fn rows() -> Vec<PredictionRow> {
        (8..=12)
            .map(|m| PredictionRow {
                month: NaiveDate::from_ymd_opt(2021, m, 1).unwrap(),
                actual: 5.0 + m as f64,
                predicted: 5.5 + m as f64,
            })
            .collect()
    }

    #[test]
    fn test_chart_labels_follow_model() {
        let rows = rows();
        let spec = ChartSpec::for_model(ModelKind::GradientBoosting, "Demand (BCM)", &rows);
        assert_eq!(spec.title, "Gradient Boosting: Test vs Prediction");
        assert_eq!(spec.predicted_label, "GBT Predicted");
        assert_eq!(spec.y_label, "Demand (BCM)");
    }

    #[test]
    fn test_month_label_only_on_rows() {
        let months: Vec<NaiveDate> = rows().iter().map(|r| r.month).collect();
        assert_eq!(month_label(&months, 0.0), "2021-08");
        assert_eq!(month_label(&months, 4.0), "2021-12");
        assert_eq!(month_label(&months, 1.5), "");
        assert_eq!(month_label(&months, 5.0), "");
        assert_eq!(month_label(&months, -1.0), "");
    }

    #[test]
    fn test_ranges_cover_both_series() {
        let rows = rows();
        let spec = ChartSpec::for_model(ModelKind::RandomForest, "y", &rows);
        let y = spec.y_range();
        assert!(y.start < 13.0 && y.end > 17.5);
        assert_eq!(spec.x_range(), -0.5..4.5);

        let flat = vec![PredictionRow {
            month: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            actual: 2.0,
            predicted: 2.0,
        }];
        let spec = ChartSpec::for_model(ModelKind::RandomForest, "y", &flat);
        let y = spec.y_range();
        assert!(y.start < 2.0 && y.end > 2.0);
    }

    #[test]
    fn test_render_writes_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("charts/rf.png");
        let rows = rows();
        let spec = ChartSpec::for_model(ModelKind::RandomForest, "Demand", &rows);

        render_prediction_chart(&path, &spec, &ChartConfig::default()).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_render_rejects_empty_rows() {
        let dir = tempdir().unwrap();
        let spec = ChartSpec::for_model(ModelKind::RandomForest, "Demand", &[]);
        assert!(render_prediction_chart(&dir.path().join("x.png"), &spec, &ChartConfig::default()).is_err());
    }

    #[test]
    fn test_font_cache_follows_requested_path() {
        let mut cache = FontCache::default();
        let calls = RefCell::new(Vec::new());
        let record = |p: Option<&Path>| calls.borrow_mut().push(p.map(Path::to_path_buf));

        assert!(cache.get_or_register(None, |p| {
            record(p);
            true
        }));
        assert!(cache.get_or_register(None, |p| {
            record(p);
            false
        }));
        assert_eq!(calls.borrow().len(), 1);

        let custom = Path::new("/fonts/custom.ttf");
        assert!(!cache.get_or_register(Some(custom), |p| {
            record(p);
            false
        }));
        assert!(!cache.get_or_register(Some(custom), |p| {
            record(p);
            true
        }));
        assert_eq!(*calls.borrow(), vec![None, Some(custom.to_path_buf())]);
    }

    #[test]
    fn test_unreadable_font_path_falls_back() {
        let dir = tempdir().unwrap();
        let bogus = dir.path().join("not-a-font.ttf");
        fs::write(&bogus, b"definitely not truetype").unwrap();

        let path = dir.path().join("fallback.png");
        let rows = rows();
        let spec = ChartSpec::for_model(ModelKind::RandomForest, "Demand", &rows);
        let config = ChartConfig {
            font_path: Some(bogus),
            ..ChartConfig::default()
        };
        render_prediction_chart(&path, &spec, &config).unwrap();
        assert_eq!(&fs::read(&path).unwrap()[..8], b"\x89PNG\r\n\x1a\n");
    }
}
