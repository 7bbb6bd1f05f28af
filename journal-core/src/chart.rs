//! Mood-over-time chart.
//!
//! Tones are placed on a fixed six-step scale so the y axis reads the same
//! from one chart to the next, whatever moods the journal happens to hold:
//!
//! | level | tones |
//! |---|---|
//! | 5 | happy, excited |
//! | 4 | content, grateful |
//! | 3 | calm |
//! | 2 | neutral, and anything unrecognized |
//! | 1 | anxious, stressed, lonely, tired |
//! | 0 | sad, angry |

use crate::journal::{JournalEntry, JournalError, JournalStore};
use chrono::{DateTime, Local};
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from chart rendering.
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("No journal entries to chart yet")]
    Empty,

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Failed to draw chart: {0}")]
    Render(String),
}

const TONE_LEVELS: &[(&str, u8)] = &[
    ("happy", 5),
    ("excited", 5),
    ("content", 4),
    ("grateful", 4),
    ("calm", 3),
    ("neutral", 2),
    ("anxious", 1),
    ("stressed", 1),
    ("lonely", 1),
    ("tired", 1),
    ("sad", 0),
    ("angry", 0),
];

/// Axis label for each level, lowest first.
const LEVEL_LABELS: [&str; 6] = ["sad", "anxious", "neutral", "calm", "content", "happy"];

pub const NEUTRAL_LEVEL: u8 = 2;

const CHART_SIZE: (u32, u32) = (1000, 500);

/// Numeric level for a tone.
pub fn mood_level(tone: &str) -> u8 {
    let tone = tone.trim().to_lowercase();
    TONE_LEVELS
        .iter()
        .find(|(name, _)| *name == tone)
        .map(|(_, level)| *level)
        .unwrap_or(NEUTRAL_LEVEL)
}

/// Axis label for a level, if it is on the scale.
pub fn level_label(level: i32) -> Option<&'static str> {
    usize::try_from(level)
        .ok()
        .and_then(|i| LEVEL_LABELS.get(i))
        .copied()
}

/// A single plotted point.
#[derive(Debug, Clone, PartialEq)]
pub struct MoodPoint {
    pub timestamp: DateTime<Local>,
    pub tone: String,
    pub level: u8,
}

/// Convert entries to points in timestamp order.
pub fn plot_points(entries: &[JournalEntry]) -> Vec<MoodPoint> {
    let mut points: Vec<MoodPoint> = entries
        .iter()
        .map(|e| MoodPoint {
            timestamp: e.timestamp,
            tone: e.tone.to_lowercase(),
            level: mood_level(&e.tone),
        })
        .collect();
    points.sort_by_key(|p| p.timestamp);
    points
}

/// Render the journal at `store_path` to an SVG at `output_path`.
pub async fn render(
    store_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> Result<PathBuf, ChartError> {
    let store = JournalStore::open(store_path.as_ref());
    let report = store.load_lenient().await?;
    if !report.skipped.is_empty() {
        tracing::warn!(skipped = report.skipped.len(), "some journal records were left off the chart");
    }

    let points = plot_points(&report.entries);
    let output = output_path.as_ref().to_path_buf();
    draw_chart(&points, &output)?;

    tracing::info!(points = points.len(), path = %output.display(), "mood chart rendered");
    Ok(output)
}

/// Draw points as a connected line with markers.
pub fn draw_chart(points: &[MoodPoint], output: &Path) -> Result<(), ChartError> {
    if points.is_empty() {
        return Err(ChartError::Empty);
    }

    let series: Vec<(f64, i32)> = points
        .iter()
        .map(|p| (p.timestamp.timestamp() as f64, i32::from(p.level)))
        .collect();

    let (mut min_x, mut max_x) = series
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), (x, _)| (lo.min(*x), hi.max(*x)));
    if max_x - min_x < 1.0 {
        min_x -= 3600.0;
        max_x += 3600.0;
    }
    let pad = (max_x - min_x) / 20.0;

    let root = SVGBackend::new(output, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Mood Over Time", ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(90)
        .build_cartesian_2d((min_x - pad)..(max_x + pad), -1i32..6i32)
        .map_err(render_error)?;

    chart
        .configure_mesh()
        .x_desc("Date")
        .y_desc("Mood")
        .x_labels(6)
        .x_label_formatter(&format_timestamp)
        .y_labels(8)
        .y_label_formatter(&|level: &i32| level_label(*level).unwrap_or_default().to_string())
        .draw()
        .map_err(render_error)?;

    chart
        .draw_series(LineSeries::new(series.iter().copied(), &BLUE))
        .map_err(render_error)?;
    chart
        .draw_series(
            series
                .iter()
                .map(|&(x, y)| Circle::new((x, y), 4, BLUE.filled())),
        )
        .map_err(render_error)?;

    root.present().map_err(render_error)?;
    Ok(())
}

fn format_timestamp(secs: &f64) -> String {
    DateTime::from_timestamp(*secs as i64, 0)
        .map(|ts| ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn render_error(e: impl std::fmt::Display) -> ChartError {
    ChartError::Render(e.to_string())
}
