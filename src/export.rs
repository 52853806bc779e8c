//! CSV export of a sensor's telemetry over a time range.
//!
//! Sensors keep no history, so rows are synthesized from the latest snapshot:
//! one row per hour, counters interpolated linearly from zero up to the
//! snapshot's value, rates copied as-is.

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::telemetry::TelemetrySnapshot;

pub const CSV_HEADER: &str = "Timestamp,Camera,Total Frames,Avg FPS,Last Inference (ms),Last Head Count,Total Heads Detected";

/// Shown to the operator with every export
pub const SYNTHETIC_NOTICE: &str =
    "Rows are synthesized from the latest snapshot and are not recorded history";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    #[default]
    OneDay,
    SevenDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
}

impl TimeRange {
    pub const ALL: [TimeRange; 5] = [
        TimeRange::OneDay,
        TimeRange::SevenDays,
        TimeRange::OneMonth,
        TimeRange::ThreeMonths,
        TimeRange::SixMonths,
    ];

    pub fn days(self) -> u32 {
        match self {
            TimeRange::OneDay => 1,
            TimeRange::SevenDays => 7,
            TimeRange::OneMonth => 30,
            TimeRange::ThreeMonths => 90,
            TimeRange::SixMonths => 180,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::OneDay => "1day",
            TimeRange::SevenDays => "7days",
            TimeRange::OneMonth => "1month",
            TimeRange::ThreeMonths => "3months",
            TimeRange::SixMonths => "6months",
        }
    }

    /// Cycle to the next range, wrapping around
    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|r| *r == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeRange::ALL
            .into_iter()
            .find(|range| range.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("Invalid time range: {s}. Valid values: 1day, 7days, 1month, 3months, 6months")
            })
    }
}

/// Render the CSV body; header only when no snapshot is available
pub fn format_time_series(
    camera_name: &str,
    range: TimeRange,
    snapshot: Option<&TelemetrySnapshot>,
    now: DateTime<Utc>,
) -> String {
    let mut rows = vec![CSV_HEADER.to_string()];

    if let Some(snapshot) = snapshot {
        let hours = u64::from(range.days()) * 24;
        let camera = escape_field(camera_name);
        let avg_fps = format!("{:.2}", snapshot.average_fps);
        let last_inference = format!("{:.2}", snapshot.last_inference_ms);

        for i in (0..=hours).rev() {
            let timestamp = now - Duration::hours(i as i64);
            rows.push(format!(
                "{},{},{},{},{},{},{}",
                timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                camera,
                interpolate(snapshot.frames_processed, i, hours),
                avg_fps,
                last_inference,
                snapshot.last_head_count,
                interpolate(snapshot.total_heads_detected, i, hours),
            ));
        }
    }

    rows.join("\n")
}

/// floor(value * (1 - hours_ago / total)) without float rounding
fn interpolate(value: u64, hours_ago: u64, total: u64) -> u64 {
    let scaled = u128::from(value) * u128::from(total - hours_ago) / u128::from(total);
    scaled as u64
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn export_filename(sensor_id: &str, range: TimeRange, date: NaiveDate) -> String {
    format!("{}_{}_{}.csv", sensor_id, range, date.format("%Y-%m-%d"))
}

/// Write `csv` into `dir` under the standard export filename
pub fn write_export(
    dir: &Path,
    sensor_id: &str,
    range: TimeRange,
    csv: &str,
    date: NaiveDate,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_filename(sensor_id, range, date));
    std::fs::write(&path, csv)?;
    Ok(path)
}
