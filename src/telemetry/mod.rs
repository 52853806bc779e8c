//! Telemetry client contract and the snapshot a sensor backend reports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

pub mod http;

pub use http::HttpTelemetryClient;

/// Last known state reported by a sensor's inference backend.
///
/// Field names follow the backend's JSON body
/// (`camera, frames, avg_fps, last_infer_ms, last_head_count, total_heads, utc`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    #[serde(rename = "camera")]
    pub camera_label: String,
    #[serde(rename = "frames")]
    pub frames_processed: u64,
    #[serde(rename = "avg_fps")]
    pub average_fps: f64,
    #[serde(rename = "last_infer_ms")]
    pub last_inference_ms: f64,
    pub last_head_count: u32,
    #[serde(rename = "total_heads")]
    pub total_heads_detected: u64,
    #[serde(rename = "utc")]
    pub observed_at_utc: String,
}

impl TelemetrySnapshot {
    /// Reject bodies that decode but carry impossible rates
    pub fn validate(&self) -> Result<(), TelemetryError> {
        for (field, value) in [
            ("avg_fps", self.average_fps),
            ("last_infer_ms", self.last_inference_ms),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(TelemetryError::InvalidValue { field, value });
            }
        }
        Ok(())
    }

    /// Backend timestamp, when it is RFC 3339
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.observed_at_utc)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Decode and validate a raw telemetry body
    pub fn from_json(body: &[u8]) -> Result<Self, TelemetryError> {
        let snapshot: TelemetrySnapshot = serde_json::from_slice(body)?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// One-shot requests against a sensor's endpoints.
///
/// Implementations never return errors: every failure is reported as absence
/// (`None` / `false`). Retry policy belongs to the session layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetryClient: Send + Sync {
    /// Fetch the current telemetry snapshot from `stats_uri`
    async fn fetch_snapshot(&self, stats_uri: &str) -> Option<TelemetrySnapshot>;

    /// Lightweight existence probe of the stream endpoint (no body transfer)
    async fn check_liveness(&self, stream_uri: &str) -> bool;

    /// Open the stream and wait for its first frame bytes
    async fn open_media(&self, stream_uri: &str) -> bool;
}

#[cfg(test)]
pub(crate) fn sample_snapshot(frames: u64, total_heads: u64) -> TelemetrySnapshot {
    TelemetrySnapshot {
        camera_label: "gate_02_entry".to_string(),
        frames_processed: frames,
        average_fps: 28.4,
        last_inference_ms: 12.5,
        last_head_count: 3,
        total_heads_detected: total_heads,
        observed_at_utc: "2025-01-15T08:30:00Z".to_string(),
    }
}
