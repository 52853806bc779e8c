//! End-to-end checks against a local HTTP backend.

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use headcount_monitor::config::AppConfig;
use headcount_monitor::export::{CSV_HEADER, TimeRange};
use headcount_monitor::registry::{MemoryStore, fixed_catalog};
use headcount_monitor::service::Monitor;
use headcount_monitor::session::{Connectivity, SensorSession, SessionSettings};
use headcount_monitor::telemetry::HttpTelemetryClient;

const STATS_BODY: &str = r#"{"camera":"dock","frames":1000,"avg_fps":28.4,"last_infer_ms":11.0,"last_head_count":6,"total_heads":240,"utc":"2025-01-15T12:00:00Z"}"#;

/// Serve `/stats` with a fixed body and every other path with 404
async fn spawn_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let mut read = 0;
                while read < buf.len() {
                    match socket.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => read += n,
                    }
                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let request = String::from_utf8_lossy(&buf[..read]);

                let response = if request.starts_with("GET /stats") {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        STATS_BODY.len(),
                        STATS_BODY
                    )
                } else {
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string()
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

fn client() -> Arc<HttpTelemetryClient> {
    Arc::new(HttpTelemetryClient::new(Duration::from_secs(2)).unwrap())
}

#[tokio::test]
async fn export_one_day_from_live_backend() {
    let base = spawn_backend().await;
    let mut monitor = Monitor::new(AppConfig::default(), client(), Arc::new(MemoryStore::new()));
    let sensor = monitor
        .add_stream("Dock", &format!("{}/stream", base))
        .unwrap();
    assert_eq!(sensor.stats_uri, format!("{}/stats", base));

    let dir = tempfile::tempdir().unwrap();
    let now = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
    let report = monitor
        .export(&sensor.id, TimeRange::OneDay, dir.path(), now)
        .await
        .unwrap();

    assert_eq!(report.rows, 25);
    let csv = std::fs::read_to_string(&report.path).unwrap();
    let lines: Vec<&str> = csv.split('\n').collect();
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(lines.len(), 26);

    let last: Vec<&str> = lines[25].split(',').collect();
    assert_eq!(last[1], "Dock");
    assert_eq!(last[2], "1000");
    assert_eq!(last[3], "28.40");
    assert_eq!(last[6], "240");
}

#[tokio::test]
async fn session_goes_online_against_live_backend() {
    let base = spawn_backend().await;
    let mut sensor = fixed_catalog("http://unused")[0].clone();
    sensor.stream_uri = format!("{}/stream", base);
    sensor.stats_uri = format!("{}/stats", base);

    let settings = SessionSettings {
        poll_interval: Duration::from_millis(50),
        probe_liveness: false,
        ..SessionSettings::default()
    };
    let session = SensorSession::start(sensor, client(), settings);
    let mut views = session.subscribe();

    let view = tokio::time::timeout(
        Duration::from_secs(5),
        views.wait_for(|v| v.connectivity == Connectivity::Online),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();

    assert_eq!(view.snapshot.map(|s| s.last_head_count), Some(6));
    session.shutdown().await;
}

#[tokio::test]
async fn session_goes_offline_when_stats_fail() {
    let base = spawn_backend().await;
    let mut sensor = fixed_catalog("http://unused")[1].clone();
    sensor.stream_uri = format!("{}/stream", base);
    sensor.stats_uri = format!("{}/missing", base);

    let settings = SessionSettings {
        poll_interval: Duration::from_millis(20),
        probe_liveness: false,
        auto_reconnect: false,
        ..SessionSettings::default()
    };
    let session = SensorSession::start(sensor, client(), settings);
    let mut views = session.subscribe();

    let view = tokio::time::timeout(
        Duration::from_secs(5),
        views.wait_for(|v| v.connectivity == Connectivity::Offline),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();

    assert_eq!(view.consecutive_failures, 3);
    assert!(!view.polling);
    session.shutdown().await;
}
