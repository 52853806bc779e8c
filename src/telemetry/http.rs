//! HTTP implementation of the telemetry client.

use super::{TelemetryClient, TelemetrySnapshot};
use crate::error::TelemetryError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Telemetry client over plain HTTP
#[derive(Debug, Clone)]
pub struct HttpTelemetryClient {
    client: reqwest::Client,
}

impl HttpTelemetryClient {
    /// Create a client whose every request is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| TelemetryError::ClientBuild(e.to_string()))?;

        Ok(Self { client })
    }

    async fn try_fetch(&self, stats_uri: &str) -> Result<TelemetrySnapshot, TelemetryError> {
        let response = self.client.get(stats_uri).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        TelemetrySnapshot::from_json(&body)
    }

    async fn try_probe(&self, stream_uri: &str) -> Result<(), TelemetryError> {
        let response = self.client.head(stream_uri).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Status(status.as_u16()));
        }
        Ok(())
    }

    async fn try_first_frame(&self, stream_uri: &str) -> Result<usize, TelemetryError> {
        let mut response = self.client.get(stream_uri).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Status(status.as_u16()));
        }

        // MJPEG bodies never end; the first non-empty chunk is enough.
        while let Some(chunk) = response.chunk().await? {
            if !chunk.is_empty() {
                return Ok(chunk.len());
            }
        }
        Err(TelemetryError::EmptyStream)
    }
}

#[async_trait]
impl TelemetryClient for HttpTelemetryClient {
    async fn fetch_snapshot(&self, stats_uri: &str) -> Option<TelemetrySnapshot> {
        match self.try_fetch(stats_uri).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                debug!(uri = %stats_uri, error = %e, "Telemetry fetch failed");
                None
            }
        }
    }

    async fn check_liveness(&self, stream_uri: &str) -> bool {
        match self.try_probe(stream_uri).await {
            Ok(()) => true,
            Err(e) => {
                debug!(uri = %stream_uri, error = %e, "Liveness probe failed");
                false
            }
        }
    }

    async fn open_media(&self, stream_uri: &str) -> bool {
        match self.try_first_frame(stream_uri).await {
            Ok(bytes) => {
                debug!(uri = %stream_uri, bytes, "Stream delivered first frame");
                true
            }
            Err(e) => {
                debug!(uri = %stream_uri, error = %e, "Stream failed to render");
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    //! Minimal HTTP/1.1 server answering every request with one canned response.

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    pub async fn serve(status_line: &'static str, body: &'static str) -> String {
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
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status_line,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }

    /// Address of a port nothing listens on
    pub async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }
}

#[cfg(test)]
mod tests {
    use super::fixture::{closed_port, serve};
    use super::*;

    const STATS_BODY: &str = r#"{"camera":"gate1","frames":1000,"avg_fps":28.4,"last_infer_ms":11.2,"last_head_count":4,"total_heads":512,"utc":"2025-01-15T08:30:00Z"}"#;

    fn client() -> HttpTelemetryClient {
        HttpTelemetryClient::new(Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_snapshot_success() {
        let base = serve("200 OK", STATS_BODY).await;
        let snapshot = client().fetch_snapshot(&format!("{}/stats", base)).await;

        let snapshot = snapshot.expect("snapshot should decode");
        assert_eq!(snapshot.frames_processed, 1000);
        assert_eq!(snapshot.average_fps, 28.4);
    }

    #[tokio::test]
    async fn test_fetch_snapshot_error_status_is_absent() {
        let base = serve("503 Service Unavailable", STATS_BODY).await;
        assert!(client().fetch_snapshot(&format!("{}/stats", base)).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_snapshot_malformed_body_is_absent() {
        let base = serve("200 OK", "<html>proxy error</html>").await;
        assert!(client().fetch_snapshot(&format!("{}/stats", base)).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_snapshot_unreachable_is_absent() {
        let base = closed_port().await;
        assert!(client().fetch_snapshot(&format!("{}/stats", base)).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_snapshot_invalid_uri_is_absent() {
        assert!(client().fetch_snapshot("/api/stats/5000").await.is_none());
    }

    #[tokio::test]
    async fn test_check_liveness() {
        let up = serve("200 OK", "").await;
        let missing = serve("404 Not Found", "").await;

        assert!(client().check_liveness(&format!("{}/stream", up)).await);
        assert!(!client().check_liveness(&format!("{}/stream", missing)).await);
        assert!(!client().check_liveness(&closed_port().await).await);
    }

    #[tokio::test]
    async fn test_open_media_needs_bytes() {
        let frames = serve("200 OK", "--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG").await;
        let empty = serve("200 OK", "").await;

        assert!(client().open_media(&format!("{}/stream", frames)).await);
        assert!(!client().open_media(&format!("{}/stream", empty)).await);
    }
}
