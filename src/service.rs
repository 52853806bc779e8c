//! Service layer tying the registry, live sessions and export together.
//!
//! The dashboard and the headless `watch` mode both drive a [`Monitor`]; the
//! one-shot CLI commands use it for registry edits and exports.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth::AuthGate;
use crate::config::AppConfig;
use crate::error::{Result, ServiceError};
use crate::export::{self, TimeRange};
use crate::registry::{FileStore, KeyValueStore, SensorConfig, StreamRegistry, fixed_catalog};
use crate::session::{Connectivity, PoolChanges, RenderSignal, SessionPool, SessionSettings};
use crate::telemetry::{HttpTelemetryClient, TelemetryClient, TelemetrySnapshot};

/// Result of a CSV export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub path: PathBuf,
    /// Data rows, header excluded
    pub rows: usize,
    /// True when a live session supplied the snapshot
    pub from_live_session: bool,
}

pub struct Monitor {
    config: AppConfig,
    client: Arc<dyn TelemetryClient>,
    store: Arc<dyn KeyValueStore>,
    registry: StreamRegistry,
    pool: SessionPool,
}

impl Monitor {
    pub fn new(
        config: AppConfig,
        client: Arc<dyn TelemetryClient>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let registry = StreamRegistry::load(
            Arc::clone(&store),
            fixed_catalog(&config.service.catalog_host),
        );
        let pool = SessionPool::new(
            Arc::clone(&client),
            SessionSettings::from(&config.service),
        );

        Self {
            config,
            client,
            store,
            registry,
            pool,
        }
    }

    /// Monitor backed by HTTP and the configured storage file
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let client = HttpTelemetryClient::new(config.service.request_timeout())?;
        let store = FileStore::new(config.storage.path.clone());
        debug!(storage = %store.path().display(), "Using storage file");
        Ok(Self::new(config, Arc::new(client), Arc::new(store)))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    pub fn auth(&self) -> AuthGate {
        AuthGate::new(Arc::clone(&self.store), &self.config.auth)
    }

    pub fn add_stream(&mut self, name: &str, stream_uri: &str) -> Result<SensorConfig> {
        Ok(self.registry.add(name, stream_uri)?)
    }

    /// Remove a custom stream and stop its session if one is live
    pub fn remove_stream(&mut self, id: &str) -> Result<SensorConfig> {
        let removed = self.registry.remove(id)?;
        self.pool.stop(id);
        Ok(removed)
    }

    /// Pick up entries added or removed by another process
    pub fn reload_registry(&mut self) {
        self.registry.reload();
    }

    /// Make `visible` the set of live sessions and try to render new ones
    pub fn show(&mut self, visible: &[SensorConfig]) -> PoolChanges {
        let changes = self.pool.sync(visible);
        for id in changes.fresh() {
            self.attempt_render(id);
        }
        changes
    }

    /// Open the stream in the background and report the outcome to the session
    pub fn attempt_render(&self, id: &str) {
        let Some(session) = self.pool.get(id) else {
            return;
        };
        let reporter = session.render_reporter();
        let stream_uri = session.sensor().stream_uri.clone();
        let client = Arc::clone(&self.client);

        tokio::spawn(async move {
            let signal = if client.open_media(&stream_uri).await {
                RenderSignal::Loaded
            } else {
                RenderSignal::Failed
            };
            reporter.report(signal);
        });
    }

    /// Immediate fetch plus a fresh render attempt for one live session
    pub fn refresh(&self, id: &str) -> bool {
        match self.pool.get(id) {
            Some(session) => {
                session.refresh();
                self.attempt_render(id);
                true
            }
            None => false,
        }
    }

    /// Snapshot for export: the live session's, else a one-shot fetch
    pub async fn latest_snapshot(&self, id: &str) -> Result<(Option<TelemetrySnapshot>, bool)> {
        let sensor = self
            .registry
            .get(id)
            .ok_or_else(|| ServiceError::UnknownStream(id.to_string()))?;

        if let Some(snapshot) = self.pool.get(id).and_then(|session| session.view().snapshot) {
            return Ok((Some(snapshot), true));
        }

        Ok((self.client.fetch_snapshot(&sensor.stats_uri).await, false))
    }

    pub async fn export(
        &self,
        id: &str,
        range: TimeRange,
        output_dir: &Path,
        now: DateTime<Utc>,
    ) -> Result<ExportReport> {
        let (snapshot, from_live_session) = self.latest_snapshot(id).await?;
        let name = self
            .registry
            .get(id)
            .map(|sensor| sensor.name.clone())
            .unwrap_or_else(|| id.to_string());

        if snapshot.is_none() {
            warn!(sensor_id = %id, "No telemetry available, exporting header only");
        }

        let csv = export::format_time_series(&name, range, snapshot.as_ref(), now);
        let rows = csv.lines().count().saturating_sub(1);
        let path = export::write_export(output_dir, id, range, &csv, now.date_naive())?;

        info!(sensor_id = %id, range = %range, rows, path = %path.display(), "Export written");
        Ok(ExportReport {
            path,
            rows,
            from_live_session,
        })
    }

    /// Headless mode: keep a session for every stream and log connectivity
    /// changes until SIGINT or SIGTERM
    pub async fn run_watch(&mut self) -> Result<()> {
        let mut signals = Signals::new([SIGTERM, SIGINT])
            .map_err(|e| ServiceError::SignalError(e.to_string()))?;
        let handle = signals.handle();

        let stop = async move {
            if let Some(signal) = signals.next().await {
                info!(signal, "Received shutdown signal");
            }
        };
        let result = self.run_watch_until(stop).await;
        handle.close();
        result
    }

    pub async fn run_watch_until<F>(&mut self, stop: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let sensors = self.registry.entries().to_vec();
        self.pool.sync(&sensors);
        info!(sensors = sensors.len(), "Watching sensors");

        let mut last_seen: HashMap<String, Connectivity> = HashMap::new();
        let mut tick = tokio::time::interval(Duration::from_millis(self.config.dashboard.refresh_ms));
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = tick.tick() => self.log_transitions(&mut last_seen),
            }
        }

        self.shutdown().await;
        info!("Watch stopped");
        Ok(())
    }

    fn log_transitions(&self, last_seen: &mut HashMap<String, Connectivity>) {
        for sensor in self.registry.entries() {
            let Some(session) = self.pool.get(&sensor.id) else {
                continue;
            };
            let view = session.view();
            let previous = last_seen.insert(sensor.id.clone(), view.connectivity);
            if previous == Some(view.connectivity) {
                continue;
            }

            match view.connectivity {
                Connectivity::Offline => warn!(
                    sensor_id = %sensor.id,
                    name = %sensor.name,
                    failures = view.consecutive_failures,
                    "Sensor offline"
                ),
                _ => info!(
                    sensor_id = %sensor.id,
                    name = %sensor.name,
                    connectivity = %view.connectivity,
                    phase = %view.phase,
                    heads = view.snapshot.as_ref().map(|s| s.last_head_count),
                    "Sensor connectivity changed"
                ),
            }
        }
    }

    pub async fn shutdown(&mut self) {
        self.pool.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryStore;
    use crate::telemetry::{MockTelemetryClient, sample_snapshot};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    fn monitor(mock: MockTelemetryClient) -> Monitor {
        let mut config = AppConfig::default();
        config.service.probe_liveness = false;
        Monitor::new(config, Arc::new(mock), Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_export_fetches_once_without_session() {
        let mut mock = MockTelemetryClient::new();
        mock.expect_fetch_snapshot()
            .withf(|uri| uri == "http://10.1.40.46:5003/stats")
            .times(1)
            .returning(|_| Some(sample_snapshot(1000, 40)));
        let monitor = monitor(mock);
        let dir = tempfile::tempdir().unwrap();

        let report = monitor
            .export("gate2_exit", TimeRange::OneDay, dir.path(), now())
            .await
            .unwrap();

        assert_eq!(report.rows, 25);
        assert!(!report.from_live_session);
        assert!(report.path.ends_with("gate2_exit_1day_2025-01-15.csv"));
        let csv = std::fs::read_to_string(&report.path).unwrap();
        assert!(csv.lines().last().unwrap().contains(",Gate 2 Exit,1000,28.40,"));
    }

    #[tokio::test]
    async fn test_export_without_telemetry_is_header_only() {
        let mut mock = MockTelemetryClient::new();
        mock.expect_fetch_snapshot().returning(|_| None);
        let monitor = monitor(mock);
        let dir = tempfile::tempdir().unwrap();

        let report = monitor
            .export("gate_02_entry", TimeRange::SixMonths, dir.path(), now())
            .await
            .unwrap();
        assert_eq!(report.rows, 0);
    }

    #[tokio::test]
    async fn test_export_unknown_stream_fails() {
        let monitor = monitor(MockTelemetryClient::new());
        let dir = tempfile::tempdir().unwrap();
        let result = monitor
            .export("custom_42", TimeRange::OneDay, dir.path(), now())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_prefers_live_snapshot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut mock = MockTelemetryClient::new();
        mock.expect_fetch_snapshot().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(sample_snapshot(500, 5))
        });
        mock.expect_open_media().returning(|_| true);
        let mut monitor = monitor(mock);

        let visible = monitor.registry().page(0, 1).to_vec();
        let changes = monitor.show(&visible);
        assert_eq!(changes.started, vec!["gate_02_entry".to_string()]);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let dir = tempfile::tempdir().unwrap();
        let report = monitor
            .export("gate_02_entry", TimeRange::OneDay, dir.path(), now())
            .await
            .unwrap();

        assert!(report.from_live_session);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_stream_stops_its_session() {
        let mut mock = MockTelemetryClient::new();
        mock.expect_fetch_snapshot().returning(|_| None);
        mock.expect_open_media().returning(|_| false);
        let mut monitor = monitor(mock);

        let added = monitor.add_stream("Dock", "http://dock/stream").unwrap();
        monitor.show(std::slice::from_ref(&added));
        assert!(monitor.pool().get(&added.id).is_some());

        monitor.remove_stream(&added.id).unwrap();
        assert!(monitor.pool().get(&added.id).is_none());
        assert!(monitor.registry().get(&added.id).is_none());
        assert!(monitor.remove_stream("gate2_exit").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_runs_until_stopped() {
        let mut mock = MockTelemetryClient::new();
        mock.expect_fetch_snapshot().returning(|_| None);
        let mut monitor = monitor(mock);

        monitor
            .run_watch_until(sleep(Duration::from_secs(5)))
            .await
            .unwrap();

        assert!(monitor.pool().is_empty());
    }
}
