//! Keeps one live session per visible sensor.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::manager::{SensorSession, SessionSettings};
use crate::registry::SensorConfig;
use crate::telemetry::TelemetryClient;

/// Summary of what a [`SessionPool::sync`] call changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolChanges {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub restarted: Vec<String>,
}

impl PoolChanges {
    /// Ids whose sessions are new and need a render attempt
    pub fn fresh(&self) -> impl Iterator<Item = &String> {
        self.started.iter().chain(self.restarted.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty() && self.restarted.is_empty()
    }
}

pub struct SessionPool {
    client: Arc<dyn TelemetryClient>,
    settings: SessionSettings,
    sessions: HashMap<String, SensorSession>,
}

impl SessionPool {
    pub fn new(client: Arc<dyn TelemetryClient>, settings: SessionSettings) -> Self {
        Self {
            client,
            settings,
            sessions: HashMap::new(),
        }
    }

    /// Make the live sessions match `visible`.
    ///
    /// Sessions for hidden sensors are torn down, sessions whose configuration
    /// changed are replaced, and new sensors get a fresh session.
    pub fn sync(&mut self, visible: &[SensorConfig]) -> PoolChanges {
        let mut changes = PoolChanges::default();

        let hidden: Vec<String> = self
            .sessions
            .keys()
            .filter(|id| !visible.iter().any(|sensor| &sensor.id == *id))
            .cloned()
            .collect();
        for id in hidden {
            if let Some(mut session) = self.sessions.remove(&id) {
                session.teardown();
                changes.stopped.push(id);
            }
        }

        for sensor in visible {
            let unchanged = self
                .sessions
                .get(&sensor.id)
                .map(|session| session.sensor() == sensor);
            match unchanged {
                Some(true) => {}
                Some(false) => {
                    if let Some(mut old) = self.sessions.remove(&sensor.id) {
                        old.teardown();
                    }
                    self.spawn(sensor);
                    changes.restarted.push(sensor.id.clone());
                }
                None => {
                    self.spawn(sensor);
                    changes.started.push(sensor.id.clone());
                }
            }
        }

        if !changes.is_empty() {
            debug!(
                started = changes.started.len(),
                stopped = changes.stopped.len(),
                restarted = changes.restarted.len(),
                live = self.sessions.len(),
                "Session pool synced"
            );
        }
        changes
    }

    fn spawn(&mut self, sensor: &SensorConfig) {
        let session = SensorSession::start(
            sensor.clone(),
            Arc::clone(&self.client),
            self.settings.clone(),
        );
        self.sessions.insert(sensor.id.clone(), session);
    }

    pub fn get(&self, id: &str) -> Option<&SensorSession> {
        self.sessions.get(id)
    }

    /// Tear down one session; false if it was not live
    pub fn stop(&mut self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some(mut session) => session.teardown(),
            None => false,
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.sessions.keys()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn client(&self) -> Arc<dyn TelemetryClient> {
        Arc::clone(&self.client)
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Tear down every session and wait for their tasks
    pub async fn shutdown(&mut self) {
        let sessions: Vec<SensorSession> = self.sessions.drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{MockTelemetryClient, sample_snapshot};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    fn sensor(id: &str, stats: &str) -> SensorConfig {
        SensorConfig {
            id: id.to_string(),
            name: id.to_string(),
            location: "test".to_string(),
            model: "test".to_string(),
            stream_uri: format!("http://{}/stream", stats),
            stats_uri: format!("http://{}/stats", stats),
        }
    }

    fn pool(calls: Arc<AtomicUsize>) -> SessionPool {
        let mut mock = MockTelemetryClient::new();
        mock.expect_fetch_snapshot().returning(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Some(sample_snapshot(1, 1))
        });
        mock.expect_check_liveness().returning(|_| true);
        let settings = SessionSettings {
            probe_liveness: false,
            ..SessionSettings::default()
        };
        SessionPool::new(Arc::new(mock), settings)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_starts_and_stops_sessions() {
        let mut pool = pool(Arc::new(AtomicUsize::new(0)));
        let a = sensor("a", "h1");
        let b = sensor("b", "h2");

        let changes = pool.sync(&[a.clone(), b.clone()]);
        assert_eq!(changes.started, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(pool.len(), 2);

        let changes = pool.sync(&[b.clone()]);
        assert_eq!(changes.stopped, vec!["a".to_string()]);
        assert!(changes.started.is_empty());
        assert!(pool.get("a").is_none());
        assert!(pool.get("b").is_some());

        assert!(pool.sync(&[b]).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_config_replaces_session() {
        let mut pool = pool(Arc::new(AtomicUsize::new(0)));
        pool.sync(&[sensor("a", "old")]);

        let moved = sensor("a", "new");
        let changes = pool.sync(&[moved.clone()]);

        assert_eq!(changes.restarted, vec!["a".to_string()]);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get("a").map(|s| s.sensor().clone()), Some(moved));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_sessions_stop_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pool = pool(calls.clone());
        pool.sync(&[sensor("a", "h1")]);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        pool.sync(&[]);
        sleep(Duration::from_secs(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(pool.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_shutdown() {
        let mut pool = pool(Arc::new(AtomicUsize::new(0)));
        pool.sync(&[sensor("a", "h1"), sensor("b", "h2")]);

        assert!(pool.stop("a"));
        assert!(!pool.stop("a"));

        pool.shutdown().await;
        assert!(pool.is_empty());
    }
}
