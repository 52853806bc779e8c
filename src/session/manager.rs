//! Live session for one displayed sensor.
//!
//! A [`SensorSession`] owns a tokio task that drives a [`SessionMachine`]:
//! it fetches telemetry on a fixed interval, applies fetch, probe and render
//! outcomes in arrival order, and publishes a [`SessionView`] on a watch
//! channel. Dropping or tearing down the session cancels every timer and
//! in-flight request exactly once.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::machine::{
    Connectivity, RenderSignal, SessionEvent, SessionMachine, SessionView, TimerCommand,
};
use crate::config::ServiceConfig;
use crate::registry::SensorConfig;
use crate::telemetry::{TelemetryClient, TelemetrySnapshot};

/// Timing and retry policy shared by all sessions
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    pub failure_threshold: u32,
    pub request_timeout: Duration,
    pub probe_liveness: bool,
    pub auto_reconnect: bool,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

impl From<&ServiceConfig> for SessionSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            failure_threshold: config.failure_threshold,
            request_timeout: config.request_timeout(),
            probe_liveness: config.probe_liveness,
            auto_reconnect: config.auto_reconnect,
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            max_reconnect_delay: Duration::from_millis(config.max_reconnect_delay_ms),
        }
    }
}

impl SessionSettings {
    /// Backoff before the given recovery attempt (0-based)
    pub fn recovery_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.reconnect_delay
            .saturating_mul(factor)
            .min(self.max_reconnect_delay)
    }
}

#[derive(Debug)]
enum Command {
    Render(RenderSignal),
    Refresh,
}

#[derive(Debug)]
enum Outcome {
    Snapshot(Option<TelemetrySnapshot>),
    Liveness(bool),
}

/// Cloneable sender for the display layer's render signals
#[derive(Debug, Clone)]
pub struct RenderReporter {
    sensor_id: String,
    commands: mpsc::UnboundedSender<Command>,
}

impl RenderReporter {
    pub fn report(&self, signal: RenderSignal) {
        if self.commands.send(Command::Render(signal)).is_err() {
            trace!(sensor_id = %self.sensor_id, ?signal, "Render signal for a closed session dropped");
        }
    }
}

/// Handle to the live session of one sensor
#[derive(Debug)]
pub struct SensorSession {
    sensor: SensorConfig,
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<SessionView>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SensorSession {
    /// Start a session: one immediate fetch (plus an optional liveness probe),
    /// then a recurring poll. Must be called inside a tokio runtime.
    pub fn start(
        sensor: SensorConfig,
        client: Arc<dyn TelemetryClient>,
        settings: SessionSettings,
    ) -> Self {
        let (view_tx, view_rx) = watch::channel(SessionView::initial(&sensor.id));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let driver = SessionDriver {
            machine: SessionMachine::new(settings.failure_threshold),
            sensor: sensor.clone(),
            client,
            settings,
            view_tx,
            commands: command_rx,
            outcomes_tx: outcome_tx,
            outcomes_rx: outcome_rx,
            cancel: cancel.clone(),
            next_poll: None,
            recovery_at: None,
            recovery_attempts: 0,
            fetch_in_flight: false,
        };

        info!(sensor_id = %sensor.id, stats_uri = %sensor.stats_uri, "Session started");
        let task = tokio::spawn(driver.run());

        Self {
            sensor,
            commands: command_tx,
            view: view_rx,
            cancel,
            task: Some(task),
        }
    }

    pub fn sensor(&self) -> &SensorConfig {
        &self.sensor
    }

    pub fn id(&self) -> &str {
        &self.sensor.id
    }

    /// Latest published state
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn connectivity(&self) -> Connectivity {
        self.view.borrow().connectivity
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Feed a media load/error signal from the display layer
    pub fn report_render(&self, signal: RenderSignal) {
        self.render_reporter().report(signal);
    }

    pub fn render_reporter(&self) -> RenderReporter {
        RenderReporter {
            sensor_id: self.sensor.id.clone(),
            commands: self.commands.clone(),
        }
    }

    /// Fetch now and re-arm polling if it had stopped
    pub fn refresh(&self) {
        if self.commands.send(Command::Refresh).is_err() {
            trace!(sensor_id = %self.sensor.id, "Refresh for a closed session dropped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some() && !self.cancel.is_cancelled()
    }

    /// Cancel timers and in-flight requests. Returns false if already torn down.
    pub fn teardown(&mut self) -> bool {
        match self.task.take() {
            Some(_task) => {
                self.cancel.cancel();
                info!(sensor_id = %self.sensor.id, "Session torn down");
                true
            }
            None => false,
        }
    }

    /// Tear down and wait for the driver task to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(sensor_id = %self.sensor.id, error = %e, "Session task ended abnormally");
            }
        }
    }
}

impl Drop for SensorSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct SessionDriver {
    machine: SessionMachine,
    sensor: SensorConfig,
    client: Arc<dyn TelemetryClient>,
    settings: SessionSettings,
    view_tx: watch::Sender<SessionView>,
    commands: mpsc::UnboundedReceiver<Command>,
    outcomes_tx: mpsc::UnboundedSender<Outcome>,
    outcomes_rx: mpsc::UnboundedReceiver<Outcome>,
    cancel: CancellationToken,
    next_poll: Option<Instant>,
    recovery_at: Option<Instant>,
    recovery_attempts: u32,
    fetch_in_flight: bool,
}

impl SessionDriver {
    async fn run(mut self) {
        self.launch_fetch();
        if self.settings.probe_liveness {
            self.launch_liveness();
        }
        self.next_poll = Some(Instant::now() + self.settings.poll_interval);

        loop {
            let poll_deadline = self.next_poll;
            let recovery_deadline = self.recovery_at;

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(outcome) = self.outcomes_rx.recv() => self.on_outcome(outcome),
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                _ = sleep_until(poll_deadline.unwrap_or_else(Instant::now)), if poll_deadline.is_some() => {
                    self.on_poll_due();
                }
                _ = sleep_until(recovery_deadline.unwrap_or_else(Instant::now)), if recovery_deadline.is_some() => {
                    self.on_recovery_due();
                }
            }
        }

        self.next_poll = None;
        self.recovery_at = None;
        self.machine.teardown();
        self.cancel.cancel();
        debug!(sensor_id = %self.sensor.id, "Session driver stopped");
    }

    fn on_outcome(&mut self, outcome: Outcome) {
        let event = match outcome {
            Outcome::Snapshot(snapshot) => {
                self.fetch_in_flight = false;
                SessionEvent::Snapshot(snapshot)
            }
            Outcome::Liveness(reachable) => SessionEvent::Liveness(reachable),
        };
        self.apply(event);
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Render(signal) => self.apply(SessionEvent::Render(signal)),
            Command::Refresh => {
                self.apply(SessionEvent::Retry);
                if !self.fetch_in_flight {
                    self.launch_fetch();
                }
            }
        }
    }

    fn on_poll_due(&mut self) {
        self.next_poll = Some(Instant::now() + self.settings.poll_interval);
        if self.fetch_in_flight {
            trace!(sensor_id = %self.sensor.id, "Previous fetch still in flight, skipping tick");
            return;
        }
        self.launch_fetch();
    }

    fn on_recovery_due(&mut self) {
        self.recovery_at = None;
        self.recovery_attempts = self.recovery_attempts.saturating_add(1);
        debug!(
            sensor_id = %self.sensor.id,
            attempt = self.recovery_attempts,
            "Probing offline sensor"
        );
        if !self.fetch_in_flight {
            self.launch_fetch();
        }
    }

    fn apply(&mut self, event: SessionEvent) {
        if self.cancel.is_cancelled() {
            return;
        }

        let transition = self.machine.apply(event, Utc::now());
        if !transition.applied {
            return;
        }

        match transition.timer {
            TimerCommand::Stop => self.next_poll = None,
            TimerCommand::Arm => {
                self.next_poll = Some(Instant::now() + self.settings.poll_interval);
            }
            TimerCommand::Keep => {}
        }

        if self.machine.polling() {
            self.recovery_at = None;
            self.recovery_attempts = 0;
        } else if self.settings.auto_reconnect
            && self.recovery_at.is_none()
            && !self.fetch_in_flight
        {
            let delay = self.settings.recovery_delay(self.recovery_attempts);
            self.recovery_at = Some(Instant::now() + delay);
        }

        if transition.changed() {
            if self.machine.connectivity() == Connectivity::Offline {
                warn!(
                    sensor_id = %self.sensor.id,
                    from = %transition.from,
                    to = %transition.to,
                    failures = self.machine.consecutive_failures(),
                    "Sensor offline"
                );
            } else {
                info!(
                    sensor_id = %self.sensor.id,
                    from = %transition.from,
                    to = %transition.to,
                    "Sensor state changed"
                );
            }
        }

        self.publish();
    }

    fn publish(&self) {
        if self.cancel.is_cancelled() || !self.machine.is_active() {
            return;
        }
        let mut view = self.machine.view(&self.sensor.id);
        view.recovery_pending = self.recovery_at.is_some();
        self.view_tx.send_replace(view);
    }

    fn launch_fetch(&mut self) {
        self.fetch_in_flight = true;
        let client = Arc::clone(&self.client);
        let uri = self.sensor.stats_uri.clone();
        let timeout = self.settings.request_timeout;
        let outcomes = self.outcomes_tx.clone();
        let cancel = self.cancel.child_token();

        tokio::spawn(async move {
            let snapshot = tokio::select! {
                _ = cancel.cancelled() => return,
                result = tokio::time::timeout(timeout, client.fetch_snapshot(&uri)) => {
                    result.ok().flatten()
                }
            };
            let _ = outcomes.send(Outcome::Snapshot(snapshot));
        });
    }

    fn launch_liveness(&self) {
        let client = Arc::clone(&self.client);
        let uri = self.sensor.stream_uri.clone();
        let timeout = self.settings.request_timeout;
        let outcomes = self.outcomes_tx.clone();
        let cancel = self.cancel.child_token();

        tokio::spawn(async move {
            let reachable = tokio::select! {
                _ = cancel.cancelled() => return,
                result = tokio::time::timeout(timeout, client.check_liveness(&uri)) => {
                    result.unwrap_or(false)
                }
            };
            let _ = outcomes.send(Outcome::Liveness(reachable));
        });
    }
}
