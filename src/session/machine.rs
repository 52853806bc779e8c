//! Per-sensor connectivity state machine.
//!
//! The machine is synchronous and owns no timers: it consumes events in the
//! order the driver observes them and tells the driver what to do with the
//! poll timer. Once torn down it ignores every further event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::telemetry::TelemetrySnapshot;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Created, no evidence either way yet
    Probing,
    Online,
    /// Online, but recent telemetry fetches failed
    Degraded,
    Offline,
}

/// Connectivity as shown to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Connectivity {
    Unknown,
    Online,
    Offline,
}

/// Outcome of the display layer's latest attempt to render the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RenderState {
    Pending,
    Rendering,
    Failed,
}

/// Load/error signal from the display layer's media element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderSignal {
    Loaded,
    Failed,
}

/// Inputs of the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A telemetry fetch completed; `None` means it failed
    Snapshot(Option<TelemetrySnapshot>),
    /// Result of a stream existence probe
    Liveness(bool),
    Render(RenderSignal),
    /// Operator asked for an immediate retry
    Retry,
}

/// What the driver must do with the recurring poll timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Keep,
    Stop,
    Arm,
}

/// Result of applying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    pub timer: TimerCommand,
    /// False when the event arrived after teardown and was discarded
    pub applied: bool,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Read-only picture of a session for the display layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub sensor_id: String,
    pub phase: Phase,
    pub connectivity: Connectivity,
    pub snapshot: Option<TelemetrySnapshot>,
    pub consecutive_failures: u32,
    pub polling: bool,
    pub recovery_pending: bool,
    pub render: RenderState,
    pub liveness: Option<bool>,
    pub last_success: Option<DateTime<Utc>>,
    pub active: bool,
}

impl SessionView {
    /// View of a session that has not produced any state yet
    pub fn initial(sensor_id: &str) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            phase: Phase::Probing,
            connectivity: Connectivity::Unknown,
            snapshot: None,
            consecutive_failures: 0,
            polling: true,
            recovery_pending: false,
            render: RenderState::Pending,
            liveness: None,
            last_success: None,
            active: true,
        }
    }
}

#[derive(Debug)]
pub struct SessionMachine {
    phase: Phase,
    render: RenderState,
    snapshot: Option<TelemetrySnapshot>,
    consecutive_failures: u32,
    failure_threshold: u32,
    polling: bool,
    liveness: Option<bool>,
    last_success: Option<DateTime<Utc>>,
    active: bool,
}

impl SessionMachine {
    /// A fresh machine in `Probing` with polling armed
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            phase: Phase::Probing,
            render: RenderState::Pending,
            snapshot: None,
            consecutive_failures: 0,
            failure_threshold: failure_threshold.max(1),
            polling: true,
            liveness: None,
            last_success: None,
            active: true,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn connectivity(&self) -> Connectivity {
        match self.phase {
            Phase::Probing => Connectivity::Unknown,
            Phase::Online | Phase::Degraded => Connectivity::Online,
            Phase::Offline => Connectivity::Offline,
        }
    }

    pub fn polling(&self) -> bool {
        self.polling
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn snapshot(&self) -> Option<&TelemetrySnapshot> {
        self.snapshot.as_ref()
    }

    /// Apply one event, stamped with the time it was observed
    pub fn apply(&mut self, event: SessionEvent, now: DateTime<Utc>) -> Transition {
        let from = self.phase;
        if !self.active {
            return Transition {
                from,
                to: from,
                timer: TimerCommand::Keep,
                applied: false,
            };
        }

        let timer = match event {
            SessionEvent::Snapshot(Some(snapshot)) => {
                self.snapshot = Some(snapshot);
                self.last_success = Some(now);
                self.consecutive_failures = 0;
                // A render failure stays visible until the stream renders again.
                self.phase = if self.render == RenderState::Failed {
                    Phase::Offline
                } else {
                    Phase::Online
                };
                self.arm()
            }
            SessionEvent::Snapshot(None) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures >= self.failure_threshold {
                    self.phase = Phase::Offline;
                    self.disarm()
                } else {
                    if self.phase == Phase::Online {
                        self.phase = Phase::Degraded;
                    }
                    TimerCommand::Keep
                }
            }
            SessionEvent::Liveness(reachable) => {
                self.liveness = Some(reachable);
                let recovering = matches!(self.phase, Phase::Probing | Phase::Offline);
                if reachable && recovering && self.render != RenderState::Failed {
                    self.phase = Phase::Online;
                    self.consecutive_failures = 0;
                    self.arm()
                } else {
                    TimerCommand::Keep
                }
            }
            SessionEvent::Render(RenderSignal::Loaded) => {
                self.render = RenderState::Rendering;
                self.phase = Phase::Online;
                self.consecutive_failures = 0;
                self.arm()
            }
            SessionEvent::Render(RenderSignal::Failed) => {
                self.render = RenderState::Failed;
                self.phase = Phase::Offline;
                TimerCommand::Keep
            }
            SessionEvent::Retry => {
                self.consecutive_failures = 0;
                self.arm()
            }
        };

        Transition {
            from,
            to: self.phase,
            timer,
            applied: true,
        }
    }

    /// Mark the machine inactive; returns false if it already was
    pub fn teardown(&mut self) -> bool {
        let was_active = self.active;
        self.active = false;
        self.polling = false;
        was_active
    }

    pub fn view(&self, sensor_id: &str) -> SessionView {
        SessionView {
            sensor_id: sensor_id.to_string(),
            phase: self.phase,
            connectivity: self.connectivity(),
            snapshot: self.snapshot.clone(),
            consecutive_failures: self.consecutive_failures,
            polling: self.polling,
            recovery_pending: false,
            render: self.render,
            liveness: self.liveness,
            last_success: self.last_success,
            active: self.active,
        }
    }

    fn arm(&mut self) -> TimerCommand {
        if self.polling {
            TimerCommand::Keep
        } else {
            self.polling = true;
            TimerCommand::Arm
        }
    }

    fn disarm(&mut self) -> TimerCommand {
        if self.polling {
            self.polling = false;
            TimerCommand::Stop
        } else {
            TimerCommand::Keep
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Probing => "probing",
            Phase::Online => "online",
            Phase::Degraded => "degraded",
            Phase::Offline => "offline",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Connectivity::Unknown => "unknown",
            Connectivity::Online => "online",
            Connectivity::Offline => "offline",
        };
        f.write_str(name)
    }
}
