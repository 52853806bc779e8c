//! Application state management for the TUI.
//!
//! This module manages the dashboard state: which page of streams is shown,
//! the selected card, dialog modes and per-sensor telemetry history.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

use crate::export::TimeRange;
use crate::registry::SensorConfig;
use crate::session::{Connectivity, SessionView};
use crate::telemetry::TelemetrySnapshot;

/// Which screen or dialog receives key presses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    AddStream,
    ConfirmDelete,
    Export,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddField {
    Name,
    Url,
}

/// Input buffer of the "add stream" dialog
#[derive(Debug, Clone)]
pub struct AddForm {
    pub name: String,
    pub url: String,
    pub field: AddField,
}

impl Default for AddForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            field: AddField::Name,
        }
    }
}

impl AddForm {
    pub fn push(&mut self, c: char) {
        self.active_mut().push(c);
    }

    pub fn backspace(&mut self) {
        self.active_mut().pop();
    }

    pub fn next_field(&mut self) {
        self.field = match self.field {
            AddField::Name => AddField::Url,
            AddField::Url => AddField::Name,
        };
    }

    fn active_mut(&mut self) -> &mut String {
        match self.field {
            AddField::Name => &mut self.name,
            AddField::Url => &mut self.url,
        }
    }
}

/// Recent telemetry samples of one sensor
pub struct TelemetryHistory {
    capacity: usize,
    /// Backend timestamps, or receive time when the backend's is unparsable
    pub timestamps: VecDeque<DateTime<Utc>>,
    pub head_counts: VecDeque<f64>,
    pub fps: VecDeque<f64>,
    /// Largest head count seen in one frame
    pub peak_head_count: u32,
    last_frames: Option<u64>,
}

impl TelemetryHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            timestamps: VecDeque::with_capacity(capacity),
            head_counts: VecDeque::with_capacity(capacity),
            fps: VecDeque::with_capacity(capacity),
            peak_head_count: 0,
            last_frames: None,
        }
    }

    /// Record a snapshot unless it is the one recorded last
    pub fn add_snapshot(&mut self, snapshot: &TelemetrySnapshot, received_at: DateTime<Utc>) -> bool {
        if self.last_frames == Some(snapshot.frames_processed) {
            return false;
        }
        self.last_frames = Some(snapshot.frames_processed);

        if self.timestamps.len() >= self.capacity {
            self.timestamps.pop_front();
            self.head_counts.pop_front();
            self.fps.pop_front();
        }
        self.timestamps
            .push_back(snapshot.observed_at().unwrap_or(received_at));
        self.head_counts.push_back(f64::from(snapshot.last_head_count));
        self.fps.push_back(snapshot.average_fps);

        self.peak_head_count = self.peak_head_count.max(snapshot.last_head_count);
        true
    }

    pub fn len(&self) -> usize {
        self.head_counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head_counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
        self.head_counts.clear();
        self.fps.clear();
        self.peak_head_count = 0;
        self.last_frames = None;
    }

    pub fn get_stats(&self) -> HistoryStats {
        let calc_stats = |data: &VecDeque<f64>| {
            if data.is_empty() {
                return (0.0, 0.0, 0.0);
            }
            let sum: f64 = data.iter().sum();
            let avg = sum / data.len() as f64;
            let min = data.iter().copied().fold(f64::INFINITY, f64::min);
            let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (min, max, avg)
        };

        HistoryStats {
            head_count: calc_stats(&self.head_counts),
            fps: calc_stats(&self.fps),
            peak_head_count: self.peak_head_count,
        }
    }
}

/// (min, max, avg) over the history window
pub struct HistoryStats {
    pub head_count: (f64, f64, f64),
    pub fps: (f64, f64, f64),
    pub peak_head_count: u32,
}

/// Connectivity totals for the status bar
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivitySummary {
    pub online: usize,
    pub offline: usize,
    pub unknown: usize,
}

/// Application state
pub struct App {
    pub should_quit: bool,
    pub mode: Mode,
    pub page: usize,
    pub page_size: usize,
    /// Index of the selected card within the current page
    pub selected: usize,
    pub add_form: AddForm,
    pub pending_delete: Option<SensorConfig>,
    pub export_range: TimeRange,
    pub views: HashMap<String, SessionView>,
    pub histories: HashMap<String, TelemetryHistory>,
    pub status_message: Option<String>,
    pub error_message: Option<String>,
    pub username: Option<String>,
    history_len: usize,
}

impl App {
    pub fn new(page_size: usize, history_len: usize, username: Option<String>) -> Self {
        Self {
            should_quit: false,
            mode: Mode::Normal,
            page: 0,
            page_size: page_size.max(1),
            selected: 0,
            add_form: AddForm::default(),
            pending_delete: None,
            export_range: TimeRange::default(),
            views: HashMap::new(),
            histories: HashMap::new(),
            status_message: Some("Dashboard started".to_string()),
            error_message: None,
            username,
            history_len,
        }
    }

    /// Replace the views of the visible sensors and extend their history
    pub fn update_views(&mut self, views: Vec<SessionView>, now: DateTime<Utc>) {
        self.views.clear();
        for view in views {
            if let Some(snapshot) = &view.snapshot {
                self.histories
                    .entry(view.sensor_id.clone())
                    .or_insert_with(|| TelemetryHistory::new(self.history_len))
                    .add_snapshot(snapshot, now);
            }
            self.views.insert(view.sensor_id.clone(), view);
        }
    }

    pub fn summary(&self) -> ConnectivitySummary {
        let mut summary = ConnectivitySummary::default();
        for view in self.views.values() {
            match view.connectivity {
                Connectivity::Online => summary.online += 1,
                Connectivity::Offline => summary.offline += 1,
                Connectivity::Unknown => summary.unknown += 1,
            }
        }
        summary
    }

    /// Move to the next page; false when already on the last one
    pub fn next_page(&mut self, page_count: usize) -> bool {
        if self.page + 1 < page_count {
            self.page += 1;
            self.selected = 0;
            true
        } else {
            false
        }
    }

    pub fn prev_page(&mut self) -> bool {
        if self.page > 0 {
            self.page -= 1;
            self.selected = 0;
            true
        } else {
            false
        }
    }

    /// Keep page and selection valid after the registry changed size
    pub fn clamp(&mut self, page_count: usize, visible: usize) {
        self.page = self.page.min(page_count.saturating_sub(1));
        self.selected = self.selected.min(visible.saturating_sub(1));
    }

    pub fn select_next(&mut self, visible: usize) {
        if visible > 0 {
            self.selected = (self.selected + 1) % visible;
        }
    }

    pub fn select_prev(&mut self, visible: usize) {
        if visible > 0 {
            self.selected = if self.selected == 0 {
                visible - 1
            } else {
                self.selected - 1
            };
        }
    }

    pub fn selected_sensor<'a>(&self, visible: &'a [SensorConfig]) -> Option<&'a SensorConfig> {
        visible.get(self.selected)
    }

    pub fn open_add(&mut self) {
        self.add_form = AddForm::default();
        self.mode = Mode::AddStream;
    }

    /// Ask for confirmation before deleting; fixed streams are refused here
    pub fn request_delete(&mut self, sensor: &SensorConfig) {
        if sensor.is_custom() {
            self.pending_delete = Some(sensor.clone());
            self.mode = Mode::ConfirmDelete;
        } else {
            self.set_error(format!("{} is a built-in stream and cannot be deleted", sensor.name));
        }
    }

    pub fn open_export(&mut self) {
        self.mode = Mode::Export;
    }

    pub fn cycle_export_range(&mut self) {
        self.export_range = self.export_range.next();
    }

    /// Close any dialog and drop its pending input
    pub fn cancel(&mut self) {
        self.mode = Mode::Normal;
        self.pending_delete = None;
    }

    pub fn toggle_help(&mut self) {
        self.mode = match self.mode {
            Mode::Help => Mode::Normal,
            _ => Mode::Help,
        };
    }

    pub fn clear_histories(&mut self) {
        for history in self.histories.values_mut() {
            history.clear();
        }
        self.set_status("History cleared".to_string());
    }

    pub fn set_status(&mut self, message: String) {
        self.status_message = Some(message);
        self.error_message = None;
    }

    pub fn set_error(&mut self, message: String) {
        self.error_message = Some(message);
    }
}
