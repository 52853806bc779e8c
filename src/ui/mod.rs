//! Terminal UI module using ratatui.
//!
//! This module provides the interactive dashboard: a paged grid of stream
//! cards backed by live sessions, a history chart for the selected stream and
//! dialogs for adding, deleting and exporting streams.

pub mod app;
pub mod input;
pub mod widgets;

pub use app::{App, Mode};
pub use input::{InputAction, handle_input, map_key_to_action};

use chrono::Utc;
use crossterm::event::KeyEvent;
use ratatui::{
    DefaultTerminal, Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::error::{Result, UiError};
use crate::export::SYNTHETIC_NOTICE;
use crate::registry::SensorConfig;
use crate::service::Monitor;
use widgets::{
    centered_rect, render_add_dialog, render_chart, render_confirm_delete, render_export_dialog,
    render_help, render_status_bar, render_stream_card,
};

/// Run the dashboard until the operator quits. The terminal is restored and
/// every session torn down on the way out, also on error.
pub async fn run_dashboard(monitor: &mut Monitor, username: Option<String>) -> Result<()> {
    let mut terminal =
        ratatui::try_init().map_err(|e| UiError::InitializationError(e.to_string()))?;

    let stop = Arc::new(AtomicBool::new(false));
    let (key_tx, key_rx) = mpsc::unbounded_channel();

    let result = match input::spawn_input_thread(key_tx, Arc::clone(&stop)) {
        Ok(_) => event_loop(&mut terminal, monitor, username, key_rx).await,
        Err(e) => Err(UiError::InputError(e.to_string()).into()),
    };

    stop.store(true, Ordering::SeqCst);
    ratatui::restore();
    monitor.shutdown().await;
    info!("Dashboard closed");
    result
}

async fn event_loop(
    terminal: &mut DefaultTerminal,
    monitor: &mut Monitor,
    username: Option<String>,
    mut keys: mpsc::UnboundedReceiver<KeyEvent>,
) -> Result<()> {
    let dashboard = monitor.config().dashboard.clone();
    let mut app = App::new(dashboard.page_size, dashboard.history_len, username);
    sync_page(&mut app, monitor);

    let mut tick = tokio::time::interval(Duration::from_millis(dashboard.refresh_ms));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !app.should_quit {
        let visible = monitor.registry().page(app.page, app.page_size).to_vec();
        let page_count = monitor.registry().page_count(app.page_size);
        let views = visible
            .iter()
            .filter_map(|sensor| monitor.pool().get(&sensor.id).map(|session| session.view()))
            .collect();
        app.update_views(views, Utc::now());

        terminal
            .draw(|frame| draw(frame, &app, &visible, page_count))
            .map_err(|e| UiError::RenderError(e.to_string()))?;

        tokio::select! {
            key = keys.recv() => match key {
                Some(key) => {
                    let action = map_key_to_action(app.mode, key);
                    handle_action(&mut app, monitor, action, &visible).await;
                }
                None => return Err(UiError::InputError("input thread stopped".to_string()).into()),
            },
            _ = tick.tick() => {}
        }
    }

    Ok(())
}

/// Start sessions for the current page and stop the rest
fn sync_page(app: &mut App, monitor: &mut Monitor) {
    let page_count = monitor.registry().page_count(app.page_size);
    app.page = app.page.min(page_count - 1);
    let visible = monitor.registry().page(app.page, app.page_size).to_vec();
    app.clamp(page_count, visible.len());
    monitor.show(&visible);
}

async fn handle_action(
    app: &mut App,
    monitor: &mut Monitor,
    action: InputAction,
    visible: &[SensorConfig],
) {
    let page_count = monitor.registry().page_count(app.page_size);
    let selected = app.selected_sensor(visible).cloned();

    match action {
        InputAction::Quit => app.should_quit = true,
        InputAction::NextPage => {
            if app.next_page(page_count) {
                sync_page(app, monitor);
            }
        }
        InputAction::PrevPage => {
            if app.prev_page() {
                sync_page(app, monitor);
            }
        }
        InputAction::SelectNext => app.select_next(visible.len()),
        InputAction::SelectPrev => app.select_prev(visible.len()),
        InputAction::Refresh => {
            if let Some(sensor) = selected {
                if monitor.refresh(&sensor.id) {
                    app.set_status(format!("Refreshing {}", sensor.name));
                }
            }
        }
        InputAction::ClearHistory => app.clear_histories(),
        InputAction::OpenAdd => app.open_add(),
        InputAction::DeleteSelected => {
            if let Some(sensor) = selected {
                app.request_delete(&sensor);
            }
        }
        InputAction::OpenExport => {
            if selected.is_some() {
                app.open_export();
            }
        }
        InputAction::ToggleHelp => app.toggle_help(),
        InputAction::Char(c) => app.add_form.push(c),
        InputAction::Backspace => app.add_form.backspace(),
        InputAction::NextField => app.add_form.next_field(),
        InputAction::CycleRange => app.cycle_export_range(),
        InputAction::Submit => match app.mode {
            Mode::AddStream => submit_add(app, monitor),
            Mode::ConfirmDelete => submit_delete(app, monitor),
            Mode::Export => {
                if let Some(sensor) = selected {
                    submit_export(app, monitor, &sensor).await;
                }
            }
            Mode::Normal | Mode::Help => {}
        },
        InputAction::Cancel => app.cancel(),
        InputAction::None => {}
    }
}

fn submit_add(app: &mut App, monitor: &mut Monitor) {
    let name = app.add_form.name.clone();
    let url = app.add_form.url.clone();

    match monitor.add_stream(&name, &url) {
        Ok(sensor) => {
            let index = monitor
                .registry()
                .entries()
                .iter()
                .position(|s| s.id == sensor.id)
                .unwrap_or(0);
            app.page = index / app.page_size;
            app.selected = index % app.page_size;
            app.cancel();
            app.set_status(format!("Added {} ({})", sensor.name, sensor.id));
            sync_page(app, monitor);
        }
        // Keep the dialog open so the input can be corrected
        Err(e) => app.set_error(e.to_string()),
    }
}

fn submit_delete(app: &mut App, monitor: &mut Monitor) {
    let Some(sensor) = app.pending_delete.take() else {
        app.cancel();
        return;
    };

    match monitor.remove_stream(&sensor.id) {
        Ok(removed) => {
            app.histories.remove(&removed.id);
            app.set_status(format!("Deleted {}", removed.name));
        }
        Err(e) => app.set_error(e.to_string()),
    }
    app.cancel();
    sync_page(app, monitor);
}

async fn submit_export(app: &mut App, monitor: &mut Monitor, sensor: &SensorConfig) {
    let output_dir = monitor.config().export.output_dir.clone();
    let range = app.export_range;
    app.cancel();

    match monitor.export(&sensor.id, range, &output_dir, Utc::now()).await {
        Ok(report) => app.set_status(format!(
            "Exported {} rows to {} ({})",
            report.rows,
            report.path.display(),
            SYNTHETIC_NOTICE
        )),
        Err(e) => app.set_error(e.to_string()),
    }
}

fn draw(frame: &mut Frame, app: &App, visible: &[SensorConfig], page_count: usize) {
    let area = frame.area();
    let [grid, chart, status] = Layout::vertical([
        Constraint::Min(8),
        Constraint::Length(10),
        Constraint::Length(3),
    ])
    .areas(area);

    render_grid(frame, grid, app, visible);

    let selected = app.selected_sensor(visible);
    render_chart(
        frame,
        chart,
        selected.and_then(|s| app.histories.get(&s.id)),
        selected.map_or("-", |s| s.name.as_str()),
    );

    render_status_bar(
        frame,
        status,
        app.summary(),
        (app.page, page_count),
        app.username.as_deref(),
        app.status_message.as_deref(),
        app.error_message.as_deref(),
    );

    match app.mode {
        Mode::Normal => {}
        Mode::Help => render_help(frame, centered_rect(60, 26, area)),
        Mode::AddStream => render_add_dialog(frame, area, &app.add_form),
        Mode::ConfirmDelete => {
            if let Some(sensor) = &app.pending_delete {
                render_confirm_delete(frame, area, sensor);
            }
        }
        Mode::Export => {
            if let Some(sensor) = selected {
                render_export_dialog(frame, area, sensor, app.export_range);
            }
        }
    }
}

/// Lay cards out in up to three columns
fn render_grid(frame: &mut Frame, area: Rect, app: &App, visible: &[SensorConfig]) {
    if visible.is_empty() {
        let empty = Paragraph::new("No streams configured. Press 'a' to add one.")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(empty, area);
        return;
    }

    let count = visible.len();
    let columns = match count {
        1 => 1,
        2..=4 => 2,
        _ => 3,
    };
    let rows = count.div_ceil(columns);

    let row_areas = Layout::vertical(vec![Constraint::Ratio(1, rows as u32); rows]).split(area);
    for (index, sensor) in visible.iter().enumerate() {
        let row = row_areas[index / columns];
        let cells =
            Layout::horizontal(vec![Constraint::Ratio(1, columns as u32); columns]).split(row);
        render_stream_card(
            frame,
            cells[index % columns],
            sensor,
            app.views.get(&sensor.id),
            index == app.selected,
        );
    }
}
