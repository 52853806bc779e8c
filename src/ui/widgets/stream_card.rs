//! Card showing one stream's connectivity and latest telemetry.

use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::registry::SensorConfig;
use crate::session::{Connectivity, RenderState, SessionView};

fn badge(connectivity: Connectivity) -> (&'static str, Color) {
    match connectivity {
        Connectivity::Online => ("● ONLINE", Color::Green),
        Connectivity::Offline => ("● OFFLINE", Color::Red),
        Connectivity::Unknown => ("● CONNECTING", Color::Yellow),
    }
}

fn label(text: &str) -> Span<'_> {
    Span::styled(text, Style::default().fg(Color::DarkGray))
}

pub fn render_stream_card(
    frame: &mut Frame,
    area: Rect,
    sensor: &SensorConfig,
    view: Option<&SessionView>,
    selected: bool,
) {
    let connectivity = view.map_or(Connectivity::Unknown, |v| v.connectivity);
    let (badge_text, badge_color) = badge(connectivity);

    let border_style = if selected {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(badge_color)
    };
    let title = if selected {
        format!(" ▶ {} ", sensor.name)
    } else {
        format!(" {} ", sensor.name)
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled(badge_text, Style::default().fg(badge_color).add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            label(&sensor.id),
        ]),
        Line::from(label(&sensor.location)),
        Line::from(label(&sensor.model)),
        Line::from(""),
    ];

    match view.and_then(|v| v.snapshot.as_ref()) {
        Some(snapshot) => {
            lines.push(Line::from(vec![
                label("Heads now     "),
                Span::styled(
                    snapshot.last_head_count.to_string(),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ),
            ]));
            lines.push(Line::from(vec![
                label("Total heads   "),
                Span::raw(snapshot.total_heads_detected.to_string()),
            ]));
            lines.push(Line::from(vec![
                label("Frames        "),
                Span::raw(snapshot.frames_processed.to_string()),
            ]));
            lines.push(Line::from(vec![
                label("FPS / infer   "),
                Span::raw(format!(
                    "{:.1} / {:.1} ms",
                    snapshot.average_fps, snapshot.last_inference_ms
                )),
            ]));
            lines.push(Line::from(vec![
                label("Updated       "),
                Span::raw(snapshot.observed_at_utc.clone()),
            ]));
        }
        None => lines.push(Line::from(label("No telemetry yet"))),
    }

    if let Some(view) = view {
        let video = match view.render {
            RenderState::Pending => Span::styled("opening", Style::default().fg(Color::Yellow)),
            RenderState::Rendering => Span::styled("live", Style::default().fg(Color::Green)),
            RenderState::Failed => Span::styled("unavailable", Style::default().fg(Color::Red)),
        };
        lines.push(Line::from(vec![label("Video         "), video]));

        if view.consecutive_failures > 0 {
            let mut note = format!("{} failed fetches", view.consecutive_failures);
            if view.recovery_pending {
                note.push_str(", retry scheduled");
            } else if !view.polling {
                note.push_str(", polling stopped (r to retry)");
            }
            lines.push(Line::from(Span::styled(note, Style::default().fg(Color::Red))));
        }
    }

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style);

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
