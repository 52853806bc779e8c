//! Modal dialogs: add stream, confirm delete, export.

use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

use crate::export::{SYNTHETIC_NOTICE, TimeRange};
use crate::registry::SensorConfig;
use crate::ui::app::{AddField, AddForm};

/// Rectangle of `width` x `height` cells centered in `area`
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [rect] = Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .areas(row);
    rect
}

fn dialog_block(title: &str, color: Color) -> Block<'_> {
    Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .style(Style::default().bg(Color::Black))
}

fn hint(text: &str) -> Line<'_> {
    Line::from(Span::styled(text, Style::default().fg(Color::DarkGray)))
}

pub fn render_add_dialog(frame: &mut Frame, area: Rect, form: &AddForm) {
    let rect = centered_rect(64, 9, area);
    frame.render_widget(Clear, rect);

    let field = |name: &'static str, value: &str, active: bool| {
        let style = if active {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        let cursor = if active { "▏" } else { "" };
        Line::from(vec![
            Span::styled(format!("{:<12}", name), style),
            Span::raw(format!("{value}{cursor}")),
        ])
    };

    let lines = vec![
        Line::from(""),
        field("Name", &form.name, form.field == AddField::Name),
        field("Stream URL", &form.url, form.field == AddField::Url),
        Line::from(""),
        hint("The stats URL is derived by replacing /stream with /stats"),
        hint("Tab: switch field · Enter: add · Esc: cancel"),
    ];

    frame.render_widget(
        Paragraph::new(lines).block(dialog_block("Add Stream", Color::Cyan)),
        rect,
    );
}

pub fn render_confirm_delete(frame: &mut Frame, area: Rect, sensor: &SensorConfig) {
    let rect = centered_rect(56, 7, area);
    frame.render_widget(Clear, rect);

    let lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::raw("Delete "),
            Span::styled(&sensor.name, Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!(" ({})?", sensor.id)),
        ]),
        Line::from(""),
        hint("y/Enter: delete · n/Esc: cancel"),
    ];

    frame.render_widget(
        Paragraph::new(lines).block(dialog_block("Confirm Delete", Color::Red)),
        rect,
    );
}

pub fn render_export_dialog(frame: &mut Frame, area: Rect, sensor: &SensorConfig, range: TimeRange) {
    let rect = centered_rect(64, 10, area);
    frame.render_widget(Clear, rect);

    let ranges: Vec<Span> = TimeRange::ALL
        .iter()
        .flat_map(|r| {
            let style = if *r == range {
                Style::default().fg(Color::Black).bg(Color::Cyan)
            } else {
                Style::default().fg(Color::Gray)
            };
            [Span::styled(format!(" {} ", r), style), Span::raw(" ")]
        })
        .collect();

    let lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::raw("Export "),
            Span::styled(&sensor.name, Style::default().add_modifier(Modifier::BOLD)),
        ]),
        Line::from(ranges),
        Line::from(""),
        Line::from(Span::styled(SYNTHETIC_NOTICE, Style::default().fg(Color::Yellow))),
        hint("Tab/←/→: range · Enter: export · Esc: cancel"),
    ];

    frame.render_widget(
        Paragraph::new(lines)
            .block(dialog_block("Export CSV", Color::Cyan))
            .wrap(Wrap { trim: true }),
        rect,
    );
}
