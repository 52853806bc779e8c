//! Status bar widget.

use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::ui::app::ConnectivitySummary;

/// Render the status bar
pub fn render_status_bar(
    frame: &mut Frame,
    area: Rect,
    summary: ConnectivitySummary,
    page: (usize, usize),
    username: Option<&str>,
    status_message: Option<&str>,
    error_message: Option<&str>,
) {
    let mut spans = vec![
        Span::styled(
            format!("{} online", summary.online),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" · "),
        Span::styled(
            format!("{} offline", summary.offline),
            Style::default().fg(if summary.offline > 0 { Color::Red } else { Color::DarkGray }),
        ),
    ];

    if summary.unknown > 0 {
        spans.push(Span::raw(" · "));
        spans.push(Span::styled(
            format!("{} connecting", summary.unknown),
            Style::default().fg(Color::Yellow),
        ));
    }

    spans.push(Span::raw(" │ "));
    spans.push(Span::raw(format!("Page {}/{}", page.0 + 1, page.1)));

    if let Some(user) = username {
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(user.to_string(), Style::default().fg(Color::Cyan)));
    }

    // Error message takes priority
    if let Some(error) = error_message {
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(
            format!("ERROR: {}", error),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    } else if let Some(status) = status_message {
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(status, Style::default().fg(Color::Gray)));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let paragraph = Paragraph::new(Line::from(spans)).block(block);
    frame.render_widget(paragraph, area);
}
