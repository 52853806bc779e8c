//! Help panel widget.

use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

fn heading(text: &str) -> Line<'_> {
    Line::from(Span::styled(
        text,
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    ))
}

fn shortcut<'a>(keys: &'a str, description: &'a str) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!("  {:<10}", keys), Style::default().fg(Color::Cyan)),
        Span::raw(description),
    ])
}

/// Render the help panel
pub fn render_help(frame: &mut Frame, area: Rect) {
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title(" Keyboard Shortcuts ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .style(Style::default().bg(Color::Black));

    let help_text = vec![
        Line::from(""),
        heading("Navigation"),
        shortcut("←/→ p/n", "Previous / next page"),
        shortcut("↑/↓ k/j", "Select stream"),
        Line::from(""),
        heading("Streams"),
        shortcut("r", "Refresh selected stream now"),
        shortcut("a", "Add a custom stream"),
        shortcut("d/Del", "Delete selected custom stream"),
        shortcut("e", "Export selected stream as CSV"),
        shortcut("c", "Clear chart history"),
        Line::from(""),
        heading("Status"),
        Line::from(vec![
            Span::styled("  ● ONLINE ", Style::default().fg(Color::Green)),
            Span::raw("telemetry or video is arriving"),
        ]),
        Line::from(vec![
            Span::styled("  ● OFFLINE", Style::default().fg(Color::Red)),
            Span::raw(" repeated failures or video unavailable"),
        ]),
        Line::from(vec![
            Span::styled("  ● CONNECTING", Style::default().fg(Color::Yellow)),
            Span::raw(" no answer yet"),
        ]),
        Line::from(""),
        heading("Other"),
        shortcut("?/h/F1", "Toggle this help"),
        shortcut("q/Esc", "Quit"),
    ];

    let paragraph = Paragraph::new(help_text)
        .block(block)
        .wrap(Wrap { trim: false });

    frame.render_widget(paragraph, area);
}
