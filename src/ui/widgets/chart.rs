//! Chart widget for the selected sensor's head-count history.

use crate::ui::app::TelemetryHistory;
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Style},
    symbols,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
};

/// Render head count and average FPS over the recorded samples
pub fn render_chart(
    frame: &mut Frame,
    area: Rect,
    history: Option<&TelemetryHistory>,
    sensor_name: &str,
) {
    let block = Block::default()
        .title(format!(" Head Count History: {} ", sensor_name))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let Some(hist) = history.filter(|h| !h.is_empty()) else {
        let chart = Chart::new(vec![])
            .block(block)
            .x_axis(Axis::default().title("Samples").bounds([0.0, 1.0]))
            .y_axis(Axis::default().title("Heads").bounds([0.0, 10.0]));
        frame.render_widget(chart, area);
        return;
    };

    let heads: Vec<(f64, f64)> = hist
        .head_counts
        .iter()
        .enumerate()
        .map(|(i, y)| (i as f64, *y))
        .collect();
    let fps: Vec<(f64, f64)> = hist
        .fps
        .iter()
        .enumerate()
        .map(|(i, y)| (i as f64, *y))
        .collect();

    let stats = hist.get_stats();
    let y_max = stats.head_count.1.max(stats.fps.1).max(5.0).ceil();

    let datasets = vec![
        Dataset::default()
            .name("Heads in frame")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Green))
            .data(&heads),
        Dataset::default()
            .name("Avg FPS")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Blue))
            .data(&fps),
    ];

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .title(format!("Samples (peak {})", stats.peak_head_count))
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, hist.len().max(2) as f64 - 1.0]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, y_max])
                .labels::<Vec<ratatui::text::Line>>(vec![
                    "0".into(),
                    format!("{:.0}", y_max / 2.0).into(),
                    format!("{:.0}", y_max).into(),
                ]),
        );

    frame.render_widget(chart, area);
}
