//! UI widgets for the dashboard.

pub mod chart;
pub mod dialog;
pub mod help;
pub mod status_bar;
pub mod stream_card;

pub use chart::render_chart;
pub use dialog::{centered_rect, render_add_dialog, render_confirm_delete, render_export_dialog};
pub use help::render_help;
pub use status_bar::render_status_bar;
pub use stream_card::render_stream_card;
