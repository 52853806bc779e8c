//! Input handling for the TUI.
//!
//! Key presses are read on a blocking thread and translated into actions
//! according to the current [`Mode`].

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use super::app::Mode;

/// Actions that can be performed based on user input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Quit,
    NextPage,
    PrevPage,
    SelectNext,
    SelectPrev,
    /// Fetch and re-open the selected stream now
    Refresh,
    ClearHistory,
    OpenAdd,
    DeleteSelected,
    OpenExport,
    ToggleHelp,
    /// Text typed into a dialog
    Char(char),
    Backspace,
    NextField,
    CycleRange,
    Submit,
    Cancel,
    None,
}

/// Wait up to `timeout` for a key press
pub fn handle_input(timeout: Duration) -> std::io::Result<Option<KeyEvent>> {
    if event::poll(timeout)? {
        if let Event::Key(key_event) = event::read()? {
            if key_event.kind == KeyEventKind::Press {
                return Ok(Some(key_event));
            }
        }
    }
    Ok(None)
}

/// Forward key presses to `keys` until `stop` is set or the receiver is gone
pub fn spawn_input_thread(
    keys: mpsc::UnboundedSender<KeyEvent>,
    stop: Arc<AtomicBool>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("dashboard-input".to_string())
        .spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                match handle_input(Duration::from_millis(100)) {
                    Ok(Some(key)) => {
                        if keys.send(key).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "Reading terminal input failed");
                        break;
                    }
                }
            }
        })
}

/// Map a key event to an action for the given mode
pub fn map_key_to_action(mode: Mode, key_event: KeyEvent) -> InputAction {
    if key_event.code == KeyCode::Char('c') && key_event.modifiers.contains(KeyModifiers::CONTROL) {
        return InputAction::Quit;
    }

    match mode {
        Mode::Normal => map_normal(key_event),
        Mode::AddStream => match key_event.code {
            KeyCode::Esc => InputAction::Cancel,
            KeyCode::Enter => InputAction::Submit,
            KeyCode::Tab | KeyCode::BackTab => InputAction::NextField,
            KeyCode::Backspace => InputAction::Backspace,
            KeyCode::Char(c) => InputAction::Char(c),
            _ => InputAction::None,
        },
        Mode::ConfirmDelete => match key_event.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => InputAction::Submit,
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => InputAction::Cancel,
            _ => InputAction::None,
        },
        Mode::Export => match key_event.code {
            KeyCode::Enter => InputAction::Submit,
            KeyCode::Esc => InputAction::Cancel,
            KeyCode::Tab | KeyCode::Left | KeyCode::Right | KeyCode::Char(' ') => {
                InputAction::CycleRange
            }
            _ => InputAction::None,
        },
        Mode::Help => match key_event.code {
            KeyCode::Char('?') | KeyCode::F(1) | KeyCode::Esc | KeyCode::Char('q') => {
                InputAction::ToggleHelp
            }
            _ => InputAction::None,
        },
    }
}

fn map_normal(key_event: KeyEvent) -> InputAction {
    match key_event.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => InputAction::Quit,

        KeyCode::Right | KeyCode::PageDown | KeyCode::Char('n') => InputAction::NextPage,
        KeyCode::Left | KeyCode::PageUp | KeyCode::Char('p') => InputAction::PrevPage,
        KeyCode::Down | KeyCode::Tab | KeyCode::Char('j') => InputAction::SelectNext,
        KeyCode::Up | KeyCode::BackTab | KeyCode::Char('k') => InputAction::SelectPrev,

        KeyCode::Char('r') | KeyCode::Char('R') => InputAction::Refresh,
        KeyCode::Char('c') | KeyCode::Char('C') => InputAction::ClearHistory,

        KeyCode::Char('a') | KeyCode::Char('A') => InputAction::OpenAdd,
        KeyCode::Char('d') | KeyCode::Char('D') | KeyCode::Delete => InputAction::DeleteSelected,
        KeyCode::Char('e') | KeyCode::Char('E') => InputAction::OpenExport,

        KeyCode::Char('?') | KeyCode::Char('h') | KeyCode::F(1) => InputAction::ToggleHelp,

        _ => InputAction::None,
    }
}
