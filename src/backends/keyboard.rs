//! Terminal keyboard fallback via `crossterm`.

use crate::device::KeyboardInput;
use crate::error::{EvtError, EvtResult};
use crate::event::KeyPress;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::{Duration, Instant};

/// Reads single key presses from the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalKeyboard;

impl TerminalKeyboard {
    pub fn new() -> Self {
        TerminalKeyboard
    }
}

/// Raw mode for the lifetime of the guard.
struct RawMode;

impl RawMode {
    fn enable() -> EvtResult<Self> {
        enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Key names as used in key lists: characters as themselves, plus a few named keys.
fn key_name(code: KeyCode) -> Option<String> {
    Some(match code {
        KeyCode::Char(' ') => "space".into(),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "return".into(),
        KeyCode::Esc => "escape".into(),
        KeyCode::Tab => "tab".into(),
        KeyCode::Left => "left".into(),
        KeyCode::Right => "right".into(),
        KeyCode::Up => "up".into(),
        KeyCode::Down => "down".into(),
        _ => return None,
    })
}

impl KeyboardInput for TerminalKeyboard {
    fn get_key(&mut self, keylist: &[String], timeout: Option<Duration>) -> EvtResult<KeyPress> {
        let _raw = RawMode::enable()?;

        // Discard keys typed before the trial started.
        while event::poll(Duration::ZERO)? {
            event::read()?;
        }

        let start = Instant::now();
        loop {
            if let Some(limit) = timeout {
                let remaining = limit.saturating_sub(start.elapsed());
                if remaining.is_zero() || !event::poll(remaining)? {
                    return Ok(KeyPress {
                        key: None,
                        elapsed: limit,
                    });
                }
            }

            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                return Err(EvtError::Keyboard("interrupted".into()));
            }
            if let Some(name) = key_name(key.code) {
                if keylist.is_empty() || keylist.contains(&name) {
                    return Ok(KeyPress {
                        key: Some(name),
                        elapsed: start.elapsed(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_keys() {
        assert_eq!(key_name(KeyCode::Char('3')).as_deref(), Some("3"));
        assert_eq!(key_name(KeyCode::Char(' ')).as_deref(), Some("space"));
        assert_eq!(key_name(KeyCode::Enter).as_deref(), Some("return"));
        assert_eq!(key_name(KeyCode::F(1)), None);
    }
}
