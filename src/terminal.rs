//! Interactive terminal console.
//!
//! Raw mode delivers keys one at a time without echo, but it also turns off
//! signal generation and output post-processing. So:
//! - Ctrl-C arrives as a key event and is reported as
//!   [`io::ErrorKind::Interrupted`]
//! - [`TerminalDisplay`] writes `\r\n` for every `\n`
//! - [`RawModeGuard`] restores the terminal when dropped, including when
//!   unwinding

use std::collections::VecDeque;
use std::io::{self, Stdout, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use log::debug;

use crate::io::Keyboard;

/// Keeps the terminal in raw mode for as long as it lives.
pub struct RawModeGuard(());

impl RawModeGuard {
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        debug!("terminal switched to raw mode");
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Keyboard reading crossterm key events.
#[derive(Default)]
pub struct TerminalKeyboard {
    /// Keys seen while checking for Ctrl-C, not yet handed out.
    pending: VecDeque<u8>,
}

impl TerminalKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one event and queue the key it carries, if any.
    fn pump(&mut self) -> io::Result<()> {
        if let Event::Key(key) = event::read()? {
            if let Some(byte) = key_to_byte(key)? {
                self.pending.push_back(byte);
            }
        }
        Ok(())
    }

    /// Drain every event that is ready right now.
    fn pump_ready(&mut self) -> io::Result<()> {
        while event::poll(Duration::ZERO)? {
            self.pump()?;
        }
        Ok(())
    }
}

impl Keyboard for TerminalKeyboard {
    fn poll(&mut self) -> io::Result<Option<u8>> {
        if self.pending.is_empty() {
            self.pump_ready()?;
        }
        Ok(self.pending.pop_front())
    }

    fn read(&mut self) -> io::Result<u8> {
        loop {
            if let Some(byte) = self.pending.pop_front() {
                return Ok(byte);
            }
            self.pump()?;
        }
    }

    fn check_interrupt(&mut self) -> io::Result<()> {
        self.pump_ready()
    }
}

/// Translate a key event into the byte a line discipline would deliver.
///
/// Releases and keys without a byte form yield `None`; Ctrl-C yields an
/// interrupted error.
fn key_to_byte(key: KeyEvent) -> io::Result<Option<u8>> {
    if key.kind == KeyEventKind::Release {
        return Ok(None);
    }

    let byte = match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "Ctrl-C"));
        }
        KeyCode::Char(ch) if key.modifiers.contains(KeyModifiers::CONTROL) && ch.is_ascii_alphabetic() => {
            (ch.to_ascii_lowercase() as u8) - b'a' + 1
        }
        KeyCode::Char(ch) if ch.is_ascii() => ch as u8,
        KeyCode::Enter => b'\n',
        KeyCode::Tab => b'\t',
        KeyCode::Backspace => 0x08,
        KeyCode::Esc => 0x1B,
        KeyCode::Delete => 0x7F,
        _ => return Ok(None),
    };
    Ok(Some(byte))
}

/// Stdout for a terminal in raw mode.
pub struct TerminalDisplay {
    out: Stdout,
}

impl TerminalDisplay {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for TerminalDisplay {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self.out.lock();
        for chunk in buf.split_inclusive(|&b| b == b'\n') {
            match chunk.split_last() {
                Some((&b'\n', line)) => {
                    out.write_all(line)?;
                    out.write_all(b"\r\n")?;
                }
                _ => out.write_all(chunk)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_plain_keys() {
        assert_eq!(key_to_byte(press(KeyCode::Char('a'), KeyModifiers::NONE)).unwrap(), Some(b'a'));
        assert_eq!(key_to_byte(press(KeyCode::Char('Z'), KeyModifiers::SHIFT)).unwrap(), Some(b'Z'));
        assert_eq!(key_to_byte(press(KeyCode::Enter, KeyModifiers::NONE)).unwrap(), Some(b'\n'));
        assert_eq!(key_to_byte(press(KeyCode::Backspace, KeyModifiers::NONE)).unwrap(), Some(0x08));
        assert_eq!(key_to_byte(press(KeyCode::Esc, KeyModifiers::NONE)).unwrap(), Some(0x1B));
    }

    #[test]
    fn test_unmapped_keys() {
        assert_eq!(key_to_byte(press(KeyCode::F(1), KeyModifiers::NONE)).unwrap(), None);
        assert_eq!(key_to_byte(press(KeyCode::Char('é'), KeyModifiers::NONE)).unwrap(), None);
    }

    #[test]
    fn test_control_keys() {
        assert_eq!(key_to_byte(press(KeyCode::Char('d'), KeyModifiers::CONTROL)).unwrap(), Some(0x04));
        let err = key_to_byte(press(KeyCode::Char('c'), KeyModifiers::CONTROL)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }

    #[test]
    fn test_release_ignored() {
        let mut key = press(KeyCode::Char('a'), KeyModifiers::NONE);
        key.kind = KeyEventKind::Release;
        assert_eq!(key_to_byte(key).unwrap(), None);
    }
}
