//! Console capabilities consumed by the VM.
//!
//! The engine needs two things from the outside world:
//! - a [`Keyboard`] that can be polled without blocking (for the KBSR
//!   device register) and read with blocking (for the GETC and IN traps)
//! - a display, which is any [`std::io::Write`] sink
//!
//! Terminal-backed implementations live in [`crate::terminal`]; this module
//! provides the in-memory and stream-backed ones.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, RwLock};

use crossbeam_channel as cbc;

/// Source of keyboard input.
pub trait Keyboard {
    /// Take the next pending key, if any, without blocking.
    fn poll(&mut self) -> io::Result<Option<u8>>;

    /// Block until a key is available and take it.
    fn read(&mut self) -> io::Result<u8>;

    /// Called periodically by the run loop.
    ///
    /// Returns an [`io::ErrorKind::Interrupted`] error when the user asked
    /// to stop the machine.
    fn check_interrupt(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<K: Keyboard + ?Sized> Keyboard for Box<K> {
    fn poll(&mut self) -> io::Result<Option<u8>> {
        (**self).poll()
    }

    fn read(&mut self) -> io::Result<u8> {
        (**self).read()
    }

    fn check_interrupt(&mut self) -> io::Result<()> {
        (**self).check_interrupt()
    }
}

/// Keyboard backed by a shared in-memory buffer.
///
/// Cloning shares the buffer, so a test can keep one handle and push input
/// while the VM owns the other.
#[derive(Debug, Default, Clone)]
pub struct BufferedKeyboard {
    buffer: Arc<RwLock<VecDeque<u8>>>,
}

impl BufferedKeyboard {
    /// Create an empty keyboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a keyboard with some input already queued.
    pub fn with_input(input: &[u8]) -> Self {
        let kbd = Self::new();
        kbd.push_input(input);
        kbd
    }

    /// Queue more input.
    pub fn push_input(&self, input: &[u8]) {
        let mut buf = self.buffer.write().unwrap_or_else(|e| e.into_inner());
        buf.extend(input.iter().copied());
    }

    /// Number of keys not yet taken.
    pub fn pending(&self) -> usize {
        self.buffer.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn pop(&self) -> Option<u8> {
        self.buffer.write().unwrap_or_else(|e| e.into_inner()).pop_front()
    }
}

impl Keyboard for BufferedKeyboard {
    fn poll(&mut self) -> io::Result<Option<u8>> {
        Ok(self.pop())
    }

    fn read(&mut self) -> io::Result<u8> {
        self.pop().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "keyboard buffer is empty")
        })
    }
}

/// Display backed by a shared in-memory buffer.
#[derive(Debug, Default, Clone)]
pub struct BufferedDisplay {
    buffer: Arc<RwLock<Vec<u8>>>,
}

impl BufferedDisplay {
    /// Create an empty display.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Everything written so far, lossily decoded as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    /// Take and clear the output.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buffer.write().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Write for BufferedDisplay {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Keyboard reading from a byte stream, e.g. piped stdin.
///
/// A reader thread pulls bytes off the stream and hands them over a
/// channel, so `poll` never waits on the stream. Once the stream is
/// exhausted no key is ever pending again, and a blocking `read` fails
/// with [`io::ErrorKind::UnexpectedEof`].
pub struct StreamKeyboard {
    keys: cbc::Receiver<io::Result<u8>>,
}

impl StreamKeyboard {
    pub fn new(mut inner: impl Read + Send + 'static) -> Self {
        let (tx, rx) = cbc::bounded(1);

        std::thread::spawn(move || {
            let mut byte = [0u8; 1];
            loop {
                let next = match inner.read(&mut byte) {
                    Ok(0) => return,
                    Ok(_) => Ok(byte[0]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => Err(e),
                };
                let failed = next.is_err();
                let Ok(()) = tx.send(next) else { return };
                if failed {
                    return;
                }
            }
        });

        Self { keys: rx }
    }
}

impl Keyboard for StreamKeyboard {
    fn poll(&mut self) -> io::Result<Option<u8>> {
        match self.keys.try_recv() {
            Ok(key) => key.map(Some),
            Err(cbc::TryRecvError::Empty | cbc::TryRecvError::Disconnected) => Ok(None),
        }
    }

    fn read(&mut self) -> io::Result<u8> {
        match self.keys.recv() {
            Ok(key) => key,
            Err(cbc::RecvError) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "end of input stream",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_keyboard_shares_buffer() {
        let handle = BufferedKeyboard::new();
        let mut kbd = handle.clone();

        assert_eq!(kbd.poll().unwrap(), None);
        handle.push_input(b"ab");
        assert_eq!(handle.pending(), 2);
        assert_eq!(kbd.poll().unwrap(), Some(b'a'));
        assert_eq!(kbd.read().unwrap(), b'b');
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn test_buffered_keyboard_read_empty_is_eof() {
        let mut kbd = BufferedKeyboard::new();
        let err = kbd.read().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_buffered_display() {
        let handle = BufferedDisplay::new();
        let mut display = handle.clone();
        display.write_all(b"Hi").unwrap();
        display.flush().unwrap();

        assert_eq!(handle.text(), "Hi");
        assert_eq!(handle.take(), b"Hi");
        assert!(handle.contents().is_empty());
    }

    #[test]
    fn test_stream_keyboard() {
        let mut kbd = StreamKeyboard::new(&b"xy"[..]);
        assert_eq!(kbd.read().unwrap(), b'x');
        assert_eq!(kbd.read().unwrap(), b'y');
        assert_eq!(kbd.read().unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(kbd.poll().unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_stream_keyboard_poll_does_not_wait_for_input() {
        use std::os::unix::net::UnixStream;
        use std::sync::mpsc;
        use std::time::Duration;

        let (mut writer, reader) = UnixStream::pair().unwrap();
        let mut kbd = StreamKeyboard::new(reader);

        // The writer stays open with nothing written.
        let (done_tx, done_rx) = mpsc::channel();
        std::thread::spawn(move || {
            let polled = kbd.poll().map_err(|e| e.kind());
            let _ = done_tx.send((polled, kbd));
        });
        let (polled, mut kbd) = done_rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(polled, Ok(None));

        writer.write_all(b"k").unwrap();
        assert_eq!(kbd.read().unwrap(), b'k');
        drop(writer);
        assert_eq!(kbd.read().unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }
}
