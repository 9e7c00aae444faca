//! LC-3 address space.
//!
//! 65536 sixteen-bit words. Addresses are `u16`, so every access is in
//! range by construction. Two addresses are memory-mapped keyboard
//! registers:
//! - KBSR (`0xFE00`): bit 15 set when a key is waiting in KBDR
//! - KBDR (`0xFE02`): code of the last key latched by a KBSR read

use std::io;

use crate::io::Keyboard;
use crate::word::Word;
use log::trace;
use thiserror::Error;

/// Number of words in the address space.
pub const MEMORY_SIZE: usize = 1 << 16;

/// Keyboard status register.
pub const KBSR: Word = 0xFE00;

/// Keyboard data register.
pub const KBDR: Word = 0xFE02;

/// KBSR ready bit.
const KBSR_READY: Word = 1 << 15;

/// The LC-3 address space.
#[derive(Clone)]
pub struct Memory {
    cells: Vec<Word>,
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
        }
    }

    /// Read a word as the CPU sees it.
    ///
    /// Reading KBSR polls `keyboard`; a pending key is latched into KBDR and
    /// the ready bit is raised. Reading KBDR hands out the latched key and
    /// drops the ready bit. Every other address is plain storage.
    pub fn read(&mut self, addr: Word, keyboard: &mut dyn Keyboard) -> io::Result<Word> {
        match addr {
            KBSR => {
                if let Some(key) = keyboard.poll()? {
                    trace!("Mem: key {key:#04x} latched into KBDR");
                    self.cells[KBSR as usize] |= KBSR_READY;
                    self.cells[KBDR as usize] = Word::from(key);
                }
            }
            KBDR => {
                self.cells[KBSR as usize] &= !KBSR_READY;
            }
            _ => {}
        }
        Ok(self.cells[addr as usize])
    }

    /// Read a word without any device side effect.
    #[inline]
    pub fn peek(&self, addr: Word) -> Word {
        self.cells[addr as usize]
    }

    /// Store a word. Device registers are stored like any other cell.
    #[inline]
    pub fn write(&mut self, addr: Word, value: Word) {
        trace!("Mem: writing {value:#06x} to {addr:#06x}");
        self.cells[addr as usize] = value;
    }

    /// Copy `words` into memory starting at `origin`.
    ///
    /// Fails without touching memory if the block would run past the last
    /// address.
    pub fn load(&mut self, origin: Word, words: &[Word]) -> Result<(), MemoryError> {
        let start = origin as usize;
        let available = MEMORY_SIZE - start;
        if words.len() > available {
            return Err(MemoryError::ImageTooLarge {
                origin,
                size: words.len(),
                available,
            });
        }

        self.cells[start..start + words.len()].copy_from_slice(words);
        Ok(())
    }

    /// Dump `count` cells starting at `start`, stopping at the end of memory.
    pub fn dump(&self, start: Word, count: usize) -> Vec<(Word, Word)> {
        let start = start as usize;
        let end = (start + count).min(MEMORY_SIZE);
        (start..end)
            .map(|i| (i as Word, self.cells[i]))
            .collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("image of {size} words at {origin:#06x} exceeds the {available} words left in memory")]
    ImageTooLarge { origin: Word, size: usize, available: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::BufferedKeyboard;

    #[test]
    fn test_memory_read_write() {
        let mut mem = Memory::new();
        let mut kbd = BufferedKeyboard::new();

        mem.write(0x3000, 42);
        assert_eq!(mem.read(0x3000, &mut kbd).unwrap(), 42);
        assert_eq!(mem.peek(0x3000), 42);
    }

    #[test]
    fn test_memory_edges() {
        let mut mem = Memory::new();
        let mut kbd = BufferedKeyboard::new();

        mem.write(0xFFFF, 0xBEEF);
        mem.write(0x0000, 0x1234);
        assert_eq!(mem.read(0xFFFF, &mut kbd).unwrap(), 0xBEEF);
        assert_eq!(mem.read(0x0000, &mut kbd).unwrap(), 0x1234);
    }

    #[test]
    fn test_kbsr_without_input() {
        let mut mem = Memory::new();
        let mut kbd = BufferedKeyboard::new();

        assert_eq!(mem.read(KBSR, &mut kbd).unwrap(), 0);
        assert_eq!(mem.peek(KBDR), 0);
    }

    #[test]
    fn test_kbsr_latches_key() {
        let mut mem = Memory::new();
        let mut kbd = BufferedKeyboard::with_input(b"q");

        let status = mem.read(KBSR, &mut kbd).unwrap();
        assert_ne!(status & 0x8000, 0);
        assert_eq!(mem.peek(KBDR), b'q' as Word);

        // Consuming KBDR drops the ready bit.
        assert_eq!(mem.read(KBDR, &mut kbd).unwrap(), b'q' as Word);
        assert_eq!(mem.read(KBSR, &mut kbd).unwrap() & 0x8000, 0);
    }

    #[test]
    fn test_kbsr_repoll_takes_next_key() {
        let mut mem = Memory::new();
        let mut kbd = BufferedKeyboard::with_input(b"ab");

        mem.read(KBSR, &mut kbd).unwrap();
        mem.read(KBSR, &mut kbd).unwrap();
        assert_eq!(mem.read(KBDR, &mut kbd).unwrap(), b'b' as Word);
    }

    #[test]
    fn test_ready_bit_survives_unrelated_reads() {
        let mut mem = Memory::new();
        let mut kbd = BufferedKeyboard::with_input(b"z");

        mem.read(KBSR, &mut kbd).unwrap();
        mem.read(0x3000, &mut kbd).unwrap();
        assert_ne!(mem.read(KBSR, &mut kbd).unwrap() & 0x8000, 0);
    }

    #[test]
    fn test_device_writes_are_plain_stores() {
        let mut mem = Memory::new();
        mem.write(KBSR, 0x1234);
        mem.write(KBDR, 0x0041);
        assert_eq!(mem.peek(KBSR), 0x1234);
        assert_eq!(mem.peek(KBDR), 0x0041);
    }

    #[test]
    fn test_load() {
        let mut mem = Memory::new();
        mem.load(0x3000, &[1, 2, 3]).unwrap();

        assert_eq!(mem.peek(0x3000), 1);
        assert_eq!(mem.peek(0x3001), 2);
        assert_eq!(mem.peek(0x3002), 3);
    }

    #[test]
    fn test_load_up_to_last_address() {
        let mut mem = Memory::new();
        mem.load(0xFFFE, &[7, 8]).unwrap();
        assert_eq!(mem.peek(0xFFFF), 8);
    }

    #[test]
    fn test_load_rejects_overflow() {
        let mut mem = Memory::new();
        let err = mem.load(0xFFFE, &[1, 2, 3]).unwrap_err();

        assert_eq!(
            err,
            MemoryError::ImageTooLarge { origin: 0xFFFE, size: 3, available: 2 }
        );
        assert_eq!(mem.peek(0xFFFE), 0);
        assert_eq!(mem.peek(0x0000), 0);
    }

    #[test]
    fn test_dump_stops_at_end() {
        let mut mem = Memory::new();
        mem.write(0xFFFF, 9);
        assert_eq!(mem.dump(0xFFFE, 10), vec![(0xFFFE, 0), (0xFFFF, 9)]);
    }
}
