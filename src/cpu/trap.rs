//! Trap service routines.
//!
//! The LC-3 OS services are emulated natively instead of running OS code
//! out of memory. The low eight bits of a TRAP instruction select one of:
//!
//! | Vector | Name  | Effect                                          |
//! |--------|-------|-------------------------------------------------|
//! | `0x20` | GETC  | R0 := next key, no echo                         |
//! | `0x21` | OUT   | print low byte of R0                            |
//! | `0x22` | PUTS  | print one char per word from mem[R0] up to 0    |
//! | `0x23` | IN    | prompt, R0 := next key, echo it                 |
//! | `0x24` | PUTSP | print two chars per word (low, then high) to 0  |
//! | `0x25` | HALT  | print a notice and stop the machine             |
//!
//! Traps never touch the condition flags.

use std::io::{self, Write};

use crate::cpu::memory::{Memory, MEMORY_SIZE};
use crate::cpu::registers::{Reg, Registers};
use crate::io::Keyboard;
use crate::word::Word;
use log::debug;

/// Prompt printed by the IN trap.
pub const IN_PROMPT: &str = "Enter a character: ";

/// Notice printed by the HALT trap.
pub const HALT_NOTICE: &str = "HALT\n";

/// A known trap vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrapVector {
    Getc = 0x20,
    Out = 0x21,
    Puts = 0x22,
    In = 0x23,
    Putsp = 0x24,
    Halt = 0x25,
}

impl TryFrom<u8> for TrapVector {
    type Error = u8;

    fn try_from(vector: u8) -> Result<Self, u8> {
        match vector {
            0x20 => Ok(TrapVector::Getc),
            0x21 => Ok(TrapVector::Out),
            0x22 => Ok(TrapVector::Puts),
            0x23 => Ok(TrapVector::In),
            0x24 => Ok(TrapVector::Putsp),
            0x25 => Ok(TrapVector::Halt),
            other => Err(other),
        }
    }
}

/// What the run loop should do after a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// Keep executing.
    Continue,
    /// HALT was requested.
    Halt,
    /// The vector has no service routine. Nothing was changed.
    Unknown(u8),
}

/// Machine state a service routine may touch.
pub struct TrapContext<'a> {
    pub regs: &'a mut Registers,
    pub mem: &'a Memory,
    pub keyboard: &'a mut dyn Keyboard,
    pub display: &'a mut dyn Write,
}

/// Run the service routine for `vector`.
pub fn dispatch(vector: u8, ctx: TrapContext<'_>) -> io::Result<TrapOutcome> {
    let Ok(trap) = TrapVector::try_from(vector) else {
        return Ok(TrapOutcome::Unknown(vector));
    };
    debug!("TRAP {trap:?} (R0={:#06x})", ctx.regs.get(Reg::R0));

    let TrapContext { regs, mem, keyboard, display } = ctx;
    match trap {
        TrapVector::Getc => {
            let key = keyboard.read()?;
            regs.set(Reg::R0, Word::from(key));
        }
        TrapVector::Out => {
            display.write_all(&[regs.get(Reg::R0) as u8])?;
            display.flush()?;
        }
        TrapVector::Puts => {
            for word in string_at(mem, regs.get(Reg::R0)) {
                display.write_all(&[word as u8])?;
            }
            display.flush()?;
        }
        TrapVector::In => {
            display.write_all(IN_PROMPT.as_bytes())?;
            display.flush()?;
            let key = keyboard.read()?;
            display.write_all(&[key])?;
            display.flush()?;
            regs.set(Reg::R0, Word::from(key));
        }
        TrapVector::Putsp => {
            for word in string_at(mem, regs.get(Reg::R0)) {
                let [low, high] = word.to_le_bytes();
                display.write_all(&[low])?;
                if high != 0 {
                    display.write_all(&[high])?;
                }
            }
            display.flush()?;
        }
        TrapVector::Halt => {
            display.write_all(HALT_NOTICE.as_bytes())?;
            display.flush()?;
            return Ok(TrapOutcome::Halt);
        }
    }

    Ok(TrapOutcome::Continue)
}

/// Words from `start` up to (not including) the first zero word.
///
/// Wraps at the top of memory and visits each address at most once.
fn string_at(mem: &Memory, start: Word) -> impl Iterator<Item = Word> + '_ {
    (0..MEMORY_SIZE)
        .map(move |i| mem.peek(start.wrapping_add(i as Word)))
        .take_while(|&word| word != 0)
}
