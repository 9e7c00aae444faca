//! LC-3 register file.
//!
//! The LC-3 has:
//! - R0..R7: eight 16-bit general-purpose registers (R7 is the link
//!   register by software convention only)
//! - PC: the program counter
//! - COND: the condition flags, exactly one of N, Z, P

use crate::word::{sign_of, Word};
use log::trace;
use serde::{Deserialize, Serialize};

/// Address at which execution starts.
pub const PC_START: Word = 0x3000;

/// Number of general-purpose registers.
pub const NUM_REGS: usize = 8;

/// A general-purpose register index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reg {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}

impl Reg {
    /// All registers in index order.
    pub const ALL: [Reg; NUM_REGS] = [
        Reg::R0,
        Reg::R1,
        Reg::R2,
        Reg::R3,
        Reg::R4,
        Reg::R5,
        Reg::R6,
        Reg::R7,
    ];

    /// Register named by a 3-bit field. Higher bits are ignored.
    #[inline]
    pub fn from_bits(bits: Word) -> Self {
        Self::ALL[(bits & 0x7) as usize]
    }

    /// The 3-bit encoding of this register.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Condition flags.
///
/// The discriminants are the n/z/p bit positions tested by BR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum Condition {
    /// Last result was positive.
    Pos = 0b001,
    /// Last result was zero.
    Zro = 0b010,
    /// Last result was negative.
    Neg = 0b100,
}

impl Condition {
    /// Flag for a freshly written value.
    #[inline]
    pub fn from_value(value: Word) -> Self {
        if value == 0 {
            Condition::Zro
        } else if sign_of(value) {
            Condition::Neg
        } else {
            Condition::Pos
        }
    }

    /// The flag as an n/z/p bit mask.
    #[inline]
    pub const fn bits(self) -> Word {
        self as Word
    }
}

/// The LC-3 register file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registers {
    gpr: [Word; NUM_REGS],
    pc: Word,
    cond: Condition,
}

impl Registers {
    /// Create a register file with zeroed registers and PC at [`PC_START`].
    ///
    /// COND starts at Z, the flag a zero register would produce.
    pub fn new() -> Self {
        Self {
            gpr: [0; NUM_REGS],
            pc: PC_START,
            cond: Condition::Zro,
        }
    }

    #[inline]
    pub fn get(&self, reg: Reg) -> Word {
        self.gpr[reg.index()]
    }

    #[inline]
    pub fn set(&mut self, reg: Reg, value: Word) {
        trace!("Reg: writing {value:#06x} to {reg:?}");
        self.gpr[reg.index()] = value;
    }

    #[inline]
    pub fn pc(&self) -> Word {
        self.pc
    }

    #[inline]
    pub fn set_pc(&mut self, addr: Word) {
        self.pc = addr;
    }

    /// Increment the program counter, wrapping at the top of memory.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> Word {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(1);
        old
    }

    /// PC plus a sign-extended offset.
    #[inline]
    pub fn pc_offset(&self, offset: Word) -> Word {
        self.pc.wrapping_add(offset)
    }

    #[inline]
    pub fn cond(&self) -> Condition {
        self.cond
    }

    /// Recompute COND from the value just written to `reg`.
    pub fn update_flags(&mut self, reg: Reg) {
        self.cond = Condition::from_value(self.get(reg));
    }

    /// All general-purpose registers in index order.
    pub fn gprs(&self) -> [Word; NUM_REGS] {
        self.gpr
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
