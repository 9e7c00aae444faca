//! Instruction decoder for the LC-3.
//!
//! Every instruction is one 16-bit word. Bits `[15:12]` select the opcode;
//! the remaining twelve bits are opcode-specific fields:
//!
//! ```text
//!  15  12 11  9 8   6 5 4  3 2  0
//! | ADD  |  DR |  SR1 |0| 00 | SR2 |
//! | ADD  |  DR |  SR1 |1|   imm5   |
//! | BR   | nzp |     PCoffset9     |
//! | JSR  |1|       PCoffset11      |
//! | JSRR |0|00| Base | 000000      |
//! | LDR  |  DR | Base |  offset6   |
//! | TRAP | 0000 |     trapvect8    |
//! ```
//!
//! Decoding never fails: all sixteen opcodes have a variant. Whether an
//! opcode can be executed is decided by the execution unit.

use crate::cpu::registers::Reg;
use crate::word::{field, sign_extend, Word};
use serde::{Deserialize, Serialize};

/// The 4-bit opcode tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Br = 0,
    Add = 1,
    Ld = 2,
    St = 3,
    Jsr = 4,
    And = 5,
    Ldr = 6,
    Str = 7,
    Rti = 8,
    Not = 9,
    Ldi = 10,
    Sti = 11,
    Jmp = 12,
    Res = 13,
    Lea = 14,
    Trap = 15,
}

impl Opcode {
    /// Opcode of a raw instruction word.
    pub fn from_word(word: Word) -> Self {
        match word >> 12 {
            0 => Opcode::Br,
            1 => Opcode::Add,
            2 => Opcode::Ld,
            3 => Opcode::St,
            4 => Opcode::Jsr,
            5 => Opcode::And,
            6 => Opcode::Ldr,
            7 => Opcode::Str,
            8 => Opcode::Rti,
            9 => Opcode::Not,
            10 => Opcode::Ldi,
            11 => Opcode::Sti,
            12 => Opcode::Jmp,
            13 => Opcode::Res,
            14 => Opcode::Lea,
            _ => Opcode::Trap,
        }
    }

    /// The opcode in bits `[15:12]`, rest zero.
    #[inline]
    pub const fn to_word(self) -> Word {
        (self as Word) << 12
    }
}

/// Second source operand of ADD and AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// Register mode (bit 5 clear).
    Reg(Reg),
    /// Immediate mode (bit 5 set), already sign-extended from 5 bits.
    Imm(i16),
}

/// Jump target of JSR/JSRR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsrTarget {
    /// JSR: PC-relative, sign-extended from 11 bits.
    Offset(i16),
    /// JSRR: address held in a base register.
    Base(Reg),
}

/// Decoded LC-3 instruction.
///
/// PC-relative offsets are relative to the already incremented PC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Operate ====================

    /// DR := SR1 + operand
    Add { dr: Reg, sr1: Reg, src2: Operand },

    /// DR := SR1 & operand
    And { dr: Reg, sr1: Reg, src2: Operand },

    /// DR := !SR
    Not { dr: Reg, sr: Reg },

    // ==================== Control ====================

    /// if (nzp & COND) != 0 then PC := PC + offset
    Br { nzp: Word, offset: i16 },

    /// PC := base (RET when base is R7)
    Jmp { base: Reg },

    /// R7 := PC; PC := target
    Jsr { target: JsrTarget },

    /// Return from interrupt; unsupported and executed as a no-op.
    Rti,

    /// Reserved opcode, never executable.
    Reserved,

    /// System call through the trap vector table.
    Trap { vector: u8 },

    // ==================== Data movement ====================

    /// DR := mem[PC + offset]
    Ld { dr: Reg, offset: i16 },

    /// DR := mem[mem[PC + offset]]
    Ldi { dr: Reg, offset: i16 },

    /// DR := mem[base + offset]
    Ldr { dr: Reg, base: Reg, offset: i16 },

    /// DR := PC + offset
    Lea { dr: Reg, offset: i16 },

    /// mem[PC + offset] := SR
    St { sr: Reg, offset: i16 },

    /// mem[mem[PC + offset]] := SR
    Sti { sr: Reg, offset: i16 },

    /// mem[base + offset] := SR
    Str { sr: Reg, base: Reg, offset: i16 },
}

impl Instruction {
    /// The opcode tag of this instruction.
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Add { .. } => Opcode::Add,
            Instruction::And { .. } => Opcode::And,
            Instruction::Not { .. } => Opcode::Not,
            Instruction::Br { .. } => Opcode::Br,
            Instruction::Jmp { .. } => Opcode::Jmp,
            Instruction::Jsr { .. } => Opcode::Jsr,
            Instruction::Rti => Opcode::Rti,
            Instruction::Reserved => Opcode::Res,
            Instruction::Trap { .. } => Opcode::Trap,
            Instruction::Ld { .. } => Opcode::Ld,
            Instruction::Ldi { .. } => Opcode::Ldi,
            Instruction::Ldr { .. } => Opcode::Ldr,
            Instruction::Lea { .. } => Opcode::Lea,
            Instruction::St { .. } => Opcode::St,
            Instruction::Sti { .. } => Opcode::Sti,
            Instruction::Str { .. } => Opcode::Str,
        }
    }
}

/// Bits [11:9]: DR or SR.
#[inline]
fn reg_11_9(word: Word) -> Reg {
    Reg::from_bits(field(word, 11, 9))
}

/// Bits [8:6]: SR1 or BaseR.
#[inline]
fn reg_8_6(word: Word) -> Reg {
    Reg::from_bits(field(word, 8, 6))
}

#[inline]
fn offset(word: Word, bits: u32) -> i16 {
    sign_extend(field(word, bits - 1, 0), bits) as i16
}

fn operand(word: Word) -> Operand {
    if field(word, 5, 5) != 0 {
        Operand::Imm(offset(word, 5))
    } else {
        Operand::Reg(Reg::from_bits(field(word, 2, 0)))
    }
}

/// Decode a raw instruction word.
///
/// Unused bits are not checked.
pub fn decode(word: Word) -> Instruction {
    match Opcode::from_word(word) {
        Opcode::Add => Instruction::Add {
            dr: reg_11_9(word),
            sr1: reg_8_6(word),
            src2: operand(word),
        },
        Opcode::And => Instruction::And {
            dr: reg_11_9(word),
            sr1: reg_8_6(word),
            src2: operand(word),
        },
        Opcode::Not => Instruction::Not { dr: reg_11_9(word), sr: reg_8_6(word) },
        Opcode::Br => Instruction::Br {
            nzp: field(word, 11, 9),
            offset: offset(word, 9),
        },
        Opcode::Jmp => Instruction::Jmp { base: reg_8_6(word) },
        Opcode::Jsr => {
            let target = if field(word, 11, 11) != 0 {
                JsrTarget::Offset(offset(word, 11))
            } else {
                JsrTarget::Base(reg_8_6(word))
            };
            Instruction::Jsr { target }
        }
        Opcode::Rti => Instruction::Rti,
        Opcode::Res => Instruction::Reserved,
        Opcode::Trap => Instruction::Trap { vector: field(word, 7, 0) as u8 },
        Opcode::Ld => Instruction::Ld { dr: reg_11_9(word), offset: offset(word, 9) },
        Opcode::Ldi => Instruction::Ldi { dr: reg_11_9(word), offset: offset(word, 9) },
        Opcode::Ldr => Instruction::Ldr {
            dr: reg_11_9(word),
            base: reg_8_6(word),
            offset: offset(word, 6),
        },
        Opcode::Lea => Instruction::Lea { dr: reg_11_9(word), offset: offset(word, 9) },
        Opcode::St => Instruction::St { sr: reg_11_9(word), offset: offset(word, 9) },
        Opcode::Sti => Instruction::Sti { sr: reg_11_9(word), offset: offset(word, 9) },
        Opcode::Str => Instruction::Str {
            sr: reg_11_9(word),
            base: reg_8_6(word),
            offset: offset(word, 6),
        },
    }
}

/// Low `bits` bits of a signed field.
#[inline]
fn pack(value: i16, bits: u32) -> Word {
    (value as Word) & ((1 << bits) - 1)
}

#[inline]
fn regs(a: Reg, b: Reg) -> Word {
    ((a.index() as Word) << 9) | ((b.index() as Word) << 6)
}

fn pack_operand(src2: Operand) -> Word {
    match src2 {
        Operand::Reg(r) => r.index() as Word,
        Operand::Imm(imm) => (1 << 5) | pack(imm, 5),
    }
}

/// Encode an instruction back to a word.
///
/// Offsets that do not fit their field are truncated to it.
pub fn encode(instr: &Instruction) -> Word {
    let op = instr.opcode().to_word();
    let rest = match *instr {
        Instruction::Add { dr, sr1, src2 } | Instruction::And { dr, sr1, src2 } => {
            regs(dr, sr1) | pack_operand(src2)
        }
        Instruction::Not { dr, sr } => regs(dr, sr) | 0x3F,
        Instruction::Br { nzp, offset } => ((nzp & 0x7) << 9) | pack(offset, 9),
        Instruction::Jmp { base } => (base.index() as Word) << 6,
        Instruction::Jsr { target: JsrTarget::Offset(offset) } => (1 << 11) | pack(offset, 11),
        Instruction::Jsr { target: JsrTarget::Base(base) } => (base.index() as Word) << 6,
        Instruction::Rti | Instruction::Reserved => 0,
        Instruction::Trap { vector } => Word::from(vector),
        Instruction::Ld { dr, offset }
        | Instruction::Ldi { dr, offset }
        | Instruction::Lea { dr, offset } => ((dr.index() as Word) << 9) | pack(offset, 9),
        Instruction::St { sr, offset } | Instruction::Sti { sr, offset } => {
            ((sr.index() as Word) << 9) | pack(offset, 9)
        }
        Instruction::Ldr { dr, base, offset } => regs(dr, base) | pack(offset, 6),
        Instruction::Str { sr, base, offset } => regs(sr, base) | pack(offset, 6),
    };
    op | rest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_from_word() {
        assert_eq!(Opcode::from_word(0x0000), Opcode::Br);
        assert_eq!(Opcode::from_word(0x1FFF), Opcode::Add);
        assert_eq!(Opcode::from_word(0x8000), Opcode::Rti);
        assert_eq!(Opcode::from_word(0xD123), Opcode::Res);
        assert_eq!(Opcode::from_word(0xF025), Opcode::Trap);
        for op in 0..16u16 {
            assert_eq!(Opcode::from_word(op << 12).to_word(), op << 12);
        }
    }

    #[test]
    fn test_decode_add_register() {
        // ADD R2, R3, R4
        let instr = decode(0b0001_010_011_0_00_100);
        assert_eq!(
            instr,
            Instruction::Add { dr: Reg::R2, sr1: Reg::R3, src2: Operand::Reg(Reg::R4) }
        );
    }

    #[test]
    fn test_decode_add_immediate() {
        // ADD R0, R1, #-1
        let instr = decode(0b0001_000_001_1_11111);
        assert_eq!(
            instr,
            Instruction::Add { dr: Reg::R0, sr1: Reg::R1, src2: Operand::Imm(-1) }
        );
    }

    #[test]
    fn test_decode_and_immediate() {
        // AND R0, R1, #3
        let instr = decode(0b0101_000_001_1_00011);
        assert_eq!(
            instr,
            Instruction::And { dr: Reg::R0, sr1: Reg::R1, src2: Operand::Imm(3) }
        );
    }

    #[test]
    fn test_decode_br() {
        // BRnp #-2
        let instr = decode(0b0000_101_111111110);
        assert_eq!(instr, Instruction::Br { nzp: 0b101, offset: -2 });
    }

    #[test]
    fn test_decode_jsr_forms() {
        assert_eq!(
            decode(0b0100_1_11111111111),
            Instruction::Jsr { target: JsrTarget::Offset(-1) }
        );
        assert_eq!(
            decode(0b0100_0_00_101_000000),
            Instruction::Jsr { target: JsrTarget::Base(Reg::R5) }
        );
    }

    #[test]
    fn test_decode_ret() {
        assert_eq!(decode(0xC1C0), Instruction::Jmp { base: Reg::R7 });
    }

    #[test]
    fn test_decode_memory_forms() {
        // LDR R1, R6, #-32
        assert_eq!(
            decode(0b0110_001_110_100000),
            Instruction::Ldr { dr: Reg::R1, base: Reg::R6, offset: -32 }
        );
        // LEA R0, #255
        assert_eq!(
            decode(0b1110_000_011111111),
            Instruction::Lea { dr: Reg::R0, offset: 255 }
        );
        // STI R3, #-256
        assert_eq!(
            decode(0b1011_011_100000000),
            Instruction::Sti { sr: Reg::R3, offset: -256 }
        );
    }

    #[test]
    fn test_decode_trap_and_special() {
        assert_eq!(decode(0xF025), Instruction::Trap { vector: 0x25 });
        assert_eq!(decode(0x8000), Instruction::Rti);
        assert_eq!(decode(0xDFFF), Instruction::Reserved);
    }

    #[test]
    fn test_encode_known_words() {
        assert_eq!(encode(&Instruction::Trap { vector: 0x25 }), 0xF025);
        assert_eq!(encode(&Instruction::Jmp { base: Reg::R7 }), 0xC1C0);
        assert_eq!(
            encode(&Instruction::Add { dr: Reg::R0, sr1: Reg::R1, src2: Operand::Imm(-1) }),
            0x107F
        );
        assert_eq!(encode(&Instruction::Not { dr: Reg::R1, sr: Reg::R2 }), 0x92BF);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let cases = [
            Instruction::Add { dr: Reg::R7, sr1: Reg::R0, src2: Operand::Imm(15) },
            Instruction::And { dr: Reg::R3, sr1: Reg::R3, src2: Operand::Reg(Reg::R6) },
            Instruction::Not { dr: Reg::R4, sr: Reg::R5 },
            Instruction::Br { nzp: 0b010, offset: -256 },
            Instruction::Jsr { target: JsrTarget::Offset(-1024) },
            Instruction::Jsr { target: JsrTarget::Base(Reg::R2) },
            Instruction::Ld { dr: Reg::R1, offset: 100 },
            Instruction::Ldi { dr: Reg::R2, offset: -1 },
            Instruction::Ldr { dr: Reg::R3, base: Reg::R4, offset: 31 },
            Instruction::Lea { dr: Reg::R5, offset: 0 },
            Instruction::St { sr: Reg::R6, offset: 7 },
            Instruction::Sti { sr: Reg::R7, offset: -7 },
            Instruction::Str { sr: Reg::R0, base: Reg::R1, offset: -32 },
            Instruction::Trap { vector: 0x22 },
            Instruction::Rti,
            Instruction::Reserved,
        ];

        for instr in cases {
            assert_eq!(decode(encode(&instr)), instr, "{instr:?}");
        }
    }
}
