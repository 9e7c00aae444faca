//! LC-3 CPU emulation.
//!
//! This module implements the fetch-decode-execute engine:
//! - 65536-word address space with memory-mapped keyboard registers
//! - 8 general-purpose registers, PC and N/Z/P condition flags
//! - 15 executable opcodes plus the reserved one
//! - native trap service routines for console I/O

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;
pub mod trap;
pub mod snapshot;

pub use memory::{Memory, MemoryError, KBDR, KBSR};
pub use registers::{Condition, Reg, Registers, PC_START};
pub use decode::{decode, encode, Instruction, JsrTarget, Opcode, Operand};
pub use execute::{RunState, Vm, VmError};
pub use trap::TrapVector;
pub use snapshot::Snapshot;
