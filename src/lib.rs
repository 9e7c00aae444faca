//! # LC-3 Virtual Machine
//!
//! A virtual machine for the LC-3, the 16-bit educational computer: 16
//! opcodes, eight general-purpose registers, memory-mapped keyboard I/O and
//! trap-vector console services.
//!
//! Programs are loaded from big-endian object images and run from `0x3000`
//! until they execute `HALT`.

pub mod word;
pub mod cpu;
pub mod io;
pub mod image;

#[cfg(feature = "terminal")]
pub mod terminal;

// Re-export commonly used types
pub use word::{sign_extend, Word};
pub use cpu::{Vm, VmError, RunState, Memory, Registers, Instruction, Snapshot};
pub use io::{Keyboard, BufferedKeyboard, BufferedDisplay, StreamKeyboard};
pub use image::{Image, ImageError, load_image};
