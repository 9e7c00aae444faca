//! LC-3 execution engine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use std::io::{self, Write};

use crate::cpu::decode::{self, Instruction, JsrTarget, Operand};
use crate::cpu::memory::{Memory, MemoryError};
use crate::cpu::registers::{Reg, Registers};
use crate::cpu::snapshot::Snapshot;
use crate::cpu::trap::{self, TrapContext, TrapOutcome};
use crate::image::Image;
use crate::io::{BufferedKeyboard, Keyboard};
use crate::word::Word;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How many instructions run between checks for a user interrupt.
pub const INTERRUPT_CHECK_INTERVAL: u64 = 4096;

/// Whether the run loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Fetching and executing.
    Running,
    /// Stopped; `step` refuses to continue.
    Halted,
}

/// The LC-3 virtual machine.
pub struct Vm {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: RunState,
    /// Instructions executed so far.
    pub cycles: u64,
    /// Last executed instruction.
    last_instr: Option<Instruction>,
    /// Halt on unknown trap vectors instead of warning.
    strict_traps: bool,
    keyboard: Box<dyn Keyboard>,
    display: Box<dyn Write>,
}

impl Vm {
    /// Create a VM with no input and discarded output.
    pub fn new() -> Self {
        Self::with_console(BufferedKeyboard::new(), io::sink())
    }

    /// Create a VM attached to a keyboard and a display.
    pub fn with_console(
        keyboard: impl Keyboard + 'static,
        display: impl Write + 'static,
    ) -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            state: RunState::Running,
            cycles: 0,
            last_instr: None,
            strict_traps: false,
            keyboard: Box::new(keyboard),
            display: Box::new(display),
        }
    }

    /// Treat an unknown trap vector as fatal.
    pub fn set_strict_traps(&mut self, strict: bool) {
        self.strict_traps = strict;
    }

    /// Copy `words` into memory at `origin`.
    pub fn load_program(&mut self, origin: Word, words: &[Word]) -> Result<(), MemoryError> {
        self.mem.load(origin, words)
    }

    /// Copy a parsed image into memory at its origin.
    pub fn load_image(&mut self, image: &Image) -> Result<(), MemoryError> {
        debug!(
            "Loading {} words at {:#06x}",
            image.words.len(),
            image.origin
        );
        self.load_program(image.origin, &image.words)
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed. Any error leaves the
    /// machine halted.
    pub fn step(&mut self) -> Result<Instruction, VmError> {
        if self.state != RunState::Running {
            return Err(VmError::NotRunning(self.state));
        }

        match self.fetch_execute() {
            Ok(instr) => {
                self.cycles += 1;
                self.last_instr = Some(instr);
                Ok(instr)
            }
            Err(e) => {
                self.state = RunState::Halted;
                Err(e)
            }
        }
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> Result<u64, VmError> {
        let start_cycles = self.cycles;

        while self.state == RunState::Running {
            self.check_interrupt()?;
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, VmError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == RunState::Running && self.cycles < limit {
            self.check_interrupt()?;
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    fn check_interrupt(&mut self) -> Result<(), VmError> {
        if self.cycles % INTERRUPT_CHECK_INTERVAL != 0 {
            return Ok(());
        }
        if let Err(e) = self.keyboard.check_interrupt() {
            self.state = RunState::Halted;
            return Err(e.into());
        }
        Ok(())
    }

    fn fetch_execute(&mut self) -> Result<Instruction, VmError> {
        // Fetch; the PC is advanced before execution so PC-relative
        // operands see the address of the next instruction.
        let pc = self.regs.advance_pc();
        let raw = self.mem_read(pc)?;

        let instr = decode::decode(raw);
        trace!("PC: {pc:#06x}: {raw:#06x} {instr:?}");

        self.execute(pc, raw, instr)?;
        Ok(instr)
    }

    /// Execute `instr`, decoded from the word `raw` fetched from `pc`.
    fn execute(&mut self, pc: Word, raw: Word, instr: Instruction) -> Result<(), VmError> {
        match instr {
            // ==================== Operate ====================

            Instruction::Add { dr, sr1, src2 } => {
                let value = self.regs.get(sr1).wrapping_add(self.operand(src2));
                self.regs.set(dr, value);
                self.regs.update_flags(dr);
            }

            Instruction::And { dr, sr1, src2 } => {
                let value = self.regs.get(sr1) & self.operand(src2);
                self.regs.set(dr, value);
                self.regs.update_flags(dr);
            }

            Instruction::Not { dr, sr } => {
                let value = !self.regs.get(sr);
                self.regs.set(dr, value);
                self.regs.update_flags(dr);
            }

            // ==================== Control ====================

            Instruction::Br { nzp, offset } => {
                if nzp & self.regs.cond().bits() != 0 {
                    let target = self.regs.pc_offset(offset as Word);
                    self.regs.set_pc(target);
                }
            }

            Instruction::Jmp { base } => {
                let target = self.regs.get(base);
                self.regs.set_pc(target);
            }

            Instruction::Jsr { target } => {
                let ret = self.regs.pc();
                // The base register is read before R7 is overwritten.
                let target = match target {
                    JsrTarget::Offset(offset) => self.regs.pc_offset(offset as Word),
                    JsrTarget::Base(base) => self.regs.get(base),
                };
                self.regs.set(Reg::R7, ret);
                self.regs.set_pc(target);
            }

            Instruction::Rti => {
                debug!("RTI at {pc:#06x} ignored");
            }

            Instruction::Reserved => {
                return Err(VmError::IllegalOpcode { pc, word: raw });
            }

            Instruction::Trap { vector } => {
                // R7 is not written: service routines run natively and
                // return straight to the next instruction.
                let ctx = TrapContext {
                    regs: &mut self.regs,
                    mem: &self.mem,
                    keyboard: self.keyboard.as_mut(),
                    display: self.display.as_mut(),
                };
                match trap::dispatch(vector, ctx)? {
                    TrapOutcome::Continue => {}
                    TrapOutcome::Halt => {
                        debug!("HALT at {pc:#06x} after {} instructions", self.cycles + 1);
                        self.state = RunState::Halted;
                    }
                    TrapOutcome::Unknown(vector) if self.strict_traps => {
                        return Err(VmError::UnknownTrap { pc, vector });
                    }
                    TrapOutcome::Unknown(vector) => {
                        warn!("unknown trap vector {vector:#04x} at {pc:#06x}, continuing");
                    }
                }
            }

            // ==================== Data movement ====================

            Instruction::Ld { dr, offset } => {
                let addr = self.regs.pc_offset(offset as Word);
                let value = self.mem_read(addr)?;
                self.regs.set(dr, value);
                self.regs.update_flags(dr);
            }

            Instruction::Ldi { dr, offset } => {
                let ptr = self.regs.pc_offset(offset as Word);
                let addr = self.mem_read(ptr)?;
                let value = self.mem_read(addr)?;
                self.regs.set(dr, value);
                self.regs.update_flags(dr);
            }

            Instruction::Ldr { dr, base, offset } => {
                let addr = self.regs.get(base).wrapping_add(offset as Word);
                let value = self.mem_read(addr)?;
                self.regs.set(dr, value);
                self.regs.update_flags(dr);
            }

            Instruction::Lea { dr, offset } => {
                let addr = self.regs.pc_offset(offset as Word);
                self.regs.set(dr, addr);
                self.regs.update_flags(dr);
            }

            Instruction::St { sr, offset } => {
                let addr = self.regs.pc_offset(offset as Word);
                self.mem.write(addr, self.regs.get(sr));
            }

            Instruction::Sti { sr, offset } => {
                let ptr = self.regs.pc_offset(offset as Word);
                let addr = self.mem_read(ptr)?;
                self.mem.write(addr, self.regs.get(sr));
            }

            Instruction::Str { sr, base, offset } => {
                let addr = self.regs.get(base).wrapping_add(offset as Word);
                self.mem.write(addr, self.regs.get(sr));
            }
        }

        Ok(())
    }

    /// Value of the second ADD/AND operand.
    fn operand(&self, src2: Operand) -> Word {
        match src2 {
            Operand::Reg(reg) => self.regs.get(reg),
            Operand::Imm(imm) => imm as Word,
        }
    }

    /// Read memory as the CPU does, with device side effects.
    fn mem_read(&mut self, addr: Word) -> io::Result<Word> {
        self.mem.read(addr, self.keyboard.as_mut())
    }

    /// Capture the register file and run state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            registers: self.regs.gprs(),
            pc: self.regs.pc(),
            cond: self.regs.cond(),
            state: self.state,
            cycles: self.cycles,
        }
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the VM is halted.
    pub fn is_halted(&self) -> bool {
        self.state == RunState::Halted
    }

    /// Check if the VM is running.
    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during execution.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("VM not running: {0:?}")]
    NotRunning(RunState),

    #[error("illegal opcode {word:#06x} at {pc:#06x}")]
    IllegalOpcode { pc: Word, word: Word },

    #[error("unknown trap vector {vector:#04x} at {pc:#06x}")]
    UnknownTrap { pc: Word, vector: u8 },

    #[error("interrupted")]
    Interrupted,

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for VmError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::Interrupted => VmError::Interrupted,
            _ => VmError::Io(e),
        }
    }
}
