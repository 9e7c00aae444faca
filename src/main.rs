//! LC-3 VM - CLI Entry Point
//!
//! `lc3-vm [OPTIONS] <IMAGE>...` loads each object image in order and runs
//! the machine until it halts.
//!
//! Exit codes: 0 on HALT, 1 on a load or runtime error, 2 on a usage
//! error, 130 when interrupted with Ctrl-C.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use lc3::{load_image, Vm, VmError, Word};
use lc3::cpu::PC_START;
use log::{debug, info};

use console::{enter_raw_mode, new_vm};

#[derive(Parser)]
#[command(name = "lc3-vm")]
#[command(version)]
#[command(about = "A virtual machine for the LC-3 16-bit computer")]
struct Cli {
    /// Object images to load, in order
    #[arg(required = true, value_name = "IMAGE")]
    images: Vec<PathBuf>,

    /// Address to start executing at (hex with 0x prefix, or decimal)
    #[arg(long, default_value_t = PC_START, value_parser = parse_address)]
    start: Word,

    /// Stop after this many instructions
    #[arg(short, long)]
    max_cycles: Option<u64>,

    /// Halt on an unknown trap vector instead of warning
    #[arg(long)]
    strict_traps: bool,

    /// Write the final machine state as JSON to this file
    #[arg(long, value_name = "PATH")]
    dump_state: Option<PathBuf>,
}

fn parse_address(s: &str) -> Result<Word, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => Word::from_str_radix(hex, 16),
        None => s.parse::<Word>(),
    };
    parsed.map_err(|e| format!("invalid address '{s}': {e}"))
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    let mut vm = new_vm();
    vm.set_strict_traps(cli.strict_traps);

    if let Err(e) = load_images(&mut vm, &cli.images) {
        eprintln!("{e}");
        return ExitCode::from(1);
    }
    vm.regs.set_pc(cli.start);
    info!("starting at {:#06x}", cli.start);

    let result = {
        let _raw_mode = match enter_raw_mode() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("failed to set up terminal: {e}");
                return ExitCode::from(1);
            }
        };
        match cli.max_cycles {
            Some(max) => vm.run_limited(max),
            None => vm.run(),
        }
    };
    let _ = io::stdout().flush();

    if let Some(path) = &cli.dump_state {
        if let Err(e) = dump_state(&vm, path) {
            eprintln!("failed to write state to {}: {}", path.display(), e);
            return ExitCode::from(1);
        }
    }

    match result {
        Ok(executed) => {
            debug!("executed {executed} instructions");
            if vm.is_running() {
                eprintln!("stopped after {executed} instructions without halting");
            }
            ExitCode::SUCCESS
        }
        Err(VmError::Interrupted) => {
            eprintln!("interrupted at {:#06x}", vm.regs.pc());
            ExitCode::from(130)
        }
        Err(e) => {
            if let VmError::IllegalOpcode { pc, .. } = e {
                log_memory_around(&vm, pc);
            }
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Load each image in order; later images overwrite earlier ones.
fn load_images(vm: &mut Vm, paths: &[PathBuf]) -> Result<(), String> {
    for path in paths {
        load_image(path)
            .map_err(|e| e.to_string())
            .and_then(|image| vm.load_image(&image).map_err(|e| e.to_string()))
            .map_err(|e| format!("failed to load image {}: {}", path.display(), e))?;
    }
    Ok(())
}

fn log_memory_around(vm: &Vm, pc: Word) {
    for (addr, word) in vm.mem.dump(pc.saturating_sub(4), 9) {
        let marker = if addr == pc { ">" } else { " " };
        debug!("{marker} {addr:#06x}: {word:#06x}");
    }
}

fn dump_state(vm: &Vm, path: &Path) -> io::Result<()> {
    let json = vm.snapshot().to_json().map_err(io::Error::other)?;
    std::fs::write(path, json)
}

#[cfg(feature = "terminal")]
mod console {
    use std::io::{self, IsTerminal, Write};

    use lc3::terminal::{RawModeGuard, TerminalDisplay, TerminalKeyboard};
    use lc3::{StreamKeyboard, Vm};

    pub fn new_vm() -> Vm {
        let display: Box<dyn Write> = if io::stdout().is_terminal() {
            Box::new(TerminalDisplay::new())
        } else {
            Box::new(io::stdout())
        };
        if io::stdin().is_terminal() {
            Vm::with_console(TerminalKeyboard::new(), display)
        } else {
            Vm::with_console(StreamKeyboard::new(io::stdin()), display)
        }
    }

    /// Raw mode follows stdin, whatever stdout is.
    pub fn enter_raw_mode() -> io::Result<Option<RawModeGuard>> {
        if io::stdin().is_terminal() {
            RawModeGuard::enter().map(Some)
        } else {
            Ok(None)
        }
    }
}

#[cfg(not(feature = "terminal"))]
mod console {
    use std::io;

    use lc3::{StreamKeyboard, Vm};

    pub fn new_vm() -> Vm {
        Vm::with_console(StreamKeyboard::new(io::stdin()), io::stdout())
    }

    pub fn enter_raw_mode() -> io::Result<Option<()>> {
        Ok(None)
    }
}
