//! Serializable view of the machine state after (or during) a run.

use crate::cpu::execute::RunState;
use crate::cpu::registers::{Condition, NUM_REGS};
use crate::word::Word;
use serde::{Deserialize, Serialize};

/// Register file and run state at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// R0..R7.
    pub registers: [Word; NUM_REGS],
    pub pc: Word,
    pub cond: Condition,
    pub state: RunState,
    /// Instructions executed.
    pub cycles: u64,
}

impl Snapshot {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
