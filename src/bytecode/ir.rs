use serde::{Deserialize, Serialize};

use crate::bytecode::op::{Instruction, Opcode};

/// A compiled program: one flat instruction stream shared by every frame.
///
/// Convention: `instructions[0]` is always `ARG_COUNT n`, where `n` is the
/// operand stack depth the entry frame needs. Execution starts at 1.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

impl Program {
    pub const ENTRY: usize = 1;

    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    /// Stack depth recorded in the header, if the header is present.
    pub fn entry_stack_depth(&self) -> Option<usize> {
        let header = self.instructions.first()?;
        if header.opcode != Opcode::ArgCount {
            return None;
        }
        header.int_operand().and_then(|n| usize::try_from(n).ok())
    }

    /// Compact binary form for handing a program to another process.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Program, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
