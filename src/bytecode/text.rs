//! Line-oriented text form of a [`Program`].
//!
//! One instruction per line: the mnemonic, a single space, then the operand.
//! Integer and text operands are written bare; operand-less instructions
//! write an empty operand, so `POP` is stored as `"POP "`. The loader splits
//! each line on its first space, which lets text operands contain spaces.

use std::fmt::Write as _;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::bytecode::ir::Program;
use crate::bytecode::op::{Instruction, OperandKind, Opcode, Operand};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("line {line}: unknown opcode '{name}'")]
    UnknownOpcode { line: usize, name: String },

    #[error("line {line}: invalid integer operand '{text}'")]
    InvalidInteger { line: usize, text: String },

    #[error("program does not start with an ARG_COUNT header")]
    MissingHeader,

    #[error("cannot read bytecode: {0}")]
    Io(#[from] std::io::Error),
}

pub fn to_text(program: &Program) -> String {
    let mut out = String::new();
    for instruction in &program.instructions {
        let _ = match &instruction.operand {
            Operand::None => writeln!(out, "{} ", instruction.opcode),
            Operand::Int(n) => writeln!(out, "{} {}", instruction.opcode, n),
            Operand::Text(s) => writeln!(out, "{} {}", instruction.opcode, s),
        };
    }
    out
}

pub fn from_text(text: &str) -> Result<Program, LoadError> {
    let mut instructions = Vec::new();

    for (i, raw) in text.lines().enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.is_empty() {
            continue;
        }
        instructions.push(parse_line(i + 1, line)?);
    }

    let program = Program::new(instructions);
    if program.entry_stack_depth().is_none() {
        return Err(LoadError::MissingHeader);
    }
    Ok(program)
}

/// Read and parse a bytecode file.
pub fn read_program(path: &Path) -> Result<Program, LoadError> {
    let text = std::fs::read_to_string(path)?;
    let program = from_text(&text)?;
    debug!(
        path = %path.display(),
        instructions = program.len(),
        "loaded program"
    );
    Ok(program)
}

fn parse_line(line: usize, text: &str) -> Result<Instruction, LoadError> {
    let (name, operand) = text.split_once(' ').unwrap_or((text, ""));
    let opcode = Opcode::from_name(name).ok_or_else(|| LoadError::UnknownOpcode {
        line,
        name: name.to_string(),
    })?;

    let operand = match opcode.operand_kind() {
        OperandKind::None => Operand::None,
        OperandKind::Text => Operand::Text(operand.to_string()),
        OperandKind::Int => {
            let n = operand.parse::<i64>().map_err(|_| LoadError::InvalidInteger {
                line,
                text: operand.to_string(),
            })?;
            Operand::Int(n)
        }
    };
    Ok(Instruction::new(opcode, operand))
}
