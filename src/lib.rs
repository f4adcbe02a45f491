//! minilang: a bytecode compiler and stack-machine interpreter for a small
//! dynamically typed language.
//!
//! The pipeline is AST ([`lang::node::Node`]) → [`bytecode::compile::Compiler`]
//! → [`bytecode::Program`] → text form → [`runtime::Interpreter`].

pub mod bytecode;
pub mod lang;
pub mod runtime;

use std::io::Write;

use thiserror::Error;
use tracing::debug;

use crate::bytecode::{Program, disasm::disassemble, text::LoadError};
use crate::lang::value::Value;
use crate::runtime::{Interpreter, InterpreterConfig, Panic};

/// Why running a bytecode file failed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("PANIC: {0}")]
    Panic(#[from] Panic),
}

/// Load text bytecode and execute it, printing to `out`.
pub fn run_bytecode<W: Write>(text: &str, out: W) -> Result<Value, RunError> {
    run_bytecode_with_config(text, out, InterpreterConfig::default())
}

pub fn run_bytecode_with_config<W: Write>(
    text: &str,
    out: W,
    config: InterpreterConfig,
) -> Result<Value, RunError> {
    let program = bytecode::text::from_text(text)?;
    run_program(&program, out, config)
}

/// Execute an already loaded program, printing to `out`.
pub fn run_program<W: Write>(
    program: &Program,
    out: W,
    config: InterpreterConfig,
) -> Result<Value, RunError> {
    debug!("program listing:\n{}", disassemble(program));

    let mut interpreter = Interpreter::with_config(program, out, config);
    Ok(interpreter.run()?)
}
