pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod op;
pub mod stack_effect;
pub mod text;

pub use ir::Program;
pub use op::{Instruction, Opcode, Operand};
