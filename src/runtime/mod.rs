pub mod frame;
pub mod interpreter;
pub mod namespace;
pub mod runtime_error;

pub use interpreter::{Interpreter, InterpreterConfig};
pub use runtime_error::{Panic, PanicKind};
