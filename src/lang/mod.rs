//! # minilang language core
//!
//! The AST the compiler consumes and the values the interpreter manipulates.
//!
//! ## Modules
//!
//! - [`node`]: the closed set of AST nodes produced by the parser.
//! - [`operator`]: arithmetic and comparison operators shared by both ends.
//! - [`value`]: runtime values and their builtin operations.
//! - [`list`]: representation-specialized list storage.

pub mod list;
pub mod node;
pub mod operator;
pub mod value;
