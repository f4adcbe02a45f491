use std::fmt;

use thiserror::Error;

/// What went wrong. Every variant is fatal: a panic ends the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PanicKind {
    #[error("unknown variable {0}")]
    UnknownVariable(String),

    #[error("operation {op} not defined for {lhs} and {rhs}")]
    UnsupportedOperation {
        op: String,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("{type_name} has no truth value")]
    NoTruthValue { type_name: &'static str },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in {op}")]
    IntegerOverflow { op: String },

    #[error("list index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("list indices must be Integer, not {type_name}")]
    BadIndex { type_name: &'static str },

    #[error("unknown attribute {name} on {type_name}")]
    UnknownAttribute {
        name: String,
        type_name: &'static str,
    },

    #[error("unknown method {name} on {type_name}")]
    UnknownMethod {
        name: String,
        type_name: &'static str,
    },

    #[error("{callee} expects {expected} arguments, got {got}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        got: usize,
    },

    #[error("{type_name} is not callable")]
    NotCallable { type_name: &'static str },

    #[error("local slot {slot} read before assignment")]
    UnassignedLocal { slot: usize },

    #[error("assertion failed")]
    AssertionFailed,

    #[error("recursion too deep (limit {limit})")]
    RecursionTooDeep { limit: usize },

    #[error("step limit exceeded ({limit} instructions)")]
    StepLimitExceeded { limit: u64 },

    #[error("malformed bytecode at pc {pc}: {reason}")]
    MalformedBytecode { pc: usize, reason: String },

    #[error("cannot write output: {0}")]
    Output(String),
}

/// Frames shown when a panic is displayed; the rest are summarized.
const SHOWN_FRAMES: usize = 10;

/// A runtime panic plus the guest functions it unwound through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panic {
    pub kind: PanicKind,
    /// Innermost function first.
    pub call_stack: Vec<String>,
}

impl fmt::Display for Panic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;

            for (i, frame) in self.call_stack.iter().take(SHOWN_FRAMES).enumerate() {
                write!(f, "\n    {}: {}", i, frame)?;
            }
            if self.call_stack.len() > SHOWN_FRAMES {
                write!(f, "\n    ... {} more", self.call_stack.len() - SHOWN_FRAMES)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Panic {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl Panic {
    pub fn new(kind: PanicKind) -> Self {
        Panic {
            kind,
            call_stack: Vec::new(),
        }
    }

    pub fn with_context(mut self, function: &str) -> Self {
        self.call_stack.push(function.to_string());
        self
    }

    pub fn malformed(pc: usize, reason: impl Into<String>) -> Self {
        Panic::new(PanicKind::MalformedBytecode {
            pc,
            reason: reason.into(),
        })
    }
}

impl From<PanicKind> for Panic {
    fn from(kind: PanicKind) -> Self {
        Panic::new(kind)
    }
}
