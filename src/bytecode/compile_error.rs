use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A node that's valid but appeared in an invalid position
    #[error(
        "compile error: {construct}{}: {reason}{}",
        quoted_name(.name),
        hint_suffix(.hint)
    )]
    InvalidPosition {
        construct: String,
        name: Option<String>,
        reason: String,
        hint: Option<String>,
    },

    /// A forward jump whose label never received an end address
    #[error("compile error: internal error: label {label} was never closed")]
    UnresolvedLabel { label: usize },

    /// A string constant the line-based text format cannot carry
    #[error("compile error: string constant {text:?} contains a line break\n  hint: line breaks cannot be stored in bytecode text")]
    UnencodableString { text: String },

    /// Internal compiler error (shouldn't happen in normal use)
    #[error("compile error: internal error: {0}")]
    Internal(String),
}

fn quoted_name(name: &Option<String>) -> String {
    name.as_ref()
        .map(|n| format!(" '{}'", n))
        .unwrap_or_default()
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|h| format!("\n  hint: {}", h))
        .unwrap_or_default()
}

impl CompileError {
    /// `break` or `continue` with no enclosing loop
    pub fn outside_loop(construct: &str) -> Self {
        CompileError::InvalidPosition {
            construct: construct.to_string(),
            name: None,
            reason: "can only appear inside a while loop".to_string(),
            hint: None,
        }
    }

    /// A function definition inside another function body
    pub fn nested_function(name: &str) -> Self {
        CompileError::InvalidPosition {
            construct: "fn".to_string(),
            name: Some(name.to_string()),
            reason: "functions cannot be defined inside other functions".to_string(),
            hint: Some("define it at the top level; inner functions cannot see outer locals".to_string()),
        }
    }

    pub fn duplicate_parameter(function: &str, param: &str) -> Self {
        CompileError::InvalidPosition {
            construct: "fn".to_string(),
            name: Some(function.to_string()),
            reason: format!("parameter '{}' is declared more than once", param),
            hint: None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }
}
