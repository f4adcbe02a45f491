use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::list::List;
use super::operator::{BinaryOp, CompareOp};
use crate::runtime::runtime_error::PanicKind;

/// A function produced by `MAKE_FUNC`.
///
/// Owned by the global namespace under its name. Holds everything needed to
/// size and enter a frame; the body itself stays in the shared program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFunction {
    pub name: String,
    /// Address of the first body instruction.
    pub entry: usize,
    /// Parameter names in declaration order. They occupy slots `0..n`.
    pub params: Vec<String>,
    pub locals_count: usize,
    pub stack_depth: usize,
}

impl CompiledFunction {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Runtime value of a minilang program.
///
/// Integers, strings and bools behave as values. Lists are shared by
/// reference, so a store through one alias is visible through all of them.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    String(Rc<str>),
    Bool(bool),
    List(Rc<RefCell<List>>),
    Function(Rc<CompiledFunction>),
    Unit,
}

impl Value {
    pub fn string(text: &str) -> Value {
        Value::String(Rc::from(text))
    }

    pub fn list(list: List) -> Value {
        Value::List(Rc::new(RefCell::new(list)))
    }

    pub fn function(function: CompiledFunction) -> Value {
        Value::Function(Rc::new(function))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Integer",
            Value::String(_) => "String",
            Value::Bool(_) => "Bool",
            Value::List(_) => "List",
            Value::Function(_) => "Function",
            Value::Unit => "Unit",
        }
    }

    pub fn truthy(&self) -> Result<bool, PanicKind> {
        match self {
            Value::Integer(n) => Ok(*n != 0),
            Value::String(s) => Ok(!s.is_empty()),
            Value::Bool(b) => Ok(*b),
            Value::List(items) => Ok(!items.borrow().is_empty()),
            Value::Function(_) | Value::Unit => Err(PanicKind::NoTruthValue {
                type_name: self.type_name(),
            }),
        }
    }

    // ========================================================================
    // Binary operators
    // ========================================================================

    /// `self op rhs`. The left operand picks the handler and hands its payload
    /// to the right operand.
    pub fn binary(&self, op: BinaryOp, rhs: &Value) -> Result<Value, PanicKind> {
        match self {
            Value::Integer(lhs) => rhs.binary_with_integer(op, *lhs),
            Value::String(lhs) => rhs.binary_with_string(op, lhs),
            _ => Err(unsupported(op.symbol(), self.type_name(), rhs.type_name())),
        }
    }

    fn binary_with_integer(&self, op: BinaryOp, lhs: i64) -> Result<Value, PanicKind> {
        match self {
            Value::Integer(rhs) => integer_arith(op, lhs, *rhs).map(Value::Integer),
            _ => Err(unsupported(op.symbol(), "Integer", self.type_name())),
        }
    }

    fn binary_with_string(&self, op: BinaryOp, lhs: &str) -> Result<Value, PanicKind> {
        match (op, self) {
            (BinaryOp::Add, Value::String(rhs)) => {
                let mut joined = String::with_capacity(lhs.len() + rhs.len());
                joined.push_str(lhs);
                joined.push_str(rhs);
                Ok(Value::String(Rc::from(joined)))
            }
            _ => Err(unsupported(op.symbol(), "String", self.type_name())),
        }
    }

    // ========================================================================
    // Comparisons
    // ========================================================================

    /// `self op rhs`, producing a Bool.
    pub fn compare(&self, op: CompareOp, rhs: &Value) -> Result<Value, PanicKind> {
        match self {
            Value::Integer(lhs) => rhs.compare_with_integer(op, *lhs),
            Value::String(lhs) => rhs.compare_with_string(op, lhs),
            Value::Bool(lhs) => rhs.compare_with_bool(op, *lhs),
            _ => Err(unsupported(op.symbol(), self.type_name(), rhs.type_name())),
        }
    }

    fn compare_with_integer(&self, op: CompareOp, lhs: i64) -> Result<Value, PanicKind> {
        match self {
            Value::Integer(rhs) => Ok(Value::Bool(op.holds(lhs.cmp(rhs)))),
            _ => Err(unsupported(op.symbol(), "Integer", self.type_name())),
        }
    }

    fn compare_with_string(&self, op: CompareOp, lhs: &str) -> Result<Value, PanicKind> {
        match self {
            Value::String(rhs) => Ok(Value::Bool(op.holds(lhs.cmp(rhs)))),
            _ => Err(unsupported(op.symbol(), "String", self.type_name())),
        }
    }

    fn compare_with_bool(&self, op: CompareOp, lhs: bool) -> Result<Value, PanicKind> {
        match (op, self) {
            (CompareOp::Eq | CompareOp::Ne, Value::Bool(rhs)) => {
                let ordering = if lhs == *rhs {
                    Ordering::Equal
                } else {
                    Ordering::Less
                };
                Ok(Value::Bool(op.holds(ordering)))
            }
            _ => Err(unsupported(op.symbol(), "Bool", self.type_name())),
        }
    }

    // ========================================================================
    // Builtin attributes and methods
    // ========================================================================

    pub fn attribute(&self, name: &str) -> Result<Value, PanicKind> {
        match (self, name) {
            (Value::List(items), "length") => Ok(Value::Integer(items.borrow().len() as i64)),
            (Value::String(s), "length") => Ok(Value::Integer(s.chars().count() as i64)),
            _ => Err(PanicKind::UnknownAttribute {
                name: name.to_string(),
                type_name: self.type_name(),
            }),
        }
    }

    pub fn call_method(&self, name: &str, args: Vec<Value>) -> Result<Value, PanicKind> {
        match (self, name) {
            (Value::List(_) | Value::String(_), "length") => {
                self.check_method_arity(name, 0, args.len())?;
                self.attribute("length")
            }
            (Value::List(items), "append") => {
                self.check_method_arity(name, 1, args.len())?;
                for arg in args {
                    items.borrow_mut().append(arg);
                }
                Ok(Value::Unit)
            }
            _ => Err(PanicKind::UnknownMethod {
                name: name.to_string(),
                type_name: self.type_name(),
            }),
        }
    }

    fn check_method_arity(&self, name: &str, expected: usize, got: usize) -> Result<(), PanicKind> {
        if expected == got {
            return Ok(());
        }
        Err(PanicKind::ArityMismatch {
            callee: format!("{}.{}", self.type_name(), name),
            expected,
            got,
        })
    }
}

fn unsupported(op: &str, lhs: &'static str, rhs: &'static str) -> PanicKind {
    PanicKind::UnsupportedOperation {
        op: op.to_string(),
        lhs,
        rhs,
    }
}

/// Checked integer arithmetic. Division and modulus round toward negative
/// infinity, so the remainder takes the sign of the divisor.
fn integer_arith(op: BinaryOp, lhs: i64, rhs: i64) -> Result<i64, PanicKind> {
    let overflow = || PanicKind::IntegerOverflow {
        op: op.symbol().to_string(),
    };

    match op {
        BinaryOp::Add => lhs.checked_add(rhs).ok_or_else(overflow),
        BinaryOp::Sub => lhs.checked_sub(rhs).ok_or_else(overflow),
        BinaryOp::Mul => lhs.checked_mul(rhs).ok_or_else(overflow),
        BinaryOp::Div => {
            if rhs == 0 {
                return Err(PanicKind::DivisionByZero);
            }
            let quotient = lhs.checked_div(rhs).ok_or_else(overflow)?;
            if lhs % rhs != 0 && (lhs < 0) != (rhs < 0) {
                Ok(quotient - 1)
            } else {
                Ok(quotient)
            }
        }
        BinaryOp::Mod => {
            if rhs == 0 {
                return Err(PanicKind::DivisionByZero);
            }
            let remainder = lhs.checked_rem(rhs).ok_or_else(overflow)?;
            if remainder != 0 && (remainder < 0) != (rhs < 0) {
                Ok(remainder + rhs)
            } else {
                Ok(remainder)
            }
        }
    }
}

impl PartialEq for Value {
    /// Lists compare by content, functions by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Unit, Value::Unit) => true,
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl fmt::Display for Value {
    /// The form `PRINT` writes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, &mut Vec::new())
    }
}

/// `open` holds the lists currently being written. A list met again inside
/// itself is written as `[...]`.
fn write_value(
    f: &mut fmt::Formatter<'_>,
    value: &Value,
    open: &mut Vec<*const RefCell<List>>,
) -> fmt::Result {
    match value {
        Value::Integer(n) => write!(f, "{}", n),
        Value::String(s) => write!(f, "{}", s),
        Value::Bool(true) => write!(f, "True"),
        Value::Bool(false) => write!(f, "False"),
        Value::List(items) => {
            let ptr = Rc::as_ptr(items);
            if open.contains(&ptr) {
                return write!(f, "[...]");
            }
            open.push(ptr);
            write!(f, "[")?;
            for (i, item) in items.borrow().to_values().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_value(f, item, open)?;
            }
            open.pop();
            write!(f, "]")
        }
        Value::Function(func) => write!(f, "<fn {} at {}>", func.name, func.entry),
        Value::Unit => write!(f, "unit"),
    }
}
