use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// OPCODE - Bytecode instructions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // variables
    LoadLocal,
    StoreLocal,
    LoadGlobal,
    StoreGlobal,

    // constants
    ConstInt,
    String,

    Pop,

    // control flow: absolute targets
    Jump,
    /// Pop a value, jump when it is falsy.
    Jne,

    // operators
    Comp,
    Plus,
    Sub,
    Mul,
    Div,
    Modulus,

    // functions
    Call,
    MakeFunc,
    Return,
    Arg,
    /// Pushes its integer operand. Element 0 of a program is always one.
    ArgCount,

    // builtins
    Assert,
    Print,

    // lists, attributes, methods
    CreateList,
    GetItem,
    SetItem,
    SwapItem,
    Attribute,
    LoadMethod,
    CallMethod,
}

/// The operand every instance of an opcode carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Int,
    Text,
}

impl Opcode {
    pub const ALL: [Opcode; 29] = [
        Opcode::LoadLocal,
        Opcode::StoreLocal,
        Opcode::LoadGlobal,
        Opcode::StoreGlobal,
        Opcode::ConstInt,
        Opcode::String,
        Opcode::Pop,
        Opcode::Jump,
        Opcode::Jne,
        Opcode::Comp,
        Opcode::Plus,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Modulus,
        Opcode::Call,
        Opcode::MakeFunc,
        Opcode::Return,
        Opcode::Arg,
        Opcode::ArgCount,
        Opcode::Assert,
        Opcode::Print,
        Opcode::CreateList,
        Opcode::GetItem,
        Opcode::SetItem,
        Opcode::SwapItem,
        Opcode::Attribute,
        Opcode::LoadMethod,
        Opcode::CallMethod,
    ];

    /// Mnemonic used by the text format.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::LoadLocal => "LOAD_LOCAL",
            Opcode::StoreLocal => "STORE_LOCAL",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::ConstInt => "CONST_INT",
            Opcode::String => "STRING",
            Opcode::Pop => "POP",
            Opcode::Jump => "JUMP",
            Opcode::Jne => "JNE",
            Opcode::Comp => "COMP",
            Opcode::Plus => "PLUS",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Modulus => "MODULUS",
            Opcode::Call => "CALL",
            Opcode::MakeFunc => "MAKE_FUNC",
            Opcode::Return => "RETURN",
            Opcode::Arg => "ARG",
            Opcode::ArgCount => "ARG_COUNT",
            Opcode::Assert => "ASSERT",
            Opcode::Print => "PRINT",
            Opcode::CreateList => "CREATE_LIST",
            Opcode::GetItem => "GETITEM",
            Opcode::SetItem => "SETITEM",
            Opcode::SwapItem => "SWAPITEM",
            Opcode::Attribute => "ATTRIBUTE",
            Opcode::LoadMethod => "LOAD_METHOD",
            Opcode::CallMethod => "CALL_METHOD",
        }
    }

    pub fn from_name(name: &str) -> Option<Opcode> {
        Opcode::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn operand_kind(self) -> OperandKind {
        use Opcode::*;
        match self {
            ConstInt | Jump | Jne | ArgCount | Call | CallMethod | Return | CreateList
            | LoadLocal | StoreLocal => OperandKind::Int,

            LoadGlobal | StoreGlobal | String | Comp | MakeFunc | Arg | Attribute
            | LoadMethod => OperandKind::Text,

            Pop | Plus | Sub | Mul | Div | Modulus | Assert | Print | GetItem | SetItem
            | SwapItem => OperandKind::None,
        }
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jump | Opcode::Jne)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    None,
    Int(i64),
    Text(String),
}

/// One instruction of a finished program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        Instruction { opcode, operand }
    }

    pub fn bare(opcode: Opcode) -> Self {
        Instruction::new(opcode, Operand::None)
    }

    pub fn int(opcode: Opcode, value: i64) -> Self {
        Instruction::new(opcode, Operand::Int(value))
    }

    pub fn text(opcode: Opcode, value: impl Into<String>) -> Self {
        Instruction::new(opcode, Operand::Text(value.into()))
    }

    pub fn int_operand(&self) -> Option<i64> {
        match self.operand {
            Operand::Int(n) => Some(n),
            _ => None,
        }
    }

    pub fn text_operand(&self) -> Option<&str> {
        match &self.operand {
            Operand::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the operand agrees with the opcode's operand kind.
    pub fn is_well_formed(&self) -> bool {
        matches!(
            (self.opcode.operand_kind(), &self.operand),
            (OperandKind::None, Operand::None)
                | (OperandKind::Int, Operand::Int(_))
                | (OperandKind::Text, Operand::Text(_))
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Operand::None => write!(f, "{}", self.opcode),
            Operand::Int(n) => write!(f, "{} {}", self.opcode, n),
            Operand::Text(s) => write!(f, "{} {}", self.opcode, s),
        }
    }
}
