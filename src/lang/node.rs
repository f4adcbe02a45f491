use super::operator::{BinaryOp, CompareOp};

/// Abstract Syntax Tree node for minilang.
///
/// Produced by the parser and consumed once by the bytecode compiler. The set
/// of variants is closed; the compiler handles every one of them.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // ───────────────────────────── Constants ────────────────────────────
    /// Integer literal.
    Int(i64),

    /// String literal, already stripped of its quotes.
    Str(String),

    // ───────────────────────────── Variables ────────────────────────────
    /// Read a variable. Resolves to a local slot inside a function body when
    /// the name is known there, otherwise to the global namespace.
    Load(String),

    /// `name := value`
    Assign { name: String, value: Box<Node> },

    // ───────────────────────────── Operators ────────────────────────────
    BinOp {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },

    Compare {
        op: CompareOp,
        left: Box<Node>,
        right: Box<Node>,
    },

    // ──────────────────────────── Control flow ──────────────────────────
    /// `if condition { body } else { alt }`. An `elif` chain is an `alt`
    /// holding a single nested `Cond`.
    Cond {
        condition: Box<Node>,
        body: Vec<Node>,
        alt: Option<Vec<Node>>,
    },

    /// `while condition { body }`
    Loop {
        condition: Box<Node>,
        body: Vec<Node>,
    },

    /// Leave the innermost loop.
    Break,

    /// Jump back to the innermost loop's condition.
    Continue,

    // ───────────────────────────── Functions ────────────────────────────
    /// `fn name(params) { body }`. Only allowed outside other function bodies.
    Func {
        name: String,
        params: Vec<String>,
        body: Vec<Node>,
    },

    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },

    /// `receiver.method(args)`
    MethodCall {
        receiver: Box<Node>,
        method: String,
        args: Vec<Node>,
    },

    /// `^ value;` or a bare `^;`
    Return(Option<Box<Node>>),

    // ─────────────────────────────── Lists ──────────────────────────────
    List(Vec<Node>),

    /// `target[index]`
    GetItem { target: Box<Node>, index: Box<Node> },

    /// `target[index] := value`. Evaluates to the list.
    SetItem {
        target: Box<Node>,
        index: Box<Node>,
        value: Box<Node>,
    },

    /// Exchange `target[left]` and `target[right]`. Evaluates to the list.
    SwapItem {
        target: Box<Node>,
        left: Box<Node>,
        right: Box<Node>,
    },

    /// `target.name`
    Attribute { target: Box<Node>, name: String },

    // ──────────────────────────────── I/O ───────────────────────────────
    Print(Box<Node>),

    Assert(Box<Node>),
}

impl Node {
    /// Statements leave nothing on the operand stack. Every other node is an
    /// expression whose value the compiler must pop when used as a statement.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Node::Assign { .. }
                | Node::Cond { .. }
                | Node::Loop { .. }
                | Node::Break
                | Node::Continue
                | Node::Return(_)
                | Node::Func { .. }
                | Node::Print(_)
                | Node::Assert(_)
        )
    }

    /// Human-readable name used in compiler diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Int(_) => "integer literal",
            Node::Str(_) => "string literal",
            Node::Load(_) => "variable",
            Node::Assign { .. } => "assignment",
            Node::BinOp { .. } => "binary operation",
            Node::Compare { .. } => "comparison",
            Node::Cond { .. } => "if",
            Node::Loop { .. } => "while",
            Node::Break => "break",
            Node::Continue => "continue",
            Node::Func { .. } => "fn",
            Node::Call { .. } => "call",
            Node::MethodCall { .. } => "method call",
            Node::Return(_) => "return",
            Node::List(_) => "list literal",
            Node::GetItem { .. } => "index",
            Node::SetItem { .. } => "index assignment",
            Node::SwapItem { .. } => "swap",
            Node::Attribute { .. } => "attribute",
            Node::Print(_) => "print",
            Node::Assert(_) => "assert",
        }
    }

    // Shorthand constructors, mostly for building trees by hand.

    pub fn load(name: &str) -> Node {
        Node::Load(name.to_string())
    }

    pub fn string(text: &str) -> Node {
        Node::Str(text.to_string())
    }

    pub fn assign(name: &str, value: Node) -> Node {
        Node::Assign {
            name: name.to_string(),
            value: Box::new(value),
        }
    }

    pub fn binop(op: BinaryOp, left: Node, right: Node) -> Node {
        Node::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn compare(op: CompareOp, left: Node, right: Node) -> Node {
        Node::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(callee: &str, args: Vec<Node>) -> Node {
        Node::Call {
            callee: Box::new(Node::load(callee)),
            args,
        }
    }

    pub fn print(value: Node) -> Node {
        Node::Print(Box::new(value))
    }

    pub fn ret(value: Node) -> Node {
        Node::Return(Some(Box::new(value)))
    }
}
