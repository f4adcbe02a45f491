use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::{
    bytecode::{
        compile_error::CompileError,
        ir::Program,
        op::{Instruction, Opcode},
        stack_effect::effect,
    },
    lang::{
        node::Node,
        operator::BinaryOp,
    },
};

/// A slot of the instruction buffer while compiling.
#[derive(Debug, Clone)]
enum Emitted {
    Ready(Instruction),
    /// Forward jump to the end of a label, rewritten by `resolve`.
    Jump { opcode: Opcode, label: usize },
}

#[derive(Debug, Clone, Copy)]
struct Label {
    start: usize,
    end: Option<usize>,
}

/// Locals of the function body being compiled.
#[derive(Debug, Default)]
struct FunctionScope {
    name: String,
    slots: FxHashMap<String, usize>,
}

impl FunctionScope {
    fn slot_or_allocate(&mut self, name: &str) -> usize {
        let next = self.slots.len();
        *self.slots.entry(name.to_string()).or_insert(next)
    }
}

/// Lowers an AST into a flat [`Program`] in a single recursive pass.
///
/// Tracks the operand stack height of every emitted instruction so each
/// frame's buffer can be sized exactly: the running maximum of the top level
/// goes into the program header, a function body's maximum into the
/// `ARG_COUNT` that precedes its `MAKE_FUNC`.
pub struct Compiler {
    code: Vec<Emitted>,
    labels: Vec<Label>,

    /// Labels of the enclosing loops, innermost last
    loops: Vec<usize>,

    /// Set while compiling a function body
    function: Option<FunctionScope>,

    stack_depth: i64,
    max_stack_depth: i64,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            labels: Vec::new(),
            loops: Vec::new(),
            function: None,
            stack_depth: 0,
            max_stack_depth: 0,
        }
    }

    pub fn compile(mut self, ast: &[Node]) -> Result<Program, CompileError> {
        // Header, patched once the top level is done.
        self.code.push(Emitted::Ready(Instruction::int(Opcode::ArgCount, 0)));

        self.compile_block(ast)?;

        self.patch(0, Instruction::int(Opcode::ArgCount, self.max_stack_depth));
        let program = Program::new(self.resolve()?);
        debug!(
            instructions = program.len(),
            stack_depth = self.max_stack_depth,
            "compiled program"
        );
        Ok(program)
    }

    // =========================================================================
    // Emission and stack accounting
    // =========================================================================

    fn emit(&mut self, instruction: Instruction) -> usize {
        if let Some((pops, pushes)) = effect(&instruction) {
            self.adjust_stack(pushes - pops);
        }
        self.code.push(Emitted::Ready(instruction));
        self.code.len() - 1
    }

    fn emit_forward_jump(&mut self, opcode: Opcode, label: usize) {
        if opcode == Opcode::Jne {
            self.adjust_stack(-1);
        }
        self.code.push(Emitted::Jump { opcode, label });
    }

    fn adjust_stack(&mut self, delta: i64) {
        self.stack_depth += delta;
        self.max_stack_depth = self.max_stack_depth.max(self.stack_depth);
    }

    fn patch(&mut self, index: usize, instruction: Instruction) {
        self.code[index] = Emitted::Ready(instruction);
    }

    fn next_label(&mut self) -> usize {
        self.labels.push(Label {
            start: self.code.len(),
            end: None,
        });
        self.labels.len() - 1
    }

    fn mark_label_end(&mut self, label: usize) {
        self.labels[label].end = Some(self.code.len());
    }

    /// Rewrite every forward jump to its label's end address.
    fn resolve(&self) -> Result<Vec<Instruction>, CompileError> {
        self.code
            .iter()
            .map(|slot| match slot {
                Emitted::Ready(instruction) => Ok(instruction.clone()),
                Emitted::Jump { opcode, label } => self.labels[*label]
                    .end
                    .map(|end| Instruction::int(*opcode, end as i64))
                    .ok_or(CompileError::UnresolvedLabel { label: *label }),
            })
            .collect()
    }

    // =========================================================================
    // Statements and expressions
    // =========================================================================

    fn compile_block(&mut self, nodes: &[Node]) -> Result<(), CompileError> {
        // A name assigned directly in this block is local for the whole
        // block, including loads that run before the assignment.
        if let Some(scope) = self.function.as_mut() {
            for node in nodes {
                if let Node::Assign { name, .. } = node {
                    scope.slot_or_allocate(name);
                }
            }
        }

        for node in nodes {
            self.compile_node(node)?;
            if !node.is_statement() {
                self.emit(Instruction::bare(Opcode::Pop));
            }
        }
        Ok(())
    }

    fn compile_node(&mut self, node: &Node) -> Result<(), CompileError> {
        match node {
            Node::Int(n) => {
                self.emit(Instruction::int(Opcode::ConstInt, *n));
            }

            Node::Str(text) => {
                if text.contains(['\n', '\r']) {
                    return Err(CompileError::UnencodableString { text: text.clone() });
                }
                self.emit(Instruction::text(Opcode::String, text.as_str()));
            }

            Node::Load(name) => match self.local_slot(name) {
                Some(slot) => {
                    self.emit(Instruction::int(Opcode::LoadLocal, slot as i64));
                }
                None => {
                    self.emit(Instruction::text(Opcode::LoadGlobal, name.as_str()));
                }
            },

            Node::Assign { name, value } => {
                self.compile_node(value)?;
                match self.function.as_mut() {
                    Some(scope) => {
                        let slot = scope.slot_or_allocate(name);
                        self.emit(Instruction::int(Opcode::StoreLocal, slot as i64));
                    }
                    None => {
                        self.emit(Instruction::text(Opcode::StoreGlobal, name.as_str()));
                    }
                }
            }

            Node::BinOp { op, left, right } => {
                self.compile_node(left)?;
                self.compile_node(right)?;
                self.emit(Instruction::bare(arithmetic_opcode(*op)));
            }

            Node::Compare { op, left, right } => {
                self.compile_node(left)?;
                self.compile_node(right)?;
                self.emit(Instruction::text(Opcode::Comp, op.symbol()));
            }

            Node::Cond {
                condition,
                body,
                alt,
            } => self.compile_cond(condition, body, alt.as_deref())?,

            Node::Loop { condition, body } => self.compile_loop(condition, body)?,

            Node::Break => {
                let label = *self
                    .loops
                    .last()
                    .ok_or_else(|| CompileError::outside_loop(node.kind_name()))?;
                self.emit_forward_jump(Opcode::Jump, label);
            }

            Node::Continue => {
                let label = *self
                    .loops
                    .last()
                    .ok_or_else(|| CompileError::outside_loop(node.kind_name()))?;
                let start = self.labels[label].start;
                self.emit(Instruction::int(Opcode::Jump, start as i64));
            }

            Node::Func { name, params, body } => self.compile_function(name, params, body)?,

            Node::Call { callee, args } => {
                for arg in args {
                    self.compile_node(arg)?;
                }
                self.compile_node(callee)?;
                self.emit(Instruction::int(Opcode::Call, args.len() as i64));
            }

            Node::MethodCall {
                receiver,
                method,
                args,
            } => {
                self.compile_node(receiver)?;
                self.emit(Instruction::text(Opcode::LoadMethod, method.as_str()));
                for arg in args {
                    self.compile_node(arg)?;
                }
                self.emit(Instruction::int(Opcode::CallMethod, args.len() as i64));
            }

            Node::Return(value) => match value {
                Some(value) => {
                    self.compile_node(value)?;
                    self.emit(Instruction::int(Opcode::Return, 1));
                }
                None => {
                    self.emit(Instruction::int(Opcode::Return, 0));
                }
            },

            Node::List(items) => {
                for item in items {
                    self.compile_node(item)?;
                }
                self.emit(Instruction::int(Opcode::CreateList, items.len() as i64));
            }

            Node::GetItem { target, index } => {
                self.compile_node(target)?;
                self.compile_node(index)?;
                self.emit(Instruction::bare(Opcode::GetItem));
            }

            Node::SetItem {
                target,
                index,
                value,
            } => {
                self.compile_node(target)?;
                self.compile_node(index)?;
                self.compile_node(value)?;
                self.emit(Instruction::bare(Opcode::SetItem));
            }

            Node::SwapItem {
                target,
                left,
                right,
            } => {
                self.compile_node(target)?;
                self.compile_node(left)?;
                self.compile_node(right)?;
                self.emit(Instruction::bare(Opcode::SwapItem));
            }

            Node::Attribute { target, name } => {
                self.compile_node(target)?;
                self.emit(Instruction::text(Opcode::Attribute, name.as_str()));
            }

            Node::Print(value) => {
                self.compile_node(value)?;
                self.emit(Instruction::bare(Opcode::Print));
            }

            Node::Assert(value) => {
                self.compile_node(value)?;
                self.emit(Instruction::bare(Opcode::Assert));
            }
        }
        Ok(())
    }

    fn local_slot(&self, name: &str) -> Option<usize> {
        self.function
            .as_ref()
            .and_then(|scope| scope.slots.get(name).copied())
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    /// `cond; JNE else; body; [JUMP end; else: alt;] end:`
    fn compile_cond(
        &mut self,
        condition: &Node,
        body: &[Node],
        alt: Option<&[Node]>,
    ) -> Result<(), CompileError> {
        self.compile_node(condition)?;
        let else_label = self.next_label();
        self.emit_forward_jump(Opcode::Jne, else_label);
        self.compile_block(body)?;

        match alt {
            Some(alt) => {
                let end_label = self.next_label();
                self.emit_forward_jump(Opcode::Jump, end_label);
                self.mark_label_end(else_label);
                self.compile_block(alt)?;
                self.mark_label_end(end_label);
            }
            None => self.mark_label_end(else_label),
        }
        Ok(())
    }

    /// `start: cond; JNE end; body; JUMP start; end:`
    fn compile_loop(&mut self, condition: &Node, body: &[Node]) -> Result<(), CompileError> {
        let label = self.next_label();
        let start = self.labels[label].start;

        self.compile_node(condition)?;
        self.emit_forward_jump(Opcode::Jne, label);

        self.loops.push(label);
        self.compile_block(body)?;
        self.loops.pop();

        self.emit(Instruction::int(Opcode::Jump, start as i64));
        self.mark_label_end(label);
        Ok(())
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// Emits the definition sequence
    ///
    /// ```text
    /// ARG pn .. ARG p1
    /// ARG_COUNT <stack depth>
    /// ARG_COUNT <local slots>
    /// ARG_COUNT <n>
    /// MAKE_FUNC name
    /// JUMP end
    /// body
    /// end:
    /// ```
    ///
    /// The two sizing operands are only known once the body is compiled.
    fn compile_function(
        &mut self,
        name: &str,
        params: &[String],
        body: &[Node],
    ) -> Result<(), CompileError> {
        if self.function.is_some() {
            return Err(CompileError::nested_function(name));
        }

        let mut seen = FxHashSet::default();
        for param in params {
            if !seen.insert(param.as_str()) {
                return Err(CompileError::duplicate_parameter(name, param));
            }
        }

        for param in params.iter().rev() {
            self.emit(Instruction::text(Opcode::Arg, param.as_str()));
        }
        let depth_slot = self.emit(Instruction::int(Opcode::ArgCount, 0));
        let locals_slot = self.emit(Instruction::int(Opcode::ArgCount, 0));
        self.emit(Instruction::int(Opcode::ArgCount, params.len() as i64));
        self.emit(Instruction::text(Opcode::MakeFunc, name));
        // MAKE_FUNC consumes the names and the three counts.
        self.adjust_stack(-(params.len() as i64 + 3));

        let skip = self.next_label();
        self.emit_forward_jump(Opcode::Jump, skip);
        let entry = self.code.len();

        let outer_depth = std::mem::replace(&mut self.stack_depth, 0);
        let outer_max = std::mem::replace(&mut self.max_stack_depth, 0);
        let outer_loops = std::mem::take(&mut self.loops);
        self.function = Some(FunctionScope {
            name: name.to_string(),
            slots: params
                .iter()
                .enumerate()
                .map(|(slot, param)| (param.clone(), slot))
                .collect(),
        });

        self.compile_block(body)?;
        if self.needs_implicit_return() {
            self.emit(Instruction::int(Opcode::Return, 0));
        }

        let scope = self
            .function
            .take()
            .ok_or_else(|| CompileError::internal("function scope vanished"))?;
        let body_depth = self.max_stack_depth;
        self.stack_depth = outer_depth;
        self.max_stack_depth = outer_max;
        self.loops = outer_loops;

        self.patch(depth_slot, Instruction::int(Opcode::ArgCount, body_depth));
        self.patch(
            locals_slot,
            Instruction::int(Opcode::ArgCount, scope.slots.len() as i64),
        );
        self.mark_label_end(skip);

        debug!(
            name = %scope.name,
            entry,
            params = params.len(),
            locals = scope.slots.len(),
            stack_depth = body_depth,
            "compiled function"
        );
        Ok(())
    }

    /// A body needs a trailing `RETURN 0` unless it already ends in a
    /// `RETURN` that no jump lands past.
    fn needs_implicit_return(&self) -> bool {
        let ends_in_return = matches!(
            self.code.last(),
            Some(Emitted::Ready(Instruction { opcode: Opcode::Return, .. }))
        );
        let here = self.code.len();
        let jumped_past = self.labels.iter().any(|label| label.end == Some(here));
        !ends_in_return || jumped_past
    }
}

fn arithmetic_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Plus,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Mod => Opcode::Modulus,
    }
}
