use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::bytecode::ir::Program;
use crate::bytecode::op::{Instruction, Opcode};
use crate::lang::list::List;
use crate::lang::operator::{BinaryOp, CompareOp};
use crate::lang::value::{CompiledFunction, Value};
use crate::runtime::frame::Frame;
use crate::runtime::namespace::{Namespace, ShapeTable};
use crate::runtime::runtime_error::{Panic, PanicKind};

/// Host stack left before a guest call grows the stack.
const RED_ZONE: usize = 100 * 1024;

/// Size of each stack segment allocated by a guest call.
const STACK_PER_CALL: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Nested guest calls allowed before "recursion too deep".
    pub max_recursion_depth: usize,
    /// Instructions executed before the run is stopped. `None` is unbounded.
    pub max_steps: Option<u64>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_recursion_depth: 200,
            max_steps: None,
        }
    }
}

/// Executes a [`Program`] frame by frame.
///
/// Every guest call runs in a fresh [`Frame`] on a host recursion level, so
/// the call depth is bounded by `max_recursion_depth`. `PRINT` writes to
/// `out`, one value per line.
pub struct Interpreter<'p, W: Write> {
    program: &'p Program,
    globals: Namespace,
    config: InterpreterConfig,
    depth: usize,
    steps: u64,
    out: W,
}

impl<'p, W: Write> Interpreter<'p, W> {
    pub fn new(program: &'p Program, out: W) -> Self {
        Self::with_config(program, out, InterpreterConfig::default())
    }

    pub fn with_config(program: &'p Program, out: W, config: InterpreterConfig) -> Self {
        let shapes = Rc::new(RefCell::new(ShapeTable::new()));
        let mut globals = Namespace::new(shapes);
        globals.set("true", Value::Bool(true));
        globals.set("false", Value::Bool(false));

        Self {
            program,
            globals,
            config,
            depth: 0,
            steps: 0,
            out,
        }
    }

    pub fn globals(&self) -> &Namespace {
        &self.globals
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Run the entry frame. Its stack depth comes from the program header.
    pub fn run(&mut self) -> Result<Value, Panic> {
        let stack_depth = self
            .program
            .entry_stack_depth()
            .ok_or_else(|| Panic::malformed(0, "missing ARG_COUNT header"))?;

        debug!(
            instructions = self.program.len(),
            stack_depth, "running program"
        );
        let result = self.run_frame(Program::ENTRY, Vec::new(), 0, stack_depth);
        let flushed = self.out.flush();
        let value = result?;
        flushed.map_err(|e| Panic::new(PanicKind::Output(e.to_string())))?;
        Ok(value)
    }

    pub fn run_frame(
        &mut self,
        entry: usize,
        args: Vec<Value>,
        locals_count: usize,
        stack_depth: usize,
    ) -> Result<Value, Panic> {
        let mut frame = Frame::new(self.program, entry, args, locals_count, stack_depth)?;
        self.execute(&mut frame)
    }

    /// Enter `function` in a new frame one level deeper.
    fn call(&mut self, function: &CompiledFunction, args: Vec<Value>) -> Result<Value, Panic> {
        if self.depth >= self.config.max_recursion_depth {
            return Err(PanicKind::RecursionTooDeep {
                limit: self.config.max_recursion_depth,
            }
            .into());
        }

        self.depth += 1;
        debug!(function = %function.name, depth = self.depth, "enter frame");
        let result = stacker::maybe_grow(RED_ZONE, STACK_PER_CALL, || {
            self.run_frame(
                function.entry,
                args,
                function.locals_count,
                function.stack_depth,
            )
        });
        debug!(function = %function.name, depth = self.depth, ok = result.is_ok(), "exit frame");
        self.depth -= 1;

        result.map_err(|panic| panic.with_context(&function.name))
    }

    // ========================================================================
    // Fetch-decode-execute
    // ========================================================================

    fn execute(&mut self, frame: &mut Frame<'p>) -> Result<Value, Panic> {
        while let Some(instruction) = frame.fetch() {
            let pc = frame.current_pc();
            self.count_step()?;
            trace!(pc, depth = self.depth, %instruction, "execute");

            match instruction.opcode {
                // variables
                Opcode::LoadLocal => {
                    let slot = count_operand(instruction, pc)?;
                    let value = frame.load(slot)?;
                    frame.push(value)?;
                }
                Opcode::StoreLocal => {
                    let slot = count_operand(instruction, pc)?;
                    let value = frame.pop()?;
                    frame.store(slot, value)?;
                }
                Opcode::LoadGlobal => {
                    let value = self.globals.get(text_operand(instruction, pc)?)?;
                    frame.push(value)?;
                }
                Opcode::StoreGlobal => {
                    let value = frame.pop()?;
                    self.globals.set(text_operand(instruction, pc)?, value);
                }

                // constants
                Opcode::ConstInt | Opcode::ArgCount => {
                    frame.push(Value::Integer(int_operand(instruction, pc)?))?;
                }
                Opcode::String | Opcode::Arg | Opcode::LoadMethod => {
                    frame.push(Value::string(text_operand(instruction, pc)?))?;
                }

                Opcode::Pop => {
                    frame.pop()?;
                }

                // control flow
                Opcode::Jump => {
                    frame.jump(count_operand(instruction, pc)?);
                }
                Opcode::Jne => {
                    let target = count_operand(instruction, pc)?;
                    if !frame.pop()?.truthy()? {
                        frame.jump(target);
                    }
                }

                // operators
                Opcode::Comp => {
                    let op = text_operand(instruction, pc)?
                        .parse::<CompareOp>()
                        .map_err(|reason| Panic::malformed(pc, reason))?;
                    let rhs = frame.pop()?;
                    let lhs = frame.pop()?;
                    frame.push(lhs.compare(op, &rhs)?)?;
                }
                Opcode::Plus => binary(frame, BinaryOp::Add)?,
                Opcode::Sub => binary(frame, BinaryOp::Sub)?,
                Opcode::Mul => binary(frame, BinaryOp::Mul)?,
                Opcode::Div => binary(frame, BinaryOp::Div)?,
                Opcode::Modulus => binary(frame, BinaryOp::Mod)?,

                // functions
                Opcode::Call => {
                    let n = count_operand(instruction, pc)?;
                    let callee = frame.pop()?;
                    let args = frame.pop_n(n)?;
                    let function = match callee {
                        Value::Function(function) => function,
                        other => {
                            return Err(PanicKind::NotCallable {
                                type_name: other.type_name(),
                            }
                            .into());
                        }
                    };
                    if function.arity() != n {
                        return Err(PanicKind::ArityMismatch {
                            callee: function.name.clone(),
                            expected: function.arity(),
                            got: n,
                        }
                        .into());
                    }
                    let result = self.call(&function, args)?;
                    frame.push(result)?;
                }
                Opcode::MakeFunc => {
                    let function = make_function(frame, instruction, pc)?;
                    debug!(
                        name = %function.name,
                        entry = function.entry,
                        params = function.arity(),
                        "defined function"
                    );
                    let name = function.name.clone();
                    self.globals.set(&name, Value::function(function));
                }
                Opcode::Return => {
                    if int_operand(instruction, pc)? == 0 {
                        frame.push(Value::Integer(0))?;
                    }
                    return frame.pop();
                }

                // builtins
                Opcode::Assert => {
                    if !frame.pop()?.truthy()? {
                        return Err(PanicKind::AssertionFailed.into());
                    }
                }
                Opcode::Print => {
                    let value = frame.pop()?;
                    writeln!(self.out, "{}", value)
                        .map_err(|e| Panic::new(PanicKind::Output(e.to_string())))?;
                }

                // lists
                Opcode::CreateList => {
                    let n = count_operand(instruction, pc)?;
                    let items = frame.pop_n(n)?;
                    frame.push(Value::list(List::from_values(items)))?;
                }
                Opcode::GetItem => {
                    let index = frame.pop()?;
                    let target = frame.pop()?;
                    let item = match &target {
                        Value::List(items) => items.borrow().get(&index)?,
                        _ => return Err(unsupported_indexing(&target, &index)),
                    };
                    frame.push(item)?;
                }
                Opcode::SetItem => {
                    let value = frame.pop()?;
                    let index = frame.pop()?;
                    let target = frame.pop()?;
                    match &target {
                        Value::List(items) => items.borrow_mut().set(&index, value)?,
                        _ => return Err(unsupported_indexing(&target, &index)),
                    }
                    frame.push(target)?;
                }
                Opcode::SwapItem => {
                    let right = frame.pop()?;
                    let left = frame.pop()?;
                    let target = frame.pop()?;
                    match &target {
                        Value::List(items) => items.borrow_mut().swap(&left, &right)?,
                        _ => return Err(unsupported_indexing(&target, &left)),
                    }
                    frame.push(target)?;
                }

                // attributes and methods
                Opcode::Attribute => {
                    let target = frame.pop()?;
                    frame.push(target.attribute(text_operand(instruction, pc)?)?)?;
                }
                Opcode::CallMethod => {
                    let n = count_operand(instruction, pc)?;
                    let args = frame.pop_n(n)?;
                    let method = frame.pop()?;
                    let receiver = frame.pop()?;
                    let Value::String(method) = method else {
                        return Err(Panic::malformed(pc, "CALL_METHOD without a method name"));
                    };
                    frame.push(receiver.call_method(&method, args)?)?;
                }
            }
        }

        // Falling off the end of the code.
        Ok(Value::Unit)
    }

    fn count_step(&mut self) -> Result<(), Panic> {
        self.steps += 1;
        match self.config.max_steps {
            Some(max) if self.steps > max => Err(PanicKind::StepLimitExceeded { limit: max }.into()),
            _ => Ok(()),
        }
    }
}

fn binary(frame: &mut Frame<'_>, op: BinaryOp) -> Result<(), Panic> {
    let rhs = frame.pop()?;
    let lhs = frame.pop()?;
    frame.push(lhs.binary(op, &rhs)?)
}

/// Unpack the definition sequence left on the stack by the `ARG` and
/// `ARG_COUNT` instructions before `MAKE_FUNC`.
fn make_function(
    frame: &mut Frame<'_>,
    instruction: &Instruction,
    pc: usize,
) -> Result<CompiledFunction, Panic> {
    let name = text_operand(instruction, pc)?.to_string();
    let nparams = pop_count(frame, pc)?;
    let locals_count = pop_count(frame, pc)?;
    let stack_depth = pop_count(frame, pc)?;

    if locals_count < nparams {
        return Err(Panic::malformed(
            pc,
            format!("{} has {} parameters but {} local slots", name, nparams, locals_count),
        ));
    }

    let mut params = Vec::with_capacity(nparams);
    for _ in 0..nparams {
        match frame.pop()? {
            Value::String(param) => params.push(param.to_string()),
            other => {
                return Err(Panic::malformed(
                    pc,
                    format!("parameter name must be a String, not {}", other.type_name()),
                ));
            }
        }
    }

    Ok(CompiledFunction {
        name,
        entry: pc + 2,
        params,
        locals_count,
        stack_depth,
    })
}

fn pop_count(frame: &mut Frame<'_>, pc: usize) -> Result<usize, Panic> {
    match frame.pop()? {
        Value::Integer(n) => usize::try_from(n)
            .map_err(|_| Panic::malformed(pc, format!("negative count {}", n))),
        other => Err(Panic::malformed(
            pc,
            format!("expected a count, found {}", other.type_name()),
        )),
    }
}

fn int_operand(instruction: &Instruction, pc: usize) -> Result<i64, Panic> {
    instruction
        .int_operand()
        .ok_or_else(|| Panic::malformed(pc, format!("{} needs an integer operand", instruction.opcode)))
}

/// Integer operand used as an address, slot or count.
fn count_operand(instruction: &Instruction, pc: usize) -> Result<usize, Panic> {
    let n = int_operand(instruction, pc)?;
    usize::try_from(n).map_err(|_| Panic::malformed(pc, format!("negative operand {}", n)))
}

fn text_operand(instruction: &Instruction, pc: usize) -> Result<&str, Panic> {
    instruction
        .text_operand()
        .ok_or_else(|| Panic::malformed(pc, format!("{} needs a text operand", instruction.opcode)))
}

fn unsupported_indexing(target: &Value, index: &Value) -> Panic {
    PanicKind::UnsupportedOperation {
        op: "[]".to_string(),
        lhs: target.type_name(),
        rhs: index.type_name(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile::Compiler;
    use crate::lang::node::Node;
    use pretty_assertions::assert_eq;

    // ============================================================
    // Test Helpers
    // ============================================================

    fn program(instructions: Vec<Instruction>) -> Program {
        Program::new(instructions)
    }

    fn int(op: Opcode, n: i64) -> Instruction {
        Instruction::int(op, n)
    }

    fn text(op: Opcode, s: &str) -> Instruction {
        Instruction::text(op, s)
    }

    fn bare(op: Opcode) -> Instruction {
        Instruction::bare(op)
    }

    /// Run a program and return its result and printed output
    fn run_program(program: &Program) -> (Result<Value, Panic>, String) {
        run_with_config(program, InterpreterConfig::default())
    }

    fn run_with_config(program: &Program, config: InterpreterConfig) -> (Result<Value, Panic>, String) {
        let mut interpreter = Interpreter::with_config(program, Vec::new(), config);
        let result = interpreter.run();
        let out = String::from_utf8(interpreter.into_output()).unwrap();
        (result, out)
    }

    fn run_ast(ast: &[Node]) -> (Result<Value, Panic>, String) {
        let program = Compiler::new().compile(ast).unwrap();
        run_program(&program)
    }

    fn func(name: &str, params: &[&str], body: Vec<Node>) -> Node {
        Node::Func {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
        }
    }

    fn cond(condition: Node, body: Vec<Node>, alt: Option<Vec<Node>>) -> Node {
        Node::Cond {
            condition: Box::new(condition),
            body,
            alt,
        }
    }

    fn bin(op: BinaryOp, l: Node, r: Node) -> Node {
        Node::binop(op, l, r)
    }

    // ============================================================
    // Hand-written bytecode
    // ============================================================

    #[test]
    fn test_print_constant() {
        let (result, out) = run_program(&program(vec![
            int(Opcode::ArgCount, 1),
            int(Opcode::ConstInt, 42),
            bare(Opcode::Print),
        ]));

        assert_eq!(result, Ok(Value::Unit));
        assert_eq!(out, "42\n");
    }

    #[test]
    fn test_top_level_return() {
        let (result, _) = run_program(&program(vec![
            int(Opcode::ArgCount, 1),
            int(Opcode::ConstInt, 7),
            int(Opcode::Return, 1),
            bare(Opcode::Print),
        ]));
        assert_eq!(result, Ok(Value::Integer(7)));
    }

    #[test]
    fn test_missing_header() {
        let (result, _) = run_program(&program(vec![int(Opcode::ConstInt, 1)]));
        assert!(matches!(
            result.unwrap_err().kind,
            PanicKind::MalformedBytecode { pc: 0, .. }
        ));
    }

    #[test]
    fn test_undersized_header_overflows() {
        let (result, _) = run_program(&program(vec![
            int(Opcode::ArgCount, 1),
            int(Opcode::ConstInt, 1),
            int(Opcode::ConstInt, 2),
        ]));
        let panic = result.unwrap_err();
        assert!(panic.to_string().contains("overflow"));
    }

    #[test]
    fn test_underflow() {
        let (result, _) = run_program(&program(vec![int(Opcode::ArgCount, 1), bare(Opcode::Pop)]));
        assert!(result.unwrap_err().to_string().contains("underflow"));
    }

    #[test]
    fn test_bad_comparison_operand() {
        let (result, _) = run_program(&program(vec![
            int(Opcode::ArgCount, 2),
            int(Opcode::ConstInt, 1),
            int(Opcode::ConstInt, 2),
            text(Opcode::Comp, "<>"),
        ]));
        assert!(matches!(
            result.unwrap_err().kind,
            PanicKind::MalformedBytecode { pc: 3, .. }
        ));
    }

    #[test]
    fn test_globals_seeded_with_bools() {
        let (_, out) = run_program(&program(vec![
            int(Opcode::ArgCount, 1),
            text(Opcode::LoadGlobal, "true"),
            bare(Opcode::Print),
            text(Opcode::LoadGlobal, "false"),
            bare(Opcode::Print),
        ]));
        assert_eq!(out, "True\nFalse\n");
    }

    #[test]
    fn test_jne_on_falsy() {
        // if 0 { print 1 } print 2
        let (_, out) = run_program(&program(vec![
            int(Opcode::ArgCount, 1),
            int(Opcode::ConstInt, 0),
            int(Opcode::Jne, 5),
            int(Opcode::ConstInt, 1),
            bare(Opcode::Print),
            int(Opcode::ConstInt, 2),
            bare(Opcode::Print),
        ]));
        assert_eq!(out, "2\n");
    }

    #[test]
    fn test_step_limit() {
        // An endless loop.
        let looping = program(vec![int(Opcode::ArgCount, 0), int(Opcode::Jump, 1)]);
        let config = InterpreterConfig {
            max_steps: Some(1_000),
            ..Default::default()
        };

        let (result, _) = run_with_config(&looping, config);
        assert_eq!(
            result.unwrap_err().kind,
            PanicKind::StepLimitExceeded { limit: 1_000 }
        );
    }

    // ============================================================
    // Compiled programs
    // ============================================================

    #[test]
    fn test_while_loop() {
        let ast = [
            Node::assign("i", Node::Int(0)),
            Node::Loop {
                condition: Box::new(Node::compare(CompareOp::Lt, Node::load("i"), Node::Int(3))),
                body: vec![
                    Node::print(Node::load("i")),
                    Node::assign("i", bin(BinaryOp::Add, Node::load("i"), Node::Int(1))),
                ],
            },
        ];
        let (result, out) = run_ast(&ast);
        assert!(result.is_ok());
        assert_eq!(out, "0\n1\n2\n");
    }

    #[test]
    fn test_fibonacci() {
        // fn fib(n) { if n < 2 { ^ n } ^ fib(n - 1) + fib(n - 2) }
        let ast = [
            func(
                "fib",
                &["n"],
                vec![
                    cond(
                        Node::compare(CompareOp::Lt, Node::load("n"), Node::Int(2)),
                        vec![Node::ret(Node::load("n"))],
                        None,
                    ),
                    Node::ret(bin(
                        BinaryOp::Add,
                        Node::call("fib", vec![bin(BinaryOp::Sub, Node::load("n"), Node::Int(1))]),
                        Node::call("fib", vec![bin(BinaryOp::Sub, Node::load("n"), Node::Int(2))]),
                    )),
                ],
            ),
            Node::print(Node::call("fib", vec![Node::Int(15)])),
        ];
        let (result, out) = run_ast(&ast);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(out, "610\n");
    }

    #[test]
    fn test_arguments_keep_declaration_order() {
        let ast = [
            func(
                "sub",
                &["a", "b"],
                vec![Node::ret(bin(BinaryOp::Sub, Node::load("a"), Node::load("b")))],
            ),
            Node::print(Node::call("sub", vec![Node::Int(10), Node::Int(3)])),
        ];
        assert_eq!(run_ast(&ast).1, "7\n");
    }

    #[test]
    fn test_implicit_return_yields_zero() {
        let ast = [
            func("noop", &[], vec![Node::assign("x", Node::Int(1))]),
            Node::print(Node::call("noop", vec![])),
        ];
        assert_eq!(run_ast(&ast).1, "0\n");
    }

    #[test]
    fn test_bare_return_yields_zero() {
        let ast = [
            func("early", &[], vec![Node::Return(None), Node::print(Node::Int(9))]),
            Node::print(Node::call("early", vec![])),
        ];
        assert_eq!(run_ast(&ast).1, "0\n");
    }

    #[test]
    fn test_locals_do_not_leak_into_globals() {
        let ast = [
            func("f", &[], vec![Node::assign("tmp", Node::Int(1))]),
            Node::call("f", vec![]),
            Node::print(Node::load("tmp")),
        ];
        let (result, out) = run_ast(&ast);
        assert_eq!(
            result.unwrap_err().kind,
            PanicKind::UnknownVariable("tmp".to_string())
        );
        assert_eq!(out, "");
    }

    #[test]
    fn test_function_reads_globals() {
        let ast = [
            Node::assign("base", Node::Int(100)),
            func(
                "offset",
                &["x"],
                vec![Node::ret(bin(BinaryOp::Add, Node::load("base"), Node::load("x")))],
            ),
            Node::print(Node::call("offset", vec![Node::Int(5)])),
        ];
        assert_eq!(run_ast(&ast).1, "105\n");
    }

    #[test]
    fn test_recursion_limit() {
        let ast = [
            func("down", &[], vec![Node::ret(Node::call("down", vec![]))]),
            Node::call("down", vec![]),
        ];
        let panic = run_ast(&ast).0.unwrap_err();

        assert_eq!(panic.kind, PanicKind::RecursionTooDeep { limit: 200 });
        assert_eq!(panic.call_stack.len(), 200);
        assert!(panic.call_stack.iter().all(|f| f == "down"));
    }

    #[test]
    fn test_recursion_limit_is_configurable() {
        let ast = [
            func(
                "count",
                &["n"],
                vec![
                    cond(
                        Node::compare(CompareOp::Eq, Node::load("n"), Node::Int(0)),
                        vec![Node::ret(Node::Int(0))],
                        None,
                    ),
                    Node::ret(Node::call(
                        "count",
                        vec![bin(BinaryOp::Sub, Node::load("n"), Node::Int(1))],
                    )),
                ],
            ),
            Node::print(Node::call("count", vec![Node::Int(20)])),
        ];
        let program = Compiler::new().compile(&ast).unwrap();

        // 21 nested calls: count(20) .. count(0).
        let tight = InterpreterConfig {
            max_recursion_depth: 20,
            ..Default::default()
        };
        assert!(run_with_config(&program, tight).0.is_err());

        let enough = InterpreterConfig {
            max_recursion_depth: 21,
            ..Default::default()
        };
        assert_eq!(run_with_config(&program, enough).1, "0\n");
    }

    #[test]
    fn test_arity_mismatch() {
        let ast = [
            func("one", &["x"], vec![Node::ret(Node::load("x"))]),
            Node::call("one", vec![]),
        ];
        assert_eq!(
            run_ast(&ast).0.unwrap_err().kind,
            PanicKind::ArityMismatch {
                callee: "one".to_string(),
                expected: 1,
                got: 0,
            }
        );
    }

    #[test]
    fn test_calling_non_function() {
        let ast = [Node::assign("x", Node::Int(3)), Node::call("x", vec![])];
        assert_eq!(
            run_ast(&ast).0.unwrap_err().kind,
            PanicKind::NotCallable { type_name: "Integer" }
        );
    }

    #[test]
    fn test_unassigned_local() {
        // fn f(c) { if c { y := 1 } ^ y }
        let ast = [
            func(
                "f",
                &["c"],
                vec![
                    cond(Node::load("c"), vec![Node::assign("y", Node::Int(1))], None),
                    Node::ret(Node::load("y")),
                ],
            ),
            Node::print(Node::call("f", vec![Node::Int(1)])),
            Node::print(Node::call("f", vec![Node::Int(0)])),
        ];
        let (result, out) = run_ast(&ast);
        assert_eq!(out, "1\n");
        let panic = result.unwrap_err();
        assert_eq!(panic.kind, PanicKind::UnassignedLocal { slot: 1 });
        assert_eq!(panic.call_stack, vec!["f".to_string()]);
    }

    #[test]
    fn test_assert() {
        let ok = [Node::Assert(Box::new(Node::Int(1)))];
        assert!(run_ast(&ok).0.is_ok());

        let failing = [Node::Assert(Box::new(Node::load("false")))];
        assert_eq!(run_ast(&failing).0.unwrap_err().kind, PanicKind::AssertionFailed);
    }

    #[test]
    fn test_list_aliasing_and_methods() {
        // xs := [1, 2]; ys := xs; ys.append(3); print(xs); print(xs.length)
        let ast = [
            Node::assign("xs", Node::List(vec![Node::Int(1), Node::Int(2)])),
            Node::assign("ys", Node::load("xs")),
            Node::MethodCall {
                receiver: Box::new(Node::load("ys")),
                method: "append".to_string(),
                args: vec![Node::Int(3)],
            },
            Node::print(Node::load("xs")),
            Node::print(Node::Attribute {
                target: Box::new(Node::load("xs")),
                name: "length".to_string(),
            }),
        ];
        assert_eq!(run_ast(&ast).1, "[1, 2, 3]\n3\n");
    }

    #[test]
    fn test_swap_item() {
        let ast = [
            Node::assign("xs", Node::List(vec![Node::Int(1), Node::Int(2), Node::Int(3)])),
            Node::SwapItem {
                target: Box::new(Node::load("xs")),
                left: Box::new(Node::Int(0)),
                right: Box::new(Node::Int(2)),
            },
            Node::print(Node::load("xs")),
        ];
        assert_eq!(run_ast(&ast).1, "[3, 2, 1]\n");
    }

    #[test]
    fn test_index_out_of_bounds() {
        let ast = [Node::print(Node::GetItem {
            target: Box::new(Node::List(vec![Node::Int(1)])),
            index: Box::new(Node::Int(5)),
        })];
        assert_eq!(
            run_ast(&ast).0.unwrap_err().kind,
            PanicKind::IndexOutOfBounds { index: 5, len: 1 }
        );
    }

    #[test]
    fn test_indexing_non_list() {
        let ast = [Node::print(Node::GetItem {
            target: Box::new(Node::Int(1)),
            index: Box::new(Node::Int(0)),
        })];
        assert!(matches!(
            run_ast(&ast).0.unwrap_err().kind,
            PanicKind::UnsupportedOperation { lhs: "Integer", .. }
        ));
    }

    #[test]
    fn test_function_display_value() {
        let ast = [
            func("f", &[], vec![]),
            Node::print(Node::load("f")),
        ];
        // ARG_COUNT x3, MAKE_FUNC at 4, so the body starts at 6.
        assert_eq!(run_ast(&ast).1, "<fn f at 6>\n");
    }

    #[test]
    fn test_panic_inside_nested_calls_records_stack() {
        let ast = [
            func("inner", &[], vec![Node::ret(bin(BinaryOp::Div, Node::Int(1), Node::Int(0)))]),
            func("outer", &[], vec![Node::ret(Node::call("inner", vec![]))]),
            Node::call("outer", vec![]),
        ];
        let panic = run_ast(&ast).0.unwrap_err();
        assert_eq!(panic.kind, PanicKind::DivisionByZero);
        assert_eq!(panic.call_stack, vec!["inner".to_string(), "outer".to_string()]);
    }

    #[test]
    fn test_deep_recursion_grows_host_stack() {
        // count(n) recurses n + 1 levels on the default test thread.
        let ast = [
            func(
                "count",
                &["n"],
                vec![
                    cond(
                        Node::compare(CompareOp::Eq, Node::load("n"), Node::Int(0)),
                        vec![Node::ret(Node::Int(0))],
                        None,
                    ),
                    Node::ret(bin(
                        BinaryOp::Add,
                        Node::call("count", vec![bin(BinaryOp::Sub, Node::load("n"), Node::Int(1))]),
                        Node::Int(1),
                    )),
                ],
            ),
            Node::print(Node::call("count", vec![Node::Int(3000)])),
        ];
        let program = Compiler::new().compile(&ast).unwrap();
        let config = InterpreterConfig {
            max_recursion_depth: 5000,
            ..Default::default()
        };

        let (result, out) = run_with_config(&program, config);
        assert!(result.is_ok());
        assert_eq!(out, "3000\n");
    }

    /// Accepts writes, fails every flush.
    struct FailingFlush(Vec<u8>);

    impl Write for FailingFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    #[test]
    fn test_failed_final_flush_panics() {
        let program = Compiler::new().compile(&[Node::print(Node::Int(1))]).unwrap();
        let mut interpreter = Interpreter::new(&program, FailingFlush(Vec::new()));

        let panic = interpreter.run().unwrap_err();
        assert_eq!(panic.kind, PanicKind::Output("disk full".to_string()));
    }

    #[test]
    fn test_guest_panic_wins_over_flush_failure() {
        let program = Compiler::new().compile(&[Node::print(Node::load("nope"))]).unwrap();
        let mut interpreter = Interpreter::new(&program, FailingFlush(Vec::new()));

        let panic = interpreter.run().unwrap_err();
        assert_eq!(panic.kind, PanicKind::UnknownVariable("nope".to_string()));
    }
}
