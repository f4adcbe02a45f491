use crate::bytecode::ir::Program;
use crate::bytecode::op::Instruction;
use crate::lang::value::Value;
use crate::runtime::runtime_error::{Panic, PanicKind};

/// Activation record of one guest call.
///
/// The slot buffer holds the locals first and the operand stack after them:
///
/// ```text
/// [ local 0 .. local n-1 | stack 0 .. stack d-1 ]
///                          ^ min_stack_ptr
/// ```
///
/// The buffer is sized from the compiled bounds and never grows, so a push
/// past the end or a pop below `min_stack_ptr` means the bytecode is broken.
#[derive(Debug)]
pub struct Frame<'p> {
    program: &'p Program,
    pub pc: usize,
    slots: Vec<Option<Value>>,
    stack_ptr: usize,
    min_stack_ptr: usize,
}

impl<'p> Frame<'p> {
    /// Build a frame whose first slots hold `args`.
    pub fn new(
        program: &'p Program,
        entry: usize,
        args: Vec<Value>,
        locals_count: usize,
        stack_depth: usize,
    ) -> Result<Self, Panic> {
        if args.len() > locals_count {
            return Err(Panic::malformed(
                entry,
                format!("{} arguments for {} local slots", args.len(), locals_count),
            ));
        }

        let mut slots: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        slots.resize(locals_count + stack_depth, None);

        Ok(Frame {
            program,
            pc: entry,
            slots,
            stack_ptr: locals_count,
            min_stack_ptr: locals_count,
        })
    }

    /// The instruction at `pc`, advancing past it. `None` past the end.
    pub fn fetch(&mut self) -> Option<&'p Instruction> {
        let instruction = self.program.get(self.pc)?;
        self.pc += 1;
        Some(instruction)
    }

    pub fn jump(&mut self, target: usize) {
        self.pc = target;
    }

    /// Address of the instruction being executed.
    pub fn current_pc(&self) -> usize {
        self.pc.saturating_sub(1)
    }

    pub fn stack_len(&self) -> usize {
        self.stack_ptr - self.min_stack_ptr
    }

    pub fn push(&mut self, value: Value) -> Result<(), Panic> {
        if self.stack_ptr >= self.slots.len() {
            return Err(Panic::malformed(self.current_pc(), "operand stack overflow"));
        }
        self.slots[self.stack_ptr] = Some(value);
        self.stack_ptr += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, Panic> {
        if self.stack_ptr <= self.min_stack_ptr {
            return Err(Panic::malformed(self.current_pc(), "operand stack underflow"));
        }
        self.stack_ptr -= 1;
        self.slots[self.stack_ptr]
            .take()
            .ok_or_else(|| Panic::malformed(self.current_pc(), "empty operand slot"))
    }

    /// Pop `n` values, returned in the order they were pushed.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, Panic> {
        if n > self.stack_len() {
            return Err(Panic::malformed(self.current_pc(), "operand stack underflow"));
        }
        let start = self.stack_ptr - n;
        let values = self.slots[start..self.stack_ptr]
            .iter_mut()
            .map(|slot| slot.take())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Panic::malformed(self.current_pc(), "empty operand slot"))?;
        self.stack_ptr = start;
        Ok(values)
    }

    pub fn load(&self, slot: usize) -> Result<Value, Panic> {
        self.check_local(slot)?;
        self.slots[slot]
            .clone()
            .ok_or_else(|| PanicKind::UnassignedLocal { slot }.into())
    }

    pub fn store(&mut self, slot: usize, value: Value) -> Result<(), Panic> {
        self.check_local(slot)?;
        self.slots[slot] = Some(value);
        Ok(())
    }

    fn check_local(&self, slot: usize) -> Result<(), Panic> {
        if slot >= self.min_stack_ptr {
            return Err(Panic::malformed(
                self.current_pc(),
                format!("local slot {} out of range", slot),
            ));
        }
        Ok(())
    }
}
