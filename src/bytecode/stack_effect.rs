use crate::bytecode::op::{Instruction, Opcode};

/// Returns (pops, pushes) for an instruction, or None if the effect depends
/// on operands the instruction does not carry.
///
/// `MAKE_FUNC` is the only such opcode: it consumes its parameter names,
/// whose count was pushed by the preceding `ARG_COUNT`, so the compiler
/// accounts for it by hand.
pub fn effect(instruction: &Instruction) -> Option<(i64, i64)> {
    use Opcode::*;
    let n = instruction.int_operand().unwrap_or(0);
    Some(match instruction.opcode {
        LoadLocal | LoadGlobal | ConstInt | String | Arg | ArgCount => (0, 1),
        StoreLocal | StoreGlobal | Pop => (1, 0),

        Jump => (0, 0),
        Jne => (1, 0),

        Comp | Plus | Sub | Mul | Div | Modulus => (2, 1),

        // ( callee a1 .. an -- result )
        Call => (n + 1, 1),
        MakeFunc => return None,
        // RETURN 0 pushes a default result before popping it.
        Return if n == 0 => (0, 1),
        Return => (1, 0),

        Assert | Print => (1, 0),

        CreateList => (n, 1),
        GetItem => (2, 1),
        // ( list index value -- list )
        SetItem => (3, 1),
        // ( list left right -- list )
        SwapItem => (3, 1),
        Attribute => (1, 1),
        // The receiver stays below; only the method name is pushed.
        LoadMethod => (0, 1),
        // ( receiver name a1 .. an -- result )
        CallMethod => (n + 2, 1),
    })
}

/// Net change in stack height, when known.
pub fn net(instruction: &Instruction) -> Option<i64> {
    effect(instruction).map(|(pops, pushes)| pushes - pops)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_push_one() {
        assert_eq!(effect(&Instruction::int(Opcode::ConstInt, 5)), Some((0, 1)));
        assert_eq!(effect(&Instruction::text(Opcode::String, "s")), Some((0, 1)));
    }

    #[test]
    fn test_call_pops_callee_and_args() {
        assert_eq!(effect(&Instruction::int(Opcode::Call, 0)), Some((1, 1)));
        assert_eq!(effect(&Instruction::int(Opcode::Call, 3)), Some((4, 1)));
        assert_eq!(net(&Instruction::int(Opcode::CallMethod, 2)), Some(-3));
    }

    #[test]
    fn test_return_forms() {
        assert_eq!(effect(&Instruction::int(Opcode::Return, 1)), Some((1, 0)));
        assert_eq!(effect(&Instruction::int(Opcode::Return, 0)), Some((0, 1)));
    }

    #[test]
    fn test_setitem_leaves_list() {
        assert_eq!(net(&Instruction::bare(Opcode::SetItem)), Some(-2));
        assert_eq!(net(&Instruction::bare(Opcode::SwapItem)), Some(-2));
    }

    #[test]
    fn test_create_list() {
        assert_eq!(net(&Instruction::int(Opcode::CreateList, 0)), Some(1));
        assert_eq!(net(&Instruction::int(Opcode::CreateList, 4)), Some(-3));
    }

    #[test]
    fn test_make_func_unknown() {
        assert_eq!(effect(&Instruction::text(Opcode::MakeFunc, "f")), None);
    }
}
