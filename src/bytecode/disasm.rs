use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::bytecode::ir::Program;
use crate::bytecode::op::{Instruction, Opcode, Operand};

/// Render a program listing. Jump targets are marked with `►` and preceded
/// by a separator; function definitions get a banner.
pub fn disassemble(program: &Program) -> String {
    let jump_targets = collect_jump_targets(program);
    let mut out = String::new();

    let _ = writeln!(out, "=== BYTECODE PROGRAM ===");
    let _ = writeln!(out, " {} instructions", program.len());

    for (pc, instruction) in program.instructions.iter().enumerate() {
        if instruction.opcode == Opcode::MakeFunc {
            let _ = writeln!(out, "════════════════════════════════════════");
            let _ = writeln!(out, " fn {}", instruction.text_operand().unwrap_or("?"));
            let _ = writeln!(out, "════════════════════════════════════════");
        }

        let is_target = jump_targets.contains(&pc);
        if is_target {
            let _ = writeln!(out, "      ┌──────────────────────────────────");
        }

        let marker = if is_target { "► " } else { "  " };
        let _ = writeln!(out, "{:04} {}{}", pc, marker, format_instruction(pc, instruction));
    }

    out
}

fn collect_jump_targets(program: &Program) -> BTreeSet<usize> {
    program
        .instructions
        .iter()
        .filter(|i| i.opcode.is_jump())
        .filter_map(|i| i.int_operand())
        .filter_map(|target| usize::try_from(target).ok())
        .collect()
}

fn format_instruction(pc: usize, instruction: &Instruction) -> String {
    let name = instruction.opcode.name();
    match (&instruction.operand, instruction.opcode) {
        (Operand::Int(target), Opcode::Jump | Opcode::Jne) => {
            let direction = if (*target as usize) <= pc { "↑" } else { "↓" };
            format!("{:<12}{} {}", name, target, direction)
        }
        (Operand::Int(0), Opcode::Return) => format!("{:<12}0  ; default result", name),
        (Operand::Text(s), Opcode::String) => format!("{:<12}{:?}", name, s),
        (Operand::Int(n), _) => format!("{:<12}{}", name, n),
        (Operand::Text(s), _) => format!("{:<12}{}", name, s),
        (Operand::None, _) => name.to_string(),
    }
}
