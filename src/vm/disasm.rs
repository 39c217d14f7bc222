//! Pretty-printing for trace lines and the interactive `d[isassemble]`
//! command.

use crate::opcode::Opcode;

pub fn disassemble_one(opcode: Opcode, arg: u64, pc: u64) -> String {
    if opcode.instr_size() == 2 {
        format!("{:06} {:<6} {}", pc, opcode, arg)
    } else {
        format!("{:06} {:<6}", pc, opcode)
    }
}

/// Disassemble `count` instructions starting at `start`, skipping
/// argument words. Malformed opcodes are rendered as `???` rather than
/// aborting the dump (this is diagnostic output, not execution).
pub fn disassemble_window(code: &[u64], start: u64, count: usize) -> Vec<String> {
    use num_traits::FromPrimitive;

    let mut lines = Vec::with_capacity(count);
    let mut pc = start;
    for _ in 0..count {
        if pc as usize >= code.len() {
            break;
        }
        let word = code[pc as usize];
        match Opcode::from_u64(word) {
            Some(op) => {
                let size = op.instr_size();
                let arg = if size == 2 && (pc + 1) < code.len() as u64 {
                    code[(pc + 1) as usize]
                } else {
                    0
                };
                lines.push(disassemble_one(op, arg, pc));
                pc += size;
            }
            None => {
                lines.push(format!("{:06} ??? ({})", pc, word));
                pc += 1;
            }
        }
    }
    lines
}
