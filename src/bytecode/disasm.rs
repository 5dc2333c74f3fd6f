use std::fmt::Display;

use super::opcode::Opcode;
use super::{Bytecode, Constant};
use crate::util::{num_digits, JoinIter};

/// Human-readable rendering of a program.
///
/// One line per instruction: byte offset, mnemonic, operands, and an echo of
/// the referenced constant where there is one. The format exists for
/// debugging and tests and is not stable.
pub struct Disassembly<'a> {
  bytecode: &'a Bytecode,
}

impl<'a> Disassembly<'a> {
  pub(crate) fn new(bytecode: &'a Bytecode) -> Self {
    Self { bytecode }
  }
}

struct Reg(i32);

impl Display for Reg {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "r{}", self.0)
  }
}

fn read_i32(code: &[u8], ip: &mut usize) -> Option<i32> {
  let bytes = code.get(*ip..*ip + 4)?;
  let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
  *ip += 4;
  Some(value)
}

fn write_const(
  f: &mut std::fmt::Formatter<'_>,
  consts: &[Constant],
  index: i32,
) -> std::fmt::Result {
  if let Some(constant) = usize::try_from(index).ok().and_then(|i| consts.get(i)) {
    write!(f, " ; {constant}")?;
  }
  Ok(())
}

impl<'a> Display for Disassembly<'a> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let code = self.bytecode.code();
    let consts = self.bytecode.consts();
    let width = num_digits(code.len());
    let mut ip = 0;
    while ip < code.len() {
      write!(f, "{ip:>width$} | ")?;
      let Ok(op) = Opcode::try_from(code[ip]) else {
        // cannot resync past an unknown byte
        writeln!(f, "<unknown opcode {}>", code[ip])?;
        return Ok(());
      };
      ip += 1;
      let mut operands = [0i32; 3];
      let mut truncated = false;
      for slot in operands.iter_mut().take(op.operand_count()) {
        match read_i32(code, &mut ip) {
          Some(v) => *slot = v,
          None => {
            truncated = true;
            break;
          }
        }
      }
      if truncated {
        writeln!(f, "{} <truncated>", op.name())?;
        return Ok(());
      }
      match op {
        Opcode::Halt | Opcode::PopHandler => writeln!(f, "{}", op.name())?,
        Opcode::LoadConst | Opcode::AllocStr => {
          let [reg, index, _] = operands;
          write!(f, "{} {}, [{index}]", op.name(), Reg(reg))?;
          write_const(f, consts, index)?;
          writeln!(f)?;
        }
        Opcode::Mov => {
          let [dst, src, _] = operands;
          writeln!(f, "{} {}, {}", op.name(), Reg(dst), Reg(src))?;
        }
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
          let [dst, a, b] = operands;
          writeln!(f, "{} {}, {}, {}", op.name(), Reg(dst), Reg(a), Reg(b))?;
        }
        Opcode::Print | Opcode::Ret | Opcode::Throw => {
          writeln!(f, "{} {}", op.name(), Reg(operands[0]))?;
        }
        Opcode::Jmp | Opcode::PushHandler => {
          writeln!(f, "{} {}", op.name(), operands[0])?;
        }
        Opcode::Jz => {
          let [reg, target, _] = operands;
          writeln!(f, "{} {}, {}", op.name(), Reg(reg), target)?;
        }
        Opcode::Call => {
          let [index, nargs, dst] = operands;
          writeln!(f, "{} f{index}, nargs={nargs}, dst={}", op.name(), Reg(dst))?;
        }
        Opcode::CallUser => {
          let [index, nargs, dst] = operands;
          write!(f, "{} [{index}], nargs={nargs}, dst={}", op.name(), Reg(dst))?;
          write_const(f, consts, index)?;
          writeln!(f)?;
        }
        Opcode::MkClosure => {
          let [dst, index, ncaptures] = operands;
          let mut captures = Vec::new();
          for _ in 0..ncaptures.max(0) {
            match read_i32(code, &mut ip) {
              Some(reg) => captures.push(reg),
              None => {
                writeln!(f, "{} <truncated captures>", op.name())?;
                return Ok(());
              }
            }
          }
          write!(
            f,
            "{} {}, [{index}], captures=[{}]",
            op.name(),
            Reg(dst),
            captures.iter().copied().map(Reg).join(", ")
          )?;
          write_const(f, consts, index)?;
          writeln!(f)?;
        }
        Opcode::CallClosure => {
          let [obj, nargs, dst] = operands;
          writeln!(f, "{} {}, nargs={nargs}, dst={}", op.name(), Reg(obj), Reg(dst))?;
        }
      }
    }
    Ok(())
  }
}
