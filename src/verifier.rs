//! Structural bytecode verification.
//!
//! A single linear pass that confirms every instruction's operand bytes lie
//! within the code buffer, so the dispatch loop can never walk off the end
//! of a decode. Register indices, constant indices, and branch targets carry
//! no type information in the wire format and stay runtime checks.

use crate::bytecode::opcode::Opcode;
use crate::bytecode::Bytecode;
use crate::error::{Error, Result};

/// Walk the code buffer from start to end, one instruction at a time.
///
/// Fixed-width instructions advance by their operand width. `mk_closure`
/// reads its capture count and additionally advances four bytes per capture,
/// failing if the count is negative or the capture list is cut short.
pub fn verify(bytecode: &Bytecode) -> Result<()> {
  let code = bytecode.code();
  let mut ip = 0;
  while ip < code.len() {
    let op = Opcode::try_from(code[ip]).map_err(Error::UnknownOpcode)?;
    ip += 1;
    if let Opcode::MkClosure = op {
      if ip + 12 > code.len() {
        return Err(Error::TruncatedInstruction);
      }
      let ncaptures = i32::from_le_bytes([code[ip + 8], code[ip + 9], code[ip + 10], code[ip + 11]]);
      if ncaptures < 0 {
        return Err(Error::NegativeCaptureCount);
      }
      ip += 12;
      if ip + ncaptures as usize * 4 > code.len() {
        return Err(Error::TruncatedCaptures);
      }
      ip += ncaptures as usize * 4;
    } else {
      ip += 4 * op.operand_count();
      if ip > code.len() {
        return Err(Error::TruncatedInstruction);
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn emit(bc: &mut Bytecode, op: Opcode, operands: &[i32]) {
    bc.emit(op);
    for &value in operands {
      bc.emit_i32(value);
    }
  }

  #[test]
  fn empty_code_verifies() {
    verify(&Bytecode::new()).unwrap();
  }

  #[test]
  fn accepts_every_well_formed_instruction() {
    let mut bc = Bytecode::new();
    emit(&mut bc, Opcode::LoadConst, &[0, 0]);
    emit(&mut bc, Opcode::Mov, &[1, 0]);
    emit(&mut bc, Opcode::Add, &[2, 0, 1]);
    emit(&mut bc, Opcode::Sub, &[2, 0, 1]);
    emit(&mut bc, Opcode::Mul, &[2, 0, 1]);
    emit(&mut bc, Opcode::Div, &[2, 0, 1]);
    emit(&mut bc, Opcode::Print, &[2]);
    emit(&mut bc, Opcode::Jmp, &[0]);
    emit(&mut bc, Opcode::Jz, &[0, 0]);
    emit(&mut bc, Opcode::AllocStr, &[0, 0]);
    emit(&mut bc, Opcode::Call, &[0, 0, 0]);
    emit(&mut bc, Opcode::CallUser, &[0, 0, 0]);
    emit(&mut bc, Opcode::Ret, &[0]);
    emit(&mut bc, Opcode::Throw, &[0]);
    emit(&mut bc, Opcode::PushHandler, &[0]);
    emit(&mut bc, Opcode::PopHandler, &[]);
    emit(&mut bc, Opcode::MkClosure, &[0, 0, 2, 1, 2]);
    emit(&mut bc, Opcode::CallClosure, &[0, 0, 0]);
    emit(&mut bc, Opcode::Halt, &[]);
    verify(&bc).unwrap();
  }

  #[test]
  fn rejects_unknown_opcodes() {
    let mut bc = Bytecode::new();
    bc.emit_u8(200);
    assert!(matches!(verify(&bc), Err(Error::UnknownOpcode(200))));
  }

  #[test]
  fn rejects_missing_operands() {
    let mut bc = Bytecode::new();
    bc.emit(Opcode::LoadConst);
    bc.emit_i32(0);
    // second operand missing
    assert!(matches!(verify(&bc), Err(Error::TruncatedInstruction)));
  }

  #[test]
  fn rejects_partial_operands() {
    let mut bc = Bytecode::new();
    bc.emit(Opcode::Jmp);
    bc.emit_u8(1);
    bc.emit_u8(0);
    assert!(matches!(verify(&bc), Err(Error::TruncatedInstruction)));
  }

  #[test]
  fn rejects_truncated_closure_header() {
    let mut bc = Bytecode::new();
    bc.emit(Opcode::MkClosure);
    bc.emit_i32(0);
    bc.emit_i32(0);
    assert!(matches!(verify(&bc), Err(Error::TruncatedInstruction)));
  }

  #[test]
  fn rejects_negative_capture_count() {
    let mut bc = Bytecode::new();
    emit(&mut bc, Opcode::MkClosure, &[0, 0, -1]);
    assert!(matches!(verify(&bc), Err(Error::NegativeCaptureCount)));
  }

  #[test]
  fn rejects_truncated_capture_list() {
    let mut bc = Bytecode::new();
    emit(&mut bc, Opcode::MkClosure, &[0, 0, 3, 1]);
    // only one of three capture registers present
    assert!(matches!(verify(&bc), Err(Error::TruncatedCaptures)));
  }

  #[test]
  fn zero_capture_closure_verifies() {
    let mut bc = Bytecode::new();
    emit(&mut bc, Opcode::MkClosure, &[0, 0, 0]);
    verify(&bc).unwrap();
  }
}
