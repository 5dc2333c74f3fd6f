use super::opcode::Opcode;
use super::{Bytecode, Constant};

fn emit(bc: &mut Bytecode, op: Opcode, operands: &[i32]) {
  bc.emit(op);
  for &value in operands {
    bc.emit_i32(value);
  }
}

#[test]
fn const_indices_are_sequential() {
  let mut bc = Bytecode::new();
  assert_eq!(bc.add_const_int(1), 0);
  assert_eq!(bc.add_const_double(2.5), 1);
  assert_eq!(bc.add_const_string("three"), 2);
  assert_eq!(bc.add_const_function(0, 0), 3);
  // no interning: a duplicate gets its own slot
  assert_eq!(bc.add_const_string("three"), 4);
  assert_eq!(bc.consts().len(), 5);
}

#[test]
fn emit_is_little_endian() {
  let mut bc = Bytecode::new();
  emit(&mut bc, Opcode::Jmp, &[0x0102_0304]);
  assert_eq!(bc.code(), &[8, 0x04, 0x03, 0x02, 0x01]);
}

#[test]
fn patch_fills_in_a_placeholder() {
  let mut bc = Bytecode::new();
  bc.add_const_int(7);
  bc.add_const_int(35);
  bc.emit(Opcode::CallUser);
  let at = bc.pos();
  bc.emit_i32(0); // patched below
  bc.emit_i32(1);
  bc.emit_i32(0);
  let func = bc.add_const_function(99, 1);
  bc.patch_i32(at, func as i32);
  assert_eq!(&bc.code()[at..at + 4], &[2, 0, 0, 0]);
  assert_eq!(func, 2);
}

#[test]
fn constant_display() {
  assert_eq!(Constant::Int(42).to_string(), "42");
  assert_eq!(Constant::Double(2.5).to_string(), "2.5");
  assert_eq!(Constant::String("yo".into()).to_string(), "\"yo\"");
  assert_eq!(
    Constant::Function { start: 4, nargs: 1 }.to_string(),
    "<function @4 (1 args)>"
  );
}

#[test]
fn disassembly_renders_each_instruction() {
  let mut bc = Bytecode::new();
  let s = bc.add_const_string("hi") as i32;
  let f = bc.add_const_function(18, 0) as i32;
  emit(&mut bc, Opcode::LoadConst, &[0, s]);
  emit(&mut bc, Opcode::MkClosure, &[1, f, 2, 0, 0]);
  emit(&mut bc, Opcode::CallClosure, &[1, 0, 2]);
  emit(&mut bc, Opcode::Halt, &[]);

  let text = bc.disassemble().to_string();
  assert!(text.contains("load_const r0, [0] ; \"hi\""));
  assert!(text.contains("mk_closure r1, [1], captures=[r0, r0]"));
  assert!(text.contains("call_closure r1, nargs=0, dst=r2"));
  assert!(text.contains("halt"));
  assert_snapshot!(text);
}

#[test]
fn disassembly_marks_unknown_bytes() {
  let mut bc = Bytecode::new();
  bc.emit_u8(200);
  assert!(bc.disassemble().to_string().contains("<unknown opcode 200>"));
}
