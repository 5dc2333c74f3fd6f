use std::io::stdout;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use habu::{Bytecode, Opcode, Vm};

/// Assemble one of the showcase programs and run it.
#[derive(Parser)]
struct Args {
  /// Which program to run.
  #[arg(value_enum, default_value = "hello")]
  program: Program,
  /// Print the disassembly before running.
  #[arg(long)]
  disasm: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Program {
  /// Print a greeting from inside a user function, then an integer.
  Hello,
  /// Build a closure over two registers and call it.
  Closure,
  /// Throw inside a callee, land in the caller's handler.
  TryCatch,
  /// Add two constants.
  Math,
}

fn emit(bc: &mut Bytecode, op: Opcode, operands: &[i32]) {
  bc.emit(op);
  for &value in operands {
    bc.emit_i32(value);
  }
}

fn hello() -> Bytecode {
  let mut bc = Bytecode::new();
  let greeting = bc.add_const_string("Hello from the VM") as i32;
  let num = bc.add_const_int(12345) as i32;

  emit(&mut bc, Opcode::LoadConst, &[0, greeting]);
  bc.emit(Opcode::CallUser);
  let func_slot = bc.pos();
  bc.emit_i32(0); // patched once the function body exists
  bc.emit_i32(1);
  bc.emit_i32(0);
  emit(&mut bc, Opcode::LoadConst, &[1, num]);
  emit(&mut bc, Opcode::Print, &[1]);
  emit(&mut bc, Opcode::Halt, &[]);

  let start = bc.pos() as u32;
  emit(&mut bc, Opcode::Print, &[0]);
  emit(&mut bc, Opcode::Ret, &[0]);
  let func = bc.add_const_function(start, 1);
  bc.patch_i32(func_slot, func as i32);
  bc
}

fn closure() -> Bytecode {
  let mut bc = Bytecode::new();
  let s = bc.add_const_string("Captured string") as i32;
  let n = bc.add_const_int(42) as i32;

  emit(&mut bc, Opcode::LoadConst, &[2, s]);
  emit(&mut bc, Opcode::LoadConst, &[3, n]);
  bc.emit(Opcode::MkClosure);
  bc.emit_i32(1);
  let func_slot = bc.pos();
  bc.emit_i32(0); // patched below
  bc.emit_i32(2);
  bc.emit_i32(2);
  bc.emit_i32(3);
  emit(&mut bc, Opcode::CallClosure, &[1, 0, 0]);
  emit(&mut bc, Opcode::Halt, &[]);

  let start = bc.pos() as u32;
  emit(&mut bc, Opcode::Print, &[0]);
  emit(&mut bc, Opcode::Print, &[1]);
  emit(&mut bc, Opcode::Ret, &[0]);
  let func = bc.add_const_function(start, 0);
  bc.patch_i32(func_slot, func as i32);
  bc
}

fn try_catch() -> Bytecode {
  let mut bc = Bytecode::new();
  let s = bc.add_const_string("Exception: boom!") as i32;

  bc.emit(Opcode::PushHandler);
  let handler_slot = bc.pos();
  bc.emit_i32(0); // patched below
  bc.emit(Opcode::CallUser);
  let func_slot = bc.pos();
  bc.emit_i32(0); // patched below
  bc.emit_i32(0);
  bc.emit_i32(0);
  emit(&mut bc, Opcode::Halt, &[]);

  let handler = bc.pos() as i32;
  emit(&mut bc, Opcode::Print, &[0]);
  emit(&mut bc, Opcode::PopHandler, &[]);
  emit(&mut bc, Opcode::Halt, &[]);

  let start = bc.pos() as u32;
  emit(&mut bc, Opcode::LoadConst, &[0, s]);
  emit(&mut bc, Opcode::Throw, &[0]);
  let func = bc.add_const_function(start, 0);
  bc.patch_i32(handler_slot, handler);
  bc.patch_i32(func_slot, func as i32);
  bc
}

fn math() -> Bytecode {
  let mut bc = Bytecode::new();
  let a = bc.add_const_int(7) as i32;
  let b = bc.add_const_int(35) as i32;

  emit(&mut bc, Opcode::LoadConst, &[0, a]);
  emit(&mut bc, Opcode::LoadConst, &[1, b]);
  emit(&mut bc, Opcode::Add, &[2, 0, 1]);
  emit(&mut bc, Opcode::Print, &[2]);
  emit(&mut bc, Opcode::Halt, &[]);
  bc
}

fn main() -> Result<()> {
  let args = Args::parse();
  let bc = match args.program {
    Program::Hello => hello(),
    Program::Closure => closure(),
    Program::TryCatch => try_catch(),
    Program::Math => math(),
  };

  let mut vm = Vm::new();
  vm.load(&bc);
  if args.disasm {
    vm.disassemble(&mut stdout())?;
    println!();
  }
  vm.run()?;
  Ok(())
}
