//! A register-based bytecode virtual machine.
//!
//! The VM executes a linear byte-encoded program against a fixed-size
//! register file, with a garbage-collected heap of strings and objects,
//! user function calls with frame save/restore, first-class closures, and
//! a throw/handler exception protocol.
//!
//! ```
//! use habu::{Bytecode, Opcode, Vm};
//!
//! let mut bc = Bytecode::new();
//! let a = bc.add_const_int(7);
//! let b = bc.add_const_int(35);
//!
//! bc.emit(Opcode::LoadConst);
//! bc.emit_i32(0);
//! bc.emit_i32(a as i32);
//! bc.emit(Opcode::LoadConst);
//! bc.emit_i32(1);
//! bc.emit_i32(b as i32);
//! bc.emit(Opcode::Add);
//! bc.emit_i32(2);
//! bc.emit_i32(0);
//! bc.emit_i32(1);
//! bc.emit(Opcode::Print);
//! bc.emit_i32(2);
//! bc.emit(Opcode::Halt);
//!
//! let mut vm = Vm::builder().with_io(Vec::<u8>::new()).build();
//! vm.load(&bc);
//! vm.run().unwrap();
//!
//! let out = vm.io().as_any().downcast_ref::<Vec<u8>>().unwrap();
//! assert_eq!(out.as_slice(), b"42\n");
//! ```

#[macro_use]
mod util;

mod bytecode;
mod error;
mod heap;
mod value;
mod verifier;
mod vm;

pub use bytecode::disasm::Disassembly;
pub use bytecode::opcode::Opcode;
pub use bytecode::{Bytecode, Constant};
pub use error::{Error, Result};
pub use value::Value;
pub use verifier::verify;
pub use vm::{NativeFn, Stdout, Vm, VmBuilder};
