pub mod disasm;
pub mod opcode;

use std::fmt::Display;

use beef::lean::Cow;

use self::disasm::Disassembly;
use self::opcode::Opcode;

/// An immutable program: a linear code buffer plus an ordered constant pool.
///
/// Instructions are a single opcode byte followed by zero or more 32-bit
/// little-endian signed operands. Hosts and tests build programs through the
/// append-only emitters below; once loaded into a VM the program never
/// changes.
#[derive(Clone, Default)]
pub struct Bytecode {
  code: Vec<u8>,
  consts: Vec<Constant>,
}

/// An entry in the constant pool.
///
/// Constants are immutable for the program's lifetime. Duplicates are
/// permitted; the pool does no interning.
#[derive(Clone, Debug)]
pub enum Constant {
  Int(i64),
  Double(f64),
  String(Cow<'static, str>),
  /// An entry point within `code` and the number of arguments the function
  /// reads from the start of the register file.
  Function { start: u32, nargs: u32 },
}

impl Display for Constant {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Constant::Int(v) => write!(f, "{v}"),
      Constant::Double(v) => write!(f, "{v}"),
      Constant::String(v) => write!(f, "{:?}", v.as_ref()),
      Constant::Function { start, nargs } => write!(f, "<function @{start} ({nargs} args)>"),
    }
  }
}

impl Bytecode {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a single opcode byte.
  pub fn emit(&mut self, op: Opcode) {
    self.code.push(op as u8);
  }

  /// Append a raw byte.
  pub fn emit_u8(&mut self, byte: u8) {
    self.code.push(byte);
  }

  /// Append a little-endian 32-bit operand.
  pub fn emit_i32(&mut self, value: i32) {
    self.code.extend_from_slice(&value.to_le_bytes());
  }

  /// Current end of code.
  ///
  /// Hosts record this to mark function entry points and jump targets.
  pub fn pos(&self) -> usize {
    self.code.len()
  }

  /// Overwrite a previously emitted 32-bit operand.
  ///
  /// Forward references are emitted as placeholders and patched once the
  /// target offset is known.
  ///
  /// # Panics
  ///
  /// Panics if `at + 4` is past the end of code.
  pub fn patch_i32(&mut self, at: usize, value: i32) {
    self.code[at..at + 4].copy_from_slice(&value.to_le_bytes());
  }

  pub fn add_const_int(&mut self, value: i64) -> usize {
    self.consts.push(Constant::Int(value));
    self.consts.len() - 1
  }

  pub fn add_const_double(&mut self, value: f64) -> usize {
    self.consts.push(Constant::Double(value));
    self.consts.len() - 1
  }

  pub fn add_const_string(&mut self, value: impl Into<Cow<'static, str>>) -> usize {
    self.consts.push(Constant::String(value.into()));
    self.consts.len() - 1
  }

  pub fn add_const_function(&mut self, start: u32, nargs: u32) -> usize {
    self.consts.push(Constant::Function { start, nargs });
    self.consts.len() - 1
  }

  pub fn code(&self) -> &[u8] {
    &self.code
  }

  pub fn consts(&self) -> &[Constant] {
    &self.consts
  }

  pub fn disassemble(&self) -> Disassembly<'_> {
    Disassembly::new(self)
  }
}

#[cfg(test)]
mod tests;
