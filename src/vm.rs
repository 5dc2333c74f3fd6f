use std::io::Write;
use std::rc::Rc;

use beef::lean::Cow;
use indexmap::IndexMap;

use crate::bytecode::opcode::Opcode;
use crate::bytecode::{Bytecode, Constant};
use crate::error::{Error, Result};
use crate::heap::Heap;
use crate::value::Value;
use crate::verifier;

/// Output sink for `print` and the debug helpers.
///
/// `as_any` lets a host downcast back to the concrete sink, e.g. to read
/// output captured in a `Vec<u8>`.
pub trait Stdout: std::io::Write + std::any::Any {
  fn as_any(&self) -> &dyn std::any::Any;
}

impl<T: std::io::Write + std::any::Any> Stdout for T {
  fn as_any(&self) -> &dyn std::any::Any {
    self
  }
}

/// A host function invocable through the `call` instruction.
///
/// Receives the VM and a snapshot of `regs[0..nargs]`; the returned value is
/// written to the destination register.
pub type NativeFn = Rc<dyn Fn(&mut Vm, &[Value]) -> Value>;

/// Activation record for a user function call.
///
/// `saved` holds the caller's `regs[0..nargs]`, the only window a callee is
/// allowed to clobber besides the capture registers established by the call
/// itself.
struct Frame {
  return_ip: usize,
  return_dst: i32,
  saved: Vec<Value>,
}

/// An installed try-target.
struct Handler {
  ip: usize,
  frame_depth: usize,
}

enum ControlFlow {
  Continue,
  Halt,
}

pub struct Vm {
  regs: Vec<Value>,
  bytecode: Bytecode,
  ip: usize,
  heap: Heap,
  frames: Vec<Frame>,
  handlers: Vec<Handler>,
  natives: IndexMap<u32, NativeFn>,
  gc_threshold: usize,
  stdout: Box<dyn Stdout>,
}

pub struct VmBuilder {
  num_registers: usize,
  gc_threshold: usize,
  stdout: Option<Box<dyn Stdout>>,
}

impl Vm {
  pub fn builder() -> VmBuilder {
    VmBuilder {
      num_registers: 32,
      gc_threshold: 1024,
      stdout: None,
    }
  }

  pub fn new() -> Self {
    Self::builder().build()
  }
}

impl Default for Vm {
  fn default() -> Self {
    Self::new()
  }
}

impl VmBuilder {
  /// Size of the register file. Must be at least 1.
  pub fn with_registers(mut self, num_registers: usize) -> Self {
    assert!(num_registers >= 1, "the register file cannot be empty");
    self.num_registers = num_registers;
    self
  }

  /// Live-string count above which a collection runs between instructions.
  pub fn with_gc_threshold(mut self, gc_threshold: usize) -> Self {
    self.gc_threshold = gc_threshold;
    self
  }

  pub fn with_io<T: Stdout + 'static>(mut self, stdout: T) -> Self {
    let _ = self.stdout.replace(Box::new(stdout));
    self
  }

  pub fn build(mut self) -> Vm {
    let stdout = self
      .stdout
      .take()
      .unwrap_or_else(|| Box::new(std::io::stdout()));
    Vm {
      regs: vec![Value::None; self.num_registers],
      bytecode: Bytecode::new(),
      ip: 0,
      heap: Heap::default(),
      frames: Vec::new(),
      handlers: Vec::new(),
      natives: IndexMap::new(),
      gc_threshold: self.gc_threshold,
      stdout,
    }
  }
}

impl Vm {
  /// Deep-copy a program into the VM and reset the instruction pointer.
  pub fn load(&mut self, bytecode: &Bytecode) {
    self.bytecode = bytecode.clone();
    self.ip = 0;
  }

  /// Structurally verify the loaded program. See [`crate::verify`].
  pub fn verify(&self) -> Result<()> {
    verifier::verify(&self.bytecode)
  }

  /// Verify the loaded program, then execute it to completion.
  ///
  /// Running ends at `halt`, at a `ret` with no frame to return to, or by
  /// falling off the end of code; all three are success. Every error kind
  /// aborts immediately, and an exception only becomes
  /// [`Error::UnhandledException`] once the handler stack is empty.
  pub fn run(&mut self) -> Result<()> {
    self.verify()?;
    tracing::debug!(
      code = self.bytecode.code().len(),
      consts = self.bytecode.consts().len(),
      "run"
    );
    while self.ip < self.bytecode.code().len() {
      let byte = self.bytecode.code()[self.ip];
      let op = Opcode::try_from(byte).map_err(Error::UnknownOpcode)?;
      self.ip += 1;
      match op {
        Opcode::Halt => return Ok(()),
        Opcode::LoadConst => self.op_load_const()?,
        Opcode::Mov => self.op_mov()?,
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => self.op_arith(op)?,
        Opcode::Print => self.op_print()?,
        Opcode::Jmp => self.op_jmp()?,
        Opcode::Jz => self.op_jz()?,
        Opcode::AllocStr => self.op_alloc_str()?,
        Opcode::Call => self.op_call()?,
        Opcode::CallUser => self.op_call_user()?,
        Opcode::Ret => match self.op_ret()? {
          ControlFlow::Continue => {}
          ControlFlow::Halt => return Ok(()),
        },
        Opcode::Throw => self.op_throw()?,
        Opcode::PushHandler => self.op_push_handler()?,
        Opcode::PopHandler => {
          // underflow is deliberately ignored
          self.handlers.pop();
        }
        Opcode::MkClosure => self.op_mk_closure()?,
        Opcode::CallClosure => self.op_call_closure()?,
      }
      if self.heap.live_strings() > self.gc_threshold {
        self.collect_garbage();
      }
    }
    Ok(())
  }

  /// Allocate a heap string, returning its index.
  pub fn alloc_string(&mut self, data: impl ToString) -> usize {
    self.heap.alloc_string(Cow::owned(data.to_string()))
  }

  /// Allocate a heap object with `field_count` fields, all `Value::None`.
  pub fn alloc_object(&mut self, field_count: usize) -> usize {
    self.heap.alloc_object(field_count)
  }

  /// Writes to dead or out-of-range slots are dropped.
  pub fn set_object_field(&mut self, object: usize, field: usize, value: Value) {
    self.heap.set_object_field(object, field, value);
  }

  /// Reads through dead or out-of-range slots yield `Value::None`.
  pub fn get_object_field(&self, object: usize, field: usize) -> Value {
    self.heap.object_field(object, field)
  }

  /// Register a host function under `index`, replacing any previous one.
  pub fn register_native(
    &mut self,
    index: u32,
    function: impl Fn(&mut Vm, &[Value]) -> Value + 'static,
  ) {
    self.natives.insert(index, Rc::new(function));
  }

  pub fn io(&self) -> &dyn Stdout {
    &*self.stdout
  }

  /// Write a disassembly of the loaded program.
  pub fn disassemble(&self, w: &mut impl std::io::Write) -> std::io::Result<()> {
    write!(w, "{}", self.bytecode.disassemble())
  }

  /// Debug dump of the register file.
  pub fn print_registers(&self, w: &mut impl std::io::Write) -> std::io::Result<()> {
    for (index, value) in self.regs.iter().enumerate() {
      write!(w, "r{index}: ")?;
      match *value {
        Value::Int(v) => writeln!(w, "INT {v}")?,
        Value::Double(v) => writeln!(w, "DOUBLE {v}")?,
        Value::Str(idx) => match self.heap.string(idx) {
          Some(s) => writeln!(w, "STRING {s:?}")?,
          None => writeln!(w, "STRING <oob>")?,
        },
        Value::Object(idx) => match self.heap.object_field_count(idx) {
          Some(n) => writeln!(w, "OBJECT(fields={n})")?,
          None => writeln!(w, "OBJECT <oob>")?,
        },
        Value::None => writeln!(w, "NONE")?,
      }
    }
    Ok(())
  }

  #[cfg(test)]
  pub(crate) fn registers(&self) -> &[Value] {
    &self.regs
  }

  #[cfg(test)]
  pub(crate) fn frame_depth(&self) -> usize {
    self.frames.len()
  }
}

impl Vm {
  fn read_i32(&mut self) -> Result<i32> {
    let code = self.bytecode.code();
    let bytes = code
      .get(self.ip..self.ip + 4)
      .ok_or(Error::TruncatedInstruction)?;
    let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    self.ip += 4;
    Ok(value)
  }

  fn reg(&self, index: i32) -> Result<Value> {
    usize::try_from(index)
      .ok()
      .and_then(|i| self.regs.get(i))
      .copied()
      .ok_or(Error::BadRegister(index as i64))
  }

  fn set_reg(&mut self, index: i32, value: Value) -> Result<()> {
    let slot = usize::try_from(index)
      .ok()
      .and_then(|i| self.regs.get_mut(i))
      .ok_or(Error::BadRegister(index as i64))?;
    *slot = value;
    Ok(())
  }

  fn constant(&self, index: i32) -> Result<Constant> {
    usize::try_from(index)
      .ok()
      .and_then(|i| self.bytecode.consts().get(i))
      .cloned()
      .ok_or(Error::BadConstIndex(index as i64))
  }

  fn function_constant(&self, index: i32) -> Result<u32> {
    match self.constant(index)? {
      Constant::Function { start, .. } => Ok(start),
      _ => Err(Error::NotAFunctionConstant),
    }
  }

  fn push_frame(&mut self, nargs: i32, dst: i32) -> Result<()> {
    let mut saved = Vec::with_capacity(nargs.max(0) as usize);
    for i in 0..nargs {
      saved.push(self.reg(i)?);
    }
    self.frames.push(Frame {
      return_ip: self.ip,
      return_dst: dst,
      saved,
    });
    Ok(())
  }

  fn collect_garbage(&mut self) {
    let frames = &self.frames;
    let roots = self
      .regs
      .iter()
      .copied()
      .chain(frames.iter().flat_map(|frame| frame.saved.iter().copied()));
    self.heap.collect(roots);
  }
}

impl Vm {
  fn op_load_const(&mut self) -> Result<()> {
    let reg = self.read_i32()?;
    let index = self.read_i32()?;
    match self.constant(index)? {
      Constant::Int(v) => self.set_reg(reg, Value::Int(v)),
      Constant::Double(v) => self.set_reg(reg, Value::Double(v)),
      Constant::String(s) => {
        let idx = self.heap.alloc_string(s);
        self.set_reg(reg, Value::Str(idx))
      }
      // function constants are not loadable values; the register is left
      // untouched
      Constant::Function { .. } => Ok(()),
    }
  }

  fn op_mov(&mut self) -> Result<()> {
    let dst = self.read_i32()?;
    let src = self.read_i32()?;
    let value = self.reg(src)?;
    self.set_reg(dst, value)
  }

  fn op_arith(&mut self, op: Opcode) -> Result<()> {
    let dst = self.read_i32()?;
    let a = self.read_i32()?;
    let b = self.read_i32()?;
    let (Value::Int(a), Value::Int(b)) = (self.reg(a)?, self.reg(b)?) else {
      return Err(Error::TypeMismatch("expected int operands"));
    };
    let value = match op {
      Opcode::Add => a.wrapping_add(b),
      Opcode::Sub => a.wrapping_sub(b),
      Opcode::Mul => a.wrapping_mul(b),
      Opcode::Div => {
        if b == 0 {
          return Err(Error::DivisionByZero);
        }
        a.wrapping_div(b)
      }
      _ => unreachable!("non-arithmetic opcode"),
    };
    self.set_reg(dst, Value::Int(value))
  }

  fn op_print(&mut self) -> Result<()> {
    let reg = self.read_i32()?;
    match self.reg(reg)? {
      Value::Int(v) => writeln!(self.stdout, "{v}")?,
      Value::Double(v) => writeln!(self.stdout, "{v}")?,
      Value::Str(idx) => match self.heap.string(idx) {
        Some(s) => writeln!(self.stdout, "{s}")?,
        None => writeln!(self.stdout, "<string oob>")?,
      },
      Value::Object(idx) => match self.heap.object_field_count(idx) {
        Some(n) => writeln!(self.stdout, "OBJECT(fields={n})")?,
        None => writeln!(self.stdout, "OBJECT <oob>")?,
      },
      Value::None => writeln!(self.stdout, "NONE")?,
    }
    Ok(())
  }

  fn op_jmp(&mut self) -> Result<()> {
    let target = self.read_i32()?;
    // a negative target wraps past the end of code and ends the run
    self.ip = target as usize;
    Ok(())
  }

  fn op_jz(&mut self) -> Result<()> {
    let reg = self.read_i32()?;
    let target = self.read_i32()?;
    if let Value::Int(0) = self.reg(reg)? {
      self.ip = target as usize;
    }
    Ok(())
  }

  fn op_alloc_str(&mut self) -> Result<()> {
    let dst = self.read_i32()?;
    let index = self.read_i32()?;
    let Constant::String(s) = self.constant(index)? else {
      return Err(Error::TypeMismatch("alloc_str expects a string constant"));
    };
    let idx = self.heap.alloc_string(s);
    self.set_reg(dst, Value::Str(idx))
  }

  fn op_call(&mut self) -> Result<()> {
    let index = self.read_i32()?;
    let nargs = self.read_i32()?;
    let dst = self.read_i32()?;
    let native = u32::try_from(index)
      .ok()
      .and_then(|i| self.natives.get(&i))
      .cloned()
      .ok_or(Error::UnknownNative(index as i64))?;
    let mut args = Vec::with_capacity(nargs.max(0) as usize);
    for i in 0..nargs {
      args.push(self.reg(i)?);
    }
    let result = (*native)(self, &args);
    self.set_reg(dst, result)
  }

  fn op_call_user(&mut self) -> Result<()> {
    let index = self.read_i32()?;
    let nargs = self.read_i32()?;
    let dst = self.read_i32()?;
    let start = self.function_constant(index)?;
    self.push_frame(nargs, dst)?;
    self.ip = start as usize;
    Ok(())
  }

  fn op_ret(&mut self) -> Result<ControlFlow> {
    let reg = self.read_i32()?;
    let Some(frame) = self.frames.pop() else {
      // returning with no caller terminates the run; the value is discarded
      return Ok(ControlFlow::Halt);
    };
    let result = self.reg(reg)?;
    // restore the caller's clobbered window before the destination write
    self.regs[..frame.saved.len()].copy_from_slice(&frame.saved);
    self.set_reg(frame.return_dst, result)?;
    self.ip = frame.return_ip;
    Ok(ControlFlow::Continue)
  }

  fn op_throw(&mut self) -> Result<()> {
    let reg = self.read_i32()?;
    let value = self.reg(reg)?;
    // the exception value always travels in r0
    self.regs[0] = value;
    let Some(handler) = self.handlers.pop() else {
      return Err(Error::UnhandledException);
    };
    // discard frames down to the handler's install depth; their saved
    // registers are not restored
    while self.frames.len() > handler.frame_depth {
      self.frames.pop();
    }
    tracing::trace!(
      handler_ip = handler.ip,
      frame_depth = handler.frame_depth,
      "unwind"
    );
    self.ip = handler.ip;
    Ok(())
  }

  fn op_push_handler(&mut self) -> Result<()> {
    let target = self.read_i32()?;
    self.handlers.push(Handler {
      ip: target as usize,
      frame_depth: self.frames.len(),
    });
    Ok(())
  }

  fn op_mk_closure(&mut self) -> Result<()> {
    let dst = self.read_i32()?;
    let index = self.read_i32()?;
    let ncaptures = self.read_i32()?;
    if ncaptures < 0 {
      return Err(Error::NegativeCaptureCount);
    }
    // a jump into the middle of an instruction can land the decoder on a
    // capture count the verifier never saw
    if self.ip + ncaptures as usize * 4 > self.bytecode.code().len() {
      return Err(Error::TruncatedCaptures);
    }
    self.function_constant(index)?;
    let object = self.heap.alloc_object(ncaptures as usize + 1);
    self.heap.set_object_field(object, 0, Value::Int(index as i64));
    for i in 0..ncaptures {
      let reg = self.read_i32()?;
      // captures are snapshots, not references
      let value = self.reg(reg)?;
      self.heap.set_object_field(object, 1 + i as usize, value);
    }
    self.set_reg(dst, Value::Object(object))
  }

  fn op_call_closure(&mut self) -> Result<()> {
    let obj_reg = self.read_i32()?;
    let nargs = self.read_i32()?;
    let dst = self.read_i32()?;
    let Value::Object(object) = self.reg(obj_reg)? else {
      return Err(Error::TypeMismatch("call_closure expects an object"));
    };
    if !self.heap.object_is_live(object) {
      return Err(Error::DeadClosureObject);
    }
    let Value::Int(index) = self.heap.object_field(object, 0) else {
      return Err(Error::TypeMismatch("closure is missing its function index"));
    };
    let index = i32::try_from(index).map_err(|_| Error::BadConstIndex(index))?;
    let start = self.function_constant(index)?;
    self.push_frame(nargs, dst)?;
    // the callee finds its environment immediately after the argument window
    let fields = self.heap.object_field_count(object).unwrap_or(0);
    for field in 1..fields {
      let value = self.heap.object_field(object, field);
      self.set_reg(nargs + field as i32 - 1, value)?;
    }
    self.ip = start as usize;
    Ok(())
  }
}
