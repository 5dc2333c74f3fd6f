use std::error::Error as StdError;
use std::fmt::Display;
use std::io;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Everything that can abort a `verify` or `run`.
///
/// The throw/handler protocol is a bytecode-level mechanism and never
/// surfaces here; an exception only becomes an `Error` once the handler
/// stack is empty.
#[derive(Debug)]
pub enum Error {
  /// Operand bytes missing at the end of the code buffer.
  TruncatedInstruction,
  /// `mk_closure` with a negative capture count.
  NegativeCaptureCount,
  /// `mk_closure` whose capture list extends past the end of code.
  TruncatedCaptures,
  /// Byte that is not a known opcode.
  UnknownOpcode(u8),
  /// An operand had the wrong value type for its instruction.
  TypeMismatch(&'static str),
  DivisionByZero,
  BadConstIndex(i64),
  NotAFunctionConstant,
  BadRegister(i64),
  /// Closure call through an object slot that has been swept.
  DeadClosureObject,
  /// `call` with an index no native function is registered under.
  UnknownNative(i64),
  /// `throw` with an empty handler stack.
  UnhandledException,
  /// The output sink failed.
  Io(io::Error),
}

impl Display for Error {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Error::TruncatedInstruction => write!(f, "bytecode truncated or malformed"),
      Error::NegativeCaptureCount => write!(f, "negative capture count"),
      Error::TruncatedCaptures => write!(f, "truncated capture list"),
      Error::UnknownOpcode(byte) => write!(f, "unknown opcode {byte}"),
      Error::TypeMismatch(what) => write!(f, "type error: {what}"),
      Error::DivisionByZero => write!(f, "division by zero"),
      Error::BadConstIndex(index) => write!(f, "bad constant index {index}"),
      Error::NotAFunctionConstant => write!(f, "constant is not a function"),
      Error::BadRegister(index) => write!(f, "bad register r{index}"),
      Error::DeadClosureObject => write!(f, "dead closure object"),
      Error::UnknownNative(index) => write!(f, "unknown native function index {index}"),
      Error::UnhandledException => write!(f, "unhandled exception"),
      Error::Io(e) => {
        write!(f, "{e}")
      }
    }
  }
}

impl StdError for Error {}

impl From<io::Error> for Error {
  fn from(value: io::Error) -> Self {
    Error::Io(value)
  }
}
