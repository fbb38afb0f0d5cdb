//! Runtime error types.

use crate::object::DataType;
use crate::value::Value;
use thiserror::Error;

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;

/// Broad classification of a [`RuntimeError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Host-side misuse: dead resources, cross-script mixing, bad path keys.
    Usage,
    /// Errors a script can observe and catch.
    Script,
    /// Broken runtime invariants.
    Internal,
}

/// An error raised by the runtime or by a script.
#[derive(Clone, Debug, Error)]
pub enum RuntimeError {
    #[error("{0}")]
    InvalidOperation(String),

    #[error("table index is nil")]
    TableIndexIsNil,

    #[error("table index is NaN")]
    TableIndexIsNaN,

    #[error("invalid key to 'next'")]
    InvalidNextKey,

    #[error("bad argument{} to '{func}' ({expected}{} expected, got {got})", arg_label(.arg), or_nil(.allow_nil))]
    BadArgument {
        arg: Option<usize>,
        func: String,
        expected: DataType,
        got: DataType,
        allow_nil: bool,
    },

    #[error("bad argument{} to '{func}' ({expected} expected, got no value)", arg_label(.arg))]
    BadArgumentNoValue {
        arg: Option<usize>,
        func: String,
        expected: DataType,
    },

    #[error("bad argument{} to '{func}' (userdata<{expected}>{} expected, got {got})", arg_label(.arg), or_nil(.allow_nil))]
    BadArgumentUserData {
        arg: Option<usize>,
        func: String,
        expected: String,
        got: String,
        allow_nil: bool,
    },

    #[error("attempt to index a {got} value")]
    AttemptToIndex { got: DataType },

    #[error("attempt to get length of a {got} value")]
    LengthOfType { got: DataType },

    #[error("attempt to call a {got} value")]
    NotCallable { got: DataType },

    #[error("cannot convert a {from} to {to}")]
    Conversion { from: DataType, to: &'static str },

    #[error("key '{key}' {reason}")]
    KeyPath { key: String, reason: &'static str },

    #[error("stack overflow")]
    StackOverflow,

    #[error("attempt to yield from outside a coroutine")]
    YieldOutsideCoroutine,

    /// Error raised by a script with an arbitrary value.
    #[error("{}", print_value(.0))]
    Script(Value),

    #[error("{0}")]
    Message(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn arg_label(arg: &Option<usize>) -> String {
    match arg {
        Some(n) => format!(" #{n}"),
        None => String::new(),
    }
}

fn print_value(value: &Value) -> String {
    value.to_print_string()
}

fn or_nil(allow_nil: &bool) -> &'static str {
    if *allow_nil {
        " or nil"
    } else {
        ""
    }
}

impl RuntimeError {
    /// Error for an operation attempted on a killed resource.
    pub fn dead(what: &str, op: &str) -> Self {
        RuntimeError::InvalidOperation(format!("attempt to {op} a dead {what}"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::InvalidOperation(_) | RuntimeError::KeyPath { .. } => ErrorKind::Usage,
            RuntimeError::Internal(_) => ErrorKind::Internal,
            _ => ErrorKind::Script,
        }
    }

    /// Convert this error into a value a script error handler can receive.
    pub fn to_value(&self) -> Value {
        match self {
            RuntimeError::Script(v) => v.clone(),
            other => Value::new_string(other.to_string()),
        }
    }
}
