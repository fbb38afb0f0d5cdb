//! Value type tags and type name helpers.

use std::fmt;

/// The type of a [`Value`](crate::value::Value).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    /// Absence of a value (e.g. a missing argument).
    Void,
    Nil,
    Boolean,
    Number,
    String,
    /// Script-defined closure.
    Function,
    /// Host-implemented callback.
    HostFunction,
    Table,
    Tuple,
    UserData,
    Thread,
    TailCallRequest,
    YieldRequest,
}

impl DataType {
    /// The name a script sees from `type()`.
    pub fn lua_type_name(self) -> &'static str {
        match self {
            DataType::Void | DataType::Nil => "nil",
            DataType::Boolean => "boolean",
            DataType::Number => "number",
            DataType::String => "string",
            DataType::Function | DataType::HostFunction => "function",
            DataType::Table => "table",
            DataType::Tuple => "tuple",
            DataType::UserData => "userdata",
            DataType::Thread => "thread",
            DataType::TailCallRequest | DataType::YieldRequest => "internal",
        }
    }

    /// The name used in error messages; `Void` reads as "no value".
    pub fn error_type_name(self) -> &'static str {
        match self {
            DataType::Void => "no value",
            other => other.lua_type_name(),
        }
    }

    /// Whether values of this type are compared and hashed by identity.
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            DataType::Function
                | DataType::HostFunction
                | DataType::Table
                | DataType::UserData
                | DataType::Thread
        )
    }

    /// Control requests only travel between a callback and the call machinery.
    pub fn is_control_request(self) -> bool {
        matches!(self, DataType::TailCallRequest | DataType::YieldRequest)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.error_type_name())
    }
}
