//! Lunet core types: values, tables, closures, upvalue cells and the host
//! interop surface.

pub mod closure;
pub mod coerce;
pub mod config;
pub mod convert;
pub mod error;
pub mod host;
pub mod object;
pub mod pool;
pub mod refid;
pub mod symbol;
pub mod table;
pub mod tuple;
pub mod upvalue;
pub mod value;

pub use closure::{ClosureRef, EntryPoint, ScriptCaller, Upvalue, UpvaluesType};
pub use error::{ErrorKind, Result, RuntimeError};
pub use host::{CallbackRef, CoroutineRef, CoroutineStatus, HostObject, NativeContext, UserData};
pub use object::DataType;
pub use refid::{RefId, ScriptId};
pub use symbol::SymbolRef;
pub use table::{TableKey, TablePair, TableRef};
pub use upvalue::UpvalueCell;
pub use value::{ScriptPrivateResource, TypeValidationFlags, Value};
