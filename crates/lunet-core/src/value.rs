//! The dynamic value type shared by scripts and the host.
//!
//! Scalars (nil, booleans, numbers, strings) are stored inline or behind an
//! `Arc<str>`. Everything else is a cheap handle: cloning a table, closure,
//! callback, coroutine or host object value yields another handle to the same
//! object, and those values compare and hash by identity.
use crate::closure::ClosureRef;
use crate::coerce::{format_number, str_to_number};
use crate::error::{Result, RuntimeError};
use crate::host::{CallbackRef, CoroutineRef, HostObject, UserData};
use crate::object::DataType;
use crate::pool;
use crate::refid::ScriptId;
use crate::table::TableRef;
use crate::tuple::{TailCallData, Tuple, YieldRequest};
use bitflags::bitflags;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

bitflags! {
    /// Options for [`Value::check_type`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TypeValidationFlags: u8 {
        /// Nil (or no value) passes the check.
        const ALLOW_NIL = 0b01;
        /// Booleans, numbers and strings are converted to the desired type when possible.
        const AUTO_CONVERT = 0b10;
    }
}

impl Default for TypeValidationFlags {
    fn default() -> Self {
        TypeValidationFlags::AUTO_CONVERT
    }
}

/// A resource that belongs to at most one script instance.
pub trait ScriptPrivateResource {
    /// The owning script, or `None` for prime (script-independent) resources.
    fn owner_script(&self) -> Option<ScriptId>;
}

/// A dynamically typed value.
#[derive(Clone)]
pub enum Value {
    /// No value at all. Compares equal to `Nil`.
    Void,
    Nil,
    Boolean(bool),
    Number(f64),
    String(Arc<str>),
    Table(TableRef),
    Closure(ClosureRef),
    HostCallback(CallbackRef),
    Coroutine(CoroutineRef),
    HostData(UserData),
    Tuple(Tuple),
    TailCallRequest(Arc<TailCallData>),
    YieldRequest(Arc<YieldRequest>),
}

impl Value {
    pub const VOID: Value = Value::Void;
    pub const NIL: Value = Value::Nil;
    pub const TRUE: Value = Value::Boolean(true);
    pub const FALSE: Value = Value::Boolean(false);

    // ---- Constructors ----

    #[inline]
    pub fn new_boolean(b: bool) -> Self {
        Value::Boolean(b)
    }

    #[inline]
    pub fn new_number(n: f64) -> Self {
        Value::Number(n)
    }

    pub fn new_string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    /// Build a multi-value. Zero values give `Void`, one value is returned as is.
    pub fn new_tuple(mut values: Vec<Value>) -> Self {
        match values.len() {
            0 => Value::VOID,
            1 => values.swap_remove(0),
            _ => Value::Tuple(Tuple::from_vec(values)),
        }
    }

    /// Like [`Value::new_tuple`], but any argument that is itself a tuple is
    /// spliced in place, so the result never contains a nested tuple.
    pub fn new_tuple_flattened(values: Vec<Value>) -> Self {
        if !values.iter().any(Value::is_tuple) {
            return Value::new_tuple(values);
        }
        let len = values.iter().map(|v| v.as_tuple().map_or(1, <[Value]>::len)).sum();
        let mut flat = pool::global().request(len);
        for v in values {
            flatten_into(&mut flat, v);
        }
        Value::from_pooled(flat)
    }

    /// Build a multi-value from an iterator, in a buffer taken from the tuple
    /// pool. Same shape rules as [`Value::new_tuple`].
    pub fn collect_tuple(values: impl IntoIterator<Item = Value>) -> Self {
        let values = values.into_iter();
        let mut buf = pool::global().request(values.size_hint().0);
        buf.extend(values);
        Value::from_pooled(buf)
    }

    fn from_pooled(mut buf: Vec<Value>) -> Self {
        match buf.len() {
            0 => Value::VOID,
            1 => buf.pop().unwrap_or(Value::VOID),
            _ => Value::Tuple(Tuple::from_pooled(buf)),
        }
    }

    pub fn tail_call(target: Value, args: Vec<Value>) -> Self {
        Value::TailCallRequest(Arc::new(TailCallData::new(target, args)))
    }

    pub fn tail_call_with(data: TailCallData) -> Self {
        Value::TailCallRequest(Arc::new(data))
    }

    pub fn yield_request(values: Vec<Value>) -> Self {
        Value::YieldRequest(Arc::new(YieldRequest {
            values,
            forced: false,
        }))
    }

    /// A yield requested by the scheduler rather than by the script.
    pub fn forced_yield() -> Self {
        Value::YieldRequest(Arc::new(YieldRequest {
            values: Vec::new(),
            forced: true,
        }))
    }

    // ---- Type checks ----

    pub fn data_type(&self) -> DataType {
        match self {
            Value::Void => DataType::Void,
            Value::Nil => DataType::Nil,
            Value::Boolean(_) => DataType::Boolean,
            Value::Number(_) => DataType::Number,
            Value::String(_) => DataType::String,
            Value::Table(_) => DataType::Table,
            Value::Closure(_) => DataType::Function,
            Value::HostCallback(_) => DataType::HostFunction,
            Value::Coroutine(_) => DataType::Thread,
            Value::HostData(_) => DataType::UserData,
            Value::Tuple(_) => DataType::Tuple,
            Value::TailCallRequest(_) => DataType::TailCallRequest,
            Value::YieldRequest(_) => DataType::YieldRequest,
        }
    }

    /// True for `Nil` and `Void`.
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil | Value::Void)
    }

    #[inline]
    pub fn is_not_nil(&self) -> bool {
        !self.is_nil()
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    #[inline]
    pub fn is_not_void(&self) -> bool {
        !self.is_void()
    }

    pub fn is_nil_or_nan(&self) -> bool {
        match self {
            Value::Number(n) => n.is_nan(),
            other => other.is_nil(),
        }
    }

    #[inline]
    pub fn is_tuple(&self) -> bool {
        matches!(self, Value::Tuple(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::HostCallback(_))
    }

    /// Truthiness: only nil, void and false are falsy.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Void | Value::Boolean(false))
    }

    // ---- Accessors ----

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<&ClosureRef> {
        match self {
            Value::Closure(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_callback(&self) -> Option<&CallbackRef> {
        match self {
            Value::HostCallback(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_coroutine(&self) -> Option<&CoroutineRef> {
        match self {
            Value::Coroutine(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_host_data(&self) -> Option<&UserData> {
        match self {
            Value::HostData(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(t) => Some(t.as_slice()),
            _ => None,
        }
    }

    pub fn as_tail_call(&self) -> Option<&TailCallData> {
        match self {
            Value::TailCallRequest(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_yield_request(&self) -> Option<&YieldRequest> {
        match self {
            Value::YieldRequest(y) => Some(y),
            _ => None,
        }
    }

    /// The resource-ownership view of this value, for owned reference kinds.
    pub fn as_private_resource(&self) -> Option<&dyn ScriptPrivateResource> {
        match self {
            Value::Table(t) => Some(t),
            Value::Closure(c) => Some(c),
            _ => None,
        }
    }

    // ---- Conversions ----

    /// First element of a tuple (recursively); `Void` for an empty tuple.
    pub fn to_scalar(&self) -> Value {
        match self {
            Value::Tuple(t) => t.first().map_or(Value::VOID, Value::to_scalar),
            other => other.clone(),
        }
    }

    pub fn cast_to_bool(&self) -> bool {
        match self {
            Value::Tuple(_) => self.to_scalar().is_truthy(),
            other => other.is_truthy(),
        }
    }

    /// Numbers, and strings that parse as numbers.
    pub fn cast_to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => str_to_number(s),
            Value::Tuple(_) => self.to_scalar().cast_to_number(),
            _ => None,
        }
    }

    /// Strings, and numbers in their printed form.
    pub fn cast_to_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.to_string()),
            Value::Number(n) => Some(format_number(*n)),
            Value::Tuple(_) => self.to_scalar().cast_to_string(),
            _ => None,
        }
    }

    /// Length operator: byte length of a string, border of a table.
    pub fn get_length(&self) -> Result<Value> {
        match self {
            Value::String(s) => Ok(Value::Number(s.len() as f64)),
            Value::Table(t) => Ok(Value::Number(t.length()? as f64)),
            other => Err(RuntimeError::LengthOfType {
                got: other.data_type(),
            }),
        }
    }

    /// Validate this value as argument `arg_num` of `func_name`.
    ///
    /// Returns the value, converted when `AUTO_CONVERT` is set and the
    /// conversion succeeds.
    pub fn check_type(
        &self,
        func_name: &str,
        desired: DataType,
        arg_num: Option<usize>,
        flags: TypeValidationFlags,
    ) -> Result<Value> {
        if self.data_type() == desired {
            return Ok(self.clone());
        }
        let allow_nil = flags.contains(TypeValidationFlags::ALLOW_NIL);
        if allow_nil && self.is_nil() {
            return Ok(self.clone());
        }
        if flags.contains(TypeValidationFlags::AUTO_CONVERT) {
            match desired {
                DataType::Boolean => return Ok(Value::Boolean(self.cast_to_bool())),
                DataType::Number => {
                    if let Some(n) = self.cast_to_number() {
                        return Ok(Value::Number(n));
                    }
                }
                DataType::String => {
                    if let Some(s) = self.cast_to_string() {
                        return Ok(Value::new_string(s));
                    }
                }
                _ => {}
            }
        }
        if self.is_void() {
            return Err(RuntimeError::BadArgumentNoValue {
                arg: arg_num,
                func: func_name.to_string(),
                expected: desired,
            });
        }
        Err(RuntimeError::BadArgument {
            arg: arg_num,
            func: func_name.to_string(),
            expected: desired,
            got: self.data_type(),
            allow_nil,
        })
    }

    /// Validate this value as host data of type `T`.
    ///
    /// `Ok(None)` is returned for nil when `ALLOW_NIL` is set.
    pub fn check_host_data<T: HostObject>(
        &self,
        func_name: &str,
        arg_num: Option<usize>,
        flags: TypeValidationFlags,
    ) -> Result<Option<&T>> {
        if let Value::HostData(u) = self {
            if let Some(obj) = u.downcast_ref::<T>() {
                return Ok(Some(obj));
            }
        }
        let allow_nil = flags.contains(TypeValidationFlags::ALLOW_NIL);
        if allow_nil && self.is_nil() {
            return Ok(None);
        }
        let expected = std::any::type_name::<T>();
        let expected = expected.rsplit("::").next().unwrap_or(expected);
        let got = match self {
            Value::HostData(u) => format!("userdata<{}>", u.object().type_name()),
            other => other.data_type().error_type_name().to_string(),
        };
        Err(RuntimeError::BadArgumentUserData {
            arg: arg_num,
            func: func_name.to_string(),
            expected: expected.to_string(),
            got,
            allow_nil,
        })
    }

    // ---- Formatting ----

    /// Form used by `print`: strings unquoted, references as `type: 0x...`.
    pub fn to_print_string(&self) -> String {
        if let Some(s) = self.reference_print_string() {
            return s;
        }
        match self {
            Value::String(s) => s.to_string(),
            Value::Tuple(t) => join(t, "\t", Value::to_print_string),
            Value::TailCallRequest(_) => "(TailCallRequest -- INTERNAL!)".to_string(),
            Value::YieldRequest(_) => "(YieldRequest -- INTERNAL!)".to_string(),
            other => other.to_string(),
        }
    }

    /// Form used by debuggers: like print, but strings stay quoted.
    pub fn to_debug_print_string(&self) -> String {
        if let Some(s) = self.reference_print_string() {
            return s;
        }
        match self {
            Value::Tuple(t) => join(t, "\t", Value::to_print_string),
            Value::TailCallRequest(_) => "(TailCallRequest)".to_string(),
            Value::YieldRequest(_) => "(YieldRequest)".to_string(),
            other => other.to_string(),
        }
    }

    fn reference_print_string(&self) -> Option<String> {
        let id = match self {
            Value::Table(t) => t.id(),
            Value::Closure(c) => c.id(),
            Value::HostCallback(c) => c.id(),
            Value::Coroutine(c) => c.id(),
            Value::HostData(u) => {
                if let Some(text) = u.object().display() {
                    return Some(text);
                }
                u.id()
            }
            _ => return None,
        };
        Some(format!(
            "{}: 0x{:08x}",
            self.data_type().lua_type_name(),
            id.get()
        ))
    }
}

fn flatten_into(out: &mut Vec<Value>, value: Value) {
    match value {
        Value::Tuple(t) => {
            for v in t.iter() {
                flatten_into(out, v.clone());
            }
        }
        other => out.push(other),
    }
}

fn join(values: &[Value], sep: &str, f: fn(&Value) -> String) -> String {
    values.iter().map(f).collect::<Vec<_>>().join(sep)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("void"),
            Value::Nil => f.write_str("nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Closure(c) => match c.entry_point() {
                Ok(ep) => write!(f, "(Function {ep})"),
                Err(_) => f.write_str("(Function dead)"),
            },
            Value::HostCallback(_) => f.write_str("(Function Host)"),
            Value::Table(_) => f.write_str("(Table)"),
            Value::Tuple(t) => f.write_str(&join(t, ", ", Value::to_string)),
            Value::TailCallRequest(tc) => {
                write!(f, "Tail:({})", join(&tc.args, ", ", Value::to_string))
            }
            Value::HostData(_) => f.write_str("(UserData)"),
            Value::Coroutine(c) => write!(f, "(Coroutine {})", c.id()),
            Value::YieldRequest(_) => f.write_str("(YieldRequest)"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_debug_print_string())
    }
}

// NaN numbers are never equal to themselves, but NaN can never be a table
// key, so hashed collections of values stay consistent.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void | Value::Nil, Value::Void | Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.ptr_eq(b),
            (Value::Closure(a), Value::Closure(b)) => a.ptr_eq(b),
            (Value::HostCallback(a), Value::HostCallback(b)) => a.ptr_eq(b),
            (Value::Coroutine(a), Value::Coroutine(b)) => a.ptr_eq(b),
            (Value::HostData(a), Value::HostData(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a.as_slice() == b.as_slice(),
            (Value::TailCallRequest(a), Value::TailCallRequest(b)) => Arc::ptr_eq(a, b),
            (Value::YieldRequest(a), Value::YieldRequest(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Void | Value::Nil => 0u8.hash(state),
            Value::Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::Number(n) => {
                2u8.hash(state);
                // -0.0 == 0.0, so both must hash alike.
                let n = if *n == 0.0 { 0.0f64 } else { *n };
                n.to_bits().hash(state);
            }
            Value::String(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Value::Table(t) => {
                4u8.hash(state);
                t.id().hash(state);
            }
            Value::Closure(c) => {
                5u8.hash(state);
                c.id().hash(state);
            }
            Value::HostCallback(c) => {
                6u8.hash(state);
                c.id().hash(state);
            }
            Value::Coroutine(c) => {
                7u8.hash(state);
                c.id().hash(state);
            }
            // Host equality may equate distinct objects; only the type name is stable.
            Value::HostData(u) => {
                8u8.hash(state);
                u.object().type_name().hash(state);
            }
            Value::Tuple(t) => {
                9u8.hash(state);
                t.as_slice().hash(state);
            }
            Value::TailCallRequest(a) => {
                10u8.hash(state);
                (Arc::as_ptr(a) as usize).hash(state);
            }
            Value::YieldRequest(a) => {
                11u8.hash(state);
                (Arc::as_ptr(a) as usize).hash(state);
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

impl From<ClosureRef> for Value {
    fn from(c: ClosureRef) -> Self {
        Value::Closure(c)
    }
}

impl From<CallbackRef> for Value {
    fn from(c: CallbackRef) -> Self {
        Value::HostCallback(c)
    }
}

impl From<CoroutineRef> for Value {
    fn from(c: CoroutineRef) -> Self {
        Value::Coroutine(c)
    }
}

impl From<UserData> for Value {
    fn from(u: UserData) -> Self {
        Value::HostData(u)
    }
}
