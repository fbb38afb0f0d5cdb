//! Host-side values: callbacks, opaque host data and coroutine handles.

use crate::error::Result;
use crate::object::DataType;
use crate::refid::{RefId, ScriptId};
use crate::value::{TypeValidationFlags, Value};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An opaque host object carried by a `HostData` value.
pub trait HostObject: Any + Send + Sync + fmt::Debug {
    /// Name used in diagnostics, e.g. `userdata<Vector3>`.
    fn type_name(&self) -> &str;

    /// Host-defined equality. Identity equality is always checked first.
    ///
    /// Values hash by `type_name`, so this must only return true for an
    /// object with the same `type_name`; `UserData` equality skips the call
    /// when the names differ.
    fn host_eq(&self, _other: &dyn HostObject) -> bool {
        false
    }

    /// Text shown by print-style formatting instead of `userdata: 0x...`.
    fn display(&self) -> Option<String> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

struct UserDataInner {
    id: RefId,
    object: Box<dyn HostObject>,
}

/// Shared handle to a host object.
#[derive(Clone)]
pub struct UserData(Arc<UserDataInner>);

impl UserData {
    pub fn new<T: HostObject>(object: T) -> Self {
        UserData(Arc::new(UserDataInner {
            id: RefId::next(),
            object: Box::new(object),
        }))
    }

    #[inline]
    pub fn id(&self) -> RefId {
        self.0.id
    }

    pub fn object(&self) -> &dyn HostObject {
        self.0.object.as_ref()
    }

    pub fn downcast_ref<T: HostObject>(&self) -> Option<&T> {
        self.0.object.as_any().downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &UserData) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for UserData {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.object().type_name() == other.object().type_name()
                && self.object().host_eq(other.object()))
    }
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "userdata<{}>({})", self.object().type_name(), self.id())
    }
}

/// Arguments and environment handed to a host callback.
pub struct NativeContext<'a> {
    args: &'a [Value],
    owner: Option<ScriptId>,
    name: &'a str,
}

impl<'a> NativeContext<'a> {
    pub fn new(args: &'a [Value], owner: Option<ScriptId>, name: &'a str) -> Self {
        NativeContext { args, owner, name }
    }

    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Argument `index` (0-based), or `Void` when it was not supplied.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::VOID)
    }

    /// The script instance that invoked the callback, if any.
    pub fn owner(&self) -> Option<ScriptId> {
        self.owner
    }

    pub fn function_name(&self) -> &str {
        self.name
    }

    /// Validate argument `index` (0-based) against `desired`; messages report it 1-based.
    pub fn check_arg(
        &self,
        index: usize,
        desired: DataType,
        flags: TypeValidationFlags,
    ) -> Result<Value> {
        let value = self.args.get(index).unwrap_or(&Value::VOID);
        value.check_type(self.name, desired, Some(index + 1), flags)
    }
}

/// Signature of a host callback.
pub type NativeFn = dyn Fn(&mut NativeContext<'_>) -> Result<Value> + Send + Sync;

struct CallbackFunction {
    id: RefId,
    name: Arc<str>,
    func: Box<NativeFn>,
}

/// Shared handle to a host callback.
#[derive(Clone)]
pub struct CallbackRef(Arc<CallbackFunction>);

impl CallbackRef {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&mut NativeContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        CallbackRef(Arc::new(CallbackFunction {
            id: RefId::next(),
            name: Arc::from(name),
            func: Box::new(func),
        }))
    }

    #[inline]
    pub fn id(&self) -> RefId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn invoke(&self, ctx: &mut NativeContext<'_>) -> Result<Value> {
        (self.0.func)(ctx)
    }

    pub fn ptr_eq(&self, other: &CallbackRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for CallbackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback<{}>({})", self.name(), self.id())
    }
}

/// Coroutine status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoroutineStatus {
    Suspended,
    Running,
    Normal,
    Dead,
}

struct CoroutineHandle {
    id: RefId,
    entry: Value,
    status: Mutex<CoroutineStatus>,
}

/// Handle to a coroutine. Scheduling lives with the executor; this only
/// carries identity, the body and the status.
#[derive(Clone)]
pub struct CoroutineRef(Arc<CoroutineHandle>);

impl CoroutineRef {
    pub fn new(entry: Value) -> Self {
        CoroutineRef(Arc::new(CoroutineHandle {
            id: RefId::next(),
            entry,
            status: Mutex::new(CoroutineStatus::Suspended),
        }))
    }

    #[inline]
    pub fn id(&self) -> RefId {
        self.0.id
    }

    pub fn entry(&self) -> &Value {
        &self.0.entry
    }

    pub fn status(&self) -> CoroutineStatus {
        *self.0.status.lock()
    }

    pub fn set_status(&self, status: CoroutineStatus) {
        *self.0.status.lock() = status;
    }

    pub fn ptr_eq(&self, other: &CoroutineRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for CoroutineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "coroutine({}, {:?})", self.id(), self.status())
    }
}
