//! Conversions between host types and values, plus user-registered converters.

use crate::closure::ClosureRef;
use crate::coerce::float_to_integer;
use crate::error::{Result, RuntimeError};
use crate::host::{CallbackRef, CoroutineRef, UserData};
use crate::object::DataType;
use crate::table::TableRef;
use crate::value::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Host type that can become a value.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

/// Host type that can be read out of a value.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

macro_rules! into_value_via_from {
    ($($t:ty),*) => {
        $(impl IntoValue for $t {
            fn into_value(self) -> Value {
                Value::from(self)
            }
        })*
    };
}

into_value_via_from!(
    bool, f64, &str, String, Arc<str>, TableRef, ClosureRef, CallbackRef, CoroutineRef, UserData
);

macro_rules! into_value_as_number {
    ($($t:ty),*) => {
        $(impl IntoValue for $t {
            fn into_value(self) -> Value {
                Value::Number(self as f64)
            }
        })*
    };
}

into_value_as_number!(f32, i32, i64, u32, u64, usize);

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::VOID
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        self.map_or(Value::NIL, IntoValue::into_value)
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::collect_tuple(self.into_iter().map(IntoValue::into_value))
    }
}

fn mismatch(value: &Value, to: &'static str) -> RuntimeError {
    RuntimeError::Conversion {
        from: value.data_type(),
        to,
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.cast_to_bool())
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.cast_to_number().ok_or_else(|| mismatch(value, "number"))
    }
}

macro_rules! from_value_integer {
    ($($t:ty),*) => {
        $(impl FromValue for $t {
            fn from_value(value: &Value) -> Result<Self> {
                let n = value.cast_to_number().ok_or_else(|| mismatch(value, "integer"))?;
                float_to_integer(n)
                    .and_then(|i| <$t>::try_from(i).ok())
                    .ok_or_else(|| RuntimeError::Message(
                        format!("number has no integer representation: {}", crate::coerce::format_number(n))
                    ))
            }
        })*
    };
}

from_value_integer!(i32, i64, u32, usize);

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        value.cast_to_string().ok_or_else(|| mismatch(value, "string"))
    }
}

impl FromValue for TableRef {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_table().cloned().ok_or_else(|| mismatch(value, "table"))
    }
}

impl FromValue for ClosureRef {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_closure()
            .cloned()
            .ok_or_else(|| mismatch(value, "function"))
    }
}

impl FromValue for UserData {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_host_data()
            .cloned()
            .ok_or_else(|| mismatch(value, "userdata"))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_nil() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl Value {
    pub fn from_object<T: IntoValue>(object: T) -> Value {
        object.into_value()
    }

    pub fn to_object<T: FromValue>(&self) -> Result<T> {
        T::from_value(self)
    }
}

type ScriptToHostFn = Arc<dyn Fn(&Value) -> Option<Box<dyn Any + Send>> + Send + Sync>;
type HostToScriptFn = Arc<dyn Fn(&dyn Any) -> Option<Value> + Send + Sync>;

/// User-registered conversions, consulted before the built-in ones.
///
/// Script-to-host converters are keyed by the source value's type and the
/// target host type; host-to-script converters by the source host type.
#[derive(Clone, Default)]
pub struct CustomConverters {
    script_to_host: HashMap<(DataType, TypeId), ScriptToHostFn>,
    host_to_script: HashMap<TypeId, HostToScriptFn>,
}

impl CustomConverters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_script_to_host<T, F>(&mut self, from: DataType, f: F)
    where
        T: Any + Send,
        F: Fn(&Value) -> Option<T> + Send + Sync + 'static,
    {
        let f: ScriptToHostFn =
            Arc::new(move |v: &Value| f(v).map(|t| Box::new(t) as Box<dyn Any + Send>));
        self.script_to_host.insert((from, TypeId::of::<T>()), f);
    }

    pub fn remove_script_to_host<T: Any>(&mut self, from: DataType) -> bool {
        self.script_to_host
            .remove(&(from, TypeId::of::<T>()))
            .is_some()
    }

    pub fn set_host_to_script<T, F>(&mut self, f: F)
    where
        T: Any,
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let f: HostToScriptFn =
            Arc::new(move |any: &dyn Any| any.downcast_ref::<T>().map(&f));
        self.host_to_script.insert(TypeId::of::<T>(), f);
    }

    pub fn remove_host_to_script<T: Any>(&mut self) -> bool {
        self.host_to_script.remove(&TypeId::of::<T>()).is_some()
    }

    /// `None` when no converter is registered or the converter declined.
    pub fn convert_to_host<T: Any>(&self, value: &Value) -> Option<T> {
        let f = self
            .script_to_host
            .get(&(value.data_type(), TypeId::of::<T>()))?;
        f(value)?.downcast::<T>().ok().map(|b| *b)
    }

    pub fn convert_to_script<T: Any>(&self, object: &T) -> Option<Value> {
        let f = self.host_to_script.get(&TypeId::of::<T>())?;
        f(object as &dyn Any)
    }

    pub fn clear(&mut self) {
        self.script_to_host.clear();
        self.host_to_script.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.script_to_host.is_empty() && self.host_to_script.is_empty()
    }
}
