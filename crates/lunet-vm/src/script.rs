//! The host entry point.

use crate::machine::{Executor, Machine};
use crate::options::ScriptOptions;
use lunet_core::closure::{ClosureRef, EntryPoint, ScriptCaller};
use lunet_core::convert::{CustomConverters, FromValue, IntoValue};
use lunet_core::error::Result;
use lunet_core::refid::ScriptId;
use lunet_core::table::TableRef;
use lunet_core::value::Value;
use std::any::Any;

/// One script instance: its runtime state, the executor that runs its code
/// and the host conversion hooks. Dropping it kills everything it owns.
pub struct Script {
    machine: Machine,
    executor: Box<dyn Executor>,
    converters: CustomConverters,
}

impl Script {
    pub fn new(executor: impl Executor + 'static) -> Self {
        Self::with_options(executor, ScriptOptions::default())
    }

    pub fn with_options(executor: impl Executor + 'static, options: ScriptOptions) -> Self {
        Script {
            machine: Machine::new(options),
            executor: Box::new(executor),
            converters: CustomConverters::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ScriptId {
        self.machine.id()
    }

    pub fn globals(&self) -> &TableRef {
        self.machine.globals()
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    pub fn converters(&self) -> &CustomConverters {
        &self.converters
    }

    pub fn converters_mut(&mut self) -> &mut CustomConverters {
        &mut self.converters
    }

    pub fn new_table(&mut self) -> TableRef {
        self.machine.new_table()
    }

    pub fn adopt_table(&mut self, table: &TableRef) -> Result<()> {
        self.machine.adopt_table(table)
    }

    pub fn load_function(&mut self, entry_point: EntryPoint) -> ClosureRef {
        self.machine.load_function(entry_point)
    }

    pub fn call(&mut self, function: &Value, args: Vec<Value>) -> Result<Value> {
        self.machine.call(self.executor.as_mut(), function, args)
    }

    /// Call the global function `name`.
    pub fn call_global(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        let function = self.globals().get_str(name)?;
        self.call(&function, args)
    }

    /// Convert a script value to a host type, trying custom converters first.
    pub fn to_host<T: FromValue + Any>(&self, value: &Value) -> Result<T> {
        match self.converters.convert_to_host::<T>(value) {
            Some(object) => Ok(object),
            None => value.to_object(),
        }
    }

    /// Convert a host object to a script value, trying custom converters first.
    pub fn from_host<T: IntoValue + Any>(&self, object: T) -> Value {
        match self.converters.convert_to_script(&object) {
            Some(value) => value,
            None => Value::from_object(object),
        }
    }

    pub fn shutdown(&mut self) {
        self.machine.shutdown();
    }
}

impl ScriptCaller for Script {
    fn script_id(&self) -> ScriptId {
        self.id()
    }

    fn call_function(&mut self, function: &Value, args: Vec<Value>) -> Result<Value> {
        self.call(function, args)
    }
}

impl Drop for Script {
    fn drop(&mut self) {
        self.shutdown();
    }
}
