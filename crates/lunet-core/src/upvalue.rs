//! Shared mutable cells for captured variables.

use crate::value::Value;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A captured variable, shared between the declaring frame and every closure
/// that captured it. The cell is freed when its last holder lets go.
#[derive(Clone)]
pub struct UpvalueCell(Arc<RwLock<Value>>);

impl UpvalueCell {
    pub fn new(value: Value) -> Self {
        UpvalueCell(Arc::new(RwLock::new(value)))
    }

    #[inline]
    pub fn get(&self) -> Value {
        self.0.read().clone()
    }

    #[inline]
    pub fn set(&self, value: Value) {
        *self.0.write() = value;
    }

    pub fn replace(&self, value: Value) -> Value {
        std::mem::replace(&mut *self.0.write(), value)
    }

    pub fn ptr_eq(&self, other: &UpvalueCell) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live holders of this cell.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for UpvalueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upvalue({:?})", *self.0.read())
    }
}
