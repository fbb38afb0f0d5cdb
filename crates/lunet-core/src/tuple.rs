//! Multi-value payloads: tuples and the control requests returned by callbacks.

use crate::host::CallbackRef;
use crate::pool;
use crate::refid::RefId;
use crate::value::Value;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

struct TupleData {
    id: RefId,
    values: Vec<Value>,
    /// The buffer came from the pool and goes back to it.
    pooled: bool,
}

impl Drop for TupleData {
    fn drop(&mut self) {
        if self.pooled {
            pool::global().release(std::mem::take(&mut self.values));
        }
    }
}

/// An immutable sequence of values. Tuples built by [`Tuple::collect`] draw
/// their buffer from the shared pool and return it when the last handle is
/// dropped; tuples adopting a caller's `Vec` keep it to themselves.
#[derive(Clone)]
pub struct Tuple(Arc<TupleData>);

impl Tuple {
    pub fn from_vec(values: Vec<Value>) -> Self {
        Self::build(values, false)
    }

    /// Take ownership of a buffer obtained from [`pool::TuplePool::request`].
    pub(crate) fn from_pooled(values: Vec<Value>) -> Self {
        Self::build(values, true)
    }

    fn build(values: Vec<Value>, pooled: bool) -> Self {
        Tuple(Arc::new(TupleData {
            id: RefId::next(),
            values,
            pooled,
        }))
    }

    /// Collect `values` into a pooled buffer.
    pub fn collect(values: impl IntoIterator<Item = Value>) -> Self {
        let values = values.into_iter();
        let mut buf = pool::global().request(values.size_hint().0);
        buf.extend(values);
        Self::from_pooled(buf)
    }

    pub fn from_slice(values: &[Value]) -> Self {
        Self::collect(values.iter().cloned())
    }

    /// Address of the backing buffer.
    pub fn buffer_ptr(&self) -> *const Value {
        self.0.values.as_ptr()
    }

    #[inline]
    pub fn id(&self) -> RefId {
        self.0.id
    }

    #[inline]
    pub fn as_slice(&self) -> &[Value] {
        &self.0.values
    }

    pub fn ptr_eq(&self, other: &Tuple) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for Tuple {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        self.as_slice()
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// A request, returned by a host callback, to call `target` in its place.
#[derive(Debug)]
pub struct TailCallData {
    pub target: Value,
    pub args: Vec<Value>,
    /// Invoked with the result of `target`.
    pub continuation: Option<CallbackRef>,
    /// Invoked with the error value if `target` fails.
    pub error_handler: Option<CallbackRef>,
}

impl TailCallData {
    pub fn new(target: Value, args: Vec<Value>) -> Self {
        TailCallData {
            target,
            args,
            continuation: None,
            error_handler: None,
        }
    }

    pub fn with_continuation(mut self, continuation: CallbackRef) -> Self {
        self.continuation = Some(continuation);
        self
    }

    pub fn with_error_handler(mut self, handler: CallbackRef) -> Self {
        self.error_handler = Some(handler);
        self
    }
}

/// A request, returned by a host callback, to yield the running coroutine.
#[derive(Debug)]
pub struct YieldRequest {
    pub values: Vec<Value>,
    /// Set for yields forced by the scheduler rather than asked for by the script.
    pub forced: bool,
}
