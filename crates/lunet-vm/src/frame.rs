//! Call frame information for the runtime.

use crate::scope::LocalScope;
use lunet_core::closure::{ClosureRef, EntryPoint, Upvalue};
use lunet_core::error::{Result, RuntimeError};
use lunet_core::host::CallbackRef;
use lunet_core::symbol::SymbolRef;
use lunet_core::value::Value;
use std::sync::Arc;

/// Lifecycle of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Pushed,
    Executing,
    /// Leaving because of an error.
    Unwinding,
    Returning,
    Popped,
}

impl FrameState {
    fn can_advance_to(self, next: FrameState) -> bool {
        use FrameState::*;
        matches!(
            (self, next),
            (Pushed, Executing)
                | (Pushed, Unwinding)
                | (Executing, Unwinding)
                | (Executing, Returning)
                | (Unwinding, Popped)
                | (Returning, Popped)
        )
    }
}

// Flags for CallFrame boolean fields
const FLAG_HOST: u8 = 1;
const FLAG_ENTRY_POINT: u8 = 2;
const FLAG_RESUME_ENTRY_POINT: u8 = 4;
const FLAG_CALL_ENTRY_POINT: u8 = 8;
const FLAG_TAIL_CALL: u8 = 16;
const FLAG_METHOD_CALL: u8 = 32;

/// A call frame on the runtime call stack.
#[derive(Clone, Debug)]
pub struct CallFrame {
    /// Index of the first argument in the value stack.
    pub base_pointer: usize,
    /// Where the executor resumes in the caller.
    pub return_address: usize,
    /// The closure being executed (script frames only).
    pub closure: Option<ClosureRef>,
    /// Captured scope of `closure`; empty for host frames.
    pub closure_scope: Arc<[Upvalue]>,
    pub local_scope: LocalScope,
    /// The callback being executed (host frames only).
    pub host_function: Option<CallbackRef>,
    /// Invoked with this frame's result once it returns.
    pub continuation: Option<CallbackRef>,
    /// Invoked with the error value if this frame fails.
    pub error_handler: Option<CallbackRef>,
    /// Handler run before the stack unwinds past this frame.
    pub error_handler_before_unwind: Value,
    pub debug_entry_point: Option<EntryPoint>,
    /// Local symbols by slot, for name lookup.
    pub debug_symbols: Option<Arc<[SymbolRef]>>,
    state: FrameState,
    /// Packed boolean flags (host, entry point, resume, call, tail call, method call).
    flags: u8,
}

impl CallFrame {
    /// Frame for a script closure with `local_count` local slots.
    pub fn script(closure: ClosureRef, local_count: usize, base_pointer: usize) -> Result<Self> {
        let closure_scope = closure.upvalues()?;
        let entry_point = closure.entry_point()?;
        Ok(CallFrame {
            base_pointer,
            return_address: 0,
            closure: Some(closure),
            closure_scope,
            local_scope: LocalScope::new(local_count),
            host_function: None,
            continuation: None,
            error_handler: None,
            error_handler_before_unwind: Value::NIL,
            debug_entry_point: Some(entry_point),
            debug_symbols: None,
            state: FrameState::Pushed,
            flags: 0,
        })
    }

    /// Frame for a host callback. Host frames have no locals or upvalues.
    pub fn host(function: CallbackRef, base_pointer: usize) -> Self {
        CallFrame {
            base_pointer,
            return_address: 0,
            closure: None,
            closure_scope: Arc::from(Vec::new()),
            local_scope: LocalScope::default(),
            host_function: Some(function),
            continuation: None,
            error_handler: None,
            error_handler_before_unwind: Value::NIL,
            debug_entry_point: None,
            debug_symbols: None,
            state: FrameState::Pushed,
            flags: FLAG_HOST,
        }
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Move to `next`; out-of-order transitions are an internal error.
    pub fn advance(&mut self, next: FrameState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(RuntimeError::Internal(format!(
                "invalid frame transition {:?} -> {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Release the frame's locals; captured cells survive in their closures.
    pub fn release(&mut self) {
        self.local_scope.release();
    }

    #[inline(always)]
    fn flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    #[inline(always)]
    fn set_flag(&mut self, flag: u8, v: bool) {
        if v {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    #[inline(always)]
    pub fn is_host(&self) -> bool {
        self.flag(FLAG_HOST)
    }

    #[inline(always)]
    pub fn is_entry_point(&self) -> bool {
        self.flag(FLAG_ENTRY_POINT)
    }

    #[inline(always)]
    pub fn set_is_entry_point(&mut self, v: bool) {
        self.set_flag(FLAG_ENTRY_POINT, v);
    }

    #[inline(always)]
    pub fn is_resume_entry_point(&self) -> bool {
        self.flag(FLAG_RESUME_ENTRY_POINT)
    }

    #[inline(always)]
    pub fn set_is_resume_entry_point(&mut self, v: bool) {
        self.set_flag(FLAG_RESUME_ENTRY_POINT, v);
    }

    #[inline(always)]
    pub fn is_call_entry_point(&self) -> bool {
        self.flag(FLAG_CALL_ENTRY_POINT)
    }

    #[inline(always)]
    pub fn set_is_call_entry_point(&mut self, v: bool) {
        self.set_flag(FLAG_CALL_ENTRY_POINT, v);
    }

    #[inline(always)]
    pub fn is_tail_call(&self) -> bool {
        self.flag(FLAG_TAIL_CALL)
    }

    #[inline(always)]
    pub fn set_is_tail_call(&mut self, v: bool) {
        self.set_flag(FLAG_TAIL_CALL, v);
    }

    #[inline(always)]
    pub fn is_method_call(&self) -> bool {
        self.flag(FLAG_METHOD_CALL)
    }

    #[inline(always)]
    pub fn set_is_method_call(&mut self, v: bool) {
        self.set_flag(FLAG_METHOD_CALL, v);
    }
}
