//! Per-instance runtime state.
//!
//! The `stack`, `call_stack` and resource registries belong to one script
//! instance. The bytecode loop is not part of this crate: it plugs in through
//! [`Executor`] and drives the machine through [`Machine::call`], the symbol
//! accessors and [`Machine::make_closure`].

use crate::frame::{CallFrame, FrameState};
use crate::options::ScriptOptions;
use crate::resolver;
use crate::stack::CallStack;
use lunet_core::closure::{ClosureRef, EntryPoint, Upvalue, WeakClosureRef};
use lunet_core::error::{Result, RuntimeError};
use lunet_core::host::{CallbackRef, NativeContext};
use lunet_core::refid::ScriptId;
use lunet_core::symbol::{SymbolRef, ENV};
use lunet_core::table::{TableRef, WeakTableRef};
use lunet_core::upvalue::UpvalueCell;
use lunet_core::value::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// Registries are swept of dropped handles every this many registrations.
const PRUNE_INTERVAL: usize = 256;

/// What the executor knows about a compiled function.
#[derive(Clone, Debug, Default)]
pub struct FunctionInfo {
    pub local_count: usize,
    /// Symbol of each local slot, by slot index.
    pub debug_symbols: Option<Arc<[SymbolRef]>>,
}

/// The bytecode loop, seen from the runtime.
pub trait Executor {
    fn function_info(&self, entry_point: EntryPoint) -> Result<FunctionInfo>;

    /// Run `closure`, whose frame is already on top of `machine.call_stack`
    /// with its arguments at `machine.frame_args()`.
    fn execute(&mut self, machine: &mut Machine, closure: &ClosureRef) -> Result<Value>;
}

/// Where a new closure's upvalue comes from, relative to the creating frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capture {
    /// A local slot of the creating frame; the slot is moved into a shared cell.
    Local(usize),
    /// An upvalue of the creating closure; its cell is shared as is.
    Upvalue(usize),
}

pub struct Machine {
    id: ScriptId,
    globals: TableRef,
    /// Value stack: call arguments, by frame base pointer.
    pub stack: Vec<Value>,
    pub call_stack: CallStack,
    options: ScriptOptions,
    tables: Vec<WeakTableRef>,
    closures: Vec<WeakClosureRef>,
    registrations: usize,
    coroutine_depth: usize,
}

impl Machine {
    pub fn new(options: ScriptOptions) -> Self {
        let id = ScriptId::next();
        let globals = TableRef::new(Some(id));
        debug!(script = %id, max_call_depth = options.max_call_depth, "script created");
        Machine {
            id,
            tables: vec![globals.downgrade()],
            globals,
            stack: Vec::with_capacity(64),
            call_stack: CallStack::new(options.max_call_depth),
            options,
            closures: Vec::new(),
            registrations: 0,
            coroutine_depth: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> ScriptId {
        self.id
    }

    pub fn globals(&self) -> &TableRef {
        &self.globals
    }

    pub fn options(&self) -> &ScriptOptions {
        &self.options
    }

    // ---- Resources ----

    fn registered(&mut self) {
        self.registrations += 1;
        if self.registrations % PRUNE_INTERVAL == 0 {
            self.tables.retain(|t| t.upgrade().is_some());
            self.closures.retain(|c| c.upgrade().is_some());
            trace!(
                tables = self.tables.len(),
                closures = self.closures.len(),
                "registries pruned"
            );
        }
    }

    /// A new table owned by this instance.
    pub fn new_table(&mut self) -> TableRef {
        let table = TableRef::new(Some(self.id));
        self.tables.push(table.downgrade());
        self.registered();
        table
    }

    /// A new table owned by this instance holding `values` at `1..=n`.
    pub fn new_table_from(&mut self, values: impl IntoIterator<Item = Value>) -> Result<TableRef> {
        let table = TableRef::from_array(Some(self.id), values)?;
        self.tables.push(table.downgrade());
        self.registered();
        Ok(table)
    }

    /// Take responsibility for a table built for this instance elsewhere.
    pub fn adopt_table(&mut self, table: &TableRef) -> Result<()> {
        match table.owner()? {
            None => Err(RuntimeError::InvalidOperation(
                "cannot attach a prime table to a script".into(),
            )),
            Some(owner) if owner != self.id => Err(RuntimeError::InvalidOperation(format!(
                "table owned by {owner} cannot be attached to {}",
                self.id
            ))),
            Some(_) => {
                if !self.tables.iter().any(|t| t.upgrade().is_some_and(|t| t.ptr_eq(table))) {
                    self.tables.push(table.downgrade());
                    self.registered();
                }
                Ok(())
            }
        }
    }

    fn register_closure(&mut self, closure: &ClosureRef) {
        self.closures.push(closure.downgrade());
        self.registered();
    }

    /// A top-level closure for `entry_point` whose only upvalue is `_ENV`.
    pub fn load_function(&mut self, entry_point: EntryPoint) -> ClosureRef {
        let env = UpvalueCell::new(Value::Table(self.globals.clone()));
        let closure = ClosureRef::new(self.id, entry_point, vec![Upvalue::new(ENV, env)]);
        self.register_closure(&closure);
        debug!(script = %self.id, %entry_point, "function loaded");
        closure
    }

    /// Create a closure from inside the running script frame.
    pub fn make_closure(
        &mut self,
        entry_point: EntryPoint,
        captures: &[(&str, Capture)],
    ) -> Result<ClosureRef> {
        let frame = self.call_stack.top_script_frame_mut().ok_or_else(|| {
            RuntimeError::Internal("closure created outside a script frame".into())
        })?;
        let mut upvalues = Vec::with_capacity(captures.len());
        for &(name, capture) in captures {
            let cell = match capture {
                Capture::Local(slot) => frame.local_scope.capture(slot),
                Capture::Upvalue(index) => frame.closure_scope.get(index).map(|u| u.cell.clone()),
            }
            .ok_or_else(|| {
                RuntimeError::Internal(format!("capture {capture:?} of '{name}' out of range"))
            })?;
            upvalues.push(Upvalue::new(name, cell));
        }
        let closure = ClosureRef::new(self.id, entry_point, upvalues);
        self.register_closure(&closure);
        debug!(script = %self.id, %entry_point, upvalues = captures.len(), "closure created");
        Ok(closure)
    }

    /// Kill every table and closure this instance still owns.
    pub fn shutdown(&mut self) {
        self.call_stack.clear();
        self.stack.clear();
        let id = self.id;
        let closures = self
            .closures
            .drain(..)
            .filter_map(|c| c.upgrade())
            .filter(|c| c.kill())
            .count();
        let tables = self
            .tables
            .drain(..)
            .filter_map(|t| t.upgrade())
            .filter(|t| matches!(t.owner(), Ok(Some(owner)) if owner == id))
            .filter(|t| t.kill())
            .count();
        debug!(script = %id, closures, tables, "script shut down");
    }

    // ---- Symbols ----

    pub fn get_symbol(&self, symbol: &SymbolRef) -> Result<Value> {
        resolver::resolve(&self.call_stack, &self.globals, symbol)
    }

    pub fn assign_symbol(&mut self, symbol: &SymbolRef, value: Value) -> Result<()> {
        resolver::assign(&mut self.call_stack, &self.globals, symbol, value)
    }

    pub fn find_symbol_by_name(&self, name: &str) -> SymbolRef {
        resolver::find_symbol_by_name(&self.call_stack, name)
    }

    /// Give locals `from..=to` of the running script frame fresh identities.
    pub fn reassign_locals(&mut self, from: usize, to: usize) -> Result<()> {
        let frame = self
            .call_stack
            .top_script_frame_mut()
            .ok_or_else(|| RuntimeError::Internal("no script frame to reassign".into()))?;
        frame.local_scope.reassign_range(from, to);
        Ok(())
    }

    /// Arguments of the top frame.
    pub fn frame_args(&self) -> &[Value] {
        let base = self.call_stack.top().map_or(self.stack.len(), |f| f.base_pointer);
        self.stack.get(base..).unwrap_or(&[])
    }

    // ---- Coroutines ----

    /// Mark entry into a coroutine body; yields are allowed until the
    /// matching [`Machine::exit_coroutine`].
    pub fn enter_coroutine(&mut self) {
        self.coroutine_depth += 1;
    }

    pub fn exit_coroutine(&mut self) {
        self.coroutine_depth = self.coroutine_depth.saturating_sub(1);
    }

    pub fn in_coroutine(&self) -> bool {
        self.coroutine_depth > 0
    }

    // ---- Calls ----

    /// Call `function` with `args`, running tail call requests returned by
    /// host callbacks to completion.
    ///
    /// Tail calls replace the call in place, so a chain of any length runs in
    /// constant native stack. Continuations and error handlers of the chain
    /// are kept on `pending` and applied innermost first once it ends.
    pub fn call(
        &mut self,
        exec: &mut dyn Executor,
        function: &Value,
        args: Vec<Value>,
    ) -> Result<Value> {
        let mut pending: Vec<Handlers> = Vec::new();
        let mut target = function.clone();
        let mut args = args;
        loop {
            let mut outcome = self.dispatch(exec, &target, args);
            (target, args) = loop {
                outcome = match outcome {
                    Ok(Value::TailCallRequest(request)) => {
                        trace!(
                            target_type = %request.target.data_type(),
                            pending = pending.len(),
                            "tail call"
                        );
                        if request.continuation.is_some() || request.error_handler.is_some() {
                            pending.push(Handlers {
                                continuation: request.continuation.clone(),
                                error_handler: request.error_handler.clone(),
                            });
                        }
                        break (request.target.clone(), request.args.clone());
                    }
                    Ok(Value::YieldRequest(_)) if self.coroutine_depth == 0 => {
                        Err(RuntimeError::YieldOutsideCoroutine)
                    }
                    other => other,
                };
                let Some(handlers) = pending.pop() else {
                    return outcome;
                };
                match (outcome, handlers) {
                    (Ok(value), Handlers { continuation: Some(k), .. }) => {
                        break (Value::HostCallback(k), spread(value));
                    }
                    (Err(err), Handlers { error_handler: Some(handler), .. }) => {
                        break (Value::HostCallback(handler), vec![err.to_value()]);
                    }
                    (unhandled, _) => outcome = unhandled,
                }
            };
        }
    }

    fn dispatch(
        &mut self,
        exec: &mut dyn Executor,
        function: &Value,
        args: Vec<Value>,
    ) -> Result<Value> {
        match function {
            Value::Closure(closure) => self.call_closure(exec, closure, args),
            Value::HostCallback(callback) => self.call_host(callback, args),
            other => Err(RuntimeError::NotCallable {
                got: other.data_type(),
            }),
        }
    }

    fn call_closure(
        &mut self,
        exec: &mut dyn Executor,
        closure: &ClosureRef,
        args: Vec<Value>,
    ) -> Result<Value> {
        if !closure.is_alive() {
            return Err(RuntimeError::dead("closure", "call"));
        }
        let owner = closure.owner()?;
        if owner != self.id {
            return Err(RuntimeError::InvalidOperation(format!(
                "attempt to call a closure owned by {owner} from {}",
                self.id
            )));
        }
        let info = exec.function_info(closure.entry_point()?)?;
        let base = self.stack.len();
        let mut frame = CallFrame::script(closure.clone(), info.local_count, base)?;
        if self.options.debug_symbols {
            frame.debug_symbols = info.debug_symbols;
        }
        frame.set_is_entry_point(self.call_stack.is_empty());
        self.call_stack.push(frame)?;
        let depth = self.call_stack.len();
        self.stack.extend(args);
        self.advance_top(FrameState::Executing)?;

        let result = exec.execute(self, closure);
        self.leave(depth, base, result.is_ok())?;
        result
    }

    fn call_host(&mut self, callback: &CallbackRef, args: Vec<Value>) -> Result<Value> {
        let base = self.stack.len();
        self.call_stack.push(CallFrame::host(callback.clone(), base))?;
        let depth = self.call_stack.len();
        self.stack.extend(args);
        self.advance_top(FrameState::Executing)?;

        let result = {
            let mut ctx = NativeContext::new(&self.stack[base..], Some(self.id), callback.name());
            callback.invoke(&mut ctx)
        };
        self.leave(depth, base, result.is_ok())?;
        result
    }

    fn advance_top(&mut self, next: FrameState) -> Result<()> {
        match self.call_stack.top_mut() {
            Some(frame) => frame.advance(next),
            None => Err(RuntimeError::Internal("call stack is empty".into())),
        }
    }

    /// Pop the frame pushed at `depth`, unwinding any frames the callee left
    /// above it. The frame and its arguments are gone even when the frame's
    /// state is found to be out of order.
    fn leave(&mut self, depth: usize, base: usize, ok: bool) -> Result<()> {
        while self.call_stack.len() > depth {
            self.call_stack.pop();
        }
        let present = self.call_stack.len() == depth;
        let next = if ok {
            FrameState::Returning
        } else {
            FrameState::Unwinding
        };
        let transition = match self.call_stack.top_mut() {
            Some(frame) if present => match frame.state() {
                // The executor may finish its own frame.
                FrameState::Returning | FrameState::Unwinding => Ok(()),
                _ => frame.advance(next),
            },
            _ => Err(RuntimeError::Internal(
                "frame left the call stack before returning".into(),
            )),
        };
        if present {
            self.call_stack.pop();
        }
        self.stack.truncate(base);
        transition
    }
}

/// Continuation and error handler of a tail call still waiting on its target.
struct Handlers {
    continuation: Option<CallbackRef>,
    error_handler: Option<CallbackRef>,
}

/// Call results as an argument list.
fn spread(value: Value) -> Vec<Value> {
    match value {
        Value::Void => Vec::new(),
        Value::Tuple(t) => t.to_vec(),
        other => vec![other],
    }
}
