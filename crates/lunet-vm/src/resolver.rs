//! Symbol resolution: reads and writes of locals, upvalues and globals.
//!
//! Locals and upvalues always resolve against the nearest *script* frame;
//! host callback frames have no variables of their own and are skipped.

use crate::frame::CallFrame;
use crate::stack::CallStack;
use lunet_core::error::{Result, RuntimeError};
use lunet_core::symbol::{SymbolRef, ENV};
use lunet_core::table::TableRef;
use lunet_core::value::Value;
use tracing::trace;

fn script_frame<'a>(stack: &'a CallStack, symbol: &SymbolRef) -> Result<&'a CallFrame> {
    stack
        .top_script_frame()
        .ok_or_else(|| RuntimeError::Internal(format!("no script frame to resolve {symbol}")))
}

fn out_of_range(symbol: &SymbolRef) -> RuntimeError {
    RuntimeError::Internal(format!("{symbol} is out of range for the current frame"))
}

fn env_table(env: &Value) -> Result<&TableRef> {
    env.as_table().ok_or_else(|| {
        RuntimeError::Internal(format!(
            "_ENV is not a table but a {}",
            env.data_type().lua_type_name()
        ))
    })
}

/// Read the variable `symbol` refers to.
pub fn resolve(stack: &CallStack, globals: &TableRef, symbol: &SymbolRef) -> Result<Value> {
    match symbol {
        SymbolRef::DefaultEnv => Ok(Value::Table(globals.clone())),
        SymbolRef::Global { name, env } => {
            let env = resolve(stack, globals, env)?;
            env_table(&env)?.get_str(name)
        }
        SymbolRef::Local { index, .. } => script_frame(stack, symbol)?
            .local_scope
            .get(*index)
            .ok_or_else(|| out_of_range(symbol)),
        SymbolRef::Upvalue { index, .. } => script_frame(stack, symbol)?
            .closure_scope
            .get(*index)
            .map(|u| u.cell.get())
            .ok_or_else(|| out_of_range(symbol)),
    }
}

/// Write `value` to the variable `symbol` refers to.
pub fn assign(
    stack: &mut CallStack,
    globals: &TableRef,
    symbol: &SymbolRef,
    value: Value,
) -> Result<()> {
    trace!(%symbol, "assign");
    match symbol {
        SymbolRef::DefaultEnv => Err(RuntimeError::InvalidOperation(
            "cannot assign to the default environment".into(),
        )),
        SymbolRef::Global { name, env } => {
            let env = resolve(stack, globals, env)?;
            env_table(&env)?.set_str(name, value)
        }
        SymbolRef::Local { index, .. } => {
            let frame = stack.top_script_frame_mut().ok_or_else(|| {
                RuntimeError::Internal(format!("no script frame to resolve {symbol}"))
            })?;
            if frame.local_scope.set(*index, value) {
                Ok(())
            } else {
                Err(out_of_range(symbol))
            }
        }
        SymbolRef::Upvalue { index, .. } => {
            let upvalue = script_frame(stack, symbol)?
                .closure_scope
                .get(*index)
                .ok_or_else(|| out_of_range(symbol))?;
            upvalue.cell.set(value);
            Ok(())
        }
    }
}

/// Map a variable name to a symbol: the innermost declared local first, then
/// upvalues of the running closure, then a global through `_ENV`.
pub fn find_symbol_by_name(stack: &CallStack, name: &str) -> SymbolRef {
    if let Some(frame) = stack.top_script_frame() {
        if let Some(symbols) = &frame.debug_symbols {
            let local = symbols
                .iter()
                .enumerate()
                .rev()
                .find(|(i, sym)| sym.name() == name && frame.local_scope.is_valid(*i));
            if let Some((_, sym)) = local {
                return sym.clone();
            }
        }
        if let Some(i) = frame.closure_scope.iter().position(|u| &*u.name == name) {
            return SymbolRef::upvalue(name, i);
        }
    }
    if name == ENV {
        SymbolRef::DefaultEnv
    } else {
        SymbolRef::global(name, find_symbol_by_name(stack, ENV))
    }
}
