//! Script closures: an entry point plus the captured-variable cells.

use crate::error::{Result, RuntimeError};
use crate::refid::{RefId, ScriptId};
use crate::symbol::ENV;
use crate::upvalue::UpvalueCell;
use crate::value::{ScriptPrivateResource, Value};
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Location of a function's first instruction in the executor's code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryPoint(pub u32);

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// Shape of a closure's captured scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpvaluesType {
    None,
    /// Exactly one upvalue, and it is `_ENV`.
    Environment,
    Closure,
}

/// A named captured variable.
#[derive(Clone, Debug)]
pub struct Upvalue {
    pub name: Arc<str>,
    pub cell: UpvalueCell,
}

impl Upvalue {
    pub fn new(name: &str, cell: UpvalueCell) -> Self {
        Upvalue {
            name: Arc::from(name),
            cell,
        }
    }
}

/// Something that can run a function on behalf of a script instance.
pub trait ScriptCaller {
    fn script_id(&self) -> ScriptId;
    fn call_function(&mut self, function: &Value, args: Vec<Value>) -> Result<Value>;
}

struct ClosureState {
    entry_point: EntryPoint,
    owner: ScriptId,
    upvalues: Arc<[Upvalue]>,
}

struct ClosureCell {
    id: RefId,
    state: RwLock<Option<ClosureState>>,
}

/// Shared handle to a closure. Cloning aliases the same closure.
#[derive(Clone)]
pub struct ClosureRef(Arc<ClosureCell>);

#[derive(Clone)]
pub struct WeakClosureRef(Weak<ClosureCell>);

impl WeakClosureRef {
    pub fn upgrade(&self) -> Option<ClosureRef> {
        self.0.upgrade().map(ClosureRef)
    }
}

impl ClosureRef {
    pub fn new(owner: ScriptId, entry_point: EntryPoint, upvalues: Vec<Upvalue>) -> Self {
        let id = RefId::next();
        debug!(%id, %entry_point, upvalues = upvalues.len(), "closure created");
        ClosureRef(Arc::new(ClosureCell {
            id,
            state: RwLock::new(Some(ClosureState {
                entry_point,
                owner,
                upvalues: upvalues.into(),
            })),
        }))
    }

    #[inline]
    pub fn id(&self) -> RefId {
        self.0.id
    }

    pub fn ptr_eq(&self, other: &ClosureRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakClosureRef {
        WeakClosureRef(Arc::downgrade(&self.0))
    }

    pub fn is_alive(&self) -> bool {
        self.0.state.read().is_some()
    }

    fn with_state<T>(&self, op: &str, f: impl FnOnce(&ClosureState) -> Result<T>) -> Result<T> {
        match self.0.state.read().as_ref() {
            Some(state) => f(state),
            None => Err(RuntimeError::dead("closure", op)),
        }
    }

    pub fn entry_point(&self) -> Result<EntryPoint> {
        self.with_state("inspect", |s| Ok(s.entry_point))
    }

    pub fn owner(&self) -> Result<ScriptId> {
        self.with_state("inspect", |s| Ok(s.owner))
    }

    /// The captured scope, shared with any frame running this closure.
    pub fn upvalues(&self) -> Result<Arc<[Upvalue]>> {
        self.with_state("inspect", |s| Ok(s.upvalues.clone()))
    }

    pub fn get_upvalues_count(&self) -> Result<usize> {
        self.with_state("inspect", |s| Ok(s.upvalues.len()))
    }

    fn upvalue_at<T>(&self, idx: usize, f: impl FnOnce(&Upvalue) -> T) -> Result<T> {
        self.with_state("inspect", |s| {
            s.upvalues.get(idx).map(f).ok_or_else(|| {
                RuntimeError::InvalidOperation(format!(
                    "upvalue index {idx} out of range ({} upvalues)",
                    s.upvalues.len()
                ))
            })
        })
    }

    pub fn get_upvalue_name(&self, idx: usize) -> Result<Arc<str>> {
        self.upvalue_at(idx, |u| u.name.clone())
    }

    pub fn get_upvalue(&self, idx: usize) -> Result<Value> {
        self.upvalue_at(idx, |u| u.cell.get())
    }

    /// The cell itself; assigning through it is visible to every sharer.
    pub fn get_upvalue_cell(&self, idx: usize) -> Result<UpvalueCell> {
        self.upvalue_at(idx, |u| u.cell.clone())
    }

    pub fn get_upvalues_type(&self) -> Result<UpvaluesType> {
        self.with_state("inspect", |s| {
            Ok(match &*s.upvalues {
                [] => UpvaluesType::None,
                [only] if &*only.name == ENV => UpvaluesType::Environment,
                _ => UpvaluesType::Closure,
            })
        })
    }

    /// Invoke this closure through `caller`, which must be the owning script.
    pub fn call<C: ScriptCaller + ?Sized>(&self, caller: &mut C, args: Vec<Value>) -> Result<Value> {
        let owner = self.with_state("call", |s| Ok(s.owner))?;
        if owner != caller.script_id() {
            return Err(RuntimeError::InvalidOperation(format!(
                "attempt to call a closure owned by {owner} from {}",
                caller.script_id()
            )));
        }
        caller.call_function(&Value::Closure(self.clone()), args)
    }

    pub fn call0<C: ScriptCaller + ?Sized>(&self, caller: &mut C) -> Result<Value> {
        self.call(caller, Vec::new())
    }

    /// Release the captured scope. Returns false if already dead.
    pub fn kill(&self) -> bool {
        let state = self.0.state.write().take();
        match state {
            Some(state) => {
                debug!(id = %self.id(), entry_point = %state.entry_point, "closure killed");
                true
            }
            None => false,
        }
    }
}

impl ScriptPrivateResource for ClosureRef {
    fn owner_script(&self) -> Option<ScriptId> {
        self.0.state.read().as_ref().map(|s| s.owner)
    }
}

impl fmt::Debug for ClosureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "closure({})", self.id())
    }
}
