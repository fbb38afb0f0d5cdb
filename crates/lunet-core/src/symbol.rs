//! Symbol references: how a name in a script resolves to storage.

use std::fmt;
use std::sync::Arc;

/// Name of the environment variable every chunk closes over.
pub const ENV: &str = "_ENV";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Local,
    Upvalue,
    Global,
    DefaultEnv,
}

/// A resolved reference to a variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SymbolRef {
    /// Slot `index` in the current frame's local scope.
    Local { name: Arc<str>, index: usize },
    /// Slot `index` in the current closure's captured scope.
    Upvalue { name: Arc<str>, index: usize },
    /// Field `name` of the table `env` resolves to.
    Global { name: Arc<str>, env: Arc<SymbolRef> },
    /// The script's globals table itself.
    DefaultEnv,
}

impl SymbolRef {
    pub fn local(name: &str, index: usize) -> Self {
        SymbolRef::Local {
            name: Arc::from(name),
            index,
        }
    }

    pub fn upvalue(name: &str, index: usize) -> Self {
        SymbolRef::Upvalue {
            name: Arc::from(name),
            index,
        }
    }

    pub fn global(name: &str, env: SymbolRef) -> Self {
        SymbolRef::Global {
            name: Arc::from(name),
            env: Arc::new(env),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SymbolRef::Local { name, .. }
            | SymbolRef::Upvalue { name, .. }
            | SymbolRef::Global { name, .. } => name,
            SymbolRef::DefaultEnv => ENV,
        }
    }

    pub fn kind(&self) -> SymbolKind {
        match self {
            SymbolRef::Local { .. } => SymbolKind::Local,
            SymbolRef::Upvalue { .. } => SymbolKind::Upvalue,
            SymbolRef::Global { .. } => SymbolKind::Global,
            SymbolRef::DefaultEnv => SymbolKind::DefaultEnv,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            SymbolRef::Local { index, .. } | SymbolRef::Upvalue { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolRef::Local { name, index } => write!(f, "local {name} [{index}]"),
            SymbolRef::Upvalue { name, index } => write!(f, "upvalue {name} [{index}]"),
            SymbolRef::Global { name, env } => write!(f, "global {name} in ({env})"),
            SymbolRef::DefaultEnv => f.write_str("default env"),
        }
    }
}
