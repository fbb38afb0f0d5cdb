//! Process-wide identity numbers for reference values and script instances.
//!
//! Identities are drawn from monotonically increasing atomic counters, so a
//! number is never handed out twice within a process, even when the object
//! that carried it came from a recycled buffer.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

static NEXT_REF_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SCRIPT_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of a reference value (table, closure, callback, coroutine, host data, tuple).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId(u64);

impl RefId {
    /// Allocate a fresh identity.
    #[inline]
    pub fn next() -> Self {
        RefId(NEXT_REF_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// Identity of a script instance; resources owned by an instance carry it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(u32);

impl ScriptId {
    pub fn next() -> Self {
        ScriptId(NEXT_SCRIPT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "script#{}", self.0)
    }
}
