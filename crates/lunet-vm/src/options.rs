//! Per-script runtime options.

/// Options fixed when a script instance is created.
#[derive(Clone, Debug)]
pub struct ScriptOptions {
    /// Maximum number of frames on the call stack.
    pub max_call_depth: usize,
    /// Attach local symbol tables to script frames so names can be looked up.
    pub debug_symbols: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        ScriptOptions {
            max_call_depth: 200,
            debug_symbols: true,
        }
    }
}
