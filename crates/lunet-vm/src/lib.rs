//! Lunet runtime: call frames, local scopes, symbol resolution and the
//! script instance that hosts call into.

pub mod frame;
pub mod machine;
pub mod options;
pub mod resolver;
pub mod scope;
pub mod script;
pub mod stack;

pub use frame::{CallFrame, FrameState};
pub use machine::{Capture, Executor, FunctionInfo, Machine};
pub use options::ScriptOptions;
pub use scope::LocalScope;
pub use script::Script;
pub use stack::CallStack;
