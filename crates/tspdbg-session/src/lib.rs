//! tspdbg-session: debug session control for the TSP debugger.
//!
//! This crate drives a debugger child process: it feeds the child's output
//! through the stream reassemblers, classifies what happened, and writes
//! the `.debug` control lines that step, continue and inspect the script.

pub mod breakpoint;
pub mod client;
pub mod error;
pub mod notification;
pub mod protocol;
pub mod session;

// Re-export key types for convenience.
pub use breakpoint::{Breakpoint, BreakpointManager};
pub use client::DebuggerClient;
pub use error::SessionError;
pub use notification::Notification;
pub use protocol::{BreakpointArgs, ControlLine, DebugInfo, SetVariableArgs, WatchpointArgs};
pub use session::{BreakKind, DebugSession, SessionPhase, StackWait};
