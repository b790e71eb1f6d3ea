//! Events reported to the session's caller.

use std::sync::Arc;

use tspdbg_stream::{ExceptionRecord, StackSnapshot};

/// Something the debugger reported, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Plain program output with all control tags removed.
    Output(String),
    /// A new stack snapshot was decoded.
    StackUpdated(Arc<StackSnapshot>),
    /// Execution stopped at a breakpoint (or after a continue).
    BreakpointHit(Arc<StackSnapshot>),
    /// A step command completed.
    Stepped(Arc<StackSnapshot>),
    /// The script raised a runtime error.
    ExceptionRaised(ExceptionRecord),
    /// The debugger refused a variable assignment.
    SetVariableFailed(String),
    /// The debug session is over.
    SessionEnded,
    /// The debugger reported an unrecoverable error.
    Fatal(String),
}
