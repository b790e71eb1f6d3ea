//! Session error types.

use thiserror::Error;

/// Errors from debugger session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Debugger process failed to start.
    #[error("debugger failed to start: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// The pipe to or from the debugger is gone.
    #[error("transport error: {0}")]
    Transport(String),

    /// A control payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The debug-start command has not been sent yet.
    #[error("debug session not started")]
    NotStarted,

    /// The session has ended; no further commands are accepted.
    #[error("debug session has ended")]
    Ended,

    /// The command is not valid in the current state, or the debugger
    /// refused it.
    #[error("command rejected: {message}")]
    Rejected {
        /// Why the command was rejected.
        message: String,
    },

    /// Waited too long for the debugger to report back.
    #[error("timed out waiting for {what}")]
    Timeout {
        /// What was being waited for.
        what: String,
    },
}
