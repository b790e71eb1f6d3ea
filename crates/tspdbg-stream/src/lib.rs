//! tspdbg-stream: stream reassembly for the TSP debugger channel.
//!
//! The debugger child process writes one continuous text stream that mixes
//! program output with tag-delimited control payloads. This crate splits
//! that stream back apart: the tag scanner recovers plain output, and the
//! block reassemblers rebuild stack, exception and set-variable payloads
//! regardless of where the chunk boundaries fall.

pub mod entities;
pub mod error;
pub mod exception;
pub mod markers;
pub mod model;
pub mod reassembler;
pub mod scanner;
pub mod set_variable;
pub mod stack;
pub mod table;
pub mod utf8;

// Re-export key types for convenience.
pub use error::DecodeError;
pub use exception::{decode_exception, ExceptionReassembler};
pub use markers::{ContinuationFilter, Markers};
pub use model::{
    ExceptionRecord, Frame, NodeValue, Scope, StackSnapshot, TraceEntry, VarType, Variable,
    VariableNode, Watchpoint,
};
pub use reassembler::{BlockReassembler, BlockState};
pub use scanner::TagScanner;
pub use set_variable::{decode_set_variable_error, SetVariableReassembler};
pub use stack::{decode_stacks, StackReassembler};
pub use table::reconstruct;
pub use utf8::Utf8Chunker;
