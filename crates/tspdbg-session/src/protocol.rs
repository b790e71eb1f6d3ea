//! Control lines written to the debugger's standard input.
//!
//! Every command is a single newline-terminated `.debug …` line. Commands
//! carrying arguments embed a JSON object with PascalCase keys, wrapped in
//! single quotes.

use serde::{Deserialize, Serialize};
use tspdbg_stream::Scope;

use crate::error::SessionError;

/// Breakpoint payload of `setBreakpoint` and of the start payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BreakpointArgs {
    pub line_number: u32,
    pub enable: bool,
    /// Empty when the breakpoint is unconditional.
    pub condition: String,
}

/// Payload of `setVariable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetVariableArgs {
    /// Path from the root variable to the assigned leaf.
    pub argument_list: Vec<String>,
    pub value: String,
    pub stack_level: u32,
    pub scope: Scope,
}

/// Payload of `setWatchpoint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WatchpointArgs {
    pub expression: String,
    pub enable: bool,
}

/// Start payload describing the script under debug.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DebugInfo {
    pub file_name: String,
    pub breakpoints: Vec<BreakpointArgs>,
}

/// One control line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlLine {
    Start(DebugInfo),
    Run,
    StepOver,
    StepIn,
    StepOut,
    Exit,
    Restart,
    ClearBreakpoints,
    SetBreakpoint(BreakpointArgs),
    SetVariable(SetVariableArgs),
    SetWatchpoint(WatchpointArgs),
}

impl ControlLine {
    /// Short name used in logs.
    pub fn verb(&self) -> &'static str {
        match self {
            ControlLine::Start(_) => "start",
            ControlLine::Run => "run",
            ControlLine::StepOver => "stepOver",
            ControlLine::StepIn => "stepIn",
            ControlLine::StepOut => "stepOut",
            ControlLine::Exit => "exit",
            ControlLine::Restart => "restart",
            ControlLine::ClearBreakpoints => "clearBreakpoints",
            ControlLine::SetBreakpoint(_) => "setBreakpoint",
            ControlLine::SetVariable(_) => "setVariable",
            ControlLine::SetWatchpoint(_) => "setWatchpoint",
        }
    }

    /// Render the newline-terminated line.
    pub fn encode(&self) -> Result<String, SessionError> {
        let line = match self {
            ControlLine::Start(info) => format!(".debug {}", to_json(info)?),
            ControlLine::SetBreakpoint(args) => quoted(self.verb(), args)?,
            ControlLine::SetVariable(args) => quoted(self.verb(), args)?,
            ControlLine::SetWatchpoint(args) => quoted(self.verb(), args)?,
            ControlLine::Run
            | ControlLine::StepOver
            | ControlLine::StepIn
            | ControlLine::StepOut
            | ControlLine::Exit
            | ControlLine::Restart
            | ControlLine::ClearBreakpoints => format!(".debug {}", self.verb()),
        };
        Ok(format!("{line}\n"))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, SessionError> {
    serde_json::to_string(value).map_err(|e| SessionError::Serialization(e.to_string()))
}

fn quoted<T: Serialize>(verb: &str, args: &T) -> Result<String, SessionError> {
    // A literal quote would end the argument early.
    let json = to_json(args)?.replace('\'', "\\u0027");
    Ok(format!(".debug {verb} '{json}'"))
}
