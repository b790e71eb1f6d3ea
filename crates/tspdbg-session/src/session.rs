//! Debug session state machine.
//!
//! [`DebugSession`] is fed the debugger's output one chunk at a time and
//! turns it into [`Notification`]s. It does no I/O: commands return the
//! [`ControlLine`] to write, and lines the machine decides to send on its
//! own are collected with [`DebugSession::take_outgoing`].

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, error, info};
use tspdbg_stream::{
    ExceptionReassembler, ExceptionRecord, Frame, Markers, Scope, SetVariableReassembler,
    StackReassembler, StackSnapshot, TagScanner, Variable, Watchpoint,
};

use crate::breakpoint::{Breakpoint, BreakpointManager};
use crate::error::SessionError;
use crate::notification::Notification;
use crate::protocol::{ControlLine, DebugInfo, SetVariableArgs, WatchpointArgs};

/// Lifecycle phase of a debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// The debugger's interactive prompt has not appeared yet. A start
    /// requested now is queued until it does.
    Uninitialized,
    /// The prompt has appeared and the debugger waits for the start line.
    AwaitingPrompt,
    /// The script is executing.
    Running,
    /// Stopped at a breakpoint.
    BreakpointHit,
    /// Stopped after a step.
    Stepped,
    /// A variable assignment completed and the stack was refreshed.
    VariableSet,
    /// The script raised a runtime error.
    ExceptionRaised,
    /// The session is over.
    Ended,
}

/// How the next stack snapshot should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
    Breakpoint,
    Stepped,
}

/// Receives the next decoded stack snapshot.
pub type StackWait = oneshot::Receiver<Arc<StackSnapshot>>;

/// State of one debug session.
#[derive(Debug)]
pub struct DebugSession {
    markers: Markers,
    scanner: TagScanner,
    stacks: StackReassembler,
    exceptions: ExceptionReassembler,
    set_variable: SetVariableReassembler,
    phase: SessionPhase,
    /// Text after the last chunk that may hold the start of a split prompt.
    prompt_tail: String,
    /// End of the previous chunk, for text markers split across reads.
    marker_tail: String,
    /// Bytes of `marker_tail` kept between chunks.
    marker_reach: usize,
    prompt_seen: bool,
    start_sent: bool,
    queued_start: Option<ControlLine>,
    outgoing: Vec<ControlLine>,
    break_kind: BreakKind,
    pending_variable_set: bool,
    script_aborted: bool,
    stack: Option<Arc<StackSnapshot>>,
    exception: Option<ExceptionRecord>,
    set_variable_error: Option<String>,
    breakpoints: BreakpointManager,
    watch_expressions: Vec<String>,
    stack_waiter: Option<oneshot::Sender<Arc<StackSnapshot>>>,
    end_notified: bool,
}

impl DebugSession {
    /// Create a session in the [`Uninitialized`](SessionPhase::Uninitialized) phase.
    pub fn new(markers: Markers) -> Self {
        Self {
            scanner: TagScanner::new(&markers),
            stacks: StackReassembler::new(&markers),
            exceptions: ExceptionReassembler::new(&markers),
            set_variable: SetVariableReassembler::new(&markers),
            marker_reach: marker_reach(&markers),
            markers,
            phase: SessionPhase::Uninitialized,
            prompt_tail: String::new(),
            marker_tail: String::new(),
            prompt_seen: false,
            start_sent: false,
            queued_start: None,
            outgoing: Vec::new(),
            break_kind: BreakKind::Breakpoint,
            pending_variable_set: false,
            script_aborted: false,
            stack: None,
            exception: None,
            set_variable_error: None,
            breakpoints: BreakpointManager::new(),
            watch_expressions: Vec::new(),
            stack_waiter: None,
            end_notified: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn break_kind(&self) -> BreakKind {
        self.break_kind
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    // -----------------------------------------------------------------
    // Stream input
    // -----------------------------------------------------------------

    /// Apply the next chunk of debugger output.
    pub fn apply_output(&mut self, chunk: &str) -> Vec<Notification> {
        let mut notes = Vec::new();
        if self.phase == SessionPhase::Ended {
            return notes;
        }
        debug!("Applying {} bytes of debugger output", chunk.len());

        let text = self.scanner.scan(chunk);
        let snapshots = self.stacks.push(chunk);
        let exception = self.exceptions.push(chunk);
        let set_variable_error = self.set_variable.push(chunk);
        if !text.is_empty() {
            notes.push(Notification::Output(text));
        }

        if !self.start_sent {
            self.watch_prompt(chunk);
            return notes;
        }

        let seen = MarkerWindow {
            tail: &self.marker_tail,
            chunk,
        };
        let session_begin = seen.contains(&self.markers.session_begin);
        let script_aborted = seen.contains(&self.markers.script_aborted);
        let breakpoint_hit = seen.contains(&self.markers.breakpoint_hit);
        let stepped = seen.contains_any(&self.markers.step_completed);
        let variable_set = seen.contains_any(&self.markers.variable_set);
        let session_end = seen.contains(&self.markers.session_end);
        self.marker_tail = seen.next_tail(self.marker_reach);

        if session_begin {
            self.script_aborted = false;
        }
        if script_aborted {
            info!("Script aborted");
            self.script_aborted = true;
        }

        if let Some(record) = exception {
            if !self.script_aborted {
                info!("Script raised: {}", record.description);
                self.set_phase(SessionPhase::ExceptionRaised);
                self.exception = Some(record.clone());
                notes.push(Notification::ExceptionRaised(record));
            }
        }
        // Held until the next resume, across any number of chunks.
        let exception_active = self.exception.is_some();

        if let Some(message) = set_variable_error {
            info!("Variable assignment failed: {}", message);
            // Fails the outstanding wait; no stack follows a refused set.
            self.stack_waiter = None;
            self.set_variable_error = Some(message.clone());
            notes.push(Notification::SetVariableFailed(message));
        }

        if !exception_active {
            if breakpoint_hit {
                self.break_kind = BreakKind::Breakpoint;
            }
            if stepped {
                self.break_kind = BreakKind::Stepped;
            }
        }
        if variable_set {
            self.pending_variable_set = true;
        }

        for snapshot in snapshots {
            self.publish(Arc::new(snapshot), exception_active, &mut notes);
        }

        if session_end && !self.script_aborted && !exception_active {
            self.end(&mut notes);
        }

        notes
    }

    fn watch_prompt(&mut self, chunk: &str) {
        let prompt = self.markers.prompt.as_str();
        let mut window = std::mem::take(&mut self.prompt_tail);
        window.push_str(chunk);

        if !window.contains(prompt) {
            let keep = prompt.len().saturating_sub(1);
            let mut cut = window.len().saturating_sub(keep);
            while !window.is_char_boundary(cut) {
                cut += 1;
            }
            self.prompt_tail = window.split_off(cut);
            return;
        }

        if !self.prompt_seen {
            info!("Debugger prompt seen");
        }
        self.prompt_seen = true;
        match self.queued_start.take() {
            Some(start) => {
                self.outgoing.push(start);
                self.start_sent = true;
                self.set_phase(SessionPhase::Running);
            }
            None => self.set_phase(SessionPhase::AwaitingPrompt),
        }
    }

    fn publish(
        &mut self,
        snapshot: Arc<StackSnapshot>,
        exception_active: bool,
        notes: &mut Vec<Notification>,
    ) {
        self.stack = Some(snapshot.clone());
        if let Some(waiter) = self.stack_waiter.take() {
            // The waiter may have given up already.
            let _ = waiter.send(snapshot.clone());
        }
        notes.push(Notification::StackUpdated(snapshot.clone()));

        if exception_active {
            return;
        }
        if self.pending_variable_set {
            self.pending_variable_set = false;
            self.set_phase(SessionPhase::VariableSet);
            return;
        }
        match self.break_kind {
            BreakKind::Stepped => {
                self.set_phase(SessionPhase::Stepped);
                notes.push(Notification::Stepped(snapshot));
            }
            BreakKind::Breakpoint => {
                self.set_phase(SessionPhase::BreakpointHit);
                notes.push(Notification::BreakpointHit(snapshot));
            }
        }
    }

    fn end(&mut self, notes: &mut Vec<Notification>) {
        self.set_phase(SessionPhase::Ended);
        self.stack_waiter = None;
        self.queued_start = None;
        if !self.end_notified {
            self.end_notified = true;
            notes.push(Notification::SessionEnded);
        }
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            info!("Session phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    /// The debugger reported a fatal error on its error channel.
    pub fn on_fatal(&mut self, message: impl Into<String>) -> Vec<Notification> {
        let message = message.into();
        error!("Debugger fatal error: {}", message);
        self.set_phase(SessionPhase::Ended);
        self.stack_waiter = None;
        self.queued_start = None;
        vec![Notification::Fatal(message)]
    }

    /// The debugger process has exited or closed its output.
    pub fn on_exit(&mut self) -> Vec<Notification> {
        let mut notes = Vec::new();
        self.end(&mut notes);
        notes
    }

    /// Control lines the machine queued on its own.
    pub fn take_outgoing(&mut self) -> Vec<ControlLine> {
        std::mem::take(&mut self.outgoing)
    }

    /// Resolve the returned receiver with the next decoded snapshot.
    ///
    /// Arming again replaces any wait still outstanding; its receiver then
    /// sees the channel closed.
    pub fn arm_stack_wait(&mut self) -> StackWait {
        let (tx, rx) = oneshot::channel();
        self.stack_waiter = Some(tx);
        rx
    }

    // -----------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------

    fn require_live(&self) -> Result<(), SessionError> {
        if self.phase == SessionPhase::Ended {
            return Err(SessionError::Ended);
        }
        Ok(())
    }

    fn require_started(&self) -> Result<(), SessionError> {
        self.require_live()?;
        if !self.start_sent {
            return Err(SessionError::NotStarted);
        }
        Ok(())
    }

    /// Request the debug start.
    ///
    /// Returns the line to write now if the prompt has already been seen;
    /// otherwise the start is queued and sent once the prompt appears.
    pub fn start(&mut self, info: &DebugInfo) -> Result<Option<ControlLine>, SessionError> {
        self.require_live()?;
        if self.start_sent || self.queued_start.is_some() {
            return Err(SessionError::Rejected {
                message: "debug start already requested".into(),
            });
        }
        for args in &info.breakpoints {
            self.breakpoints.add(Breakpoint::from(args));
        }

        let line = ControlLine::Start(info.clone());
        if self.prompt_seen {
            self.start_sent = true;
            self.set_phase(SessionPhase::Running);
            Ok(Some(line))
        } else {
            self.queued_start = Some(line);
            Ok(None)
        }
    }

    pub fn set_breakpoint(&mut self, bp: Breakpoint) -> Result<ControlLine, SessionError> {
        self.require_live()?;
        let line = ControlLine::SetBreakpoint(bp.to_args());
        self.breakpoints.add(bp);
        Ok(line)
    }

    pub fn clear_breakpoints(&mut self) -> Result<ControlLine, SessionError> {
        self.require_live()?;
        self.breakpoints.clear();
        Ok(ControlLine::ClearBreakpoints)
    }

    /// Resume execution until the next breakpoint.
    pub fn continue_run(&mut self) -> Result<ControlLine, SessionError> {
        self.resume(BreakKind::Breakpoint)?;
        Ok(ControlLine::Run)
    }

    pub fn step_over(&mut self) -> Result<ControlLine, SessionError> {
        self.resume(self.break_kind)?;
        Ok(ControlLine::StepOver)
    }

    pub fn step_in(&mut self) -> Result<ControlLine, SessionError> {
        self.resume(self.break_kind)?;
        Ok(ControlLine::StepIn)
    }

    pub fn step_out(&mut self) -> Result<ControlLine, SessionError> {
        self.resume(self.break_kind)?;
        Ok(ControlLine::StepOut)
    }

    fn resume(&mut self, kind: BreakKind) -> Result<(), SessionError> {
        self.require_started()?;
        self.break_kind = kind;
        self.exception = None;
        self.set_phase(SessionPhase::Running);
        Ok(())
    }

    /// Assign `value` to the variable at `path` in frame `level`.
    ///
    /// `path` starts at the root variable name; for table members it is the
    /// [`VariableNode::path`](tspdbg_stream::VariableNode::path) of the leaf.
    pub fn set_variable(
        &mut self,
        path: Vec<String>,
        value: impl Into<String>,
        scope: Scope,
        level: u32,
    ) -> Result<ControlLine, SessionError> {
        self.require_started()?;
        if path.is_empty() {
            return Err(SessionError::Rejected {
                message: "variable path is empty".into(),
            });
        }
        self.set_variable_error = None;
        Ok(ControlLine::SetVariable(SetVariableArgs {
            argument_list: path,
            value: value.into(),
            stack_level: level,
            scope,
        }))
    }

    /// Register `expression` as a live watchpoint.
    ///
    /// Returns `None` when the expression is already registered; its value
    /// is then already part of every snapshot.
    pub fn register_watch(&mut self, expression: &str) -> Result<Option<ControlLine>, SessionError> {
        self.require_started()?;
        if self.watch_expressions.iter().any(|e| e == expression) {
            return Ok(None);
        }
        self.watch_expressions.push(expression.to_string());
        Ok(Some(ControlLine::SetWatchpoint(WatchpointArgs {
            expression: expression.to_string(),
            enable: true,
        })))
    }

    pub fn terminate(&mut self) -> Result<ControlLine, SessionError> {
        self.require_live()?;
        Ok(ControlLine::Exit)
    }

    /// Restart the script from the top.
    pub fn restart(&mut self) -> Result<ControlLine, SessionError> {
        self.resume(BreakKind::Breakpoint)?;
        self.pending_variable_set = false;
        Ok(ControlLine::Restart)
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// The most recent stack snapshot.
    pub fn stack(&self) -> Option<Arc<StackSnapshot>> {
        self.stack.clone()
    }

    pub fn frame(&self, level: u32) -> Option<&Frame> {
        self.stack.as_ref()?.frame(level)
    }

    /// Variables of `scope` in frame `level`; empty when there is no such frame.
    pub fn variables(&self, level: u32, scope: Scope) -> &[Variable] {
        match self.frame(level) {
            Some(frame) => frame.variables(scope),
            None => &[],
        }
    }

    pub fn watchpoint(&self, level: u32, expression: &str) -> Option<&Watchpoint> {
        self.frame(level)?.watchpoint(expression)
    }

    /// The last runtime exception, until execution resumes.
    pub fn exception(&self) -> Option<&ExceptionRecord> {
        self.exception.as_ref()
    }

    /// The last refused assignment, until the next assignment is issued.
    pub fn set_variable_error(&self) -> Option<&str> {
        self.set_variable_error.as_deref()
    }

    pub fn breakpoints(&self) -> &BreakpointManager {
        &self.breakpoints
    }

    /// Registered watch expressions in registration order.
    pub fn watch_expressions(&self) -> &[String] {
        &self.watch_expressions
    }
}

fn marker_reach(markers: &Markers) -> usize {
    [
        &markers.session_begin,
        &markers.script_aborted,
        &markers.breakpoint_hit,
        &markers.session_end,
    ]
    .into_iter()
    .chain(&markers.step_completed)
    .chain(&markers.variable_set)
    .map(|m| m.len().saturating_sub(1))
    .max()
    .unwrap_or(0)
}

/// The current chunk plus the end of the one before it.
///
/// A marker is only reported when it ends inside `chunk`, so a marker seen
/// in one chunk is never seen again with the next.
struct MarkerWindow<'a> {
    tail: &'a str,
    chunk: &'a str,
}

impl MarkerWindow<'_> {
    fn contains(&self, marker: &str) -> bool {
        if marker.is_empty() {
            return false;
        }
        if self.chunk.contains(marker) {
            return true;
        }
        let reach = marker.len() - 1;
        let mut start = self.tail.len().saturating_sub(reach);
        while !self.tail.is_char_boundary(start) {
            start += 1;
        }
        let mut end = reach.min(self.chunk.len());
        while !self.chunk.is_char_boundary(end) {
            end += 1;
        }
        let mut seam = String::with_capacity(self.tail.len() - start + end);
        seam.push_str(&self.tail[start..]);
        seam.push_str(&self.chunk[..end]);
        seam.contains(marker)
    }

    fn contains_any(&self, markers: &[String]) -> bool {
        markers.iter().any(|m| self.contains(m))
    }

    /// The last `keep` bytes of tail and chunk together.
    fn next_tail(&self, keep: usize) -> String {
        let mut joined = String::with_capacity(self.tail.len() + self.chunk.len());
        joined.push_str(self.tail);
        joined.push_str(self.chunk);
        let mut cut = joined.len().saturating_sub(keep);
        while !joined.is_char_boundary(cut) {
            cut += 1;
        }
        joined.split_off(cut)
    }
}
