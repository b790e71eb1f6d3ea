//! Async client driving one debugger child process.
//!
//! The child's stdout is read in arbitrary-sized chunks and applied to the
//! [`DebugSession`] strictly in arrival order. Control lines go out through a
//! writer task; notifications come back on an unbounded channel.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};
use tspdbg_stream::{Markers, Scope, StackSnapshot, Utf8Chunker, Watchpoint};

use crate::breakpoint::Breakpoint;
use crate::error::SessionError;
use crate::notification::Notification;
use crate::protocol::{ControlLine, DebugInfo};
use crate::session::{DebugSession, SessionPhase, StackWait};

/// Size of a single stdout read.
const READ_BUFFER_SIZE: usize = 4096;

/// Capacity of the outgoing line queue.
const WRITER_QUEUE: usize = 64;

/// Client for one debugger process.
pub struct DebuggerClient {
    session: Arc<Mutex<DebugSession>>,
    writer_tx: mpsc::Sender<Vec<u8>>,
    child: Child,
    stack_timeout: Duration,
}

impl DebuggerClient {
    /// Spawn `command` and start the reader and writer tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        command: &str,
        args: &[String],
        markers: Markers,
        stack_timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notification>), SessionError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Transport("could not capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Transport("could not capture stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::Transport("could not capture stderr".into()))?;

        let session = Arc::new(Mutex::new(DebugSession::new(markers)));
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (writer_tx, writer_rx) = mpsc::channel::<Vec<u8>>(WRITER_QUEUE);

        tokio::spawn(write_lines(stdin, writer_rx));
        tokio::spawn(read_output(
            stdout,
            session.clone(),
            writer_tx.clone(),
            notify_tx.clone(),
        ));
        tokio::spawn(read_errors(stderr, session.clone(), notify_tx));

        info!("Spawned debugger {} (pid {:?})", command, child.id());
        Ok((
            Self {
                session,
                writer_tx,
                child,
                stack_timeout,
            },
            notify_rx,
        ))
    }

    /// Shared handle to the session for queries.
    pub fn session(&self) -> Arc<Mutex<DebugSession>> {
        self.session.clone()
    }

    /// Request the debug start; it is written once the prompt appears.
    pub async fn start(&self, info: &DebugInfo) -> Result<(), SessionError> {
        let line = self.session.lock().await.start(info)?;
        if let Some(line) = line {
            self.send(&line).await?;
        }
        Ok(())
    }

    pub async fn set_breakpoint(&self, bp: Breakpoint) -> Result<(), SessionError> {
        self.issue(|s| s.set_breakpoint(bp)).await
    }

    pub async fn clear_breakpoints(&self) -> Result<(), SessionError> {
        self.issue(DebugSession::clear_breakpoints).await
    }

    pub async fn continue_run(&self) -> Result<(), SessionError> {
        self.issue(DebugSession::continue_run).await
    }

    pub async fn step_over(&self) -> Result<(), SessionError> {
        self.issue(DebugSession::step_over).await
    }

    pub async fn step_in(&self) -> Result<(), SessionError> {
        self.issue(DebugSession::step_in).await
    }

    pub async fn step_out(&self) -> Result<(), SessionError> {
        self.issue(DebugSession::step_out).await
    }

    pub async fn restart(&self) -> Result<(), SessionError> {
        self.issue(DebugSession::restart).await
    }

    /// Assign a variable. The returned wait resolves with the refreshed
    /// stack; pass it to [`next_stack`](Self::next_stack).
    pub async fn set_variable(
        &self,
        path: Vec<String>,
        value: &str,
        scope: Scope,
        level: u32,
    ) -> Result<StackWait, SessionError> {
        let (line, wait) = {
            let mut session = self.session.lock().await;
            let line = session.set_variable(path, value, scope, level)?;
            (line, session.arm_stack_wait())
        };
        self.send(&line).await?;
        Ok(wait)
    }

    /// Arm a wait for the next stack snapshot.
    pub async fn wait_for_stack_update(&self) -> StackWait {
        self.session.lock().await.arm_stack_wait()
    }

    /// Await a stack wait, bounded by the configured timeout.
    pub async fn next_stack(&self, wait: StackWait) -> Result<Arc<StackSnapshot>, SessionError> {
        match timeout(self.stack_timeout, wait).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(_)) => {
                let session = self.session.lock().await;
                if let Some(message) = session.set_variable_error() {
                    Err(SessionError::Rejected {
                        message: message.to_string(),
                    })
                } else if session.phase() == SessionPhase::Ended {
                    Err(SessionError::Ended)
                } else {
                    Err(SessionError::Rejected {
                        message: "stack wait was replaced by a newer one".into(),
                    })
                }
            }
            Err(_) => Err(SessionError::Timeout {
                what: "stack update".into(),
            }),
        }
    }

    /// Evaluate `expression` in frame `level`.
    ///
    /// A new expression is registered as a watchpoint and read back from the
    /// next snapshot; `None` if no snapshot arrives in time or the frame
    /// does not carry it.
    pub async fn evaluate_watch(
        &self,
        expression: &str,
        level: u32,
    ) -> Result<Option<Watchpoint>, SessionError> {
        let (line, wait) = {
            let mut session = self.session.lock().await;
            match session.register_watch(expression)? {
                Some(line) => (line, session.arm_stack_wait()),
                None => return Ok(session.watchpoint(level, expression).cloned()),
            }
        };
        self.send(&line).await?;

        match self.next_stack(wait).await {
            Ok(snapshot) => Ok(snapshot
                .frame(level)
                .and_then(|frame| frame.watchpoint(expression))
                .cloned()),
            Err(SessionError::Timeout { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Ask the debugger to exit and wait for the process to finish.
    ///
    /// The exit line is only written while the child is alive. The child is
    /// never killed.
    pub async fn terminate(&mut self) -> Result<ExitStatus, SessionError> {
        if matches!(self.child.try_wait(), Ok(None)) {
            // A fatal error ends the session but may leave the child running.
            let line = match self.session.lock().await.terminate() {
                Ok(line) => line,
                Err(SessionError::Ended) => ControlLine::Exit,
                Err(e) => return Err(e),
            };
            if let Err(e) = self.send(&line).await {
                debug!("Exit line not delivered: {}", e);
            }
        }
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        info!("Debugger exited with {}", status);
        Ok(status)
    }

    async fn issue<F>(&self, build: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut DebugSession) -> Result<ControlLine, SessionError>,
    {
        let line = build(&mut *self.session.lock().await)?;
        self.send(&line).await
    }

    async fn send(&self, line: &ControlLine) -> Result<(), SessionError> {
        send_line(&self.writer_tx, line).await
    }
}

async fn send_line(
    writer_tx: &mpsc::Sender<Vec<u8>>,
    line: &ControlLine,
) -> Result<(), SessionError> {
    let encoded = line.encode()?;
    debug!("Sending .debug {}", line.verb());
    writer_tx
        .send(encoded.into_bytes())
        .await
        .map_err(|_| SessionError::Transport("debugger input closed".into()))
}

fn forward(notify_tx: &mpsc::UnboundedSender<Notification>, notes: Vec<Notification>) {
    for note in notes {
        if notify_tx.send(note).is_err() {
            break;
        }
    }
}

async fn write_lines(mut stdin: ChildStdin, mut writer_rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(msg) = writer_rx.recv().await {
        if stdin.write_all(&msg).await.is_err() {
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
}

async fn read_output(
    mut stdout: ChildStdout,
    session: Arc<Mutex<DebugSession>>,
    writer_tx: mpsc::Sender<Vec<u8>>,
    notify_tx: mpsc::UnboundedSender<Notification>,
) {
    let mut chunker = Utf8Chunker::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("Reading debugger output failed: {}", e);
                break;
            }
        };
        let text = chunker.decode(&buf[..n]);
        if !text.is_empty() {
            apply_chunk(&text, &session, &writer_tx, &notify_tx).await;
        }
    }

    let tail = chunker.finish();
    if !tail.is_empty() {
        apply_chunk(&tail, &session, &writer_tx, &notify_tx).await;
    }
    let notes = session.lock().await.on_exit();
    forward(&notify_tx, notes);
}

async fn apply_chunk(
    text: &str,
    session: &Mutex<DebugSession>,
    writer_tx: &mpsc::Sender<Vec<u8>>,
    notify_tx: &mpsc::UnboundedSender<Notification>,
) {
    let (notes, outgoing) = {
        let mut session = session.lock().await;
        let notes = session.apply_output(text);
        (notes, session.take_outgoing())
    };
    for line in outgoing {
        if let Err(e) = send_line(writer_tx, &line).await {
            warn!("Could not send .debug {}: {}", line.verb(), e);
        }
    }
    forward(notify_tx, notes);
}

async fn read_errors(
    stderr: ChildStderr,
    session: Arc<Mutex<DebugSession>>,
    notify_tx: mpsc::UnboundedSender<Notification>,
) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let notes = session.lock().await.on_fatal(line);
        forward(&notify_tx, notes);
    }
}
