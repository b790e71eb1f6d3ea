//! Cumulative open/close block reassembly.

/// Reassembly state of a [`BlockReassembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockState {
    /// No open marker seen. Holds only the tail that could still be the
    /// beginning of a split open marker.
    Idle(String),
    /// Open marker seen; holds the text from the marker onward.
    Accumulating(String),
}

/// Accumulates stream chunks until a complete `open … close` span is seen.
///
/// Markers may be split across any number of chunks, and one chunk may
/// complete several blocks.
#[derive(Debug, Clone)]
pub struct BlockReassembler {
    open: String,
    close: String,
    state: BlockState,
    completed: bool,
}

impl BlockReassembler {
    /// Create a reassembler for the given markers.
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
            state: BlockState::Idle(String::new()),
            completed: false,
        }
    }

    /// Current reassembly state.
    pub fn state(&self) -> &BlockState {
        &self.state
    }

    /// Whether an open marker has been seen and its block is in progress.
    pub fn is_started(&self) -> bool {
        matches!(self.state, BlockState::Accumulating(_))
    }

    /// Whether the most recent [`push`](Self::push) completed a block.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Drop all accumulated text and flags.
    pub fn reset(&mut self) {
        self.state = BlockState::Idle(String::new());
        self.completed = false;
    }

    /// Feed the next chunk and return every block it completed, in order.
    ///
    /// Each block spans exactly from its open marker through its close
    /// marker. Text following a close marker starts the next accumulation.
    ///
    /// An empty open marker never matches.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.completed = false;
        if self.open.is_empty() {
            return Vec::new();
        }
        let mut buffer = match std::mem::replace(&mut self.state, BlockState::Idle(String::new())) {
            BlockState::Idle(text) | BlockState::Accumulating(text) => text,
        };
        buffer.push_str(chunk);

        let mut blocks = Vec::new();
        loop {
            let Some(start) = buffer.find(self.open.as_str()) else {
                self.state = BlockState::Idle(self.idle_tail(buffer));
                break;
            };
            buffer.drain(..start);

            let body = self.open.len();
            match buffer[body..].find(self.close.as_str()) {
                Some(offset) => {
                    let end = body + offset + self.close.len();
                    blocks.push(buffer[..end].to_string());
                    buffer.drain(..end);
                    self.completed = true;
                }
                None => {
                    self.state = BlockState::Accumulating(buffer);
                    break;
                }
            }
        }
        blocks
    }

    fn idle_tail(&self, mut buffer: String) -> String {
        let keep = self.open.len().saturating_sub(1);
        if buffer.len() > keep {
            let mut cut = buffer.len() - keep;
            while !buffer.is_char_boundary(cut) {
                cut += 1;
            }
            buffer.drain(..cut);
        }
        buffer
    }
}
