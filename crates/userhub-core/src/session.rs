//! Client-side lifecycle of one pagination session.
//!
//! ```text
//! Open ──close_requests──▶ RequestClosed ──finish──▶ Closed { failed: false }
//!   │                           │
//!   └────────────fail───────────┴──────────────────▶ Closed { failed: true }
//! ```
//!
//! There is no way back to `Open`. Chunks may be recorded while `Open` or
//! `RequestClosed`, since the response direction is independent of the
//! request direction.

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Both directions are live.
    Open,
    /// The request stream has been completed; responses may still arrive.
    RequestClosed,
    /// The response stream has ended, cleanly or not.
    Closed { failed: bool },
}

/// Tracks the state and the number of chunks received in one session.
#[derive(Debug)]
pub struct StreamSession {
    state: SessionState,
    chunks: u64,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSession {
    pub const fn new() -> Self {
        Self {
            state: SessionState::Open,
            chunks: 0,
        }
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Number of chunks recorded so far.
    pub const fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Marks the request direction as completed.
    pub fn close_requests(&mut self) -> Result<()> {
        match self.state {
            SessionState::Open => {
                self.state = SessionState::RequestClosed;
                Ok(())
            }
            other => Err(invalid_transition(other, "close requests")),
        }
    }

    /// Records one received chunk and returns its 1-based sequence number.
    pub fn record_chunk(&mut self) -> Result<u64> {
        match self.state {
            SessionState::Open | SessionState::RequestClosed => {
                self.chunks += 1;
                Ok(self.chunks)
            }
            other => Err(invalid_transition(other, "record a chunk")),
        }
    }

    /// Marks the response direction as cleanly completed.
    ///
    /// The request direction must have been closed first: a server that ends
    /// its responses while requests are still open has broken the protocol.
    pub fn finish(&mut self) -> Result<()> {
        match self.state {
            SessionState::RequestClosed => {
                self.state = SessionState::Closed { failed: false };
                Ok(())
            }
            other => Err(invalid_transition(other, "finish")),
        }
    }

    /// Closes the session with the error flag set, from any live state.
    pub fn fail(&mut self) {
        if !self.is_closed() {
            self.state = SessionState::Closed { failed: true };
        }
    }

    pub const fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed { .. })
    }
}

fn invalid_transition(state: SessionState, op: &str) -> Error {
    Error::StreamProtocol {
        reason: format!("cannot {op} while session is {state:?}"),
    }
}
