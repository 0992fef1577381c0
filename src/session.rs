//! Session lifecycle state machine
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> Ready <-> Busy
//!                     ^              |              |        |
//!                     +-- redirect --+              v        v
//!                                                 Failed <---+
//! any state -> Closing -> Disconnected
//! ```
//!
//! `Failed` is terminal: only a fresh connect builds a new session.

use crate::error::{Error, Result};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transport
    #[default]
    Disconnected,
    /// Opening the transport
    Connecting,
    /// Running the login handshake
    Authenticating,
    /// Idle and able to accept a command
    Ready,
    /// A command is in flight
    Busy,
    /// Shutting the transport down
    Closing,
    /// Unrecoverable error; the connection must be replaced
    Failed,
}

impl SessionState {
    /// Whether moving from `self` to `to` is allowed
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;

        match (self, to) {
            (_, Closing) => self != Closing,
            (Closing, Disconnected) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Authenticating) => true,
            // a redirect reopens the transport
            (Authenticating, Connecting) => true,
            (Authenticating, Ready) => true,
            (Ready, Busy) => true,
            (Busy, Ready) => true,
            (Connecting | Authenticating | Ready | Busy, Failed) => true,
            _ => false,
        }
    }

    /// Whether commands may be issued
    pub fn is_ready(self) -> bool {
        self == SessionState::Ready
    }

    /// Whether this state can never return to `Ready`
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Disconnected)
    }
}

/// Tracks the state of one connection
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
    /// Bumped every time a command is issued; invalidates older result sets
    generation: u64,
}

impl Session {
    /// Create a session in the `Disconnected` state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current command generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Move to `to`, rejecting transitions the lifecycle does not allow
    pub fn transition(&mut self, to: SessionState, operation: &'static str) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(Error::InvalidState {
                state: self.state,
                operation,
            });
        }
        tracing::trace!(from = ?self.state, to = ?to, operation, "session transition");
        self.state = to;
        Ok(())
    }

    /// Enter `Busy` for a new command and bump the generation
    pub fn begin_command(&mut self, operation: &'static str) -> Result<u64> {
        match self.state {
            SessionState::Ready => {}
            SessionState::Busy => return Err(Error::Busy),
            state => return Err(Error::InvalidState { state, operation }),
        }
        self.transition(SessionState::Busy, operation)?;
        self.generation += 1;
        Ok(self.generation)
    }

    /// Leave `Busy` after a command, going to `Failed` on fatal errors
    pub fn finish_command<T>(&mut self, result: &Result<T>) {
        let next = match result {
            Err(e) if e.is_fatal() => SessionState::Failed,
            _ => SessionState::Ready,
        };
        if self.state == SessionState::Busy {
            self.state = next;
        }
    }

    /// Force the `Failed` state from anywhere except the closed states
    pub fn fail(&mut self) {
        if self.state.can_transition_to(SessionState::Failed) {
            tracing::debug!(from = ?self.state, "session failed");
            self.state = SessionState::Failed;
        }
    }

    /// Run `Closing -> Disconnected`; a no-op when already disconnected
    pub fn close(&mut self) {
        if self.state != SessionState::Disconnected {
            self.state = SessionState::Closing;
            self.state = SessionState::Disconnected;
        }
    }
}
