//! One-at-a-time command submission.

use remote_shell_core::{SessionFault, SessionState};
use remote_shell_transport::{CommandResponse, TransportError};
use thiserror::Error;

/// Why a command was refused locally. Nothing was sent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Session is not active (state: {0})")]
    NotActive(SessionState),
    #[error("A command is already being processed")]
    CommandPending,
    #[error("Command input is closed")]
    InputClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputLock {
    /// Ready for a command.
    Open,
    /// A command is in flight.
    Pending,
    /// No further commands will be accepted.
    Closed,
}

/// Input lock for the command request.
///
/// Input is locked before the request is sent and only reopened when the
/// server accepts the command. Any failure leaves it closed.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    lock: InputLock,
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandChannel {
    /// Closed until the session becomes active.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lock: InputLock::Closed,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock == InputLock::Open
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.lock == InputLock::Pending
    }

    /// Accept commands.
    pub const fn open(&mut self) {
        self.lock = InputLock::Open;
    }

    /// Stop accepting commands. Returns whether input was open before.
    pub fn close(&mut self) -> bool {
        std::mem::replace(&mut self.lock, InputLock::Closed) == InputLock::Open
    }

    /// Lock input for a new command.
    ///
    /// # Errors
    /// Returns why the command cannot be sent now.
    pub fn begin(&mut self, state: SessionState) -> Result<(), SubmitError> {
        if state != SessionState::Active {
            return Err(SubmitError::NotActive(state));
        }
        match self.lock {
            InputLock::Open => {
                self.lock = InputLock::Pending;
                Ok(())
            }
            InputLock::Pending => Err(SubmitError::CommandPending),
            InputLock::Closed => Err(SubmitError::InputClosed),
        }
    }

    /// Settle the in-flight command. Returns the fault to report, if any.
    ///
    /// Input is reopened only when the server accepted the command.
    pub fn finish(
        &mut self,
        result: Result<CommandResponse, TransportError>,
    ) -> Result<(), SessionFault> {
        let outcome = match result {
            Ok(response) => response.fault().map_or(Ok(()), Err),
            Err(err) => Err(SessionFault::CommandUndelivered {
                detail: err.to_string(),
            }),
        };

        self.lock = if outcome.is_ok() && self.lock == InputLock::Pending {
            InputLock::Open
        } else {
            InputLock::Closed
        };
        outcome
    }
}
