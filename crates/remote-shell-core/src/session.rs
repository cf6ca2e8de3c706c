//! Client-side representation of one remote shell.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::OutputBuffer;

/// Opaque shell identifier issued by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ShellId(String);

impl ShellId {
    /// Wrap a server-issued identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShellId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ShellId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// Servers emit the id either as a JSON string or as a bare integer.
impl<'de> Deserialize<'de> for ShellId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self(text),
            Raw::Number(number) => Self(number.to_string()),
        })
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing has been requested yet.
    Uninitialized,
    /// Trying to reattach to a previously issued shell.
    Restoring,
    /// Asking the server for a brand-new shell.
    Registering,
    /// Polling output and accepting commands.
    Active,
    /// The remote process exited normally.
    Exited,
    /// The server reported the shell gone, killed, or unauthenticated.
    Killed,
    /// Setup failed, or the server sent something unrecognisable.
    Failed,
    /// Teardown ran.
    Closed,
}

impl SessionState {
    /// Whether no further protocol traffic happens in this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited | Self::Killed | Self::Failed | Self::Closed)
    }

    /// Whether the transition `self -> next` is part of the lifecycle.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Closed, _) => false,
            (_, Self::Closed)
            | (Self::Uninitialized, Self::Restoring | Self::Registering)
            | (Self::Restoring, Self::Active | Self::Registering)
            | (Self::Registering, Self::Active | Self::Failed)
            | (Self::Active, Self::Exited | Self::Killed | Self::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Restoring => "restoring",
            Self::Registering => "registering",
            Self::Active => "active",
            Self::Exited => "exited",
            Self::Killed => "killed",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Session model error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Shell id already assigned: {0}")]
    IdAlreadyAssigned(ShellId),
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
    #[error("Session already started (state: {0})")]
    AlreadyStarted(SessionState),
}

/// One remote shell as seen by the client.
///
/// The id is assigned at most once. The chunk cursor only moves forward,
/// except for the explicit reset when a fresh shell is adopted.
#[derive(Debug)]
pub struct Session {
    id: Option<ShellId>,
    state: SessionState,
    next_chunk_id: u64,
    output: Arc<OutputBuffer>,
    killed_locally: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create an uninitialized session with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: None,
            state: SessionState::Uninitialized,
            next_chunk_id: 0,
            output: Arc::new(OutputBuffer::new()),
            killed_locally: false,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Option<&ShellId> {
        self.id.as_ref()
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn next_chunk_id(&self) -> u64 {
        self.next_chunk_id
    }

    /// Shared handle to the output buffer.
    #[must_use]
    pub const fn output(&self) -> &Arc<OutputBuffer> {
        &self.output
    }

    /// Whether the client has already observed the shell terminating.
    #[must_use]
    pub const fn killed_locally(&self) -> bool {
        self.killed_locally
    }

    pub const fn mark_killed_locally(&mut self) {
        self.killed_locally = true;
    }

    /// Move to `next`, returning the previous state.
    ///
    /// # Errors
    /// Returns `InvalidTransition` if the lifecycle does not allow it.
    pub fn transition(&mut self, next: SessionState) -> Result<SessionState, SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        Ok(std::mem::replace(&mut self.state, next))
    }

    /// Adopt a freshly created shell: cursor back to 0, buffer emptied.
    ///
    /// # Errors
    /// Returns `IdAlreadyAssigned` if this session already has an id.
    pub fn adopt_fresh(&mut self, id: ShellId) -> Result<(), SessionError> {
        self.assign_id(id)?;
        self.next_chunk_id = 0;
        self.output.reset();
        Ok(())
    }

    /// Adopt a restored shell along with the server's cursor and backlog.
    ///
    /// # Errors
    /// Returns `IdAlreadyAssigned` if this session already has an id.
    pub fn adopt_restored(
        &mut self,
        id: ShellId,
        next_chunk_id: u64,
        backlog: &str,
    ) -> Result<(), SessionError> {
        self.assign_id(id)?;
        self.next_chunk_id = next_chunk_id;
        self.output.reset();
        self.output.push(backlog);
        Ok(())
    }

    /// Append a received chunk and advance the cursor.
    ///
    /// A cursor lower than the current one is ignored so the cursor never
    /// moves backwards.
    pub fn append_chunk(&mut self, chunk: &str, next_chunk_id: Option<u64>) {
        self.output.push(chunk);
        match next_chunk_id {
            Some(next) if next >= self.next_chunk_id => self.next_chunk_id = next,
            Some(next) => {
                tracing::warn!(
                    current = self.next_chunk_id,
                    received = next,
                    "Ignoring backwards chunk cursor"
                );
            }
            None => {}
        }
    }

    fn assign_id(&mut self, id: ShellId) -> Result<(), SessionError> {
        if let Some(existing) = &self.id {
            return Err(SessionError::IdAlreadyAssigned(existing.clone()));
        }
        self.id = Some(id);
        Ok(())
    }
}
