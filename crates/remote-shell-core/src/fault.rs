//! User-facing failure causes.

use thiserror::Error;

/// Failure family, used to decide how a host presents a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCategory {
    /// Server-side limits; the user can act on them.
    Capacity,
    /// The user is not logged in.
    Authentication,
    /// The shell is gone.
    Lifecycle,
    /// The server could not create a shell.
    Creation,
    /// A request never completed.
    Transport,
    /// The server answered with something the client does not understand.
    Protocol,
}

/// A failure the user is told about. The display text is the alert message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionFault {
    #[error(
        "You already have the maximum number of shells open. Please close one to open a new shell."
    )]
    ShellLimitReached,
    /// Signed out while a shell was being created.
    #[error("You are not logged in. Please reload your browser window and log in.")]
    NotLoggedInOnCreate,
    /// Signed out while the shell was in use.
    #[error("You are not logged in. Please log in to use this app.")]
    NotLoggedIn,
    #[error("Could not create any more shells. Please try again soon.")]
    ShellCreateFailed,
    #[error("The server refused to create a shell.")]
    CreateRejected,
    /// Reported by an output poll.
    #[error("The shell no longer exists. Please restart this app.")]
    NoShellExists,
    /// Reported when a command was sent.
    #[error("This shell does not exist any more. Please restart this app.")]
    ShellMissing,
    #[error("This shell has been killed. Please restart this app.")]
    ShellKilled,
    #[error(
        "You have entered too many commands. Please try again. If this problem persists, please restart this app."
    )]
    BufferExceeded,
    #[error("Error communicating with server. Is the shell server running? ({detail})")]
    ServerUnreachable { detail: String },
    #[error("The command could not be delivered to the shell server: {detail}")]
    CommandUndelivered { detail: String },
    #[error("Unexpected response from {endpoint}.")]
    UnexpectedResponse { endpoint: &'static str },
}

impl SessionFault {
    #[must_use]
    pub const fn category(&self) -> FaultCategory {
        match self {
            Self::ShellLimitReached | Self::BufferExceeded => FaultCategory::Capacity,
            Self::NotLoggedIn | Self::NotLoggedInOnCreate => FaultCategory::Authentication,
            Self::NoShellExists | Self::ShellMissing | Self::ShellKilled => {
                FaultCategory::Lifecycle
            }
            Self::ShellCreateFailed | Self::CreateRejected => FaultCategory::Creation,
            Self::ServerUnreachable { .. } | Self::CommandUndelivered { .. } => {
                FaultCategory::Transport
            }
            Self::UnexpectedResponse { .. } => FaultCategory::Protocol,
        }
    }

    /// Whether this fault means the remote shell is no longer usable.
    #[must_use]
    pub const fn ends_shell(&self) -> bool {
        matches!(
            self,
            Self::NoShellExists | Self::ShellMissing | Self::ShellKilled | Self::NotLoggedIn
        )
    }
}
