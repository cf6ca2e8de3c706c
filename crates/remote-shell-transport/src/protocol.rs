//! Wire protocol for the shell server endpoints.
//!
//! Requests are form-encoded; responses are JSON objects whose failure
//! causes are mutually exclusive boolean flags.

use remote_shell_core::{SessionFault, ShellId};
use serde::{Deserialize, Serialize};

/// Shell server endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Create,
    RestoreShell,
    RetrieveOutput,
    ProcessCommand,
    KillShell,
}

impl Endpoint {
    /// Path relative to the server base URL.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Create => "shell/create",
            Self::RestoreShell => "shell/restore_shell",
            Self::RetrieveOutput => "shell/retrieve_output",
            Self::ProcessCommand => "shell/process_command",
            Self::KillShell => "shell/kill_shell",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.path())
    }
}

/// Build the form body `shellId=<id>`.
#[must_use]
pub fn shell_form(shell_id: &ShellId) -> Vec<(&'static str, String)> {
    vec![("shellId", shell_id.to_string())]
}

/// Build the form body for `/shell/retrieve_output`.
#[must_use]
pub fn retrieve_output_form(shell_id: &ShellId, next_chunk_id: u64) -> Vec<(&'static str, String)> {
    vec![
        ("shellId", shell_id.to_string()),
        ("nextChunkId", next_chunk_id.to_string()),
    ]
}

/// Build the form body for `/shell/process_command`.
#[must_use]
pub fn process_command_form(shell_id: &ShellId, line: &str) -> Vec<(&'static str, String)> {
    vec![
        ("lineToSend", line.to_owned()),
        ("shellId", shell_id.to_string()),
    ]
}

/// Response of `/shell/create`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateResponse {
    pub success: bool,
    pub shell_id: Option<ShellId>,
    pub shell_limit_reached: bool,
    pub not_logged_in: bool,
    pub shell_create_failed: bool,
}

impl CreateResponse {
    /// The issued shell id, or the fault explaining why there is none.
    ///
    /// # Errors
    /// Returns the highest-precedence failure cause.
    pub fn into_shell_id(self) -> Result<ShellId, SessionFault> {
        if self.success {
            return self.shell_id.ok_or(SessionFault::UnexpectedResponse {
                endpoint: "/shell/create",
            });
        }
        Err(if self.shell_limit_reached {
            SessionFault::ShellLimitReached
        } else if self.not_logged_in {
            SessionFault::NotLoggedInOnCreate
        } else if self.shell_create_failed {
            SessionFault::ShellCreateFailed
        } else {
            SessionFault::CreateRejected
        })
    }
}

/// Response of `/shell/restore_shell`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RestoreResponse {
    pub success: bool,
    pub next_chunk_id: u64,
    pub output: Option<String>,
}

impl RestoreResponse {
    /// Output produced before the client reattached.
    #[must_use]
    pub fn backlog(&self) -> &str {
        self.output.as_deref().unwrap_or_default()
    }
}

/// Response of `/shell/retrieve_output`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutputResponse {
    pub alive: bool,
    pub exited: bool,
    pub output: Option<String>,
    pub next_chunk_id: Option<u64>,
    pub more_output_available: bool,
    pub periodic_response: bool,
    pub no_shell_exists: bool,
    pub not_logged_in: bool,
    pub shell_killed: bool,
}

impl OutputResponse {
    /// Output chunk carried by this response (possibly empty).
    #[must_use]
    pub fn chunk(&self) -> &str {
        self.output.as_deref().unwrap_or_default()
    }

    /// Termination cause, in precedence order.
    #[must_use]
    pub const fn fault(&self) -> Option<SessionFault> {
        if self.no_shell_exists {
            Some(SessionFault::NoShellExists)
        } else if self.not_logged_in {
            Some(SessionFault::NotLoggedIn)
        } else if self.shell_killed {
            Some(SessionFault::ShellKilled)
        } else {
            None
        }
    }
}

/// Response of `/shell/process_command`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    pub no_shell_exists: bool,
    pub not_logged_in: bool,
    pub shell_killed: bool,
    pub buffer_exceeded: bool,
}

impl CommandResponse {
    /// Rejection cause, in precedence order. `None` when the command was accepted.
    #[must_use]
    pub const fn fault(&self) -> Option<SessionFault> {
        if self.success {
            None
        } else if self.no_shell_exists {
            Some(SessionFault::ShellMissing)
        } else if self.not_logged_in {
            Some(SessionFault::NotLoggedIn)
        } else if self.shell_killed {
            Some(SessionFault::ShellKilled)
        } else if self.buffer_exceeded {
            Some(SessionFault::BufferExceeded)
        } else {
            Some(SessionFault::UnexpectedResponse {
                endpoint: "/shell/process_command",
            })
        }
    }
}
