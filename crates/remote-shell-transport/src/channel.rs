//! Request channel abstraction over the shell server.

use std::sync::Arc;

use async_trait::async_trait;
use remote_shell_core::ShellId;
use thiserror::Error;

use crate::protocol::{CommandResponse, CreateResponse, Endpoint, OutputResponse, RestoreResponse};

/// A request that could not complete.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request to {endpoint} failed: {source}")]
    Request {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: Endpoint,
        status: u16,
        body: String,
    },
    #[error("Failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: Endpoint,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
    #[error("Shell server unavailable: {0}")]
    Unavailable(String),
}

/// One request per endpoint; `Err` means the request did not complete.
///
/// Implementations must be usable from spawned tasks. Dropping an
/// in-flight future abandons the request.
#[async_trait]
pub trait ShellTransport: Send + Sync + 'static {
    /// Ask the server for a new shell.
    async fn create(&self) -> Result<CreateResponse, TransportError>;

    /// Reattach to an existing shell.
    async fn restore(&self, shell_id: &ShellId) -> Result<RestoreResponse, TransportError>;

    /// Long-poll for output starting at `next_chunk_id`.
    async fn retrieve_output(
        &self,
        shell_id: &ShellId,
        next_chunk_id: u64,
    ) -> Result<OutputResponse, TransportError>;

    /// Send one command line to the shell.
    async fn process_command(
        &self,
        shell_id: &ShellId,
        line: &str,
    ) -> Result<CommandResponse, TransportError>;

    /// Tell the server to kill the shell. The response body is ignored.
    async fn kill(&self, shell_id: &ShellId) -> Result<(), TransportError>;
}

#[async_trait]
impl<T> ShellTransport for Arc<T>
where
    T: ShellTransport + ?Sized,
{
    async fn create(&self) -> Result<CreateResponse, TransportError> {
        (**self).create().await
    }

    async fn restore(&self, shell_id: &ShellId) -> Result<RestoreResponse, TransportError> {
        (**self).restore(shell_id).await
    }

    async fn retrieve_output(
        &self,
        shell_id: &ShellId,
        next_chunk_id: u64,
    ) -> Result<OutputResponse, TransportError> {
        (**self).retrieve_output(shell_id, next_chunk_id).await
    }

    async fn process_command(
        &self,
        shell_id: &ShellId,
        line: &str,
    ) -> Result<CommandResponse, TransportError> {
        (**self).process_command(shell_id, line).await
    }

    async fn kill(&self, shell_id: &ShellId) -> Result<(), TransportError> {
        (**self).kill(shell_id).await
    }
}
