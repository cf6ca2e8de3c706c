//! HTTP transport backed by reqwest.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use remote_shell_core::ShellId;
use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::{
    channel::{ShellTransport, TransportError},
    config::ClientConfig,
    protocol::{
        self, CommandResponse, CreateResponse, Endpoint, OutputResponse, RestoreResponse,
    },
};

/// `ShellTransport` that posts form-encoded requests to the shell server.
#[derive(Clone)]
pub struct HttpTransport {
    base_url: Url,
    client: reqwest::Client,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Build a transport from config.
    ///
    /// # Errors
    /// Returns error if the base URL is invalid or the client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut config = config.clone();
        config
            .validate()
            .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        let base_url =
            Url::parse(&config.base_url).map_err(|err| TransportError::InvalidUrl(err.to_string()))?;

        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|err| {
            TransportError::Unavailable(format!("failed to initialize HTTP client: {err}"))
        })?;

        Ok(Self { base_url, client })
    }

    /// Share an existing reqwest client (cookie store, proxies, TLS roots).
    ///
    /// # Errors
    /// Returns error if the base URL is invalid.
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Result<Self, TransportError> {
        let mut config = ClientConfig::with_base_url(base_url);
        config
            .validate()
            .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        let base_url =
            Url::parse(&config.base_url).map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        Ok(Self { base_url, client })
    }

    fn url(&self, endpoint: Endpoint) -> Result<Url, TransportError> {
        self.base_url
            .join(endpoint.path())
            .map_err(|err| TransportError::InvalidUrl(err.to_string()))
    }

    async fn send(
        &self,
        endpoint: Endpoint,
        form: &[(&'static str, String)],
    ) -> Result<String, TransportError> {
        let response = self
            .client
            .post(self.url(endpoint)?)
            .form(form)
            .send()
            .await
            .map_err(|source| TransportError::Request { endpoint, source })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| TransportError::Request { endpoint, source })?;

        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint,
                status: status.as_u16(),
                body: truncate_for_error(&body),
            });
        }
        Ok(body)
    }

    async fn post<R: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        form: &[(&'static str, String)],
    ) -> Result<R, TransportError> {
        let body = self.send(endpoint, form).await?;
        serde_json::from_str(&body).map_err(|source| TransportError::Decode { endpoint, source })
    }
}

#[async_trait]
impl ShellTransport for HttpTransport {
    async fn create(&self) -> Result<CreateResponse, TransportError> {
        self.post(Endpoint::Create, &[]).await
    }

    async fn restore(&self, shell_id: &ShellId) -> Result<RestoreResponse, TransportError> {
        self.post(Endpoint::RestoreShell, &protocol::shell_form(shell_id))
            .await
    }

    async fn retrieve_output(
        &self,
        shell_id: &ShellId,
        next_chunk_id: u64,
    ) -> Result<OutputResponse, TransportError> {
        self.post(
            Endpoint::RetrieveOutput,
            &protocol::retrieve_output_form(shell_id, next_chunk_id),
        )
        .await
    }

    async fn process_command(
        &self,
        shell_id: &ShellId,
        line: &str,
    ) -> Result<CommandResponse, TransportError> {
        self.post(
            Endpoint::ProcessCommand,
            &protocol::process_command_form(shell_id, line),
        )
        .await
    }

    async fn kill(&self, shell_id: &ShellId) -> Result<(), TransportError> {
        self.send(Endpoint::KillShell, &protocol::shell_form(shell_id))
            .await
            .map(drop)
    }
}

fn truncate_for_error(body: &str) -> String {
    const MAX_LEN: usize = 200;
    if body.chars().count() <= MAX_LEN {
        body.to_owned()
    } else {
        format!("{}...", body.chars().take(MAX_LEN).collect::<String>())
    }
}
