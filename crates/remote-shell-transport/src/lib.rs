//! Wire protocol and HTTP transport for remote shell sessions.
//!
//! Provides:
//! - Endpoint table and JSON response types
//! - `ShellTransport` - one async request per endpoint
//! - `HttpTransport` - reqwest implementation
//! - `ClientConfig` - server location and client settings

pub mod channel;
pub mod config;
pub mod http;
pub mod protocol;

pub use channel::{ShellTransport, TransportError};
pub use config::{ClientConfig, ConfigError};
pub use http::HttpTransport;
pub use protocol::{CommandResponse, CreateResponse, Endpoint, OutputResponse, RestoreResponse};
