//! Session protocol state machine for remote shell clients.
//!
//! Provides:
//! - `SessionManager` - Register or restore a shell, poll output, relay commands, tear down
//! - `OutputChannel` / `CommandChannel` - Response handling for the two request loops
//! - Shell id stores (memory, file) for reattaching after a client restart

pub mod command_channel;
pub mod config;
pub mod manager;
pub mod output_channel;
pub mod requests;
pub mod storage;

pub use command_channel::{CommandChannel, SubmitError};
pub use config::SessionConfig;
pub use manager::SessionManager;
pub use output_channel::{OutputChannel, PollDirective};
pub use requests::{InFlight, RequestKind};
pub use storage::{MemoryShellIdStore, ShellIdStore, StoreError};

#[cfg(feature = "file-store")]
pub use storage::FileShellIdStore;
