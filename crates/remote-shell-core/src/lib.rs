//! Core session model for remote shell clients.
//!
//! This crate provides the fundamental building blocks:
//! - `Session` - Shell identity, lifecycle state and chunk cursor
//! - `OutputBuffer` - Append-only output with history + live broadcast
//! - `SessionFault` - User-facing failure causes
//! - Host surface traits (`InputGate`, `ErrorSignal`)

pub mod fault;
pub mod host;
pub mod output;
pub mod session;

pub use fault::{FaultCategory, SessionFault};
pub use host::{ErrorSignal, HostSurface, InputGate, LogErrorSignal};
pub use output::{OutputBuffer, OutputEvent};
pub use session::{Session, SessionError, SessionState, ShellId};
