//! Capabilities the hosting UI surface provides to a session.

use std::sync::Arc;

use crate::SessionFault;

/// Enables and disables the command input of the hosting surface.
pub trait InputGate: Send + Sync {
    /// Enable or disable command entry.
    fn set_enabled(&self, enabled: bool);

    /// Clear the submitted text after a command was accepted.
    fn clear(&self) {}
}

/// Surfaces user-visible alerts.
pub trait ErrorSignal: Send + Sync {
    /// Report a fault to the user.
    fn report(&self, fault: &SessionFault);
}

/// `ErrorSignal` that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSignal;

impl ErrorSignal for LogErrorSignal {
    fn report(&self, fault: &SessionFault) {
        tracing::error!(category = ?fault.category(), "{fault}");
    }
}

struct IgnoreInput;

impl InputGate for IgnoreInput {
    fn set_enabled(&self, _enabled: bool) {}
}

/// The hosting surface a session is attached to.
#[derive(Clone)]
pub struct HostSurface {
    input: Arc<dyn InputGate>,
    errors: Arc<dyn ErrorSignal>,
}

impl std::fmt::Debug for HostSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSurface").finish_non_exhaustive()
    }
}

impl Default for HostSurface {
    fn default() -> Self {
        Self::headless()
    }
}

impl HostSurface {
    /// Attach an input gate and an error signal.
    #[must_use]
    pub fn attach(input: Arc<dyn InputGate>, errors: Arc<dyn ErrorSignal>) -> Self {
        Self { input, errors }
    }

    /// Surface without input widget; faults are only logged.
    #[must_use]
    pub fn headless() -> Self {
        Self {
            input: Arc::new(IgnoreInput),
            errors: Arc::new(LogErrorSignal),
        }
    }

    pub fn set_input_enabled(&self, enabled: bool) {
        self.input.set_enabled(enabled);
    }

    pub fn clear_input(&self) {
        self.input.clear();
    }

    pub fn report(&self, fault: &SessionFault) {
        self.errors.report(fault);
    }
}
