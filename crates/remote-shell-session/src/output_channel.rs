//! Perpetual output polling.
//!
//! Exactly one `/shell/retrieve_output` request is kept open while the
//! session is active, so the server always has a channel to push output
//! through. Each response is applied to the session here and answered with
//! a [`PollDirective`]; the manager turns `Rearm` into a freshly spawned
//! request rather than re-entering the completed one.

use std::time::Duration;

use remote_shell_core::{Session, SessionFault};
use remote_shell_transport::{OutputResponse, TransportError};

/// What the manager should do after an output response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDirective {
    /// Issue the next poll after `delay`.
    Rearm { delay: Duration },
    /// The process exited but the server still holds output: close input
    /// and keep polling.
    Drain,
    /// The process exited and everything was read.
    Exited,
    /// The shell is gone; stop polling and report.
    Terminate(SessionFault),
}

/// Applies output responses to the session's buffer and cursor.
#[derive(Debug, Clone)]
pub struct OutputChannel {
    retry_delay: Duration,
    draining: bool,
}

impl OutputChannel {
    #[must_use]
    pub const fn new(retry_delay: Duration) -> Self {
        Self {
            retry_delay,
            draining: false,
        }
    }

    /// Whether the process already exited and remaining output is being read.
    #[must_use]
    pub const fn is_draining(&self) -> bool {
        self.draining
    }

    /// Apply one successful response.
    pub fn handle_response(
        &mut self,
        session: &mut Session,
        response: &OutputResponse,
    ) -> PollDirective {
        if response.alive || response.exited {
            session.append_chunk(response.chunk(), response.next_chunk_id);
            tracing::trace!(
                bytes = response.chunk().len(),
                next_chunk_id = session.next_chunk_id(),
                "Output chunk received"
            );

            if response.exited {
                if response.more_output_available {
                    self.draining = true;
                    return PollDirective::Drain;
                }
                self.draining = false;
                return PollDirective::Exited;
            }
            return PollDirective::Rearm {
                delay: Duration::ZERO,
            };
        }

        if response.periodic_response {
            return PollDirective::Rearm {
                delay: Duration::ZERO,
            };
        }

        PollDirective::Terminate(response.fault().unwrap_or(SessionFault::UnexpectedResponse {
            endpoint: "/shell/retrieve_output",
        }))
    }

    /// A poll that never completed is retried; the shell may outlive a
    /// flaky connection.
    pub fn handle_failure(&self, err: &TransportError) -> PollDirective {
        tracing::warn!(
            retry_in_ms = u64::try_from(self.retry_delay.as_millis()).unwrap_or(u64::MAX),
            "Output poll failed, retrying: {err}"
        );
        PollDirective::Rearm {
            delay: self.retry_delay,
        }
    }
}
