//! Cancellable handles for outstanding requests.

use std::future::Future;

use tokio::task::JoinHandle;

/// Which request loop a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Restore or register.
    Setup,
    /// Output long-poll.
    OutputPoll,
    /// Command submission.
    Command,
}

/// One spawned request. Cancelling stops the completion handler from
/// running; it does not stop work already underway on the server.
#[derive(Debug)]
pub struct RequestHandle {
    kind: RequestKind,
    task: JoinHandle<()>,
}

impl RequestHandle {
    /// Run `request` (request + completion handler) on its own task.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn<F>(kind: RequestKind, request: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            kind,
            task: tokio::spawn(request),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        self.kind
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Abort the request. No-op once it has finished.
    pub fn cancel(&self) {
        if !self.task.is_finished() {
            tracing::debug!(kind = ?self.kind, "Cancelling request");
            self.task.abort();
        }
    }
}

/// Snapshot of which requests are outstanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InFlight {
    pub setup: bool,
    pub output_poll: bool,
    pub command: bool,
}

/// One slot per request kind, so at most one of each is ever outstanding.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    setup: Option<RequestHandle>,
    output_poll: Option<RequestHandle>,
    command: Option<RequestHandle>,
}

impl PendingRequests {
    fn slot(&mut self, kind: RequestKind) -> &mut Option<RequestHandle> {
        match kind {
            RequestKind::Setup => &mut self.setup,
            RequestKind::OutputPoll => &mut self.output_poll,
            RequestKind::Command => &mut self.command,
        }
    }

    /// Track a new request, cancelling any stale one in the same slot.
    pub(crate) fn insert(&mut self, handle: RequestHandle) {
        if let Some(previous) = self.slot(handle.kind()).replace(handle) {
            previous.cancel();
        }
    }

    /// Forget the request of `kind`; called by its own completion handler.
    pub(crate) fn complete(&mut self, kind: RequestKind) {
        self.slot(kind).take();
    }

    pub(crate) fn cancel(&mut self, kind: RequestKind) {
        if let Some(handle) = self.slot(kind).take() {
            handle.cancel();
        }
    }

    /// Cancel everything outstanding. Returns how many requests were live.
    pub(crate) fn cancel_all(&mut self) -> usize {
        let mut live = 0;
        for kind in [RequestKind::Setup, RequestKind::OutputPoll, RequestKind::Command] {
            if let Some(handle) = self.slot(kind).take() {
                if !handle.is_finished() {
                    live += 1;
                }
                handle.cancel();
            }
        }
        live
    }

    pub(crate) fn in_flight(&self) -> InFlight {
        let live = |slot: &Option<RequestHandle>| slot.as_ref().is_some_and(|h| !h.is_finished());
        InFlight {
            setup: live(&self.setup),
            output_poll: live(&self.output_poll),
            command: live(&self.command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_all_aborts_pending_requests() {
        let mut pending = PendingRequests::default();
        pending.insert(RequestHandle::spawn(
            RequestKind::OutputPoll,
            futures::future::pending(),
        ));
        pending.insert(RequestHandle::spawn(RequestKind::Command, async {}));
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        let in_flight = pending.in_flight();
        assert!(in_flight.output_poll);
        assert!(!in_flight.command);

        assert_eq!(pending.cancel_all(), 1);
        assert_eq!(pending.in_flight(), InFlight::default());
        // Second pass has nothing left.
        assert_eq!(pending.cancel_all(), 0);
    }

    #[tokio::test]
    async fn test_complete_clears_slot() {
        let mut pending = PendingRequests::default();
        pending.insert(RequestHandle::spawn(
            RequestKind::Setup,
            futures::future::pending(),
        ));
        assert!(pending.in_flight().setup);
        pending.complete(RequestKind::Setup);
        assert!(!pending.in_flight().setup);
    }
}
