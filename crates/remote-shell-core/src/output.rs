//! Append-only output buffer with history + live broadcast.

use std::sync::{PoisonError, RwLock};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Capacity of the live channel. Receivers that fall further behind lose
/// fragments from their live stream; the history is unaffected.
const LIVE_CAPACITY: usize = 1024;

/// Change to the buffer, as seen by live subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// A fragment was appended.
    Chunk(String),
    /// The buffer was emptied for a fresh shell.
    Reset,
}

#[derive(Default)]
struct Inner {
    fragments: Vec<String>,
    total_bytes: usize,
}

/// Ordered sequence of output fragments, concatenated in arrival order.
///
/// Renderers attached late receive the history first and then switch to
/// live updates without a gap.
pub struct OutputBuffer {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<OutputEvent>,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.read();
        f.debug_struct("OutputBuffer")
            .field("fragments", &inner.fragments.len())
            .field("total_bytes", &inner.total_bytes)
            .finish_non_exhaustive()
    }
}

impl OutputBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            sender,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a fragment. Empty fragments are not recorded.
    pub fn push(&self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        let mut inner = self.write();
        inner.fragments.push(fragment.to_owned());
        inner.total_bytes = inner.total_bytes.saturating_add(fragment.len());
        // Sent under the write lock so history snapshots and live order agree.
        let _ = self.sender.send(OutputEvent::Chunk(fragment.to_owned()));
    }

    /// Drop all fragments.
    pub fn reset(&self) {
        let mut inner = self.write();
        if inner.fragments.is_empty() {
            return;
        }
        inner.fragments.clear();
        inner.total_bytes = 0;
        let _ = self.sender.send(OutputEvent::Reset);
    }

    /// All fragments concatenated.
    #[must_use]
    pub fn contents(&self) -> String {
        self.read().fragments.concat()
    }

    /// Snapshot of the individual fragments.
    #[must_use]
    pub fn fragments(&self) -> Vec<String> {
        self.read().fragments.clone()
    }

    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.read().total_bytes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().fragments.is_empty()
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OutputEvent> {
        self.sender.subscribe()
    }

    /// Stream that yields the buffered fragments first, then live updates.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, OutputEvent> {
        let (history, rx) = {
            let inner = self.read();
            (inner.fragments.clone(), self.sender.subscribe())
        };

        let hist = futures::stream::iter(history.into_iter().map(OutputEvent::Chunk));
        let live = BroadcastStream::new(rx).filter_map(|res| async move {
            match res {
                Ok(event) => Some(event),
                Err(lagged) => {
                    tracing::warn!("Output subscriber fell behind: {lagged}");
                    None
                }
            }
        });

        Box::pin(hist.chain(live))
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_pending, assert_ready_eq, task};

    use super::*;

    #[test]
    fn test_contents_preserve_arrival_order() {
        let buffer = OutputBuffer::new();
        buffer.push("hello");
        buffer.push("");
        buffer.push(" world");
        assert_eq!(buffer.contents(), "hello world");
        assert_eq!(buffer.fragments().len(), 2);
        assert_eq!(buffer.total_bytes(), 11);
    }

    #[test]
    fn test_reset_empties_buffer() {
        let buffer = OutputBuffer::new();
        buffer.push("stale");
        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_bytes(), 0);
    }

    #[test]
    fn test_history_then_live() {
        let buffer = OutputBuffer::new();
        buffer.push("one");

        let mut stream = task::spawn(buffer.history_plus_stream());
        assert_ready_eq!(
            stream.poll_next(),
            Some(OutputEvent::Chunk("one".into()))
        );
        assert_pending!(stream.poll_next());

        buffer.push("two");
        buffer.reset();
        assert!(stream.is_woken());
        assert_ready_eq!(
            stream.poll_next(),
            Some(OutputEvent::Chunk("two".into()))
        );
        assert_ready_eq!(
            stream.poll_next(),
            Some(OutputEvent::Reset)
        );
    }
}
