//! In-memory transport for tests and demos.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use super::Transport;
use crate::error::{TransportError, TransportResult};
use crate::message::{IncomingMessage, OutgoingMessage};
use crate::session::SessionKey;

/// An outbound message recorded by [`FakeTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    /// The session the message was addressed to.
    pub session: SessionKey,
    /// The message itself.
    pub message: OutgoingMessage,
}

/// A transport that serves queued inbound batches and records every send.
///
/// Each call to [`receive`](Transport::receive) pops one queued batch, or
/// returns an empty batch when the queue is drained.
///
/// ```rust
/// use parley_core::{FakeTransport, IncomingMessage};
///
/// let transport = FakeTransport::new();
/// transport.push(IncomingMessage::new("Hello", "helloman", "#helloworld"));
/// assert_eq!(transport.pending_batches(), 1);
/// ```
#[derive(Debug, Default)]
pub struct FakeTransport {
    inbound: Mutex<VecDeque<Vec<IncomingMessage>>>,
    sent: Mutex<Vec<SentMessage>>,
    fail_sends: AtomicBool,
}

impl FakeTransport {
    /// Creates an empty fake transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a batch of inbound messages.
    pub fn push_batch(&self, batch: impl IntoIterator<Item = IncomingMessage>) {
        self.inbound.lock().push_back(batch.into_iter().collect());
    }

    /// Queues a single-message batch.
    pub fn push(&self, message: IncomingMessage) {
        self.push_batch([message]);
    }

    /// Returns the number of queued batches.
    pub fn pending_batches(&self) -> usize {
        self.inbound.lock().len()
    }

    /// Makes every subsequent send fail (or succeed again).
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Returns all recorded outbound messages.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Returns the text of all recorded outbound messages.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|s| s.message.text().to_string())
            .collect()
    }

    /// Returns the text of the most recent outbound message.
    pub fn last_text(&self) -> Option<String> {
        self.sent
            .lock()
            .last()
            .map(|s| s.message.text().to_string())
    }

    /// Forgets all recorded outbound messages.
    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn name(&self) -> &str {
        "fake"
    }

    async fn receive(&self) -> TransportResult<Vec<IncomingMessage>> {
        Ok(self.inbound.lock().pop_front().unwrap_or_default())
    }

    async fn send(&self, message: OutgoingMessage, session: &SessionKey) -> TransportResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed(format!(
                "fake transport refused message for {session}"
            )));
        }
        trace!(session = %session, text = message.text(), "Recorded outbound message");
        self.sent.lock().push(SentMessage {
            session: session.clone(),
            message,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receive_pops_batches_in_order() {
        let transport = FakeTransport::new();
        transport.push(IncomingMessage::new("one", "a", "c"));
        transport.push_batch([
            IncomingMessage::new("two", "a", "c"),
            IncomingMessage::new("three", "b", "c"),
        ]);

        assert_eq!(transport.receive().await.unwrap().len(), 1);
        let second = transport.receive().await.unwrap();
        assert_eq!(second[1].text(), "three");
        assert!(transport.receive().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_sends_are_not_recorded() {
        let transport = FakeTransport::new();
        let session = SessionKey::new("a", "c");
        transport.fail_sends(true);

        let result = transport.send("hi".into(), &session).await;
        assert!(matches!(result, Err(TransportError::SendFailed(_))));
        assert!(transport.sent().is_empty());

        transport.fail_sends(false);
        transport.send("hi".into(), &session).await.unwrap();
        assert_eq!(transport.sent_texts(), vec!["hi".to_string()]);
    }
}
