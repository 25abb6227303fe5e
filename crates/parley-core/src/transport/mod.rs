//! The transport contract.
//!
//! A [`Transport`] is the bridge to one chat platform. The engine only needs
//! two capabilities from it:
//!
//! - [`receive`](Transport::receive): the ordered batch of pending inbound
//!   messages, consumed once per listen cycle
//! - [`send`](Transport::send): fire-and-forget delivery of an outbound
//!   message to a session
//!
//! Wire formats, authentication and delivery guarantees belong to the
//! transport.

mod fake;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::message::{IncomingMessage, OutgoingMessage};
use crate::session::SessionKey;

pub use fake::{FakeTransport, SentMessage};

/// A chat platform adapter.
///
/// # Example Implementation
///
/// ```rust,ignore
/// struct ConsoleTransport;
///
/// #[async_trait]
/// impl Transport for ConsoleTransport {
///     fn name(&self) -> &str {
///         "console"
///     }
///
///     async fn receive(&self) -> TransportResult<Vec<IncomingMessage>> {
///         let line = read_line().await?;
///         Ok(vec![IncomingMessage::new(line, "me", "console")])
///     }
///
///     async fn send(&self, message: OutgoingMessage, _session: &SessionKey) -> TransportResult<()> {
///         println!("{}", message.text());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Returns a short name for logging.
    fn name(&self) -> &str;

    /// Returns the pending inbound messages, oldest first.
    ///
    /// An empty batch means nothing is pending.
    async fn receive(&self) -> TransportResult<Vec<IncomingMessage>>;

    /// Sends `message` to `session`.
    async fn send(&self, message: OutgoingMessage, session: &SessionKey) -> TransportResult<()>;
}

/// A shared transport trait object.
pub type BoxedTransport = Arc<dyn Transport>;

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn receive(&self) -> TransportResult<Vec<IncomingMessage>> {
        (**self).receive().await
    }

    async fn send(&self, message: OutgoingMessage, session: &SessionKey) -> TransportResult<()> {
        (**self).send(message, session).await
    }
}
