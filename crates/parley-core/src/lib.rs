//! # Parley Core
//!
//! The foundation layer of the Parley conversation engine.
//!
//! This crate holds the platform-agnostic building blocks shared by every
//! other layer:
//!
//! - **Message model**: inbound [`IncomingMessage`]s with their optional
//!   attachments, outbound [`OutgoingMessage`]s and [`Question`]s
//! - **Answer classification**: [`classify`] and [`Answer`], which report the
//!   [`Category`]s a message satisfies together with the payload of each
//! - **Sessions**: the [`SessionKey`] identifying one (sender, channel) pair
//! - **Transport contract**: the [`Transport`] trait every chat platform
//!   adapter implements, plus the in-memory [`FakeTransport`]
//!
//! ```text
//! ┌─────────────┐ receive ┌────────────┐  classify  ┌──────────┐
//! │  Transport  │────────▶│ Dispatcher │───────────▶│  Answer  │
//! │  (adapter)  │◀────────│            │            └──────────┘
//! └─────────────┘  send   └────────────┘
//! ```

pub mod classifier;
pub mod error;
pub mod message;
pub mod params;
pub mod session;
pub mod transport;

pub use classifier::{Answer, Categories, Category, Payload, classify};
pub use error::{TransportError, TransportResult};
pub use message::{Attachment, Button, IncomingMessage, Location, OutgoingMessage, Question};
pub use params::Params;
pub use session::SessionKey;
pub use transport::{BoxedTransport, FakeTransport, SentMessage, Transport};

/// Prelude for common imports.
pub mod prelude {
    pub use super::classifier::{Answer, Category, Payload};
    pub use super::message::{IncomingMessage, Location, OutgoingMessage, Question};
    pub use super::params::Params;
    pub use super::session::SessionKey;
    pub use super::transport::Transport;
}
