//! Session identity.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The (sender, channel) pair identifying one ongoing interaction.
///
/// Both identifiers are opaque strings owned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    sender: String,
    channel: String,
}

impl SessionKey {
    /// Creates a session key.
    pub fn new(sender: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            channel: channel.into(),
        }
    }

    /// Returns the sender identifier.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Returns the channel identifier.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.sender, self.channel)
    }
}
