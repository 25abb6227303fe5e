//! Message types for the Parley engine.
//!
//! # Inbound
//!
//! An [`IncomingMessage`] is one inbound event from a transport: who sent it,
//! in which channel, its raw text and any attachments. Attachment presence
//! is independent of text presence, so an image with a caption carries both.
//!
//! # Outbound
//!
//! An [`OutgoingMessage`] is text plus an optional [`Attachment`] and
//! suggested-reply [`Button`]s. A [`Question`] is the payload of an `ask`
//! step and converts into an outgoing message when it is emitted.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::session::SessionKey;

// ============================================================================
// Location
// ============================================================================

/// Geographic coordinates attached to a message.
///
/// Displays as `latitude:longitude`, e.g. `41.123:-12.123`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

impl Location {
    /// Creates a new location.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.latitude, self.longitude)
    }
}

// ============================================================================
// IncomingMessage
// ============================================================================

/// A single inbound message delivered by a transport.
///
/// Built once per inbound event with the `with_*` builder methods and never
/// mutated afterwards.
///
/// ```rust
/// use parley_core::IncomingMessage;
///
/// let msg = IncomingMessage::new("", "helloman", "#helloworld")
///     .with_images(["http://foo.com/bar.png"]);
/// assert!(msg.text().is_empty());
/// assert_eq!(msg.images().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IncomingMessage {
    sender: String,
    channel: String,
    text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    videos: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    audio: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<Location>,
    /// Value of a pressed suggested-reply button, if the transport reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_value: Option<String>,
}

impl IncomingMessage {
    /// Creates a text message from `sender` in `channel`.
    pub fn new(
        text: impl Into<String>,
        sender: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            channel: channel.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// Attaches image URLs.
    pub fn with_images<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.images = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Attaches video URLs.
    pub fn with_videos<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.videos = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Attaches audio URLs.
    pub fn with_audio<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audio = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Attaches a location.
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Records the value of a pressed suggested-reply button.
    pub fn with_reply_value(mut self, value: impl Into<String>) -> Self {
        self.reply_value = Some(value.into());
        self
    }

    /// Returns the sender identifier.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Returns the channel identifier.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns the raw text, which may be empty.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the attached image URLs.
    pub fn images(&self) -> &[String] {
        &self.images
    }

    /// Returns the attached video URLs.
    pub fn videos(&self) -> &[String] {
        &self.videos
    }

    /// Returns the attached audio URLs.
    pub fn audio(&self) -> &[String] {
        &self.audio
    }

    /// Returns the attached location, if any.
    pub fn location(&self) -> Option<Location> {
        self.location
    }

    /// Returns the suggested-reply value, if any.
    pub fn reply_value(&self) -> Option<&str> {
        self.reply_value.as_deref()
    }

    /// Returns the session this message belongs to.
    pub fn session(&self) -> SessionKey {
        SessionKey::new(&self.sender, &self.channel)
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// A media attachment on an outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Attachment {
    /// An image, by URL.
    Image(String),
    /// A video, by URL.
    Video(String),
    /// An audio clip, by URL.
    Audio(String),
    /// A generic file, by URL.
    File(String),
    /// A location pin.
    Location(Location),
}

/// A suggested reply offered alongside a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    /// Label shown to the user.
    pub text: String,
    /// Value reported back when the button is pressed.
    pub value: String,
}

impl Button {
    /// Creates a button whose value equals its label.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            value: text.clone(),
            text,
        }
    }

    /// Overrides the reported value.
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }
}

/// The payload of an `ask` step: question text plus suggested replies.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Question {
    text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    buttons: Vec<Button>,
}

impl Question {
    /// Creates a question with the given text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    /// Adds a suggested reply.
    pub fn button(mut self, button: Button) -> Self {
        self.buttons.push(button);
        self
    }

    /// Returns the question text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the suggested replies.
    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }

    /// Returns a copy with different text and the same buttons.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: self.buttons.clone(),
        }
    }
}

impl From<&str> for Question {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Question {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// A message sent back through the transport.
///
/// Always scoped to the session of the inbound message that triggered it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutgoingMessage {
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attachment: Option<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    buttons: Vec<Button>,
}

impl OutgoingMessage {
    /// Creates a plain text message.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Adds an attachment.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Returns the message text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the attachment, if any.
    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Returns the suggested replies.
    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }
}

impl From<&str> for OutgoingMessage {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for OutgoingMessage {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<Question> for OutgoingMessage {
    fn from(question: Question) -> Self {
        Self {
            text: question.text,
            attachment: None,
            buttons: question.buttons,
        }
    }
}

impl From<&Question> for OutgoingMessage {
    fn from(question: &Question) -> Self {
        Self::from(question.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_display_uses_colon() {
        let loc = Location::new(41.123, -12.123);
        assert_eq!(loc.to_string(), "41.123:-12.123");
    }

    #[test]
    fn question_keeps_buttons_when_converted() {
        let q = Question::new("Pick one")
            .button(Button::new("Yes"))
            .button(Button::new("No").value("no"));
        let out = OutgoingMessage::from(&q);

        assert_eq!(out.text(), "Pick one");
        assert_eq!(out.buttons().len(), 2);
        assert_eq!(out.buttons()[1].value, "no");
    }

    #[test]
    fn with_text_preserves_buttons() {
        let q = Question::new("A").button(Button::new("x"));
        let q2 = q.with_text("B");
        assert_eq!(q2.text(), "B");
        assert_eq!(q2.buttons(), q.buttons());
    }

    #[test]
    fn incoming_message_session() {
        let msg = IncomingMessage::new("hi", "alice", "#general");
        let session = msg.session();
        assert_eq!(session.sender(), "alice");
        assert_eq!(session.channel(), "#general");
    }

    #[test]
    fn incoming_message_deserializes_without_attachments() {
        let msg: IncomingMessage =
            serde_json::from_str(r##"{"sender":"a","channel":"#c","text":"hey"}"##).unwrap();
        assert_eq!(msg.text(), "hey");
        assert!(msg.images().is_empty());
        assert!(msg.location().is_none());
    }
}
