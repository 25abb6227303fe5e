//! Answer classification.
//!
//! [`classify`] inspects one [`IncomingMessage`] and reports which content
//! [`Category`]s it satisfies. Membership for each attachment category only
//! depends on that attachment being present; `text` only depends on the raw
//! text being non-empty. A captioned image therefore satisfies both `text`
//! and `image`.
//!
//! [`Answer`] bundles a message with its classification and exposes the
//! payload for each satisfied category.

use std::fmt::{self, Display};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::message::{IncomingMessage, Location};
use crate::params::Params;

// ============================================================================
// Category
// ============================================================================

/// A content category an answer may satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Non-empty text.
    Text,
    /// At least one image attachment.
    Image,
    /// At least one video attachment.
    Video,
    /// At least one audio attachment.
    Audio,
    /// A location attachment.
    Location,
}

impl Category {
    /// All categories in a fixed order.
    pub const ALL: [Category; 5] = [
        Category::Text,
        Category::Image,
        Category::Video,
        Category::Audio,
        Category::Location,
    ];

    /// Returns the lowercase name of this category.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Location => "location",
        }
    }

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of [`Category`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Categories(u8);

impl Categories {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Adds a category.
    pub fn insert(&mut self, category: Category) {
        self.0 |= category.bit();
    }

    /// Returns `true` if `category` is in the set.
    pub fn contains(self, category: Category) -> bool {
        self.0 & category.bit() != 0
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the number of categories in the set.
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates over the contained categories in [`Category::ALL`] order.
    pub fn iter(self) -> impl Iterator<Item = Category> {
        Category::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl FromIterator<Category> for Categories {
    fn from_iter<T: IntoIterator<Item = Category>>(iter: T) -> Self {
        let mut set = Self::EMPTY;
        for category in iter {
            set.insert(category);
        }
        set
    }
}

/// Reports the categories satisfied by `message`.
///
/// A pressed suggested-reply button counts as text even when the raw text
/// is empty.
pub fn classify(message: &IncomingMessage) -> Categories {
    let mut categories = Categories::EMPTY;
    if !message.text().is_empty() || message.reply_value().is_some_and(|v| !v.is_empty()) {
        categories.insert(Category::Text);
    }
    if !message.images().is_empty() {
        categories.insert(Category::Image);
    }
    if !message.videos().is_empty() {
        categories.insert(Category::Video);
    }
    if !message.audio().is_empty() {
        categories.insert(Category::Audio);
    }
    if message.location().is_some() {
        categories.insert(Category::Location);
    }
    categories
}

// ============================================================================
// Payload
// ============================================================================

/// The raw payload of one satisfied category.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The answer text.
    Text(String),
    /// Image URLs.
    Images(Vec<String>),
    /// Video URLs.
    Videos(Vec<String>),
    /// Audio URLs.
    Audio(Vec<String>),
    /// Coordinates.
    Location(Location),
}

impl Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Images(urls) | Self::Videos(urls) | Self::Audio(urls) => {
                f.write_str(&urls.join(", "))
            }
            Self::Location(location) => write!(f, "{location}"),
        }
    }
}

// ============================================================================
// Answer
// ============================================================================

/// A classified inbound message.
///
/// Cheap to clone; the underlying message is shared.
#[derive(Debug, Clone)]
pub struct Answer {
    message: Arc<IncomingMessage>,
    categories: Categories,
    params: Params,
}

impl Answer {
    /// Classifies `message`.
    pub fn new(message: impl Into<Arc<IncomingMessage>>) -> Self {
        let message = message.into();
        let categories = classify(&message);
        Self {
            message,
            categories,
            params: Params::new(),
        }
    }

    /// Attaches parameters bound by a text pattern.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Returns the underlying message.
    pub fn message(&self) -> &IncomingMessage {
        &self.message
    }

    /// Returns a shared handle to the underlying message.
    pub fn message_arc(&self) -> Arc<IncomingMessage> {
        Arc::clone(&self.message)
    }

    /// Returns the satisfied categories.
    pub fn categories(&self) -> Categories {
        self.categories
    }

    /// Returns `true` if the answer satisfies `category`.
    pub fn is(&self, category: Category) -> bool {
        self.categories.contains(category)
    }

    /// Returns parameters bound by a text pattern, if any.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Returns the answer text.
    ///
    /// A suggested-reply value takes precedence over the raw text.
    pub fn text(&self) -> &str {
        self.message
            .reply_value()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.message.text())
    }

    /// Returns the image URLs.
    pub fn images(&self) -> &[String] {
        self.message.images()
    }

    /// Returns the video URLs.
    pub fn videos(&self) -> &[String] {
        self.message.videos()
    }

    /// Returns the audio URLs.
    pub fn audio(&self) -> &[String] {
        self.message.audio()
    }

    /// Returns the location, if any.
    pub fn location(&self) -> Option<Location> {
        self.message.location()
    }

    /// Returns the payload for `category`, or `None` if it is not satisfied.
    pub fn payload(&self, category: Category) -> Option<Payload> {
        if !self.is(category) {
            return None;
        }
        let payload = match category {
            Category::Text => Payload::Text(self.text().to_string()),
            Category::Image => Payload::Images(self.images().to_vec()),
            Category::Video => Payload::Videos(self.videos().to_vec()),
            Category::Audio => Payload::Audio(self.audio().to_vec()),
            Category::Location => Payload::Location(self.location()?),
        };
        Some(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> IncomingMessage {
        IncomingMessage::new(text, "helloman", "#helloworld")
    }

    #[test]
    fn plain_text_is_only_text() {
        let categories = classify(&msg("hello"));
        assert!(categories.contains(Category::Text));
        assert_eq!(categories.len(), 1);
    }

    #[test]
    fn empty_message_satisfies_nothing() {
        assert!(classify(&msg("")).is_empty());
    }

    #[test]
    fn captioned_image_satisfies_both() {
        let categories = classify(&msg("look").with_images(["http://foo.com/bar.png"]));
        assert!(categories.contains(Category::Text));
        assert!(categories.contains(Category::Image));
        assert!(!categories.contains(Category::Video));
    }

    #[test]
    fn attachments_classify_without_text() {
        let m = msg("")
            .with_videos(["v.mp4"])
            .with_audio(["a.mp3"])
            .with_location(Location::new(1.0, 2.0));
        let categories: Vec<_> = classify(&m).iter().collect();
        assert_eq!(
            categories,
            vec![Category::Video, Category::Audio, Category::Location]
        );
    }

    #[test]
    fn payload_only_for_satisfied_categories() {
        let answer = Answer::new(msg("").with_images(["http://foo.com/bar.png"]));
        assert_eq!(
            answer.payload(Category::Image),
            Some(Payload::Images(vec!["http://foo.com/bar.png".into()]))
        );
        assert_eq!(answer.payload(Category::Text), None);
    }

    #[test]
    fn location_payload_formats_coordinates() {
        let answer = Answer::new(msg("").with_location(Location::new(41.123, -12.123)));
        let payload = answer.payload(Category::Location).unwrap();
        assert_eq!(payload.to_string(), "41.123:-12.123");
    }

    #[test]
    fn reply_value_overrides_text() {
        let answer = Answer::new(msg("Yes please").with_reply_value("yes"));
        assert_eq!(answer.text(), "yes");
        assert!(answer.is(Category::Text));
    }

    #[test]
    fn button_press_without_text_is_text() {
        let answer = Answer::new(msg("").with_reply_value("yes"));
        assert!(answer.is(Category::Text));
        assert_eq!(answer.payload(Category::Text), Some(Payload::Text("yes".into())));

        assert!(classify(&msg("").with_reply_value("")).is_empty());
    }
}
