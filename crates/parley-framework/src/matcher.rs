//! Pattern registrations.
//!
//! A [`Matcher`] pairs a text pattern and an optional category requirement
//! with a handler. The dispatcher consults matchers in registration order and
//! runs the first one that matches; later matchers never see the message.
//!
//! # Example
//!
//! ```rust,ignore
//! use parley_framework::{hears, hears_images};
//!
//! builder.add(hears("order {size} pizza").name("order").handler(order))?;
//! builder.add(hears_images().handler(save_picture))?;
//! builder.add(hears("stop").stops_conversation().handler(goodbye))?;
//! ```

use std::sync::Arc;

use tracing::trace;

use crate::error::PatternResult;
use crate::handler::{BoxedHandler, Handler, into_handler};
use crate::pattern::Pattern;
use parley_core::{Answer, Category, Params};

/// How a matcher interacts with an active conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationPolicy {
    /// Only considered when the session has no active conversation.
    #[default]
    Default,
    /// Checked before resuming; on match the conversation is ended and the
    /// handler runs instead.
    Stop,
    /// Checked before resuming; on match the handler runs and the
    /// conversation stays suspended on its current question.
    Skip,
}

#[derive(Clone)]
struct MatcherInner {
    source: String,
    requirement: Option<Category>,
    handler: Option<BoxedHandler>,
    policy: ConversationPolicy,
    name: Option<String>,
}

/// A pattern registration, not yet compiled.
///
/// Cheap to clone. Compiled when added to a
/// [`DispatcherBuilder`](crate::DispatcherBuilder), which is where malformed
/// patterns are reported.
#[derive(Clone)]
pub struct Matcher {
    inner: Arc<MatcherInner>,
}

impl Matcher {
    /// Creates a matcher for `pattern`.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MatcherInner {
                source: pattern.into(),
                requirement: None,
                handler: None,
                policy: ConversationPolicy::Default,
                name: None,
            }),
        }
    }

    fn inner_mut(&mut self) -> &mut MatcherInner {
        Arc::make_mut(&mut self.inner)
    }

    /// Sets a name for this matcher (useful for debugging).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner_mut().name = Some(name.into());
        self
    }

    /// Requires the message to satisfy `category` as well as the pattern.
    pub fn requires(mut self, category: Category) -> Self {
        self.inner_mut().requirement = Some(category);
        self
    }

    /// Lets this matcher end an active conversation.
    pub fn stops_conversation(mut self) -> Self {
        self.inner_mut().policy = ConversationPolicy::Stop;
        self
    }

    /// Lets this matcher run during an active conversation without
    /// disturbing it.
    pub fn skips_conversation(mut self) -> Self {
        self.inner_mut().policy = ConversationPolicy::Skip;
        self
    }

    /// Sets the handler.
    pub fn handler<F, T>(mut self, f: F) -> Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.inner_mut().handler = Some(into_handler(f));
        self
    }

    /// Sets a pre-built boxed handler.
    pub fn handler_boxed(mut self, handler: BoxedHandler) -> Self {
        self.inner_mut().handler = Some(handler);
        self
    }

    /// Returns the pattern source.
    pub fn pattern(&self) -> &str {
        &self.inner.source
    }

    /// Returns the category requirement, if any.
    pub fn requirement(&self) -> Option<Category> {
        self.inner.requirement
    }

    /// Returns the conversation policy.
    pub fn policy(&self) -> ConversationPolicy {
        self.inner.policy
    }

    /// Returns the name of this matcher, if set.
    pub fn get_name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub(crate) fn compile(self, case_insensitive: bool) -> PatternResult<CompiledMatcher> {
        let pattern = if self.inner.source.trim() == "*" {
            Pattern::any()
        } else {
            Pattern::new(&self.inner.source, case_insensitive)?
        };
        Ok(CompiledMatcher {
            pattern,
            matcher: self,
        })
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("pattern", &self.inner.source)
            .field("requirement", &self.inner.requirement)
            .field("policy", &self.inner.policy)
            .field("name", &self.inner.name)
            .finish()
    }
}

/// A matcher whose pattern has been compiled.
#[derive(Clone, Debug)]
pub(crate) struct CompiledMatcher {
    pattern: Pattern,
    matcher: Matcher,
}

impl CompiledMatcher {
    /// Returns the bound parameters if `answer` satisfies this matcher.
    pub(crate) fn check(&self, answer: &Answer) -> Option<Params> {
        if let Some(category) = self.matcher.inner.requirement
            && !answer.is(category)
        {
            return None;
        }
        let params = self.pattern.matches(answer.text());
        trace!(
            matcher = self.label(),
            matched = params.is_some(),
            "Checked matcher"
        );
        params
    }

    pub(crate) fn handler(&self) -> Option<&BoxedHandler> {
        self.matcher.inner.handler.as_ref()
    }

    pub(crate) fn policy(&self) -> ConversationPolicy {
        self.matcher.inner.policy
    }

    pub(crate) fn label(&self) -> &str {
        self.matcher
            .inner
            .name
            .as_deref()
            .unwrap_or(&self.matcher.inner.source)
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Creates a matcher for text matching `pattern`.
///
/// ```rust,ignore
/// builder.add(hears("call me {name}").handler(greet))?;
/// ```
pub fn hears(pattern: impl Into<String>) -> Matcher {
    Matcher::new(pattern)
}

/// Creates a matcher for any message carrying an image.
pub fn hears_images() -> Matcher {
    Matcher::new("*").requires(Category::Image).name("images")
}

/// Creates a matcher for any message carrying a video.
pub fn hears_videos() -> Matcher {
    Matcher::new("*").requires(Category::Video).name("videos")
}

/// Creates a matcher for any message carrying audio.
pub fn hears_audio() -> Matcher {
    Matcher::new("*").requires(Category::Audio).name("audio")
}

/// Creates a matcher for any message carrying a location.
pub fn hears_location() -> Matcher {
    Matcher::new("*").requires(Category::Location).name("location")
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{IncomingMessage, Location};

    fn text(t: &str) -> Answer {
        Answer::new(IncomingMessage::new(t, "u", "c"))
    }

    #[test]
    fn text_matcher_binds_params() {
        let m = hears("call me {name}").compile(true).unwrap();
        let params = m.check(&text("Call me Ada")).unwrap();
        assert_eq!(params.get("name"), Some("Ada"));
        assert!(m.check(&text("hello")).is_none());
    }

    #[test]
    fn category_requirement_is_enforced() {
        let m = hears_images().compile(true).unwrap();
        assert!(m.check(&text("a picture")).is_none());

        let image = Answer::new(IncomingMessage::new("", "u", "c").with_images(["x.png"]));
        assert!(m.check(&image).is_some());
    }

    #[test]
    fn requirement_and_pattern_must_both_hold() {
        let m = hears("here").requires(Category::Location).compile(true).unwrap();
        assert!(m.check(&text("here")).is_none());

        let loc = Answer::new(
            IncomingMessage::new("here", "u", "c").with_location(Location::new(1.0, 1.0)),
        );
        assert!(m.check(&loc).is_some());
    }

    #[test]
    fn malformed_pattern_fails_to_compile() {
        assert!(hears("{x} {x}").compile(true).is_err());
    }

    #[test]
    fn builder_settings_are_kept() {
        let m = hears("stop").name("stopper").stops_conversation();
        assert_eq!(m.policy(), ConversationPolicy::Stop);
        assert_eq!(m.get_name(), Some("stopper"));
        assert_eq!(m.pattern(), "stop");
        assert_eq!(hears("x").skips_conversation().policy(), ConversationPolicy::Skip);
    }
}
