//! # Parley Framework
//!
//! Routing and dialog management on top of `parley-core`.
//!
//! This layer provides:
//! - Text patterns with named placeholders and wildcards
//! - Matchers pairing a pattern and an optional category requirement with a
//!   handler
//! - Axum-style handlers whose arguments are extracted from the context
//! - Multi-turn conversations whose suspension points are plain data
//! - The conversation store and the dispatcher driving it all

pub mod context;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod handler;
pub mod matcher;
pub mod pattern;
pub mod store;

pub use context::BotContext;
pub use conversation::{Ask, Conversation, ConversationRegistry, Expect, Frame, Turn};
pub use dispatcher::{
    DEFAULT_MAX_CONCURRENT_SESSIONS, Dispatched, Dispatcher, DispatcherBuilder, ListenSummary,
};
pub use error::{
    BoxError, DispatchError, DispatchResult, ExtractError, ExtractResult, HandlerError,
    HandlerResult, PatternError, PatternResult,
};
pub use extractor::FromContext;
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, HandlerFn, into_handler};
pub use matcher::{
    ConversationPolicy, Matcher, hears, hears_audio, hears_images, hears_location, hears_videos,
};
pub use pattern::Pattern;
pub use store::{ConversationStore, StoredConversation};
