//! Error types for the Parley framework.

use std::fmt::Display;

use parley_core::{SessionKey, TransportError};
use thiserror::Error;

/// A boxed error returned by user handlers and continuations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while registering a pattern.
///
/// These are configuration-time failures; a pattern that registers
/// successfully never fails at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The pattern has no content.
    #[error("pattern is empty")]
    Empty,

    /// A `{` without a matching `}`.
    #[error("unclosed placeholder in pattern '{pattern}'")]
    UnclosedPlaceholder {
        /// The offending pattern.
        pattern: String,
    },

    /// A placeholder name that is not an identifier.
    #[error("invalid parameter name '{name}' in pattern '{pattern}'")]
    InvalidParameter {
        /// The offending pattern.
        pattern: String,
        /// The rejected name.
        name: String,
    },

    /// The same placeholder name bound twice.
    #[error("parameter '{name}' appears more than once in pattern '{pattern}'")]
    DuplicateParameter {
        /// The offending pattern.
        pattern: String,
        /// The repeated name.
        name: String,
    },

    /// The compiled expression was rejected by the regex engine.
    #[error("failed to compile pattern '{pattern}': {reason}")]
    Compile {
        /// The offending pattern.
        pattern: String,
        /// Reason reported by the regex engine.
        reason: String,
    },
}

/// Errors that can occur during context extraction.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// Custom extraction error.
    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    /// Creates a custom extraction error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// Errors raised by handlers and conversation continuations.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A handler argument could not be extracted.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// An `ask` used an invalid text pattern.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// An `ask` that no answer could ever satisfy.
    #[error("invalid ask: {0}")]
    InvalidAsk(String),

    /// A conversation type was started without being registered.
    #[error("conversation '{0}' is not registered")]
    ConversationNotRegistered(&'static str),

    /// Conversation state or a step identifier failed to (de)serialize.
    #[error("conversation state error: {0}")]
    State(#[from] serde_json::Error),

    /// The user code failed.
    #[error("{0}")]
    Failed(BoxError),
}

impl HandlerError {
    /// Creates an error from a message.
    pub fn msg(msg: impl Display) -> Self {
        Self::Failed(msg.to_string().into())
    }

    /// Wraps a boxed error, unwrapping it if it already is a `HandlerError`.
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<HandlerError>() {
            Ok(err) => *err,
            Err(other) => Self::Failed(other),
        }
    }
}

/// Errors propagated to the caller of a dispatch or listen cycle.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The transport failed to receive or send.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A handler or continuation failed.
    #[error("handler failed for {session}: {source}")]
    Handler {
        /// The session being processed.
        session: SessionKey,
        /// The underlying failure.
        #[source]
        source: HandlerError,
    },

    /// The store holds a conversation kind that is not registered.
    #[error("conversation '{kind}' stored for {session} is not registered")]
    UnknownConversation {
        /// The session being processed.
        session: SessionKey,
        /// The stored conversation kind.
        kind: String,
    },

    /// The stored conversation state could not be decoded.
    #[error("corrupt conversation state for {session}: {source}")]
    State {
        /// The session being processed.
        session: SessionKey,
        /// The underlying decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// A stored text branch no longer compiles.
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

impl DispatchError {
    pub(crate) fn handler(session: &SessionKey, source: HandlerError) -> Self {
        Self::Handler {
            session: session.clone(),
            source,
        }
    }
}

/// Result type for extraction.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Result type for handlers and continuations.
pub type HandlerResult = Result<(), HandlerError>;

/// Result type for pattern registration.
pub type PatternResult<T> = Result<T, PatternError>;

/// Result type for dispatch.
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_boxed_unwraps_handler_errors() {
        let boxed: BoxError = Box::new(HandlerError::ConversationNotRegistered("x"));
        assert!(matches!(
            HandlerError::from_boxed(boxed),
            HandlerError::ConversationNotRegistered("x")
        ));
    }

    #[test]
    fn from_boxed_wraps_foreign_errors() {
        let boxed: BoxError = "boom".into();
        let err = HandlerError::from_boxed(boxed);
        assert!(matches!(err, HandlerError::Failed(_)));
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn extract_errors_carry_their_message() {
        let err = ExtractError::custom("no session");
        assert!(matches!(&err, ExtractError::Custom(m) if m == "no session"));
        assert_eq!(err.to_string(), "no session");
    }
}
