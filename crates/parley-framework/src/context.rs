//! The context handed to handlers.
//!
//! One [`BotContext`] is created per dispatched message that reaches a
//! handler. Handlers never talk to the transport directly: replies are
//! buffered in the context and a started conversation is recorded as
//! pending. The dispatcher sends the buffered replies and commits the
//! conversation to the store only after the handler returns successfully.
//!
//! ```rust,ignore
//! async fn greet(ctx: Arc<BotContext>) -> HandlerResult {
//!     let name = ctx.param("name").unwrap_or("stranger");
//!     ctx.reply(format!("Hello, {name}!"));
//!     ctx.start_conversation(Onboarding::default())
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use crate::conversation::{Conversation, ConversationRegistry};
use crate::error::{HandlerError, HandlerResult};
use parley_core::{Answer, IncomingMessage, OutgoingMessage, Params, SessionKey};

/// A conversation started by a handler, not yet run.
#[derive(Debug)]
pub(crate) struct PendingConversation {
    pub(crate) kind: &'static str,
    pub(crate) state: Value,
}

/// The context passed to handlers.
pub struct BotContext {
    answer: Answer,
    session: SessionKey,
    conversations: Arc<ConversationRegistry>,
    outbox: Mutex<Vec<OutgoingMessage>>,
    pending: Mutex<Option<PendingConversation>>,
    stop_requested: AtomicBool,
}

impl BotContext {
    pub(crate) fn new(answer: Answer, conversations: Arc<ConversationRegistry>) -> Self {
        let session = answer.message().session();
        Self {
            answer,
            session,
            conversations,
            outbox: Mutex::new(Vec::new()),
            pending: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Returns the inbound message.
    pub fn message(&self) -> &IncomingMessage {
        self.answer.message()
    }

    /// Returns the classified inbound message.
    pub fn answer(&self) -> &Answer {
        &self.answer
    }

    /// Returns the session the message belongs to.
    pub fn session(&self) -> &SessionKey {
        &self.session
    }

    /// Returns the parameters bound by the matched pattern.
    pub fn params(&self) -> &Params {
        self.answer.params()
    }

    /// Returns one bound parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.answer.params().get(name)
    }

    /// Queues a reply to the sender.
    pub fn reply(&self, message: impl Into<OutgoingMessage>) {
        self.outbox.lock().push(message.into());
    }

    /// Starts `conversation` for this session once the handler returns.
    ///
    /// Replaces any conversation already active for the session. Starting a
    /// second conversation from the same handler replaces the first.
    ///
    /// # Errors
    ///
    /// Fails if `C` was not registered with the dispatcher, or if its state
    /// does not serialize.
    pub fn start_conversation<C: Conversation>(&self, conversation: C) -> HandlerResult {
        if !self.conversations.contains(C::NAME) {
            return Err(HandlerError::ConversationNotRegistered(C::NAME));
        }
        let state = serde_json::to_value(&conversation)?;
        *self.pending.lock() = Some(PendingConversation {
            kind: C::NAME,
            state,
        });
        Ok(())
    }

    /// Ends the conversation active for this session, if any.
    pub fn stop_conversation(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_outbox(&self) -> Vec<OutgoingMessage> {
        std::mem::take(&mut *self.outbox.lock())
    }

    pub(crate) fn take_pending(&self) -> Option<PendingConversation> {
        self.pending.lock().take()
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for BotContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotContext")
            .field("session", &self.session)
            .field("text", &self.answer.text())
            .finish_non_exhaustive()
    }
}
