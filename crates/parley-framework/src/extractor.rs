//! Handler argument extraction.
//!
//! Any type implementing [`FromContext`] can appear as a handler argument:
//!
//! ```rust,ignore
//! async fn order(params: Params, session: SessionKey, ctx: Arc<BotContext>) {
//!     let count: u32 = params.parse("count").unwrap_or(1);
//!     ctx.reply(format!("{count} pizzas for {session}"));
//! }
//! ```

use std::sync::Arc;

use crate::context::BotContext;
use crate::error::ExtractResult;
use parley_core::{Answer, IncomingMessage, Params, SessionKey};

/// Extracts a value from the handler context.
pub trait FromContext: Sized {
    /// Performs the extraction.
    fn from_context(ctx: &Arc<BotContext>) -> ExtractResult<Self>;
}

impl FromContext for Arc<BotContext> {
    fn from_context(ctx: &Arc<BotContext>) -> ExtractResult<Self> {
        Ok(Arc::clone(ctx))
    }
}

impl FromContext for Answer {
    fn from_context(ctx: &Arc<BotContext>) -> ExtractResult<Self> {
        Ok(ctx.answer().clone())
    }
}

impl FromContext for Arc<IncomingMessage> {
    fn from_context(ctx: &Arc<BotContext>) -> ExtractResult<Self> {
        Ok(ctx.answer().message_arc())
    }
}

impl FromContext for Params {
    fn from_context(ctx: &Arc<BotContext>) -> ExtractResult<Self> {
        Ok(ctx.params().clone())
    }
}

impl FromContext for SessionKey {
    fn from_context(ctx: &Arc<BotContext>) -> ExtractResult<Self> {
        Ok(ctx.session().clone())
    }
}
