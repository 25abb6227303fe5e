//! Handler system for the Parley framework.
//!
//! Handlers are plain async functions whose arguments are extracted from the
//! [`BotContext`] via [`FromContext`], in the same spirit as Axum handlers.
//!
//! A handler may return `()` or any `Result<(), E>` where `E` converts into
//! a boxed error. Errors propagate to the caller of the listen cycle.
//!
//! # Example
//!
//! ```rust,ignore
//! // No arguments
//! async fn ping() {}
//!
//! // Context only
//! async fn hello(ctx: Arc<BotContext>) {
//!     ctx.reply("Hi!");
//! }
//!
//! // Several extractors and a fallible body
//! async fn order(params: Params, ctx: Arc<BotContext>) -> Result<(), HandlerError> {
//!     let size = params.get("size").unwrap_or("medium");
//!     ctx.reply(format!("One {size} pizza coming up"));
//!     ctx.start_conversation(PizzaConversation::new(size))
//! }
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::BotContext;
use crate::error::{BoxError, HandlerError, HandlerResult};
use crate::extractor::FromContext;

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// IntoHandlerResult
// ============================================================================

/// Conversion of a handler's return value into a [`HandlerResult`].
pub trait IntoHandlerResult {
    /// Performs the conversion.
    fn into_handler_result(self) -> HandlerResult;
}

impl IntoHandlerResult for () {
    fn into_handler_result(self) -> HandlerResult {
        Ok(())
    }
}

impl<E> IntoHandlerResult for Result<(), E>
where
    E: Into<BoxError>,
{
    fn into_handler_result(self) -> HandlerResult {
        self.map_err(|e| HandlerError::from_boxed(e.into()))
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// The core trait for message handlers.
///
/// Automatically implemented for async functions and closures that take up
/// to eight [`FromContext`] arguments and return an [`IntoHandlerResult`].
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// The type of future calling this handler returns.
    type Future: Future<Output = HandlerResult> + Send + 'static;

    /// Call the handler with the given context.
    fn call(self, ctx: Arc<BotContext>) -> Self::Future;
}

/// A wrapper that stores a handler function together with its argument types.
pub struct HandlerFn<F, T> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> HandlerFn<F, T> {
    /// Creates a new handler function wrapper.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F: Clone, T> Clone for HandlerFn<F, T> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            _marker: PhantomData,
        }
    }
}

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync>;

/// Type-erased handler trait for dynamic dispatch.
pub trait ErasedHandler: Send + Sync {
    /// Execute the handler with the given context.
    fn call(&self, ctx: Arc<BotContext>) -> BoxFuture<'static, HandlerResult>;
}

impl<F, T> ErasedHandler for HandlerFn<F, T>
where
    F: Handler<T> + Send + Sync,
    T: 'static,
{
    fn call(&self, ctx: Arc<BotContext>) -> BoxFuture<'static, HandlerResult> {
        let f = self.f.clone();
        Box::pin(f.call(ctx))
    }
}

/// Convert a handler function into a boxed handler.
pub fn into_handler<F, T>(f: F) -> BoxedHandler
where
    F: Handler<T> + Send + Sync + 'static,
    T: 'static,
{
    Arc::new(HandlerFn::new(f))
}

// ============================================================================
// Handler implementations for functions
// ============================================================================

impl<F, Fut, R> Handler<((), R)> for F
where
    F: FnOnce() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult + 'static,
{
    type Future = BoxFuture<'static, HandlerResult>;

    fn call(self, _ctx: Arc<BotContext>) -> Self::Future {
        Box::pin(async move { (self)().await.into_handler_result() })
    }
}

macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Fut, R, $($ty,)*> Handler<(($($ty,)*), R)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoHandlerResult + 'static,
            $( $ty: FromContext + Send + 'static, )*
        {
            type Future = BoxFuture<'static, HandlerResult>;

            fn call(self, ctx: Arc<BotContext>) -> Self::Future {
                Box::pin(async move {
                    $(
                        let $ty = $ty::from_context(&ctx)?;
                    )*

                    (self)($($ty,)*).await.into_handler_result()
                })
            }
        }
    };
}

impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationRegistry;
    use parley_core::{Answer, IncomingMessage, Params};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx(text: &str) -> Arc<BotContext> {
        let mut params = Params::new();
        params.insert("name", "bob");
        let answer = Answer::new(IncomingMessage::new(text, "u", "c")).with_params(params);
        Arc::new(BotContext::new(answer, Arc::new(ConversationRegistry::new())))
    }

    #[tokio::test]
    async fn zero_argument_handler_runs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let handler = into_handler(move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        handler.call(ctx("hi")).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn extractors_are_injected() {
        async fn greet(params: Params, ctx: Arc<BotContext>) {
            ctx.reply(format!("hi {}", params.get("name").unwrap_or("?")));
        }

        let context = ctx("hi");
        into_handler(greet).call(Arc::clone(&context)).await.unwrap();
        let outbox = context.take_outbox();
        assert_eq!(outbox[0].text(), "hi bob");
    }

    #[tokio::test]
    async fn errors_are_propagated() {
        async fn failing(_ctx: Arc<BotContext>) -> Result<(), HandlerError> {
            Err(HandlerError::msg("nope"))
        }

        let err = into_handler(failing).call(ctx("hi")).await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }

    #[tokio::test]
    async fn foreign_errors_are_boxed() {
        async fn parse(ctx: Arc<BotContext>) -> Result<(), std::num::ParseIntError> {
            ctx.message().text().parse::<u32>()?;
            Ok(())
        }

        let err = into_handler(parse).call(ctx("abc")).await.unwrap_err();
        assert!(matches!(err, HandlerError::Failed(_)));
    }
}
