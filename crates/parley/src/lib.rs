//! # Parley
//!
//! A conversational bot engine for Rust.
//!
//! ## Overview
//!
//! Incoming chat messages are either answers to a question a conversation
//! is waiting on, or new messages matched against registered patterns. A
//! conversation asks a question, suspends, and resumes in a typed step when
//! the next message from the same sender and channel arrives.
//!
//! ```text
//! ┌───────────┐     ┌────────────┐  answer   ┌──────────────────────┐
//! │ Transport │────▶│ Dispatcher │──────────▶│ Suspended            │
//! │ (receive) │     │  (listen)  │           │ conversation (store) │
//! └───────────┘     └────────────┘           └──────────────────────┘
//!       ▲                 │ new message
//!       │ send            ▼
//!       │           ┌────────────┐
//!       └───────────│  Matchers  │ "call me {name}", hears_images(), ...
//!                   └────────────┘
//! ```
//!
//! - **Transport**: platform bridge, polled for batches of messages
//! - **Dispatcher**: per-session routing with transactional store updates
//! - **Conversations**: serializable multi-turn dialogs
//! - **Runtime**: configuration, logging and the polling loop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley::prelude::*;
//!
//! async fn greet(ctx: Arc<BotContext>) {
//!     ctx.reply(format!("Hello {}!", ctx.param("name").unwrap_or("there")));
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = ParleyRuntime::new();
//!
//!     let mut builder = runtime.dispatcher_builder();
//!     builder.hears("call me {name}", greet)?;
//!
//!     let runtime = runtime.with_dispatcher(builder.build());
//!     runtime.run(&MyTransport::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: load `parley.toml` (default)
//! - `yaml-config`: load `parley.yaml`
//! - `json-log`: JSON log output

pub use parley_core as core;
pub use parley_framework as framework;
pub use parley_runtime as runtime;

pub use async_trait::async_trait;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use parley::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    pub use async_trait::async_trait;

    // Runtime - main entry point
    pub use parley_runtime::{ParleyConfig, ParleyRuntime};

    // Dispatch and registration
    pub use parley_framework::{
        BotContext, Dispatched, Dispatcher, DispatcherBuilder, Matcher, hears, hears_audio,
        hears_images, hears_location, hears_videos,
    };

    // Conversations
    pub use parley_framework::{Ask, Conversation, Turn};

    // Errors
    pub use parley_framework::{DispatchError, HandlerError, HandlerResult};

    // Message model
    pub use parley_core::{
        Answer, Button, Category, IncomingMessage, Location, OutgoingMessage, Params, Question,
        SessionKey, Transport, TransportError, TransportResult,
    };
}
