//! Parley Runtime - configuration, logging and the listen loop.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `ParleyConfig`)
//! - Logging setup on top of `tracing-subscriber` (`LoggingBuilder`)
//! - The polling listen loop with idle-conversation sweeping (`ParleyRuntime`)
//!
//! ```ignore
//! use parley_runtime::ParleyRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = ParleyRuntime::new();
//!
//!     let mut builder = runtime.dispatcher_builder();
//!     builder.hears("ping", ping)?;
//!
//!     let runtime = runtime.with_dispatcher(builder.build());
//!     runtime.run(&MyTransport::connect().await?).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, ParleyConfig, Profile};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{ParleyRuntime, RuntimeBuilder, RuntimeStats};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
