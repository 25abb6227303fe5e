//! Configuration module for the Parley runtime.
//!
//! Layered loading (defaults, files, environment, overrides) through
//! figment, followed by validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ConversationConfig, ListenConfig, LogFormat, LogLevel, LogOutput, LoggingConfig,
    MatchingConfig, ParleyConfig, SpanEventConfig,
};
pub use validation::validate_config;
