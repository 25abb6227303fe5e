//! Configuration schema definitions.
//!
//! Every section has a complete default, so an empty file (or no file at
//! all) yields a working configuration.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "pretty"
//!
//! [logging.filters]
//! parley_framework = "trace"
//!
//! [matching]
//! case_insensitive = true
//!
//! [listen]
//! poll_interval_ms = 250
//! max_concurrent_sessions = 32
//!
//! [conversation]
//! idle_timeout_secs = 1800
//! sweep_interval_secs = 60
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    /// Logging settings.
    pub logging: LoggingConfig,

    /// Pattern matching settings.
    pub matching: MatchingConfig,

    /// Listen loop settings.
    pub listen: ListenConfig,

    /// Conversation lifecycle settings.
    pub conversation: ConversationConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as used in filter directives.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` without it.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Appends to `logging.file_path`.
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level, overridden by `RUST_LOG` when set.
    pub level: LogLevel,

    pub format: LogFormat,

    pub output: LogOutput,

    /// Log file, required when `output = "file"`.
    pub file_path: Option<PathBuf>,

    /// Include thread ids.
    pub thread_ids: bool,

    /// Include source file and line.
    pub file_location: bool,

    pub span_events: SpanEventConfig,

    /// Per-module levels, e.g. `parley_framework = "trace"`.
    pub filters: HashMap<String, LogLevel>,
}

// =============================================================================
// Engine
// =============================================================================

/// Pattern matching settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Compare pattern literals case-insensitively.
    pub case_insensitive: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            case_insensitive: true,
        }
    }
}

/// Listen loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Delay between two receive calls, in milliseconds.
    pub poll_interval_ms: u64,

    /// Sessions dispatched concurrently within one batch.
    pub max_concurrent_sessions: usize,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_concurrent_sessions: parley_framework::DEFAULT_MAX_CONCURRENT_SESSIONS,
        }
    }
}

impl ListenConfig {
    /// Returns the poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Conversation lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Suspended conversations idle longer than this are dropped. Unset
    /// means never.
    pub idle_timeout_secs: Option<u64>,

    /// How often idle conversations are looked for, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: None,
            sweep_interval_secs: 60,
        }
    }
}

impl ConversationConfig {
    /// Returns the idle timeout, if any.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    /// Returns the sweep interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ParleyConfig::default();
        assert!(config.matching.case_insensitive);
        assert_eq!(config.listen.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.listen.max_concurrent_sessions, 64);
        assert_eq!(config.conversation.idle_timeout(), None);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config: ParleyConfig = serde_json::from_str(
            r#"{ "listen": { "poll_interval_ms": 50 }, "logging": { "level": "debug" } }"#,
        )
        .unwrap();
        assert_eq!(config.listen.poll_interval_ms, 50);
        assert_eq!(config.listen.max_concurrent_sessions, 64);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }
}
