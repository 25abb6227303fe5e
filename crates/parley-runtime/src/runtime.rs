//! The polling listen loop.
//!
//! The runtime owns the configuration and a [`Dispatcher`], and drives
//! [`Dispatcher::listen`] against a transport on the configured poll
//! interval. A failing cycle is logged and counted; the loop keeps going
//! until it is shut down or the transport reports that it is closed.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use parley_runtime::ParleyRuntime;
//!
//! // Loads parley.toml from the current directory when present
//! let runtime = ParleyRuntime::new();
//!
//! let mut builder = runtime.dispatcher_builder();
//! builder.hears("hi", |ctx: Arc<BotContext>| async move { ctx.reply("hello") })?;
//!
//! let runtime = runtime.with_dispatcher(builder.build());
//! runtime.run(&transport).await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use parley_core::{Transport, TransportError};
use parley_framework::{DispatchError, DispatchResult, Dispatcher, DispatcherBuilder, ListenSummary};
use tokio::signal;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, ConfigResult, ParleyConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Counters for one [`ParleyRuntime::run_until`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Listen cycles that completed, successfully or not.
    pub cycles: u64,
    /// Messages received in cycles that succeeded.
    pub messages: u64,
    /// Cycles that returned an error.
    pub failures: u64,
    /// Conversations dropped by the idle sweep.
    pub swept: u64,
}

/// Owns the configuration and dispatcher and runs the listen loop.
pub struct ParleyRuntime {
    config: ParleyConfig,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
}

impl ParleyRuntime {
    /// Creates a runtime from `parley.toml` in the current directory,
    /// falling back to defaults if loading fails.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                ParleyConfig::default()
            });

        Self::from_config(&config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from a loaded configuration and initializes
    /// logging from it.
    ///
    /// The runtime starts with an empty dispatcher; install one with
    /// [`with_dispatcher`](Self::with_dispatcher).
    pub fn from_config(config: &ParleyConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            poll_interval_ms = config.listen.poll_interval_ms,
            max_concurrent_sessions = config.listen.max_concurrent_sessions,
            idle_timeout_secs = ?config.conversation.idle_timeout_secs,
            "Runtime initialized from configuration"
        );

        let dispatcher = Arc::new(builder_for(config).build());
        Self {
            config: config.clone(),
            dispatcher,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    /// Returns a dispatcher builder with the configured matching and
    /// concurrency settings applied.
    pub fn dispatcher_builder(&self) -> DispatcherBuilder {
        builder_for(&self.config)
    }

    /// Installs the dispatcher the loop drives.
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }

    /// Returns the installed dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Returns a token that stops the loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Asks a running loop to stop after its current cycle.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Runs one listen cycle.
    pub async fn listen_once(&self, transport: &dyn Transport) -> DispatchResult<ListenSummary> {
        self.dispatcher.listen(transport).await
    }

    /// Runs the loop until Ctrl+C or SIGTERM.
    pub async fn run(&self, transport: &dyn Transport) -> RuntimeResult<RuntimeStats> {
        let signal = shutdown_signal()?;
        info!(transport = transport.name(), "Parley runtime is now running. Press Ctrl+C to stop.");
        Ok(self.run_until(transport, signal).await)
    }

    /// Runs the loop until `shutdown` completes, the shutdown token is
    /// cancelled or the transport is closed.
    pub async fn run_until<F>(&self, transport: &dyn Transport, shutdown: F) -> RuntimeStats
    where
        F: Future<Output = ()>,
    {
        if self.dispatcher.matcher_count() == 0 && self.dispatcher.conversations().is_empty() {
            warn!("Dispatcher has no matchers or conversations, every message will be dropped");
        }

        let mut stats = RuntimeStats::default();
        let mut poll = tokio::time::interval(self.config.listen.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let idle_timeout = self.config.conversation.idle_timeout();
        let mut sweep = idle_timeout.map(|_| {
            let mut sweep = tokio::time::interval(self.config.conversation.sweep_interval());
            sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
            sweep
        });

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown token cancelled");
                    break;
                }
                _ = next_tick(&mut sweep) => {
                    if let Some(max_idle) = idle_timeout {
                        let removed = self.dispatcher.store().sweep_idle(max_idle);
                        stats.swept += removed as u64;
                        if removed > 0 {
                            info!(removed, "Dropped idle conversations");
                        }
                    }
                }
                _ = poll.tick() => {
                    stats.cycles += 1;
                    match self.listen_once(transport).await {
                        Ok(summary) => {
                            stats.messages += summary.received as u64;
                            if summary.received > 0 {
                                debug!(
                                    received = summary.received,
                                    sessions = summary.sessions,
                                    "Listen cycle complete"
                                );
                            }
                        }
                        Err(DispatchError::Transport(TransportError::Closed(name))) => {
                            info!(transport = %name, "Transport closed, stopping");
                            break;
                        }
                        Err(e) => {
                            stats.failures += 1;
                            error!(error = %e, "Listen cycle failed");
                        }
                    }
                }
            }
        }

        info!(
            cycles = stats.cycles,
            messages = stats.messages,
            failures = stats.failures,
            swept = stats.swept,
            "Parley runtime stopped"
        );
        stats
    }
}

impl Default for ParleyRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn builder_for(config: &ParleyConfig) -> DispatcherBuilder {
    Dispatcher::builder()
        .case_insensitive(config.matching.case_insensitive)
        .max_concurrent_sessions(config.listen.max_concurrent_sessions)
}

/// Ticks `interval`, or never completes when there is none.
async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Completes on Ctrl+C or SIGTERM.
#[cfg(unix)]
fn shutdown_signal() -> RuntimeResult<impl Future<Output = ()>> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(RuntimeError::Signal)?;

    Ok(async move {
        tokio::select! {
            result = signal::ctrl_c() => match result {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(e) => {
                    error!(error = %e, "Failed to listen for Ctrl+C, waiting for SIGTERM");
                    sigterm.recv().await;
                    info!("Received SIGTERM, shutting down");
                }
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    })
}

/// Completes on Ctrl+C.
#[cfg(not(unix))]
fn shutdown_signal() -> RuntimeResult<impl Future<Output = ()>> {
    Ok(async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    })
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`ParleyRuntime`] with custom configuration.
///
/// ```rust,ignore
/// let runtime = ParleyRuntime::builder()
///     .config_file("config/parley.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Overrides a single key, e.g. `("listen.poll_interval_ms", 100)`.
    pub fn set<T: serde::Serialize>(mut self, key: &str, value: T) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(self) -> ConfigResult<ParleyRuntime> {
        let config = self.config_loader.load()?;
        Ok(ParleyRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use parley_core::{Answer, FakeTransport, IncomingMessage, SessionKey};
    use parley_framework::{Ask, BotContext, Conversation, HandlerError, HandlerResult, Turn};
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Survey;

    #[async_trait]
    impl Conversation for Survey {
        const NAME: &'static str = "survey";
        type Step = ();

        async fn run(&mut self, turn: &mut Turn<()>) -> HandlerResult {
            turn.ask(Ask::new("Pick one").any(()))
        }

        async fn resume(&mut self, _: (), answer: &Answer, turn: &mut Turn<()>) -> HandlerResult {
            turn.say(format!("Got {}", answer.text()));
            Ok(())
        }
    }

    fn fast_config() -> ParleyConfig {
        let mut config = ParleyConfig::default();
        config.listen.poll_interval_ms = 5;
        config
    }

    fn runtime(config: &ParleyConfig) -> ParleyRuntime {
        let runtime = ParleyRuntime::from_config(config);
        let mut builder = runtime.dispatcher_builder();
        builder.conversation::<Survey>();
        builder
            .hears("survey", |ctx: Arc<BotContext>| async move {
                ctx.start_conversation(Survey)
            })
            .unwrap();
        builder
            .hears("boom", |_: Arc<BotContext>| async move {
                Err::<(), _>(HandlerError::msg("exploded"))
            })
            .unwrap();
        builder
            .hears("hi", |ctx: Arc<BotContext>| async move { ctx.reply("hello") })
            .unwrap();
        runtime.with_dispatcher(builder.build())
    }

    async fn drained(transport: &FakeTransport) {
        while transport.pending_batches() > 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn loop_survives_failing_cycles() {
        let runtime = runtime(&fast_config());
        let transport = FakeTransport::new();
        transport.push(IncomingMessage::new("boom", "u", "c"));
        transport.push(IncomingMessage::new("hi", "u", "c"));

        let stats = runtime.run_until(&transport, drained(&transport)).await;

        assert_eq!(stats.messages, 1);
        assert_eq!(stats.failures, 1);
        assert!(stats.cycles >= 2);
        assert_eq!(transport.sent_texts(), vec!["hello"]);
    }

    #[tokio::test]
    async fn conversation_spans_cycles() {
        let runtime = runtime(&fast_config());
        let transport = FakeTransport::new();
        transport.push(IncomingMessage::new("survey", "u", "c"));
        transport.push(IncomingMessage::new("blue", "u", "c"));

        runtime.run_until(&transport, drained(&transport)).await;

        assert_eq!(transport.sent_texts(), vec!["Pick one", "Got blue"]);
        assert!(runtime.dispatcher().store().is_empty());
    }

    #[tokio::test]
    async fn shutdown_token_stops_the_loop() {
        let runtime = runtime(&fast_config());
        let transport = FakeTransport::new();
        runtime.shutdown();

        let stats = runtime
            .run_until(&transport, std::future::pending::<()>())
            .await;
        assert_eq!(stats.messages, 0);
    }

    #[tokio::test]
    async fn idle_conversations_are_swept() {
        let mut config = fast_config();
        config.conversation.idle_timeout_secs = Some(60);
        config.conversation.sweep_interval_secs = 1;
        let runtime = runtime(&config);
        let transport = FakeTransport::new();

        runtime
            .dispatcher()
            .dispatch(IncomingMessage::new("survey", "u", "c"), &transport)
            .await
            .unwrap();
        let store = runtime.dispatcher().store();
        let mut snapshot = store.snapshot().unwrap();
        snapshot[0]["conversation"]["last_activity"] = serde_json::json!(0);
        store.restore(snapshot).unwrap();
        assert!(store.contains(&SessionKey::new("u", "c")));

        let stats = runtime
            .run_until(&transport, tokio::time::sleep(Duration::from_millis(50)))
            .await;

        assert_eq!(stats.swept, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn builder_applies_overrides() {
        let runtime = ParleyRuntime::builder()
            .without_env()
            .set("listen.poll_interval_ms", 20)
            .set("matching.case_insensitive", false)
            .build()
            .unwrap();
        assert_eq!(runtime.config().listen.poll_interval_ms, 20);
        assert!(!runtime.config().matching.case_insensitive);
        assert_eq!(runtime.dispatcher().matcher_count(), 0);
    }
}
