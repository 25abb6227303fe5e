//! Message dispatcher for the Parley framework.
//!
//! The [`Dispatcher`] routes every inbound message to exactly one place:
//!
//! 1. If the session has a suspended conversation, matchers marked
//!    `stops_conversation` or `skips_conversation` are checked first. If none
//!    matches, the answer resumes the conversation.
//! 2. Otherwise matchers are checked in registration order and the first
//!    match runs.
//! 3. Otherwise the fallback handler runs, if any. If there is none, the
//!    message is dropped.
//!
//! Outbound messages produced by handlers and continuations are buffered.
//! They are sent in order once the step has completed, and the store is
//! updated only after every send succeeded. A failing handler, continuation
//! or transport therefore leaves the session exactly as it was.
//!
//! Messages of one session are processed one at a time, in arrival order.
//! Distinct sessions run concurrently.
//!
//! ```rust,ignore
//! let mut builder = Dispatcher::builder().case_insensitive(true);
//! builder.add(hears("hello").handler(start_survey))?;
//! builder.add(hears_images().handler(save_picture))?;
//! builder.conversation::<Survey>();
//! let dispatcher = builder.build();
//!
//! loop {
//!     dispatcher.listen(&transport).await?;
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{Instrument, Level, debug, error, span, trace};

use crate::context::BotContext;
use crate::conversation::{
    Conversation, ConversationRegistry, Next, Resolution, StepMode, Transition,
};
use crate::error::{DispatchError, DispatchResult, PatternResult};
use crate::handler::{BoxedHandler, Handler, into_handler};
use crate::matcher::{CompiledMatcher, ConversationPolicy, Matcher};
use crate::store::{ConversationStore, StoredConversation};
use parley_core::{Answer, Category, IncomingMessage, OutgoingMessage, SessionKey, Transport};

/// Default bound on sessions processed concurrently by [`Dispatcher::listen`].
pub const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 64;

/// Where a message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dispatched {
    /// The answer satisfied a branch of the suspended question.
    Resumed,
    /// The answer satisfied no branch; the repeat policy ran.
    Repeated,
    /// A matcher ran.
    Matched,
    /// A `stops_conversation` matcher ended the active conversation.
    Stopped,
    /// The fallback handler ran.
    Fallback,
    /// Nothing handled the message.
    Dropped,
}

/// What one [`Dispatcher::listen`] cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenSummary {
    /// Messages received from the transport.
    pub received: usize,
    /// Distinct sessions in the batch.
    pub sessions: usize,
    /// Outcomes of the messages that were dispatched successfully.
    pub outcomes: Vec<Dispatched>,
}

impl ListenSummary {
    /// Counts outcomes of kind `kind`.
    pub fn count(&self, kind: Dispatched) -> usize {
        self.outcomes.iter().filter(|o| **o == kind).count()
    }
}

/// Store mutation applied after a successful step.
enum Commit {
    Keep,
    Touch,
    Put(StoredConversation),
    Remove,
}

// ============================================================================
// Builder
// ============================================================================

/// Builds a [`Dispatcher`].
///
/// Registration is where configuration errors surface: a malformed pattern
/// is rejected by [`add`](Self::add), never at dispatch time. Set
/// [`case_insensitive`](Self::case_insensitive) before adding matchers.
pub struct DispatcherBuilder {
    matchers: Vec<CompiledMatcher>,
    fallback: Option<BoxedHandler>,
    conversations: ConversationRegistry,
    store: Option<Arc<ConversationStore>>,
    case_insensitive: bool,
    max_concurrent_sessions: usize,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            matchers: Vec::new(),
            fallback: None,
            conversations: ConversationRegistry::new(),
            store: None,
            case_insensitive: true,
            max_concurrent_sessions: DEFAULT_MAX_CONCURRENT_SESSIONS,
        }
    }
}

impl DispatcherBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether pattern literals compare case-insensitively.
    pub fn case_insensitive(mut self, yes: bool) -> Self {
        self.case_insensitive = yes;
        self
    }

    /// Bounds the number of sessions processed concurrently per listen cycle.
    pub fn max_concurrent_sessions(mut self, max: usize) -> Self {
        self.max_concurrent_sessions = max.max(1);
        self
    }

    /// Uses `store` instead of a fresh one, e.g. to share it with the host.
    pub fn store(mut self, store: Arc<ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Adds a matcher after all previously added ones.
    ///
    /// # Errors
    ///
    /// Fails if the matcher's pattern is malformed.
    pub fn add(&mut self, matcher: Matcher) -> PatternResult<&mut Self> {
        let compiled = matcher.compile(self.case_insensitive)?;
        debug!(matcher = compiled.label(), "Registered matcher");
        self.matchers.push(compiled);
        Ok(self)
    }

    /// Registers `handler` for text matching `pattern`.
    ///
    /// # Errors
    ///
    /// Fails if `pattern` is malformed.
    pub fn hears<F, T>(&mut self, pattern: &str, handler: F) -> PatternResult<&mut Self>
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.add(Matcher::new(pattern).handler(handler))
    }

    /// Registers `handler` for messages matching `pattern` and, if given,
    /// satisfying `requirement`.
    ///
    /// # Errors
    ///
    /// Fails if `pattern` is malformed.
    pub fn register_pattern<F, T>(
        &mut self,
        pattern: &str,
        requirement: Option<Category>,
        handler: F,
    ) -> PatternResult<&mut Self>
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        let mut matcher = Matcher::new(pattern).handler(handler);
        if let Some(category) = requirement {
            matcher = matcher.requires(category);
        }
        self.add(matcher)
    }

    /// Sets the handler for messages nothing else handles.
    pub fn fallback<F, T>(&mut self, handler: F) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.fallback = Some(into_handler(handler));
        self
    }

    /// Registers conversation type `C` so handlers can start it.
    pub fn conversation<C: Conversation>(&mut self) -> &mut Self {
        self.conversations.register::<C>();
        self
    }

    /// Returns the number of matchers added so far.
    pub fn matcher_count(&self) -> usize {
        self.matchers.len()
    }

    /// Finishes the dispatcher.
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            matchers: self.matchers,
            fallback: self.fallback,
            conversations: Arc::new(self.conversations),
            store: self.store.unwrap_or_default(),
            locks: DashMap::new(),
            case_insensitive: self.case_insensitive,
            max_concurrent_sessions: self.max_concurrent_sessions,
        }
    }
}

impl std::fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("matchers", &self.matchers)
            .field("fallback", &self.fallback.is_some())
            .field("conversations", &self.conversations)
            .field("case_insensitive", &self.case_insensitive)
            .field("max_concurrent_sessions", &self.max_concurrent_sessions)
            .finish()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// The central message dispatcher.
///
/// `Dispatcher` is `Send + Sync`; share it behind an `Arc` to run several
/// listen cycles (e.g. one per transport) at once.
pub struct Dispatcher {
    matchers: Vec<CompiledMatcher>,
    fallback: Option<BoxedHandler>,
    conversations: Arc<ConversationRegistry>,
    store: Arc<ConversationStore>,
    locks: DashMap<SessionKey, Arc<Mutex<()>>>,
    case_insensitive: bool,
    max_concurrent_sessions: usize,
}

impl Dispatcher {
    /// Returns a builder.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Returns the conversation store.
    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Returns the registered conversation types.
    pub fn conversations(&self) -> &ConversationRegistry {
        &self.conversations
    }

    /// Returns the number of registered matchers.
    pub fn matcher_count(&self) -> usize {
        self.matchers.len()
    }

    /// Ends `session`'s conversation without sending anything.
    ///
    /// Waits for any message of the session currently being processed.
    /// Returns `true` if a conversation was active.
    pub async fn stop_conversation(&self, session: &SessionKey) -> bool {
        let lock = self.session_lock(session);
        let removed = {
            let _guard = lock.lock().await;
            self.store.remove(session).is_some()
        };
        drop(lock);
        self.release_lock(session);
        if removed {
            debug!(%session, "Conversation stopped");
        }
        removed
    }

    /// Receives one batch from `transport` and dispatches it.
    ///
    /// Messages of the same session are dispatched in batch order; sessions
    /// run concurrently. A failure in one session does not prevent the
    /// others, or later messages of the same session, from being processed.
    ///
    /// # Errors
    ///
    /// Returns the receive error, or the first dispatch error once the whole
    /// batch has been processed. Every dispatch error is also logged.
    pub async fn listen(&self, transport: &dyn Transport) -> DispatchResult<ListenSummary> {
        let batch = transport.receive().await?;
        if batch.is_empty() {
            return Ok(ListenSummary::default());
        }

        let received = batch.len();
        let mut index: HashMap<SessionKey, usize> = HashMap::new();
        let mut groups: Vec<Vec<IncomingMessage>> = Vec::new();
        for message in batch {
            let slot = *index.entry(message.session()).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(message);
        }
        let sessions = groups.len();
        trace!(received, sessions, "Received batch");

        let results: Vec<Vec<DispatchResult<Dispatched>>> = stream::iter(groups)
            .map(|messages| async move {
                let mut results = Vec::with_capacity(messages.len());
                for message in messages {
                    results.push(self.dispatch(message, transport).await);
                }
                results
            })
            .buffer_unordered(self.max_concurrent_sessions)
            .collect()
            .await;

        let mut summary = ListenSummary {
            received,
            sessions,
            outcomes: Vec::with_capacity(received),
        };
        let mut first_error = None;
        for result in results.into_iter().flatten() {
            match result {
                Ok(outcome) => summary.outcomes.push(outcome),
                Err(e) => {
                    error!(error = %e, "Dispatch failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Dispatches one message, replying through `transport`.
    ///
    /// # Errors
    ///
    /// Fails if the handler or continuation fails, if a reply cannot be
    /// sent, or if the stored conversation cannot be resumed. In every case
    /// the session's stored conversation is left untouched.
    pub async fn dispatch(
        &self,
        message: IncomingMessage,
        transport: &dyn Transport,
    ) -> DispatchResult<Dispatched> {
        let session = message.session();
        let span = span!(
            Level::DEBUG,
            "dispatch",
            sender = session.sender(),
            channel = session.channel()
        );

        async {
            let lock = self.session_lock(&session);
            let result = {
                let _guard = lock.lock().await;
                self.dispatch_locked(Answer::new(message), &session, transport)
                    .await
            };
            drop(lock);
            self.release_lock(&session);
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch_locked(
        &self,
        answer: Answer,
        session: &SessionKey,
        transport: &dyn Transport,
    ) -> DispatchResult<Dispatched> {
        if let Some(stored) = self.store.get(session) {
            for matcher in &self.matchers {
                let policy = matcher.policy();
                if policy == ConversationPolicy::Default {
                    continue;
                }
                if let Some(params) = matcher.check(&answer) {
                    let stop = policy == ConversationPolicy::Stop;
                    debug!(matcher = matcher.label(), stop, "Matcher interrupts conversation");
                    self.run_handler(
                        matcher.handler(),
                        answer.with_params(params),
                        session,
                        transport,
                        stop,
                    )
                    .await?;
                    return Ok(if stop {
                        Dispatched::Stopped
                    } else {
                        Dispatched::Matched
                    });
                }
            }
            return self.resume(stored, answer, session, transport).await;
        }

        for matcher in &self.matchers {
            if let Some(params) = matcher.check(&answer) {
                debug!(matcher = matcher.label(), "Matcher matched");
                self.run_handler(
                    matcher.handler(),
                    answer.with_params(params),
                    session,
                    transport,
                    false,
                )
                .await?;
                return Ok(Dispatched::Matched);
            }
        }

        if let Some(fallback) = &self.fallback {
            debug!("No matcher matched, running fallback");
            self.run_handler(Some(fallback), answer, session, transport, false)
                .await?;
            return Ok(Dispatched::Fallback);
        }

        trace!("No matcher matched, dropping message");
        Ok(Dispatched::Dropped)
    }

    async fn run_handler(
        &self,
        handler: Option<&BoxedHandler>,
        answer: Answer,
        session: &SessionKey,
        transport: &dyn Transport,
        end_active: bool,
    ) -> DispatchResult<()> {
        let ctx = Arc::new(BotContext::new(answer, Arc::clone(&self.conversations)));
        if let Some(handler) = handler {
            handler
                .call(Arc::clone(&ctx))
                .await
                .map_err(|e| DispatchError::handler(session, e))?;
        }

        let mut outbox = ctx.take_outbox();
        let mut commit = if end_active || ctx.stop_requested() {
            Commit::Remove
        } else {
            Commit::Keep
        };

        if let Some(pending) = ctx.take_pending() {
            let conversation = self.conversations.get(pending.kind).ok_or_else(|| {
                DispatchError::UnknownConversation {
                    session: session.clone(),
                    kind: pending.kind.to_string(),
                }
            })?;
            debug!(conversation = pending.kind, "Starting conversation");
            let transition = conversation.start(session, pending.state).await?;
            outbox.extend(transition.outbox);
            commit = match transition.next {
                Next::Suspend(frame) => {
                    Commit::Put(StoredConversation::new(pending.kind, transition.state, frame))
                }
                Next::End => Commit::Remove,
            };
        }

        self.deliver(transport, session, outbox).await?;
        self.commit(session, commit);
        Ok(())
    }

    async fn resume(
        &self,
        stored: StoredConversation,
        answer: Answer,
        session: &SessionKey,
        transport: &dyn Transport,
    ) -> DispatchResult<Dispatched> {
        let conversation = self.conversations.get(stored.kind()).ok_or_else(|| {
            DispatchError::UnknownConversation {
                session: session.clone(),
                kind: stored.kind().to_string(),
            }
        })?;

        let (step, mode, answer) = match stored.frame().resolve(&answer, self.case_insensitive)? {
            Resolution::Advance { step, params } => {
                (step, StepMode::Advance, answer.with_params(params))
            }
            Resolution::Repeat { step: Some(step) } => {
                (step, StepMode::Repeat, answer)
            }
            Resolution::Repeat { step: None } => {
                debug!(conversation = stored.kind(), "Answer not accepted, asking again");
                let question = OutgoingMessage::from(stored.frame().question());
                self.deliver(transport, session, vec![question]).await?;
                self.commit(session, Commit::Touch);
                return Ok(Dispatched::Repeated);
            }
        };

        debug!(conversation = stored.kind(), ?mode, "Resuming conversation");
        let Transition {
            state,
            outbox,
            next,
        } = conversation
            .resume(
                session,
                stored.state().clone(),
                stored.frame(),
                step,
                mode,
                &answer,
            )
            .await?;

        self.deliver(transport, session, outbox).await?;
        self.commit(
            session,
            match next {
                Next::Suspend(frame) => {
                    Commit::Put(StoredConversation::new(stored.kind(), state, frame))
                }
                Next::End => Commit::Remove,
            },
        );

        Ok(match mode {
            StepMode::Repeat => Dispatched::Repeated,
            _ => Dispatched::Resumed,
        })
    }

    async fn deliver(
        &self,
        transport: &dyn Transport,
        session: &SessionKey,
        outbox: Vec<OutgoingMessage>,
    ) -> DispatchResult<()> {
        for message in outbox {
            trace!(text = message.text(), "Sending message");
            transport.send(message, session).await?;
        }
        Ok(())
    }

    fn commit(&self, session: &SessionKey, commit: Commit) {
        match commit {
            Commit::Keep => {}
            Commit::Touch => self.store.touch(session),
            Commit::Put(conversation) => self.store.put(session.clone(), conversation),
            Commit::Remove => {
                if self.store.remove(session).is_some() {
                    debug!("Conversation finished");
                }
            }
        }
    }

    fn session_lock(&self, session: &SessionKey) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(session.clone()).or_default().value())
    }

    /// Drops the session's lock entry once nobody else holds or awaits it.
    fn release_lock(&self, session: &SessionKey) {
        self.locks
            .remove_if(session, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("matcher_count", &self.matchers.len())
            .field("fallback", &self.fallback.is_some())
            .field("conversations", &self.conversations)
            .field("active_sessions", &self.store.len())
            .finish()
    }
}
