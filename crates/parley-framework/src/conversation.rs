//! Multi-turn conversations.
//!
//! A [`Conversation`] is a serializable value plus a set of named steps. A
//! step asks a question with [`Turn::ask`], which suspends the dialog until
//! the next message of the same session arrives. The answer is classified
//! and routed to the step registered for the first satisfied branch.
//!
//! Continuations are identified by the conversation's `Step` type rather than
//! captured closures. Each suspension point is stored as a plain [`Frame`]
//! record, so a session can be persisted and resumed later, even by another
//! process.
//!
//! # Example
//!
//! ```rust,ignore
//! #[derive(Default, Serialize, Deserialize)]
//! struct Avatar {
//!     nickname: Option<String>,
//! }
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! enum Step {
//!     GotImage,
//!     NotAnImage,
//! }
//!
//! #[async_trait]
//! impl Conversation for Avatar {
//!     const NAME: &'static str = "avatar";
//!     type Step = Step;
//!
//!     async fn run(&mut self, turn: &mut Turn<Step>) -> HandlerResult {
//!         turn.ask(
//!             Ask::new("Send me your new avatar")
//!                 .on(Category::Image, Step::GotImage)
//!                 .repeat(Category::Image, Step::NotAnImage),
//!         )
//!     }
//!
//!     async fn resume(&mut self, step: Step, answer: &Answer, turn: &mut Turn<Step>) -> HandlerResult {
//!         match step {
//!             Step::GotImage => turn.say(format!("Saved {}", answer.images()[0])),
//!             Step::NotAnImage => turn.say("That is not an image..."),
//!         }
//!         Ok(())
//!     }
//! }
//! ```
//!
//! # Repeat policy
//!
//! When an answer satisfies no branch, the first repeat step registered for
//! one of the requested categories runs, then any catch-all repeat step
//! ([`Ask::otherwise`]). Without either, the original question is sent again
//! verbatim. Either way the session stays on the same frame; there is no
//! retry limit.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::error::{DispatchError, DispatchResult, HandlerError, HandlerResult, PatternResult};
use crate::pattern::{self, Pattern};
use parley_core::{Answer, Categories, Category, OutgoingMessage, Params, Question, SessionKey};

// ============================================================================
// Conversation trait
// ============================================================================

/// A multi-turn dialog.
///
/// The implementing type holds the dialog's own state (answers collected so
/// far, counters, ...). It is serialized after every step and restored before
/// the next one.
#[async_trait]
pub trait Conversation: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable identifier used to find this type again when resuming.
    const NAME: &'static str;

    /// Identifies the continuations of this conversation.
    type Step: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static;

    /// Entry point, called once when a handler starts the conversation.
    async fn run(&mut self, turn: &mut Turn<Self::Step>) -> HandlerResult;

    /// Called with the answer routed to `step`.
    ///
    /// `step` is either the answer step of the satisfied branch or a repeat
    /// step. For answer steps the frame is consumed: the dialog ends unless
    /// the step asks again. For repeat steps the session stays on the
    /// current frame unless the step asks something else.
    async fn resume(
        &mut self,
        step: Self::Step,
        answer: &Answer,
        turn: &mut Turn<Self::Step>,
    ) -> HandlerResult;
}

// ============================================================================
// Ask
// ============================================================================

/// What an answer must look like to take a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Expect {
    /// The answer satisfies this category.
    Category(Category),
    /// The answer text matches this pattern source.
    Pattern(String),
    /// The answer satisfies any category.
    Any,
}

impl Expect {
    fn requested(&self) -> Categories {
        match self {
            Self::Category(category) => [*category].into_iter().collect(),
            Self::Pattern(_) => [Category::Text].into_iter().collect(),
            Self::Any => Category::ALL.into_iter().collect(),
        }
    }
}

/// A question together with its answer branches and repeat steps.
///
/// Branches are evaluated in the order they were added; the first satisfied
/// one wins.
#[derive(Debug, Clone)]
pub struct Ask<S> {
    question: Question,
    branches: Vec<(Expect, S)>,
    repeats: Vec<(Option<Category>, S)>,
}

impl<S> Ask<S> {
    /// Creates an ask step for `question`.
    pub fn new(question: impl Into<Question>) -> Self {
        Self {
            question: question.into(),
            branches: Vec::new(),
            repeats: Vec::new(),
        }
    }

    /// Routes answers satisfying `category` to `step`.
    pub fn on(mut self, category: Category, step: S) -> Self {
        self.branches.push((Expect::Category(category), step));
        self
    }

    /// Routes text answers matching `pattern` to `step`.
    ///
    /// Placeholders in the pattern are available through
    /// [`Answer::params`].
    pub fn hears(mut self, pattern: impl Into<String>, step: S) -> Self {
        self.branches.push((Expect::Pattern(pattern.into()), step));
        self
    }

    /// Routes any non-empty answer to `step`.
    pub fn any(mut self, step: S) -> Self {
        self.branches.push((Expect::Any, step));
        self
    }

    /// Runs `step` instead of re-asking when a `category` answer was
    /// expected but not given.
    pub fn repeat(mut self, category: Category, step: S) -> Self {
        self.repeats.push((Some(category), step));
        self
    }

    /// Runs `step` instead of re-asking when no branch is satisfied and no
    /// category-specific repeat step applies.
    pub fn otherwise(mut self, step: S) -> Self {
        self.repeats.push((None, step));
        self
    }
}

impl<S: Serialize> Ask<S> {
    fn into_frame(self) -> Result<Frame, HandlerError> {
        if self.branches.is_empty() {
            return Err(HandlerError::InvalidAsk(format!(
                "question '{}' has no answer branches",
                self.question.text()
            )));
        }

        let mut branches = Vec::with_capacity(self.branches.len());
        for (expect, step) in self.branches {
            if let Expect::Pattern(source) = &expect {
                pattern::validate(source)?;
            }
            branches.push(Branch {
                expect,
                step: serde_json::to_value(&step)?,
            });
        }

        let mut repeats = Vec::with_capacity(self.repeats.len());
        for (category, step) in self.repeats {
            repeats.push(RepeatBranch {
                category,
                step: serde_json::to_value(&step)?,
            });
        }

        Ok(Frame {
            question: self.question,
            branches,
            repeats,
        })
    }
}

// ============================================================================
// Frame
// ============================================================================

/// An answer branch with its serialized step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    expect: Expect,
    step: Value,
}

/// A repeat step with its serialized identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatBranch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<Category>,
    step: Value,
}

/// One suspended `ask`, stored by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    question: Question,
    branches: Vec<Branch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    repeats: Vec<RepeatBranch>,
}

/// Where an answer goes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Resolution {
    /// A branch was satisfied.
    Advance { step: Value, params: Params },
    /// No branch was satisfied. `None` means re-send the question.
    Repeat { step: Option<Value> },
}

impl Frame {
    /// Returns the question this frame is waiting on.
    pub fn question(&self) -> &Question {
        &self.question
    }

    /// Returns the answer branches in evaluation order.
    pub fn expectations(&self) -> impl Iterator<Item = &Expect> {
        self.branches.iter().map(|b| &b.expect)
    }

    pub(crate) fn resolve(
        &self,
        answer: &Answer,
        case_insensitive: bool,
    ) -> PatternResult<Resolution> {
        for branch in &self.branches {
            let params = match &branch.expect {
                Expect::Category(category) => answer.is(*category).then(Params::new),
                Expect::Pattern(source) => {
                    if answer.text().is_empty() {
                        None
                    } else {
                        Pattern::new(source, case_insensitive)?.matches(answer.text())
                    }
                }
                Expect::Any => (!answer.categories().is_empty()).then(Params::new),
            };
            if let Some(params) = params {
                return Ok(Resolution::Advance {
                    step: branch.step.clone(),
                    params,
                });
            }
        }

        let requested: Categories = self
            .branches
            .iter()
            .flat_map(|b| b.expect.requested().iter())
            .collect();

        let specific = self.repeats.iter().find(|r| {
            r.category
                .is_some_and(|category| requested.contains(category))
        });
        let catch_all = self.repeats.iter().find(|r| r.category.is_none());

        Ok(Resolution::Repeat {
            step: specific.or(catch_all).map(|r| r.step.clone()),
        })
    }
}

// ============================================================================
// Turn
// ============================================================================

/// How a step was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepMode {
    Start,
    Advance,
    Repeat,
}

/// What happens to the session after a step.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Next {
    /// Wait on this frame.
    Suspend(Frame),
    /// The dialog is over.
    End,
}

/// The handle a step uses to talk and to ask.
///
/// Messages passed to [`say`](Self::say) and questions passed to
/// [`ask`](Self::ask) are sent in order once the step returns successfully.
pub struct Turn<S> {
    session: SessionKey,
    mode: StepMode,
    current: Option<Frame>,
    next: Option<Frame>,
    outbox: Vec<OutgoingMessage>,
    stopped: bool,
    _step: PhantomData<fn() -> S>,
}

impl<S> Turn<S> {
    pub(crate) fn new(session: SessionKey, mode: StepMode, current: Option<Frame>) -> Self {
        Self {
            session,
            mode,
            current,
            next: None,
            outbox: Vec::new(),
            stopped: false,
            _step: PhantomData,
        }
    }

    /// Returns the session this turn belongs to.
    pub fn session(&self) -> &SessionKey {
        &self.session
    }

    /// Returns the question being answered, if this step was resumed.
    pub fn question(&self) -> Option<&Question> {
        self.current.as_ref().map(Frame::question)
    }

    /// Sends a message.
    pub fn say(&mut self, message: impl Into<OutgoingMessage>) {
        self.outbox.push(message.into());
    }

    /// Re-sends the current question and keeps waiting on it.
    ///
    /// Does nothing when called from [`Conversation::run`].
    pub fn repeat(&mut self) {
        if let Some(frame) = &self.current {
            self.outbox.push(OutgoingMessage::from(&frame.question));
            self.next = Some(frame.clone());
            self.stopped = false;
        }
    }

    /// Re-asks the current question with different text, keeping its
    /// branches and buttons.
    ///
    /// Does nothing when called from [`Conversation::run`].
    pub fn repeat_with(&mut self, text: impl Into<String>) {
        if let Some(frame) = &self.current {
            let mut frame = frame.clone();
            frame.question = frame.question.with_text(text);
            self.outbox.push(OutgoingMessage::from(&frame.question));
            self.next = Some(frame);
            self.stopped = false;
        }
    }

    /// Ends the conversation after this step, discarding any pending ask.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.next = None;
    }

    pub(crate) fn finish(self) -> (Vec<OutgoingMessage>, Next) {
        let next = if self.stopped {
            Next::End
        } else if let Some(frame) = self.next {
            Next::Suspend(frame)
        } else {
            match (self.mode, self.current) {
                (StepMode::Repeat, Some(frame)) => Next::Suspend(frame),
                _ => Next::End,
            }
        };
        (self.outbox, next)
    }
}

impl<S: Serialize> Turn<S> {
    /// Sends `ask`'s question and suspends the dialog on it.
    ///
    /// Asking twice in the same step sends both questions but only waits on
    /// the last one.
    ///
    /// # Errors
    ///
    /// Fails if the ask has no branches, a text branch has an invalid
    /// pattern, or a step does not serialize.
    pub fn ask(&mut self, ask: Ask<S>) -> HandlerResult {
        let frame = ask.into_frame()?;
        trace!(session = %self.session, question = frame.question.text(), "Suspending on question");
        self.outbox.push(OutgoingMessage::from(&frame.question));
        self.next = Some(frame);
        self.stopped = false;
        Ok(())
    }
}

// ============================================================================
// Type erasure
// ============================================================================

/// The result of running one step.
#[derive(Debug)]
pub(crate) struct Transition {
    pub(crate) state: Value,
    pub(crate) outbox: Vec<OutgoingMessage>,
    pub(crate) next: Next,
}

#[async_trait]
pub(crate) trait ErasedConversation: Send + Sync {
    async fn start(&self, session: &SessionKey, state: Value) -> DispatchResult<Transition>;

    async fn resume(
        &self,
        session: &SessionKey,
        state: Value,
        frame: &Frame,
        step: Value,
        mode: StepMode,
        answer: &Answer,
    ) -> DispatchResult<Transition>;
}

struct Typed<C>(PhantomData<fn() -> C>);

impl<C: Conversation> Typed<C> {
    fn decode<T: DeserializeOwned>(session: &SessionKey, value: Value) -> DispatchResult<T> {
        serde_json::from_value(value).map_err(|source| DispatchError::State {
            session: session.clone(),
            source,
        })
    }

    fn transition(
        session: &SessionKey,
        conversation: &C,
        turn: Turn<C::Step>,
    ) -> DispatchResult<Transition> {
        let state = serde_json::to_value(conversation)
            .map_err(|e| DispatchError::handler(session, HandlerError::State(e)))?;
        let (outbox, next) = turn.finish();
        Ok(Transition {
            state,
            outbox,
            next,
        })
    }
}

#[async_trait]
impl<C: Conversation> ErasedConversation for Typed<C> {
    async fn start(&self, session: &SessionKey, state: Value) -> DispatchResult<Transition> {
        let mut conversation: C = Self::decode(session, state)?;
        let mut turn = Turn::new(session.clone(), StepMode::Start, None);
        conversation
            .run(&mut turn)
            .await
            .map_err(|e| DispatchError::handler(session, e))?;
        Self::transition(session, &conversation, turn)
    }

    async fn resume(
        &self,
        session: &SessionKey,
        state: Value,
        frame: &Frame,
        step: Value,
        mode: StepMode,
        answer: &Answer,
    ) -> DispatchResult<Transition> {
        let mut conversation: C = Self::decode(session, state)?;
        let step: C::Step = Self::decode(session, step)?;
        trace!(conversation = C::NAME, step = ?step, "Resuming conversation");

        let mut turn = Turn::new(session.clone(), mode, Some(frame.clone()));
        conversation
            .resume(step, answer, &mut turn)
            .await
            .map_err(|e| DispatchError::handler(session, e))?;
        Self::transition(session, &conversation, turn)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// The table of conversation types a dispatcher can resume.
///
/// Built once at startup; a stored conversation whose kind is missing from
/// the registry cannot be resumed.
#[derive(Clone, Default)]
pub struct ConversationRegistry {
    kinds: HashMap<&'static str, Arc<dyn ErasedConversation>>,
}

impl ConversationRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers conversation type `C`.
    pub fn register<C: Conversation>(&mut self) {
        self.kinds
            .insert(C::NAME, Arc::new(Typed::<C>(PhantomData)));
    }

    /// Registers conversation type `C` (builder pattern).
    pub fn with<C: Conversation>(mut self) -> Self {
        self.register::<C>();
        self
    }

    /// Returns `true` if a conversation named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Returns the number of registered conversation types.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<dyn ErasedConversation>> {
        self.kinds.get(name).cloned()
    }
}

impl fmt::Debug for ConversationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.kinds.keys().collect();
        names.sort();
        f.debug_struct("ConversationRegistry")
            .field("kinds", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{IncomingMessage, Location};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    enum Step {
        Image,
        Video,
        Name,
        BadImage,
        Fallback,
    }

    fn answer(msg: IncomingMessage) -> Answer {
        Answer::new(msg)
    }

    fn text(t: &str) -> Answer {
        answer(IncomingMessage::new(t, "u", "c"))
    }

    fn frame(ask: Ask<Step>) -> Frame {
        ask.into_frame().unwrap()
    }

    #[test]
    fn first_satisfied_branch_wins() {
        let f = frame(
            Ask::new("Send media")
                .on(Category::Image, Step::Image)
                .on(Category::Video, Step::Video),
        );
        let a = answer(
            IncomingMessage::new("", "u", "c")
                .with_videos(["v.mp4"])
                .with_images(["i.png"]),
        );
        assert_eq!(
            f.resolve(&a, true).unwrap(),
            Resolution::Advance {
                step: json!("Image"),
                params: Params::new()
            }
        );
    }

    #[test]
    fn pattern_branch_binds_params() {
        let f = frame(Ask::new("Name?").hears("my name is {name}", Step::Name));
        match f.resolve(&text("My name is Ada"), true).unwrap() {
            Resolution::Advance { step, params } => {
                assert_eq!(step, json!("Name"));
                assert_eq!(params.get("name"), Some("Ada"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unsatisfied_without_repeat_resends_question() {
        let f = frame(Ask::new("Please supply an image").on(Category::Image, Step::Image));
        assert_eq!(
            f.resolve(&text("not_an_image"), true).unwrap(),
            Resolution::Repeat { step: None }
        );
    }

    #[test]
    fn category_repeat_step_is_used() {
        let f = frame(
            Ask::new("Please supply an image")
                .on(Category::Image, Step::Image)
                .otherwise(Step::Fallback)
                .repeat(Category::Image, Step::BadImage),
        );
        assert_eq!(
            f.resolve(&text("nope"), true).unwrap(),
            Resolution::Repeat {
                step: Some(json!("BadImage"))
            }
        );
    }

    #[test]
    fn repeat_for_unrequested_category_is_ignored() {
        let f = frame(
            Ask::new("Where are you?")
                .on(Category::Location, Step::Image)
                .repeat(Category::Video, Step::BadImage)
                .otherwise(Step::Fallback),
        );
        assert_eq!(
            f.resolve(&text("here"), true).unwrap(),
            Resolution::Repeat {
                step: Some(json!("Fallback"))
            }
        );
    }

    #[test]
    fn any_branch_accepts_attachments() {
        let f = frame(Ask::new("Anything?").any(Step::Image));
        let a = answer(IncomingMessage::new("", "u", "c").with_location(Location::new(1.0, 2.0)));
        assert!(matches!(
            f.resolve(&a, true).unwrap(),
            Resolution::Advance { .. }
        ));
        assert!(matches!(
            f.resolve(&text(""), true).unwrap(),
            Resolution::Repeat { step: None }
        ));
    }

    #[test]
    fn button_press_answers_text_questions() {
        let pressed = || answer(IncomingMessage::new("", "u", "c").with_reply_value("yes"));

        let f = frame(Ask::new("Continue?").on(Category::Text, Step::Name));
        assert!(matches!(
            f.resolve(&pressed(), true).unwrap(),
            Resolution::Advance { .. }
        ));

        let f = frame(Ask::new("Continue?").any(Step::Name));
        assert!(matches!(
            f.resolve(&pressed(), true).unwrap(),
            Resolution::Advance { .. }
        ));

        let f = frame(Ask::new("Continue?").hears("yes", Step::Name));
        assert!(matches!(
            f.resolve(&pressed(), true).unwrap(),
            Resolution::Advance { .. }
        ));
    }

    #[test]
    fn ask_without_branches_is_rejected() {
        let err = Ask::<Step>::new("Hello?").into_frame().unwrap_err();
        assert!(matches!(err, HandlerError::InvalidAsk(_)));
    }

    #[test]
    fn ask_with_bad_pattern_is_rejected() {
        let err = Ask::new("Hello?")
            .hears("{a} {a}", Step::Name)
            .into_frame()
            .unwrap_err();
        assert!(matches!(err, HandlerError::Pattern(_)));
    }

    #[test]
    fn frame_round_trips_through_json() {
        let f = frame(
            Ask::new("Q")
                .on(Category::Audio, Step::Image)
                .repeat(Category::Audio, Step::BadImage),
        );
        let restored: Frame = serde_json::from_value(serde_json::to_value(&f).unwrap()).unwrap();
        assert_eq!(restored, f);
    }

    #[test]
    fn turn_finish_rules() {
        let session = SessionKey::new("u", "c");
        let current = frame(Ask::new("Q").any(Step::Name));

        let turn: Turn<Step> = Turn::new(session.clone(), StepMode::Advance, Some(current.clone()));
        assert_eq!(turn.finish().1, Next::End);

        let turn: Turn<Step> = Turn::new(session.clone(), StepMode::Repeat, Some(current.clone()));
        assert_eq!(turn.finish().1, Next::Suspend(current.clone()));

        let mut turn: Turn<Step> =
            Turn::new(session.clone(), StepMode::Repeat, Some(current.clone()));
        turn.stop();
        assert_eq!(turn.finish().1, Next::End);

        let mut turn: Turn<Step> = Turn::new(session, StepMode::Advance, Some(current.clone()));
        turn.repeat_with("Q again");
        let (outbox, next) = turn.finish();
        assert_eq!(outbox[0].text(), "Q again");
        match next {
            Next::Suspend(f) => assert_eq!(f.question().text(), "Q again"),
            Next::End => panic!("expected suspension"),
        }
    }
}
