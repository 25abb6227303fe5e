//! Console Bot Example
//!
//! Drives the Parley engine over stdin/stdout. Type `hello` to start the
//! onboarding dialog, `cancel` to leave it, and `help` at any time.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package console-bot -- --sender alice
//! ```

mod console;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use parley::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::console::ConsoleTransport;

#[derive(Parser, Debug)]
#[command(version, about = "Chat with a Parley bot on the console")]
struct Args {
    /// Configuration file, defaults to parley.toml in the current directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile.
    #[arg(short, long)]
    profile: Option<String>,

    /// Name the messages are sent as.
    #[arg(long, default_value = "you")]
    sender: String,

    /// Channel the messages are sent in.
    #[arg(long, default_value = "console")]
    channel: String,
}

// ============================================================================
// Onboarding conversation
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct Onboarding {
    name: Option<String>,
    avatar: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
enum Step {
    Name,
    Avatar,
    SkipAvatar,
    NotAvatar,
    Home,
    NotHome,
    LikesRust(bool),
}

impl Onboarding {
    fn ask_avatar(&self, turn: &mut Turn<Step>) -> HandlerResult {
        turn.ask(
            Ask::new("Send me a picture of yourself, or say skip.")
                .on(Category::Image, Step::Avatar)
                .hears("skip", Step::SkipAvatar)
                .repeat(Category::Image, Step::NotAvatar),
        )
    }

    fn ask_home(&self, turn: &mut Turn<Step>) -> HandlerResult {
        turn.ask(
            Ask::new("Where are you? Share a location with /location <lat> <lng>.")
                .on(Category::Location, Step::Home)
                .otherwise(Step::NotHome),
        )
    }
}

#[async_trait]
impl Conversation for Onboarding {
    const NAME: &'static str = "onboarding";
    type Step = Step;

    async fn run(&mut self, turn: &mut Turn<Step>) -> HandlerResult {
        turn.ask(
            Ask::new("What's your name?")
                .hears("my name is {name}", Step::Name)
                .hears("i am {name}", Step::Name)
                .any(Step::Name),
        )
    }

    async fn resume(&mut self, step: Step, answer: &Answer, turn: &mut Turn<Step>) -> HandlerResult {
        match step {
            Step::Name => {
                let name = answer.params().get("name").unwrap_or(answer.text()).to_string();
                turn.say(format!("Nice to meet you, {name}."));
                self.name = Some(name);
                self.ask_avatar(turn)
            }
            Step::Avatar => {
                if let Some(url) = answer.images().first() {
                    turn.say(format!("Looking good! Saved {url}."));
                    self.avatar = Some(url.clone());
                }
                self.ask_home(turn)
            }
            Step::SkipAvatar => {
                turn.say("No picture then.");
                self.ask_home(turn)
            }
            Step::NotAvatar => {
                turn.repeat_with("That is not an image. Try /image <url>, or say skip.");
                Ok(())
            }
            Step::Home => {
                if let Some(location) = answer.location() {
                    turn.say(format!("Noted, you are at {location}."));
                }
                turn.ask(
                    Ask::new(
                        Question::new("Last one: do you like Rust?")
                            .button(Button::new("Yes").value("yes"))
                            .button(Button::new("No").value("no")),
                    )
                    .hears("yes", Step::LikesRust(true))
                    .hears("no", Step::LikesRust(false)),
                )
            }
            Step::NotHome => {
                turn.say("That is not a location...");
                Ok(())
            }
            Step::LikesRust(likes) => {
                let name = self.name.as_deref().unwrap_or("stranger");
                let verdict = if likes { "Great choice" } else { "Give it time" };
                let picture = if self.avatar.is_some() { "with" } else { "without" };
                turn.say(format!("{verdict}, {name}. You're all set, {picture} a picture!"));
                Ok(())
            }
        }
    }
}

// ============================================================================
// Handler Functions
// ============================================================================

async fn start_onboarding(ctx: Arc<BotContext>) -> HandlerResult {
    ctx.start_conversation(Onboarding::default())
}

async fn call_me(ctx: Arc<BotContext>, params: Params) {
    let name = params.get("name").unwrap_or("nobody");
    ctx.reply(format!("Alright, {name} it is."));
}

async fn cancel(ctx: Arc<BotContext>) {
    ctx.reply("Okay, never mind.");
}

async fn help(ctx: Arc<BotContext>) {
    ctx.reply(
        "hello - start onboarding\n\
         call me <name> - pick a name\n\
         cancel - leave the current dialog\n\
         /image, /video, /audio <url>, /location <lat> <lng>, /reply <value>",
    );
}

async fn picture(ctx: Arc<BotContext>, answer: Answer) {
    if let Some(url) = answer.images().first() {
        ctx.reply(format!("Nice picture: {url}"));
    }
}

async fn fallback(ctx: Arc<BotContext>) {
    ctx.reply("Sorry, I didn't get that. Type help.");
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Bot replies go to stdout, so keep logs on stderr
    let mut runtime = ParleyRuntime::builder().set("logging.output", "stderr");
    if let Some(path) = &args.config {
        runtime = runtime.config_file(path);
    }
    if let Some(profile) = &args.profile {
        runtime = runtime.profile(profile);
    }
    let runtime = runtime.build()?;

    let mut dispatcher = runtime.dispatcher_builder();
    dispatcher.conversation::<Onboarding>();
    dispatcher
        .add(hears("help").name("help").skips_conversation().handler(help))?
        .add(hears("cancel").name("cancel").stops_conversation().handler(cancel))?
        .add(hears("hello*").name("onboarding").handler(start_onboarding))?
        .add(hears_images().name("picture").handler(picture))?;
    dispatcher.hears("call me {name}", call_me)?;
    dispatcher.fallback(fallback);

    let runtime = runtime.with_dispatcher(dispatcher.build());
    let transport = ConsoleTransport::spawn(args.sender, args.channel);

    println!("Type `hello` to begin, `help` for commands, Ctrl+D to quit.");
    let stats = runtime.run(&transport).await?;

    info!(
        messages = stats.messages,
        failures = stats.failures,
        "Console bot finished"
    );
    Ok(())
}
