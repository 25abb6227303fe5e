//! A transport reading from stdin and printing to stdout.
//!
//! Each line is one message from the configured sender. A few slash
//! commands stand in for attachments:
//!
//! ```text
//! /image <url>        an image without text
//! /video <url>        a video without text
//! /audio <url>        an audio clip without text
//! /location <lat> <lng>
//! /reply <value>      press a suggested-reply button
//! ```

use std::fmt;

use parley::core::{Attachment, TransportError, TransportResult};
use parley::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

pub struct ConsoleTransport {
    sender: String,
    channel: String,
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl ConsoleTransport {
    /// Starts reading stdin in the background.
    pub fn spawn(sender: impl Into<String>, channel: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
        });

        Self {
            sender: sender.into(),
            channel: channel.into(),
            lines: Mutex::new(rx),
        }
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    async fn receive(&self) -> TransportResult<Vec<IncomingMessage>> {
        let mut lines = self.lines.lock().await;
        let mut batch = Vec::new();
        loop {
            match lines.try_recv() {
                Ok(line) => match parse_line(&line, &self.sender, &self.channel) {
                    Ok(message) => batch.push(message),
                    Err(e) => eprintln!("{e}"),
                },
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if batch.is_empty() {
                        return Err(TransportError::Closed(self.name().to_string()));
                    }
                    break;
                }
            }
        }
        Ok(batch)
    }

    async fn send(&self, message: OutgoingMessage, _session: &SessionKey) -> TransportResult<()> {
        let mut out = format!("bot> {}", message.text());
        if let Some(attachment) = message.attachment() {
            out.push_str(&format!(" {}", DisplayAttachment(attachment)));
        }
        if !message.buttons().is_empty() {
            out.push_str("\n    ");
            for button in message.buttons() {
                out.push_str(&format!("[{}] ", button.text));
            }
            out.push_str("(answer with /reply <value>)");
        }
        println!("{out}");
        Ok(())
    }
}

struct DisplayAttachment<'a>(&'a Attachment);

impl fmt::Display for DisplayAttachment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Attachment::Image(url) => write!(f, "<image {url}>"),
            Attachment::Video(url) => write!(f, "<video {url}>"),
            Attachment::Audio(url) => write!(f, "<audio {url}>"),
            Attachment::File(url) => write!(f, "<file {url}>"),
            Attachment::Location(location) => write!(f, "<location {location}>"),
        }
    }
}

/// Turns one input line into a message.
fn parse_line(line: &str, sender: &str, channel: &str) -> Result<IncomingMessage, String> {
    let line = line.trim();
    let empty = || IncomingMessage::new("", sender, channel);

    let Some(rest) = line.strip_prefix('/') else {
        return Ok(IncomingMessage::new(line, sender, channel));
    };
    let (command, arg) = rest.split_once(' ').unwrap_or((rest, ""));
    let arg = arg.trim();

    match command {
        "image" if !arg.is_empty() => Ok(empty().with_images([arg])),
        "video" if !arg.is_empty() => Ok(empty().with_videos([arg])),
        "audio" if !arg.is_empty() => Ok(empty().with_audio([arg])),
        "reply" if !arg.is_empty() => Ok(empty().with_reply_value(arg)),
        "location" => {
            let mut parts = arg.split_whitespace().map(str::parse::<f64>);
            match (parts.next(), parts.next()) {
                (Some(Ok(lat)), Some(Ok(lng))) => {
                    Ok(empty().with_location(Location::new(lat, lng)))
                }
                _ => Err("usage: /location <lat> <lng>".to_string()),
            }
        }
        "image" | "video" | "audio" | "reply" => Err(format!("usage: /{command} <value>")),
        _ => Ok(IncomingMessage::new(line, sender, channel)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text() {
        let msg = parse_line("  hello there ", "me", "console").unwrap();
        assert_eq!(msg.text(), "hello there");
        assert_eq!(msg.sender(), "me");
    }

    #[test]
    fn attachments() {
        let msg = parse_line("/image http://x/cat.png", "me", "console").unwrap();
        assert!(msg.text().is_empty());
        assert_eq!(msg.images(), ["http://x/cat.png"]);

        let msg = parse_line("/location 41.123 -12.123", "me", "console").unwrap();
        assert_eq!(msg.location(), Some(Location::new(41.123, -12.123)));

        let msg = parse_line("/reply yes", "me", "console").unwrap();
        assert_eq!(msg.reply_value(), Some("yes"));
    }

    #[test]
    fn bad_commands() {
        assert!(parse_line("/location north", "me", "console").is_err());
        assert!(parse_line("/image", "me", "console").is_err());
        assert_eq!(parse_line("/start", "me", "console").unwrap().text(), "/start");
    }
}
