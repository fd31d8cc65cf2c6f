//! Console adapter for development/testing
//!
//! Every stdin line becomes a message event from the `console` user, who is
//! an admin of the bot.
//! `:react <message-id> <emoji> [author]` produces a reaction event instead.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::application::errors::BotError;
use crate::domain::entities::{InboundEvent, Origin, User};
use crate::domain::traits::EventSource;

const CHANNEL: &str = "console";

/// Console event source for local development
pub struct ConsoleAdapter {
    user: User,
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsoleAdapter {
    pub fn new() -> Self {
        Self {
            user: User::new("console").with_username("console").admin(),
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = user;
        self
    }

    fn parse_line(&self, line: &str) -> InboundEvent {
        if let Some(rest) = line.strip_prefix(":react ") {
            let parts: Vec<&str> = rest.split_whitespace().collect();
            if let [message_id, emoji, author @ ..] = parts.as_slice() {
                let author = author.first().map(|a| User::new(*a).with_username(*a));
                let user = self.user.clone();
                return InboundEvent::reaction(CHANNEL, user, *message_id, *emoji, author);
            }
        }
        InboundEvent::message(CHANNEL, self.user.clone(), line)
    }
}

impl Default for ConsoleAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for ConsoleAdapter {
    async fn next_event(&self) -> Result<Option<InboundEvent>, BotError> {
        let mut lines = self.lines.lock().await;
        loop {
            let line = lines
                .next_line()
                .await
                .map_err(|e| BotError::Source(format!("Failed to read stdin: {}", e)))?;
            match line {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(self.parse_line(line.trim()))),
                None => return Ok(None),
            }
        }
    }

    async fn send(&self, _origin: &Origin, content: &str) -> Result<(), BotError> {
        println!("[BOT] {}", content);
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}
