//! In-process channel adapter, used by tests and for embedding the bot

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::application::errors::BotError;
use crate::domain::entities::{InboundEvent, Origin};
use crate::domain::traits::EventSource;

/// A reply the bot sent through the adapter
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub channel_id: String,
    pub text: String,
}

/// Event source fed from an mpsc channel. Replies are recorded in memory.
pub struct ChannelSource {
    name: String,
    receiver: tokio::sync::Mutex<mpsc::Receiver<InboundEvent>>,
    sent: Mutex<Vec<SentMessage>>,
}

impl ChannelSource {
    pub fn new(name: impl Into<String>) -> (Self, mpsc::Sender<InboundEvent>) {
        Self::with_capacity(name, 1024)
    }

    pub fn with_capacity(
        name: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Sender<InboundEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let source = Self {
            name: name.into(),
            receiver: tokio::sync::Mutex::new(rx),
            sent: Mutex::new(Vec::new()),
        };
        (source, tx)
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.text).collect()
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next_event(&self) -> Result<Option<InboundEvent>, BotError> {
        let mut receiver = self.receiver.lock().await;
        Ok(receiver.recv().await)
    }

    async fn send(&self, origin: &Origin, content: &str) -> Result<(), BotError> {
        let mut sent = self.sent.lock()
            .map_err(|_| BotError::Internal("Lock poisoned".to_string()))?;
        sent.push(SentMessage {
            channel_id: origin.channel_id.clone(),
            text: content.to_string(),
        });
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
