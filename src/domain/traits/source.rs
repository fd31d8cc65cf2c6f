use async_trait::async_trait;
use crate::domain::entities::{InboundEvent, Origin};
use crate::application::errors::BotError;

/// EventSource trait - abstraction for chat platform transports
///
/// The dispatcher only ever pulls events and pushes replies through this
/// trait; connection handling and authentication stay inside the adapter.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Wait for the next inbound event. `Ok(None)` means the source closed.
    async fn next_event(&self) -> Result<Option<InboundEvent>, BotError>;

    /// Send a reply into the channel an event came from
    async fn send(&self, origin: &Origin, content: &str) -> Result<(), BotError>;

    /// Adapter name, for logs
    fn name(&self) -> &str;
}
