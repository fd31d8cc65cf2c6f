use crate::application::errors::BotError;
use crate::application::services::FragmentContext;

/// Fragment trait - a self-contained unit of bot behaviour
///
/// A fragment knows nothing about other fragments. Its only chance to hook
/// into the bot is `setup`, called once during the build phase.
pub trait Fragment: Send + Sync {
    /// Unique name; also the fragment's persistence namespace
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str {
        ""
    }

    /// Register commands/listeners and declare shared namespaces
    fn setup(&self, ctx: &mut FragmentContext<'_>) -> Result<(), BotError>;
}
