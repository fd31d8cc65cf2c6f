//! Bot runtime - wires loader, store and dispatcher together
//!
//! `start` runs the build phase synchronously and only then spawns the
//! dispatch loop, so a collision or a failed fragment never serves a single
//! event.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use super::loader::FragmentLoader;
use crate::application::errors::BotError;
use crate::application::messaging::{DispatchStats, Dispatcher, DispatcherConfig, Registry};
use crate::domain::traits::{EventSource, Fragment};
use crate::fragments;
use crate::infrastructure::config::Config;
use crate::infrastructure::storage::{PersistenceStore, SqliteBackend};

pub struct BotRuntime;

impl BotRuntime {
    /// Load `fragments`, finalize the registry and start dispatching events
    /// from `source` on the current tokio runtime.
    pub fn start(
        prefix: &str,
        fragments: Vec<Box<dyn Fragment>>,
        store: Arc<PersistenceStore>,
        source: Arc<dyn EventSource>,
        config: DispatcherConfig,
    ) -> Result<RunningBot, BotError> {
        let loaded = FragmentLoader::new(prefix, Arc::clone(&store)).load(&fragments)?;
        info!(
            fragments = loaded.order.len(),
            registrations = loaded.registry.len(),
            "Fragments loaded"
        );

        let registry = Arc::clone(&loaded.registry);
        let dispatcher = Dispatcher::new(loaded.registry, store, loaded.handles, config)
            .map_err(|e| BotError::Internal(e.to_string()))?;

        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { dispatcher.run(source, rx).await });

        Ok(RunningBot {
            shutdown,
            handle,
            registry,
        })
    }

    /// Open the configured database, resolve fragments by name and start
    pub fn from_config(
        config: &Config,
        source: Arc<dyn EventSource>,
    ) -> Result<RunningBot, BotError> {
        config.validate()?;
        let backend = SqliteBackend::open(&config.storage.path)?;
        let store = Arc::new(PersistenceStore::new(Arc::new(backend)));
        let fragments = fragments::resolve(&config.fragments)?;

        Self::start(
            &config.bot.prefix,
            fragments,
            store,
            source,
            config.dispatcher.to_dispatcher_config(),
        )
    }
}

/// Handle on a started bot
pub struct RunningBot {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<Result<DispatchStats, BotError>>,
    registry: Arc<Registry>,
}

impl RunningBot {
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Stop pulling events, let in-flight handlers finish, close the store
    pub async fn shutdown(self) -> Result<DispatchStats, BotError> {
        if self.shutdown.send(true).is_err() {
            warn!("Dispatcher already stopped");
        }
        Self::joined(self.handle.await)
    }

    /// Wait for the loop to end on its own (source closed)
    pub async fn wait(self) -> Result<DispatchStats, BotError> {
        Self::joined(self.handle.await)
    }

    /// Run until the source closes or `signal` resolves, then shut down
    pub async fn run_until<F>(mut self, signal: F) -> Result<DispatchStats, BotError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            joined = &mut self.handle => return Self::joined(joined),
            _ = signal => info!("Shutdown signal received"),
        }
        self.shutdown().await
    }

    fn joined(
        joined: Result<Result<DispatchStats, BotError>, JoinError>,
    ) -> Result<DispatchStats, BotError> {
        joined.map_err(|e| BotError::Internal(format!("Dispatcher task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::messaging::Invocation;
    use crate::application::services::FragmentContext;
    use crate::domain::entities::{InboundEvent, User};
    use crate::domain::traits::HandlerResult;
    use crate::infrastructure::adapters::channel::ChannelSource;

    struct Echo;

    impl Fragment for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn setup(&self, ctx: &mut FragmentContext<'_>) -> Result<(), BotError> {
            let entry = ctx.command("echo", echo);
            ctx.add(entry)?;
            Ok(())
        }
    }

    async fn echo(inv: Invocation) -> HandlerResult {
        inv.reply.send(inv.args.rest.clone()).await
    }

    #[tokio::test]
    async fn test_runs_until_source_closes() {
        let (source, tx) = ChannelSource::new("test");
        let source = Arc::new(source);
        let bot = BotRuntime::start(
            "!",
            vec![Box::new(Echo) as Box<dyn Fragment>],
            Arc::new(PersistenceStore::in_memory()),
            source.clone(),
            DispatcherConfig::default(),
        )
        .unwrap();
        assert!(bot.registry().command("echo").is_some());

        tx.send(InboundEvent::message("c", User::new("1"), "!echo hi there")).await.unwrap();
        drop(tx);

        let stats = bot.wait().await.unwrap();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(source.sent_texts(), vec!["hi there"]);
    }

    #[tokio::test]
    async fn test_signal_stops_the_bot() {
        let (source, _tx) = ChannelSource::new("test");
        let store = Arc::new(PersistenceStore::in_memory());
        let bot = BotRuntime::start(
            "!",
            vec![Box::new(Echo) as Box<dyn Fragment>],
            Arc::clone(&store),
            Arc::new(source),
            DispatcherConfig::default(),
        )
        .unwrap();

        let stats = bot.run_until(async {}).await.unwrap();
        assert_eq!(stats.events, 0);
        assert!(store.is_closed());
    }
}
