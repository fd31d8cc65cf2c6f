//! Event dispatcher - Routes inbound events to fragment handlers
//!
//! The loop pulls events one at a time, resolves every matching entry and
//! hands each one to a bounded worker pool. Permits are taken in delivery
//! order, so handoff order follows the source even though handlers may
//! finish out of order. A failing or panicking handler only costs its own
//! event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::context::{Invocation, Replier};
use super::parser::{Arguments, TriggerParser};
use super::registry::{Registry, RegistryState};
use crate::application::errors::{BotError, HandlerError, LifecycleError};
use crate::domain::entities::{InboundEvent, RegistrationEntry, TriggerKind};
use crate::domain::traits::EventSource;
use crate::infrastructure::storage::{NamespaceHandle, PersistenceStore};

/// Dispatcher tuning
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum handlers running at once
    pub workers: usize,
    /// How long in-flight handlers get to finish on shutdown
    pub shutdown_timeout: Duration,
    /// Generic reply sent when a command handler fails
    pub failure_reply: Option<String>,
    /// Skip command matching for messages sent by bots
    pub ignore_bots: bool,
    /// Pause after the event source reports an error
    pub retry_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            shutdown_timeout: Duration::from_secs(10),
            failure_reply: None,
            ignore_bots: true,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Per-handler outcome; only ever logged and counted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    HandlerError(String),
    NoMatch,
}

/// Counters reported when the loop stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub events: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub unmatched: u64,
}

#[derive(Default)]
struct Counters {
    events: AtomicU64,
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    unmatched: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            events: self.events.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
        }
    }
}

/// A matched entry plus the arguments it was matched with
#[derive(Debug, Clone)]
pub struct Route {
    pub entry: RegistrationEntry,
    pub args: Arguments,
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    store: Arc<PersistenceStore>,
    handles: HashMap<String, NamespaceHandle>,
    parser: TriggerParser,
    config: DispatcherConfig,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// The registry must already be finalized
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<PersistenceStore>,
        handles: HashMap<String, NamespaceHandle>,
        config: DispatcherConfig,
    ) -> Result<Self, LifecycleError> {
        if registry.state() != RegistryState::Serving {
            return Err(LifecycleError("dispatch before finalize".to_string()));
        }
        Ok(Self {
            registry,
            store,
            handles,
            parser: TriggerParser::default(),
            config,
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Every entry that should see `event`: the matching command first, then
    /// listeners for the event kind in registration order.
    pub fn route(&self, event: &InboundEvent) -> Vec<Route> {
        let mut routes = Vec::new();

        let from_bot = event.sender().is_some_and(|u| u.is_bot);
        if !(from_bot && self.config.ignore_bots) {
            if let Some(text) = self.parser.candidate(event) {
                if let Some(found) = self.registry.lookup(&TriggerKind::Command, text) {
                    routes.push(Route {
                        entry: found.entry.clone(),
                        args: self.parser.arguments(text, found.words),
                    });
                }
            }
        }

        for entry in self.registry.listeners(&event.kind) {
            let args = event
                .text()
                .map(|text| self.parser.arguments(text, 0))
                .unwrap_or_default();
            routes.push(Route {
                entry: entry.clone(),
                args,
            });
        }

        routes
    }

    /// Pull and dispatch events until the source closes or `shutdown` is
    /// set, then drain in-flight handlers and close the store.
    pub async fn run(
        &self,
        source: Arc<dyn EventSource>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<DispatchStats, BotError> {
        let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut tasks: JoinSet<DispatchOutcome> = JoinSet::new();

        info!(source = source.name(), workers = self.config.workers, "Dispatcher started");

        loop {
            while let Some(done) = tasks.try_join_next() {
                if let Err(e) = done {
                    error!("Dispatch task failed: {}", e);
                }
            }

            let next = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Shutdown requested, no longer pulling events");
                    break;
                }
                next = source.next_event() => next,
            };

            let event = match next {
                Ok(Some(event)) => event,
                Ok(None) => {
                    info!(source = source.name(), "Event source closed");
                    break;
                }
                Err(e) => {
                    error!(source = source.name(), "Failed to get next event: {}", e);
                    tokio::select! {
                        _ = wait_for_shutdown(&mut shutdown) => break,
                        _ = tokio::time::sleep(self.config.retry_delay) => continue,
                    }
                }
            };

            if !self.dispatch(event, &source, &permits, &mut tasks, &mut shutdown).await {
                break;
            }
        }

        self.drain(&mut tasks).await;

        if let Err(e) = self.store.close().await {
            warn!("Failed to close store: {}", e);
        }

        let stats = self.stats();
        info!(
            events = stats.events,
            dispatched = stats.dispatched,
            succeeded = stats.succeeded,
            failed = stats.failed,
            unmatched = stats.unmatched,
            "Dispatcher stopped"
        );
        Ok(stats)
    }

    /// Hand every route for `event` to the worker pool. Returns `false` when
    /// shutdown was requested while waiting for a free worker; the routes not
    /// yet handed off are dropped.
    async fn dispatch(
        &self,
        event: InboundEvent,
        source: &Arc<dyn EventSource>,
        permits: &Arc<Semaphore>,
        tasks: &mut JoinSet<DispatchOutcome>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        self.counters.events.fetch_add(1, Ordering::Relaxed);

        let routes = self.route(&event);
        if routes.is_empty() {
            debug!(
                event_id = %event.id,
                kind = %event.kind,
                outcome = ?DispatchOutcome::NoMatch,
                "No handler matched"
            );
            self.counters.unmatched.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        let event = Arc::new(event);
        let total = routes.len();
        for (handed_off, route) in routes.into_iter().enumerate() {
            let Some(store) = self.handles.get(&route.entry.owner).cloned() else {
                error!(fragment = %route.entry.owner, "No namespace handle for fragment");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            let permit = tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown) => {
                    warn!(
                        event_id = %event.id,
                        dropped = total - handed_off,
                        "Shutdown requested while all workers were busy, dropping routes"
                    );
                    return false;
                }
                permit = Arc::clone(permits).acquire_owned() => permit,
            };
            // the semaphore is never closed
            let Ok(permit) = permit else {
                break;
            };

            let invocation = Invocation {
                event: Arc::clone(&event),
                store,
                reply: Replier::new(Arc::clone(source), event.origin.clone()),
                kind: route.entry.kind.clone(),
                trigger: route.entry.trigger.text().to_string(),
                args: route.args,
                registry: Arc::clone(&self.registry),
            };
            let entry = route.entry;
            let counters = Arc::clone(&self.counters);
            let failure_reply = self.config.failure_reply.clone();

            self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = invoke(entry, invocation, failure_reply).await;
                match outcome {
                    DispatchOutcome::Success => counters.succeeded.fetch_add(1, Ordering::Relaxed),
                    _ => counters.failed.fetch_add(1, Ordering::Relaxed),
                };
                outcome
            });
        }
        true
    }

    async fn drain(&self, tasks: &mut JoinSet<DispatchOutcome>) {
        if tasks.is_empty() {
            return;
        }
        info!(in_flight = tasks.len(), "Waiting for in-flight handlers");

        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            while let Some(done) = tasks.join_next().await {
                if let Err(e) = done {
                    error!("Dispatch task failed: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "Handlers still running after shutdown timeout, aborting"
            );
            tasks.shutdown().await;
        }
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run one handler, containing any failure to this invocation
async fn invoke(
    entry: RegistrationEntry,
    invocation: Invocation,
    failure_reply: Option<String>,
) -> DispatchOutcome {
    let event = Arc::clone(&invocation.event);
    let reply = invocation.reply.clone();
    let handler = Arc::clone(&entry.handler);

    // a separate task so a panic surfaces as a JoinError instead of unwinding here
    let inner = tokio::spawn(async move { handler.handle(invocation).await });
    let _abort = AbortOnDrop(inner.abort_handle());

    let result = match inner.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(HandlerError::Panicked(panic_message(e.into_panic()))),
        Err(e) => Err(HandlerError::Failed(e.to_string())),
    };

    let err = match result {
        Ok(()) => {
            debug!(
                fragment = %entry.owner,
                trigger = %entry.trigger,
                event_id = %event.id,
                "Handler finished"
            );
            return DispatchOutcome::Success;
        }
        Err(err) => err,
    };

    let is_command = entry.kind == TriggerKind::Command;
    match &err {
        HandlerError::Usage(msg) => {
            info!(
                fragment = %entry.owner,
                trigger = %entry.trigger,
                event_id = %event.id,
                channel = %event.channel(),
                "Command rejected: {}", msg
            );
            if is_command {
                send_quietly(&reply, msg).await;
            }
        }
        other => {
            error!(
                fragment = %entry.owner,
                trigger = %entry.trigger,
                kind = %entry.kind,
                event_id = %event.id,
                channel = %event.channel(),
                user = ?event.sender().map(|u| u.id.as_str()),
                "Handler failed: {}", other
            );
            if let (true, Some(text)) = (is_command, failure_reply.as_deref()) {
                send_quietly(&reply, text).await;
            }
        }
    }

    DispatchOutcome::HandlerError(err.to_string())
}

async fn send_quietly(reply: &Replier, text: &str) {
    if let Err(e) = reply.send(text).await {
        warn!("Failed to send reply: {}", e);
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Resolves once the flag is set. A dropped sender means nobody can ask for
/// shutdown any more, so this then never resolves.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
