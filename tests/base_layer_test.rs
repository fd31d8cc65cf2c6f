//! Base layer integration tests: loader, registry, dispatcher and store
//! working together through the in-process channel adapter.
//! Run with: cargo test --test base_layer_test

use async_trait::async_trait;
use std::sync::{Arc, Once};

use fragbot::application::errors::{BotError, HandlerError, RegistryError, StorageError};
use fragbot::application::messaging::{DispatcherConfig, Invocation, Registry};
use fragbot::application::services::{BotRuntime, FragmentContext};
use fragbot::domain::entities::{InboundEvent, Namespace, Trigger, TriggerKind, User};
use fragbot::domain::traits::{Fragment, HandlerResult, KvBackend};
use fragbot::fragments::{KarmaFragment, PollFragment, RollFragment, SettingsFragment};
use fragbot::infrastructure::adapters::channel::ChannelSource;
use fragbot::infrastructure::storage::{NamespaceHandle, PersistenceStore, SqliteBackend};

static INIT: Once = Once::new();

fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn serial() -> DispatcherConfig {
    DispatcherConfig {
        workers: 1,
        failure_reply: Some("Something went wrong".to_string()),
        ..DispatcherConfig::default()
    }
}

fn msg(user: &str, text: &str) -> InboundEvent {
    InboundEvent::message("general", User::new(user).with_username(user), text)
}

/// A second fragment that also wants `!roll`
struct Dice;

impl Fragment for Dice {
    fn name(&self) -> &str {
        "dice"
    }

    fn setup(&self, ctx: &mut FragmentContext<'_>) -> Result<(), BotError> {
        let entry = ctx.command("roll", |inv: Invocation| async move {
            inv.reply.send("4").await
        });
        ctx.add(entry)?;
        Ok(())
    }
}

/// `!boom` always fails, `!ok` always answers, `!stash` touches the store
struct Flaky;

impl Fragment for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn setup(&self, ctx: &mut FragmentContext<'_>) -> Result<(), BotError> {
        let boom = ctx.command("boom", boom);
        ctx.add(boom)?;
        let ok = ctx.command("ok", ok);
        ctx.add(ok)?;
        let stash = ctx.command("stash", stash);
        ctx.add(stash)?;
        Ok(())
    }
}

async fn boom(_inv: Invocation) -> HandlerResult {
    Err(HandlerError::Failed("kaboom".to_string()))
}

async fn ok(inv: Invocation) -> HandlerResult {
    inv.reply.send("ok").await
}

async fn stash(inv: Invocation) -> HandlerResult {
    inv.store.put("last", &inv.args.rest).await?;
    inv.reply.send("stashed").await
}

/// Backend whose every call fails
struct DownBackend;

#[async_trait]
impl KvBackend for DownBackend {
    async fn get(&self, _: &str, _: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("disk on fire".to_string()))
    }
    async fn put(&self, _: &str, _: &str, _: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("disk on fire".to_string()))
    }
    async fn delete(&self, _: &str, _: &str) -> Result<bool, StorageError> {
        Err(StorageError::Unavailable("disk on fire".to_string()))
    }
    async fn keys(&self, _: &str) -> Result<Vec<String>, StorageError> {
        Err(StorageError::Unavailable("disk on fire".to_string()))
    }
}

#[tokio::test]
async fn test_two_fragments_registering_roll_fail_startup() {
    ensure_init();
    let (source, _tx) = ChannelSource::new("test");
    let result = BotRuntime::start(
        "!",
        vec![Box::new(RollFragment::default()) as Box<dyn Fragment>, Box::new(Dice)],
        Arc::new(PersistenceStore::in_memory()),
        Arc::new(source),
        DispatcherConfig::default(),
    );

    match result {
        Err(BotError::Registry(RegistryError::Collision(c))) => {
            assert_eq!(c.trigger, "!roll");
            assert!(c.involves("roll"));
            assert!(c.involves("dice"));
        }
        Err(other) => panic!("expected a collision, got {other}"),
        Ok(_) => panic!("startup should have failed"),
    }
}

#[test]
fn test_register_after_finalize_is_rejected() {
    let mut registry = Registry::new();
    registry.finalize().unwrap();

    let err = registry
        .register(
            TriggerKind::Command,
            Trigger::Prefix("!late".to_string()),
            "latecomer",
            Arc::new(ok),
        )
        .unwrap_err();
    assert!(matches!(err, RegistryError::Lifecycle(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_karma_gives_are_all_counted() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("bot.db");

    let (source, tx) = ChannelSource::new("test");
    let source = Arc::new(source);
    let backend = SqliteBackend::open(&db).unwrap();
    let store = Arc::new(PersistenceStore::new(Arc::new(backend)));
    let bot = BotRuntime::start(
        "!",
        vec![Box::new(KarmaFragment) as Box<dyn Fragment>],
        store,
        source.clone(),
        DispatcherConfig {
            workers: 16,
            ..DispatcherConfig::default()
        },
    )
    .unwrap();

    for i in 0..100 {
        tx.send(msg(&format!("user{i}"), "!karma give @Alice")).await.unwrap();
    }
    drop(tx);

    let stats = bot.wait().await.unwrap();
    assert_eq!(stats.succeeded, 100);
    assert_eq!(stats.failed, 0);
    assert_eq!(source.sent().len(), 100);

    // reopen the database the way a restarted bot would
    let backend = SqliteBackend::open(&db).unwrap();
    let reopened = Arc::new(PersistenceStore::new(Arc::new(backend)));
    let karma = NamespaceHandle::new(reopened, Namespace::fragment("karma").unwrap());
    assert_eq!(karma.get_json::<i64>("karma:alice").await.unwrap(), Some(100));
}

#[tokio::test]
async fn test_failing_handler_does_not_block_next_event() {
    ensure_init();
    let (source, tx) = ChannelSource::new("test");
    let source = Arc::new(source);
    let bot = BotRuntime::start(
        "!",
        vec![Box::new(Flaky) as Box<dyn Fragment>],
        Arc::new(PersistenceStore::in_memory()),
        source.clone(),
        serial(),
    )
    .unwrap();

    tx.send(msg("alice", "!boom")).await.unwrap();
    tx.send(msg("alice", "!ok")).await.unwrap();
    drop(tx);

    let stats = bot.wait().await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(source.sent_texts(), vec!["Something went wrong", "ok"]);
}

#[tokio::test]
async fn test_unmatched_event_gets_no_reply() {
    ensure_init();
    let (source, tx) = ChannelSource::new("test");
    let source = Arc::new(source);
    let bot = BotRuntime::start(
        "!",
        vec![Box::new(Flaky) as Box<dyn Fragment>],
        Arc::new(PersistenceStore::in_memory()),
        source.clone(),
        serial(),
    )
    .unwrap();

    tx.send(msg("alice", "!nothing here")).await.unwrap();
    tx.send(msg("alice", "just chatting")).await.unwrap();
    drop(tx);

    let stats = bot.wait().await.unwrap();
    assert_eq!(stats.events, 2);
    assert_eq!(stats.unmatched, 2);
    assert!(source.sent().is_empty());
}

#[tokio::test]
async fn test_values_survive_restart() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested").join("bot.db");

    {
        let (source, tx) = ChannelSource::new("test");
        let backend = SqliteBackend::open(&db).unwrap();
        let store = Arc::new(PersistenceStore::new(Arc::new(backend)));
        let bot = BotRuntime::start(
            "!",
            vec![Box::new(Flaky) as Box<dyn Fragment>],
            store,
            Arc::new(source),
            serial(),
        )
        .unwrap();
        tx.send(msg("alice", "!stash remember me")).await.unwrap();
        drop(tx);
        bot.wait().await.unwrap();
    }

    let backend = SqliteBackend::open(&db).unwrap();
    let reopened = Arc::new(PersistenceStore::new(Arc::new(backend)));
    let flaky = NamespaceHandle::new(reopened, Namespace::fragment("flaky").unwrap());
    assert_eq!(flaky.get("last").await.unwrap().as_deref(), Some("remember me"));
}

#[tokio::test]
async fn test_unavailable_store_surfaces_as_handler_failure() {
    ensure_init();
    let (source, tx) = ChannelSource::new("test");
    let source = Arc::new(source);
    let bot = BotRuntime::start(
        "!",
        vec![Box::new(Flaky) as Box<dyn Fragment>],
        Arc::new(PersistenceStore::new(Arc::new(DownBackend))),
        source.clone(),
        serial(),
    )
    .unwrap();

    tx.send(msg("alice", "!stash x")).await.unwrap();
    tx.send(msg("alice", "!ok")).await.unwrap();
    drop(tx);

    let stats = bot.wait().await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(source.sent_texts(), vec!["Something went wrong", "ok"]);
}

#[tokio::test]
async fn test_thumbs_up_reaction_gives_karma() {
    ensure_init();
    let (source, tx) = ChannelSource::new("test");
    let source = Arc::new(source);
    let bot = BotRuntime::start(
        "!",
        vec![Box::new(KarmaFragment) as Box<dyn Fragment>],
        Arc::new(PersistenceStore::in_memory()),
        source.clone(),
        serial(),
    )
    .unwrap();

    let bob = User::new("bob").with_username("bob");
    let alice = User::new("alice").with_username("alice");
    tx.send(InboundEvent::reaction("general", bob.clone(), "m1", "👍", Some(alice.clone())))
        .await
        .unwrap();
    // own message and other emoji do not count
    tx.send(InboundEvent::reaction("general", alice.clone(), "m2", "👍", Some(alice)))
        .await
        .unwrap();
    tx.send(InboundEvent::reaction("general", bob, "m1", "🎉", None))
        .await
        .unwrap();
    tx.send(msg("carol", "!karma alice")).await.unwrap();
    drop(tx);

    bot.wait().await.unwrap();
    assert_eq!(source.sent_texts(), vec!["alice has 1 karma"]);
}

#[tokio::test]
async fn test_poll_votes_once_per_user() {
    ensure_init();
    let (source, tx) = ChannelSource::new("test");
    let source = Arc::new(source);
    let bot = BotRuntime::start(
        "!",
        vec![Box::new(PollFragment) as Box<dyn Fragment>],
        Arc::new(PersistenceStore::in_memory()),
        source.clone(),
        serial(),
    )
    .unwrap();

    tx.send(msg("alice", "!poll --notify Lunch? | Pizza | Sushi")).await.unwrap();
    tx.send(msg("alice", "!vote 1 1")).await.unwrap();
    tx.send(msg("bob", "!vote 1 2")).await.unwrap();
    tx.send(msg("alice", "!vote 1 2")).await.unwrap();
    tx.send(msg("bob", "!vote 1 9")).await.unwrap();
    tx.send(msg("bob", "!poll results 1")).await.unwrap();
    drop(tx);

    bot.wait().await.unwrap();
    let sent = source.sent_texts();
    assert!(sent[0].starts_with("Poll #1: Lunch?"));
    assert_eq!(sent[3], "Vote on #1 changed to Sushi");
    assert_eq!(sent[4], "Poll #1 has options 1 to 2");
    assert_eq!(sent[5], "Poll #1: Lunch? (2 votes)\nPizza: 0\nSushi: 2");
}

fn in_channel(user: User, channel: &str, text: &str) -> InboundEvent {
    InboundEvent::message(channel, user, text).with_server("guild")
}

#[tokio::test]
async fn test_settings_switch_fragments_per_server_and_channel() {
    ensure_init();
    let (source, tx) = ChannelSource::new("test");
    let source = Arc::new(source);
    let bot = BotRuntime::start(
        "!",
        vec![
            Box::new(SettingsFragment) as Box<dyn Fragment>,
            Box::new(RollFragment::default()),
            Box::new(PollFragment),
        ],
        Arc::new(PersistenceStore::in_memory()),
        source.clone(),
        serial(),
    )
    .unwrap();
    assert!(bot.registry().setting("enable_poll").is_some());
    assert!(bot.registry().setting("enable_roll").is_some());

    let admin = User::new("root").with_username("root").admin();
    let alice = User::new("alice").with_username("alice");
    let events = [
        in_channel(alice.clone(), "general", "!settings set server enable_poll off"),
        in_channel(admin.clone(), "general", "!settings set server enable_poll off"),
        in_channel(alice.clone(), "general", "!poll Lunch?"),
        in_channel(admin.clone(), "random", "!settings set channel enable_roll no"),
        in_channel(alice.clone(), "random", "!roll 5"),
        in_channel(alice.clone(), "random", "[[5]]"),
        in_channel(alice.clone(), "general", "!roll 5"),
        in_channel(admin.clone(), "general", "!settings set channel enable_poll on"),
        in_channel(admin, "random", "!settings reset channel enable_roll"),
        in_channel(alice, "random", "!roll 5"),
    ];
    for event in events {
        tx.send(event).await.unwrap();
    }
    drop(tx);

    bot.wait().await.unwrap();
    assert_eq!(
        source.sent_texts(),
        vec![
            "Only admins can manage settings",
            "enable_poll set to 0 for this server",
            "!poll is switched off here (enable_poll)",
            "enable_roll set to 0 for this channel",
            "!roll is switched off here (enable_roll)",
            "alice 5 → 5",
            "enable_poll can only be set for the whole server",
            "enable_roll cleared for this channel",
            "alice 5 → 5",
        ]
    );
}
