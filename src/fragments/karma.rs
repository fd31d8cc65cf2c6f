//! `karma` - per-user karma counters
//!
//! Karma lives under `karma:<user>` in the fragment's namespace, given karma
//! under `given:<user>`. Every change goes through `update_json`, so
//! concurrent gives are never lost.

use crate::application::errors::{BotError, HandlerError};
use crate::application::messaging::Invocation;
use crate::application::services::FragmentContext;
use crate::domain::entities::{EventKind, Payload, User};
use crate::domain::traits::{Fragment, HandlerResult};
use crate::infrastructure::storage::NamespaceHandle;

const KARMA_PREFIX: &str = "karma:";
const GIVEN_PREFIX: &str = "given:";
const UPVOTE: &str = "👍";
const TOP_LIMIT: usize = 5;

pub struct KarmaFragment;

impl Fragment for KarmaFragment {
    fn name(&self) -> &str {
        "karma"
    }

    fn description(&self) -> &str {
        "Give and track karma"
    }

    fn setup(&self, ctx: &mut FragmentContext<'_>) -> Result<(), BotError> {
        let show = ctx
            .command("karma", show)
            .with_description("Show karma for yourself or someone else")
            .with_usage(format!("{} [user]", ctx.prefixed("karma")));
        ctx.add(show)?;

        let give = ctx
            .command("karma give", give)
            .with_description("Give one karma to someone")
            .with_usage(format!("{} <user>", ctx.prefixed("karma give")));
        ctx.add(give)?;

        let top = ctx
            .command("karma top", top)
            .with_description("Karma leaderboard");
        ctx.add(top)?;

        ctx.listen(EventKind::ReactionAdd, "upvote", upvote)?;
        Ok(())
    }
}

/// Normalised storage key for a user mention
pub fn user_key(name: &str) -> String {
    name.trim().trim_start_matches('@').to_lowercase()
}

/// Add one karma to `to` and record that `from` gave it; returns the new score
pub async fn award(store: &NamespaceHandle, from: &User, to: &str) -> Result<i64, HandlerError> {
    let score = store
        .update_json::<i64, _>(&format!("{}{}", KARMA_PREFIX, to), |n| *n += 1)
        .await?;
    store
        .update_json::<i64, _>(&format!("{}{}", GIVEN_PREFIX, from.key()), |n| *n += 1)
        .await?;
    Ok(score)
}

pub async fn score(store: &NamespaceHandle, user: &str) -> Result<i64, HandlerError> {
    Ok(store
        .get_json::<i64>(&format!("{}{}", KARMA_PREFIX, user))
        .await?
        .unwrap_or(0))
}

async fn give(inv: Invocation) -> HandlerResult {
    let target = user_key(inv.require_arg(0, "karma give <user>")?);
    let Some(sender) = inv.sender() else {
        return Err(HandlerError::Failed("karma given by an unknown user".to_string()));
    };
    if target.is_empty() {
        return Err(HandlerError::Usage("Usage: karma give <user>".to_string()));
    }
    if target == sender.key() {
        return Err(HandlerError::Usage("You can't give karma to yourself".to_string()));
    }

    let total = award(&inv.store, sender, &target).await?;
    inv.reply.send(format!("{} now has {} karma", target, total)).await
}

async fn show(inv: Invocation) -> HandlerResult {
    let target = match inv.arg(0) {
        Some(name) => user_key(name),
        None => match inv.sender() {
            Some(user) => user.key(),
            None => return Err(HandlerError::Usage("Usage: karma <user>".to_string())),
        },
    };
    let total = score(&inv.store, &target).await?;
    inv.reply.send(format!("{} has {} karma", target, total)).await
}

async fn top(inv: Invocation) -> HandlerResult {
    let mut board = Vec::new();
    for key in inv.store.keys().await? {
        let Some(user) = key.strip_prefix(KARMA_PREFIX) else {
            continue;
        };
        if let Some(n) = inv.store.get_json::<i64>(&key).await? {
            board.push((user.to_string(), n));
        }
    }

    if board.is_empty() {
        return inv.reply.send("Nobody has any karma yet").await;
    }

    board.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let lines: Vec<String> = board
        .iter()
        .take(TOP_LIMIT)
        .enumerate()
        .map(|(i, (user, n))| format!("{}. {} ({})", i + 1, user, n))
        .collect();
    inv.reply.send(format!("Karma leaderboard:\n{}", lines.join("\n"))).await
}

/// A 👍 on someone's message counts as giving them karma
async fn upvote(inv: Invocation) -> HandlerResult {
    let Payload::Reaction { emoji, author: Some(author), .. } = &inv.event.payload else {
        return Ok(());
    };
    let Some(reactor) = inv.sender() else {
        return Ok(());
    };
    if emoji != UPVOTE || reactor.is_bot || author.is_bot || reactor.key() == author.key() {
        return Ok(());
    }

    award(&inv.store, reactor, &author.key()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Namespace;
    use crate::infrastructure::storage::PersistenceStore;
    use std::sync::Arc;

    fn store() -> NamespaceHandle {
        let store = Arc::new(PersistenceStore::in_memory());
        NamespaceHandle::new(store, Namespace::fragment("karma").unwrap())
    }

    #[test]
    fn test_user_key_strips_mention() {
        assert_eq!(user_key(" @Alice "), "alice");
        assert_eq!(user_key("bob"), "bob");
    }

    #[tokio::test]
    async fn test_award_tracks_both_sides() {
        let store = store();
        let bob = User::new("1").with_username("Bob");
        assert_eq!(award(&store, &bob, "alice").await.unwrap(), 1);
        assert_eq!(award(&store, &bob, "alice").await.unwrap(), 2);
        assert_eq!(score(&store, "alice").await.unwrap(), 2);
        assert_eq!(store.get_json::<i64>("given:bob").await.unwrap(), Some(2));
        assert_eq!(score(&store, "nobody").await.unwrap(), 0);
    }
}
