//! `poll` - simple polls with one vote per user

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::application::errors::{BotError, HandlerError};
use crate::application::messaging::Invocation;
use crate::application::services::FragmentContext;
use crate::domain::traits::{Fragment, HandlerResult};

const NEXT_ID: &str = "next-id";
const MAX_OPTIONS: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub question: String,
    pub options: Vec<String>,
    /// Voter key to 1-based option number
    pub votes: BTreeMap<String, usize>,
}

impl Poll {
    pub fn tally(&self) -> Vec<usize> {
        let mut counts = vec![0; self.options.len()];
        for &choice in self.votes.values() {
            if let Some(c) = choice.checked_sub(1).and_then(|i| counts.get_mut(i)) {
                *c += 1;
            }
        }
        counts
    }
}

/// Parsed `poll` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub question: String,
    pub options: Vec<String>,
    pub notify: bool,
}

/// Parse `[--notify] [--] question | option | option ...`. With no options
/// the poll is a yes/no question.
pub fn parse_request(rest: &str) -> Result<PollRequest, String> {
    let mut notify = false;
    let mut text = rest.trim();
    while text.starts_with('-') {
        let end = text.find(char::is_whitespace).unwrap_or(text.len());
        let flag = &text[..end];
        text = text[end..].trim_start();
        match flag {
            "--" => break,
            "--notify" => notify = true,
            other => return Err(format!("Unknown flag {}", other)),
        }
    }

    let mut parts = text.split('|').map(str::trim);
    let question = parts.next().unwrap_or_default().to_string();
    if question.is_empty() {
        return Err("A poll needs a question".to_string());
    }

    let mut options: Vec<String> = parts.filter(|p| !p.is_empty()).map(str::to_string).collect();
    if options.is_empty() {
        options = vec!["Yes".to_string(), "No".to_string()];
    }
    if options.len() > MAX_OPTIONS {
        return Err(format!("At most {} options", MAX_OPTIONS));
    }

    Ok(PollRequest {
        question,
        options,
        notify,
    })
}

pub struct PollFragment;

impl Fragment for PollFragment {
    fn name(&self) -> &str {
        "poll"
    }

    fn description(&self) -> &str {
        "Create polls and vote on them"
    }

    fn setup(&self, ctx: &mut FragmentContext<'_>) -> Result<(), BotError> {
        let enabled = ctx.toggle("enable_poll", "Allow creating polls")?;
        let create = ctx
            .command("poll", enabled.gate(create))
            .with_description("Create a poll; accepts --notify before the question")
            .with_usage(format!("{} Lunch? | Pizza | Sushi", ctx.prefixed("poll")));
        ctx.add(create)?;

        let results = ctx
            .command("poll results", results)
            .with_description("Show poll results")
            .with_usage(format!("{} <id>", ctx.prefixed("poll results")));
        ctx.add(results)?;

        let vote = ctx
            .command("vote", vote)
            .with_description("Vote on a poll")
            .with_usage(format!("{} <id> <option number>", ctx.prefixed("vote")));
        ctx.add(vote)?;
        Ok(())
    }
}

fn poll_key(id: u64) -> String {
    format!("poll:{}", id)
}

fn parse_id(raw: &str) -> Result<u64, HandlerError> {
    raw.trim_start_matches('#')
        .parse()
        .map_err(|_| HandlerError::Usage(format!("Not a poll id: {}", raw)))
}

async fn create(inv: Invocation) -> HandlerResult {
    let request = parse_request(&inv.args.rest).map_err(HandlerError::Usage)?;
    if request.notify {
        // the console adapter has nothing to notify with
        debug!(channel = %inv.event.channel(), "Poll notify flag ignored");
    }

    let id = inv.store.update_json::<u64, _>(NEXT_ID, |n| *n += 1).await?;
    let poll = Poll {
        question: request.question,
        options: request.options,
        votes: BTreeMap::new(),
    };
    inv.store.put_json(&poll_key(id), &poll).await?;

    let mut text = format!("Poll #{}: {}", id, poll.question);
    for (i, option) in poll.options.iter().enumerate() {
        text.push_str(&format!("\n{}. {}", i + 1, option));
    }
    text.push_str(&format!("\nVote with: vote {} <number>", id));
    inv.reply.send(text).await
}

async fn vote(inv: Invocation) -> HandlerResult {
    let id = parse_id(inv.require_arg(0, "vote <id> <option number>")?)?;
    let choice: usize = inv
        .require_arg(1, "vote <id> <option number>")?
        .parse()
        .map_err(|_| HandlerError::Usage("Option must be a number".to_string()))?;
    let Some(voter) = inv.sender().map(|u| u.key()) else {
        return Err(HandlerError::Failed("vote from an unknown user".to_string()));
    };

    let key = poll_key(id);
    let Some(poll) = inv.store.get_json::<Poll>(&key).await? else {
        return Err(HandlerError::Usage(format!("No poll #{}", id)));
    };
    if choice == 0 || choice > poll.options.len() {
        return Err(HandlerError::Usage(format!(
            "Poll #{} has options 1 to {}",
            id,
            poll.options.len()
        )));
    }

    // options never change after creation, only the vote map does
    let mut previous = None;
    inv.store
        .update_json::<Poll, _>(&key, |p| previous = p.votes.insert(voter, choice))
        .await?;

    let picked = &poll.options[choice - 1];
    let text = match previous {
        Some(old) if old != choice => format!("Vote on #{} changed to {}", id, picked),
        Some(_) => format!("You already voted for {}", picked),
        None => format!("Vote on #{} recorded: {}", id, picked),
    };
    inv.reply.send(text).await
}

async fn results(inv: Invocation) -> HandlerResult {
    let id = parse_id(inv.require_arg(0, "poll results <id>")?)?;
    let Some(poll) = inv.store.get_json::<Poll>(&poll_key(id)).await? else {
        return Err(HandlerError::Usage(format!("No poll #{}", id)));
    };

    let mut text = format!("Poll #{}: {} ({} votes)", id, poll.question, poll.votes.len());
    for (option, count) in poll.options.iter().zip(poll.tally()) {
        text.push_str(&format!("\n{}: {}", option, count));
    }
    inv.reply.send(text).await
}
