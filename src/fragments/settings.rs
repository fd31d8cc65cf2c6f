//! `settings` - list and change the settings other fragments declare
//!
//! Only admins may use these commands.

use crate::application::errors::{BotError, HandlerError};
use crate::application::messaging::Invocation;
use crate::application::services::{FragmentContext, Settings};
use crate::domain::entities::{SettingScope, SettingSpec};
use crate::domain::traits::{Fragment, HandlerResult};

pub struct SettingsFragment;

impl Fragment for SettingsFragment {
    fn name(&self) -> &str {
        "settings"
    }

    fn description(&self) -> &str {
        "View and change per-server and per-channel settings"
    }

    fn setup(&self, ctx: &mut FragmentContext<'_>) -> Result<(), BotError> {
        let settings = ctx.settings();

        let store = settings.clone();
        let list = ctx
            .command("settings", move |inv: Invocation| list(inv, store.clone()))
            .with_description("List settings and their value in this channel");
        ctx.add(list)?;

        let store = settings.clone();
        let here = ctx
            .command("settings here", move |inv: Invocation| here(inv, store.clone()))
            .with_description("Show the server and channel values of a setting")
            .with_usage(format!("{} <setting>", ctx.prefixed("settings here")));
        ctx.add(here)?;

        let store = settings.clone();
        let set = ctx
            .command("settings set", move |inv: Invocation| set(inv, store.clone()))
            .with_description("Set a setting for the server or this channel; no value clears it")
            .with_usage(format!(
                "{} <server|channel> <setting> [value]",
                ctx.prefixed("settings set")
            ));
        ctx.add(set)?;

        let reset = ctx
            .command("settings reset", move |inv: Invocation| reset(inv, settings.clone()))
            .with_description("Clear a setting for the server or this channel")
            .with_usage(format!(
                "{} <server|channel> <setting>",
                ctx.prefixed("settings reset")
            ));
        ctx.add(reset)?;
        Ok(())
    }
}

fn require_admin(inv: &Invocation) -> Result<(), HandlerError> {
    match inv.sender() {
        Some(user) if user.is_admin => Ok(()),
        _ => Err(HandlerError::Usage("Only admins can manage settings".to_string())),
    }
}

fn lookup<'a>(inv: &'a Invocation, name: &str) -> Result<&'a SettingSpec, HandlerError> {
    inv.registry
        .setting(name)
        .ok_or_else(|| HandlerError::Usage(format!("{} is not a setting", name)))
}

fn parse_scope(raw: &str) -> Result<SettingScope, HandlerError> {
    SettingScope::parse(raw).ok_or_else(|| {
        HandlerError::Usage(format!("{} is not a scope; use server or channel", raw))
    })
}

/// `text` without its first `n` words
fn after_words(text: &str, n: usize) -> &str {
    let mut rest = text.trim_start();
    for _ in 0..n {
        rest = rest
            .find(char::is_whitespace)
            .map_or("", move |i| rest[i..].trim_start());
    }
    rest.trim_end()
}

fn show(value: Option<String>) -> String {
    value.unwrap_or_else(|| "unset".to_string())
}

async fn list(inv: Invocation, settings: Settings) -> HandlerResult {
    require_admin(&inv)?;

    let specs: Vec<&SettingSpec> = inv.registry.settings().collect();
    if specs.is_empty() {
        return inv.reply.send("No settings available").await;
    }

    let mut text = format!("{} settings available", specs.len());
    for spec in specs {
        let value = settings.get(spec, &inv.event).await?;
        text.push_str(&format!("\n{} ({}", spec.name, spec.kind));
        if spec.per_channel {
            text.push_str(", per channel");
        }
        text.push(')');
        if let Some(description) = &spec.description {
            text.push_str(&format!(": {}", description));
        }
        text.push_str(&format!("\n  value: {}", show(value)));
    }
    inv.reply.send(text).await
}

async fn here(inv: Invocation, settings: Settings) -> HandlerResult {
    require_admin(&inv)?;
    let name = inv.require_arg(0, "settings here <setting>")?;
    let spec = lookup(&inv, name)?;

    let server = settings.value_at(spec, SettingScope::Server, &inv.event).await?;
    let mut text = format!("{}\n  server: {}", spec.name, show(server));
    if spec.per_channel {
        let channel = settings.value_at(spec, SettingScope::Channel, &inv.event).await?;
        text.push_str(&format!("\n  channel: {}", show(channel)));
    }
    if let Some(default) = &spec.default {
        text.push_str(&format!("\n  default: {}", default));
    }
    inv.reply.send(text).await
}

async fn set(inv: Invocation, settings: Settings) -> HandlerResult {
    require_admin(&inv)?;
    let usage = "settings set <server|channel> <setting> [value]";
    let scope = parse_scope(inv.require_arg(0, usage)?)?;
    let spec = lookup(&inv, inv.require_arg(1, usage)?)?;

    // the value is everything after the setting name, spaces included
    let value = after_words(&inv.args.rest, 2);

    let text = match settings.set(spec, scope, &inv.event, Some(value)).await? {
        Some(stored) => format!("{} set to {} for this {}", spec.name, stored, scope),
        None => format!("{} cleared for this {}", spec.name, scope),
    };
    inv.reply.send(text).await
}

async fn reset(inv: Invocation, settings: Settings) -> HandlerResult {
    require_admin(&inv)?;
    let usage = "settings reset <server|channel> <setting>";
    let scope = parse_scope(inv.require_arg(0, usage)?)?;
    let spec = lookup(&inv, inv.require_arg(1, usage)?)?;

    settings.set(spec, scope, &inv.event, None).await?;
    inv.reply
        .send(format!("{} cleared for this {}", spec.name, scope))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_after_words() {
        assert_eq!(after_words("server greeting hello  there ", 2), "hello  there");
        assert_eq!(after_words("  server   greeting", 2), "");
        assert_eq!(after_words("server", 2), "");
    }
}
