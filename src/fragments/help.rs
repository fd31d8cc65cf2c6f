//! `help` - lists registered commands

use crate::application::errors::BotError;
use crate::application::messaging::Invocation;
use crate::application::services::FragmentContext;
use crate::domain::traits::{Fragment, HandlerResult};

pub struct HelpFragment;

impl Fragment for HelpFragment {
    fn name(&self) -> &str {
        "help"
    }

    fn description(&self) -> &str {
        "Show available commands"
    }

    fn setup(&self, ctx: &mut FragmentContext<'_>) -> Result<(), BotError> {
        let entry = ctx
            .command("help", help)
            .with_description("Show available commands")
            .with_usage(format!("{} [command]", ctx.prefixed("help")));
        ctx.add(entry)?;
        Ok(())
    }
}

async fn help(inv: Invocation) -> HandlerResult {
    let text = match inv.arg(0) {
        Some(name) => describe(&inv, name),
        None => overview(&inv),
    };
    inv.reply.send(text).await
}

fn overview(inv: &Invocation) -> String {
    let mut commands: Vec<_> = inv.registry.commands().collect();
    commands.sort_by(|a, b| a.trigger.text().cmp(b.trigger.text()));

    let mut text = String::from("Available commands:");
    for cmd in commands {
        text.push_str(&format!("\n{}", cmd.trigger));
        if let Some(desc) = &cmd.description {
            text.push_str(&format!(" - {}", desc));
        }
    }
    text
}

fn describe(inv: &Invocation, name: &str) -> String {
    let Some(cmd) = inv.registry.command(name) else {
        return format!("Unknown command: {}", name);
    };

    let mut text = format!(
        "{} - {}",
        cmd.trigger,
        cmd.description.as_deref().unwrap_or("No description")
    );
    if let Some(usage) = &cmd.usage {
        text.push_str(&format!("\nUsage: {}", usage));
    }
    text.push_str(&format!("\nProvided by: {}", cmd.owner));
    text
}
