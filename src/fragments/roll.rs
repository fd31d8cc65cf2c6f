//! `roll` - dice in standard notation, as a command or inline `[[2d6]]`

use once_cell::sync::Lazy;
use rand::Rng;
use regex_lite::Regex;
use std::fmt::Write as _;

use crate::application::errors::{BotError, HandlerError};
use crate::application::messaging::Invocation;
use crate::application::services::FragmentContext;
use crate::domain::entities::{EventKind, SettingSpec};
use crate::domain::traits::{Fragment, HandlerResult};

const DEFAULT_SIDES: u32 = 20;

static TERM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([+-])?\s*(?:(\d*)d(\d*)|(\d+))").expect("valid dice regex"));

static INLINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\[(?:([^\]|]*)\|\s*)?([-+0-9d ]*)\]\]").expect("valid inline regex")
});

/// Upper bounds on a single expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollLimits {
    /// Total dice across every term
    pub max_dice: u32,
    pub max_sides: u32,
}

impl Default for RollLimits {
    fn default() -> Self {
        Self {
            max_dice: 100,
            max_sides: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roll {
    pub total: i64,
    /// Each term with its individual dice, e.g. `[3 5]₆ + 2`
    pub breakdown: String,
}

#[derive(Default)]
pub struct RollFragment {
    limits: RollLimits,
}

impl RollFragment {
    pub fn new(limits: RollLimits) -> Self {
        Self { limits }
    }
}

impl Fragment for RollFragment {
    fn name(&self) -> &str {
        "roll"
    }

    fn description(&self) -> &str {
        "Roll dice"
    }

    fn setup(&self, ctx: &mut FragmentContext<'_>) -> Result<(), BotError> {
        let enabled = ctx.setting(
            SettingSpec::toggle("enable_roll")
                .per_channel()
                .with_description("Allow rolling dice")
                .with_default("1"),
        )?;

        let limits = self.limits;
        let command = move |inv: Invocation| roll_command(inv, limits);
        let entry = ctx
            .command("roll", enabled.gate(command))
            .with_description("Roll dice using standard dice notation")
            .with_usage(format!("{} 2d6+3", ctx.prefixed("roll")));
        ctx.add(entry)?;

        let inline = move |inv: Invocation| inline_roll(inv, limits);
        ctx.listen(EventKind::Message, "inline-roll", enabled.gate(inline))?;
        Ok(())
    }
}

async fn roll_command(inv: Invocation, limits: RollLimits) -> HandlerResult {
    if inv.args.rest.is_empty() {
        return Err(HandlerError::Usage("Usage: roll <dice>, e.g. 2d6+3".to_string()));
    }
    let rolled =
        roll(&inv.args.rest, limits, &mut rand::thread_rng()).map_err(HandlerError::Usage)?;

    let who = inv.sender().map(|u| u.display_name().to_string()).unwrap_or_default();
    inv.reply.send(format!("{} {} → {}", who, rolled.breakdown, rolled.total).trim_start()).await
}

async fn inline_roll(inv: Invocation, limits: RollLimits) -> HandlerResult {
    let Some(sender) = inv.sender() else {
        return Ok(());
    };
    if sender.is_bot {
        return Ok(());
    }
    let Some(text) = inv.event.text() else {
        return Ok(());
    };

    let mut lines = vec![sender.display_name().to_string()];
    for caps in INLINE.captures_iter(text) {
        let expr = caps.get(2).map_or("", |m| m.as_str());
        let result = roll(expr, limits, &mut rand::thread_rng());
        let line = match result {
            Ok(r) => format!("{} → {}", r.breakdown, r.total),
            Err(e) => e,
        };
        match caps.get(1).map(|m| m.as_str().trim()).filter(|t| !t.is_empty()) {
            Some(tag) => lines.push(format!("{}: {}", tag, line)),
            None => lines.push(line),
        }
    }

    if lines.len() > 1 {
        inv.reply.send(lines.join("\n")).await?;
    }
    Ok(())
}

/// Evaluate a dice expression such as `2d6+3`, `d20` or `4d8 - 2`
pub fn roll<R: Rng + ?Sized>(expr: &str, limits: RollLimits, rng: &mut R) -> Result<Roll, String> {
    let mut total: i64 = 0;
    let mut dice_used: u32 = 0;
    let mut parts: Vec<String> = Vec::new();

    for caps in TERM.captures_iter(expr) {
        let negative = caps.get(1).is_some_and(|m| m.as_str() == "-");
        let sign = if negative { -1 } else { 1 };
        parts.push(if negative { "-" } else { "+" }.to_string());

        if let Some(num) = caps.get(4) {
            let n: i64 = num
                .as_str()
                .parse()
                .map_err(|_| format!("Number too large: {}", num.as_str()))?;
            total = total.saturating_add(sign * n);
            parts.push(n.to_string());
            continue;
        }

        let count = parse_or(caps.get(2).map(|m| m.as_str()), 1)?;
        let sides = parse_or(caps.get(3).map(|m| m.as_str()), DEFAULT_SIDES)?;
        if sides == 0 || sides > limits.max_sides {
            return Err(format!("Dice must have between 1 and {} sides", limits.max_sides));
        }
        dice_used = dice_used.saturating_add(count);
        if dice_used > limits.max_dice {
            return Err(format!("Too many dice, at most {} per roll", limits.max_dice));
        }

        let rolls: Vec<u32> = (0..count).map(|_| rng.gen_range(1..=sides)).collect();
        let sum: i64 = rolls.iter().map(|&r| i64::from(r)).sum();
        total = total.saturating_add(sign * sum);

        let mut part = String::from("[");
        for (i, r) in rolls.iter().enumerate() {
            if i > 0 {
                part.push(' ');
            }
            let _ = write!(part, "{}", r);
        }
        part.push(']');
        part.push_str(&subscript(sides));
        parts.push(part);
    }

    if parts.is_empty() {
        return Err(format!("Can't roll {:?}", expr.trim()));
    }
    // drop the leading sign unless it is a minus
    if parts[0] == "+" {
        parts.remove(0);
    }
    Ok(Roll {
        total,
        breakdown: parts.join(" "),
    })
}

fn parse_or(raw: Option<&str>, default: u32) -> Result<u32, String> {
    match raw {
        None | Some("") => Ok(default),
        Some(s) => s.parse().map_err(|_| format!("Number too large: {}", s)),
    }
}

fn subscript(n: u32) -> String {
    n.to_string()
        .chars()
        .map(|c| match c.to_digit(10) {
            Some(d) => char::from_u32(0x2080 + d).unwrap_or(c),
            None => c,
        })
        .collect()
}
