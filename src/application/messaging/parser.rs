//! Trigger parser - Pulls candidate trigger text out of inbound events

use crate::domain::entities::InboundEvent;

/// Command text split around the matched trigger
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Arguments {
    /// Whitespace-separated words after the trigger
    pub words: Vec<String>,
    /// Everything after the trigger, trimmed but otherwise untouched
    pub rest: String,
}

/// Parses message text into candidate trigger text and arguments
pub struct TriggerParser {
    max_len: usize,
}

impl TriggerParser {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    /// Candidate text for command lookup, if the event carries usable text
    pub fn candidate<'a>(&self, event: &'a InboundEvent) -> Option<&'a str> {
        let text = event.text()?.trim();
        if text.is_empty() || text.len() > self.max_len {
            return None;
        }
        Some(text)
    }

    /// Split off the first `trigger_words` words and return what follows
    pub fn arguments(&self, text: &str, trigger_words: usize) -> Arguments {
        let mut rest = text.trim_start();
        for _ in 0..trigger_words {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            rest = rest[end..].trim_start();
        }
        let rest = rest.trim_end();

        Arguments {
            words: rest.split_whitespace().map(str::to_string).collect(),
            rest: rest.to_string(),
        }
    }
}

impl Default for TriggerParser {
    fn default() -> Self {
        Self::new(4000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::User;

    #[test]
    fn test_arguments_after_multiword_trigger() {
        let parser = TriggerParser::default();
        let args = parser.arguments("!karma   give  Alice  now", 2);
        assert_eq!(args.words, vec!["Alice", "now"]);
        assert_eq!(args.rest, "Alice  now");
    }

    #[test]
    fn test_arguments_empty_when_trigger_only() {
        let parser = TriggerParser::default();
        assert_eq!(parser.arguments("!help", 1), Arguments::default());
    }

    #[test]
    fn test_candidate_requires_text() {
        let parser = TriggerParser::new(10);
        let user = User::new("1");
        let padded = InboundEvent::message("c", user.clone(), "  !roll ");
        assert_eq!(parser.candidate(&padded), Some("!roll"));
        assert_eq!(parser.candidate(&InboundEvent::message("c", user.clone(), "   ")), None);
        let long = InboundEvent::message("c", user.clone(), "x".repeat(11));
        assert_eq!(parser.candidate(&long), None);
        assert_eq!(parser.candidate(&InboundEvent::reaction("c", user, "m", "+", None)), None);
    }
}
