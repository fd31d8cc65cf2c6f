use super::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of inbound platform event
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    Message,
    ReactionAdd,
    ReactionRemove,
    MemberJoin,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Message => "message",
            EventKind::ReactionAdd => "reaction_add",
            EventKind::ReactionRemove => "reaction_remove",
            EventKind::MemberJoin => "member_join",
            EventKind::Other(s) => s,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event body as delivered by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Text(String),
    Reaction {
        message_id: String,
        emoji: String,
        /// Author of the message that was reacted to
        author: Option<User>,
    },
    Raw(serde_json::Value),
}

/// Where an event came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    /// Server (guild, workspace) the channel belongs to, if the platform has one
    #[serde(default)]
    pub server_id: Option<String>,
    pub channel_id: String,
    pub user: Option<User>,
    pub timestamp: DateTime<Utc>,
}

impl Origin {
    pub fn new(channel_id: impl Into<String>, user: Option<User>) -> Self {
        Self {
            server_id: None,
            channel_id: channel_id.into(),
            user,
            timestamp: Utc::now(),
        }
    }
}

/// An event pulled from the event source. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub id: String,
    pub kind: EventKind,
    pub payload: Payload,
    pub origin: Origin,
}

impl InboundEvent {
    pub fn new(kind: EventKind, payload: Payload, origin: Origin) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            payload,
            origin,
        }
    }

    pub fn message(channel_id: impl Into<String>, user: User, text: impl Into<String>) -> Self {
        Self::new(
            EventKind::Message,
            Payload::Text(text.into()),
            Origin::new(channel_id, Some(user)),
        )
    }

    pub fn reaction(
        channel_id: impl Into<String>,
        user: User,
        message_id: impl Into<String>,
        emoji: impl Into<String>,
        author: Option<User>,
    ) -> Self {
        Self::new(
            EventKind::ReactionAdd,
            Payload::Reaction {
                message_id: message_id.into(),
                emoji: emoji.into(),
                author,
            },
            Origin::new(channel_id, Some(user)),
        )
    }

    pub fn with_server(mut self, server_id: impl Into<String>) -> Self {
        self.origin.server_id = Some(server_id.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn sender(&self) -> Option<&User> {
        self.origin.user.as_ref()
    }

    pub fn channel(&self) -> &str {
        &self.origin.channel_id
    }

    pub fn server(&self) -> Option<&str> {
        self.origin.server_id.as_deref()
    }
}
