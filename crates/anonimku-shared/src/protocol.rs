//! Change events and the WebSocket subscription protocol.
//!
//! Clients subscribe to a [`Topic`] (one match, or one user) and receive a
//! [`ChangeEvent`] for every insert or update of a `matches`, `messages` or
//! `reveal_requests` row routed to that topic. Delivery is at-least-once:
//! consumers must tolerate duplicates (dedup by row id).

use serde::{Deserialize, Serialize};

use crate::models::{Match, Message, RevealRequest};
use crate::types::{MatchId, UserId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Matches,
    Messages,
    RevealRequests,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
}

/// The changed row, tagged with the table it lives in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "table", content = "record", rename_all = "snake_case")]
pub enum Record {
    Matches(Match),
    Messages(Message),
    RevealRequests(RevealRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: Record,
}

impl ChangeEvent {
    pub fn insert(record: Record) -> Self {
        Self { kind: ChangeKind::Insert, record }
    }

    pub fn update(record: Record) -> Self {
        Self { kind: ChangeKind::Update, record }
    }

    pub fn table(&self) -> Table {
        match self.record {
            Record::Matches(_) => Table::Matches,
            Record::Messages(_) => Table::Messages,
            Record::RevealRequests(_) => Table::RevealRequests,
        }
    }
}

/// What a subscription is keyed on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Topic {
    Match(MatchId),
    User(UserId),
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topic::Match(id) => write!(f, "match:{id}"),
            Topic::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Messages sent from client to server over `/ws`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving events for `topic`. An empty `tables` list means all tables.
    Subscribe {
        topic: Topic,
        #[serde(default)]
        tables: Vec<Table>,
    },
    Unsubscribe {
        topic: Topic,
    },
    Ping,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    /// The stream was dropped; resubscribe and re-fetch state.
    Unavailable,
}

/// Messages sent from server to client over `/ws`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed { topic: Topic },
    Unsubscribed { topic: Topic },
    Change { event: ChangeEvent },
    Pong,
    Error { code: ErrorCode, message: String },
}
