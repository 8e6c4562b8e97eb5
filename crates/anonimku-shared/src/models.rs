//! Row models exchanged between the store, the HTTP API and clients.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be returned
//! from the API as-is and embedded in change events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MatchId, MessageId, RevealRequestId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user. Identity is keyed by phone number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Unique; signing in again with the same phone updates this row.
    pub phone: String,
    pub is_online: bool,
    pub is_in_chat: bool,
    /// Counterpart this user's identity was last revealed to.
    pub profile_revealed_to: Option<UserId>,
    /// Presence lease: refreshed whenever the user shows signs of life.
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The other participant of a match, as seen by one participant.
///
/// `name` and `phone` stay `None` until both profiles have been revealed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Partner {
    pub id: UserId,
    pub name: Option<String>,
    pub phone: Option<String>,
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Active,
    Ended,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Active => "active",
            MatchStatus::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(MatchStatus::Active),
            "ended" => Some(MatchStatus::Ended),
            _ => None,
        }
    }
}

/// A pairing of two users into one anonymous conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Match {
    pub id: MatchId,
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub status: MatchStatus,
    pub both_profiles_revealed: bool,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn is_active(&self) -> bool {
        self.status == MatchStatus::Active
    }

    pub fn has_participant(&self, user: UserId) -> bool {
        self.user1_id == user || self.user2_id == user
    }

    /// The other participant, or `None` if `user` is not in this match.
    pub fn partner_of(&self, user: UserId) -> Option<UserId> {
        if self.user1_id == user {
            Some(self.user2_id)
        } else if self.user2_id == user {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

/// A user's current match together with what they may see of their partner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveMatch {
    #[serde(rename = "match")]
    pub current: Match,
    pub partner: Partner,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A chat message. Immutable once written apart from the read flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub match_id: MatchId,
    pub sender_id: UserId,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Reveal request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RevealStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RevealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevealStatus::Pending => "pending",
            RevealStatus::Accepted => "accepted",
            RevealStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RevealStatus::Pending),
            "accepted" => Some(RevealStatus::Accepted),
            "rejected" => Some(RevealStatus::Rejected),
            _ => None,
        }
    }
}

/// The two legal ways to resolve a pending reveal request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RevealResponse {
    Accepted,
    Rejected,
}

impl From<RevealResponse> for RevealStatus {
    fn from(response: RevealResponse) -> Self {
        match response {
            RevealResponse::Accepted => RevealStatus::Accepted,
            RevealResponse::Rejected => RevealStatus::Rejected,
        }
    }
}

/// One participant asking the other to reveal both identities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevealRequest {
    pub id: RevealRequestId,
    pub match_id: MatchId,
    pub requester_id: UserId,
    pub target_id: UserId,
    pub status: RevealStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_match() -> Match {
        Match {
            id: MatchId::new(),
            user1_id: UserId::new(),
            user2_id: UserId::new(),
            status: MatchStatus::Active,
            both_profiles_revealed: false,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    #[test]
    fn partner_of_is_symmetric() {
        let m = sample_match();
        assert_eq!(m.partner_of(m.user1_id), Some(m.user2_id));
        assert_eq!(m.partner_of(m.user2_id), Some(m.user1_id));
        assert_eq!(m.partner_of(UserId::new()), None);
    }

    #[test]
    fn active_match_serializes_match_key() {
        let m = sample_match();
        let view = ActiveMatch {
            partner: Partner { id: m.user2_id, name: None, phone: None },
            current: m,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["match"]["status"], "active");
        assert!(json["partner"]["name"].is_null());
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [RevealStatus::Pending, RevealStatus::Accepted, RevealStatus::Rejected] {
            assert_eq!(RevealStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MatchStatus::parse("bogus"), None);
    }
}
