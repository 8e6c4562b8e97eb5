//! Outcomes of the store's composite operations.
//!
//! Row types live in `anonimku_shared::models` and are re-exported here so
//! callers only need this crate.

pub use anonimku_shared::models::{
    ActiveMatch, Match, MatchStatus, Message, Partner, RevealRequest, RevealResponse,
    RevealStatus, User,
};
use anonimku_shared::types::MatchId;

/// Result of asking the pairing engine for a partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pairing {
    /// A new match was formed with the caller as `user1`.
    Created(Match),
    /// The caller was already paired (typically by their partner's request).
    AlreadyMatched(Match),
    /// Nobody eligible right now. Not an error.
    NoCandidate,
}

impl Pairing {
    pub fn match_id(&self) -> Option<MatchId> {
        match self {
            Pairing::Created(m) | Pairing::AlreadyMatched(m) => Some(m.id),
            Pairing::NoCandidate => None,
        }
    }
}

/// Result of ending a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Ended(Match),
    /// The match had already ended; nothing was written.
    AlreadyEnded(Match),
}

/// Result of resolving a reveal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealResolution {
    pub request: RevealRequest,
    /// The match after `both_profiles_revealed` was set. Only present when
    /// the request was accepted.
    pub revealed_match: Option<Match>,
}
