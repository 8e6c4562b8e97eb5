use thiserror::Error;

/// Rejected user input. Shared so the client can pre-validate with the exact
/// rules the server enforces.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Phone number must be at least {min} digits, spaces, dashes or parentheses, optionally prefixed with '+'")]
    InvalidPhone { min: usize },

    #[error("Name must not be empty")]
    EmptyName,

    #[error("Name is too long ({len} > {max} characters)")]
    NameTooLong { len: usize, max: usize },

    #[error("Message content must not be empty")]
    EmptyContent,

    #[error("Message is too long ({len} > {max} characters)")]
    ContentTooLong { len: usize, max: usize },

    #[error("Match is not active")]
    MatchNotActive,

    #[error("User is not a participant in this match")]
    NotParticipant,

    #[error("User is offline")]
    UserOffline,

    #[error("Only the target of a reveal request may respond to it")]
    NotRevealTarget,

    #[error("A user cannot target themselves")]
    SelfTarget,
}
