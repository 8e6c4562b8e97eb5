//! Client-side state for one open chat.
//!
//! Pushed change events may arrive twice (once per subscribed topic, or
//! again after a reconnect) and a reconnect replaces everything with a
//! fresh snapshot, so every update here is idempotent.

use std::collections::HashSet;

use anonimku_shared::models::{Match, MatchStatus, Message, RevealRequest, RevealStatus};
use anonimku_shared::protocol::{ChangeEvent, Record};
use anonimku_shared::types::{MatchId, UserId};

#[derive(Debug, Clone)]
pub struct Conversation {
    match_id: MatchId,
    me: UserId,
    /// In server order: `created_at`, then commit order on ties.
    messages: Vec<Message>,
    /// The pending reveal request that targets me, if any.
    pending_reveal: Option<RevealRequest>,
    revealed: bool,
    ended: bool,
}

impl Conversation {
    pub fn new(current: &Match, me: UserId) -> Self {
        Self {
            match_id: current.id,
            me,
            messages: Vec::new(),
            pending_reveal: None,
            revealed: current.both_profiles_revealed,
            ended: current.status == MatchStatus::Ended,
        }
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending_reveal(&self) -> Option<&RevealRequest> {
        self.pending_reveal.as_ref()
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Messages from the partner I have not read yet.
    pub fn unread_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.sender_id != self.me && !m.is_read)
            .count()
    }

    /// Fold one pushed change into the state. Returns true if anything
    /// visible changed. Events for other matches are ignored.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        match &event.record {
            Record::Messages(message) => self.apply_message(message),
            Record::Matches(current) => self.apply_match(current),
            Record::RevealRequests(request) => self.apply_reveal(request),
        }
    }

    /// Replace the state with a freshly fetched snapshot. `messages` must be
    /// in the order the server listed them.
    pub fn reconcile(&mut self, current: &Match, messages: Vec<Message>, pending: Vec<RevealRequest>) {
        self.revealed = current.both_profiles_revealed;
        self.ended = current.status == MatchStatus::Ended;

        let mut seen = HashSet::new();
        self.messages = messages
            .into_iter()
            .filter(|m| m.match_id == self.match_id && seen.insert(m.id))
            .collect();

        self.pending_reveal = pending.into_iter().find(|r| {
            r.match_id == self.match_id && r.target_id == self.me && r.status == RevealStatus::Pending
        });
    }

    fn apply_message(&mut self, message: &Message) -> bool {
        if message.match_id != self.match_id {
            return false;
        }
        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
            if existing == message {
                return false;
            }
            *existing = message.clone();
            return true;
        }

        // A new message goes after everything with the same timestamp, which
        // is where the server's commit order puts it.
        let at = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(at, message.clone());
        true
    }

    fn apply_match(&mut self, current: &Match) -> bool {
        if current.id != self.match_id {
            return false;
        }
        let revealed = current.both_profiles_revealed;
        let ended = current.status == MatchStatus::Ended;
        let changed = revealed != self.revealed || ended != self.ended;
        self.revealed = revealed;
        self.ended = ended;
        if ended {
            self.pending_reveal = None;
        }
        changed
    }

    fn apply_reveal(&mut self, request: &RevealRequest) -> bool {
        if request.match_id != self.match_id || request.target_id != self.me {
            return false;
        }
        match request.status {
            RevealStatus::Pending => {
                if self.pending_reveal.as_ref() == Some(request) {
                    return false;
                }
                self.pending_reveal = Some(request.clone());
                true
            }
            RevealStatus::Accepted | RevealStatus::Rejected => {
                let resolved = self
                    .pending_reveal
                    .as_ref()
                    .is_some_and(|pending| pending.id == request.id);
                if resolved {
                    self.pending_reveal = None;
                }
                resolved
            }
        }
    }
}
