//! Chat log storage.
//!
//! Messages are append-only and ordered by `(created_at, seq)`.

use anonimku_shared::error::ValidationError;
use anonimku_shared::types::{MatchId, MessageId, UserId};
use anonimku_shared::validation::validate_content;
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::matches::load_match;
use crate::models::{Match, Message};
use crate::rows::{now, parse_opt_ts, parse_ts, parse_uuid, ts};

const MESSAGE_COLUMNS: &str = "id, match_id, sender_id, content, is_read, created_at";

impl Database {
    /// Append a message to an active match.
    ///
    /// `created_at` never goes below the newest message already in the match,
    /// so the log stays non-decreasing even if the wall clock steps back.
    pub fn append_message(
        &mut self,
        match_id: MatchId,
        sender_id: UserId,
        content: &str,
        max_len: usize,
    ) -> Result<Message> {
        let content = validate_content(content, max_len)?;

        let tx = self.immediate()?;
        let current = load_match(&tx, match_id)?;
        ensure_participant(&current, sender_id)?;

        let latest: Option<String> = tx.query_row(
            "SELECT MAX(created_at) FROM messages WHERE match_id = ?1",
            params![match_id.to_string()],
            |row| row.get(0),
        )?;
        let now = now();
        let created_at = parse_opt_ts(0, latest)?
            .filter(|latest| *latest > now)
            .unwrap_or(now);

        let message = Message {
            id: MessageId::new(),
            match_id,
            sender_id,
            content,
            is_read: false,
            created_at,
        };

        tx.execute(
            "INSERT INTO messages (id, match_id, sender_id, content, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                message.id.to_string(),
                message.match_id.to_string(),
                message.sender_id.to_string(),
                message.content,
                ts(&message.created_at),
            ],
        )?;
        tx.commit()?;

        tracing::debug!(match_id = %match_id, message_id = %message.id, "message appended");
        Ok(message)
    }

    /// Snapshot of a match's conversation in send order.
    pub fn list_messages(&self, match_id: MatchId) -> Result<Vec<Message>> {
        load_match(self.conn(), match_id)?;

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE match_id = ?1
             ORDER BY created_at ASC, seq ASC"
        ))?;

        let rows = stmt.query_map(params![match_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Mark every message in the match that `reader_id` did not send as read.
    /// Returns the rows that changed, already flipped.
    pub fn mark_messages_read(&mut self, match_id: MatchId, reader_id: UserId) -> Result<Vec<Message>> {
        let tx = self.immediate()?;
        let current = load_match(&tx, match_id)?;
        if !current.has_participant(reader_id) {
            return Err(ValidationError::NotParticipant.into());
        }

        let mut unread = Vec::new();
        {
            let mut stmt = tx.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages
                 WHERE match_id = ?1 AND sender_id <> ?2 AND is_read = 0
                 ORDER BY created_at ASC, seq ASC"
            ))?;
            let rows = stmt.query_map(
                params![match_id.to_string(), reader_id.to_string()],
                row_to_message,
            )?;
            for row in rows {
                unread.push(Message { is_read: true, ..row? });
            }
        }

        tx.execute(
            "UPDATE messages SET is_read = 1
             WHERE match_id = ?1 AND sender_id <> ?2 AND is_read = 0",
            params![match_id.to_string(), reader_id.to_string()],
        )?;
        tx.commit()?;

        Ok(unread)
    }
}

fn ensure_participant(current: &Match, sender_id: UserId) -> Result<()> {
    if !current.is_active() {
        return Err(ValidationError::MatchNotActive.into());
    }
    if !current.has_participant(sender_id) {
        return Err(ValidationError::NotParticipant.into());
    }
    Ok(())
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let match_id: String = row.get(1)?;
    let sender: String = row.get(2)?;
    let created: String = row.get(5)?;

    Ok(Message {
        id: MessageId(parse_uuid(0, &id)?),
        match_id: MatchId(parse_uuid(1, &match_id)?),
        sender_id: UserId(parse_uuid(2, &sender)?),
        content: row.get(3)?,
        is_read: row.get(4)?,
        created_at: parse_ts(5, &created)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;
    use chrono::Duration;

    const MAX: usize = 2000;

    fn paired() -> (Database, MatchId, UserId, UserId) {
        let mut db = Database::open_in_memory().unwrap();
        let a = db.upsert_user("A", "0811111111").unwrap().id;
        let b = db.upsert_user("B", "0822222222").unwrap().id;
        let id = db
            .find_match(a, Duration::seconds(90))
            .unwrap()
            .match_id()
            .unwrap();
        (db, id, a, b)
    }

    #[test]
    fn hello_then_hi_in_send_order() {
        let (mut db, id, a, b) = paired();
        db.append_message(id, a, "hello", MAX).unwrap();
        db.append_message(id, b, "hi", MAX).unwrap();

        let contents: Vec<_> = db
            .list_messages(id)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["hello", "hi"]);
    }

    #[test]
    fn n_messages_come_back_in_order() {
        let (mut db, id, a, b) = paired();
        let sent: Vec<Message> = (0..25)
            .map(|i| {
                let sender = if i % 2 == 0 { a } else { b };
                db.append_message(id, sender, &format!("msg {i}"), MAX).unwrap()
            })
            .collect();

        let listed = db.list_messages(id).unwrap();
        assert_eq!(listed, sent);
        assert!(listed.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn created_at_never_goes_backwards() {
        let (mut db, id, a, b) = paired();
        let first = db.append_message(id, a, "from the future", MAX).unwrap();

        let future = ts(&(first.created_at + Duration::hours(1)));
        db.conn()
            .execute(
                "UPDATE messages SET created_at = ?1 WHERE id = ?2",
                params![future, first.id.to_string()],
            )
            .unwrap();

        let second = db.append_message(id, b, "after", MAX).unwrap();
        let listed = db.list_messages(id).unwrap();
        assert_eq!(listed.last().unwrap().id, second.id);
        assert_eq!(listed[0].created_at, listed[1].created_at);
    }

    #[test]
    fn rejects_outsiders_empty_content_and_ended_matches() {
        let (mut db, id, a, _b) = paired();
        let outsider = db.upsert_user("C", "0833333333").unwrap().id;

        assert!(matches!(
            db.append_message(id, outsider, "hey", MAX),
            Err(StoreError::Validation(ValidationError::NotParticipant))
        ));
        assert!(matches!(
            db.append_message(id, a, "   ", MAX),
            Err(StoreError::Validation(ValidationError::EmptyContent))
        ));

        db.end_match(id).unwrap();
        assert!(matches!(
            db.append_message(id, a, "too late", MAX),
            Err(StoreError::Validation(ValidationError::MatchNotActive))
        ));
        assert!(db.list_messages(id).unwrap().is_empty());
    }

    #[test]
    fn unknown_match_is_not_found() {
        let (mut db, _id, a, _b) = paired();
        assert!(matches!(
            db.append_message(MatchId::new(), a, "hi", MAX),
            Err(StoreError::NotFound("match"))
        ));
        assert!(matches!(
            db.list_messages(MatchId::new()),
            Err(StoreError::NotFound("match"))
        ));
    }

    #[test]
    fn mark_read_only_touches_partner_messages() {
        let (mut db, id, a, b) = paired();
        db.append_message(id, a, "one", MAX).unwrap();
        db.append_message(id, b, "two", MAX).unwrap();
        db.append_message(id, a, "three", MAX).unwrap();

        let changed = db.mark_messages_read(id, b).unwrap();
        assert_eq!(changed.len(), 2);
        assert!(changed.iter().all(|m| m.sender_id == a && m.is_read));

        assert!(db.mark_messages_read(id, b).unwrap().is_empty());

        let listed = db.list_messages(id).unwrap();
        assert!(!listed[1].is_read);
    }
}
