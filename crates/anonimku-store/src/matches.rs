//! Match pairing engine and match lifecycle.
//!
//! Pairing reads the eligible pool and writes the new match plus both users'
//! `is_in_chat` flags inside one `BEGIN IMMEDIATE` transaction.  While it
//! runs no other connection can commit, so two concurrent searches can never
//! claim the same partner and nobody ends up in two active matches.

use anonimku_shared::error::ValidationError;
use anonimku_shared::types::{MatchId, UserId};
use chrono::Duration;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ActiveMatch, Match, MatchStatus, Pairing, Partner, Termination};
use crate::rows::{not_found, now, parse_enum, parse_opt_ts, parse_ts, parse_uuid, ts};
use crate::users::load_user;

const MATCH_COLUMNS: &str =
    "id, user1_id, user2_id, status, both_profiles_revealed, created_at, ended_at";

impl Database {
    /// Pair `user_id` with another eligible user, if there is one.
    ///
    /// Eligible partners are online, not in a chat, hold an unexpired
    /// presence lease (seen within `presence_ttl`) and are not the caller.
    /// The one who has been waiting longest in that state (oldest
    /// `updated_at`, ties broken by id) is chosen.
    ///
    /// A caller who is already in an active match gets that match back, so
    /// both sides of a freshly formed pair resolve to the same match id.
    pub fn find_match(&mut self, user_id: UserId, presence_ttl: Duration) -> Result<Pairing> {
        let tx = self.immediate()?;
        let now = now();

        let user = load_user(&tx, user_id)?;

        if let Some(existing) = active_match_for(&tx, user_id)? {
            tx.execute(
                "UPDATE users SET last_seen_at = ?2 WHERE id = ?1",
                params![user_id.to_string(), ts(&now)],
            )?;
            tx.commit()?;
            return Ok(Pairing::AlreadyMatched(existing));
        }

        if !user.is_online {
            return Err(ValidationError::UserOffline.into());
        }

        tx.execute(
            "UPDATE users SET last_seen_at = ?2 WHERE id = ?1",
            params![user_id.to_string(), ts(&now)],
        )?;

        let cutoff = ts(&(now - presence_ttl));
        let candidate: Option<String> = tx
            .query_row(
                "SELECT u.id FROM users u
                 WHERE u.is_online = 1
                   AND u.is_in_chat = 0
                   AND u.last_seen_at >= ?2
                   AND u.id <> ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM matches m
                       WHERE m.status = 'active'
                         AND (m.user1_id = u.id OR m.user2_id = u.id)
                   )
                 ORDER BY u.updated_at ASC, u.id ASC
                 LIMIT 1",
                params![user_id.to_string(), cutoff],
                |row| row.get(0),
            )
            .optional()?;

        let Some(partner) = candidate else {
            tx.commit()?;
            tracing::debug!(user = %user_id, "no eligible partner yet");
            return Ok(Pairing::NoCandidate);
        };
        let partner_id = UserId(parse_uuid(0, &partner)?);

        let created = Match {
            id: MatchId::new(),
            user1_id: user_id,
            user2_id: partner_id,
            status: MatchStatus::Active,
            both_profiles_revealed: false,
            created_at: now,
            ended_at: None,
        };

        tx.execute(
            "INSERT INTO matches (id, user1_id, user2_id, status, both_profiles_revealed, created_at)
             VALUES (?1, ?2, ?3, 'active', 0, ?4)",
            params![
                created.id.to_string(),
                created.user1_id.to_string(),
                created.user2_id.to_string(),
                ts(&created.created_at),
            ],
        )
        .map_err(|e| StoreError::on_constraint(e, "user already has an active match"))?;

        tx.execute(
            "UPDATE users SET is_in_chat = 1, updated_at = ?3 WHERE id IN (?1, ?2)",
            params![user_id.to_string(), partner_id.to_string(), ts(&now)],
        )?;

        tx.commit()?;

        tracing::info!(
            match_id = %created.id,
            user1 = %created.user1_id,
            user2 = %created.user2_id,
            "match created"
        );
        Ok(Pairing::Created(created))
    }

    pub fn get_match(&self, id: MatchId) -> Result<Match> {
        load_match(self.conn(), id)
    }

    /// The caller's active match and what they may see of their partner.
    pub fn get_active_match(&self, user_id: UserId) -> Result<ActiveMatch> {
        load_user(self.conn(), user_id)?;

        let current =
            active_match_for(self.conn(), user_id)?.ok_or(StoreError::NotFound("active match"))?;

        let partner_id = current
            .partner_of(user_id)
            .ok_or(StoreError::NotFound("active match"))?;
        let partner = load_user(self.conn(), partner_id)?;

        let partner = if current.both_profiles_revealed {
            Partner {
                id: partner.id,
                name: Some(partner.name),
                phone: Some(partner.phone),
            }
        } else {
            Partner {
                id: partner.id,
                name: None,
                phone: None,
            }
        };

        Ok(ActiveMatch { current, partner })
    }

    /// End a match and release both participants.
    ///
    /// Ending an already ended match succeeds without writing anything.
    pub fn end_match(&mut self, id: MatchId) -> Result<Termination> {
        let tx = self.immediate()?;
        let current = load_match(&tx, id)?;

        if !current.is_active() {
            return Ok(Termination::AlreadyEnded(current));
        }

        let now = now();
        tx.execute(
            "UPDATE matches SET status = 'ended', ended_at = ?2
             WHERE id = ?1 AND status = 'active'",
            params![id.to_string(), ts(&now)],
        )?;
        tx.execute(
            "UPDATE users SET is_in_chat = 0, profile_revealed_to = NULL, updated_at = ?3
             WHERE id IN (?1, ?2)",
            params![
                current.user1_id.to_string(),
                current.user2_id.to_string(),
                ts(&now),
            ],
        )?;
        tx.commit()?;

        tracing::info!(match_id = %id, "match ended");
        Ok(Termination::Ended(Match {
            status: MatchStatus::Ended,
            ended_at: Some(now),
            ..current
        }))
    }
}

pub(crate) fn load_match(conn: &Connection, id: MatchId) -> Result<Match> {
    conn.query_row(
        &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"),
        params![id.to_string()],
        row_to_match,
    )
    .map_err(not_found("match"))
}

pub(crate) fn active_match_for(conn: &Connection, user_id: UserId) -> Result<Option<Match>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {MATCH_COLUMNS} FROM matches
                 WHERE status = 'active' AND (user1_id = ?1 OR user2_id = ?1)
                 ORDER BY created_at DESC
                 LIMIT 1"
            ),
            params![user_id.to_string()],
            row_to_match,
        )
        .optional()?)
}

fn row_to_match(row: &rusqlite::Row<'_>) -> rusqlite::Result<Match> {
    let id: String = row.get(0)?;
    let user1: String = row.get(1)?;
    let user2: String = row.get(2)?;
    let status: String = row.get(3)?;
    let created: String = row.get(5)?;

    Ok(Match {
        id: MatchId(parse_uuid(0, &id)?),
        user1_id: UserId(parse_uuid(1, &user1)?),
        user2_id: UserId(parse_uuid(2, &user2)?),
        status: parse_enum(3, &status, MatchStatus::parse)?,
        both_profiles_revealed: row.get(4)?,
        created_at: parse_ts(5, &created)?,
        ended_at: parse_opt_ts(6, row.get(6)?)?,
    })
}
