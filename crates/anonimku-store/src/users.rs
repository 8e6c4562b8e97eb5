//! User directory: identity keyed by phone number, plus presence.

use anonimku_shared::types::UserId;
use anonimku_shared::validation::{validate_name, validate_phone};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::database::Database;
use crate::error::Result;
use crate::models::User;
use crate::rows::{not_found, now, parse_ts, parse_uuid, ts};

const USER_COLUMNS: &str = "id, name, phone, is_online, is_in_chat, profile_revealed_to,
     last_seen_at, created_at, updated_at";

impl Database {
    /// Sign a user in: create them, or update name and presence if the phone
    /// number is already registered.
    pub fn upsert_user(&self, name: &str, phone: &str) -> Result<User> {
        let name = validate_name(name)?;
        let phone = validate_phone(phone)?;
        let now = ts(&now());

        self.conn().execute(
            "INSERT INTO users (id, name, phone, is_online, is_in_chat, last_seen_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, 0, ?4, ?4, ?4)
             ON CONFLICT(phone) DO UPDATE SET
                 name = excluded.name,
                 is_online = 1,
                 last_seen_at = excluded.last_seen_at,
                 updated_at = excluded.updated_at",
            params![UserId::new().to_string(), name, phone, now],
        )?;

        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE phone = ?1"),
                params![phone],
                row_to_user,
            )
            .map_err(not_found("user"))?;

        tracing::debug!(user = %user.id, "user signed in");
        Ok(user)
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        load_user(self.conn(), id)
    }

    /// Flip the online flag. Going online also renews the presence lease.
    pub fn set_online_status(&self, id: UserId, online: bool) -> Result<User> {
        let now = ts(&now());
        let affected = self.conn().execute(
            "UPDATE users SET
                 is_online = ?2,
                 last_seen_at = CASE WHEN ?2 THEN ?3 ELSE last_seen_at END,
                 updated_at = ?3
             WHERE id = ?1",
            params![id.to_string(), online, now],
        )?;
        if affected == 0 {
            return Err(crate::StoreError::NotFound("user"));
        }
        self.get_user(id)
    }

    /// Renew the presence lease without touching anything else.
    pub fn touch_presence(&self, id: UserId) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET last_seen_at = ?2 WHERE id = ?1",
            params![id.to_string(), ts(&now())],
        )?;
        if affected == 0 {
            return Err(crate::StoreError::NotFound("user"));
        }
        Ok(())
    }

    /// Mark everyone whose lease ended before `cutoff` as offline.
    /// Returns the number of users affected.
    pub fn expire_stale_presence(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE users SET is_online = 0, updated_at = ?2
             WHERE is_online = 1 AND last_seen_at < ?1",
            params![ts(&cutoff), ts(&now())],
        )?;
        Ok(affected)
    }
}

pub(crate) fn load_user(conn: &Connection, id: UserId) -> Result<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id.to_string()],
        row_to_user,
    )
    .map_err(not_found("user"))
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let revealed_to: Option<String> = row.get(5)?;
    let last_seen: String = row.get(6)?;
    let created: String = row.get(7)?;
    let updated: String = row.get(8)?;

    Ok(User {
        id: UserId(parse_uuid(0, &id)?),
        name: row.get(1)?,
        phone: row.get(2)?,
        is_online: row.get(3)?,
        is_in_chat: row.get(4)?,
        profile_revealed_to: revealed_to
            .map(|s| parse_uuid(5, &s).map(UserId))
            .transpose()?,
        last_seen_at: parse_ts(6, &last_seen)?,
        created_at: parse_ts(7, &created)?,
        updated_at: parse_ts(8, &updated)?,
    })
}
