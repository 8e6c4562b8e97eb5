//! Reveal consent protocol.
//!
//! Per match: `NoRequest -> Pending -> {Accepted, Rejected}`.  At most one
//! request is pending per match, a request is resolved exactly once and only
//! by its target, and acceptance flips `both_profiles_revealed` in the same
//! transaction that marks the request accepted.
//!
//! After a rejection a new request may be issued by either participant.

use anonimku_shared::error::ValidationError;
use anonimku_shared::types::{MatchId, RevealRequestId, UserId};
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::matches::load_match;
use crate::models::{
    Match, RevealRequest, RevealResolution, RevealResponse, RevealStatus,
};
use crate::rows::{not_found, now, parse_enum, parse_opt_ts, parse_ts, parse_uuid, ts};
use crate::users::load_user;

const REVEAL_COLUMNS: &str =
    "r.id, r.match_id, r.requester_id, r.target_id, r.status, r.created_at, r.responded_at";

impl Database {
    pub fn request_reveal(
        &mut self,
        match_id: MatchId,
        requester_id: UserId,
        target_id: UserId,
    ) -> Result<RevealRequest> {
        let tx = self.immediate()?;
        let current = load_match(&tx, match_id)?;

        if !current.is_active() {
            return Err(ValidationError::MatchNotActive.into());
        }
        if requester_id == target_id {
            return Err(ValidationError::SelfTarget.into());
        }
        if !current.has_participant(requester_id) || !current.has_participant(target_id) {
            return Err(ValidationError::NotParticipant.into());
        }
        if current.both_profiles_revealed {
            return Err(StoreError::Conflict("profiles are already revealed".into()));
        }

        let pending: Option<String> = tx
            .query_row(
                "SELECT id FROM reveal_requests WHERE match_id = ?1 AND status = 'pending'",
                params![match_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if pending.is_some() {
            return Err(StoreError::Conflict(
                "a reveal request is already pending for this match".into(),
            ));
        }

        let request = RevealRequest {
            id: RevealRequestId::new(),
            match_id,
            requester_id,
            target_id,
            status: RevealStatus::Pending,
            created_at: now(),
            responded_at: None,
        };

        tx.execute(
            "INSERT INTO reveal_requests (id, match_id, requester_id, target_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            params![
                request.id.to_string(),
                request.match_id.to_string(),
                request.requester_id.to_string(),
                request.target_id.to_string(),
                ts(&request.created_at),
            ],
        )
        .map_err(|e| {
            StoreError::on_constraint(e, "a reveal request is already pending for this match")
        })?;
        tx.commit()?;

        tracing::info!(
            match_id = %match_id,
            request_id = %request.id,
            "reveal requested"
        );
        Ok(request)
    }

    /// Resolve a pending request. Only the target may respond.
    pub fn respond_to_reveal(
        &mut self,
        request_id: RevealRequestId,
        responder_id: UserId,
        response: RevealResponse,
    ) -> Result<RevealResolution> {
        let tx = self.immediate()?;
        let request = load_reveal_request(&tx, request_id)?;

        if request.target_id != responder_id {
            return Err(ValidationError::NotRevealTarget.into());
        }
        if request.status != RevealStatus::Pending {
            return Err(StoreError::Conflict("reveal request is already resolved".into()));
        }

        let current = load_match(&tx, request.match_id)?;
        if !current.is_active() {
            return Err(ValidationError::MatchNotActive.into());
        }

        let status = RevealStatus::from(response);
        let responded_at = now();
        let affected = tx.execute(
            "UPDATE reveal_requests SET status = ?2, responded_at = ?3
             WHERE id = ?1 AND status = 'pending'",
            params![request_id.to_string(), status.as_str(), ts(&responded_at)],
        )?;
        if affected == 0 {
            return Err(StoreError::Conflict("reveal request is already resolved".into()));
        }

        let revealed_match = match response {
            RevealResponse::Accepted => Some(reveal_both(&tx, current)?),
            RevealResponse::Rejected => None,
        };

        tx.commit()?;

        tracing::info!(
            match_id = %request.match_id,
            request_id = %request_id,
            status = status.as_str(),
            "reveal request resolved"
        );

        Ok(RevealResolution {
            request: RevealRequest {
                status,
                responded_at: Some(responded_at),
                ..request
            },
            revealed_match,
        })
    }

    pub fn get_reveal_request(&self, id: RevealRequestId) -> Result<RevealRequest> {
        load_reveal_request(self.conn(), id)
    }

    /// Pending requests targeting `user_id` on matches that are still active.
    pub fn list_pending_reveal_requests(&self, user_id: UserId) -> Result<Vec<RevealRequest>> {
        load_user(self.conn(), user_id)?;

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {REVEAL_COLUMNS}
             FROM reveal_requests r
             JOIN matches m ON m.id = r.match_id
             WHERE r.target_id = ?1 AND r.status = 'pending' AND m.status = 'active'
             ORDER BY r.created_at ASC"
        ))?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_reveal)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }
}

/// Set the match flag and point each participant's `profile_revealed_to` at
/// the other. Runs inside the caller's transaction.
fn reveal_both(conn: &Connection, current: Match) -> Result<Match> {
    conn.execute(
        "UPDATE matches SET both_profiles_revealed = 1 WHERE id = ?1",
        params![current.id.to_string()],
    )?;
    conn.execute(
        "UPDATE users SET profile_revealed_to = CASE id WHEN ?1 THEN ?2 ELSE ?1 END
         WHERE id IN (?1, ?2)",
        params![current.user1_id.to_string(), current.user2_id.to_string()],
    )?;
    Ok(Match {
        both_profiles_revealed: true,
        ..current
    })
}

fn load_reveal_request(conn: &Connection, id: RevealRequestId) -> Result<RevealRequest> {
    conn.query_row(
        &format!("SELECT {REVEAL_COLUMNS} FROM reveal_requests r WHERE r.id = ?1"),
        params![id.to_string()],
        row_to_reveal,
    )
    .map_err(not_found("reveal request"))
}

fn row_to_reveal(row: &rusqlite::Row<'_>) -> rusqlite::Result<RevealRequest> {
    let id: String = row.get(0)?;
    let match_id: String = row.get(1)?;
    let requester: String = row.get(2)?;
    let target: String = row.get(3)?;
    let status: String = row.get(4)?;
    let created: String = row.get(5)?;

    Ok(RevealRequest {
        id: RevealRequestId(parse_uuid(0, &id)?),
        match_id: MatchId(parse_uuid(1, &match_id)?),
        requester_id: UserId(parse_uuid(2, &requester)?),
        target_id: UserId(parse_uuid(3, &target)?),
        status: parse_enum(4, &status, RevealStatus::parse)?,
        created_at: parse_ts(5, &created)?,
        responded_at: parse_opt_ts(6, row.get(6)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn paired() -> (Database, MatchId, UserId, UserId) {
        let mut db = Database::open_in_memory().unwrap();
        let a = db.upsert_user("Ayu", "0811111111").unwrap().id;
        let b = db.upsert_user("Bima", "0822222222").unwrap().id;
        let id = db
            .find_match(a, Duration::seconds(90))
            .unwrap()
            .match_id()
            .unwrap();
        (db, id, a, b)
    }

    #[test]
    fn reject_then_accept_reveals_both() {
        let (mut db, id, a, b) = paired();

        let first = db.request_reveal(id, a, b).unwrap();
        let rejected = db
            .respond_to_reveal(first.id, b, RevealResponse::Rejected)
            .unwrap();
        assert_eq!(rejected.request.status, RevealStatus::Rejected);
        assert!(rejected.revealed_match.is_none());
        assert!(!db.get_match(id).unwrap().both_profiles_revealed);

        let second = db.request_reveal(id, b, a).unwrap();
        let accepted = db
            .respond_to_reveal(second.id, a, RevealResponse::Accepted)
            .unwrap();
        assert_eq!(accepted.request.status, RevealStatus::Accepted);
        assert!(accepted.revealed_match.unwrap().both_profiles_revealed);
        assert!(db.get_match(id).unwrap().both_profiles_revealed);

        let seen_by_a = db.get_active_match(a).unwrap().partner;
        assert_eq!(seen_by_a.name.as_deref(), Some("Bima"));
        assert_eq!(seen_by_a.phone.as_deref(), Some("0822222222"));

        let seen_by_b = db.get_active_match(b).unwrap().partner;
        assert_eq!(seen_by_b.name.as_deref(), Some("Ayu"));

        assert_eq!(db.get_user(a).unwrap().profile_revealed_to, Some(b));
        assert_eq!(db.get_user(b).unwrap().profile_revealed_to, Some(a));
    }

    #[test]
    fn only_one_pending_request_per_match() {
        let (mut db, id, a, b) = paired();
        db.request_reveal(id, a, b).unwrap();

        assert!(matches!(
            db.request_reveal(id, b, a),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            db.request_reveal(id, a, b),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn resolution_happens_exactly_once() {
        let (mut db, id, a, b) = paired();
        let request = db.request_reveal(id, a, b).unwrap();

        db.respond_to_reveal(request.id, b, RevealResponse::Rejected)
            .unwrap();
        assert!(matches!(
            db.respond_to_reveal(request.id, b, RevealResponse::Accepted),
            Err(StoreError::Conflict(_))
        ));

        let stored = db.get_reveal_request(request.id).unwrap();
        assert_eq!(stored.status, RevealStatus::Rejected);
        assert!(!db.get_match(id).unwrap().both_profiles_revealed);
    }

    #[test]
    fn only_the_target_may_respond() {
        let (mut db, id, a, b) = paired();
        let request = db.request_reveal(id, a, b).unwrap();

        assert!(matches!(
            db.respond_to_reveal(request.id, a, RevealResponse::Accepted),
            Err(StoreError::Validation(ValidationError::NotRevealTarget))
        ));
        assert_eq!(
            db.get_reveal_request(request.id).unwrap().status,
            RevealStatus::Pending
        );
    }

    #[test]
    fn request_preconditions() {
        let (mut db, id, a, b) = paired();
        let outsider = db.upsert_user("Citra", "0833333333").unwrap().id;

        assert!(matches!(
            db.request_reveal(id, a, a),
            Err(StoreError::Validation(ValidationError::SelfTarget))
        ));
        assert!(matches!(
            db.request_reveal(id, outsider, b),
            Err(StoreError::Validation(ValidationError::NotParticipant))
        ));
        assert!(matches!(
            db.request_reveal(MatchId::new(), a, b),
            Err(StoreError::NotFound("match"))
        ));

        let request = db.request_reveal(id, a, b).unwrap();
        db.respond_to_reveal(request.id, b, RevealResponse::Accepted)
            .unwrap();
        assert!(matches!(
            db.request_reveal(id, b, a),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn ended_match_freezes_reveals() {
        let (mut db, id, a, b) = paired();
        let request = db.request_reveal(id, a, b).unwrap();
        assert_eq!(db.list_pending_reveal_requests(b).unwrap().len(), 1);

        db.end_match(id).unwrap();

        assert!(db.list_pending_reveal_requests(b).unwrap().is_empty());
        assert!(matches!(
            db.respond_to_reveal(request.id, b, RevealResponse::Accepted),
            Err(StoreError::Validation(ValidationError::MatchNotActive))
        ));
        assert!(matches!(
            db.request_reveal(id, b, a),
            Err(StoreError::Validation(ValidationError::MatchNotActive))
        ));
    }

    #[test]
    fn ending_a_match_clears_revealed_profiles() {
        let (mut db, id, a, b) = paired();
        let request = db.request_reveal(id, a, b).unwrap();
        db.respond_to_reveal(request.id, b, RevealResponse::Accepted)
            .unwrap();

        db.end_match(id).unwrap();

        assert_eq!(db.get_user(a).unwrap().profile_revealed_to, None);
        assert_eq!(db.get_user(b).unwrap().profile_revealed_to, None);
        assert!(db.get_match(id).unwrap().both_profiles_revealed);
    }

    fn paired_at(path: &std::path::Path) -> (MatchId, UserId, UserId) {
        let mut db = Database::open_at(path).unwrap();
        let a = db.upsert_user("Ayu", "0811111111").unwrap().id;
        let b = db.upsert_user("Bima", "0822222222").unwrap().id;
        let id = db
            .find_match(a, Duration::seconds(90))
            .unwrap()
            .match_id()
            .unwrap();
        (id, a, b)
    }

    #[test]
    fn concurrent_responses_resolve_once() {
        for round in 0..4usize {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("reveals.db");
            let (id, a, b) = paired_at(&path);
            let request_id = Database::open_at(&path)
                .unwrap()
                .request_reveal(id, a, b)
                .unwrap()
                .id;

            let results: Vec<_> = std::thread::scope(|s| {
                let handles: Vec<_> = (0..6usize)
                    .map(|i| {
                        let path = path.clone();
                        let response = if (i + round) % 2 == 0 {
                            RevealResponse::Accepted
                        } else {
                            RevealResponse::Rejected
                        };
                        s.spawn(move || {
                            let mut db = Database::open_at(&path).unwrap();
                            db.respond_to_reveal(request_id, b, response)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
            assert_eq!(winners.len(), 1, "round {round}");
            assert!(results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, StoreError::Conflict(_))));

            let winner = winners[0];
            let db = Database::open_at(&path).unwrap();
            let stored = db.get_reveal_request(request_id).unwrap();
            assert_eq!(stored.status, winner.request.status);

            let accepted = winner.request.status == RevealStatus::Accepted;
            assert_eq!(winner.revealed_match.is_some(), accepted);
            assert_eq!(db.get_match(id).unwrap().both_profiles_revealed, accepted);
        }
    }

    #[test]
    fn concurrent_requests_leave_one_pending() {
        for round in 0..4usize {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("reveals.db");
            let (id, a, b) = paired_at(&path);

            let results: Vec<_> = std::thread::scope(|s| {
                let handles: Vec<_> = (0..6usize)
                    .map(|i| {
                        let path = path.clone();
                        let (from, to) = if (i + round) % 2 == 0 { (a, b) } else { (b, a) };
                        s.spawn(move || {
                            let mut db = Database::open_at(&path).unwrap();
                            db.request_reveal(id, from, to)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let created: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
            assert_eq!(created.len(), 1, "round {round}");
            assert!(results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, StoreError::Conflict(_))));

            let db = Database::open_at(&path).unwrap();
            let request = created[0];
            let pending = db.list_pending_reveal_requests(request.target_id).unwrap();
            assert_eq!(pending, vec![request.clone()]);
            assert!(db
                .list_pending_reveal_requests(request.requester_id)
                .unwrap()
                .is_empty());
            assert!(!db.get_match(id).unwrap().both_profiles_revealed);
        }
    }

    #[test]
    fn pending_list_targets_only() {
        let (mut db, id, a, b) = paired();
        let request = db.request_reveal(id, a, b).unwrap();

        assert!(db.list_pending_reveal_requests(a).unwrap().is_empty());
        assert_eq!(db.list_pending_reveal_requests(b).unwrap(), vec![request]);
        assert!(matches!(
            db.list_pending_reveal_requests(UserId::new()),
            Err(StoreError::NotFound("user"))
        ));
    }
}
