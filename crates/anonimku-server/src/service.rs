//! The matchmaking service: one writer connection behind a mutex, a small
//! pool of read-only connections, plus the bus.
//!
//! Every write locks the writer, runs the store operation, publishes the
//! resulting change events and only then releases the lock, so subscribers
//! see changes in commit order. Reads run on a separate connection inside a
//! snapshot and never wait for the writer. Operations are synchronous; async
//! callers run them on the blocking pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anonimku_shared::models::{ActiveMatch, Match, Message, RevealRequest, RevealResponse, User};
use anonimku_shared::protocol::{ChangeEvent, Record};
use anonimku_shared::types::{MatchId, RevealRequestId, UserId};
use anonimku_store::{Database, Pairing, RevealResolution, Termination};
use chrono::Utc;
use tracing::{debug, info};

use crate::bus::{NotificationBus, Subscriber};
use crate::config::ServerConfig;
use crate::error::ServerError;

pub type Result<T> = std::result::Result<T, ServerError>;

const READERS: usize = 4;

#[derive(Clone)]
pub struct Matchmaker {
    writer: Arc<Mutex<Database>>,
    readers: Arc<Vec<Mutex<Database>>>,
    next_reader: Arc<AtomicUsize>,
    bus: NotificationBus,
    presence_ttl: chrono::Duration,
    max_message_len: usize,
}

impl Matchmaker {
    /// Wrap an open, migrated store. File-backed stores also get read-only
    /// connections; an in-memory store serves reads from the writer.
    pub fn new(db: Database, config: &ServerConfig) -> anonimku_store::Result<Self> {
        let readers = match db.path() {
            Some(path) => (0..READERS)
                .map(|_| Database::open_reader(&path).map(Mutex::new))
                .collect::<anonimku_store::Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        debug!(readers = readers.len(), "Matchmaker ready");

        Ok(Self {
            writer: Arc::new(Mutex::new(db)),
            readers: Arc::new(readers),
            next_reader: Arc::new(AtomicUsize::new(0)),
            bus: NotificationBus::new(config.subscriber_buffer),
            presence_ttl: config.presence_ttl_chrono(),
            max_message_len: config.max_message_len,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.writer
            .lock()
            .map_err(|_| ServerError::Internal("store mutex poisoned".into()))
    }

    /// Run a read on the first idle reader, or queue on one in turn when all
    /// are busy.
    fn read<T>(&self, op: impl FnOnce(&Database) -> anonimku_store::Result<T>) -> Result<T> {
        if self.readers.is_empty() {
            let db = self.lock()?;
            return Ok(op(&db)?);
        }
        for reader in self.readers.iter() {
            if let Ok(db) = reader.try_lock() {
                return Ok(db.snapshot(op)?);
            }
        }
        let slot = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let db = self.readers[slot]
            .lock()
            .map_err(|_| ServerError::Internal("reader mutex poisoned".into()))?;
        Ok(db.snapshot(op)?)
    }

    pub fn subscribe(&self) -> Subscriber {
        self.bus.register()
    }

    // -------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------

    pub fn sign_in(&self, name: &str, phone: &str) -> Result<User> {
        Ok(self.lock()?.upsert_user(name, phone)?)
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.read(|db| db.get_user(id))
    }

    pub fn set_online_status(&self, id: UserId, online: bool) -> Result<User> {
        let user = self.lock()?.set_online_status(id, online)?;
        debug!(user = %id, online, "Presence changed");
        Ok(user)
    }

    pub fn touch_presence(&self, id: UserId) -> Result<()> {
        Ok(self.lock()?.touch_presence(id)?)
    }

    /// Flip everyone whose presence lease has run out to offline.
    pub fn expire_stale_presence(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.presence_ttl;
        Ok(self.lock()?.expire_stale_presence(cutoff)?)
    }

    // -------------------------------------------------------------------
    // Matches
    // -------------------------------------------------------------------

    /// One pairing attempt. `None` means nobody is available yet.
    pub fn find_match(&self, user_id: UserId) -> Result<Option<MatchId>> {
        let mut db = self.lock()?;
        match db.find_match(user_id, self.presence_ttl)? {
            Pairing::Created(created) => {
                let id = created.id;
                self.bus
                    .publish(&ChangeEvent::insert(Record::Matches(created)));
                Ok(Some(id))
            }
            Pairing::AlreadyMatched(existing) => Ok(Some(existing.id)),
            Pairing::NoCandidate => Ok(None),
        }
    }

    pub fn get_active_match(&self, user_id: UserId) -> Result<ActiveMatch> {
        self.read(|db| db.get_active_match(user_id))
    }

    pub fn end_match(&self, id: MatchId) -> Result<Match> {
        let mut db = self.lock()?;
        match db.end_match(id)? {
            Termination::Ended(ended) => {
                self.bus
                    .publish(&ChangeEvent::update(Record::Matches(ended.clone())));
                Ok(ended)
            }
            Termination::AlreadyEnded(ended) => {
                debug!(match_id = %id, "Match already ended");
                Ok(ended)
            }
        }
    }

    // -------------------------------------------------------------------
    // Messages
    // -------------------------------------------------------------------

    pub fn send_message(&self, match_id: MatchId, sender_id: UserId, content: &str) -> Result<Message> {
        let mut db = self.lock()?;
        let message = db.append_message(match_id, sender_id, content, self.max_message_len)?;
        self.bus
            .publish(&ChangeEvent::insert(Record::Messages(message.clone())));
        Ok(message)
    }

    pub fn list_messages(&self, match_id: MatchId) -> Result<Vec<Message>> {
        self.read(|db| db.list_messages(match_id))
    }

    /// Returns how many messages changed.
    pub fn mark_messages_read(&self, match_id: MatchId, reader_id: UserId) -> Result<usize> {
        let mut db = self.lock()?;
        let changed = db.mark_messages_read(match_id, reader_id)?;
        for message in &changed {
            self.bus
                .publish(&ChangeEvent::update(Record::Messages(message.clone())));
        }
        Ok(changed.len())
    }

    // -------------------------------------------------------------------
    // Reveal consent
    // -------------------------------------------------------------------

    pub fn request_reveal(
        &self,
        match_id: MatchId,
        requester_id: UserId,
        target_id: UserId,
    ) -> Result<RevealRequest> {
        let mut db = self.lock()?;
        let request = db.request_reveal(match_id, requester_id, target_id)?;
        self.bus
            .publish(&ChangeEvent::insert(Record::RevealRequests(request.clone())));
        Ok(request)
    }

    pub fn respond_to_reveal(
        &self,
        request_id: RevealRequestId,
        responder_id: UserId,
        response: RevealResponse,
    ) -> Result<RevealResolution> {
        let mut db = self.lock()?;
        let resolution = db.respond_to_reveal(request_id, responder_id, response)?;

        self.bus.publish(&ChangeEvent::update(Record::RevealRequests(
            resolution.request.clone(),
        )));
        if let Some(revealed) = &resolution.revealed_match {
            info!(match_id = %revealed.id, "Profiles revealed");
            self.bus
                .publish(&ChangeEvent::update(Record::Matches(revealed.clone())));
        }
        Ok(resolution)
    }

    pub fn list_pending_reveal_requests(&self, user_id: UserId) -> Result<Vec<RevealRequest>> {
        self.read(|db| db.list_pending_reveal_requests(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anonimku_shared::models::{MatchStatus, RevealStatus};
    use anonimku_shared::protocol::{ChangeKind, Table, Topic};
    use std::collections::HashSet;

    fn service() -> Matchmaker {
        Matchmaker::new(Database::open_in_memory().unwrap(), &ServerConfig::default()).unwrap()
    }

    #[test]
    fn reads_do_not_wait_for_the_writer() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("chat.db")).unwrap();
        let mm = Matchmaker::new(db, &ServerConfig::default()).unwrap();

        let a = mm.sign_in("A", "0811111111").unwrap().id;
        mm.sign_in("B", "0822222222").unwrap();
        let id = mm.find_match(a).unwrap().unwrap();
        mm.send_message(id, a, "hello").unwrap();

        let writer = mm.lock().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let reader = mm.clone();
        std::thread::spawn(move || {
            let messages = reader.list_messages(id);
            let active = reader.get_active_match(a);
            tx.send((messages, active)).unwrap();
        });

        let (messages, active) = rx
            .recv_timeout(std::time::Duration::from_secs(2))
            .expect("reads blocked behind the writer");
        drop(writer);

        let messages = messages.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(active.unwrap().current.id, id);
    }

    #[tokio::test]
    async fn pairing_notifies_both_users() {
        let mm = service();
        let a = mm.sign_in("Ayu", "0811111111").unwrap().id;
        let b = mm.sign_in("Bima", "0822222222").unwrap().id;

        let mut sub_a = mm.subscribe();
        sub_a.subscribe(Topic::User(a), vec![Table::Matches]);
        let mut sub_b = mm.subscribe();
        sub_b.subscribe(Topic::User(b), vec![Table::Matches]);

        let id = mm.find_match(a).unwrap().unwrap();
        assert_eq!(mm.find_match(b).unwrap(), Some(id));

        for sub in [&mut sub_a, &mut sub_b] {
            let event = sub.recv().await.unwrap();
            assert_eq!(event.kind, ChangeKind::Insert);
            match event.record {
                Record::Matches(m) => assert_eq!(m.id, id),
                other => panic!("unexpected record {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn hello_hi_reaches_match_subscribers_in_order() {
        let mm = service();
        let a = mm.sign_in("A", "0811111111").unwrap().id;
        let b = mm.sign_in("B", "0822222222").unwrap().id;
        let id = mm.find_match(a).unwrap().unwrap();

        let mut sub = mm.subscribe();
        sub.subscribe(Topic::Match(id), vec![Table::Messages]);

        mm.send_message(id, a, "hello").unwrap();
        mm.send_message(id, b, "hi").unwrap();

        let mut seen = Vec::new();
        for _ in 0..2 {
            match sub.recv().await.unwrap().record {
                Record::Messages(m) => seen.push(m.content),
                other => panic!("unexpected record {other:?}"),
            }
        }
        assert_eq!(seen, ["hello", "hi"]);

        assert_eq!(mm.mark_messages_read(id, b).unwrap(), 1);
        match sub.recv().await.unwrap() {
            ChangeEvent { kind: ChangeKind::Update, record: Record::Messages(m) } => {
                assert_eq!(m.content, "hello");
                assert!(m.is_read);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn reveal_flow_notifies_target_and_match() {
        let mm = service();
        let a = mm.sign_in("A", "0811111111").unwrap().id;
        let b = mm.sign_in("B", "0822222222").unwrap().id;
        let id = mm.find_match(a).unwrap().unwrap();

        let mut target = mm.subscribe();
        target.subscribe(Topic::User(b), vec![Table::RevealRequests]);
        let mut room = mm.subscribe();
        room.subscribe(Topic::Match(id), vec![Table::Matches]);

        let request = mm.request_reveal(id, a, b).unwrap();
        match target.recv().await.unwrap().record {
            Record::RevealRequests(r) => assert_eq!(r.id, request.id),
            other => panic!("unexpected record {other:?}"),
        }

        let resolution = mm
            .respond_to_reveal(request.id, b, RevealResponse::Accepted)
            .unwrap();
        assert_eq!(resolution.request.status, RevealStatus::Accepted);

        match room.recv().await.unwrap().record {
            Record::Matches(m) => assert!(m.both_profiles_revealed),
            other => panic!("unexpected record {other:?}"),
        }
        assert!(mm.get_active_match(a).unwrap().partner.name.is_some());
    }

    #[tokio::test]
    async fn ending_twice_publishes_once() {
        let mm = service();
        let a = mm.sign_in("A", "0811111111").unwrap().id;
        mm.sign_in("B", "0822222222").unwrap();
        let id = mm.find_match(a).unwrap().unwrap();

        let mut sub = mm.subscribe();
        sub.subscribe(Topic::Match(id), vec![]);

        let first = mm.end_match(id).unwrap();
        let second = mm.end_match(id).unwrap();
        assert_eq!(first.status, MatchStatus::Ended);
        assert_eq!(first.ended_at, second.ended_at);

        assert!(sub.recv().await.is_some());
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv())
                .await
                .is_err()
        );
        assert!(matches!(mm.get_active_match(a), Err(ServerError::NotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_searches_never_double_pair() {
        let mm = service();
        let mut users = Vec::new();
        for i in 0..9 {
            users.push(mm.sign_in(&format!("U{i}"), &format!("08100000{i:02}")).unwrap().id);
        }

        let mut handles = Vec::new();
        for user in users.clone() {
            let mm = mm.clone();
            handles.push(tokio::task::spawn_blocking(move || mm.find_match(user)));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        // Everyone polls once more, as the client does.
        for &user in &users {
            mm.find_match(user).unwrap();
        }

        let mut matched = HashSet::new();
        let mut pairs = 0;
        for &user in &users {
            if let Ok(active) = mm.get_active_match(user) {
                assert!(matched.insert(user));
                assert_ne!(active.partner.id, user);
                if active.current.user1_id == user {
                    pairs += 1;
                }
            }
        }
        assert_eq!(pairs, 4);
        assert_eq!(matched.len(), 8);
    }
}
