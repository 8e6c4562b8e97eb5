//! Change notification bus.
//!
//! Committed row changes are fanned out to every subscriber of the topics
//! they touch. Delivery never blocks the publisher: each subscriber owns a
//! bounded channel and one whose buffer is full is evicted from the bus
//! instead of being waited on. The evicted connection is told through its
//! [`Notify`] handle and is expected to resubscribe and re-fetch.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anonimku_shared::protocol::{ChangeEvent, Record, Table, Topic};
use dashmap::DashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

/// One subscriber's interest in one topic.
#[derive(Clone)]
struct Route {
    subscriber: u64,
    /// Empty means every table.
    tables: Vec<Table>,
    tx: mpsc::Sender<ChangeEvent>,
    evicted: Arc<Notify>,
}

impl Route {
    fn wants(&self, table: Table) -> bool {
        self.tables.is_empty() || self.tables.contains(&table)
    }
}

#[derive(Clone)]
pub struct NotificationBus {
    topics: Arc<DashMap<Topic, Vec<Route>>>,
    next_id: Arc<AtomicU64>,
    buffer: usize,
}

impl NotificationBus {
    /// `buffer` is the number of undelivered events a subscriber may hold
    /// before it is evicted.
    pub fn new(buffer: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            buffer: buffer.max(1),
        }
    }

    /// Open a connection-scoped subscriber with no topics yet.
    pub fn register(&self) -> Subscriber {
        let (tx, rx) = mpsc::channel(self.buffer);
        Subscriber {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            bus: self.clone(),
            tx,
            rx,
            evicted: Arc::new(Notify::new()),
            topics: HashSet::new(),
        }
    }

    /// Deliver `event` to everyone subscribed to a topic the record belongs
    /// to. A subscriber on several of those topics receives it once.
    pub fn publish(&self, event: &ChangeEvent) {
        let table = event.table();
        let mut delivered = HashSet::new();
        let mut lagging = HashSet::new();

        for topic in topics_for(&event.record) {
            let emptied = {
                let Some(mut routes) = self.topics.get_mut(&topic) else {
                    continue;
                };
                routes.retain(|route| {
                    if !route.wants(table) || lagging.contains(&route.subscriber) {
                        return true;
                    }
                    if !delivered.insert(route.subscriber) {
                        return true;
                    }
                    match route.tx.try_send(event.clone()) {
                        Ok(()) => true,
                        Err(TrySendError::Full(_)) => {
                            warn!(
                                topic = %topic,
                                subscriber = route.subscriber,
                                "Evicting slow subscriber"
                            );
                            route.evicted.notify_one();
                            lagging.insert(route.subscriber);
                            false
                        }
                        Err(TrySendError::Closed(_)) => {
                            debug!(topic = %topic, subscriber = route.subscriber, "Pruning closed subscriber");
                            false
                        }
                    }
                });
                routes.is_empty()
            };
            if emptied {
                self.topics.remove_if(&topic, |_, routes| routes.is_empty());
            }
        }

        // An evicted subscriber loses every topic, not just this one.
        if !lagging.is_empty() {
            self.topics.retain(|_, routes| {
                routes.retain(|route| !lagging.contains(&route.subscriber));
                !routes.is_empty()
            });
        }
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map(|r| r.len()).unwrap_or(0)
    }

    fn attach(&self, topic: Topic, route: Route) {
        let mut routes = self.topics.entry(topic).or_default();
        routes.retain(|r| r.subscriber != route.subscriber);
        routes.push(route);
    }

    fn detach(&self, topic: &Topic, subscriber: u64) -> bool {
        let mut removed = false;
        self.topics.remove_if_mut(topic, |_, routes| {
            let before = routes.len();
            routes.retain(|r| r.subscriber != subscriber);
            removed = routes.len() != before;
            routes.is_empty()
        });
        removed
    }
}

/// Topics a changed row is published on.
///
/// Match rows reach the match topic and both participants' user topics,
/// messages reach the match topic, and reveal requests reach the match topic
/// plus the target's user topic.
pub fn topics_for(record: &Record) -> Vec<Topic> {
    match record {
        Record::Matches(m) => vec![
            Topic::Match(m.id),
            Topic::User(m.user1_id),
            Topic::User(m.user2_id),
        ],
        Record::Messages(msg) => vec![Topic::Match(msg.match_id)],
        Record::RevealRequests(req) => {
            vec![Topic::Match(req.match_id), Topic::User(req.target_id)]
        }
    }
}

/// A connection's view of the bus. Dropping it removes every subscription.
pub struct Subscriber {
    id: u64,
    bus: NotificationBus,
    tx: mpsc::Sender<ChangeEvent>,
    rx: mpsc::Receiver<ChangeEvent>,
    evicted: Arc<Notify>,
    topics: HashSet<Topic>,
}

impl Subscriber {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Subscribe to `topic`, replacing any earlier table filter for it.
    pub fn subscribe(&mut self, topic: Topic, tables: Vec<Table>) {
        self.bus.attach(
            topic,
            Route {
                subscriber: self.id,
                tables,
                tx: self.tx.clone(),
                evicted: self.evicted.clone(),
            },
        );
        self.topics.insert(topic);
        info!(
            subscriber = self.id,
            topic = %topic,
            subscribers = self.bus.subscriber_count(&topic),
            "Subscribed"
        );
    }

    /// Returns false if the subscriber was not on `topic`.
    pub fn unsubscribe(&mut self, topic: &Topic) -> bool {
        self.topics.remove(topic);
        self.bus.detach(topic, self.id)
    }

    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.topics.iter()
    }

    /// Next delivered event, in publish order.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Fires once if the bus drops this subscriber for falling behind.
    pub fn eviction(&self) -> Arc<Notify> {
        self.evicted.clone()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        for topic in &self.topics {
            self.bus.detach(topic, self.id);
        }
        debug!(subscriber = self.id, "Subscriber closed");
    }
}
