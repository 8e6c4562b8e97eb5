//! Polling match search.
//!
//! The client asks for a match every `interval` until one is found or
//! `timeout` elapses. "Nobody available" is the normal answer while
//! waiting and is not logged. Transient failures are logged and the search
//! keeps going. Dropping the returned future cancels the search.

use std::future::Future;
use std::time::Duration;

use anonimku_shared::constants::{SEARCH_POLL_INTERVAL, SEARCH_TIMEOUT};
use anonimku_shared::types::{MatchId, UserId};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::error::Result;

/// Something that can make one pairing attempt.
pub trait MatchFinder {
    fn attempt(&self, user_id: UserId) -> impl Future<Output = Result<Option<MatchId>>> + Send;
}

impl MatchFinder for ApiClient {
    fn attempt(&self, user_id: UserId) -> impl Future<Output = Result<Option<MatchId>>> + Send {
        self.find_match(user_id)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            interval: SEARCH_POLL_INTERVAL,
            timeout: SEARCH_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Matched(MatchId),
    TimedOut,
}

/// Poll `finder` until a match is found or the timeout passes. A
/// non-transient error ends the search early.
pub async fn search_for_match<F: MatchFinder>(
    finder: &F,
    user_id: UserId,
    options: SearchOptions,
) -> Result<SearchOutcome> {
    let polling = async {
        let mut interval = tokio::time::interval(options.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts: u32 = 0;

        loop {
            interval.tick().await;
            attempts += 1;
            match finder.attempt(user_id).await {
                Ok(Some(match_id)) => {
                    info!(user = %user_id, match_id = %match_id, attempts, "Match found");
                    return Ok(match_id);
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    warn!(user = %user_id, error = %e, attempts, "Match search attempt failed");
                }
                Err(e) => return Err(e),
            }
        }
    };

    match tokio::time::timeout(options.timeout, polling).await {
        Ok(found) => found.map(SearchOutcome::Matched),
        Err(_) => {
            info!(user = %user_id, "Match search timed out");
            Ok(SearchOutcome::TimedOut)
        }
    }
}
