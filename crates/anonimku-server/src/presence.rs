//! Presence lease sweeper.
//!
//! A user's lease is renewed whenever they sign in, go online, search for a
//! match or ping over a user subscription. Pairing already ignores expired
//! leases; this task also flips `is_online` so the stored flag catches up.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::service::Matchmaker;

pub fn spawn_sweeper(matchmaker: Matchmaker, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            sweep(&matchmaker).await;
        }
    })
}

async fn sweep(matchmaker: &Matchmaker) {
    let mm = matchmaker.clone();
    match tokio::task::spawn_blocking(move || mm.expire_stale_presence()).await {
        Ok(Ok(0)) => debug!("Presence sweep: nothing expired"),
        Ok(Ok(n)) => info!(expired = n, "Presence sweep marked users offline"),
        Ok(Err(e)) => warn!(error = %e, "Presence sweep failed"),
        Err(e) => warn!(error = %e, "Presence sweep task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use anonimku_store::Database;

    #[tokio::test]
    async fn sweeper_marks_expired_users_offline() {
        let config = ServerConfig {
            presence_ttl: Duration::from_secs(1),
            ..ServerConfig::default()
        };
        let mm = Matchmaker::new(Database::open_in_memory().unwrap(), &config).unwrap();
        let user = mm.sign_in("Ayu", "0811111111").unwrap().id;

        sweep(&mm).await;
        assert!(mm.get_user(user).unwrap().is_online);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let handle = spawn_sweeper(mm.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(!mm.get_user(user).unwrap().is_online);
    }
}
