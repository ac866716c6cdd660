//! In-memory `StateStore` fake, a `parking_lot::Mutex<HashMap>` the same
//! shape as any in-process per-key counter map, used here so every core
//! algorithm is unit-testable without real infra.

use super::{RtpRaw, StateStore};
use crate::model::Wager;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct RtpEntry {
    total_bet: f64,
    total_won: f64,
    play_count: u64,
}

#[derive(Default)]
pub struct InMemoryStateStore {
    blobs: Mutex<HashMap<String, Entry>>,
    leases: Mutex<HashMap<String, (String, Instant)>>,
    wagers: Mutex<HashMap<String, HashMap<String, Vec<Wager>>>>,
    rtp: Mutex<HashMap<String, RtpEntry>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_live(blobs: &HashMap<String, Entry>, key: &str) -> Option<String> {
        blobs.get(key).and_then(|e| match e.expires_at {
            Some(t) if Instant::now() > t => None,
            _ => Some(e.value.clone()),
        })
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get_blob(&self, key: &str) -> Result<Option<String>> {
        let blobs = self.blobs.lock();
        Ok(Self::read_live(&blobs, key))
    }

    async fn set_blob(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let mut blobs = self.blobs.lock();
        blobs.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs.lock().remove(key);
        Ok(())
    }

    async fn try_acquire_lease(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut leases = self.leases.lock();
        let now = Instant::now();
        match leases.get(key) {
            Some((current_holder, expires_at)) if *expires_at > now && current_holder != holder => {
                Ok(false)
            }
            _ => {
                leases.insert(key.to_string(), (holder.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn append_wager(&self, bets_key: &str, player_id: &str, wager: &Wager) -> Result<()> {
        let mut wagers = self.wagers.lock();
        wagers
            .entry(bets_key.to_string())
            .or_default()
            .entry(player_id.to_string())
            .or_default()
            .push(wager.clone());
        Ok(())
    }

    async fn remove_wager(
        &self,
        bets_key: &str,
        player_id: &str,
        transaction_id: &str,
    ) -> Result<Option<Wager>> {
        let mut wagers = self.wagers.lock();
        let Some(round) = wagers.get_mut(bets_key) else {
            return Ok(None);
        };
        let Some(list) = round.get_mut(player_id) else {
            return Ok(None);
        };
        let pos = list.iter().position(|w| w.transaction_id == transaction_id);
        let removed = match pos {
            Some(i) => Some(list.remove(i)),
            None => None,
        };
        if list.is_empty() {
            round.remove(player_id);
        }
        Ok(removed)
    }

    async fn get_all_wagers(&self, bets_key: &str) -> Result<HashMap<String, Vec<Wager>>> {
        Ok(self
            .wagers
            .lock()
            .get(bets_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn rtp_record_bet(&self, rtp_key: &str, amount: f64, limit_playcount: u64) -> Result<()> {
        let mut rtp = self.rtp.lock();
        let entry = rtp.entry(rtp_key.to_string()).or_default();
        if entry.play_count >= limit_playcount {
            *entry = RtpEntry::default();
        }
        entry.total_bet += amount;
        entry.play_count += 1;
        Ok(())
    }

    async fn rtp_record_win(&self, rtp_key: &str, amount: f64) -> Result<()> {
        let mut rtp = self.rtp.lock();
        rtp.entry(rtp_key.to_string()).or_default().total_won += amount;
        Ok(())
    }

    async fn rtp_get(&self, rtp_key: &str) -> Result<RtpRaw> {
        let rtp = self.rtp.lock();
        Ok(match rtp.get(rtp_key) {
            Some(e) => RtpRaw {
                total_bet: e.total_bet,
                total_won: e.total_won,
                play_count: e.play_count,
            },
            None => RtpRaw::default(),
        })
    }

    async fn rtp_reset(&self, rtp_key: &str) -> Result<()> {
        self.rtp.lock().remove(rtp_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lease_is_exclusive_until_expiry() {
        let store = InMemoryStateStore::new();
        assert!(store
            .try_acquire_lease("lock:gameloop:A", "inst-1", Duration::from_secs(10))
            .await
            .unwrap());
        // Different holder fails while the lease is live.
        assert!(!store
            .try_acquire_lease("lock:gameloop:A", "inst-2", Duration::from_secs(10))
            .await
            .unwrap());
        // Same holder may extend.
        assert!(store
            .try_acquire_lease("lock:gameloop:A", "inst-1", Duration::from_secs(10))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn wager_append_and_remove_round_trips() {
        let store = InMemoryStateStore::new();
        let wager = Wager {
            transaction_id: "tx-1".into(),
            player_id: "p1".into(),
            tenant_id: "t1".into(),
            session_token: "sess".into(),
            currency: "USD".into(),
            amount: 10.0,
            symbols: vec!["BTC".into()],
            placed_at: 0,
        };
        store.append_wager("bets:A:1", "p1", &wager).await.unwrap();
        let all = store.get_all_wagers("bets:A:1").await.unwrap();
        assert_eq!(all.get("p1").unwrap().len(), 1);

        let removed = store
            .remove_wager("bets:A:1", "p1", "tx-1")
            .await
            .unwrap();
        assert_eq!(removed, Some(wager));
        let all = store.get_all_wagers("bets:A:1").await.unwrap();
        assert!(all.get("p1").is_none());
    }

    #[tokio::test]
    async fn rtp_auto_resets_at_limit() {
        let store = InMemoryStateStore::new();
        for _ in 0..1000 {
            store.rtp_record_bet("rtp:A", 50.0, 1000).await.unwrap();
        }
        let metrics = store.rtp_get("rtp:A").await.unwrap();
        assert_eq!(metrics.play_count, 1000);

        store.rtp_record_win("rtp:A", 48_000.0).await.unwrap();

        // The 1001st bet crosses the limit and must reset first.
        store.rtp_record_bet("rtp:A", 50.0, 1000).await.unwrap();
        let metrics = store.rtp_get("rtp:A").await.unwrap();
        assert_eq!(metrics.play_count, 1);
        assert_eq!(metrics.total_bet, 50.0);
        assert_eq!(metrics.total_won, 0.0);
    }
}
