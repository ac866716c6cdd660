//! Shared state store abstraction.
//!
//! Round state, ancillary round keys, the wager hash, RTP counters, and the
//! distributed lease all live behind this trait. Production
//! runs it over Redis (`redis_store`); tests run it over an in-memory fake
//! (`memory`) so every algorithm above is testable without real infra.
//!
//! The wager append/remove and the RTP bet-record are compound
//! read-modify-write operations that must be atomic across processes — the
//! source implements them as server-side scripts, and this trait preserves
//! that shape rather than attempting a local lock.
//!
//! Blobs are passed as raw JSON strings rather than generic types so the
//! trait stays object-safe (`Arc<dyn StateStore>`); callers serialize with
//! `serde_json` at the edge, same as reading/writing any other wire format.

pub mod memory;
pub mod redis_store;

use crate::model::Wager;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct RtpRaw {
    pub total_bet: f64,
    pub total_won: f64,
    pub play_count: u64,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reads a JSON blob (round state, start snapshot, results array).
    async fn get_blob(&self, key: &str) -> Result<Option<String>>;

    /// Writes a complete JSON blob, replacing any previous value, with an
    /// optional TTL (ancillary round keys are TTL-bounded).
    async fn set_blob(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomic compare-and-set lease acquire/extend. Returns
    /// true iff the caller holds the lease after this call.
    async fn try_acquire_lease(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// Atomically appends a wager to the player's list under the round's
    /// wager hash — never overwrites existing entries.
    async fn append_wager(&self, bets_key: &str, player_id: &str, wager: &Wager) -> Result<()>;

    /// Atomically removes a wager by transaction id from the player's list.
    /// Deletes the player's field entirely if the list becomes empty.
    /// Returns the removed wager, or `None` if no match was found.
    async fn remove_wager(
        &self,
        bets_key: &str,
        player_id: &str,
        transaction_id: &str,
    ) -> Result<Option<Wager>>;

    /// Reads the full wager hash (every player's list) for the payout
    /// pipeline. Not required to be atomic with concurrent appends/removes —
    /// PAYOUT only runs once BETTING has closed.
    async fn get_all_wagers(&self, bets_key: &str) -> Result<HashMap<String, Vec<Wager>>>;

    /// Atomically records a bet against the RTP counters: if the current
    /// play count has reached `limit_playcount`, the counters are reset
    /// first, then `total_bet`/`play_count` are both incremented — as one
    /// indivisible operation.
    async fn rtp_record_bet(&self, rtp_key: &str, amount: f64, limit_playcount: u64) -> Result<()>;

    async fn rtp_record_win(&self, rtp_key: &str, amount: f64) -> Result<()>;

    async fn rtp_get(&self, rtp_key: &str) -> Result<RtpRaw>;

    async fn rtp_reset(&self, rtp_key: &str) -> Result<()>;
}

/// Convenience helpers layered over the object-safe byte-string trait so
/// call sites can work with typed values directly.
pub async fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get_blob(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn set_json<T: serde::Serialize + Sync>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set_blob(key, raw, ttl).await
}
