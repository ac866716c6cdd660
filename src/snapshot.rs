//! Market-data snapshot provider. Ingestion itself is an
//! external collaborator; this crate only defines the trait it is read
//! through plus a deterministic in-memory double for tests.

use crate::model::Snapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn get_snapshot(&self, market: &str) -> Option<Snapshot>;
}

pub fn is_fresh(snapshot: &Snapshot, now_ms: i64, max_age_seconds: u64) -> bool {
    let age_ms = now_ms.saturating_sub(snapshot.captured_at);
    age_ms >= 0 && age_ms <= (max_age_seconds as i64) * 1000
}

/// Deterministic test double: callers push snapshots in directly, no clock
/// or network involved.
#[derive(Default)]
pub struct FixedSnapshotProvider {
    snapshots: parking_lot::Mutex<HashMap<String, Snapshot>>,
}

impl FixedSnapshotProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, market: &str, snapshot: Snapshot) {
        self.snapshots.lock().insert(market.to_string(), snapshot);
    }

    pub fn clear(&self, market: &str) {
        self.snapshots.lock().remove(market);
    }
}

#[async_trait]
impl SnapshotProvider for FixedSnapshotProvider {
    async fn get_snapshot(&self, market: &str) -> Option<Snapshot> {
        self.snapshots.lock().get(market).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SymbolPrice;

    fn snapshot_at(captured_at: i64) -> Snapshot {
        let mut symbols = HashMap::new();
        symbols.insert("BTC".to_string(), SymbolPrice { price: 100.0 });
        Snapshot { symbols, captured_at }
    }

    #[test]
    fn freshness_window_is_inclusive() {
        let snap = snapshot_at(1_000);
        assert!(is_fresh(&snap, 1_000 + 5_000, 5));
        assert!(!is_fresh(&snap, 1_000 + 5_001, 5));
    }

    #[tokio::test]
    async fn fixed_provider_returns_pushed_snapshot() {
        let provider = FixedSnapshotProvider::new();
        assert!(provider.get_snapshot("BTC").await.is_none());
        provider.set("BTC", snapshot_at(42));
        let snap = provider.get_snapshot("BTC").await.unwrap();
        assert_eq!(snap.captured_at, 42);
    }
}
