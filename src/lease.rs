//! Distributed exclusive-writer lease per market.

use crate::store::StateStore;
use std::sync::Arc;
use std::time::Duration;

pub struct LeaseManager {
    store: Arc<dyn StateStore>,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Attempts to claim or extend the lease `lock:gameloop:{market}` for
    /// `holder`. Any store round-trip failure is treated as "not leader" —
    /// the caller never learns why, only that it must not write this tick.
    pub async fn acquire_or_extend(&self, market: &str, holder: &str, ttl: Duration) -> bool {
        let key = format!("lock:gameloop:{market}");
        match self.store.try_acquire_lease(&key, holder, ttl).await {
            Ok(leader) => leader,
            Err(err) => {
                tracing::warn!(market, %err, "lease acquire failed, assuming not leader");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStateStore;

    #[tokio::test]
    async fn two_instances_cannot_both_lead() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let a = LeaseManager::new(store.clone());
        let b = LeaseManager::new(store);

        assert!(a.acquire_or_extend("BTC", "instance-a", Duration::from_secs(10)).await);
        assert!(!b.acquire_or_extend("BTC", "instance-b", Duration::from_secs(10)).await);
        // The leader can keep extending.
        assert!(a.acquire_or_extend("BTC", "instance-a", Duration::from_secs(10)).await);
    }
}
