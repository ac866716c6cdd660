//! Durable per-market RTP counters with auto-reset. Store
//! errors here are never the caller's problem — logged at `warn` and
//! swallowed rather than surfaced to the caller.

use crate::config::RtpConfig;
use crate::store::StateStore;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct RtpMetrics {
    pub total_bet: f64,
    pub total_won: f64,
    pub play_count: u64,
    pub current_rtp: f64,
}

pub struct RtpTracker {
    store: Arc<dyn StateStore>,
    config: RtpConfig,
}

fn rtp_key(market: &str) -> String {
    format!("plinko:rtp:{market}")
}

impl RtpTracker {
    pub fn new(store: Arc<dyn StateStore>, config: RtpConfig) -> Self {
        Self { store, config }
    }

    pub async fn record_bet(&self, market: &str, amount: f64) {
        let key = rtp_key(market);
        if let Err(err) = self
            .store
            .rtp_record_bet(&key, amount, self.config.limit_playcount)
            .await
        {
            tracing::warn!(market, %err, "rtp record_bet failed, continuing without it");
        }
    }

    pub async fn record_win(&self, market: &str, amount: f64) {
        let key = rtp_key(market);
        if let Err(err) = self.store.rtp_record_win(&key, amount).await {
            tracing::warn!(market, %err, "rtp record_win failed, continuing without it");
        }
    }

    pub async fn get_metrics(&self, market: &str) -> RtpMetrics {
        let key = rtp_key(market);
        match self.store.rtp_get(&key).await {
            Ok(raw) => {
                let current_rtp = if raw.total_bet > 0.0 {
                    raw.total_won / raw.total_bet * 100.0
                } else {
                    0.0
                };
                RtpMetrics {
                    total_bet: raw.total_bet,
                    total_won: raw.total_won,
                    play_count: raw.play_count,
                    current_rtp,
                }
            }
            Err(err) => {
                tracing::warn!(market, %err, "rtp get_metrics failed, returning zeroed metrics");
                RtpMetrics {
                    total_bet: 0.0,
                    total_won: 0.0,
                    play_count: 0,
                    current_rtp: 0.0,
                }
            }
        }
    }

    pub fn has_enough_data(&self, metrics: &RtpMetrics) -> bool {
        metrics.play_count >= self.config.threshold_playcount
    }

    pub async fn reset(&self, market: &str) {
        let key = rtp_key(market);
        if let Err(err) = self.store.rtp_reset(&key).await {
            tracing::warn!(market, %err, "rtp reset failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStateStore;

    fn tracker() -> RtpTracker {
        RtpTracker::new(Arc::new(InMemoryStateStore::new()), RtpConfig::default())
    }

    #[tokio::test]
    async fn record_bet_increments_play_count_and_total() {
        let tracker = tracker();
        tracker.record_bet("BTC", 10.0).await;
        tracker.record_bet("BTC", 5.0).await;
        let metrics = tracker.get_metrics("BTC").await;
        assert_eq!(metrics.play_count, 2);
        assert_eq!(metrics.total_bet, 15.0);
        assert_eq!(metrics.total_won, 0.0);
    }

    #[tokio::test]
    async fn reset_at_limit_then_increments_to_one() {
        let mut config = RtpConfig::default();
        config.limit_playcount = 2;
        let tracker = RtpTracker::new(Arc::new(InMemoryStateStore::new()), config);
        tracker.record_bet("BTC", 10.0).await;
        tracker.record_bet("BTC", 10.0).await;
        // Third bet crosses the limit and resets first.
        tracker.record_bet("BTC", 7.0).await;
        let metrics = tracker.get_metrics("BTC").await;
        assert_eq!(metrics.play_count, 1);
        assert_eq!(metrics.total_bet, 7.0);
    }

    #[tokio::test]
    async fn has_enough_data_respects_threshold() {
        let mut config = RtpConfig::default();
        config.threshold_playcount = 5;
        let tracker = RtpTracker::new(Arc::new(InMemoryStateStore::new()), config);
        for _ in 0..4 {
            tracker.record_bet("BTC", 1.0).await;
        }
        let metrics = tracker.get_metrics("BTC").await;
        assert!(!tracker.has_enough_data(&metrics));
        tracker.record_bet("BTC", 1.0).await;
        let metrics = tracker.get_metrics("BTC").await;
        assert!(tracker.has_enough_data(&metrics));
    }
}
