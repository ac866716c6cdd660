//! Circuit breaker and refund logic. Tripping never raises —
//! every failure here is logged and the scheduler keeps going.

use crate::model::{Phase, RoundState};
use crate::snapshot::{is_fresh, SnapshotProvider};
use crate::store::StateStore;
use crate::transport::{MarketStatus, RoomBroadcaster};
use crate::wallet::{CreditRequest, CreditType, WalletGateway};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct CircuitBreaker {
    snapshot_provider: Arc<dyn SnapshotProvider>,
    store: Arc<dyn StateStore>,
    wallet: Arc<dyn WalletGateway>,
    broadcaster: Arc<dyn RoomBroadcaster>,
    freshness: Duration,
}

impl CircuitBreaker {
    pub fn new(
        snapshot_provider: Arc<dyn SnapshotProvider>,
        store: Arc<dyn StateStore>,
        wallet: Arc<dyn WalletGateway>,
        broadcaster: Arc<dyn RoomBroadcaster>,
        freshness: Duration,
    ) -> Self {
        Self {
            snapshot_provider,
            store,
            wallet,
            broadcaster,
            freshness,
        }
    }

    pub async fn is_healthy(&self, market: &str, now_ms: i64) -> bool {
        match self.snapshot_provider.get_snapshot(market).await {
            Some(snapshot) => is_fresh(&snapshot, now_ms, self.freshness.as_secs()),
            None => false,
        }
    }

    /// First unhealthy tick: refunds every active wager if the round was
    /// mid-bet, then returns the PAUSED round state the caller should
    /// persist and broadcast.
    pub async fn trip(&self, market: &str, round: &RoundState, now_ms: i64) -> RoundState {
        if matches!(round.phase, Phase::Betting | Phase::Accumulation) {
            self.broadcaster
                .broadcast_error(market, "ROUND_CANCELLED", "Bets refunded");
            self.refund_all_wagers(market, &round.round_id).await;
        }

        self.broadcaster.broadcast_market_status(
            market,
            MarketStatus::Closed,
            Some("Market data unstable".to_string()),
        );

        RoundState {
            phase: Phase::Paused,
            round_id: round.round_id.clone(),
            server_time: now_ms,
            end_time: now_ms + 2_000,
            stocks: round.stocks.clone(),
            can_unbet: false,
            message: Some("Market data unstable".to_string()),
        }
    }

    pub fn broadcast_recovered(&self, market: &str) {
        self.broadcaster
            .broadcast_market_status(market, MarketStatus::Open, None);
    }

    async fn refund_all_wagers(&self, market: &str, round_id: &str) {
        let bets_key = format!("plinko:bets:{market}:{round_id}");
        let wagers = match self.store.get_all_wagers(&bets_key).await {
            Ok(wagers) => wagers,
            Err(err) => {
                tracing::error!(market, round_id, %err, "failed to read wagers for refund");
                return;
            }
        };

        for (player_id, player_wagers) in wagers {
            for wager in player_wagers {
                let credit = self
                    .wallet
                    .credit(CreditRequest {
                        session_token: wager.session_token.clone(),
                        win_amount: wager.amount,
                        currency: wager.currency.clone(),
                        transaction_id: Uuid::new_v4().to_string(),
                        player_id: Some(player_id.clone()),
                        tenant_id: Some(wager.tenant_id.clone()),
                        credit_type: Some(CreditType::Refund),
                        metadata: Some(serde_json::json!({
                            "reason": "market_outage",
                            "originalRound": round_id,
                            "originalBetId": wager.transaction_id,
                        })),
                    })
                    .await;

                if let Err(err) = credit {
                    tracing::error!(
                        market, round_id, player_id, bet_id = %wager.transaction_id, %err,
                        "refund credit failed during market outage"
                    );
                }
            }
        }

        let _ = self.store.delete(&bets_key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StockEntry;
    use crate::snapshot::FixedSnapshotProvider;
    use crate::store::memory::InMemoryStateStore;
    use crate::transport::RecordingBroadcaster;
    use crate::wallet::FakeWalletGateway;

    fn breaker(provider: Arc<FixedSnapshotProvider>, store: Arc<InMemoryStateStore>) -> (CircuitBreaker, Arc<RecordingBroadcaster>) {
        let wallet = Arc::new(FakeWalletGateway::new());
        wallet.always_credit_success(0.0);
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        (
            CircuitBreaker::new(provider, store, wallet, broadcaster.clone(), Duration::from_secs(5)),
            broadcaster,
        )
    }

    #[tokio::test]
    async fn missing_snapshot_is_unhealthy() {
        let provider = FixedSnapshotProvider::new();
        let store = Arc::new(InMemoryStateStore::new());
        let (breaker, _b) = breaker(provider, store);
        assert!(!breaker.is_healthy("BTC", 1_000).await);
    }

    #[tokio::test]
    async fn trip_during_betting_refunds_and_pauses() {
        let provider = FixedSnapshotProvider::new();
        let store = Arc::new(InMemoryStateStore::new());
        let (breaker, broadcaster) = breaker(provider, store.clone());

        let wager = crate::model::Wager {
            transaction_id: "tx-1".into(),
            player_id: "p1".into(),
            tenant_id: "t1".into(),
            session_token: "sess".into(),
            currency: "USD".into(),
            amount: 10.0,
            symbols: vec!["BTC".into()],
            placed_at: 0,
        };
        store.append_wager("plinko:bets:BTC:round-1", "p1", &wager).await.unwrap();

        let round = RoundState {
            phase: Phase::Betting,
            round_id: "round-1".into(),
            server_time: 0,
            end_time: 20_000,
            stocks: vec![StockEntry::new("BTC")],
            can_unbet: true,
            message: None,
        };

        let paused = breaker.trip("BTC", &round, 5_000).await;
        assert_eq!(paused.phase, Phase::Paused);
        assert_eq!(paused.end_time, 7_000);

        let remaining = store.get_all_wagers("plinko:bets:BTC:round-1").await.unwrap();
        assert!(remaining.is_empty());

        let events = broadcaster.events_for("BTC");
        assert_eq!(events.len(), 2);
    }
}
