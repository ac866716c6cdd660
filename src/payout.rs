//! Payout pipeline. Runs as a detached task from the
//! scheduler's PAYOUT entry so a slow wallet never blocks the tick.

use crate::model::{SymbolResult, Wager};
use crate::rtp_tracker::RtpTracker;
use crate::store::StateStore;
use crate::transport::{BetBreakdown, PayoutEvent, RoomBroadcaster};
use crate::wallet::{CreditRequest, CreditType, WalletGateway, WalletStatus};
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const CREDIT_CONCURRENCY: usize = 16;

pub struct PayoutPipeline {
    store: Arc<dyn StateStore>,
    wallet: Arc<dyn WalletGateway>,
    rtp_tracker: Arc<RtpTracker>,
    broadcaster: Arc<dyn RoomBroadcaster>,
}

impl PayoutPipeline {
    pub fn new(
        store: Arc<dyn StateStore>,
        wallet: Arc<dyn WalletGateway>,
        rtp_tracker: Arc<RtpTracker>,
        broadcaster: Arc<dyn RoomBroadcaster>,
    ) -> Self {
        Self {
            store,
            wallet,
            rtp_tracker,
            broadcaster,
        }
    }

    pub async fn run(&self, market: &str, round_id: &str) {
        let results_key = format!("plinko:{market}:{round_id}:results");
        let bets_key = format!("plinko:bets:{market}:{round_id}");

        let results: Vec<SymbolResult> =
            match crate::store::get_json(self.store.as_ref(), &results_key).await {
                Ok(Some(results)) => results,
                Ok(None) => {
                    let _ = self.store.delete(&bets_key).await;
                    return;
                }
                Err(err) => {
                    tracing::error!(market, round_id, %err, "failed to read payout results");
                    let _ = self.store.delete(&bets_key).await;
                    return;
                }
            };

        if results.is_empty() {
            let _ = self.store.delete(&bets_key).await;
            return;
        }

        let multipliers: HashMap<&str, f64> = results
            .iter()
            .map(|r| (r.symbol.as_str(), r.multiplier))
            .collect();

        let wagers_by_player = match self.store.get_all_wagers(&bets_key).await {
            Ok(wagers) if !wagers.is_empty() => wagers,
            Ok(_) => {
                let _ = self.store.delete(&bets_key).await;
                return;
            }
            Err(err) => {
                tracing::error!(market, round_id, %err, "failed to read wager hash");
                return;
            }
        };

        let player_summaries =
            stream::iter(wagers_by_player.into_iter().map(|(player_id, wagers)| {
                let multipliers = multipliers.clone();
                async move { self.settle_player(market, round_id, player_id, wagers, &multipliers).await }
            }))
            .buffer_unordered(CREDIT_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        for (player_id, payout) in player_summaries {
            self.rtp_tracker.record_win(market, payout.total_payout).await;
            self.broadcaster.broadcast_payout(market, &player_id, payout);
        }

        let _ = self.store.delete(&bets_key).await;
        let _ = self.store.delete(&results_key).await;
    }

    async fn settle_player(
        &self,
        market: &str,
        round_id: &str,
        player_id: String,
        wagers: Vec<Wager>,
        multipliers: &HashMap<&str, f64>,
    ) -> (String, PayoutEvent) {
        // Wagers within a round are placed in one currency per player in
        // practice; the aggregate event reports the first bet's currency.
        let currency = wagers
            .first()
            .map(|w| w.currency.clone())
            .unwrap_or_default();
        let mut total_wager = 0.0;
        let mut total_payout = 0.0;
        let mut bets = Vec::with_capacity(wagers.len());

        for wager in &wagers {
            let bet_per_symbol = wager.bet_per_symbol();
            let bet_win: f64 = wager
                .symbols
                .iter()
                .map(|symbol| bet_per_symbol * multipliers.get(symbol.as_str()).copied().unwrap_or(0.0))
                .sum();

            total_wager += wager.amount;
            total_payout += bet_win;

            let multiplier = if wager.amount > 0.0 { bet_win / wager.amount } else { 0.0 };
            bets.push(BetBreakdown {
                bet_id: wager.transaction_id.clone(),
                symbols: wager.symbols.clone(),
                wager: wager.amount,
                payout: bet_win,
                multiplier,
            });

            if bet_win > 0.0 {
                let credit = self
                    .wallet
                    .credit(CreditRequest {
                        session_token: wager.session_token.clone(),
                        win_amount: bet_win,
                        currency: currency.to_string(),
                        transaction_id: Uuid::new_v4().to_string(),
                        player_id: Some(player_id.clone()),
                        tenant_id: Some(wager.tenant_id.clone()),
                        credit_type: Some(CreditType::Win),
                        metadata: Some(serde_json::json!({
                            "game": "plinko",
                            "wagerTxId": wager.transaction_id,
                        })),
                    })
                    .await;

                match credit {
                    Ok(result) if result.status == WalletStatus::Success => {}
                    Ok(result) => {
                        tracing::error!(
                            market, round_id, player_id, bet_id = %wager.transaction_id,
                            message = ?result.message,
                            "CRITICAL: win credit reported non-success status"
                        );
                    }
                    Err(err) => {
                        tracing::error!(
                            market, round_id, player_id, bet_id = %wager.transaction_id, %err,
                            "CRITICAL: win credit call failed"
                        );
                    }
                }
            }
        }

        let payout = PayoutEvent {
            round_id: round_id.to_string(),
            currency: currency.to_string(),
            total_wager,
            total_payout,
            net_profit: total_payout - total_wager,
            bets,
        };
        (player_id, payout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RtpConfig;
    use crate::store::{memory::InMemoryStateStore, set_json};
    use crate::transport::RecordingBroadcaster;
    use crate::wallet::{FakeWalletGateway, WalletResult};

    fn result(symbol: &str, multiplier: f64) -> SymbolResult {
        SymbolResult {
            symbol: symbol.to_string(),
            delta: 1.0,
            multiplier_index: 0,
            multiplier,
            reason: "green".to_string(),
        }
    }

    fn wager(player: &str, tx: &str, amount: f64, symbols: &[&str]) -> Wager {
        Wager {
            transaction_id: tx.to_string(),
            player_id: player.to_string(),
            tenant_id: "t1".to_string(),
            session_token: "sess".to_string(),
            currency: "USD".to_string(),
            amount,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            placed_at: 0,
        }
    }

    #[tokio::test]
    async fn payout_sums_match_spec_invariant() {
        let store = Arc::new(InMemoryStateStore::new());
        let wallet = Arc::new(FakeWalletGateway::new());
        wallet.always_credit_success(100.0);
        let rtp_tracker = Arc::new(RtpTracker::new(store.clone(), RtpConfig::default()));
        let broadcaster = Arc::new(RecordingBroadcaster::new());

        set_json(
            store.as_ref(),
            "plinko:BTC:round-1:results",
            &vec![result("BTC", 2.0), result("ETH", 0.0)],
            None,
        )
        .await
        .unwrap();

        let w = wager("p1", "tx-1", 10.0, &["BTC", "ETH"]);
        store.append_wager("plinko:bets:BTC:round-1", "p1", &w).await.unwrap();

        let pipeline = PayoutPipeline::new(
            store.clone(),
            wallet.clone(),
            rtp_tracker.clone(),
            broadcaster.clone(),
        );
        pipeline.run("BTC", "round-1").await;

        let events = broadcaster.events_for("BTC");
        assert_eq!(events.len(), 1);
        match &events[0] {
            crate::transport::RoomEvent::GamePayout { payout, .. } => {
                // bet_per_symbol = 5.0; BTC contributes 5*2=10, ETH contributes 0.
                assert_eq!(payout.total_payout, 10.0);
                assert_eq!(payout.total_wager, 10.0);
                assert_eq!(payout.net_profit, 0.0);
            }
            _ => panic!("expected a GamePayout event"),
        }

        let metrics = rtp_tracker.get_metrics("BTC").await;
        assert_eq!(metrics.total_won, 10.0);

        let all = store.get_all_wagers("plinko:bets:BTC:round-1").await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn empty_results_just_cleans_up() {
        let store = Arc::new(InMemoryStateStore::new());
        let wallet = Arc::new(FakeWalletGateway::new());
        let rtp_tracker = Arc::new(RtpTracker::new(store.clone(), RtpConfig::default()));
        let broadcaster = Arc::new(RecordingBroadcaster::new());

        store
            .append_wager("plinko:bets:BTC:round-1", "p1", &wager("p1", "tx-1", 10.0, &["BTC"]))
            .await
            .unwrap();

        let pipeline = PayoutPipeline::new(store.clone(), wallet, rtp_tracker, broadcaster.clone());
        pipeline.run("BTC", "round-1").await;

        assert!(broadcaster.events_for("BTC").is_empty());
        let all = store.get_all_wagers("plinko:bets:BTC:round-1").await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn win_credit_failure_does_not_abort_the_round() {
        let store = Arc::new(InMemoryStateStore::new());
        let wallet = Arc::new(FakeWalletGateway::new());
        wallet.push_credit(Ok(WalletResult {
            status: crate::wallet::WalletStatus::Failed,
            new_balance: 0.0,
            message: Some("ledger unavailable".into()),
        }));
        let rtp_tracker = Arc::new(RtpTracker::new(store.clone(), RtpConfig::default()));
        let broadcaster = Arc::new(RecordingBroadcaster::new());

        set_json(
            store.as_ref(),
            "plinko:BTC:round-1:results",
            &vec![result("BTC", 2.0)],
            None,
        )
        .await
        .unwrap();
        store
            .append_wager("plinko:bets:BTC:round-1", "p1", &wager("p1", "tx-1", 10.0, &["BTC"]))
            .await
            .unwrap();

        let pipeline = PayoutPipeline::new(store, wallet, rtp_tracker, broadcaster.clone());
        pipeline.run("BTC", "round-1").await;

        // The payout event still fires with the computed totals even though
        // the credit call reported failure.
        assert_eq!(broadcaster.events_for("BTC").len(), 1);
    }
}
