//! Wager ledger. Every operation here is conditioned on the
//! round being in BETTING — callers pass the current `RoundState` in rather
//! than this module reading it itself, so the read and the validation share
//! one snapshot.

use crate::clock::now_ms;
use crate::error::{DomainError, Result};
use crate::model::{Phase, RoundState, Wager};
use crate::rtp_tracker::RtpTracker;
use crate::store::StateStore;
use crate::wallet::{CreditRequest, CreditType, DebitRequest, WalletGateway, WalletStatus};
use std::sync::Arc;
use uuid::Uuid;

pub struct PlaceBetOutcome {
    pub new_balance: f64,
    pub round_id: String,
    pub transaction_id: String,
}

pub struct CancelBetOutcome {
    pub refund_amount: f64,
    pub new_balance: f64,
}

pub struct WagerLedger {
    store: Arc<dyn StateStore>,
    wallet: Arc<dyn WalletGateway>,
    rtp_tracker: Arc<RtpTracker>,
}

impl WagerLedger {
    pub fn new(store: Arc<dyn StateStore>, wallet: Arc<dyn WalletGateway>, rtp_tracker: Arc<RtpTracker>) -> Self {
        Self { store, wallet, rtp_tracker }
    }

    pub async fn place_bet(
        &self,
        market: &str,
        round: &RoundState,
        player_id: &str,
        tenant_id: &str,
        session_token: &str,
        currency: &str,
        amount: f64,
        symbols: Vec<String>,
    ) -> Result<PlaceBetOutcome> {
        if round.phase != Phase::Betting {
            return Err(DomainError::BettingClosed);
        }
        if !(amount > 0.0) {
            return Err(DomainError::InvalidAmount);
        }
        if symbols.is_empty() || symbols.len() > 20 {
            return Err(DomainError::InvalidSelection);
        }

        let transaction_id = Uuid::new_v4().to_string();

        let debit = self
            .wallet
            .debit(DebitRequest {
                session_token: session_token.to_string(),
                bet_amount: amount,
                currency: currency.to_string(),
                transaction_id: transaction_id.clone(),
                player_id: Some(player_id.to_string()),
                tenant_id: Some(tenant_id.to_string()),
                metadata: Some(serde_json::json!({
                    "game": "plinko",
                    "roundId": round.round_id,
                    "symbols": symbols,
                    "tenantId": tenant_id,
                })),
            })
            .await
            .map_err(|err| {
                tracing::warn!(market, %err, "wallet debit call failed");
                DomainError::WalletUnavailable {
                    message: "wallet debit call failed".to_string(),
                }
            })?;

        if debit.status != WalletStatus::Success {
            return Err(DomainError::InsufficientBalance);
        }

        // recordBet happens-before the bet entering the wager hash.
        self.rtp_tracker.record_bet(market, amount).await;

        let wager = Wager {
            transaction_id: transaction_id.clone(),
            player_id: player_id.to_string(),
            tenant_id: tenant_id.to_string(),
            session_token: session_token.to_string(),
            currency: currency.to_string(),
            amount,
            symbols,
            placed_at: now_ms(),
        };

        let bets_key = format!("plinko:bets:{market}:{}", round.round_id);
        self.store
            .append_wager(&bets_key, player_id, &wager)
            .await
            .map_err(|err| {
                tracing::error!(market, %err, "wager debited but append_wager failed");
                DomainError::WalletUnavailable {
                    message: "failed to record wager after debit".to_string(),
                }
            })?;

        Ok(PlaceBetOutcome {
            new_balance: debit.new_balance,
            round_id: round.round_id.clone(),
            transaction_id,
        })
    }

    pub async fn cancel_bet(
        &self,
        market: &str,
        round: &RoundState,
        player_id: &str,
        currency: &str,
        transaction_id: &str,
    ) -> Result<CancelBetOutcome> {
        if round.phase != Phase::Betting {
            return Err(DomainError::BettingClosed);
        }

        let bets_key = format!("plinko:bets:{market}:{}", round.round_id);
        let removed = self
            .store
            .remove_wager(&bets_key, player_id, transaction_id)
            .await
            .map_err(|err| {
                tracing::warn!(market, %err, "remove_wager store call failed");
                DomainError::NotFound
            })?;

        let Some(wager) = removed else {
            return Err(DomainError::NotFound);
        };

        let credit = self
            .wallet
            .credit(CreditRequest {
                session_token: wager.session_token.clone(),
                win_amount: wager.amount,
                currency: currency.to_string(),
                transaction_id: Uuid::new_v4().to_string(),
                player_id: Some(player_id.to_string()),
                tenant_id: Some(wager.tenant_id.clone()),
                credit_type: Some(CreditType::Refund),
                metadata: Some(serde_json::json!({
                    "reason": "user_cancel",
                    "originalBetId": wager.transaction_id,
                })),
            })
            .await;

        match credit {
            Ok(result) => Ok(CancelBetOutcome {
                refund_amount: wager.amount,
                new_balance: result.new_balance,
            }),
            Err(err) => {
                // The debit already happened and the wager is already gone
                // from the hash — this is the one place that calls for a
                // CRITICAL log, since there is no further fallback here.
                tracing::error!(
                    market,
                    player_id,
                    transaction_id,
                    %err,
                    "CRITICAL: refund credit failed after wager removal"
                );
                Err(DomainError::CancellationFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStateStore;
    use crate::wallet::{FakeWalletGateway, WalletResult};

    fn betting_round() -> RoundState {
        RoundState::new_betting("round-1".into(), 0, 20_000, vec![])
    }

    fn ledger_with(wallet: Arc<FakeWalletGateway>) -> (WagerLedger, Arc<InMemoryStateStore>) {
        let store = Arc::new(InMemoryStateStore::new());
        let rtp_tracker = Arc::new(RtpTracker::new(store.clone(), crate::config::RtpConfig::default()));
        (WagerLedger::new(store.clone(), wallet, rtp_tracker), store)
    }

    #[tokio::test]
    async fn place_bet_rejects_non_positive_amount() {
        let wallet = Arc::new(FakeWalletGateway::new());
        let (ledger, _store) = ledger_with(wallet);
        let round = betting_round();
        let err = ledger
            .place_bet("BTC", &round, "p1", "t1", "sess", "USD", 0.0, vec!["BTC".into()])
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::InvalidAmount);
    }

    #[tokio::test]
    async fn place_bet_rejects_too_many_symbols() {
        let wallet = Arc::new(FakeWalletGateway::new());
        let (ledger, _store) = ledger_with(wallet);
        let round = betting_round();
        let symbols: Vec<String> = (0..21).map(|i| format!("SYM{i}")).collect();
        let err = ledger
            .place_bet("BTC", &round, "p1", "t1", "sess", "USD", 10.0, symbols)
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::InvalidSelection);
    }

    #[tokio::test]
    async fn place_bet_outside_betting_fails_closed() {
        let wallet = Arc::new(FakeWalletGateway::new());
        let (ledger, _store) = ledger_with(wallet);
        let mut round = betting_round();
        round.phase = Phase::Accumulation;
        let err = ledger
            .place_bet("BTC", &round, "p1", "t1", "sess", "USD", 10.0, vec!["BTC".into()])
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::BettingClosed);
    }

    #[tokio::test]
    async fn place_bet_surfaces_insufficient_balance() {
        let wallet = Arc::new(FakeWalletGateway::new());
        wallet.push_debit(Ok(WalletResult {
            status: crate::wallet::WalletStatus::Failed,
            new_balance: 5.0,
            message: Some("insufficient funds".into()),
        }));
        let (ledger, _store) = ledger_with(wallet);
        let round = betting_round();
        let err = ledger
            .place_bet("BTC", &round, "p1", "t1", "sess", "USD", 10.0, vec!["BTC".into()])
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::InsufficientBalance);
    }

    #[tokio::test]
    async fn place_then_cancel_leaves_wager_hash_unchanged() {
        let wallet = Arc::new(FakeWalletGateway::new());
        wallet.always_debit_success(90.0);
        wallet.always_credit_success(100.0);
        let (ledger, store) = ledger_with(wallet);
        let round = betting_round();

        let placed = ledger
            .place_bet("BTC", &round, "p1", "t1", "sess", "USD", 10.0, vec!["BTC".into()])
            .await
            .unwrap();

        let bets_key = "plinko:bets:BTC:round-1";
        let all = store.get_all_wagers(bets_key).await.unwrap();
        assert_eq!(all.get("p1").unwrap().len(), 1);

        let cancelled = ledger
            .cancel_bet("BTC", &round, "p1", "USD", &placed.transaction_id)
            .await
            .unwrap();
        assert_eq!(cancelled.refund_amount, 10.0);

        let all = store.get_all_wagers(bets_key).await.unwrap();
        assert!(all.get("p1").is_none());
    }

    #[tokio::test]
    async fn cancel_unknown_transaction_is_not_found() {
        let wallet = Arc::new(FakeWalletGateway::new());
        let (ledger, _store) = ledger_with(wallet);
        let round = betting_round();
        let err = ledger
            .cancel_bet("BTC", &round, "p1", "USD", "does-not-exist")
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }
}
