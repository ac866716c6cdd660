//! Composition of one market's dependency graph plus its tick loop,
//! spawned as one long-lived `tokio::task` per configured market.

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{PhaseDurations, RtpConfig};
use crate::lease::LeaseManager;
use crate::payout::PayoutPipeline;
use crate::rtp_tracker::RtpTracker;
use crate::scheduler::Scheduler;
use crate::snapshot::SnapshotProvider;
use crate::store::StateStore;
use crate::transport::RoomBroadcaster;
use crate::wallet::WalletGateway;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct MarketHandle {
    pub market: String,
    pub join: tokio::task::JoinHandle<()>,
}

#[allow(clippy::too_many_arguments)]
pub fn spawn_market(
    market: String,
    instance_id: String,
    stock_count: usize,
    phase_durations: PhaseDurations,
    rtp_config: RtpConfig,
    snapshot_freshness: Duration,
    store: Arc<dyn StateStore>,
    snapshot_provider: Arc<dyn SnapshotProvider>,
    wallet: Arc<dyn WalletGateway>,
    broadcaster: Arc<dyn RoomBroadcaster>,
    mut shutdown: watch::Receiver<bool>,
) -> MarketHandle {
    let lease = Arc::new(LeaseManager::new(store.clone()));
    let rtp_tracker = Arc::new(RtpTracker::new(store.clone(), rtp_config.clone()));
    let circuit_breaker = Arc::new(CircuitBreaker::new(
        snapshot_provider.clone(),
        store.clone(),
        wallet.clone(),
        broadcaster.clone(),
        snapshot_freshness,
    ));
    let payout = Arc::new(PayoutPipeline::new(
        store.clone(),
        wallet,
        rtp_tracker.clone(),
        broadcaster.clone(),
    ));

    let scheduler = Arc::new(Scheduler::new(
        market.clone(),
        instance_id,
        stock_count,
        phase_durations,
        rtp_config,
        store,
        lease,
        snapshot_provider,
        circuit_breaker,
        rtp_tracker,
        broadcaster,
        payout,
    ));

    let market_for_task = market.clone();
    let join = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!(market = %market_for_task, "market loop shutting down");
                        break;
                    }
                }
                sleep_for = async { scheduler.tick().await } => {
                    tokio::time::sleep(sleep_for).await;
                }
            }
        }
    });

    MarketHandle { market, join }
}
