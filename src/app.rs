//! Composition root. Builds every market's
//! dependency graph from a validated `RuntimeConfig`, and holds one
//! `JoinHandle` per market plus the shutdown `watch` channel.

use crate::config::RuntimeConfig;
use crate::market::{spawn_market, MarketHandle};
use crate::session::{JwtSessionStore, SessionStore};
use crate::snapshot::SnapshotProvider;
use crate::store::StateStore;
use crate::transport::{BroadcastRoomBroadcaster, RoomBroadcaster};
use crate::wallet::{SignedHttpWalletGateway, WalletGateway};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

pub struct AppState {
    pub broadcaster: Arc<BroadcastRoomBroadcaster>,
    pub session_store: Arc<dyn SessionStore>,
    markets: Vec<MarketHandle>,
    shutdown_tx: watch::Sender<bool>,
}

impl AppState {
    /// Wires every market named in `config.markets` against a shared store,
    /// snapshot provider, and wallet gateway, and spawns its scheduler loop.
    pub fn build(
        config: &RuntimeConfig,
        store: Arc<dyn StateStore>,
        snapshot_provider: Arc<dyn SnapshotProvider>,
        session_secret: String,
    ) -> Result<Self> {
        let wallet: Arc<dyn WalletGateway> = Arc::new(SignedHttpWalletGateway::new(&config.wallet)?);
        let broadcaster = Arc::new(BroadcastRoomBroadcaster::new());
        let session_store: Arc<dyn SessionStore> = Arc::new(JwtSessionStore::new(session_secret));
        let instance_id = Uuid::new_v4().to_string();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let markets = config
            .markets
            .iter()
            .map(|market| {
                spawn_market(
                    market.clone(),
                    instance_id.clone(),
                    config.stock_count,
                    config.phase_durations,
                    config.rtp.clone(),
                    config.snapshot_freshness,
                    store.clone(),
                    snapshot_provider.clone(),
                    wallet.clone(),
                    broadcaster.clone() as Arc<dyn RoomBroadcaster>,
                    shutdown_rx.clone(),
                )
            })
            .collect();

        Ok(Self {
            broadcaster,
            session_store,
            markets,
            shutdown_tx,
        })
    }

    pub fn market_names(&self) -> Vec<String> {
        self.markets.iter().map(|m| m.market.clone()).collect()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.markets {
            let _ = handle.join.await;
        }
    }
}
