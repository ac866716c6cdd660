//! Realtime transport abstractions. The transport itself —
//! session/connection management — is out of scope; this crate only needs
//! somewhere to push the four server-side events to, and a
//! `tokio::sync::broadcast` fan-out per market room is the natural
//! primitive for it.

use crate::model::RoundState;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize)]
pub struct PayoutEvent {
    pub round_id: String,
    pub currency: String,
    pub total_wager: f64,
    pub total_payout: f64,
    pub net_profit: f64,
    pub bets: Vec<BetBreakdown>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BetBreakdown {
    pub bet_id: String,
    pub symbols: Vec<String>,
    pub wager: f64,
    pub payout: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketStatusEvent {
    pub status: MarketStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum RoomEvent {
    #[serde(rename = "game:state")]
    GameState(RoundState),
    #[serde(rename = "game:payout")]
    GamePayout { player_id: String, payout: PayoutEvent },
    #[serde(rename = "game:error")]
    GameError(ErrorEvent),
    #[serde(rename = "market-status")]
    MarketStatus(MarketStatusEvent),
}

#[async_trait]
pub trait RoomBroadcaster: Send + Sync {
    fn broadcast_game_state(&self, market: &str, state: &RoundState);
    fn broadcast_payout(&self, market: &str, player_id: &str, payout: PayoutEvent);
    fn broadcast_error(&self, market: &str, code: &str, message: &str);
    fn broadcast_market_status(&self, market: &str, status: MarketStatus, reason: Option<String>);
}

/// One broadcast channel per market, created lazily on first use.
pub struct BroadcastRoomBroadcaster {
    rooms: dashmap_like::RoomMap,
}

/// Minimal sharded map so concurrent markets don't contend on a single lock
/// just to look up their own channel — same shape as a `DashMap` without
/// pulling in the crate for one call site.
mod dashmap_like {
    use super::RoomEvent;
    use parking_lot::RwLock;
    use std::collections::HashMap;
    use tokio::sync::broadcast;

    #[derive(Default)]
    pub struct RoomMap {
        rooms: RwLock<HashMap<String, broadcast::Sender<RoomEvent>>>,
    }

    impl RoomMap {
        pub fn sender(&self, market: &str) -> broadcast::Sender<RoomEvent> {
            if let Some(tx) = self.rooms.read().get(market) {
                return tx.clone();
            }
            let mut rooms = self.rooms.write();
            rooms
                .entry(market.to_string())
                .or_insert_with(|| broadcast::channel(256).0)
                .clone()
        }
    }
}

impl Default for BroadcastRoomBroadcaster {
    fn default() -> Self {
        Self {
            rooms: dashmap_like::RoomMap::default(),
        }
    }
}

impl BroadcastRoomBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, market: &str) -> broadcast::Receiver<RoomEvent> {
        self.rooms.sender(market).subscribe()
    }

    fn send(&self, market: &str, event: RoomEvent) {
        // No subscribers yet is not an error — the event is simply dropped,
        // the same as any broadcaster treating a room with nobody listening
        // as a normal idle state.
        let _ = self.rooms.sender(market).send(event);
    }
}

#[async_trait]
impl RoomBroadcaster for BroadcastRoomBroadcaster {
    fn broadcast_game_state(&self, market: &str, state: &RoundState) {
        self.send(market, RoomEvent::GameState(state.clone()));
    }

    fn broadcast_payout(&self, market: &str, player_id: &str, payout: PayoutEvent) {
        self.send(
            market,
            RoomEvent::GamePayout {
                player_id: player_id.to_string(),
                payout,
            },
        );
    }

    fn broadcast_error(&self, market: &str, code: &str, message: &str) {
        self.send(
            market,
            RoomEvent::GameError(ErrorEvent {
                code: code.to_string(),
                message: message.to_string(),
            }),
        );
    }

    fn broadcast_market_status(&self, market: &str, status: MarketStatus, reason: Option<String>) {
        self.send(
            market,
            RoomEvent::MarketStatus(MarketStatusEvent {
                status,
                reason,
                timestamp: crate::clock::now_ms(),
            }),
        );
    }
}

/// Records every event it was asked to broadcast, for scheduler/payout tests.
#[derive(Default)]
pub struct RecordingBroadcaster {
    pub events: parking_lot::Mutex<Vec<(String, RoomEvent)>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_for(&self, market: &str) -> Vec<RoomEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(m, _)| m == market)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

#[async_trait]
impl RoomBroadcaster for RecordingBroadcaster {
    fn broadcast_game_state(&self, market: &str, state: &RoundState) {
        self.events
            .lock()
            .push((market.to_string(), RoomEvent::GameState(state.clone())));
    }

    fn broadcast_payout(&self, market: &str, player_id: &str, payout: PayoutEvent) {
        self.events.lock().push((
            market.to_string(),
            RoomEvent::GamePayout {
                player_id: player_id.to_string(),
                payout,
            },
        ));
    }

    fn broadcast_error(&self, market: &str, code: &str, message: &str) {
        self.events.lock().push((
            market.to_string(),
            RoomEvent::GameError(ErrorEvent {
                code: code.to_string(),
                message: message.to_string(),
            }),
        ));
    }

    fn broadcast_market_status(&self, market: &str, status: MarketStatus, reason: Option<String>) {
        self.events.lock().push((
            market.to_string(),
            RoomEvent::MarketStatus(MarketStatusEvent {
                status,
                reason,
                timestamp: 0,
            }),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Phase, RoundState};

    fn state() -> RoundState {
        RoundState::new_betting("round-1".into(), 0, 1000, vec![])
    }

    #[test]
    fn recording_broadcaster_scopes_events_per_market() {
        let broadcaster = RecordingBroadcaster::new();
        broadcaster.broadcast_game_state("BTC", &state());
        broadcaster.broadcast_game_state("ETH", &state());
        assert_eq!(broadcaster.events_for("BTC").len(), 1);
        assert_eq!(broadcaster.events_for("ETH").len(), 1);
        assert_eq!(broadcaster.events_for("SOL").len(), 0);
    }

    #[tokio::test]
    async fn broadcast_room_broadcaster_fans_out_to_subscribers() {
        let broadcaster = BroadcastRoomBroadcaster::new();
        let mut rx = broadcaster.subscribe("BTC");
        broadcaster.broadcast_game_state("BTC", &state());
        let event = rx.recv().await.unwrap();
        match event {
            RoomEvent::GameState(s) => assert_eq!(s.phase, Phase::Betting),
            _ => panic!("expected GameState"),
        }
    }
}
