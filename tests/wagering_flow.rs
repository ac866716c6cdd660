//! Cross-module scenario tests: a bet placed through the ledger settles
//! through the payout pipeline, and the scheduler drives a full round cycle
//! end to end against in-memory/fake collaborators.

use plinko_wager_engine::circuit_breaker::CircuitBreaker;
use plinko_wager_engine::config::{PhaseDurations, RtpConfig, ZoneConfig};
use plinko_wager_engine::ledger::WagerLedger;
use plinko_wager_engine::lease::LeaseManager;
use plinko_wager_engine::market;
use plinko_wager_engine::model::{Phase, RoundState, Snapshot, SymbolPrice};
use plinko_wager_engine::payout::PayoutPipeline;
use plinko_wager_engine::rtp_tracker::RtpTracker;
use plinko_wager_engine::scheduler::Scheduler;
use plinko_wager_engine::snapshot::FixedSnapshotProvider;
use plinko_wager_engine::store::memory::InMemoryStateStore;
use plinko_wager_engine::store::{get_json, StateStore};
use plinko_wager_engine::transport::{RecordingBroadcaster, RoomBroadcaster, RoomEvent};
use plinko_wager_engine::wallet::{FakeWalletGateway, WalletGateway};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn snapshot(prices: &[(&str, f64)]) -> Snapshot {
    let symbols = prices
        .iter()
        .map(|(s, p)| (s.to_string(), SymbolPrice { price: *p }))
        .collect::<HashMap<_, _>>();
    Snapshot {
        symbols,
        captured_at: plinko_wager_engine::clock::now_ms(),
    }
}

/// A bet placed while BETTING is open, debited once, and settled by the
/// payout pipeline against a pre-seeded results blob — the wager hash must
/// be empty afterwards and the wallet must see exactly one credit call.
#[tokio::test]
async fn placed_bet_settles_through_payout() {
    let store: Arc<InMemoryStateStore> = Arc::new(InMemoryStateStore::new());
    let wallet = Arc::new(FakeWalletGateway::new());
    wallet.always_debit_success(90.0);
    wallet.always_credit_success(110.0);
    let broadcaster = Arc::new(RecordingBroadcaster::new());

    let rtp_tracker = Arc::new(RtpTracker::new(store.clone(), RtpConfig::default()));
    let ledger = WagerLedger::new(
        store.clone() as Arc<dyn StateStore>,
        wallet.clone() as Arc<dyn WalletGateway>,
        rtp_tracker.clone(),
    );

    let round = RoundState::new_betting(
        "round-1".into(),
        0,
        20_000,
        vec![plinko_wager_engine::model::StockEntry::new("BTC")],
    );

    let placed = ledger
        .place_bet("BTC", &round, "player-1", "tenant-1", "sess-token", "USD", 10.0, vec!["BTC".into()])
        .await
        .expect("bet should be accepted");
    assert_eq!(placed.new_balance, 90.0);

    // RTP tracker must have observed the bet before payout reads it back.
    let metrics = rtp_tracker.get_metrics("BTC").await;
    assert_eq!(metrics.play_count, 1);
    assert_eq!(metrics.total_bet, 10.0);

    let results = vec![plinko_wager_engine::model::SymbolResult {
        symbol: "BTC".into(),
        delta: 5.0,
        multiplier_index: 0,
        multiplier: 2.0,
        reason: "green".into(),
    }];
    plinko_wager_engine::store::set_json(
        store.as_ref(),
        "plinko:BTC:round-1:results",
        &results,
        None,
    )
    .await
    .unwrap();

    let payout = PayoutPipeline::new(
        store.clone() as Arc<dyn StateStore>,
        wallet.clone() as Arc<dyn WalletGateway>,
        rtp_tracker.clone(),
        broadcaster.clone() as Arc<dyn RoomBroadcaster>,
    );
    payout.run("BTC", "round-1").await;

    let remaining = store.get_all_wagers("plinko:bets:BTC:round-1").await.unwrap();
    assert!(remaining.is_empty(), "wager hash must be drained after payout");

    assert_eq!(wallet.credit_calls.lock().unwrap().len(), 1);
    let credit = &wallet.credit_calls.lock().unwrap()[0];
    assert_eq!(credit.win_amount, 20.0); // 10.0 stake * 2.0 multiplier

    let events = broadcaster.events_for("BTC");
    assert_eq!(events.len(), 1);
    match &events[0] {
        RoomEvent::GamePayout { player_id, payout } => {
            assert_eq!(player_id, "player-1");
            assert_eq!(payout.total_payout, 20.0);
            assert_eq!(payout.total_wager, 10.0);
        }
        other => panic!("expected GamePayout, got {other:?}"),
    }
}

/// Drives a scheduler through BETTING -> ACCUMULATION -> DROPPING -> PAYOUT
/// using a fixed snapshot provider (start and end prices are identical, so
/// every symbol lands in the single YELLOW slot), and confirms the round id
/// changes only once BETTING cycles back around.
#[tokio::test]
async fn scheduler_drives_a_full_round_cycle() {
    let store: Arc<InMemoryStateStore> = Arc::new(InMemoryStateStore::new());
    let provider = FixedSnapshotProvider::new();
    provider.set("BTC", snapshot(&[("AAA", 100.0), ("BBB", 200.0)]));
    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let wallet = Arc::new(FakeWalletGateway::new());
    wallet.always_credit_success(0.0);

    let lease = Arc::new(LeaseManager::new(store.clone() as Arc<dyn StateStore>));
    let rtp_config = RtpConfig {
        multipliers: vec![0.0, 1.0, 2.0],
        desired_rtp: 96.5,
        threshold_playcount: 100,
        limit_playcount: 10_000,
        zones: ZoneConfig {
            red: vec![0],
            yellow_high: vec![],
            yellow_low: vec![1],
            green_high: vec![2],
            green_low: vec![],
        },
    };
    let rtp_tracker = Arc::new(RtpTracker::new(store.clone() as Arc<dyn StateStore>, rtp_config.clone()));
    let circuit_breaker = Arc::new(CircuitBreaker::new(
        provider.clone(),
        store.clone() as Arc<dyn StateStore>,
        wallet.clone() as Arc<dyn WalletGateway>,
        broadcaster.clone() as Arc<dyn RoomBroadcaster>,
        Duration::from_secs(600),
    ));
    let payout = Arc::new(PayoutPipeline::new(
        store.clone() as Arc<dyn StateStore>,
        wallet.clone() as Arc<dyn WalletGateway>,
        rtp_tracker.clone(),
        broadcaster.clone() as Arc<dyn RoomBroadcaster>,
    ));

    let scheduler = Scheduler::new(
        "BTC",
        "instance-1",
        2,
        PhaseDurations {
            betting: Duration::from_millis(0),
            accumulation: Duration::from_millis(0),
            dropping: Duration::from_millis(0),
            payout: Duration::from_millis(0),
        },
        rtp_config,
        store.clone() as Arc<dyn StateStore>,
        lease,
        provider as Arc<dyn plinko_wager_engine::snapshot::SnapshotProvider>,
        circuit_breaker,
        rtp_tracker,
        broadcaster.clone() as Arc<dyn RoomBroadcaster>,
        payout,
    );

    scheduler.tick().await; // None -> BETTING
    let after_betting = get_json::<RoundState>(store.as_ref(), "plinko:state:BTC")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_betting.phase, Phase::Betting);
    let round_id = after_betting.round_id.clone();

    tokio::time::sleep(Duration::from_millis(10)).await;
    scheduler.tick().await; // BETTING -> ACCUMULATION
    let after_accum = get_json::<RoundState>(store.as_ref(), "plinko:state:BTC")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_accum.phase, Phase::Accumulation);
    assert_eq!(after_accum.round_id, round_id);

    tokio::time::sleep(Duration::from_millis(10)).await;
    scheduler.tick().await; // ACCUMULATION -> DROPPING
    let after_drop = get_json::<RoundState>(store.as_ref(), "plinko:state:BTC")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_drop.phase, Phase::Dropping);
    assert!(after_drop.stocks.iter().all(|s| s.multiplier.is_some()));

    tokio::time::sleep(Duration::from_millis(10)).await;
    scheduler.tick().await; // DROPPING -> PAYOUT (spawns detached payout task)
    let after_payout = get_json::<RoundState>(store.as_ref(), "plinko:state:BTC")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_payout.phase, Phase::Payout);
    assert_eq!(after_payout.round_id, round_id);

    tokio::time::sleep(Duration::from_millis(10)).await;
    scheduler.tick().await; // PAYOUT -> BETTING, new round id
    let restarted = get_json::<RoundState>(store.as_ref(), "plinko:state:BTC")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restarted.phase, Phase::Betting);
    assert_ne!(restarted.round_id, round_id);

    let events = broadcaster.events_for("BTC");
    assert_eq!(events.len(), 5);
}

/// A market whose snapshot provider never has data for it is permanently
/// unhealthy: `spawn_market`'s loop should be able to run several ticks
/// without panicking even though every tick pauses.
#[tokio::test]
async fn market_loop_survives_a_permanently_unhealthy_snapshot_provider() {
    let store: Arc<InMemoryStateStore> = Arc::new(InMemoryStateStore::new());
    let provider = FixedSnapshotProvider::new();
    let wallet = Arc::new(FakeWalletGateway::new());
    wallet.always_credit_success(0.0);
    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let handle = market::spawn_market(
        "BTC".into(),
        "instance-1".into(),
        2,
        PhaseDurations::default(),
        RtpConfig::default(),
        Duration::from_secs(5),
        store.clone() as Arc<dyn StateStore>,
        provider as Arc<dyn plinko_wager_engine::snapshot::SnapshotProvider>,
        wallet as Arc<dyn WalletGateway>,
        broadcaster as Arc<dyn RoomBroadcaster>,
        shutdown_rx,
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.join.is_finished(), "market loop must not have panicked");
    handle.join.abort();
}
