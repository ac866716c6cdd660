//! Round scheduler / state machine. One instance per market,
//! driven by a tick loop in `market.rs` — `tick()` runs exactly one leader
//! cycle and returns how long to sleep before the next one, which keeps
//! "exactly one pending tick" true for free: the loop is sequential, there
//! is never a second sleep racing the first.

use crate::circuit_breaker::CircuitBreaker;
use crate::clock::now_ms;
use crate::config::{PhaseDurations, RtpConfig};
use crate::decision::{compute_delta, DecisionEngine};
use crate::lease::LeaseManager;
use crate::model::{Phase, RoundState, Snapshot, StockEntry, SymbolResult};
use crate::payout::PayoutPipeline;
use crate::rtp_tracker::RtpTracker;
use crate::snapshot::SnapshotProvider;
use crate::store::{get_json, set_json, StateStore};
use crate::transport::RoomBroadcaster;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

const LEASE_TTL: Duration = Duration::from_secs(10);
const ANCILLARY_TTL: Duration = Duration::from_secs(300);

pub struct Scheduler {
    market: String,
    instance_id: String,
    stock_count: usize,
    phase_durations: PhaseDurations,
    store: Arc<dyn StateStore>,
    lease: Arc<LeaseManager>,
    snapshot_provider: Arc<dyn SnapshotProvider>,
    circuit_breaker: Arc<CircuitBreaker>,
    decision_engine: DecisionEngine,
    rtp_tracker: Arc<RtpTracker>,
    broadcaster: Arc<dyn RoomBroadcaster>,
    payout: Arc<PayoutPipeline>,
    rng: AsyncMutex<StdRng>,
}

#[allow(clippy::too_many_arguments)]
impl Scheduler {
    pub fn new(
        market: impl Into<String>,
        instance_id: impl Into<String>,
        stock_count: usize,
        phase_durations: PhaseDurations,
        rtp_config: RtpConfig,
        store: Arc<dyn StateStore>,
        lease: Arc<LeaseManager>,
        snapshot_provider: Arc<dyn SnapshotProvider>,
        circuit_breaker: Arc<CircuitBreaker>,
        rtp_tracker: Arc<RtpTracker>,
        broadcaster: Arc<dyn RoomBroadcaster>,
        payout: Arc<PayoutPipeline>,
    ) -> Self {
        let decision_engine = DecisionEngine::new(
            &rtp_config.multipliers,
            &rtp_config.zones,
            rtp_config.desired_rtp,
            rtp_config.threshold_playcount,
        );
        Self {
            market: market.into(),
            instance_id: instance_id.into(),
            stock_count,
            phase_durations,
            store,
            lease,
            snapshot_provider,
            circuit_breaker,
            decision_engine,
            rtp_tracker,
            broadcaster,
            payout,
            rng: AsyncMutex::new(StdRng::from_entropy()),
        }
    }

    fn state_key(&self) -> String {
        format!("plinko:state:{}", self.market)
    }

    fn stocks_key(&self, round_id: &str) -> String {
        format!("plinko:{}:{round_id}:stocks", self.market)
    }

    fn start_snap_key(&self, round_id: &str) -> String {
        format!("plinko:{}:{round_id}:start_snap", self.market)
    }

    fn results_key(&self, round_id: &str) -> String {
        format!("plinko:{}:{round_id}:results", self.market)
    }

    /// Runs one leader cycle and returns how long the caller should sleep
    /// before invoking `tick()` again.
    pub async fn tick(&self) -> Duration {
        let now = now_ms();

        if !self.lease.acquire_or_extend(&self.market, &self.instance_id, LEASE_TTL).await {
            return Duration::from_secs(5);
        }

        match self.run_tick(now).await {
            Ok(duration) => duration,
            Err(err) => {
                tracing::error!(market = %self.market, %err, "scheduler tick failed, rescheduling");
                Duration::from_secs(5)
            }
        }
    }

    async fn run_tick(&self, now: i64) -> anyhow::Result<Duration> {
        let healthy = self.circuit_breaker.is_healthy(&self.market, now).await;
        let current = get_json::<RoundState>(self.store.as_ref(), &self.state_key()).await?;

        if !healthy {
            if let Some(round) = &current {
                if round.phase != Phase::Paused {
                    let paused = self.circuit_breaker.trip(&self.market, round, now).await;
                    self.persist_and_broadcast(&paused).await?;
                }
            }
            return Ok(Duration::from_secs(2));
        }

        let round = match current {
            None => self.enter_betting(now).await?,
            Some(round) if round.phase == Phase::Paused => {
                self.circuit_breaker.broadcast_recovered(&self.market);
                self.enter_betting(now).await?
            }
            Some(round) if now < round.end_time => {
                let remaining = (round.end_time - now).clamp(0, 1_000) as u64;
                return Ok(Duration::from_millis(remaining));
            }
            Some(round) => self.advance(round, now).await?,
        };

        let remaining = (round.end_time - now).clamp(0, 1_000) as u64;
        Ok(Duration::from_millis(remaining))
    }

    async fn advance(&self, round: RoundState, now: i64) -> anyhow::Result<RoundState> {
        match round.phase {
            Phase::Betting => self.enter_accumulation(round, now).await,
            Phase::Accumulation => self.enter_dropping(round, now).await,
            Phase::Dropping => self.enter_payout(round, now).await,
            Phase::Payout => self.enter_betting(now).await,
            Phase::Paused => self.enter_betting(now).await,
        }
    }

    async fn persist_and_broadcast(&self, round: &RoundState) -> anyhow::Result<()> {
        round.assert_invariants();
        set_json(self.store.as_ref(), &self.state_key(), round, None).await?;
        self.broadcaster.broadcast_game_state(&self.market, round);
        Ok(())
    }

    async fn fetch_snapshot_with_retry(&self) -> Snapshot {
        if let Some(snapshot) = self.snapshot_provider.get_snapshot(&self.market).await {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.snapshot_provider
            .get_snapshot(&self.market)
            .await
            .unwrap_or(Snapshot {
                symbols: Default::default(),
                captured_at: now_ms(),
            })
    }

    async fn enter_betting(&self, now: i64) -> anyhow::Result<RoundState> {
        let round_id = Uuid::new_v4().to_string();
        let snapshot = self.fetch_snapshot_with_retry().await;

        let mut symbols: Vec<String> = snapshot.symbols.keys().cloned().collect();
        {
            let mut rng = self.rng.lock().await;
            symbols.shuffle(&mut *rng);
        }
        symbols.truncate(self.stock_count);

        set_json(
            self.store.as_ref(),
            &self.stocks_key(&round_id),
            &symbols,
            Some(ANCILLARY_TTL),
        )
        .await?;

        let stocks = symbols
            .iter()
            .map(|symbol| {
                let mut entry = StockEntry::new(symbol.clone());
                entry.current_price = snapshot.price_of(symbol);
                entry
            })
            .collect();

        let round = RoundState::new_betting(
            round_id,
            now,
            now + self.phase_durations.betting.as_millis() as i64,
            stocks,
        );
        self.persist_and_broadcast(&round).await?;
        Ok(round)
    }

    async fn enter_accumulation(&self, mut round: RoundState, now: i64) -> anyhow::Result<RoundState> {
        let snapshot = self.fetch_snapshot_with_retry().await;
        set_json(
            self.store.as_ref(),
            &self.start_snap_key(&round.round_id),
            &snapshot,
            Some(ANCILLARY_TTL),
        )
        .await?;

        for stock in &mut round.stocks {
            stock.start_price = snapshot.price_of(&stock.symbol);
        }

        round.phase = Phase::Accumulation;
        round.can_unbet = false;
        round.server_time = now;
        round.end_time = now + self.phase_durations.accumulation.as_millis() as i64;
        self.persist_and_broadcast(&round).await?;
        Ok(round)
    }

    async fn enter_dropping(&self, mut round: RoundState, now: i64) -> anyhow::Result<RoundState> {
        let end_snapshot = self.fetch_snapshot_with_retry().await;
        let start_snapshot = get_json::<Snapshot>(self.store.as_ref(), &self.start_snap_key(&round.round_id))
            .await?
            .unwrap_or_else(|| end_snapshot.clone());

        let deltas: Vec<(String, f64)> = round
            .stocks
            .iter()
            .map(|stock| {
                let start = start_snapshot.price_of(&stock.symbol).unwrap_or(0.0);
                let end = end_snapshot.price_of(&stock.symbol).unwrap_or(start);
                (stock.symbol.clone(), compute_delta(start, end))
            })
            .collect();

        let metrics = self.rtp_tracker.get_metrics(&self.market).await;
        let play_count = metrics.play_count;
        let current_rtp = metrics.current_rtp;

        let decisions = {
            let mut rng = self.rng.lock().await;
            self.decision_engine.decide(&deltas, play_count, current_rtp, &mut *rng)
        };

        let results: Vec<SymbolResult> = decisions
            .iter()
            .map(|d| SymbolResult {
                symbol: d.symbol.clone(),
                delta: d.delta,
                multiplier_index: d.multiplier_index,
                multiplier: d.multiplier,
                reason: d.reason.clone(),
            })
            .collect();

        set_json(
            self.store.as_ref(),
            &self.results_key(&round.round_id),
            &results,
            Some(ANCILLARY_TTL),
        )
        .await?;

        for stock in &mut round.stocks {
            if let Some(decision) = decisions.iter().find(|d| d.symbol == stock.symbol) {
                stock.current_price = end_snapshot.price_of(&stock.symbol);
                stock.delta = Some(decision.delta);
                stock.multiplier = Some(decision.multiplier);
                stock.multiplier_index = Some(decision.multiplier_index);
            }
        }

        round.phase = Phase::Dropping;
        round.server_time = now;
        round.end_time = now + self.phase_durations.dropping.as_millis() as i64;
        self.persist_and_broadcast(&round).await?;
        Ok(round)
    }

    async fn enter_payout(&self, mut round: RoundState, now: i64) -> anyhow::Result<RoundState> {
        round.phase = Phase::Payout;
        round.server_time = now;
        round.end_time = now + self.phase_durations.payout.as_millis() as i64;
        self.persist_and_broadcast(&round).await?;

        let payout = self.payout.clone();
        let market = self.market.clone();
        let round_id = round.round_id.clone();
        tokio::spawn(async move {
            payout.run(&market, &round_id).await;
        });

        Ok(round)
    }
}
