//! Round state — the authoritative per-market blob.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Betting,
    Accumulation,
    Dropping,
    Payout,
    Paused,
}

impl Phase {
    pub fn next(self) -> Phase {
        match self {
            Phase::Betting => Phase::Accumulation,
            Phase::Accumulation => Phase::Dropping,
            Phase::Dropping => Phase::Payout,
            Phase::Payout => Phase::Betting,
            Phase::Paused => Phase::Betting,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockEntry {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
}

impl StockEntry {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            current_price: None,
            start_price: None,
            delta: None,
            multiplier_index: None,
            multiplier: None,
        }
    }
}

/// Full round-state blob, written as a single replacement on every
/// transition (never patched in place).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundState {
    pub phase: Phase,
    pub round_id: String,
    pub server_time: i64,
    pub end_time: i64,
    pub stocks: Vec<StockEntry>,
    pub can_unbet: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RoundState {
    pub fn new_betting(round_id: String, server_time: i64, end_time: i64, stocks: Vec<StockEntry>) -> Self {
        Self {
            phase: Phase::Betting,
            round_id,
            server_time,
            end_time,
            stocks,
            can_unbet: true,
            message: None,
        }
    }

    /// Invariant: `canUnbet` iff `phase == BETTING`.
    pub fn assert_invariants(&self) {
        debug_assert_eq!(self.can_unbet, self.phase == Phase::Betting);
        debug_assert!(self.end_time >= self.server_time);
    }
}

/// Market-data snapshot, provided by an external (out-of-scope) ingestion
/// component; the core only consumes `{symbols, captured_at}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbols: HashMap<String, SymbolPrice>,
    pub captured_at: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymbolPrice {
    pub price: f64,
}

impl Snapshot {
    pub fn price_of(&self, symbol: &str) -> Option<f64> {
        self.symbols.get(symbol).map(|s| s.price)
    }
}

/// Per-symbol result, persisted under the round's `results` key at DROPPING
/// entry and read exactly once by the payout pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolResult {
    pub symbol: String,
    pub delta: f64,
    pub multiplier_index: usize,
    pub multiplier: f64,
    pub reason: String,
}
