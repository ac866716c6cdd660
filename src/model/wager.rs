//! Wager — a player's round-scoped bet.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wager {
    pub transaction_id: String,
    pub player_id: String,
    pub tenant_id: String,
    pub session_token: String,
    /// Normalized to a string currency code at this boundary, per the Open
    /// Question resolved in SPEC_FULL.md §9 — the source's heterogeneous
    /// string-or-object currency never crosses into the ledger.
    pub currency: String,
    pub amount: f64,
    pub symbols: Vec<String>,
    pub placed_at: i64,
}

impl Wager {
    pub fn bet_per_symbol(&self) -> f64 {
        if self.symbols.is_empty() {
            return 0.0;
        }
        self.amount / self.symbols.len() as f64
    }
}
