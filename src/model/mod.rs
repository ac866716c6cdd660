pub mod round;
pub mod wager;

pub use round::{Phase, RoundState, Snapshot, StockEntry, SymbolPrice, SymbolResult};
pub use wager::Wager;
