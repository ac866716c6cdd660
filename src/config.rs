//! Runtime configuration.
//! Mission: a single, validated, immutable snapshot of everything env-driven.

use anyhow::{bail, Result};
use std::time::Duration;

/// Phase durations for the round scheduler, all configurable.
#[derive(Debug, Clone, Copy)]
pub struct PhaseDurations {
    pub betting: Duration,
    pub accumulation: Duration,
    pub dropping: Duration,
    pub payout: Duration,
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self {
            betting: Duration::from_millis(20_000),
            accumulation: Duration::from_millis(10_000),
            dropping: Duration::from_millis(10_000),
            payout: Duration::from_millis(5_000),
        }
    }
}

/// RTP governor configuration.
#[derive(Debug, Clone)]
pub struct RtpConfig {
    pub multipliers: Vec<f64>,
    pub desired_rtp: f64,
    pub threshold_playcount: u64,
    pub limit_playcount: u64,
    pub zones: ZoneConfig,
}

impl Default for RtpConfig {
    fn default() -> Self {
        Self {
            multipliers: vec![4.0, 2.0, 1.4, 0.0, 0.5, 0.0, 1.2, 1.5, 5.0],
            desired_rtp: 96.5,
            threshold_playcount: 100,
            limit_playcount: 10_000,
            zones: ZoneConfig::default(),
        }
    }
}

/// Explicit index partition of the multiplier table into RED/YELLOW/GREEN,
/// with YELLOW and GREEN each split into a high and low half. There is no
/// magnitude rule that derives this from the multiplier values themselves
/// (a 1.2x slot and a 1.5x slot can land in different zones) — the mapping
/// is configuration, same as the multiplier table it indexes into.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneConfig {
    pub red: Vec<usize>,
    pub yellow_high: Vec<usize>,
    pub yellow_low: Vec<usize>,
    pub green_high: Vec<usize>,
    pub green_low: Vec<usize>,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            red: vec![3, 5],
            yellow_high: vec![2, 6],
            yellow_low: vec![4],
            green_high: vec![0, 8],
            green_low: vec![1, 7],
        }
    }
}

impl ZoneConfig {
    fn from_env() -> Self {
        let default = Self::default();
        Self {
            red: parse_indices("PLINKO_RED_ZONE", &default.red),
            yellow_high: parse_indices("PLINKO_YELLOW_HIGH_ZONE", &default.yellow_high),
            yellow_low: parse_indices("PLINKO_YELLOW_LOW_ZONE", &default.yellow_low),
            green_high: parse_indices("PLINKO_GREEN_HIGH_ZONE", &default.green_high),
            green_low: parse_indices("PLINKO_GREEN_LOW_ZONE", &default.green_low),
        }
    }

    /// Appends a problem description for every index out of range for
    /// `multiplier_count`, and for a zone left entirely empty.
    fn validate(&self, multiplier_count: usize, problems: &mut Vec<String>) {
        for (name, indices) in [
            ("PLINKO_RED_ZONE", &self.red),
            ("PLINKO_YELLOW_HIGH_ZONE", &self.yellow_high),
            ("PLINKO_YELLOW_LOW_ZONE", &self.yellow_low),
            ("PLINKO_GREEN_HIGH_ZONE", &self.green_high),
            ("PLINKO_GREEN_LOW_ZONE", &self.green_low),
        ] {
            for &i in indices {
                if i >= multiplier_count {
                    problems.push(format!(
                        "{name} contains index {i}, out of range for PLINKO_MULTIPLIERS (len {multiplier_count})"
                    ));
                }
            }
        }
        if self.red.is_empty() {
            problems.push("PLINKO_RED_ZONE must not be empty".to_string());
        }
        if self.yellow_high.is_empty() && self.yellow_low.is_empty() {
            problems.push(
                "at least one of PLINKO_YELLOW_HIGH_ZONE/PLINKO_YELLOW_LOW_ZONE must be non-empty"
                    .to_string(),
            );
        }
        if self.green_high.is_empty() && self.green_low.is_empty() {
            problems.push(
                "at least one of PLINKO_GREEN_HIGH_ZONE/PLINKO_GREEN_LOW_ZONE must be non-empty"
                    .to_string(),
            );
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub signature_secret: String,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub markets: Vec<String>,
    pub stock_count: usize,
    pub phase_durations: PhaseDurations,
    pub rtp: RtpConfig,
    pub wallet: WalletConfig,
    pub snapshot_freshness: Duration,
}

impl RuntimeConfig {
    /// Build from environment variables, collecting every validation
    /// failure before reporting instead of stopping at the first one.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut problems = Vec::new();

        let markets: Vec<String> = env_var("MARKETS", "")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if markets.is_empty() {
            problems.push("MARKETS must name at least one market".to_string());
        }

        let multipliers = parse_multipliers(&env_var(
            "PLINKO_MULTIPLIERS",
            "4,2,1.4,0,0.5,0,1.2,1.5,5",
        ));
        if multipliers.len() < 2 {
            problems.push("PLINKO_MULTIPLIERS must contain at least 2 values".to_string());
        }

        let zones = ZoneConfig::from_env();
        zones.validate(multipliers.len(), &mut problems);

        let stock_count = parse_env("PLINKO_STOCK_COUNT", 2usize);
        if stock_count == 0 {
            problems.push("PLINKO_STOCK_COUNT must be >= 1".to_string());
        }

        let phase_durations = PhaseDurations {
            betting: Duration::from_millis(parse_env("PLINKO_BET_TIME_MS", 20_000)),
            accumulation: Duration::from_millis(parse_env("PLINKO_DELTA_TIME_MS", 10_000)),
            dropping: Duration::from_millis(parse_env("PLINKO_DROP_TIME_MS", 10_000)),
            payout: Duration::from_millis(parse_env("PLINKO_PAYOUT_TIME_MS", 5_000)),
        };

        let desired_rtp = parse_env("DESIRED_RTP", 96.5f64);
        let threshold_playcount = parse_env("THRESHOLD_PLAYCOUNT", 100u64);
        let limit_playcount = parse_env("LIMIT_PLAYCOUNT", 10_000u64);

        let wallet_base_url = env_var("WALLET_BASE_URL", "");
        if wallet_base_url.is_empty() {
            problems.push("WALLET_BASE_URL must be set".to_string());
        }
        let wallet_timeout = Duration::from_millis(parse_env("WALLET_TIMEOUT_MS", 5_000));
        let signature_secret = env_var("WALLET_SIGNATURE_SECRET", "");
        if signature_secret.is_empty() {
            problems.push("WALLET_SIGNATURE_SECRET must be set (refusing to sign with an empty secret)".to_string());
        }

        let snapshot_freshness =
            Duration::from_secs(parse_env("SNAPSHOT_FRESHNESS_SECONDS", 5u64));

        if !problems.is_empty() {
            bail!("invalid configuration:\n  - {}", problems.join("\n  - "));
        }

        Ok(Self {
            markets,
            stock_count,
            phase_durations,
            rtp: RtpConfig {
                multipliers,
                desired_rtp,
                threshold_playcount,
                limit_playcount,
                zones,
            },
            wallet: WalletConfig {
                base_url: wallet_base_url,
                timeout: wallet_timeout,
                signature_secret,
            },
            snapshot_freshness,
        })
    }
}

fn env_var(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_multipliers(raw: &str) -> Vec<f64> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<f64>().ok())
        .collect()
}

fn parse_indices(key: &str, default: &[usize]) -> Vec<usize> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .filter_map(|s| s.trim().parse::<usize>().ok())
            .collect(),
        Err(_) => default.to_vec(),
    }
}
