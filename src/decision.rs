//! RTP decision engine — a pure function over its inputs plus
//! an injected PRNG. Zones come from a `ZoneConfig` supplied at
//! construction, not recomputed per call.

use crate::config::ZoneConfig;
use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub symbol: String,
    pub delta: f64,
    pub multiplier_index: usize,
    pub multiplier: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RtpState {
    BelowThreshold,
    BelowDesired,
    AboveDesired,
}

/// Zone partition over a multiplier array, taken directly from a
/// `ZoneConfig` rather than derived from the multiplier values. No single
/// magnitude threshold separates e.g. `{1.4, 1.2, 0.5}` from
/// `{4, 2, 1.5, 5}` in the default table, so the split is configuration,
/// not arithmetic.
pub struct ZoneMap {
    multipliers: Vec<f64>,
    red: Vec<usize>,
    yellow_high: Vec<usize>,
    yellow_low: Vec<usize>,
    yellow_all: Vec<usize>,
    green_high: Vec<usize>,
    green_low: Vec<usize>,
    green_all: Vec<usize>,
}

impl ZoneMap {
    pub fn from_config(multipliers: &[f64], zones: &ZoneConfig) -> Self {
        let mut yellow_all: Vec<usize> = zones
            .yellow_high
            .iter()
            .chain(zones.yellow_low.iter())
            .copied()
            .collect();
        yellow_all.sort_unstable();
        yellow_all.dedup();

        let mut green_all: Vec<usize> = zones
            .green_high
            .iter()
            .chain(zones.green_low.iter())
            .copied()
            .collect();
        green_all.sort_unstable();
        green_all.dedup();

        let mut red = zones.red.clone();
        red.sort_unstable();

        Self {
            multipliers: multipliers.to_vec(),
            red,
            yellow_high: zones.yellow_high.clone(),
            yellow_low: zones.yellow_low.clone(),
            yellow_all,
            green_high: zones.green_high.clone(),
            green_low: zones.green_low.clone(),
            green_all,
        }
    }

    fn multiplier_at(&self, index: usize) -> f64 {
        self.multipliers[index]
    }
}

pub struct DecisionEngine {
    zones: ZoneMap,
    desired_rtp: f64,
    threshold_playcount: u64,
}

impl DecisionEngine {
    pub fn new(
        multipliers: &[f64],
        zones: &ZoneConfig,
        desired_rtp: f64,
        threshold_playcount: u64,
    ) -> Self {
        Self {
            zones: ZoneMap::from_config(multipliers, zones),
            desired_rtp,
            threshold_playcount,
        }
    }

    fn rtp_state(&self, play_count: u64, current_rtp: f64) -> RtpState {
        if play_count < self.threshold_playcount {
            return RtpState::BelowThreshold;
        }
        // currentRTP == desired is treated as below-threshold behavior: a
        // full uniform zone, not the high/low split.
        if current_rtp == self.desired_rtp {
            RtpState::BelowThreshold
        } else if current_rtp < self.desired_rtp {
            RtpState::BelowDesired
        } else {
            RtpState::AboveDesired
        }
    }

    fn pick_zone(&self, delta: f64, state: RtpState) -> (&[usize], &'static str) {
        if delta < 0.0 {
            return (&self.zones.red, "red");
        }
        if delta == 0.0 {
            return match state {
                RtpState::BelowThreshold => (&self.zones.yellow_all, "yellow"),
                RtpState::BelowDesired => (non_empty(&self.zones.yellow_high, &self.zones.yellow_all), "yellow_high"),
                RtpState::AboveDesired => (non_empty(&self.zones.yellow_low, &self.zones.yellow_all), "yellow_low"),
            };
        }
        match state {
            RtpState::BelowThreshold => (&self.zones.green_all, "green"),
            RtpState::BelowDesired => (non_empty(&self.zones.green_high, &self.zones.green_all), "green_high"),
            RtpState::AboveDesired => (non_empty(&self.zones.green_low, &self.zones.green_all), "green_low"),
        }
    }

    /// `deltas`: `(symbol, delta)` pairs, already rounded to 3 decimals by
    /// the scheduler. `play_count`/`current_rtp` come from the RTP tracker.
    pub fn decide<R: Rng>(
        &self,
        deltas: &[(String, f64)],
        play_count: u64,
        current_rtp: f64,
        rng: &mut R,
    ) -> Vec<Decision> {
        let state = self.rtp_state(play_count, current_rtp);
        deltas
            .iter()
            .map(|(symbol, delta)| {
                let (zone, reason) = self.pick_zone(*delta, state);
                let index = zone[rng.gen_range(0..zone.len())];
                Decision {
                    symbol: symbol.clone(),
                    delta: *delta,
                    multiplier_index: index,
                    multiplier: self.zones.multiplier_at(index),
                    reason: reason.to_string(),
                }
            })
            .collect()
    }
}

fn non_empty<'a>(preferred: &'a [usize], fallback: &'a [usize]) -> &'a [usize] {
    if preferred.is_empty() {
        fallback
    } else {
        preferred
    }
}

/// `(end - start) / start * 100`, rounded to 3 decimals; `start <= 0` yields 0.
pub fn compute_delta(start: f64, end: f64) -> f64 {
    if start <= 0.0 {
        return 0.0;
    }
    let raw = (end - start) / start * 100.0;
    (raw * 1000.0).round() / 1000.0
}
