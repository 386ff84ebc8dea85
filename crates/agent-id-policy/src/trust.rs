//! Time-decayed, bounded trust scoring.
//!
//! The score relaxes exponentially toward a neutral baseline and every event
//! applies a bounded delta afterwards:
//!
//! ```text
//! decayed = baseline + (score - baseline) * 0.5 ^ (elapsed / half_life)
//! after   = clamp(decayed + clamp(delta, -max_delta, max_delta), 0, 100)
//! ```
//!
//! Approvals earn less as the risk level rises, denials and policy violations
//! cost more. Old behaviour fades, so an agent cannot bank trust forever and a
//! penalized agent recovers slowly without new violations.

use crate::types::RiskLevel;
use serde::{Deserialize, Serialize};

/// Lower bound of the trust score
pub const MIN_TRUST_SCORE: f64 = 0.0;

/// Upper bound of the trust score
pub const MAX_TRUST_SCORE: f64 = 100.0;

/// Trust scoring parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Score new agents start at and scores decay toward
    pub baseline: f64,
    /// Time for the distance to the baseline to halve, in seconds
    pub half_life_seconds: u64,
    /// Largest change a single event may cause
    pub max_delta: f64,
    /// Reward for an approved action, indexed low..critical
    pub approval_reward: [f64; 4],
    /// Penalty for a denied action, indexed low..critical
    pub denial_penalty: [f64; 4],
    /// Penalty per matched policy, indexed low..critical
    pub violation_penalty: [f64; 4],
    /// Penalty when repeated authentication failures cross the threshold
    pub repeated_failure_penalty: f64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            baseline: 50.0,
            half_life_seconds: 30 * 24 * 3600,
            max_delta: 10.0,
            approval_reward: [1.0, 0.75, 0.5, 0.25],
            denial_penalty: [1.0, 2.0, 3.0, 4.0],
            violation_penalty: [0.5, 1.0, 2.0, 3.0],
            repeated_failure_penalty: 5.0,
        }
    }
}

/// Outcome fed into the trust score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrustEvent {
    /// Action approved
    Approved { risk_level: RiskLevel },
    /// Action denied for authorization reasons (trust or policy)
    Denied { risk_level: RiskLevel },
    /// Policies matched; applied alongside the approval or denial
    PolicyViolations { risk_level: RiskLevel, count: u32 },
    /// Repeated authentication failures crossed the threshold
    RepeatedAuthFailures,
}

/// Score together with the time it was last updated
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustSnapshot {
    pub score: f64,
    pub updated_at: u64,
}

/// Result of applying one event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustUpdate {
    pub before: f64,
    pub after: f64,
    pub updated_at: u64,
}

impl TrustUpdate {
    pub fn snapshot(&self) -> TrustSnapshot {
        TrustSnapshot {
            score: self.after,
            updated_at: self.updated_at,
        }
    }
}

/// Pure trust score calculator
#[derive(Debug, Clone, Default)]
pub struct TrustScoreEngine {
    config: TrustConfig,
}

fn risk_index(risk_level: RiskLevel) -> usize {
    match risk_level {
        RiskLevel::Low => 0,
        RiskLevel::Medium => 1,
        RiskLevel::High => 2,
        RiskLevel::Critical => 3,
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return MIN_TRUST_SCORE;
    }
    score.clamp(MIN_TRUST_SCORE, MAX_TRUST_SCORE)
}

impl TrustScoreEngine {
    pub fn new(config: TrustConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Starting snapshot for a newly registered agent
    pub fn initial(&self, now: u64) -> TrustSnapshot {
        TrustSnapshot {
            score: clamp_score(self.config.baseline),
            updated_at: now,
        }
    }

    /// Relax a score toward the baseline over `elapsed_seconds`
    pub fn decay(&self, score: f64, elapsed_seconds: u64) -> f64 {
        let score = clamp_score(score);
        if elapsed_seconds == 0 || self.config.half_life_seconds == 0 {
            return score;
        }
        let factor = 0.5f64.powf(elapsed_seconds as f64 / self.config.half_life_seconds as f64);
        clamp_score(self.config.baseline + (score - self.config.baseline) * factor)
    }

    /// Signed, bounded delta for an event
    pub fn delta_for(&self, event: &TrustEvent) -> f64 {
        let raw = match event {
            TrustEvent::Approved { risk_level } => {
                self.config.approval_reward[risk_index(*risk_level)]
            }
            TrustEvent::Denied { risk_level } => {
                -self.config.denial_penalty[risk_index(*risk_level)]
            }
            TrustEvent::PolicyViolations { risk_level, count } => {
                -self.config.violation_penalty[risk_index(*risk_level)] * f64::from(*count)
            }
            TrustEvent::RepeatedAuthFailures => -self.config.repeated_failure_penalty,
        };
        let bound = self.config.max_delta.abs();
        raw.clamp(-bound, bound)
    }

    /// Apply one event at time `now`
    ///
    /// The result is always inside [0, 100], whatever the input snapshot holds.
    /// `before` is the score decayed to `now`, the value the event acts on.
    pub fn apply(&self, snapshot: TrustSnapshot, event: &TrustEvent, now: u64) -> TrustUpdate {
        let before = self.score_at(snapshot, now);
        let after = clamp_score(before + self.delta_for(event));

        TrustUpdate {
            before,
            after,
            updated_at: now.max(snapshot.updated_at),
        }
    }

    /// Score of a snapshot decayed to `now`
    pub fn score_at(&self, snapshot: TrustSnapshot, now: u64) -> f64 {
        self.decay(snapshot.score, now.saturating_sub(snapshot.updated_at))
    }

    /// Apply several events that happened at the same instant
    pub fn apply_all(
        &self,
        snapshot: TrustSnapshot,
        events: &[TrustEvent],
        now: u64,
    ) -> TrustUpdate {
        let before = self.score_at(snapshot, now);
        let mut current = snapshot;
        for event in events {
            current = self.apply(current, event, now).snapshot();
        }
        TrustUpdate {
            before,
            after: clamp_score(current.score),
            updated_at: current.updated_at.max(snapshot.updated_at),
        }
    }

    /// Recompute a score from a timestamped history
    pub fn score_from_history(
        &self,
        start: TrustSnapshot,
        history: &[(u64, TrustEvent)],
        now: u64,
    ) -> f64 {
        let mut snapshot = start;
        for (at, event) in history {
            snapshot = self.apply(snapshot, event, *at).snapshot();
        }
        self.score_at(snapshot, now)
    }
}
