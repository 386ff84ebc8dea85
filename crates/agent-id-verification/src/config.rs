//! Verification pipeline configuration.

use agent_id_policy::RiskLevel;
use agent_id_storage::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Behaviour when policies cannot be evaluated in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Deny the request
    #[default]
    Closed,
    /// Continue without policies and raise an alert
    Open,
}

/// Fail mode per risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailModes {
    pub low: FailMode,
    pub medium: FailMode,
    pub high: FailMode,
    pub critical: FailMode,
}

impl FailModes {
    pub fn for_level(&self, risk_level: RiskLevel) -> FailMode {
        match risk_level {
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::Critical => self.critical,
        }
    }

    /// Fail open for the listed tiers, closed for the rest
    pub fn open_for(levels: &[RiskLevel]) -> Self {
        let mode = |level: RiskLevel| {
            if levels.contains(&level) {
                FailMode::Open
            } else {
                FailMode::Closed
            }
        };
        Self {
            low: mode(RiskLevel::Low),
            medium: mode(RiskLevel::Medium),
            high: mode(RiskLevel::High),
            critical: mode(RiskLevel::Critical),
        }
    }
}

/// Minimum trust score per risk tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for TrustThresholds {
    fn default() -> Self {
        Self {
            low: 20.0,
            medium: 50.0,
            high: 70.0,
            critical: 90.0,
        }
    }
}

impl TrustThresholds {
    pub fn for_level(&self, risk_level: RiskLevel) -> f64 {
        match risk_level {
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::Critical => self.critical,
        }
    }
}

/// Verification pipeline settings
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// Maximum clock difference between request timestamp and server time
    pub freshness_window_seconds: u64,
    pub thresholds: TrustThresholds,
    /// Bound on policy evaluation
    pub remote_check_timeout: Duration,
    pub fail_modes: FailModes,
    /// Retry settings for result persistence
    pub retry: RetryPolicy,
    /// Authentication failures are counted inside this window
    pub failure_window_seconds: u64,
    /// Failures within the window before the trust score is penalized
    pub failure_threshold: u32,
    /// How far back action timestamps are kept for activity rules
    pub activity_horizon_seconds: u64,
    /// Longest accepted nonce
    pub max_nonce_length: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            freshness_window_seconds: 300,
            thresholds: TrustThresholds::default(),
            remote_check_timeout: Duration::from_secs(3),
            fail_modes: FailModes::default(),
            retry: RetryPolicy::default(),
            failure_window_seconds: 900,
            failure_threshold: 5,
            activity_horizon_seconds: 3600,
            max_nonce_length: 128,
        }
    }
}
