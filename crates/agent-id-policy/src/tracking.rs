//! In-memory counters for authentication failures and action activity.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

const MAX_ENTRIES: usize = 10_000;

/// Per-agent timestamps retained for the unusual-activity rule
const MAX_ACTIONS_PER_AGENT: usize = 1_000;

#[derive(Debug, Clone)]
struct FailureState {
    attempts: u32,
    window_start: u64,
    last_seen: u64,
}

/// Counts authentication failures per agent inside a fixed window
///
/// A bad signature or a replayed request is not penalized on its own; the
/// trust score is only touched once `threshold` failures land inside
/// `window_seconds`.
pub struct FailureTracker {
    window_seconds: u64,
    threshold: u32,
    failures: Mutex<HashMap<Uuid, FailureState>>,
}

impl FailureTracker {
    pub fn new(window_seconds: u64, threshold: u32) -> Self {
        Self {
            window_seconds,
            threshold,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure, returning `true` exactly when the threshold is crossed
    pub fn record_failure(&self, agent_id: Uuid, current_time: u64) -> bool {
        let mut failures = self.failures.lock();

        let crossed = {
            let state = failures.entry(agent_id).or_insert(FailureState {
                attempts: 0,
                window_start: current_time,
                last_seen: current_time,
            });

            // Check if window has expired
            if current_time >= state.window_start + self.window_seconds {
                state.window_start = current_time;
                state.attempts = 0;
            }

            state.attempts += 1;
            state.last_seen = current_time;
            state.attempts == self.threshold
        };

        if failures.len() > MAX_ENTRIES {
            let window = self.window_seconds;
            failures.retain(|_, state| current_time < state.window_start + window);
        }

        crossed
    }

    /// Failures recorded in the current window
    pub fn failures(&self, agent_id: Uuid, current_time: u64) -> u32 {
        self.failures
            .lock()
            .get(&agent_id)
            .filter(|state| current_time < state.window_start + self.window_seconds)
            .map(|state| state.attempts)
            .unwrap_or(0)
    }

    /// Clear the failure count, e.g. after a successful verification
    pub fn reset(&self, agent_id: Uuid) {
        self.failures.lock().remove(&agent_id);
    }
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(900, 5)
    }
}

/// Sliding record of recent action timestamps per agent
pub struct ActivityTracker {
    horizon_seconds: u64,
    actions: Mutex<HashMap<Uuid, VecDeque<u64>>>,
}

impl ActivityTracker {
    /// Keep timestamps for `horizon_seconds`
    pub fn new(horizon_seconds: u64) -> Self {
        Self {
            horizon_seconds,
            actions: Mutex::new(HashMap::new()),
        }
    }

    /// Record an action and return the agent's actions within the horizon
    pub fn record(&self, agent_id: Uuid, current_time: u64) -> Vec<u64> {
        let mut actions = self.actions.lock();
        let since = current_time.saturating_sub(self.horizon_seconds);

        let recent = {
            let entry = actions.entry(agent_id).or_default();
            while entry.front().is_some_and(|&ts| ts <= since) {
                entry.pop_front();
            }
            entry.push_back(current_time);
            while entry.len() > MAX_ACTIONS_PER_AGENT {
                entry.pop_front();
            }
            entry.iter().copied().collect()
        };

        if actions.len() > MAX_ENTRIES {
            actions.retain(|_, entry| entry.back().is_some_and(|&ts| ts > since));
        }

        recent
    }

    /// The agent's actions within the horizon, without recording a new one
    pub fn recent(&self, agent_id: Uuid, current_time: u64) -> Vec<u64> {
        let since = current_time.saturating_sub(self.horizon_seconds);
        self.actions
            .lock()
            .get(&agent_id)
            .map(|entry| entry.iter().copied().filter(|&ts| ts > since).collect())
            .unwrap_or_default()
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new(3600)
    }
}
