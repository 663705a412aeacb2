//! Per-key suppression of repeated log lines.
//!
//! The synchronizer keeps failing every tick while the backend is down; this
//! keeps the operational log to one line per failure kind per window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub should_emit: bool,
    pub suppressed_since_last_emit: u64,
}

#[derive(Debug, Clone)]
struct LimiterState {
    last_emit: Instant,
    suppressed: u64,
}

#[derive(Debug, Clone)]
pub struct LogRateLimiter {
    window: Duration,
    states: HashMap<String, LimiterState>,
}

impl LogRateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            states: HashMap::new(),
        }
    }

    pub fn should_emit(&mut self, key: &str) -> RateLimitDecision {
        self.should_emit_at(key, Instant::now())
    }

    fn should_emit_at(&mut self, key: &str, now: Instant) -> RateLimitDecision {
        match self.states.get_mut(key) {
            None => {
                self.states.insert(
                    key.to_string(),
                    LimiterState {
                        last_emit: now,
                        suppressed: 0,
                    },
                );
                RateLimitDecision {
                    should_emit: true,
                    suppressed_since_last_emit: 0,
                }
            }
            Some(state) => {
                if now.duration_since(state.last_emit) >= self.window {
                    let suppressed = state.suppressed;
                    state.last_emit = now;
                    state.suppressed = 0;
                    RateLimitDecision {
                        should_emit: true,
                        suppressed_since_last_emit: suppressed,
                    }
                } else {
                    state.suppressed = state.suppressed.saturating_add(1);
                    RateLimitDecision {
                        should_emit: false,
                        suppressed_since_last_emit: 0,
                    }
                }
            }
        }
    }

    /// Forget a key so the next failure of that kind is logged immediately.
    pub fn reset(&mut self, key: &str) {
        self.states.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_within_window_and_reports_count() {
        let mut limiter = LogRateLimiter::new(Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.should_emit_at("sync", start).should_emit);
        assert!(!limiter.should_emit_at("sync", start).should_emit);
        assert!(
            !limiter
                .should_emit_at("sync", start + Duration::from_secs(10))
                .should_emit
        );

        let decision = limiter.should_emit_at("sync", start + Duration::from_secs(61));
        assert!(decision.should_emit);
        assert_eq!(decision.suppressed_since_last_emit, 2);
    }

    #[test]
    fn keys_are_independent() {
        let mut limiter = LogRateLimiter::new(Duration::from_secs(60));
        assert!(limiter.should_emit("logs").should_emit);
        assert!(limiter.should_emit("stats").should_emit);
        assert!(!limiter.should_emit("logs").should_emit);
    }

    #[test]
    fn reset_allows_immediate_emit() {
        let mut limiter = LogRateLimiter::new(Duration::from_secs(60));
        assert!(limiter.should_emit("sync").should_emit);
        limiter.reset("sync");
        assert!(limiter.should_emit("sync").should_emit);
    }
}
