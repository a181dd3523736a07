//! Per-key circuit breaker.
//!
//! Each cache key carries a failure counter and an open-until instant. The
//! counter increments once per exhausted operation (not per attempt); at the
//! threshold the circuit opens for the cooldown and every call on that key
//! is rejected without touching the transport. Any success resets the key.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::cache::CacheKey;

#[derive(Default)]
struct KeyState {
    failures: u32,
    open_until: Option<Instant>,
}

/// Circuit-breaker map over operation keys.
///
/// **Interaction**: Private to `McpClient`; consulted after the cache and
/// before any transport attempt.
pub struct CircuitBreaker {
    states: HashMap<CacheKey, KeyState>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            states: HashMap::new(),
            threshold,
            cooldown,
        }
    }

    /// Remaining open time for the key, or `None` when calls may proceed.
    ///
    /// An expired open window does not reset the counter; only a success
    /// does. The first call after cooldown is the probe.
    pub fn open_for(&self, key: &CacheKey) -> Option<Duration> {
        let state = self.states.get(key)?;
        let until = state.open_until?;
        let now = Instant::now();
        if until > now {
            Some(until - now)
        } else {
            None
        }
    }

    /// Records one exhausted operation. Returns true when this failure
    /// opened the circuit.
    pub fn record_failure(&mut self, key: &CacheKey) -> bool {
        let state = self.states.entry(key.clone()).or_default();
        state.failures += 1;
        if state.failures >= self.threshold {
            state.open_until = Some(Instant::now() + self.cooldown);
            return true;
        }
        false
    }

    /// Any success resets the key and closes its circuit.
    pub fn record_success(&mut self, key: &CacheKey) {
        self.states.remove(key);
    }

    /// Current failure count for a key (diagnostics).
    pub fn failures(&self, key: &CacheKey) -> u32 {
        self.states.get(key).map(|s| s.failures).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::cache::{cache_key, CacheKind};
    use serde_json::json;

    fn key() -> CacheKey {
        cache_key(CacheKind::Tool, "terminal", "run_command", &json!({"command": "ls"}))
    }

    /// **Scenario**: The circuit opens exactly at the threshold.
    #[test]
    fn opens_at_threshold() {
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        assert!(!breaker.record_failure(&key()));
        assert!(!breaker.record_failure(&key()));
        assert!(breaker.open_for(&key()).is_none());
        assert!(breaker.record_failure(&key()));
        assert!(breaker.open_for(&key()).is_some());
    }

    /// **Scenario**: Success resets the counter and closes the circuit.
    #[test]
    fn success_resets() {
        let mut breaker = CircuitBreaker::new(2, Duration::from_secs(30));
        breaker.record_failure(&key());
        breaker.record_failure(&key());
        assert!(breaker.open_for(&key()).is_some());
        breaker.record_success(&key());
        assert!(breaker.open_for(&key()).is_none());
        assert_eq!(breaker.failures(&key()), 0);
    }

    /// **Scenario**: After the cooldown elapses, calls may proceed again.
    #[test]
    fn cooldown_expiry_allows_probe() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure(&key());
        assert!(breaker.open_for(&key()).is_some());
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.open_for(&key()).is_none());
    }

    /// **Scenario**: Keys are independent.
    #[test]
    fn keys_are_independent() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_secs(30));
        breaker.record_failure(&key());
        let other = cache_key(CacheKind::Tool, "terminal", "read_file", &json!({}));
        assert!(breaker.open_for(&other).is_none());
    }
}
