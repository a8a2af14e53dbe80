//! Sliding-window success/failure counters and the per-method circuit
//! breaker.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use settlement_types::SettlementMethod;
use tokio_util::sync::CancellationToken;

/// Default cap on attempts retained per method, regardless of age.
pub const DEFAULT_MAX_ATTEMPTS: usize = 1000;
/// Default sliding-window duration.
pub const DEFAULT_SLIDING_WINDOW: Duration = Duration::from_secs(3600);
/// Default interval for the background cleanup sweep.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);
/// Strictly-greater-than threshold at which the circuit breaker opens.
pub const CIRCUIT_BREAKER_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    outcome: Outcome,
    at: std::time::Instant,
}

#[derive(Debug, Default)]
struct MethodWindow {
    attempts: VecDeque<Attempt>,
}

/// Circuit breaker state returned by [`MetricsCollector::circuit_breaker_state`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerState {
    pub is_open: bool,
    pub failure_rate: f64,
}

/// Per-method sliding-window attempt counters with circuit-breaker gating.
///
/// Cloning a [`MetricsCollector`] is cheap and shares the same underlying
/// state: it is an `Arc`-backed handle over a shared, single-writer-per-key
/// map of windows.
#[derive(Clone)]
pub struct MetricsCollector {
    windows: Arc<DashMap<SettlementMethod, Mutex<MethodWindow>>>,
    max_attempts: usize,
    sliding_window: Duration,
    cancellation: CancellationToken,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_ATTEMPTS, DEFAULT_SLIDING_WINDOW)
    }

    pub fn with_config(max_attempts: usize, sliding_window: Duration) -> Self {
        MetricsCollector {
            windows: Arc::new(DashMap::new()),
            max_attempts,
            sliding_window,
            cancellation: CancellationToken::new(),
        }
    }

    /// Spawns the background cleanup timer that runs every
    /// `cleanup_interval`. Returns a handle whose cancellation is tied to
    /// [`MetricsCollector::stop`].
    pub fn spawn_cleanup(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        let token = self.cancellation.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => this.purge_expired(),
                    _ = token.cancelled() => break,
                }
            }
        })
    }

    /// Cancels the background cleanup timer this collector created.
    pub fn stop(&self) {
        self.cancellation.cancel();
    }

    pub fn record_success(&self, method: SettlementMethod) {
        self.record(method, Outcome::Success);
    }

    pub fn record_failure(&self, method: SettlementMethod) {
        self.record(method, Outcome::Failure);
    }

    fn record(&self, method: SettlementMethod, outcome: Outcome) {
        let entry = self.windows.entry(method).or_default();
        let mut window = entry.lock();
        window.attempts.push_back(Attempt {
            outcome,
            at: std::time::Instant::now(),
        });
        self.trim(&mut window);
    }

    fn trim(&self, window: &mut MethodWindow) {
        let cutoff = std::time::Instant::now().checked_sub(self.sliding_window);
        if let Some(cutoff) = cutoff {
            while window
                .attempts
                .front()
                .is_some_and(|a| a.at < cutoff)
            {
                window.attempts.pop_front();
            }
        }
        while window.attempts.len() > self.max_attempts {
            window.attempts.pop_front();
        }
    }

    /// Purges expired entries across every tracked method; also run
    /// opportunistically on every read.
    pub fn purge_expired(&self) {
        for entry in self.windows.iter() {
            let mut window = entry.value().lock();
            self.trim(&mut window);
        }
    }

    /// `1.0` when no attempts exist; otherwise the success fraction within
    /// the current window.
    pub fn success_rate(&self, method: SettlementMethod) -> f64 {
        let Some(entry) = self.windows.get(&method) else {
            return 1.0;
        };
        let mut window = entry.lock();
        self.trim(&mut window);
        if window.attempts.is_empty() {
            return 1.0;
        }
        let successes = window
            .attempts
            .iter()
            .filter(|a| a.outcome == Outcome::Success)
            .count();
        successes as f64 / window.attempts.len() as f64
    }

    /// `0.0` when no attempts exist; otherwise `failures / total` within
    /// the window.
    pub fn recent_failure_rate(&self, method: SettlementMethod) -> f64 {
        let Some(entry) = self.windows.get(&method) else {
            return 0.0;
        };
        let mut window = entry.lock();
        self.trim(&mut window);
        if window.attempts.is_empty() {
            return 0.0;
        }
        let failures = window
            .attempts
            .iter()
            .filter(|a| a.outcome == Outcome::Failure)
            .count();
        failures as f64 / window.attempts.len() as f64
    }

    /// `is_open` is strictly-greater-than 10% failure rate; at exactly 10%
    /// failure rate the breaker stays closed.
    pub fn circuit_breaker_state(&self, method: SettlementMethod) -> CircuitBreakerState {
        let failure_rate = self.recent_failure_rate(method);
        CircuitBreakerState {
            is_open: failure_rate > CIRCUIT_BREAKER_THRESHOLD,
            failure_rate,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
