//! Centralizes the settlement core's background work: the EVM
//! deposit-monitor sweep, the EVM idle-detection sweep, the XRP lifecycle
//! sweep, metrics cleanup, and one-shot challenge-period settle timers.
//! Every task is spawned through one [`Scheduler`], which owns all of the
//! resulting `JoinHandle`s and can cancel every one of them with a single
//! [`Scheduler::stop`] call.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Owns every periodic and one-shot task spawned for the settlement core's
/// background sweeps, and can stop all of them at once.
pub struct Scheduler {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Spawns `job` to run every `interval`, starting after the first tick
    /// (i.e. not immediately on spawn). Stops as soon as [`Scheduler::stop`]
    /// is called, even mid-sleep.
    #[instrument(skip(self, job), fields(name, interval_secs = interval.as_secs()))]
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, interval: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(name, "periodic task cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        job().await;
                    }
                }
            }
        });
        self.handles.push(handle);
    }

    /// Spawns `job` to run exactly once, after `delay` — used for
    /// challenge-period settle timers, which are scheduled per-channel
    /// rather than on a fixed cadence. Skipped entirely if the scheduler is
    /// stopped before `delay` elapses.
    #[instrument(skip(self, job), fields(name, delay_secs = delay.as_secs()))]
    pub fn spawn_one_shot<Fut>(&mut self, name: &'static str, delay: Duration, job: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(name, "one-shot task cancelled before firing");
                }
                _ = tokio::time::sleep(delay) => {
                    job.await;
                }
            }
        });
        self.handles.push(handle);
    }

    /// Cancels every spawned task and awaits their completion.
    pub async fn stop(self) {
        self.token.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }

    /// Number of tasks currently tracked by this scheduler (spawned, not
    /// necessarily still running).
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
