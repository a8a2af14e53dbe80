//! Structured logging and the non-blocking telemetry sink.
//!
//! Telemetry emission must never be able to fail a public operation: an
//! exception inside the emitter is logged and swallowed. [`NonBlockingSink`]
//! is the one place that contract is enforced, so every component can hold
//! a plain `Arc<dyn TelemetrySink>` and call `emit` without a `?`.

use std::sync::Arc;

use async_trait::async_trait;

mod event;
pub use event::{TelemetryEvent, XrpCloseReason};

/// The telemetry sink interface. Implementations may fail internally;
/// callers should route every sink through [`NonBlockingSink`] rather than
/// calling `emit` on a raw implementation, so that a failure never
/// propagates.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn emit(&self, event: TelemetryEvent) -> Result<(), String>;
}

/// Emits every event as a structured `tracing` event at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl TelemetrySink for TracingSink {
    async fn emit(&self, event: TelemetryEvent) -> Result<(), String> {
        let payload = serde_json::to_value(&event).map_err(|e| e.to_string())?;
        tracing::info!(target: "settlement::telemetry", tag = %event.tag(), payload = %payload, "telemetry event");
        Ok(())
    }
}

/// Wraps any [`TelemetrySink`] so that a failing `emit` is logged and
/// swallowed instead of propagated, satisfying the non-blocking-telemetry
/// invariant.
pub struct NonBlockingSink<S> {
    inner: S,
}

impl<S> NonBlockingSink<S> {
    pub fn new(inner: S) -> Self {
        NonBlockingSink { inner }
    }
}

impl<S: TelemetrySink> NonBlockingSink<S> {
    /// Emits `event`, logging and discarding any error from the inner sink.
    pub async fn emit(&self, event: TelemetryEvent) {
        if let Err(err) = self.inner.emit(event).await {
            tracing::warn!(target: "settlement::telemetry", error = %err, "telemetry emitter failed; continuing");
        }
    }
}

pub type SharedTelemetry = Arc<NonBlockingSink<TracingSink>>;

pub fn default_sink() -> SharedTelemetry {
    Arc::new(NonBlockingSink::new(TracingSink))
}

/// Installs a `tracing_subscriber` global default with the `RUST_LOG`
/// env-filter convention used throughout this stack.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysFailingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TelemetrySink for AlwaysFailingSink {
        async fn emit(&self, _event: TelemetryEvent) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err("boom".to_string())
        }
    }

    #[tokio::test]
    async fn failing_sink_never_propagates() {
        let sink = NonBlockingSink::new(AlwaysFailingSink {
            calls: AtomicUsize::new(0),
        });
        sink.emit(TelemetryEvent::SettlementStarted {
            peer_id: "peer-alice".into(),
            token_id: "USDC".into(),
        })
        .await;
        assert_eq!(sink.inner.calls.load(Ordering::SeqCst), 1);
    }
}
