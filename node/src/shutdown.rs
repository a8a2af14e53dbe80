//! Graceful shutdown on SIGTERM/SIGINT, mirroring the signal-handling
//! pattern used elsewhere in this stack: a background task cancels a
//! shared [`CancellationToken`] so every subsystem can select on it.

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn try_new() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let token = CancellationToken::new();
        let inner = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => inner.cancel(),
                _ = sigint.recv() => inner.cancel(),
            }
        });
        Ok(ShutdownSignal { token })
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn recv(&self) {
        self.token.cancelled().await;
    }
}
