pub mod parse;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use crate::types::RawOffer;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Cancellation signal rooted at the process. Sources should return
/// whatever they have already parsed when it fires rather than an empty
/// result.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled (or the sender is gone).
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// One bookmaker acquisition adapter. Implementations own their sessions,
/// retries and per-request timeouts; the orchestrator gives each source
/// exactly one `collect` per cycle and treats failures as partial.
///
/// Contract: emit UTC kickoff times, never in-play matches, and classify
/// `sport` accurately. PA and SO variants of the same fixture may both be
/// emitted.
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    /// Idempotent; holds any heavy session or browser state.
    async fn setup(&self, shutdown: &ShutdownSignal) -> Result<(), SourceError>;

    /// Must be safe to call twice.
    async fn teardown(&self) -> Result<(), SourceError>;

    async fn collect(&self, shutdown: ShutdownSignal) -> Result<Vec<RawOffer>, SourceError>;
}
