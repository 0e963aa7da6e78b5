//! Cooperative cancellation for pipeline suspension points.

use std::future::{pending, Future};

use tokio::sync::watch;

use crate::error::{QueryError, Result};

/// Receiving side of a cancellation signal. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    rx: Option<watch::Receiver<bool>>,
}

/// Sending side of a cancellation signal.
#[derive(Debug)]
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
}

impl Cancellation {
    /// Creates a linked handle/signal pair.
    pub fn new() -> (CancellationHandle, Cancellation) {
        let (tx, rx) = watch::channel(false);
        (CancellationHandle { tx }, Cancellation { rx: Some(rx) })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested. Pends forever if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return pending().await;
        };
        let mut rx = rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            pending::<()>().await;
        }
    }

    /// Runs `fut` unless cancellation fires first.
    pub async fn run<T, F>(&self, stage: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            tracing::warn!(stage, "cancelled before start");
            return Err(QueryError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => {
                tracing::warn!(stage, "cancelled");
                Err(QueryError::Cancelled)
            }
            result = fut => result,
        }
    }
}

impl CancellationHandle {
    /// Fires the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}
