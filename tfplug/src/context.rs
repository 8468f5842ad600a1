//! Context carries cancellation across async boundaries
//!
//! Every resource operation receives a Context as its first argument. The
//! gRPC service hands out children of a provider-wide stop context, so a
//! StopProvider call is visible to all in-flight and future operations.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    done: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
}

impl Context {
    pub fn new() -> Self {
        let (done_tx, done_rx) = watch::channel(false);

        Self {
            inner: Arc::new(ContextInner {
                done: done_rx,
                done_tx,
            }),
        }
    }

    /// Derives a context that follows the parent's cancellation
    pub fn child(&self) -> Self {
        let (done_tx, done_rx) = watch::channel(self.is_cancelled());

        let mut parent_done = self.inner.done.clone();
        let forward_tx = done_tx.clone();
        tokio::spawn(async move {
            if parent_done.wait_for(|cancelled| *cancelled).await.is_ok() {
                let _ = forward_tx.send(true);
            }
        });

        Self {
            inner: Arc::new(ContextInner {
                done: done_rx,
                done_tx,
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.done.borrow()
    }

    pub fn cancel(&self) {
        let _ = self.inner.done_tx.send(true);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
