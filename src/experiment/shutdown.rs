//! Run-wide cancellation signal.
//!
//! A [`ShutdownSignal`] is cloned into every loop that can block. Triggering it
//! wakes any exposure window currently sleeping, and every loop checks it before
//! opening the next window. Once triggered it stays triggered for the rest of
//! the run.

use crate::error::{ProbeError, ProbeResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    flag: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
}

/// Cloneable cancellation flag with async wake-up.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    /// Untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. The first reason given is kept.
    pub fn trigger(&self, reason: impl Into<String>) {
        if let Ok(mut r) = self.inner.reason.write() {
            if r.is_none() {
                *r = Some(reason.into());
            }
        }
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether shutdown was requested.
    pub fn is_triggered(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Reason passed to the first [`trigger`](Self::trigger) call.
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().ok().and_then(|r| r.clone())
    }

    /// Resolves once shutdown has been requested.
    pub async fn triggered(&self) {
        loop {
            // Register before checking the flag so a concurrent trigger is not missed
            let notified = self.inner.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }

    /// `Err(ProbeError::Cancelled)` once shutdown has been requested.
    pub fn check(&self) -> ProbeResult<()> {
        if self.is_triggered() {
            Err(ProbeError::Cancelled(
                self.reason().unwrap_or_else(|| "shutdown requested".to_string()),
            ))
        } else {
            Ok(())
        }
    }
}
