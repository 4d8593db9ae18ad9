//! One-shot broadcast signals.
//!
//! A [`Signal`] starts unfired and can be fired once. Every clone observes
//! the same state, and every waiter (past or future) completes once it has
//! fired. Signals are used for service "started"/"stopped" notifications,
//! stream close requests and close confirmations, and as the cancellation
//! token handed to run loops.
//!
//! # Example
//!
//! ```rust
//! use meridian_core::Signal;
//!
//! # tokio_test::block_on(async {
//! let stop = Signal::new();
//! let waiter = stop.clone();
//!
//! let task = tokio::spawn(async move { waiter.wait().await });
//! assert!(stop.fire());
//! assert!(!stop.fire());
//! task.await.unwrap();
//! # });
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// A cloneable, fire-once broadcast signal.
#[derive(Debug, Clone, Default)]
pub struct Signal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    fired: AtomicBool,
    notify: Notify,
}

impl Signal {
    /// Creates an unfired signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a signal that has already fired.
    #[must_use]
    pub fn fired() -> Self {
        let signal = Self::new();
        signal.fire();
        signal
    }

    /// Fires the signal and wakes every waiter.
    ///
    /// Returns `true` only for the call that actually fired it.
    pub fn fire(&self) -> bool {
        if self
            .inner
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.inner.notify.notify_waiters();
            true
        } else {
            false
        }
    }

    /// Returns `true` once the signal has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Completes when the signal fires, immediately if it already has.
    pub async fn wait(&self) {
        loop {
            // Register before checking the flag so a concurrent `fire`
            // cannot slip between the check and the await.
            let notified = self.inner.notify.notified();
            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }

    /// Returns `true` if both handles refer to the same signal.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
