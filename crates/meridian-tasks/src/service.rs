//! A single supervised background task.
//!
//! A [`Service`] wraps a run body. The body receives a cancellation
//! [`Signal`] it must observe and a "started" [`Signal`] it fires once it is
//! up. When the body returns, the service fires `started` (if the body never
//! did) and then `stopped`. An error returned before `started` fired is a
//! start error, otherwise it is a stop error.
//!
//! ```text
//! Idle ──start()──▶ Running ──body returns──▶ Stopped
//!   │                                            ▲
//!   └─────────────────stop()─────────────────────┘
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use meridian_core::Signal;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{ServiceError, ServiceResult};

/// Boxed future returned by a type-erased run body.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A type-erased run body: `(cancel, started) -> result`.
pub type RunFn = Box<dyn FnOnce(Signal, Signal) -> BoxFuture<ServiceResult> + Send + 'static>;

/// Observable lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Constructed, never started.
    Idle,
    /// The run body task exists.
    Running,
    /// Terminal; the service cannot be restarted.
    Stopped,
}

enum State {
    Idle(RunFn),
    Running { cancel: Signal },
    Stopped,
}

struct Inner {
    name: String,
    state: Mutex<State>,
    started: Signal,
    stopped: Signal,
    errors: Mutex<Errors>,
}

#[derive(Default)]
struct Errors {
    start: Option<ServiceError>,
    stop: Option<ServiceError>,
}

/// A cancellable background task with start/stop signalling.
///
/// Cloning a service yields another handle to the same task. Every method
/// is safe to call in any order and from any task.
///
/// # Example
///
/// ```rust
/// use meridian_tasks::Service;
///
/// # tokio_test::block_on(async {
/// let service = Service::new("ticker", |cancel, started| async move {
///     started.fire();
///     cancel.wait().await;
///     Ok(())
/// });
///
/// service.start().wait().await;
/// service.stop().wait().await;
/// assert!(service.start_error().is_none());
/// assert!(service.stop_error().is_none());
/// # });
/// ```
#[derive(Clone)]
pub struct Service {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Service {
    /// Creates an idle service from a run body.
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(Signal, Signal) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::from_run_fn(
            name,
            Box::new(move |cancel: Signal, started: Signal| -> BoxFuture<ServiceResult> {
                Box::pin(async move { run(cancel, started).await.map_err(ServiceError::from) })
            }),
        )
    }

    /// Creates a service and starts it immediately.
    pub fn spawn<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(Signal, Signal) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let service = Self::new(name, run);
        service.start();
        service
    }

    /// Creates an idle service from a type-erased run body.
    pub fn from_run_fn(name: impl Into<String>, run: RunFn) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State::Idle(run)),
                started: Signal::new(),
                stopped: Signal::new(),
                errors: Mutex::new(Errors::default()),
            }),
        }
    }

    /// Service name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        match &*self.inner.state.lock() {
            State::Idle(_) => ServiceState::Idle,
            State::Running { .. } => ServiceState::Running,
            State::Stopped => ServiceState::Stopped,
        }
    }

    /// Spawns the run body on first call and returns the started signal.
    ///
    /// Must be called from within a Tokio runtime. Later calls, and calls
    /// after [`stop`](Self::stop), only return the signal.
    pub fn start(&self) -> Signal {
        let mut state = self.inner.state.lock();
        if matches!(*state, State::Idle(_)) {
            let cancel = Signal::new();
            let previous = std::mem::replace(
                &mut *state,
                State::Running {
                    cancel: cancel.clone(),
                },
            );
            if let State::Idle(run) = previous {
                debug!(service = %self.inner.name, "starting service");
                tokio::spawn(run_main(Arc::clone(&self.inner), run, cancel));
            }
        }
        self.inner.started.clone()
    }

    /// Requests cancellation and returns the stopped signal.
    ///
    /// A service that was never started moves straight to stopped and
    /// fires both signals without running its body. Idempotent.
    pub fn stop(&self) -> Signal {
        let mut state = self.inner.state.lock();
        match &*state {
            State::Idle(_) => {
                *state = State::Stopped;
                debug!(service = %self.inner.name, "service stopped before start");
                self.inner.started.fire();
                self.inner.stopped.fire();
            }
            State::Running { cancel } => {
                if cancel.fire() {
                    debug!(service = %self.inner.name, "stopping service");
                }
            }
            State::Stopped => {}
        }
        self.inner.stopped.clone()
    }

    /// Fires once the body has signalled startup or has returned.
    #[must_use]
    pub fn started(&self) -> Signal {
        self.inner.started.clone()
    }

    /// Fires once the body has returned, or on stop before start.
    #[must_use]
    pub fn stopped(&self) -> Signal {
        self.inner.stopped.clone()
    }

    /// Error returned by the body before it signalled startup.
    #[must_use]
    pub fn start_error(&self) -> Option<ServiceError> {
        self.inner.errors.lock().start.clone()
    }

    /// Error returned by the body after it signalled startup.
    #[must_use]
    pub fn stop_error(&self) -> Option<ServiceError> {
        self.inner.errors.lock().stop.clone()
    }

    /// Returns true while the body task exists and has not returned.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }
}

async fn run_main(inner: Arc<Inner>, run: RunFn, cancel: Signal) {
    let result = AssertUnwindSafe(run(cancel, inner.started.clone()))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(ServiceError::panicked(payload)));

    if let Err(err) = result {
        let mut errors = inner.errors.lock();
        if inner.started.is_fired() {
            warn!(service = %inner.name, error = %err, "service failed while running");
            errors.stop = Some(err);
        } else {
            warn!(service = %inner.name, error = %err, "service failed to start");
            errors.start = Some(err);
        }
    }

    inner.started.fire();
    *inner.state.lock() = State::Stopped;
    inner.stopped.fire();
    debug!(service = %inner.name, "service stopped");
}
