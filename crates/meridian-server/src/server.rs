//! The HTTP accept loop.
//!
//! [`HttpServer`] runs as a [`Service`]: its run body binds the listen
//! address, marks the service started, and serves HTTP/1.1 connections
//! (with upgrades) through a shared [`Router`] until the service is
//! stopped. Stopping closes the listener, asks every connection to finish
//! its in-flight request, and waits up to the shutdown timeout for them.
//!
//! [`serve`] wires the whole sequence together for a binary's `main`.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use http::Request;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use meridian_config::{MeridianConfig, ServerConfig};
use meridian_core::Signal;
use meridian_tasks::Service;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::error::ServerError;
use crate::router::Router;
use crate::shutdown::{wait_for_os_signal, ConnectionTracker};

// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// An HTTP/1.1 server bound to one address.
///
/// ```rust,ignore
/// let server = HttpServer::new(&config.server, Arc::new(router));
/// let service = server.service();
/// service.start().wait().await;
/// // ...
/// service.stop().wait().await;
/// ```
#[derive(Debug, Clone)]
pub struct HttpServer {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    addr: String,
    shutdown_timeout: Duration,
    router: Arc<Router>,
    local_addr: OnceLock<SocketAddr>,
    connections: ConnectionTracker,
}

impl HttpServer {
    /// Creates a server for `router` using the listen address and shutdown
    /// timeout from `config`.
    pub fn new(config: &ServerConfig, router: Arc<Router>) -> Self {
        Self {
            inner: Arc::new(Inner {
                addr: config.http_addr.clone(),
                shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
                router,
                local_addr: OnceLock::new(),
                connections: ConnectionTracker::new(),
            }),
        }
    }

    /// The router requests are dispatched to.
    pub fn router(&self) -> &Arc<Router> {
        &self.inner.router
    }

    /// The bound address, once the service has started.
    ///
    /// Useful with port `0`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr.get().copied()
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.inner.connections.active_connections()
    }

    /// The server as a supervised service.
    ///
    /// A bind failure is the service's start error.
    pub fn service(&self) -> Service {
        let inner = Arc::clone(&self.inner);
        Service::new("http-server", move |cancel, started| async move {
            inner.run(cancel, started).await?;
            Ok(())
        })
    }
}

impl Inner {
    async fn run(&self, cancel: Signal, started: Signal) -> Result<(), ServerError> {
        let addr: SocketAddr = self.addr.parse().map_err(|source| ServerError::InvalidAddress {
            addr: self.addr.clone(),
            source,
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        let _ = self.local_addr.set(local_addr);

        info!(addr = %local_addr, "HTTP server listening");
        started.fire();

        loop {
            tokio::select! {
                () = cancel.wait() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let token = self.connections.acquire();
                        let router = Arc::clone(&self.router);
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            serve_connection(stream, remote, router, cancel).await;
                            drop(token);
                        });
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
        drop(listener);

        info!(
            active = self.connections.active_connections(),
            timeout = ?self.shutdown_timeout,
            "HTTP server draining connections"
        );
        let drained = tokio::time::timeout(self.shutdown_timeout, self.connections.wait_idle()).await;
        if drained.is_err() {
            warn!(
                active = self.connections.active_connections(),
                "shutdown timeout reached with connections still open"
            );
        }

        info!(addr = %local_addr, "HTTP server stopped");
        Ok(())
    }
}

async fn serve_connection(stream: TcpStream, remote: SocketAddr, router: Arc<Router>, cancel: Signal) {
    let request_cancel = cancel.clone();
    let service = service_fn(move |request: Request<Incoming>| {
        let router = Arc::clone(&router);
        let cancel = request_cancel.clone();
        async move {
            let request = request.map(|body| body.map_err(std::io::Error::other).boxed_unsync());
            Ok::<_, Infallible>(router.dispatch(request, cancel).await)
        }
    });

    let connection = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades();
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => {
            if let Err(err) = result {
                debug!(remote = %remote, error = %err, "connection error");
            }
            return;
        }
        () = cancel.wait() => connection.as_mut().graceful_shutdown(),
    }

    if let Err(err) = connection.await {
        debug!(remote = %remote, error = %err, "connection error during shutdown");
    }
}

/// Runs a server until SIGINT or SIGTERM, then shuts it down.
///
/// See [`serve_with_shutdown`].
///
/// # Errors
///
/// Same as [`serve_with_shutdown`].
pub async fn serve(config: MeridianConfig, router: Router) -> anyhow::Result<()> {
    serve_with_shutdown(config, router, async {
        if let Err(err) = wait_for_os_signal().await {
            error!(error = %err, "cannot listen for shutdown signals");
        }
    })
    .await
}

/// Runs a server until `shutdown` resolves.
///
/// The sequence is:
///
/// 1. apply the stream settings and mount `static_root` under `/static`
/// 2. start the HTTP service, failing if it cannot bind
/// 3. wait for `shutdown` (or for the service to stop on its own)
/// 4. stop the HTTP service, draining in-flight requests
/// 5. close every open stream and wait for all of them to confirm
///
/// # Errors
///
/// Fails on invalid configuration, a duplicate `/static` route, a start
/// error or a stop error of the HTTP service.
pub async fn serve_with_shutdown<F>(config: MeridianConfig, router: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    config.validate()?;

    let mut router = router.with_streams(&config.streams);
    if let Some(root) = &config.server.static_root {
        router.static_files("/static", root)?;
    }
    let router = Arc::new(router);

    let server = HttpServer::new(&config.server, Arc::clone(&router));
    let service = server.service();
    service.start().wait().await;
    if let Some(err) = service.start_error() {
        return Err(err.into());
    }

    let stopped = service.stopped();
    tokio::select! {
        () = shutdown => info!("shutting down"),
        () = stopped.wait() => warn!("HTTP server stopped on its own"),
    }

    service.stop().wait().await;
    info!(streams = router.registry().len(), "closing open streams");
    router.close().wait().await;

    if let Some(err) = service.stop_error() {
        return Err(err.into());
    }
    info!("shutdown complete");
    Ok(())
}
