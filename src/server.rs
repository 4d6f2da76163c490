//! HTTP server and graceful shutdown.
//!
//! The server owns nothing but a listener. Each accepted connection becomes
//! one tokio task; hyper calls [`Registry::dispatch`] once per request on it.
//! The registry is shared through an `Arc` and only ever read, so requests
//! need no locking and run fully concurrently.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or **Ctrl-C** the server:
//! 1. Stops `listener.accept()` immediately: no new connections.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::error::Error;
use crate::health;
use crate::registry::Registry;
use crate::request::Request;
use crate::response::Response;

/// The HTTP server.
pub struct Server {
    addr: String,
}

impl Server {
    /// Configures the server to bind to `addr` (`host:port`; host names are
    /// resolved) when it starts serving.
    ///
    /// ```rust
    /// use waypost::Server;
    /// let server = Server::bind("localhost:3001");
    /// ```
    pub fn bind(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Configures the server from the `host` and `port` settings.
    pub fn from_config(config: &Config) -> Self {
        Self::bind(config.addr())
    }

    /// Serves `registry` until SIGTERM or Ctrl-C, then drains in-flight
    /// connections.
    pub async fn serve(self, registry: Registry) -> Result<(), Error> {
        self.serve_with_shutdown(registry, shutdown_signal()).await
    }

    /// Serves `registry` until `shutdown` resolves.
    pub async fn serve_with_shutdown(
        self,
        registry: Registry,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(&self.addr).await?;
        serve_listener(listener, registry, shutdown).await
    }
}

/// Runs the accept loop on an already-bound listener.
///
/// Useful when the caller needs the bound address first, e.g. after binding
/// port `0`.
pub async fn serve_listener(
    listener: TcpListener,
    registry: Registry,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Error> {
    let local = listener.local_addr()?;
    let registry = Arc::new(registry);
    health::mark_started();

    info!(addr = %local, routes = registry.len(), "waypost listening");

    // JoinSet tracks every spawned connection task so we can wait for them
    // all to finish during graceful shutdown.
    let mut tasks = tokio::task::JoinSet::new();

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Check shutdown first so a SIGTERM stops accepting at once, even
            // if more connections are queued.
            biased;

            () = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let registry = Arc::clone(&registry);
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        let registry = Arc::clone(&registry);
                        async move { handle(&registry, req, remote_addr).await }
                    });

                    // `auto::Builder` serves HTTP/1.1 and HTTP/2, whichever
                    // the client speaks.
                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await
                    {
                        error!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound on long-running servers.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}

    info!("waypost stopped");
    Ok(())
}

/// Buffers the body and hands the request to the dispatcher.
///
/// The error type is [`Infallible`](std::convert::Infallible): every failure
/// is already a response by the time hyper sees it.
async fn handle(
    registry: &Registry,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!(peer = %remote_addr, path = parts.uri.path(), "failed to read request body: {e}");
            return Ok(Response::internal_error().into_http());
        }
    };

    let response = registry
        .dispatch(Request::from_parts(parts, body), Some(remote_addr))
        .await;
    Ok(response.into_http())
}

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C). On
/// other platforms only Ctrl-C is available. A handler that cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
