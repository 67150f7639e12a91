//! Transports the launcher knows how to serve.
//!
//! A [`Transport`] owns the request-handling surface of one protocol and
//! runs it on an already-bound listener until the shutdown token fires.

use std::fmt;
use std::io;

use async_trait::async_trait;
use axum::Router;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::service::Routes;
use tonic::transport::Server;
use tracing::debug;

use crate::error::{CampusError, Result};

/// Accepted gRPC connections waiting for tonic to pick them up.
const ACCEPT_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Http,
    Grpc,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Grpc => "gRPC",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Transport: Send + 'static {
    fn kind(&self) -> TransportKind;

    /// Mount points logged once the listener is bound.
    fn mounts(&self) -> Vec<String> {
        Vec::new()
    }

    /// Serve until `shutdown` is cancelled and in-flight work has drained.
    ///
    /// Must stop accepting new connections as soon as `shutdown` fires.
    async fn serve(self: Box<Self>, listener: TcpListener, shutdown: CancellationToken)
        -> Result<()>;
}

/// HTTP surface backed by an axum router.
pub struct HttpTransport {
    router: Router,
    mounts: Vec<String>,
}

impl HttpTransport {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            mounts: Vec::new(),
        }
    }

    pub fn mount(mut self, route: impl Into<String>) -> Self {
        self.mounts.push(route.into());
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn mounts(&self) -> Vec<String> {
        self.mounts.clone()
    }

    async fn serve(
        self: Box<Self>,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| CampusError::Serve {
                transport: TransportKind::Http,
                message: e.to_string(),
            })
    }
}

/// gRPC surface backed by tonic routes.
pub struct GrpcTransport {
    routes: Routes,
    mounts: Vec<String>,
}

impl GrpcTransport {
    pub fn new(routes: Routes) -> Self {
        Self {
            routes,
            mounts: Vec::new(),
        }
    }

    pub fn mount(mut self, service: impl Into<String>) -> Self {
        self.mounts.push(service.into());
        self
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Grpc
    }

    fn mounts(&self) -> Vec<String> {
        self.mounts.clone()
    }

    /// tonic keeps its incoming stream alive until the drain ends, so the
    /// listener lives in a separate accept loop that drops it on shutdown.
    async fn serve(
        self: Box<Self>,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let (tx, rx) = mpsc::channel(ACCEPT_QUEUE);
        let accept = accept_until_shutdown(listener, shutdown.clone(), tx);

        let signal = shutdown.clone();
        let server = Server::builder()
            .add_routes(self.routes)
            .serve_with_incoming_shutdown(ReceiverStream::new(rx), async move {
                signal.cancelled().await
            });
        tokio::pin!(server);

        let served = tokio::select! {
            served = &mut server => served,
            () = accept => server.await,
        };

        served.map_err(|e| CampusError::Serve {
            transport: TransportKind::Grpc,
            message: e.to_string(),
        })
    }
}

/// Hand accepted connections to the server until `shutdown` fires, then
/// close the listener.
async fn accept_until_shutdown(
    listener: TcpListener,
    shutdown: CancellationToken,
    tx: mpsc::Sender<io::Result<TcpStream>>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted.map(|(stream, _)| stream),
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            sent = tx.send(accepted) => if sent.is_err() { break },
        }
    }

    drop(listener);
    debug!("Listener closed");
}
