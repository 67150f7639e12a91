//! Listener launcher.
//!
//! Binds one transport, then spawns its serve loop and registers a shutdown
//! watcher in the supervisor's wait-group. The watcher gives the serve loop
//! a bounded window to drain once shutdown starts, then aborts it.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tonic::service::Routes;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use super::events::{EventSender, LifecycleEvent};
use super::transport::{GrpcTransport, HttpTransport, Transport, TransportKind};
use crate::error::CampusError;

/// How a transport came to a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Drained within the grace period.
    Graceful,
    /// Aborted after the grace period, or on a forced stop.
    Forced,
    /// The serve loop had already ended before shutdown began.
    Exited,
    /// The listener never bound.
    NotStarted,
}

#[derive(Debug, Clone)]
pub struct TransportReport {
    pub transport: TransportKind,
    pub address: SocketAddr,
    pub bound: Option<SocketAddr>,
    pub outcome: StopOutcome,
}

/// Shared state handed to every launcher by the supervisor.
pub(crate) struct LaunchContext {
    pub events: EventSender,
    pub shutdown: CancellationToken,
    pub force: CancellationToken,
    pub grace: Duration,
    pub span: Span,
}

pub struct Launcher {
    address: SocketAddr,
    transport: Box<dyn Transport>,
}

impl Launcher {
    pub fn new(address: SocketAddr, transport: impl Transport) -> Self {
        Self {
            address,
            transport: Box::new(transport),
        }
    }

    pub fn http(address: SocketAddr, router: Router) -> Self {
        Self::new(address, HttpTransport::new(router))
    }

    pub fn grpc(address: SocketAddr, routes: Routes) -> Self {
        Self::new(address, GrpcTransport::new(routes))
    }

    /// Bind the listener. A bind failure is reported as an event right away;
    /// the returned [`BoundListener`] then only waits for shutdown.
    pub(crate) async fn bind(self, ctx: &LaunchContext) -> BoundListener {
        let kind = self.transport.kind();
        let address = self.address;
        let span = info_span!(
            parent: &ctx.span,
            "transport",
            transport = kind.as_str(),
            address = %address
        );

        let listener = match TcpListener::bind(address).await {
            Ok(listener) => {
                info!(parent: &span, bound = ?listener.local_addr().ok(), "Listener bound");
                for mount in self.transport.mounts() {
                    info!(parent: &span, mount = %mount, "Mounted");
                }
                Some((listener, self.transport))
            }
            Err(source) => {
                let reason = source.to_string();
                let err = CampusError::Bind {
                    transport: kind,
                    address,
                    source,
                };
                error!(parent: &span, error = %err, code = err.error_code(), "Bind failed");
                ctx.events.emit(LifecycleEvent::BindFailed {
                    transport: kind,
                    address,
                    reason,
                });
                None
            }
        };

        BoundListener {
            kind,
            address,
            listener,
            span,
        }
    }
}

/// A launcher whose bind step is done.
pub(crate) struct BoundListener {
    kind: TransportKind,
    address: SocketAddr,
    listener: Option<(TcpListener, Box<dyn Transport>)>,
    span: Span,
}

impl BoundListener {
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .and_then(|(listener, _)| listener.local_addr().ok())
    }

    /// Spawn the serve loop and register the shutdown watcher.
    pub fn start(self, ctx: &LaunchContext, watchers: &mut JoinSet<TransportReport>) {
        let bound = self.local_addr();
        let serve = self.listener.map(|(listener, transport)| {
            let serve = serve_loop(
                self.kind,
                transport,
                listener,
                ctx.shutdown.clone(),
                ctx.events.clone(),
            );
            tokio::spawn(serve.instrument(self.span.clone()))
        });

        let watcher = Watcher {
            kind: self.kind,
            address: self.address,
            bound,
            events: ctx.events.clone(),
            shutdown: ctx.shutdown.clone(),
            force: ctx.force.clone(),
            grace: ctx.grace,
        };
        watchers.spawn(watcher.run(serve).instrument(self.span));
    }
}

/// Run the transport and report how it ended. Returns true when it drained
/// after shutdown was requested.
async fn serve_loop(
    kind: TransportKind,
    transport: Box<dyn Transport>,
    listener: TcpListener,
    shutdown: CancellationToken,
    events: EventSender,
) -> bool {
    let event = match transport.serve(listener, shutdown.clone()).await {
        Ok(()) => {
            let after_shutdown = shutdown.is_cancelled();
            if after_shutdown {
                info!("Server drained");
            } else {
                warn!("Server exited before shutdown was requested");
            }
            LifecycleEvent::ServeExited {
                transport: kind,
                after_shutdown,
            }
        }
        Err(e) => {
            error!(error = %e, code = e.error_code(), "Server failed");
            LifecycleEvent::ServeFailed {
                transport: kind,
                reason: e.to_string(),
            }
        }
    };
    let drained = matches!(
        event,
        LifecycleEvent::ServeExited {
            after_shutdown: true,
            ..
        }
    );
    events.emit(event);
    drained
}

struct Watcher {
    kind: TransportKind,
    address: SocketAddr,
    bound: Option<SocketAddr>,
    events: EventSender,
    shutdown: CancellationToken,
    force: CancellationToken,
    grace: Duration,
}

impl Watcher {
    async fn run(self, serve: Option<JoinHandle<bool>>) -> TransportReport {
        let outcome = match serve {
            Some(serve) => self.stop(serve).await,
            None => {
                self.shutdown.cancelled().await;
                debug!("Shutdown observed, listener was never bound");
                StopOutcome::NotStarted
            }
        };

        TransportReport {
            transport: self.kind,
            address: self.address,
            bound: self.bound,
            outcome,
        }
    }

    async fn stop(&self, mut serve: JoinHandle<bool>) -> StopOutcome {
        tokio::select! {
            joined = &mut serve => {
                let outcome = self.settle(joined);
                self.shutdown.cancelled().await;
                return outcome;
            }
            _ = self.shutdown.cancelled() => {}
        }

        info!(grace_ms = self.grace.as_millis() as u64, "Shutdown started");

        let outcome = tokio::select! {
            joined = tokio::time::timeout(self.grace, &mut serve) => match joined {
                Ok(joined) => self.settle(joined),
                Err(_) => {
                    warn!(
                        grace_ms = self.grace.as_millis() as u64,
                        "Graceful stop timed out, aborting"
                    );
                    StopOutcome::Forced
                }
            },
            _ = self.force.cancelled() => {
                warn!("Forced stop requested, aborting");
                StopOutcome::Forced
            }
        };

        if outcome == StopOutcome::Forced {
            serve.abort();
            // Wait for the abort so the listener is closed before we report.
            let _ = serve.await;
        }

        info!(outcome = ?outcome, "Shutdown complete");
        outcome
    }

    /// Classify a finished serve task. The loop reports its own result; only
    /// a panic is reported from here.
    fn settle(&self, joined: Result<bool, JoinError>) -> StopOutcome {
        match joined {
            Ok(true) => StopOutcome::Graceful,
            Ok(false) => StopOutcome::Exited,
            Err(e) => {
                error!(error = %e, "Serve task died");
                self.events.emit(LifecycleEvent::ServeFailed {
                    transport: self.kind,
                    reason: format!("serve task died: {}", e),
                });
                StopOutcome::Exited
            }
        }
    }
}
