//! Lifecycle supervisor.
//!
//! ```text
//! Starting ──bind all, then serve──▶ Running ──first event──▶ Draining ──wait-group empty──▶ Exited
//!                                                              │
//!                                          second signal ──────┘ force stop
//! ```
//!
//! The first event on the channel (signal, shutdown request, bind or serve
//! failure) is the only trigger. The second termination signal seen, counting
//! the trigger itself, forces the stop. Cancelling the shutdown token starts every
//! watcher's bounded stop; the supervisor returns once all have reported.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use super::events::{self, EventSender, LifecycleEvent, ShutdownHandle};
use super::launcher::{LaunchContext, Launcher, TransportReport};
use super::signals::{self, TerminationSignals};
use super::transport::TransportKind;
use crate::config::ServiceConfig;
use crate::error::Result;

/// Slots for signals and shutdown requests on top of one per launcher.
const EVENT_HEADROOM: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    Draining,
    Exited,
}

#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// The event that started the drain.
    pub trigger: LifecycleEvent,
    pub transports: Vec<TransportReport>,
}

impl ShutdownReport {
    pub fn is_failure(&self) -> bool {
        self.trigger.is_failure()
    }

    pub fn transport(&self, kind: TransportKind) -> Option<&TransportReport> {
        self.transports.iter().find(|r| r.transport == kind)
    }
}

pub struct Supervisor {
    grace: Duration,
    launchers: Vec<Launcher>,
    span: Span,
}

impl Supervisor {
    pub fn new(service: &str, grace: Duration) -> Self {
        Self {
            grace,
            launchers: Vec::new(),
            span: info_span!("supervisor", service = %service),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(&config.service_name, config.shutdown_timeout)
    }

    /// Parent span for every log line the supervisor and its launchers emit.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn launcher(mut self, launcher: Launcher) -> Self {
        self.launchers.push(launcher);
        self
    }

    /// Install SIGINT/SIGTERM handling, start every launcher and block until
    /// the drain has finished.
    pub async fn run(self) -> Result<ShutdownReport> {
        let signals = TerminationSignals::install()?;
        let mut running = self.start().await;
        running.watch_signals(signals);
        Ok(running.wait().await)
    }

    /// Bind every listener, then start serving on all of them.
    pub async fn start(self) -> RunningSupervisor {
        let span = self.span.clone();
        self.start_inner().instrument(span).await
    }

    async fn start_inner(self) -> RunningSupervisor {
        let (phase, _) = watch::channel(Phase::Starting);
        let (events_tx, events) = events::channel(EVENT_HEADROOM + self.launchers.len());

        let ctx = LaunchContext {
            events: events_tx.clone(),
            shutdown: CancellationToken::new(),
            force: CancellationToken::new(),
            grace: self.grace,
            span: self.span.clone(),
        };

        info!(
            launchers = self.launchers.len(),
            grace_ms = self.grace.as_millis() as u64,
            "Starting transports"
        );

        let mut bound = Vec::with_capacity(self.launchers.len());
        for launcher in self.launchers {
            bound.push(launcher.bind(&ctx).await);
        }

        let addresses: Vec<_> = bound.iter().map(|b| (b.kind(), b.local_addr())).collect();
        let mut watchers = JoinSet::new();
        for listener in bound {
            listener.start(&ctx, &mut watchers);
        }

        phase.send_replace(Phase::Running);
        info!("Running");

        RunningSupervisor {
            events_tx,
            events,
            shutdown: ctx.shutdown,
            force: ctx.force,
            watchers,
            addresses,
            phase,
            signal_task: None,
            span: self.span,
        }
    }
}

pub struct RunningSupervisor {
    events_tx: EventSender,
    events: mpsc::Receiver<LifecycleEvent>,
    shutdown: CancellationToken,
    force: CancellationToken,
    watchers: JoinSet<TransportReport>,
    addresses: Vec<(TransportKind, Option<SocketAddr>)>,
    phase: watch::Sender<Phase>,
    signal_task: Option<JoinHandle<()>>,
    span: Span,
}

impl RunningSupervisor {
    /// Address the transport actually bound, if it bound.
    pub fn local_addr(&self, kind: TransportKind) -> Option<SocketAddr> {
        self.addresses
            .iter()
            .find(|(k, _)| *k == kind)
            .and_then(|(_, addr)| *addr)
    }

    /// Producer side of the event channel, for custom shutdown sources.
    pub fn events(&self) -> EventSender {
        self.events_tx.clone()
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self.events_tx.clone())
    }

    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Forward OS termination signals into the event channel.
    pub fn watch_signals(&mut self, signals: TerminationSignals) {
        let forward = signals::forward(signals, self.events_tx.clone());
        self.signal_task = Some(tokio::spawn(forward.instrument(self.span.clone())));
    }

    /// Wait for the first event, drain every transport, and report.
    pub async fn wait(self) -> ShutdownReport {
        let span = self.span.clone();
        self.drain().instrument(span).await
    }

    async fn drain(mut self) -> ShutdownReport {
        // The supervisor holds a sender, so the channel never closes here.
        let trigger = self
            .events
            .recv()
            .await
            .unwrap_or(LifecycleEvent::ShutdownRequested);

        if trigger.is_failure() {
            error!(trigger = %trigger, "Transport failure, shutting down");
        } else {
            info!(trigger = %trigger, "Shutting down");
        }

        self.phase.send_replace(Phase::Draining);
        self.shutdown.cancel();

        // A failure-triggered drain still needs two signals before forcing.
        let mut signal_count = u32::from(matches!(trigger, LifecycleEvent::Signal(_)));

        let mut transports = Vec::with_capacity(self.addresses.len());
        loop {
            tokio::select! {
                joined = self.watchers.join_next() => match joined {
                    Some(Ok(report)) => transports.push(report),
                    Some(Err(e)) => error!(error = %e, "Shutdown watcher died"),
                    None => break,
                },
                Some(event) = self.events.recv() => match event {
                    LifecycleEvent::Signal(_) if !self.force.is_cancelled() => {
                        signal_count += 1;
                        if signal_count >= 2 {
                            warn!(event = %event, "Repeated termination signal, forcing stop");
                            self.force.cancel();
                        } else {
                            info!(event = %event, "Termination signal while draining, send again to force");
                        }
                    }
                    _ => debug!(event = %event, "Event ignored while draining"),
                },
            }
        }

        if let Some(task) = self.signal_task.take() {
            task.abort();
        }

        self.phase.send_replace(Phase::Exited);
        info!(transports = transports.len(), "All transports stopped");

        ShutdownReport {
            trigger,
            transports,
        }
    }
}
