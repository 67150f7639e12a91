//! Lifecycle event channel.
//!
//! Every listener task, the signal watcher and any [`ShutdownHandle`] report
//! into one bounded channel. The supervisor treats the first event it reads
//! as the shutdown trigger. Producers never block: when the buffer is full or
//! the supervisor is gone the event is dropped and logged.

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use super::transport::TransportKind;

/// OS signal that requests termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Signal(TerminationSignal),
    ShutdownRequested,
    BindFailed {
        transport: TransportKind,
        address: SocketAddr,
        reason: String,
    },
    ServeFailed {
        transport: TransportKind,
        reason: String,
    },
    /// The serve routine returned without error. `after_shutdown` separates a
    /// drain we asked for from a listener that closed on its own.
    ServeExited {
        transport: TransportKind,
        after_shutdown: bool,
    },
}

impl LifecycleEvent {
    /// True when the event means a transport broke rather than an operator
    /// asking the service to stop.
    pub fn is_failure(&self) -> bool {
        match self {
            Self::Signal(_) | Self::ShutdownRequested => false,
            Self::BindFailed { .. } | Self::ServeFailed { .. } => true,
            Self::ServeExited { after_shutdown, .. } => !after_shutdown,
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => write!(f, "received {}", signal),
            Self::ShutdownRequested => write!(f, "shutdown requested"),
            Self::BindFailed {
                transport,
                address,
                reason,
            } => write!(f, "{} failed to bind {}: {}", transport, address, reason),
            Self::ServeFailed { transport, reason } => {
                write!(f, "{} server failed: {}", transport, reason)
            }
            Self::ServeExited {
                transport,
                after_shutdown: true,
            } => write!(f, "{} server drained", transport),
            Self::ServeExited {
                transport,
                after_shutdown: false,
            } => write!(f, "{} server exited unexpectedly", transport),
        }
    }
}

/// Send-or-drop producer side of the event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<LifecycleEvent>,
}

impl EventSender {
    /// Queue an event without waiting. Returns false if it was dropped.
    pub fn emit(&self, event: LifecycleEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                debug!(%event, "Lifecycle event dropped, channel full");
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!(%event, "Lifecycle event dropped, supervisor finished");
                false
            }
        }
    }
}

pub(crate) fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<LifecycleEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx }, rx)
}

/// Requests shutdown from outside the supervisor (tests, admin hooks).
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    events: EventSender,
}

impl ShutdownHandle {
    pub(crate) fn new(events: EventSender) -> Self {
        Self { events }
    }

    pub fn trigger(&self) -> bool {
        self.events.emit(LifecycleEvent::ShutdownRequested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_event_is_read_first() {
        let (tx, mut rx) = channel(4);

        tx.emit(LifecycleEvent::Signal(TerminationSignal::Terminate));
        tx.emit(LifecycleEvent::ShutdownRequested);

        assert_eq!(
            rx.recv().await,
            Some(LifecycleEvent::Signal(TerminationSignal::Terminate))
        );
    }

    #[test]
    fn test_emit_never_blocks_when_full() {
        let (tx, _rx) = channel(1);

        assert!(tx.emit(LifecycleEvent::ShutdownRequested));
        assert!(!tx.emit(LifecycleEvent::ShutdownRequested));
        assert!(!tx.emit(LifecycleEvent::Signal(TerminationSignal::Interrupt)));
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (tx, rx) = channel(4);
        drop(rx);

        let handle = ShutdownHandle::new(tx);
        assert!(!handle.trigger());
    }

    #[test]
    fn test_failure_classification() {
        assert!(!LifecycleEvent::ShutdownRequested.is_failure());
        assert!(!LifecycleEvent::ServeExited {
            transport: TransportKind::Grpc,
            after_shutdown: true,
        }
        .is_failure());
        assert!(LifecycleEvent::ServeExited {
            transport: TransportKind::Http,
            after_shutdown: false,
        }
        .is_failure());
        assert!(LifecycleEvent::BindFailed {
            transport: TransportKind::Http,
            address: "127.0.0.1:8080".parse().unwrap(),
            reason: "address in use".to_string(),
        }
        .is_failure());
    }
}
