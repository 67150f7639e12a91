//! OS signal handling.
//!
//! SIGINT and SIGTERM become [`LifecycleEvent::Signal`] events. The first one
//! starts a graceful drain; a second one while draining forces the stop.
//! No other signals are handled.

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::info;

use super::events::{EventSender, LifecycleEvent, TerminationSignal};
use crate::error::{CampusError, Result};

pub struct TerminationSignals {
    #[cfg(unix)]
    interrupt: Signal,
    #[cfg(unix)]
    terminate: Signal,
}

impl TerminationSignals {
    /// Register the handlers. Fails only if the OS refuses the registration.
    pub fn install() -> Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                interrupt: signal(SignalKind::interrupt()).map_err(CampusError::Signal)?,
                terminate: signal(SignalKind::terminate()).map_err(CampusError::Signal)?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    #[cfg(unix)]
    pub async fn recv(&mut self) -> TerminationSignal {
        tokio::select! {
            Some(()) = self.interrupt.recv() => TerminationSignal::Interrupt,
            Some(()) = self.terminate.recv() => TerminationSignal::Terminate,
            else => std::future::pending::<TerminationSignal>().await,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> TerminationSignal {
        match tokio::signal::ctrl_c().await {
            Ok(()) => TerminationSignal::Interrupt,
            Err(e) => {
                tracing::warn!(error = %e, "Ctrl+C handler failed");
                std::future::pending::<TerminationSignal>().await
            }
        }
    }
}

/// Forward every received signal to the supervisor until the task is dropped.
pub(crate) async fn forward(mut signals: TerminationSignals, events: EventSender) {
    loop {
        let signal = signals.recv().await;
        info!(signal = %signal, "Termination signal received");
        events.emit(LifecycleEvent::Signal(signal));
    }
}
