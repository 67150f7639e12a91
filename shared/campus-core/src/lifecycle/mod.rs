//! Dual-transport lifecycle management.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     ServiceConfig → Supervisor → Launcher::bind (HTTP, gRPC) → serve loops
//!
//! Shutdown:
//!     signal / bind failure / serve exit → event channel (first wins)
//!     → cancel shutdown token → watchers drain (bounded) → ShutdownReport
//! ```
//!
//! # Design Decisions
//! - One event channel, bounded, producers never block
//! - Both transports drain gracefully and are aborted after the same deadline
//! - A failure in either transport tears both down

pub mod events;
pub mod launcher;
pub mod signals;
pub mod supervisor;
pub mod transport;

pub use events::{EventSender, LifecycleEvent, ShutdownHandle, TerminationSignal};
pub use launcher::{Launcher, StopOutcome, TransportReport};
pub use signals::TerminationSignals;
pub use supervisor::{Phase, RunningSupervisor, ShutdownReport, Supervisor};
pub use transport::{GrpcTransport, HttpTransport, Transport, TransportKind};
