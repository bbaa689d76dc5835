//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Open store → Connect broker → Build listener
//!
//! Orchestration (orchestrator.rs, activity.rs):
//!     Spawn listener + subscriber → wait for first TerminationSignal
//!
//! Shutdown (shutdown.rs):
//!     Close broker → Stop accepting → Drain connections → Outcome
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → ExternalInterrupt on the fan-in channel
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then store, broker, listener
//! - Ordered shutdown: close broker, stop accept, drain, close store
//! - Shutdown has a deadline: stalled tasks are aborted and reported

pub mod activity;
pub mod orchestrator;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use activity::ListenerActivity;
pub use orchestrator::{
    Activity, GraceWindow, InterruptHandle, Orchestrator, Phase, ServiceOutcome, TerminationSignal,
};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::InterruptKind;
