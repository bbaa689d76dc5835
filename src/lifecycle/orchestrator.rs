//! Process lifecycle orchestration.
//!
//! # Responsibilities
//! - Start the listener and subscriber activities
//! - Wait on one fan-in channel for the first terminal condition
//! - Drive a shutdown bounded by the grace window
//! - Classify the run into exactly one [`ServiceOutcome`]
//!
//! # State Machine
//! ```text
//! Starting ──run()──▶ Running ──first TerminationSignal──▶ ShuttingDown ──▶ Terminated
//! ```
//!
//! # Design Decisions
//! - Exactly one `recv` on the fan-in channel; later signals are never read
//! - One deadline covers both the listener drain and the subscriber wait
//! - A missed deadline aborts the stalled task and is reported, not escalated

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::config::schema::DEFAULT_GRACE_PERIOD_MS;
use crate::lifecycle::activity::{spawn_listener, spawn_subscriber, ListenerActivity};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::InterruptKind;
use crate::messaging::{BrokerError, MessageBroker};
use crate::net::ListenerError;
use crate::observability::logging::{EventSink, LogEvent};
use crate::observability::metrics;

/// Room for a few duplicate signals before producers start dropping them.
const FAN_IN_CAPACITY: usize = 8;

/// Upper bound on the shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraceWindow(Duration);

impl GraceWindow {
    /// A zero duration is raised to one millisecond.
    pub fn new(duration: Duration) -> Self {
        Self(duration.max(Duration::from_millis(1)))
    }

    pub fn duration(&self) -> Duration {
        self.0
    }
}

impl Default for GraceWindow {
    fn default() -> Self {
        Self(Duration::from_millis(DEFAULT_GRACE_PERIOD_MS))
    }
}

/// Orchestrator lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    ShuttingDown,
    Terminated,
}

/// The supervised activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Listener,
    Subscriber,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Listener => write!(f, "listener"),
            Activity::Subscriber => write!(f, "subscriber"),
        }
    }
}

/// A value on the fan-in channel. Only the first one is acted on.
#[derive(Debug)]
pub enum TerminationSignal {
    ListenerError(ListenerError),
    SubscriberError(BrokerError),
    ExternalInterrupt(InterruptKind),
}

/// How a run ended. Exactly one per run.
#[derive(Debug)]
pub enum ServiceOutcome {
    /// Interrupted, and shutdown finished inside the grace window.
    Clean,
    /// The listener ended on its own, or failed while draining.
    ListenerFault(ListenerError),
    /// The subscription loop failed before shutdown was requested.
    SubscriberFault(BrokerError),
    /// Shutdown did not finish inside the grace window.
    ShutdownTimeout { grace: Duration, stalled: Activity },
}

impl ServiceOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, ServiceOutcome::Clean)
    }

    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> u8 {
        if self.is_clean() {
            0
        } else {
            1
        }
    }

    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ServiceOutcome::Clean => "clean",
            ServiceOutcome::ListenerFault(_) => "listener_fault",
            ServiceOutcome::SubscriberFault(_) => "subscriber_fault",
            ServiceOutcome::ShutdownTimeout { .. } => "shutdown_timeout",
        }
    }
}

impl fmt::Display for ServiceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceOutcome::Clean => write!(f, "clean shutdown"),
            ServiceOutcome::ListenerFault(e) => write!(f, "listener failed: {}", e),
            ServiceOutcome::SubscriberFault(e) => write!(f, "subscriber failed: {}", e),
            ServiceOutcome::ShutdownTimeout { grace, stalled } => {
                write!(f, "{} did not stop within {:?}", stalled, grace)
            }
        }
    }
}

/// Posts external interrupts onto the orchestrator's fan-in channel.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: mpsc::Sender<TerminationSignal>,
}

impl InterruptHandle {
    /// Returns `false` if the interrupt was dropped because the orchestrator
    /// is gone or already has more signals queued than it will ever read.
    pub fn interrupt(&self, kind: InterruptKind) -> bool {
        self.tx.try_send(TerminationSignal::ExternalInterrupt(kind)).is_ok()
    }
}

/// Supervises the listener and subscriber for one run of the service.
pub struct Orchestrator {
    listener: Box<dyn ListenerActivity>,
    broker: Arc<dyn MessageBroker>,
    grace: GraceWindow,
    sink: Arc<dyn EventSink>,
    fan_in_tx: mpsc::Sender<TerminationSignal>,
    fan_in_rx: mpsc::Receiver<TerminationSignal>,
    phase: watch::Sender<Phase>,
}

impl Orchestrator {
    pub fn new(
        listener: Box<dyn ListenerActivity>,
        broker: Arc<dyn MessageBroker>,
        grace: GraceWindow,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (fan_in_tx, fan_in_rx) = mpsc::channel(FAN_IN_CAPACITY);
        let (phase, _) = watch::channel(Phase::Starting);
        Self {
            listener,
            broker,
            grace,
            sink,
            fan_in_tx,
            fan_in_rx,
            phase,
        }
    }

    /// Handle for the OS signal forwarder (or a test) to request shutdown.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            tx: self.fan_in_tx.clone(),
        }
    }

    /// Observe phase transitions.
    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Run until the first terminal condition and return its outcome.
    ///
    /// Without a fault or an interrupt this never returns.
    pub async fn run(self) -> ServiceOutcome {
        let Self {
            listener,
            broker,
            grace,
            sink,
            fan_in_tx,
            mut fan_in_rx,
            phase,
        } = self;

        let shutdown = Shutdown::new();
        phase.send_replace(Phase::Running);
        sink.emit(LogEvent::info("service running").field("grace_ms", grace.duration().as_millis()));

        let listener_task = spawn_listener(listener, shutdown.subscribe(), fan_in_tx.clone(), phase.subscribe());
        let subscriber_task = spawn_subscriber(Arc::clone(&broker), fan_in_tx, phase.subscribe());

        // Every sender is gone only if nothing can ever signal; keep waiting.
        let signal = match fan_in_rx.recv().await {
            Some(signal) => signal,
            None => std::future::pending().await,
        };
        let deadline = Instant::now() + grace.duration();
        phase.send_replace(Phase::ShuttingDown);

        let drain = Drain {
            shutdown: &shutdown,
            broker: broker.as_ref(),
            listener_task,
            subscriber_task,
            deadline,
            grace,
            sink: sink.as_ref(),
        };

        let outcome = match signal {
            TerminationSignal::ListenerError(error) => {
                sink.emit(LogEvent::error("listener failed").field("error", &error));
                broker.close();
                ServiceOutcome::ListenerFault(error)
            }
            TerminationSignal::ExternalInterrupt(kind) => {
                sink.emit(
                    LogEvent::info("shutdown started")
                        .field("signal", kind)
                        .field("grace_ms", grace.duration().as_millis()),
                );
                let outcome = drain.run().await;
                if outcome.is_clean() {
                    sink.emit(LogEvent::info("shutdown complete"));
                }
                outcome
            }
            TerminationSignal::SubscriberError(error) => {
                sink.emit(LogEvent::error("subscriber failed").field("error", &error));
                let drained = drain.run().await;
                if !drained.is_clean() {
                    sink.emit(LogEvent::warn("drain after subscriber failure incomplete").field("reason", &drained));
                }
                ServiceOutcome::SubscriberFault(error)
            }
        };

        phase.send_replace(Phase::Terminated);
        record(sink.as_ref(), &outcome);
        outcome
    }
}

/// The orderly part of shutdown, shared by the interrupt and subscriber paths.
struct Drain<'a> {
    shutdown: &'a Shutdown,
    broker: &'a dyn MessageBroker,
    listener_task: JoinHandle<Result<(), ListenerError>>,
    subscriber_task: JoinHandle<()>,
    deadline: Instant,
    grace: GraceWindow,
    sink: &'a dyn EventSink,
}

impl Drain<'_> {
    async fn run(self) -> ServiceOutcome {
        let Drain {
            shutdown,
            broker,
            mut listener_task,
            mut subscriber_task,
            deadline,
            grace,
            sink,
        } = self;

        broker.close();
        shutdown.trigger();

        match timeout_at(deadline, &mut listener_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(error))) => return ServiceOutcome::ListenerFault(error),
            Ok(Err(join_error)) => {
                return ServiceOutcome::ListenerFault(ListenerError::Panicked(join_error.to_string()));
            }
            Err(_) => {
                listener_task.abort();
                sink.emit(LogEvent::warn("listener did not drain in time, aborting"));
                return ServiceOutcome::ShutdownTimeout {
                    grace: grace.duration(),
                    stalled: Activity::Listener,
                };
            }
        }

        match timeout_at(deadline, &mut subscriber_task).await {
            Ok(Ok(())) => {}
            Ok(Err(join_error)) => {
                sink.emit(LogEvent::warn("subscriber task ended abnormally").field("error", join_error));
            }
            Err(_) => {
                subscriber_task.abort();
                sink.emit(LogEvent::warn("subscriber did not stop in time, aborting"));
                return ServiceOutcome::ShutdownTimeout {
                    grace: grace.duration(),
                    stalled: Activity::Subscriber,
                };
            }
        }

        ServiceOutcome::Clean
    }
}

fn record(sink: &dyn EventSink, outcome: &ServiceOutcome) {
    let event = if outcome.is_clean() {
        LogEvent::info("service stopped")
    } else {
        LogEvent::error("service stopped").field("reason", outcome)
    };
    sink.emit(event.field("outcome", outcome.label()));
    metrics::record_termination(outcome.label());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(ServiceOutcome::Clean.exit_code(), 0);
        assert_eq!(ServiceOutcome::ListenerFault(ListenerError::Stopped).exit_code(), 1);
        assert_eq!(ServiceOutcome::SubscriberFault(BrokerError::Closed).exit_code(), 1);
        assert_eq!(
            ServiceOutcome::ShutdownTimeout {
                grace: Duration::from_millis(5),
                stalled: Activity::Listener
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn timeout_outcome_names_the_stalled_activity() {
        let outcome = ServiceOutcome::ShutdownTimeout {
            grace: Duration::from_millis(250),
            stalled: Activity::Subscriber,
        };
        assert_eq!(outcome.label(), "shutdown_timeout");
        assert_eq!(outcome.to_string(), "subscriber did not stop within 250ms");
    }

    #[test]
    fn grace_window_is_never_zero() {
        assert_eq!(GraceWindow::new(Duration::ZERO).duration(), Duration::from_millis(1));
        assert_eq!(GraceWindow::default().duration(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn interrupts_beyond_capacity_are_dropped() {
        let (tx, _rx) = mpsc::channel(FAN_IN_CAPACITY);
        let handle = InterruptHandle { tx };
        for _ in 0..FAN_IN_CAPACITY {
            assert!(handle.interrupt(InterruptKind::Terminate));
        }
        assert!(!handle.interrupt(InterruptKind::Interrupt));
    }
}
