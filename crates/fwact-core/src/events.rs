//! Event system for completion reporting.
//!
//! Every operation on the extension reports its completion through a single
//! registered sink. The sink is replaced on each registration; there is no
//! multiplexing and no unregister.

use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, RwLock};

/// Completion events published by the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateEvent {
    /// Active firmware details have been finalized (success or failure).
    ActiveDetailsReady,
    /// Installer details have been finalized.
    InstallerDetailsReady,
    /// Activation script completed with exit status zero.
    ActivationDone,
    /// Activation could not be run or reported a failure.
    ActivationFailed,
}

impl UpdateEvent {
    /// Stable numeric code, for callback ABIs that carry integers.
    pub fn code(self) -> u32 {
        match self {
            UpdateEvent::ActiveDetailsReady => 1,
            UpdateEvent::InstallerDetailsReady => 2,
            UpdateEvent::ActivationDone => 3,
            UpdateEvent::ActivationFailed => 4,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(UpdateEvent::ActiveDetailsReady),
            2 => Some(UpdateEvent::InstallerDetailsReady),
            3 => Some(UpdateEvent::ActivationDone),
            4 => Some(UpdateEvent::ActivationFailed),
            _ => None,
        }
    }

    /// Whether this event terminates an activation request.
    pub fn is_activation_terminal(self) -> bool {
        matches!(
            self,
            UpdateEvent::ActivationDone | UpdateEvent::ActivationFailed
        )
    }
}

impl fmt::Display for UpdateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateEvent::ActiveDetailsReady => write!(f, "Active Details Ready"),
            UpdateEvent::InstallerDetailsReady => write!(f, "Installer Details Ready"),
            UpdateEvent::ActivationDone => write!(f, "Activation Done"),
            UpdateEvent::ActivationFailed => write!(f, "Activation Failed"),
        }
    }
}

/// Sink receiving completion events.
///
/// Sinks are invoked from the caller thread for synchronous operations and
/// from the activation worker for activation results, so they must be
/// `Send + Sync`.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: UpdateEvent);
}

impl<F> EventSink for F
where
    F: Fn(UpdateEvent) + Send + Sync,
{
    fn on_event(&self, event: UpdateEvent) {
        self(event)
    }
}

/// No-op sink that discards all events.
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&self, _event: UpdateEvent) {}
}

/// Sink that logs events using tracing.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_event(&self, event: UpdateEvent) {
        match event {
            UpdateEvent::ActivationFailed => {
                tracing::warn!(event = %event, code = event.code(), "Event");
            }
            _ => {
                tracing::info!(event = %event, code = event.code(), "Event");
            }
        }
    }
}

/// Sink forwarding events into a channel.
///
/// A disconnected receiver is ignored.
pub struct ChannelSink {
    tx: Mutex<Sender<UpdateEvent>>,
}

impl ChannelSink {
    pub fn new(tx: Sender<UpdateEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl EventSink for ChannelSink {
    fn on_event(&self, event: UpdateEvent) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(event);
        }
    }
}

/// Holds the single registered sink.
#[derive(Default)]
pub struct EventNotifier {
    sink: RwLock<Option<Arc<dyn EventSink>>>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink`, replacing any previous registration.
    pub fn register(&self, sink: Arc<dyn EventSink>) {
        match self.sink.write() {
            Ok(mut slot) => *slot = Some(sink),
            Err(poisoned) => *poisoned.into_inner() = Some(sink),
        }
    }

    pub fn is_registered(&self) -> bool {
        match self.sink.read() {
            Ok(slot) => slot.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    /// Deliver `event` to the current sink on the calling thread.
    pub fn publish(&self, event: UpdateEvent) {
        // Clone out of the lock so a sink may re-register without deadlock.
        let sink = match self.sink.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match sink {
            Some(sink) => sink.on_event(event),
            None => tracing::trace!(event = %event, "No sink registered, event dropped"),
        }
    }
}

impl fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNotifier")
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// Sink that records events in order. Used by tests.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<UpdateEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UpdateEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, event: UpdateEvent) -> usize {
        self.events().into_iter().filter(|e| *e == event).count()
    }
}

impl EventSink for RecordingSink {
    fn on_event(&self, event: UpdateEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
