// Event Bus Implementation - Pub/Sub for Investigation Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Enables real-time progress streaming to the CLI and future SSE observers.
//
// In-memory only: events are lost on restart, which is fine for
// single-investigation lifetimes.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::InvestigationEvent;
use crate::domain::investigation::InvestigationId;

/// Event bus for publishing and subscribing to investigation events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<InvestigationEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity.
    /// Capacity determines how many events can buffer before old ones drop.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: InvestigationEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all investigation events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for a specific investigation id
    pub fn subscribe_investigation(&self, investigation_id: InvestigationId) -> InvestigationEventReceiver {
        InvestigationEventReceiver {
            receiver: self.sender.subscribe(),
            investigation_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for all investigation events
pub struct EventReceiver {
    receiver: broadcast::Receiver<InvestigationEvent>,
}

impl EventReceiver {
    /// Receive the next event (blocks until one is available)
    pub async fn recv(&mut self) -> Result<InvestigationEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<InvestigationEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one investigation
pub struct InvestigationEventReceiver {
    receiver: broadcast::Receiver<InvestigationEvent>,
    investigation_id: InvestigationId,
}

impl InvestigationEventReceiver {
    pub async fn recv(&mut self) -> Result<InvestigationEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;

            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    fn matches(&self, event: &InvestigationEvent) -> bool {
        let id = match event {
            InvestigationEvent::InvestigationStarted { investigation_id, .. } => investigation_id,
            InvestigationEvent::TriageCompleted { investigation_id, .. } => investigation_id,
            InvestigationEvent::RoundStarted { investigation_id, .. } => investigation_id,
            InvestigationEvent::SpecialistStarted { investigation_id, .. } => investigation_id,
            InvestigationEvent::SpecialistCompleted { investigation_id, .. } => investigation_id,
            InvestigationEvent::EdgeRejected { investigation_id, .. } => investigation_id,
            InvestigationEvent::BudgetStop { investigation_id, .. } => investigation_id,
            InvestigationEvent::InvestigationCompleted { investigation_id, .. } => investigation_id,
            InvestigationEvent::InvestigationFailed { investigation_id, .. } => investigation_id,
        };
        id == &self.investigation_id
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
