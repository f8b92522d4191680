//! Event system for board operations
//!
//! Provides an event bus for notifying listeners about committed changes.
//! Useful for:
//! - Audit logging
//! - Pushing board updates to connected clients

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Events emitted by services after a successful commit
#[derive(Debug, Clone, PartialEq)]
pub enum StorageEvent {
    // User events
    UserCreated {
        id: String,
        username: String,
    },
    UserUpdated {
        id: String,
    },
    UserDeleted {
        id: String,
    },

    // Board events
    BoardCreated {
        id: String,
        title: String,
        owner_id: String,
    },
    BoardUpdated {
        id: String,
    },
    BoardDeleted {
        id: String,
    },
    MemberAdded {
        board_id: String,
        user_id: String,
    },
    MemberRemoved {
        board_id: String,
        user_id: String,
    },

    // List events
    ListCreated {
        id: String,
        board_id: String,
        position: i32,
    },
    ListUpdated {
        id: String,
    },
    ListReordered {
        id: String,
        board_id: String,
        position: i64,
    },
    ListDeleted {
        id: String,
    },

    // Card events
    CardCreated {
        id: String,
        list_id: String,
        position: i32,
    },
    CardUpdated {
        id: String,
    },
    CardReordered {
        id: String,
        list_id: String,
        position: i64,
    },
    CardMoved {
        id: String,
        from_list_id: String,
        to_list_id: String,
        position: i64,
    },
    CardDeleted {
        id: String,
    },

    // Map events
    MapLocationCreated {
        id: String,
        card_id: String,
    },
    MapLocationUpdated {
        id: String,
    },
    MapLocationDeleted {
        id: String,
    },

    // Budget events
    BudgetChanged {
        id: String,
    },
    BudgetDeleted {
        id: String,
    },
    BudgetItemChanged {
        id: String,
        budget_id: String,
    },
    BudgetItemDeleted {
        id: String,
    },
    ExpenseRecorded {
        id: String,
        board_id: String,
        amount: String,
    },
    ExpenseUpdated {
        id: String,
    },
    ExpenseDeleted {
        id: String,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &StorageEvent);
}

/// Event bus for broadcasting storage events
pub struct EventBus {
    sender: broadcast::Sender<StorageEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: StorageEvent) {
        trace!(event = ?event, "Emitting storage event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &StorageEvent) {
        match event {
            StorageEvent::BoardCreated { id, title, owner_id } => {
                debug!(id = %id, title = %title, owner = %owner_id, "Board created");
            }
            StorageEvent::BoardDeleted { id } => {
                debug!(id = %id, "Board deleted");
            }
            StorageEvent::MemberAdded { board_id, user_id } => {
                debug!(board = %board_id, user = %user_id, "Member added");
            }
            StorageEvent::MemberRemoved { board_id, user_id } => {
                debug!(board = %board_id, user = %user_id, "Member removed");
            }
            StorageEvent::CardMoved {
                id,
                from_list_id,
                to_list_id,
                position,
            } => {
                debug!(
                    card = %id,
                    from = %from_list_id,
                    to = %to_list_id,
                    position,
                    "Card moved"
                );
            }
            _ => {
                trace!(event = ?event, "Storage event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
