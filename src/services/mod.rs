//! Service layer for tripboard-store
//!
//! Services encapsulate business logic between request handlers and repositories.
//! Each service wraps database operations with:
//! - Input validation
//! - Container locking for position changes
//! - Event emission after commit
//!
//! ## Architecture
//!
//! ```text
//! Request Handlers (thin)
//!     ↓
//! Service Layer (validation, locks, events)
//!     ↓
//! Repository Layer (db/*.rs, access checks + transactions)
//!     ↓
//! SQLite Database
//! ```

pub mod response;
pub mod events;
pub mod validation;
pub mod user_service;
pub mod board_service;
pub mod list_service;
pub mod card_service;
pub mod map_service;
pub mod budget_service;
pub mod expense_service;

// Re-exports
pub use response::*;
pub use events::{EventBus, EventListener, StorageEvent};
pub use user_service::UserService;
pub use board_service::BoardService;
pub use list_service::ListService;
pub use card_service::CardService;
pub use map_service::MapService;
pub use budget_service::BudgetService;
pub use expense_service::ExpenseService;

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::ordering::ContainerLocks;

/// Service container for dependency injection
///
/// Holds all services with a shared database, event bus and lock registry.
pub struct Services {
    pub users: Arc<UserService>,
    pub boards: Arc<BoardService>,
    pub lists: Arc<ListService>,
    pub cards: Arc<CardService>,
    pub maps: Arc<MapService>,
    pub budgets: Arc<BudgetService>,
    pub expenses: Arc<ExpenseService>,
    pub events: Arc<EventBus>,
    pub locks: Arc<ContainerLocks>,
}

impl Services {
    /// Create all services with shared database
    pub fn new(db: Arc<Database>, config: &Config) -> Self {
        let events = Arc::new(EventBus::new());
        let locks = Arc::new(ContainerLocks::new());

        Self {
            users: Arc::new(UserService::new(db.clone(), events.clone())),
            boards: Arc::new(BoardService::new(db.clone(), events.clone(), &config.default_currency)),
            lists: Arc::new(ListService::new(db.clone(), events.clone(), locks.clone())),
            cards: Arc::new(CardService::new(
                db.clone(),
                events.clone(),
                locks.clone(),
                config.lock_retry_attempts,
            )),
            maps: Arc::new(MapService::new(db.clone(), events.clone())),
            budgets: Arc::new(BudgetService::new(db.clone(), events.clone())),
            expenses: Arc::new(ExpenseService::new(db, events.clone())),
            events,
            locks,
        }
    }
}
