//! Tripboard Store - storage core for trip-planning kanban boards
//!
//! Boards are owned by one user and shared with members. Each board holds
//! ordered lists of ordered cards, an optional geo location per card, and
//! the money side of a trip: budgets, budget items and recorded expenses.
//!
//! ## Guarantees
//!
//! | Concern | How |
//! |---------|-----|
//! | Who sees what | Every read and write resolves the governing board and checks owner/members |
//! | Dense ordering | Positions within a list or board are always `0..n-1` |
//! | Cascades | Deleting a board removes everything under it in one transaction |
//! | Money | Decimal amounts, remaining values derived on read |
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/tripboard-store/
//! ├── tripboard.db           # SQLite database (WAL)
//! └── config.toml            # Configuration
//! ```

pub mod access;
pub mod budget;
pub mod config;
pub mod db;
pub mod error;
pub mod ordering;
pub mod services;

// Re-exports
pub use config::Config;
pub use db::{Database, Principal};
pub use error::StorageError;
pub use services::{EventBus, Services, StorageEvent};
