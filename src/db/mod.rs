//! SQLite database module for boards, lists, cards and budgets
//!
//! ## Architecture
//!
//! - Every table is reached through a repository module below
//! - Every board-scoped read or write is checked against the governing
//!   board's owner and members (see `crate::access`)
//! - Position changes run in `BEGIN IMMEDIATE` transactions so writers on
//!   the same database serialize
//!
//! ## Tables
//!
//! - `users` - Identities referenced by ownership and membership
//! - `boards`, `board_members` - Trip boards and who can see them
//! - `lists`, `cards`, `card_assignees` - Ordered kanban content
//! - `map_locations` - At most one geo location per card
//! - `budget_categories`, `budgets`, `budget_items`, `expenses` - Money

pub mod schema;
pub mod diesel_schema;
pub mod models;
pub mod principal;
pub mod governance;
pub mod users;
pub mod boards;
pub mod lists;
pub mod cards;
pub mod map_locations;
pub mod budgets;
pub mod expenses;

use std::path::Path;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::StorageError;

pub use principal::Principal;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection SQLite settings applied when the pool hands out a connection
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout_ms: u32,
    wal: bool,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let mut pragmas = format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            self.busy_timeout_ms
        );
        if self.wal {
            pragmas.push_str(" PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
        }
        conn.batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled SQLite database
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open or create the database described by `config`
    pub fn open(config: &Config) -> Result<Self, StorageError> {
        Self::open_path(&config.database_path(), config.pool_size, config.busy_timeout_ms)
    }

    /// Open or create a database file
    pub fn open_path(path: &Path, pool_size: u32, busy_timeout_ms: u32) -> Result<Self, StorageError> {
        info!("Opening SQLite database at {:?}", path);

        let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_customizer(Box::new(ConnectionOptions {
                busy_timeout_ms,
                wal: true,
            }))
            .build(manager)
            .map_err(|e| StorageError::Pool(format!("Failed to open SQLite pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    ///
    /// Every SQLite `:memory:` connection is its own database, so the pool
    /// holds exactly one connection that is never recycled.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        debug!("Opening in-memory SQLite database");

        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_customizer(Box::new(ConnectionOptions {
                busy_timeout_ms: 0,
                wal: false,
            }))
            .build(manager)
            .map_err(|e| StorageError::Pool(format!("Failed to open in-memory SQLite: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        schema::init_schema(&mut conn)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<PooledConn, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Pool(format!("Failed to get connection: {}", e)))
    }

    /// Run `f` on a pooled connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError>,
    {
        let mut conn = self.conn()?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, StorageError> {
        use diesel_schema::{boards, budget_items, budgets, cards, expenses, lists, map_locations, users};

        self.with_conn(|conn| {
            let count = |r: QueryResult<i64>| {
                r.map(|n| n as u64)
                    .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
            };

            Ok(DbStats {
                user_count: count(users::table.count().get_result(conn))?,
                board_count: count(boards::table.count().get_result(conn))?,
                list_count: count(lists::table.count().get_result(conn))?,
                card_count: count(cards::table.count().get_result(conn))?,
                map_location_count: count(map_locations::table.count().get_result(conn))?,
                budget_count: count(budgets::table.count().get_result(conn))?,
                budget_item_count: count(budget_items::table.count().get_result(conn))?,
                expense_count: count(expenses::table.count().get_result(conn))?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DbStats {
    pub user_count: u64,
    pub board_count: u64,
    pub list_count: u64,
    pub card_count: u64,
    pub map_location_count: u64,
    pub budget_count: u64,
    pub budget_item_count: u64,
    pub expense_count: u64,
}
