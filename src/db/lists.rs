//! Lists (kanban columns) within a board
//!
//! Position changes run in `BEGIN IMMEDIATE` transactions; the caller holds
//! the board's container lock (see `services::list_service`).

use diesel::prelude::*;
use serde::Deserialize;
use tracing::debug;

use super::diesel_schema::lists;
use super::governance::{accessible_board_ids, require};
use super::models::{current_timestamp, new_id, BoardList, NewBoardList};
use super::principal::Principal;
use crate::access::{Intent, Target};
use crate::error::StorageError;
use crate::ordering;

pub const DEFAULT_LIST_COLOR: &str = "blue";

// ============================================================================
// Input Types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateListInput {
    pub title: String,
    #[serde(default)]
    pub color: Option<String>,
    /// Insert position; `None` appends
    #[serde(default)]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateListInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = lists)]
struct ListChanges<'a> {
    title: Option<&'a str>,
    color: Option<&'a str>,
    updated_at: &'a str,
}

// ============================================================================
// Positions
// ============================================================================

/// `(id, position)` of a board's lists in display order
fn sibling_positions(conn: &mut SqliteConnection, board_id: &str) -> Result<Vec<(String, i32)>, StorageError> {
    lists::table
        .filter(lists::board_id.eq(board_id))
        .order((lists::position.asc(), lists::created_at.asc(), lists::id.asc()))
        .select((lists::id, lists::position))
        .load(conn)
        .map_err(|e| StorageError::Internal(format!("Sibling query failed: {}", e)))
}

fn sibling_ids(current: &[(String, i32)]) -> Vec<String> {
    current.iter().map(|(id, _)| id.clone()).collect()
}

fn write_positions(conn: &mut SqliteConnection, changes: &[(String, i32)]) -> Result<(), StorageError> {
    for (id, position) in changes {
        diesel::update(lists::table.filter(lists::id.eq(id)))
            .set(lists::position.eq(*position))
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Position update failed: {}", e)))?;
    }
    Ok(())
}

// ============================================================================
// Read Operations
// ============================================================================

fn load_list(conn: &mut SqliteConnection, list_id: &str) -> Result<BoardList, StorageError> {
    lists::table
        .filter(lists::id.eq(list_id))
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))?
        .ok_or_else(|| StorageError::not_found("list", list_id))
}

fn board_lists(conn: &mut SqliteConnection, board_id: &str) -> Result<Vec<BoardList>, StorageError> {
    lists::table
        .filter(lists::board_id.eq(board_id))
        .order((lists::position.asc(), lists::created_at.asc()))
        .load(conn)
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

/// Board that owns a list, without any access check.
/// Used to pick the container lock before the checked operation runs.
pub fn board_of(conn: &mut SqliteConnection, list_id: &str) -> Result<Option<String>, StorageError> {
    lists::table
        .filter(lists::id.eq(list_id))
        .select(lists::board_id)
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

pub fn get_list(
    conn: &mut SqliteConnection,
    principal: &Principal,
    list_id: &str,
) -> Result<BoardList, StorageError> {
    require(conn, principal, &Target::List(list_id.to_string()), Intent::Read)?;
    load_list(conn, list_id)
}

/// Lists of one board in position order
pub fn list_lists(
    conn: &mut SqliteConnection,
    principal: &Principal,
    board_id: &str,
) -> Result<Vec<BoardList>, StorageError> {
    require(conn, principal, &Target::Board(board_id.to_string()), Intent::Read)?;
    board_lists(conn, board_id)
}

/// Every list on every board the principal can read
pub fn list_accessible_lists(
    conn: &mut SqliteConnection,
    principal: &Principal,
) -> Result<Vec<BoardList>, StorageError> {
    let visible = accessible_board_ids(conn, principal)?;
    lists::table
        .filter(lists::board_id.eq_any(&visible))
        .order((lists::board_id.asc(), lists::position.asc()))
        .load(conn)
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

// ============================================================================
// Write Operations
// ============================================================================

/// Create a list at the requested position (default: end of the board)
pub fn create_list(
    conn: &mut SqliteConnection,
    principal: &Principal,
    board_id: &str,
    input: &CreateListInput,
) -> Result<BoardList, StorageError> {
    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::Board(board_id.to_string()), Intent::Write)?;

        let current = sibling_positions(conn, board_id)?;
        let id = new_id();
        let position = input.position.unwrap_or(current.len() as i64);
        let ordered = ordering::insert(&sibling_ids(&current), &id, position)?;

        let mut changes = ordering::changes(&current, &ordered);
        let own = changes
            .iter()
            .position(|(changed, _)| changed == &id)
            .map(|i| changes.remove(i).1)
            .ok_or_else(|| StorageError::Internal("Inserted list missing from plan".into()))?;
        write_positions(conn, &changes)?;

        let now = current_timestamp();
        diesel::insert_into(lists::table)
            .values(&NewBoardList {
                id: &id,
                board_id,
                title: &input.title,
                color: input.color.as_deref().unwrap_or(DEFAULT_LIST_COLOR),
                position: own,
                created_at: &now,
                updated_at: &now,
            })
            .execute(conn)
            .map_err(StorageError::query("List insert"))?;

        debug!(list_id = %id, board_id, position = own, "List created");
        load_list(conn, &id)
    })
}

pub fn update_list(
    conn: &mut SqliteConnection,
    principal: &Principal,
    list_id: &str,
    input: &UpdateListInput,
) -> Result<BoardList, StorageError> {
    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::List(list_id.to_string()), Intent::Write)?;

        let now = current_timestamp();
        diesel::update(lists::table.filter(lists::id.eq(list_id)))
            .set(&ListChanges {
                title: input.title.as_deref(),
                color: input.color.as_deref(),
                updated_at: &now,
            })
            .execute(conn)
            .map_err(StorageError::query("List update"))?;

        load_list(conn, list_id)
    })
}

/// Delete a list with its cards, then close the gap among the remaining lists
pub fn delete_list(
    conn: &mut SqliteConnection,
    principal: &Principal,
    list_id: &str,
) -> Result<(), StorageError> {
    conn.immediate_transaction(|conn| {
        let access = require(conn, principal, &Target::List(list_id.to_string()), Intent::Write)?;

        diesel::delete(lists::table.filter(lists::id.eq(list_id)))
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Delete failed: {}", e)))?;

        let remaining = sibling_positions(conn, &access.board_id)?;
        let changes = ordering::changes(&remaining, &sibling_ids(&remaining));
        write_positions(conn, &changes)
    })
}

/// Move a list to `new_position` within its board.
/// Returns the board's lists in their new order.
pub fn reorder_list(
    conn: &mut SqliteConnection,
    principal: &Principal,
    list_id: &str,
    new_position: i64,
) -> Result<Vec<BoardList>, StorageError> {
    conn.immediate_transaction(|conn| {
        let access = require(conn, principal, &Target::List(list_id.to_string()), Intent::Write)?;

        let current = sibling_positions(conn, &access.board_id)?;
        let ordered = ordering::reorder(&sibling_ids(&current), list_id, new_position)?;
        let changes = ordering::changes(&current, &ordered);
        write_positions(conn, &changes)?;

        debug!(list_id, new_position, written = changes.len(), "List reordered");
        board_lists(conn, &access.board_id)
    })
}
