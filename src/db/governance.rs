//! Governing-board resolution and board-scoped access checks
//!
//! One explicit walk per entity variant: each returns the id of the board
//! that owns the entity, or `None` when any link of the chain is missing.

use diesel::prelude::*;

use super::diesel_schema::{
    board_members, boards, budget_items, budgets, cards, expenses, lists, map_locations,
};
use super::principal::Principal;
use crate::access::{enforce, BoardAccess, Intent, Target};
use crate::error::StorageError;

fn lookup(context: &'static str) -> impl Fn(diesel::result::Error) -> StorageError {
    move |e| StorageError::Internal(format!("{} lookup failed: {}", context, e))
}

/// Resolve the board that governs `target`
pub fn governing_board_id(
    conn: &mut SqliteConnection,
    target: &Target,
) -> Result<Option<String>, StorageError> {
    match target {
        Target::Board(id) => boards::table
            .filter(boards::id.eq(id))
            .select(boards::id)
            .first(conn)
            .optional()
            .map_err(lookup("board")),

        Target::List(id) => lists::table
            .filter(lists::id.eq(id))
            .select(lists::board_id)
            .first(conn)
            .optional()
            .map_err(lookup("list")),

        Target::Card(id) => cards::table
            .inner_join(lists::table)
            .filter(cards::id.eq(id))
            .select(lists::board_id)
            .first(conn)
            .optional()
            .map_err(lookup("card")),

        Target::Budget(id) => budgets::table
            .filter(budgets::id.eq(id))
            .select(budgets::board_id)
            .first(conn)
            .optional()
            .map_err(lookup("budget")),

        Target::BudgetItem(id) => budget_items::table
            .inner_join(budgets::table)
            .filter(budget_items::id.eq(id))
            .select(budgets::board_id)
            .first(conn)
            .optional()
            .map_err(lookup("budget item")),

        Target::MapLocation(id) => map_locations::table
            .inner_join(cards::table.inner_join(lists::table))
            .filter(map_locations::id.eq(id))
            .select(lists::board_id)
            .first(conn)
            .optional()
            .map_err(lookup("map location")),

        Target::Expense(id) => expenses::table
            .filter(expenses::id.eq(id))
            .select(expenses::board_id)
            .first(conn)
            .optional()
            .map_err(lookup("expense")),
    }
}

/// Load owner and members of a board
pub fn board_access(
    conn: &mut SqliteConnection,
    board_id: &str,
) -> Result<Option<BoardAccess>, StorageError> {
    let owner_id: Option<String> = boards::table
        .filter(boards::id.eq(board_id))
        .select(boards::owner_id)
        .first(conn)
        .optional()
        .map_err(lookup("board owner"))?;

    let owner_id = match owner_id {
        Some(o) => o,
        None => return Ok(None),
    };

    let members: Vec<String> = board_members::table
        .filter(board_members::board_id.eq(board_id))
        .order(board_members::added_at.asc())
        .select(board_members::user_id)
        .load(conn)
        .map_err(lookup("board members"))?;

    Ok(Some(BoardAccess {
        board_id: board_id.to_string(),
        owner_id,
        members,
    }))
}

/// Resolve the governing board of `target` and load its access facts
pub fn resolve(
    conn: &mut SqliteConnection,
    target: &Target,
) -> Result<Option<BoardAccess>, StorageError> {
    match governing_board_id(conn, target)? {
        Some(board_id) => board_access(conn, &board_id),
        None => Ok(None),
    }
}

/// Resolve and enforce in one step.
///
/// Missing entity and unreadable entity both surface as `NotFound`.
pub fn require(
    conn: &mut SqliteConnection,
    principal: &Principal,
    target: &Target,
    intent: Intent,
) -> Result<BoardAccess, StorageError> {
    let access = resolve(conn, target)?
        .ok_or_else(|| StorageError::NotFound(target.to_string()))?;
    enforce(principal, &access, intent, target)?;
    Ok(access)
}

/// Ids of every board the principal may read (owned or member)
pub fn accessible_board_ids(
    conn: &mut SqliteConnection,
    principal: &Principal,
) -> Result<Vec<String>, StorageError> {
    let member_of = board_members::table
        .filter(board_members::user_id.eq(principal.user_id()))
        .select(board_members::board_id);

    boards::table
        .filter(
            boards::owner_id
                .eq(principal.user_id())
                .or(boards::id.eq_any(member_of)),
        )
        .select(boards::id)
        .load(conn)
        .map_err(lookup("accessible boards"))
}
