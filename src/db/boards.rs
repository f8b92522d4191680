//! Board CRUD and membership, scoped by principal
//!
//! The owner is a member of the board at all times: create inserts the
//! membership in the same transaction as the board, and update re-asserts
//! it before committing.

use chrono::NaiveDate;
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use super::diesel_schema::{board_members, boards, budget_items, budgets, card_assignees, cards, expenses, lists};
use super::governance::{accessible_board_ids, require};
use super::models::{
    current_timestamp, new_id, Board, BoardStatus, BoardWithMembers, NewBoard, NewBoardMember,
};
use super::principal::Principal;
use super::users;
use crate::access::{Intent, Target};
use crate::budget::{money, normalize_currency};
use crate::error::StorageError;

// ============================================================================
// Input Types
// ============================================================================

/// Input for creating a board. The owner is always the calling principal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBoardInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: BoardStatus,
    #[serde(default)]
    pub budget: Decimal,
    /// Validated 3-letter code; `None` takes the configured default
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    /// Additional members besides the owner
    #[serde(default)]
    pub members: Vec<String>,
}

/// Partial board update. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct UpdateBoardInput {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<BoardStatus>,
    pub budget: Option<Decimal>,
    pub currency: Option<String>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
    pub is_favorite: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub cover_image: Option<Option<String>>,
}

/// Filters for listing accessible boards
#[derive(Debug, Clone, Deserialize)]
pub struct BoardQuery {
    #[serde(default)]
    pub status: Option<BoardStatus>,
    #[serde(default)]
    pub favorites_only: bool,
    /// Only boards the principal owns (excludes boards shared with them)
    #[serde(default)]
    pub owned_only: bool,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

impl Default for BoardQuery {
    fn default() -> Self {
        Self {
            status: None,
            favorites_only: false,
            owned_only: false,
            limit: default_limit(),
            offset: 0,
        }
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = boards)]
struct BoardChanges<'a> {
    title: Option<&'a str>,
    description: Option<Option<&'a str>>,
    status: Option<&'a str>,
    budget: Option<String>,
    currency: Option<&'a str>,
    start_date: Option<Option<String>>,
    end_date: Option<Option<String>>,
    is_favorite: Option<i32>,
    tags_json: Option<String>,
    cover_image: Option<Option<&'a str>>,
    updated_at: &'a str,
}

fn render_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ============================================================================
// Read Operations
// ============================================================================

fn load_board(conn: &mut SqliteConnection, board_id: &str) -> Result<Option<Board>, StorageError> {
    boards::table
        .filter(boards::id.eq(board_id))
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

fn with_members(conn: &mut SqliteConnection, board: Board) -> Result<BoardWithMembers, StorageError> {
    let members: Vec<String> = board_members::table
        .filter(board_members::board_id.eq(&board.id))
        .order(board_members::added_at.asc())
        .select(board_members::user_id)
        .load(conn)
        .map_err(|e| StorageError::Internal(format!("Members query failed: {}", e)))?;

    let tags: Vec<String> = serde_json::from_str(&board.tags_json)?;

    Ok(BoardWithMembers { board, tags, members })
}

/// Get a board the principal can read
pub fn get_board(
    conn: &mut SqliteConnection,
    principal: &Principal,
    board_id: &str,
) -> Result<BoardWithMembers, StorageError> {
    require(conn, principal, &Target::Board(board_id.to_string()), Intent::Read)?;

    let board = load_board(conn, board_id)?
        .ok_or_else(|| StorageError::not_found("board", board_id))?;
    with_members(conn, board)
}

/// List boards owned by or shared with the principal, newest first
pub fn list_boards(
    conn: &mut SqliteConnection,
    principal: &Principal,
    query: &BoardQuery,
) -> Result<Vec<BoardWithMembers>, StorageError> {
    let visible = accessible_board_ids(conn, principal)?;

    let mut q = boards::table
        .filter(boards::id.eq_any(&visible))
        .into_boxed();

    if let Some(status) = query.status {
        q = q.filter(boards::status.eq(status.as_str()));
    }
    if query.favorites_only {
        q = q.filter(boards::is_favorite.eq(1));
    }
    if query.owned_only {
        q = q.filter(boards::owner_id.eq(principal.user_id()));
    }

    let rows: Vec<Board> = q
        .order((boards::created_at.desc(), boards::id.asc()))
        .limit(query.limit)
        .offset(query.offset)
        .load(conn)
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))?;

    rows.into_iter().map(|b| with_members(conn, b)).collect()
}

// ============================================================================
// Write Operations
// ============================================================================

/// Create a board owned by the principal, with the owner membership
/// inserted in the same transaction
pub fn create_board(
    conn: &mut SqliteConnection,
    principal: &Principal,
    input: &CreateBoardInput,
    currency: &str,
) -> Result<BoardWithMembers, StorageError> {
    conn.immediate_transaction(|conn| {
        if !users::user_exists(conn, principal.user_id())? {
            return Err(StorageError::Auth(format!("unknown user {}", principal.user_id())));
        }
        for member in &input.members {
            if !users::user_exists(conn, member)? {
                return Err(StorageError::not_found("user", member));
            }
        }

        let id = new_id();
        let now = current_timestamp();
        let tags_json = serde_json::to_string(&input.tags)?;
        let budget = money("budget", input.budget, true)?;
        let start_date = input.start_date.map(render_date);
        let end_date = input.end_date.map(render_date);

        let new_board = NewBoard {
            id: &id,
            title: &input.title,
            description: input.description.as_deref(),
            owner_id: principal.user_id(),
            status: input.status.as_str(),
            budget: &budget,
            currency,
            start_date: start_date.as_deref(),
            end_date: end_date.as_deref(),
            is_favorite: input.is_favorite as i32,
            tags_json: &tags_json,
            cover_image: input.cover_image.as_deref(),
            created_at: &now,
            updated_at: &now,
        };

        diesel::insert_into(boards::table)
            .values(&new_board)
            .execute(conn)
            .map_err(StorageError::query("Board insert"))?;

        ensure_member(conn, &id, principal.user_id(), &now)?;
        for member in &input.members {
            ensure_member(conn, &id, member, &now)?;
        }

        debug!(board_id = %id, owner = %principal.user_id(), "Board created");

        let board = load_board(conn, &id)?
            .ok_or_else(|| StorageError::Internal("Failed to retrieve created board".into()))?;
        with_members(conn, board)
    })
}

fn ensure_member(
    conn: &mut SqliteConnection,
    board_id: &str,
    user_id: &str,
    now: &str,
) -> Result<bool, StorageError> {
    let inserted = diesel::insert_or_ignore_into(board_members::table)
        .values(&NewBoardMember {
            board_id,
            user_id,
            added_at: now,
        })
        .execute(conn)
        .map_err(|e| StorageError::Internal(format!("Member insert failed: {}", e)))?;
    Ok(inserted > 0)
}

/// Reject a currency switch while money in another currency is recorded
fn check_currency_switch(
    conn: &mut SqliteConnection,
    board_id: &str,
    new_currency: &str,
) -> Result<(), StorageError> {
    let foreign_expenses: i64 = expenses::table
        .filter(expenses::board_id.eq(board_id))
        .filter(expenses::currency.ne(new_currency))
        .count()
        .get_result(conn)
        .map_err(|e| StorageError::Internal(format!("Count query failed: {}", e)))?;

    let foreign_items: i64 = budget_items::table
        .inner_join(budgets::table)
        .filter(budgets::board_id.eq(board_id))
        .filter(budget_items::currency.ne(new_currency))
        .count()
        .get_result(conn)
        .map_err(|e| StorageError::Internal(format!("Count query failed: {}", e)))?;

    if foreign_expenses + foreign_items > 0 {
        return Err(StorageError::InvalidInput(format!(
            "cannot switch board currency to {} while {} expenses or budget items use another currency",
            new_currency,
            foreign_expenses + foreign_items
        )));
    }
    Ok(())
}

/// Update a board (owner only)
pub fn update_board(
    conn: &mut SqliteConnection,
    principal: &Principal,
    board_id: &str,
    input: &UpdateBoardInput,
) -> Result<BoardWithMembers, StorageError> {
    conn.immediate_transaction(|conn| {
        let access = require(conn, principal, &Target::Board(board_id.to_string()), Intent::Write)?;
        let current = load_board(conn, board_id)?
            .ok_or_else(|| StorageError::not_found("board", board_id))?;

        let currency = input.currency.as_deref().map(normalize_currency).transpose()?;
        if let Some(currency) = currency.as_deref() {
            if currency != current.currency {
                check_currency_switch(conn, board_id, currency)?;
            }
        }

        let start = match input.start_date {
            Some(d) => d,
            None => parse_stored_date(current.start_date.as_deref())?,
        };
        let end = match input.end_date {
            Some(d) => d,
            None => parse_stored_date(current.end_date.as_deref())?,
        };
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(StorageError::InvalidInput("end_date must not be before start_date".into()));
            }
        }

        let now = current_timestamp();
        let changes = BoardChanges {
            title: input.title.as_deref(),
            description: input.description.as_ref().map(|d| d.as_deref()),
            status: input.status.map(|s| s.as_str()),
            budget: input.budget.map(|b| money("budget", b, true)).transpose()?,
            currency: currency.as_deref(),
            start_date: input.start_date.map(|d| d.map(render_date)),
            end_date: input.end_date.map(|d| d.map(render_date)),
            is_favorite: input.is_favorite.map(|f| f as i32),
            tags_json: input.tags.as_ref().map(serde_json::to_string).transpose()?,
            cover_image: input.cover_image.as_ref().map(|c| c.as_deref()),
            updated_at: &now,
        };

        diesel::update(boards::table.filter(boards::id.eq(board_id)))
            .set(&changes)
            .execute(conn)
            .map_err(StorageError::query("Board update"))?;

        ensure_member(conn, board_id, &access.owner_id, &now)?;

        let board = load_board(conn, board_id)?
            .ok_or_else(|| StorageError::Internal("Failed to retrieve updated board".into()))?;
        with_members(conn, board)
    })
}

fn parse_stored_date(raw: Option<&str>) -> Result<Option<NaiveDate>, StorageError> {
    raw.map(|d| {
        NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|e| StorageError::Internal(format!("Stored date '{}' unreadable: {}", d, e)))
    })
    .transpose()
}

/// Delete a board and everything it owns (owner only).
///
/// Lists, cards, assignments, map locations, budgets, budget items,
/// expenses and memberships go with it through `ON DELETE CASCADE`.
pub fn delete_board(
    conn: &mut SqliteConnection,
    principal: &Principal,
    board_id: &str,
) -> Result<(), StorageError> {
    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::Board(board_id.to_string()), Intent::Write)?;

        diesel::delete(boards::table.filter(boards::id.eq(board_id)))
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Delete failed: {}", e)))?;
        Ok(())
    })
}

// ============================================================================
// Membership
// ============================================================================

/// Add a member (owner only). Adding an existing member is a no-op.
///
/// The flag is true only when a membership row was inserted.
pub fn add_member(
    conn: &mut SqliteConnection,
    principal: &Principal,
    board_id: &str,
    user_id: &str,
) -> Result<(BoardWithMembers, bool), StorageError> {
    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::Board(board_id.to_string()), Intent::Write)?;

        if !users::user_exists(conn, user_id)? {
            return Err(StorageError::not_found("user", user_id));
        }

        let added = ensure_member(conn, board_id, user_id, &current_timestamp())?;

        let board = load_board(conn, board_id)?
            .ok_or_else(|| StorageError::not_found("board", board_id))?;
        Ok((with_members(conn, board)?, added))
    })
}

/// Add a member identified by email (owner only)
pub fn add_member_by_email(
    conn: &mut SqliteConnection,
    principal: &Principal,
    board_id: &str,
    email: &str,
) -> Result<(BoardWithMembers, bool), StorageError> {
    // Resolve the board first so strangers learn nothing about emails.
    require(conn, principal, &Target::Board(board_id.to_string()), Intent::Write)?;

    let user = users::get_user_by_email(conn, email)?
        .ok_or_else(|| StorageError::not_found("user with email", email))?;
    add_member(conn, principal, board_id, &user.id)
}

/// Remove a member (owner only). The owner cannot be removed.
/// The member's card assignments on this board are dropped with them.
/// The flag is false when the user was not a member.
pub fn remove_member(
    conn: &mut SqliteConnection,
    principal: &Principal,
    board_id: &str,
    user_id: &str,
) -> Result<(BoardWithMembers, bool), StorageError> {
    conn.immediate_transaction(|conn| {
        let access = require(conn, principal, &Target::Board(board_id.to_string()), Intent::Write)?;

        if access.owner_id == user_id {
            return Err(StorageError::InvalidInput("the board owner cannot be removed from members".into()));
        }

        let removed = diesel::delete(
            board_members::table
                .filter(board_members::board_id.eq(board_id))
                .filter(board_members::user_id.eq(user_id)),
        )
        .execute(conn)
        .map_err(|e| StorageError::Internal(format!("Member delete failed: {}", e)))?;

        if removed > 0 {
            let board_cards: Vec<String> = cards::table
                .inner_join(lists::table)
                .filter(lists::board_id.eq(board_id))
                .select(cards::id)
                .load(conn)
                .map_err(|e| StorageError::Internal(format!("Cards query failed: {}", e)))?;

            diesel::delete(
                card_assignees::table
                    .filter(card_assignees::user_id.eq(user_id))
                    .filter(card_assignees::card_id.eq_any(&board_cards)),
            )
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Assignment delete failed: {}", e)))?;
        }

        let board = load_board(conn, board_id)?
            .ok_or_else(|| StorageError::not_found("board", board_id))?;
        Ok((with_members(conn, board)?, removed > 0))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{board, user};
    use crate::db::Database;

    #[test]
    fn test_owner_is_member_after_create() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let ben = user(&mut conn, "ben");

        let input = CreateBoardInput {
            title: "Lisbon".into(),
            members: vec![ben.user_id().to_string()],
            tags: vec!["coast".into()],
            ..Default::default()
        };
        let created = create_board(&mut conn, &ana, &input, "EUR").unwrap();

        assert_eq!(created.board.owner_id, ana.user_id());
        assert!(created.members.contains(&ana.user_id().to_string()));
        assert!(created.members.contains(&ben.user_id().to_string()));
        assert_eq!(created.board.budget, "0.00");
        assert_eq!(created.tags, vec!["coast".to_string()]);
    }

    #[test]
    fn test_unknown_extra_member_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");

        let input = CreateBoardInput {
            title: "Lisbon".into(),
            members: vec!["ghost".into()],
            ..Default::default()
        };
        let err = create_board(&mut conn, &ana, &input, "EUR").unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(list_boards(&mut conn, &ana, &BoardQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn test_visibility_by_role() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let ben = user(&mut conn, "ben");
        let eve = user(&mut conn, "eve");
        let b = board(&mut conn, &ana, "Porto");
        add_member(&mut conn, &ana, &b, ben.user_id()).unwrap();

        assert_eq!(list_boards(&mut conn, &ben, &BoardQuery::default()).unwrap().len(), 1);
        assert!(list_boards(&mut conn, &eve, &BoardQuery::default()).unwrap().is_empty());

        assert!(get_board(&mut conn, &ben, &b).is_ok());
        assert!(matches!(get_board(&mut conn, &eve, &b), Err(StorageError::NotFound(_))));

        let rename = UpdateBoardInput {
            title: Some("Porto 2".into()),
            ..Default::default()
        };
        assert!(matches!(update_board(&mut conn, &ben, &b, &rename), Err(StorageError::Forbidden(_))));
        assert!(matches!(update_board(&mut conn, &eve, &b, &rename), Err(StorageError::NotFound(_))));
        assert_eq!(update_board(&mut conn, &ana, &b, &rename).unwrap().board.title, "Porto 2");
    }

    #[test]
    fn test_update_reasserts_owner_membership() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let b = board(&mut conn, &ana, "Porto");

        diesel::delete(board_members::table.filter(board_members::board_id.eq(&b)))
            .execute(&mut conn)
            .unwrap();

        let updated = update_board(
            &mut conn,
            &ana,
            &b,
            &UpdateBoardInput {
                is_favorite: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.members, vec![ana.user_id().to_string()]);
        assert_eq!(updated.board.is_favorite, 1);
    }

    #[test]
    fn test_update_rejects_inverted_dates() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let b = board(&mut conn, &ana, "Porto");

        let start = NaiveDate::from_ymd_opt(2026, 5, 10);
        let set_start = UpdateBoardInput {
            start_date: Some(start),
            ..Default::default()
        };
        update_board(&mut conn, &ana, &b, &set_start).unwrap();

        let bad_end = UpdateBoardInput {
            end_date: Some(NaiveDate::from_ymd_opt(2026, 5, 1)),
            ..Default::default()
        };
        assert!(matches!(update_board(&mut conn, &ana, &b, &bad_end), Err(StorageError::InvalidInput(_))));
    }

    #[test]
    fn test_membership_rules() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let ben = user(&mut conn, "ben");
        let b = board(&mut conn, &ana, "Porto");

        let (_, added) = add_member(&mut conn, &ana, &b, ben.user_id()).unwrap();
        assert!(added);
        let (again, added) = add_member(&mut conn, &ana, &b, ben.user_id()).unwrap();
        assert_eq!(again.members.len(), 2);
        assert!(!added);

        assert!(matches!(add_member(&mut conn, &ana, &b, "ghost"), Err(StorageError::NotFound(_))));
        assert!(matches!(
            remove_member(&mut conn, &ana, &b, ana.user_id()),
            Err(StorageError::InvalidInput(_))
        ));
        assert!(matches!(
            remove_member(&mut conn, &ben, &b, ben.user_id()),
            Err(StorageError::Forbidden(_))
        ));

        let (after, removed) = remove_member(&mut conn, &ana, &b, ben.user_id()).unwrap();
        assert_eq!(after.members, vec![ana.user_id().to_string()]);
        assert!(removed);

        let (_, removed) = remove_member(&mut conn, &ana, &b, ben.user_id()).unwrap();
        assert!(!removed);
    }

    #[test]
    fn test_invite_by_email() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let ben = user(&mut conn, "ben");
        let b = board(&mut conn, &ana, "Porto");

        let (updated, _) = add_member_by_email(&mut conn, &ana, &b, "BEN@example.com").unwrap();
        assert!(updated.members.contains(&ben.user_id().to_string()));

        assert!(matches!(
            add_member_by_email(&mut conn, &ana, &b, "nobody@example.com"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_favorites_filter_and_order() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let first = board(&mut conn, &ana, "First");
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = board(&mut conn, &ana, "Second");

        let all = list_boards(&mut conn, &ana, &BoardQuery::default()).unwrap();
        let ids: Vec<_> = all.iter().map(|b| b.board.id.clone()).collect();
        assert_eq!(ids, vec![second.clone(), first.clone()]);

        update_board(
            &mut conn,
            &ana,
            &first,
            &UpdateBoardInput {
                is_favorite: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        let favorites = list_boards(
            &mut conn,
            &ana,
            &BoardQuery {
                favorites_only: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].board.id, first);
    }
}
