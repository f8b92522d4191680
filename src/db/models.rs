//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//! - `*Details` structs: API shapes with JSON columns decoded and
//!   derived values attached
//!
//! TypeScript types are generated via ts-rs. Run:
//!   cargo test export_bindings
//! Generated files go to: bindings/

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::diesel_schema::*;
use crate::error::StorageError;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Get current UTC timestamp as ISO 8601 string for SQLite TEXT columns.
/// Millisecond precision keeps the card tie-break on creation time stable.
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// New random entity id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// User Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub created_at: &'a str,
}

// ============================================================================
// Board Models
// ============================================================================

/// Board lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum BoardStatus {
    #[default]
    Planning,
    Active,
    Completed,
}

impl BoardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardStatus::Planning => "planning",
            BoardStatus::Active => "active",
            BoardStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for BoardStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planning" => Ok(BoardStatus::Planning),
            "active" => Ok(BoardStatus::Active),
            "completed" => Ok(BoardStatus::Completed),
            other => Err(StorageError::InvalidInput(format!("unknown board status '{}'", other))),
        }
    }
}

impl std::fmt::Display for BoardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Board row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = boards)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct Board {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub status: String,
    pub budget: String,
    pub currency: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_favorite: i32,
    #[serde(skip)]
    pub tags_json: String,
    pub cover_image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Board with decoded tags and its member ids (API response)
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BoardWithMembers {
    #[serde(flatten)]
    pub board: Board,
    pub tags: Vec<String>,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = boards)]
pub struct NewBoard<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub owner_id: &'a str,
    pub status: &'a str,
    pub budget: &'a str,
    pub currency: &'a str,
    pub start_date: Option<&'a str>,
    pub end_date: Option<&'a str>,
    pub is_favorite: i32,
    pub tags_json: &'a str,
    pub cover_image: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = board_members)]
pub struct NewBoardMember<'a> {
    pub board_id: &'a str,
    pub user_id: &'a str,
    pub added_at: &'a str,
}

// ============================================================================
// List Models
// ============================================================================

/// Kanban list (column) row
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = lists)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct BoardList {
    pub id: String,
    pub board_id: String,
    pub title: String,
    pub color: String,
    pub position: i32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = lists)]
pub struct NewBoardList<'a> {
    pub id: &'a str,
    pub board_id: &'a str,
    pub title: &'a str,
    pub color: &'a str,
    pub position: i32,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Card Models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Subtask {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Attachment {
    pub name: String,
    #[serde(default)]
    pub size: String,
}

/// Lightweight pin stored inline on a card (distinct from MapLocation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CardPin {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

/// Card row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = cards)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct Card {
    pub id: String,
    pub list_id: String,
    pub title: String,
    pub description: Option<String>,
    pub budget: String,
    pub people_number: i32,
    #[serde(skip)]
    pub tags_json: String,
    pub due_date: Option<String>,
    #[serde(skip)]
    pub subtasks_json: String,
    #[serde(skip)]
    pub attachments_json: String,
    #[serde(skip)]
    pub location_json: Option<String>,
    pub position: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// Card with JSON columns decoded and assignees attached (API response)
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CardDetails {
    #[serde(flatten)]
    pub card: Card,
    pub tags: Vec<String>,
    pub subtasks: Vec<Subtask>,
    pub attachments: Vec<Attachment>,
    pub location: Option<CardPin>,
    pub assigned_members: Vec<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = cards)]
pub struct NewCard<'a> {
    pub id: &'a str,
    pub list_id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub budget: &'a str,
    pub people_number: i32,
    pub tags_json: &'a str,
    pub due_date: Option<&'a str>,
    pub subtasks_json: &'a str,
    pub attachments_json: &'a str,
    pub location_json: Option<&'a str>,
    pub position: i32,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = card_assignees)]
pub struct NewCardAssignee<'a> {
    pub card_id: &'a str,
    pub user_id: &'a str,
}

// ============================================================================
// Map Location Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = map_locations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct MapLocation {
    pub id: String,
    pub card_id: String,
    pub name: String,
    pub description: Option<String>,
    pub latitude: String,
    pub longitude: String,
    pub address: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = map_locations)]
pub struct NewMapLocation<'a> {
    pub id: &'a str,
    pub card_id: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub latitude: &'a str,
    pub longitude: &'a str,
    pub address: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Budget Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = budget_categories)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct BudgetCategory {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = budget_categories)]
pub struct NewBudgetCategory<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub owner_id: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = budgets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct Budget {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub board_id: String,
    pub total_allocated: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Budget with its items (API response)
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BudgetWithItems {
    #[serde(flatten)]
    pub budget: Budget,
    pub items: Vec<BudgetItemDetails>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = budgets)]
pub struct NewBudget<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub board_id: &'a str,
    pub total_allocated: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = budget_items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct BudgetItem {
    pub id: String,
    pub budget_id: String,
    pub category_id: Option<String>,
    pub description: String,
    pub allocated_amount: String,
    pub spent_amount: String,
    pub currency: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Budget item with the derived remaining amount (API response)
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BudgetItemDetails {
    #[serde(flatten)]
    pub item: BudgetItem,
    pub remaining_amount: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = budget_items)]
pub struct NewBudgetItem<'a> {
    pub id: &'a str,
    pub budget_id: &'a str,
    pub category_id: Option<&'a str>,
    pub description: &'a str,
    pub allocated_amount: &'a str,
    pub spent_amount: &'a str,
    pub currency: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Expense Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = expenses)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct Expense {
    pub id: String,
    pub board_id: String,
    pub title: String,
    pub amount: String,
    pub category: String,
    pub date: Option<String>,
    pub notes: Option<String>,
    pub currency: String,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = expenses)]
pub struct NewExpense<'a> {
    pub id: &'a str,
    pub board_id: &'a str,
    pub title: &'a str,
    pub amount: &'a str,
    pub category: &'a str,
    pub date: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub currency: &'a str,
    pub created_by: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}
