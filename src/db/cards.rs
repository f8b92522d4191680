//! Cards within lists: CRUD, reorder and cross-list moves
//!
//! Cards are ordered by `position` ascending, ties broken by newest
//! `created_at` first. Operations that change positions are handed the list
//! id the caller locked; if the card has since moved elsewhere the
//! transaction reports [`Locked::Relocated`] and changes nothing.

use chrono::NaiveDate;
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::diesel_schema::{card_assignees, cards, lists};
use super::governance::{accessible_board_ids, require};
use super::models::{
    current_timestamp, new_id, Attachment, Card, CardDetails, CardPin, NewCard, NewCardAssignee, Subtask,
};
use super::principal::Principal;
use crate::access::{BoardAccess, Intent, Target};
use crate::budget::money;
use crate::error::StorageError;
use crate::ordering::{self, Locked};

// ============================================================================
// Input Types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCardInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub budget: Decimal,
    #[serde(default)]
    pub people_number: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub location: Option<CardPin>,
    #[serde(default)]
    pub assigned_members: Vec<String>,
    /// Insert position within the list; `None` appends
    #[serde(default)]
    pub position: Option<i64>,
}

/// Partial card update. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct UpdateCardInput {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub budget: Option<Decimal>,
    pub people_number: Option<i32>,
    pub tags: Option<Vec<String>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub subtasks: Option<Vec<Subtask>>,
    pub attachments: Option<Vec<Attachment>>,
    pub location: Option<Option<CardPin>>,
    pub assigned_members: Option<Vec<String>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = cards)]
struct CardChanges<'a> {
    title: Option<&'a str>,
    description: Option<Option<&'a str>>,
    budget: Option<String>,
    people_number: Option<i32>,
    tags_json: Option<String>,
    due_date: Option<Option<String>>,
    subtasks_json: Option<String>,
    attachments_json: Option<String>,
    location_json: Option<Option<String>>,
    updated_at: &'a str,
}

/// Result of moving a card across lists
#[derive(Debug, Clone, Serialize)]
pub struct CardMove {
    pub card: CardDetails,
    pub source_list_id: String,
    pub destination_list_id: String,
    /// Source list after the move, in order
    pub source: Vec<Card>,
    /// Destination list after the move, in order
    pub destination: Vec<Card>,
}

fn check_people_number(n: i32) -> Result<i32, StorageError> {
    if n < 1 {
        return Err(StorageError::InvalidInput(format!("people_number must be at least 1, got {}", n)));
    }
    Ok(n)
}

fn render_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ============================================================================
// Positions
// ============================================================================

fn card_positions(conn: &mut SqliteConnection, list_id: &str) -> Result<Vec<(String, i32)>, StorageError> {
    cards::table
        .filter(cards::list_id.eq(list_id))
        .order((cards::position.asc(), cards::created_at.desc(), cards::id.asc()))
        .select((cards::id, cards::position))
        .load(conn)
        .map_err(|e| StorageError::Internal(format!("Sibling query failed: {}", e)))
}

fn sibling_ids(current: &[(String, i32)]) -> Vec<String> {
    current.iter().map(|(id, _)| id.clone()).collect()
}

fn write_positions(conn: &mut SqliteConnection, changes: &[(String, i32)]) -> Result<(), StorageError> {
    for (id, position) in changes {
        diesel::update(cards::table.filter(cards::id.eq(id)))
            .set(cards::position.eq(*position))
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Position update failed: {}", e)))?;
    }
    Ok(())
}

fn list_cards_ordered(conn: &mut SqliteConnection, list_id: &str) -> Result<Vec<Card>, StorageError> {
    cards::table
        .filter(cards::list_id.eq(list_id))
        .order((cards::position.asc(), cards::created_at.desc(), cards::id.asc()))
        .load(conn)
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

// ============================================================================
// Read Operations
// ============================================================================

/// Current list of a card, without any access check.
/// Used to pick the container lock before the checked operation runs.
pub fn list_of(conn: &mut SqliteConnection, card_id: &str) -> Result<Option<String>, StorageError> {
    cards::table
        .filter(cards::id.eq(card_id))
        .select(cards::list_id)
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

fn load_card(conn: &mut SqliteConnection, card_id: &str) -> Result<Card, StorageError> {
    cards::table
        .filter(cards::id.eq(card_id))
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))?
        .ok_or_else(|| StorageError::not_found("card", card_id))
}

fn details(conn: &mut SqliteConnection, card: Card) -> Result<CardDetails, StorageError> {
    let assigned_members: Vec<String> = card_assignees::table
        .filter(card_assignees::card_id.eq(&card.id))
        .order(card_assignees::user_id.asc())
        .select(card_assignees::user_id)
        .load(conn)
        .map_err(|e| StorageError::Internal(format!("Assignee query failed: {}", e)))?;

    let location = card
        .location_json
        .as_deref()
        .map(serde_json::from_str::<CardPin>)
        .transpose()?;

    Ok(CardDetails {
        tags: serde_json::from_str(&card.tags_json)?,
        subtasks: serde_json::from_str(&card.subtasks_json)?,
        attachments: serde_json::from_str(&card.attachments_json)?,
        location,
        assigned_members,
        card,
    })
}

pub fn get_card(
    conn: &mut SqliteConnection,
    principal: &Principal,
    card_id: &str,
) -> Result<CardDetails, StorageError> {
    require(conn, principal, &Target::Card(card_id.to_string()), Intent::Read)?;
    let card = load_card(conn, card_id)?;
    details(conn, card)
}

/// Cards of one list in display order
pub fn list_cards(
    conn: &mut SqliteConnection,
    principal: &Principal,
    list_id: &str,
) -> Result<Vec<CardDetails>, StorageError> {
    require(conn, principal, &Target::List(list_id.to_string()), Intent::Read)?;
    let rows = list_cards_ordered(conn, list_id)?;
    rows.into_iter().map(|c| details(conn, c)).collect()
}

/// Every card on every board the principal can read
pub fn list_accessible_cards(
    conn: &mut SqliteConnection,
    principal: &Principal,
) -> Result<Vec<CardDetails>, StorageError> {
    let visible = accessible_board_ids(conn, principal)?;

    let rows: Vec<Card> = cards::table
        .inner_join(lists::table)
        .filter(lists::board_id.eq_any(&visible))
        .order((cards::list_id.asc(), cards::position.asc(), cards::created_at.desc()))
        .select(Card::as_select())
        .load(conn)
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))?;

    rows.into_iter().map(|c| details(conn, c)).collect()
}

// ============================================================================
// Write Operations
// ============================================================================

fn check_assignees(access: &BoardAccess, assignees: &[String]) -> Result<(), StorageError> {
    match assignees.iter().find(|u| !access.includes(u)) {
        Some(outsider) => Err(StorageError::InvalidInput(format!(
            "user {} is not a member of board {}",
            outsider, access.board_id
        ))),
        None => Ok(()),
    }
}

fn set_assignees(conn: &mut SqliteConnection, card_id: &str, assignees: &[String]) -> Result<(), StorageError> {
    diesel::delete(card_assignees::table.filter(card_assignees::card_id.eq(card_id)))
        .execute(conn)
        .map_err(|e| StorageError::Internal(format!("Assignee delete failed: {}", e)))?;

    for user_id in assignees {
        diesel::insert_or_ignore_into(card_assignees::table)
            .values(&NewCardAssignee { card_id, user_id })
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Assignee insert failed: {}", e)))?;
    }
    Ok(())
}

/// Create a card at the requested position (default: end of the list)
pub fn create_card(
    conn: &mut SqliteConnection,
    principal: &Principal,
    list_id: &str,
    input: &CreateCardInput,
) -> Result<CardDetails, StorageError> {
    let budget = money("budget", input.budget, true)?;
    let people_number = check_people_number(input.people_number.unwrap_or(1))?;
    let tags_json = serde_json::to_string(&input.tags)?;
    let subtasks_json = serde_json::to_string(&input.subtasks)?;
    let attachments_json = serde_json::to_string(&input.attachments)?;
    let location_json = input.location.as_ref().map(serde_json::to_string).transpose()?;
    let due_date = input.due_date.map(render_date);

    conn.immediate_transaction(|conn| {
        let access = require(conn, principal, &Target::List(list_id.to_string()), Intent::Write)?;
        check_assignees(&access, &input.assigned_members)?;

        let current = card_positions(conn, list_id)?;
        let id = new_id();
        let position = input.position.unwrap_or(current.len() as i64);
        let ordered = ordering::insert(&sibling_ids(&current), &id, position)?;

        let mut changes = ordering::changes(&current, &ordered);
        let own = changes
            .iter()
            .position(|(changed, _)| changed == &id)
            .map(|i| changes.remove(i).1)
            .ok_or_else(|| StorageError::Internal("Inserted card missing from plan".into()))?;
        write_positions(conn, &changes)?;

        let now = current_timestamp();
        diesel::insert_into(cards::table)
            .values(&NewCard {
                id: &id,
                list_id,
                title: &input.title,
                description: input.description.as_deref(),
                budget: &budget,
                people_number,
                tags_json: &tags_json,
                due_date: due_date.as_deref(),
                subtasks_json: &subtasks_json,
                attachments_json: &attachments_json,
                location_json: location_json.as_deref(),
                position: own,
                created_at: &now,
                updated_at: &now,
            })
            .execute(conn)
            .map_err(StorageError::query("Card insert"))?;

        set_assignees(conn, &id, &input.assigned_members)?;

        debug!(card_id = %id, list_id, position = own, "Card created");
        let card = load_card(conn, &id)?;
        details(conn, card)
    })
}

/// Update card fields (not position or list; see `reorder_card` / `move_card`)
pub fn update_card(
    conn: &mut SqliteConnection,
    principal: &Principal,
    card_id: &str,
    input: &UpdateCardInput,
) -> Result<CardDetails, StorageError> {
    let changes_budget = input.budget.map(|b| money("budget", b, true)).transpose()?;
    let people_number = input.people_number.map(check_people_number).transpose()?;

    conn.immediate_transaction(|conn| {
        let access = require(conn, principal, &Target::Card(card_id.to_string()), Intent::Write)?;
        if let Some(assignees) = input.assigned_members.as_deref() {
            check_assignees(&access, assignees)?;
        }

        let now = current_timestamp();
        let changes = CardChanges {
            title: input.title.as_deref(),
            description: input.description.as_ref().map(|d| d.as_deref()),
            budget: changes_budget,
            people_number,
            tags_json: input.tags.as_ref().map(serde_json::to_string).transpose()?,
            due_date: input.due_date.map(|d| d.map(render_date)),
            subtasks_json: input.subtasks.as_ref().map(serde_json::to_string).transpose()?,
            attachments_json: input.attachments.as_ref().map(serde_json::to_string).transpose()?,
            location_json: input
                .location
                .as_ref()
                .map(|l| l.as_ref().map(serde_json::to_string).transpose())
                .transpose()?,
            updated_at: &now,
        };

        diesel::update(cards::table.filter(cards::id.eq(card_id)))
            .set(&changes)
            .execute(conn)
            .map_err(StorageError::query("Card update"))?;

        if let Some(assignees) = input.assigned_members.as_deref() {
            set_assignees(conn, card_id, assignees)?;
        }

        let card = load_card(conn, card_id)?;
        details(conn, card)
    })
}

/// Delete a card and close the gap in its list
pub fn delete_card(
    conn: &mut SqliteConnection,
    principal: &Principal,
    card_id: &str,
    expected_list_id: &str,
) -> Result<Locked<()>, StorageError> {
    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::Card(card_id.to_string()), Intent::Write)?;

        let list_id = load_card(conn, card_id)?.list_id;
        if list_id != expected_list_id {
            return Ok(Locked::Relocated);
        }

        diesel::delete(cards::table.filter(cards::id.eq(card_id)))
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Delete failed: {}", e)))?;

        let remaining = card_positions(conn, &list_id)?;
        let changes = ordering::changes(&remaining, &sibling_ids(&remaining));
        write_positions(conn, &changes)?;
        Ok(Locked::Done(()))
    })
}

/// Move a card to `new_position` within its list.
/// Returns the list's cards in their new order.
pub fn reorder_card(
    conn: &mut SqliteConnection,
    principal: &Principal,
    card_id: &str,
    expected_list_id: &str,
    new_position: i64,
) -> Result<Locked<Vec<Card>>, StorageError> {
    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::Card(card_id.to_string()), Intent::Write)?;

        let list_id = load_card(conn, card_id)?.list_id;
        if list_id != expected_list_id {
            return Ok(Locked::Relocated);
        }

        reorder_within(conn, card_id, &list_id, new_position)?;
        Ok(Locked::Done(list_cards_ordered(conn, &list_id)?))
    })
}

fn reorder_within(
    conn: &mut SqliteConnection,
    card_id: &str,
    list_id: &str,
    new_position: i64,
) -> Result<(), StorageError> {
    let current = card_positions(conn, list_id)?;
    let ordered = ordering::reorder(&sibling_ids(&current), card_id, new_position)?;
    let changes = ordering::changes(&current, &ordered);
    write_positions(conn, &changes)?;

    debug!(card_id, list_id, new_position, written = changes.len(), "Card reordered");
    Ok(())
}

/// Move a card to `new_list_id` at `new_position`.
///
/// The source list closes its gap and the destination list opens one, in
/// one transaction. Moving to the card's own list is a reorder.
pub fn move_card(
    conn: &mut SqliteConnection,
    principal: &Principal,
    card_id: &str,
    expected_list_id: &str,
    new_list_id: &str,
    new_position: i64,
) -> Result<Locked<CardMove>, StorageError> {
    conn.immediate_transaction(|conn| {
        let access = require(conn, principal, &Target::Card(card_id.to_string()), Intent::Write)?;

        let source_list_id = load_card(conn, card_id)?.list_id;
        if source_list_id != expected_list_id {
            return Ok(Locked::Relocated);
        }

        if new_list_id == source_list_id {
            reorder_within(conn, card_id, &source_list_id, new_position)?;
        } else {
            let destination_board = super::lists::board_of(conn, new_list_id)?
                .ok_or_else(|| StorageError::not_found("list", new_list_id))?;
            if destination_board != access.board_id {
                return Err(StorageError::Forbidden(format!(
                    "list {} belongs to another board",
                    new_list_id
                )));
            }

            let source = card_positions(conn, &source_list_id)?;
            let destination = card_positions(conn, new_list_id)?;
            let source_ordered = ordering::remove(&sibling_ids(&source), card_id);
            let destination_ordered = ordering::insert(&sibling_ids(&destination), card_id, new_position)?;

            let now = current_timestamp();
            diesel::update(cards::table.filter(cards::id.eq(card_id)))
                .set((cards::list_id.eq(new_list_id), cards::updated_at.eq(&now)))
                .execute(conn)
                .map_err(|e| StorageError::Internal(format!("Card move failed: {}", e)))?;

            write_positions(conn, &ordering::changes(&source, &source_ordered))?;
            write_positions(conn, &ordering::changes(&destination, &destination_ordered))?;

            debug!(card_id, from = %source_list_id, to = new_list_id, new_position, "Card moved");
        }

        let card = load_card(conn, card_id)?;
        let card = details(conn, card)?;
        Ok(Locked::Done(CardMove {
            source: list_cards_ordered(conn, &source_list_id)?,
            destination: list_cards_ordered(conn, new_list_id)?,
            source_list_id,
            destination_list_id: new_list_id.to_string(),
            card,
        }))
    })
}
