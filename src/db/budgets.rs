//! Budget categories, budgets and budget items
//!
//! Categories belong to a user directly. Budgets and their items are
//! governed by the board the budget belongs to. Items carry the board's
//! currency and expose a derived `remaining_amount`.

use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use super::diesel_schema::{boards, budget_categories, budget_items, budgets};
use super::governance::{accessible_board_ids, require};
use super::models::{
    current_timestamp, new_id, Budget, BudgetCategory, BudgetItem, BudgetItemDetails, BudgetWithItems,
    NewBudget, NewBudgetCategory, NewBudgetItem,
};
use super::principal::Principal;
use crate::access::{Intent, Target};
use crate::budget::{check_currency, money, with_remaining};
use crate::error::StorageError;

// ============================================================================
// Input Types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBudgetInput {
    pub board_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub total_allocated: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBudgetInput {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub total_allocated: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBudgetItemInput {
    pub budget_id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    pub description: String,
    pub allocated_amount: Decimal,
    #[serde(default)]
    pub spent_amount: Decimal,
    /// Must equal the board currency when given
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBudgetItemInput {
    pub category_id: Option<Option<String>>,
    pub description: Option<String>,
    pub allocated_amount: Option<Decimal>,
    pub spent_amount: Option<Decimal>,
    pub currency: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = budgets)]
struct BudgetChanges<'a> {
    title: Option<&'a str>,
    description: Option<Option<&'a str>>,
    total_allocated: Option<String>,
    updated_at: &'a str,
}

#[derive(AsChangeset)]
#[diesel(table_name = budget_items)]
struct BudgetItemChanges<'a> {
    category_id: Option<Option<&'a str>>,
    description: Option<&'a str>,
    allocated_amount: Option<String>,
    spent_amount: Option<String>,
    currency: Option<String>,
    updated_at: &'a str,
}

fn query_failed(e: diesel::result::Error) -> StorageError {
    StorageError::Internal(format!("Query failed: {}", e))
}

// ============================================================================
// Categories
// ============================================================================

fn owned_category(
    conn: &mut SqliteConnection,
    principal: &Principal,
    category_id: &str,
) -> Result<BudgetCategory, StorageError> {
    budget_categories::table
        .filter(budget_categories::id.eq(category_id))
        .filter(budget_categories::owner_id.eq(principal.user_id()))
        .first(conn)
        .optional()
        .map_err(query_failed)?
        .ok_or_else(|| StorageError::not_found("budget category", category_id))
}

pub fn list_categories(
    conn: &mut SqliteConnection,
    principal: &Principal,
) -> Result<Vec<BudgetCategory>, StorageError> {
    budget_categories::table
        .filter(budget_categories::owner_id.eq(principal.user_id()))
        .order((budget_categories::name.asc(), budget_categories::id.asc()))
        .load(conn)
        .map_err(query_failed)
}

pub fn get_category(
    conn: &mut SqliteConnection,
    principal: &Principal,
    category_id: &str,
) -> Result<BudgetCategory, StorageError> {
    owned_category(conn, principal, category_id)
}

pub fn create_category(
    conn: &mut SqliteConnection,
    principal: &Principal,
    input: &CategoryInput,
) -> Result<BudgetCategory, StorageError> {
    let id = new_id();
    let now = current_timestamp();

    diesel::insert_into(budget_categories::table)
        .values(&NewBudgetCategory {
            id: &id,
            name: &input.name,
            description: input.description.as_deref(),
            owner_id: principal.user_id(),
            created_at: &now,
            updated_at: &now,
        })
        .execute(conn)
        .map_err(StorageError::query("Category insert"))?;

    owned_category(conn, principal, &id)
}

pub fn update_category(
    conn: &mut SqliteConnection,
    principal: &Principal,
    category_id: &str,
    input: &CategoryInput,
) -> Result<BudgetCategory, StorageError> {
    conn.immediate_transaction(|conn| {
        owned_category(conn, principal, category_id)?;

        diesel::update(budget_categories::table.filter(budget_categories::id.eq(category_id)))
            .set((
                budget_categories::name.eq(&input.name),
                budget_categories::description.eq(input.description.as_deref()),
                budget_categories::updated_at.eq(current_timestamp()),
            ))
            .execute(conn)
            .map_err(StorageError::query("Category update"))?;

        owned_category(conn, principal, category_id)
    })
}

/// Delete a category; items that referenced it keep existing uncategorized
pub fn delete_category(
    conn: &mut SqliteConnection,
    principal: &Principal,
    category_id: &str,
) -> Result<(), StorageError> {
    conn.immediate_transaction(|conn| {
        owned_category(conn, principal, category_id)?;
        diesel::delete(budget_categories::table.filter(budget_categories::id.eq(category_id)))
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Delete failed: {}", e)))?;
        Ok(())
    })
}

// ============================================================================
// Budgets
// ============================================================================

fn load_budget(conn: &mut SqliteConnection, budget_id: &str) -> Result<Budget, StorageError> {
    budgets::table
        .filter(budgets::id.eq(budget_id))
        .first(conn)
        .optional()
        .map_err(query_failed)?
        .ok_or_else(|| StorageError::not_found("budget", budget_id))
}

fn items_of(conn: &mut SqliteConnection, budget_id: &str) -> Result<Vec<BudgetItemDetails>, StorageError> {
    let rows: Vec<BudgetItem> = budget_items::table
        .filter(budget_items::budget_id.eq(budget_id))
        .order((budget_items::created_at.desc(), budget_items::id.asc()))
        .load(conn)
        .map_err(query_failed)?;
    rows.into_iter().map(with_remaining).collect()
}

fn with_items(conn: &mut SqliteConnection, budget: Budget) -> Result<BudgetWithItems, StorageError> {
    let items = items_of(conn, &budget.id)?;
    Ok(BudgetWithItems { budget, items })
}

pub fn get_budget(
    conn: &mut SqliteConnection,
    principal: &Principal,
    budget_id: &str,
) -> Result<BudgetWithItems, StorageError> {
    require(conn, principal, &Target::Budget(budget_id.to_string()), Intent::Read)?;
    let budget = load_budget(conn, budget_id)?;
    with_items(conn, budget)
}

/// Budgets of one board, or of every readable board when `board_id` is `None`
pub fn list_budgets(
    conn: &mut SqliteConnection,
    principal: &Principal,
    board_id: Option<&str>,
) -> Result<Vec<BudgetWithItems>, StorageError> {
    let visible = match board_id {
        Some(id) => {
            require(conn, principal, &Target::Board(id.to_string()), Intent::Read)?;
            vec![id.to_string()]
        }
        None => accessible_board_ids(conn, principal)?,
    };

    let rows: Vec<Budget> = budgets::table
        .filter(budgets::board_id.eq_any(&visible))
        .order((budgets::created_at.desc(), budgets::id.asc()))
        .load(conn)
        .map_err(query_failed)?;

    rows.into_iter().map(|b| with_items(conn, b)).collect()
}

pub fn create_budget(
    conn: &mut SqliteConnection,
    principal: &Principal,
    input: &CreateBudgetInput,
) -> Result<BudgetWithItems, StorageError> {
    let total = money("total_allocated", input.total_allocated, true)?;

    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::Board(input.board_id.clone()), Intent::Write)?;

        let id = new_id();
        let now = current_timestamp();
        diesel::insert_into(budgets::table)
            .values(&NewBudget {
                id: &id,
                title: &input.title,
                description: input.description.as_deref(),
                board_id: &input.board_id,
                total_allocated: &total,
                created_at: &now,
                updated_at: &now,
            })
            .execute(conn)
            .map_err(StorageError::query("Budget insert"))?;

        debug!(budget_id = %id, board_id = %input.board_id, "Budget created");
        let budget = load_budget(conn, &id)?;
        with_items(conn, budget)
    })
}

pub fn update_budget(
    conn: &mut SqliteConnection,
    principal: &Principal,
    budget_id: &str,
    input: &UpdateBudgetInput,
) -> Result<BudgetWithItems, StorageError> {
    let total = input
        .total_allocated
        .map(|t| money("total_allocated", t, true))
        .transpose()?;

    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::Budget(budget_id.to_string()), Intent::Write)?;

        let now = current_timestamp();
        diesel::update(budgets::table.filter(budgets::id.eq(budget_id)))
            .set(&BudgetChanges {
                title: input.title.as_deref(),
                description: input.description.as_ref().map(|d| d.as_deref()),
                total_allocated: total,
                updated_at: &now,
            })
            .execute(conn)
            .map_err(StorageError::query("Budget update"))?;

        let budget = load_budget(conn, budget_id)?;
        with_items(conn, budget)
    })
}

/// Delete a budget with its items
pub fn delete_budget(
    conn: &mut SqliteConnection,
    principal: &Principal,
    budget_id: &str,
) -> Result<(), StorageError> {
    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::Budget(budget_id.to_string()), Intent::Write)?;
        diesel::delete(budgets::table.filter(budgets::id.eq(budget_id)))
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Delete failed: {}", e)))?;
        Ok(())
    })
}

// ============================================================================
// Budget Items
// ============================================================================

fn board_currency(conn: &mut SqliteConnection, board_id: &str) -> Result<String, StorageError> {
    boards::table
        .filter(boards::id.eq(board_id))
        .select(boards::currency)
        .first(conn)
        .optional()
        .map_err(query_failed)?
        .ok_or_else(|| StorageError::not_found("board", board_id))
}

fn load_item(conn: &mut SqliteConnection, item_id: &str) -> Result<BudgetItem, StorageError> {
    budget_items::table
        .filter(budget_items::id.eq(item_id))
        .first(conn)
        .optional()
        .map_err(query_failed)?
        .ok_or_else(|| StorageError::not_found("budget item", item_id))
}

pub fn get_budget_item(
    conn: &mut SqliteConnection,
    principal: &Principal,
    item_id: &str,
) -> Result<BudgetItemDetails, StorageError> {
    require(conn, principal, &Target::BudgetItem(item_id.to_string()), Intent::Read)?;
    with_remaining(load_item(conn, item_id)?)
}

pub fn list_budget_items(
    conn: &mut SqliteConnection,
    principal: &Principal,
    budget_id: &str,
) -> Result<Vec<BudgetItemDetails>, StorageError> {
    require(conn, principal, &Target::Budget(budget_id.to_string()), Intent::Read)?;
    items_of(conn, budget_id)
}

pub fn create_budget_item(
    conn: &mut SqliteConnection,
    principal: &Principal,
    input: &CreateBudgetItemInput,
) -> Result<BudgetItemDetails, StorageError> {
    let allocated = money("allocated_amount", input.allocated_amount, true)?;
    let spent = money("spent_amount", input.spent_amount, true)?;

    conn.immediate_transaction(|conn| {
        let access = require(conn, principal, &Target::Budget(input.budget_id.clone()), Intent::Write)?;
        let currency = check_currency(&board_currency(conn, &access.board_id)?, input.currency.as_deref())?;

        if let Some(category_id) = input.category_id.as_deref() {
            owned_category(conn, principal, category_id)?;
        }

        let id = new_id();
        let now = current_timestamp();
        diesel::insert_into(budget_items::table)
            .values(&NewBudgetItem {
                id: &id,
                budget_id: &input.budget_id,
                category_id: input.category_id.as_deref(),
                description: &input.description,
                allocated_amount: &allocated,
                spent_amount: &spent,
                currency: &currency,
                created_at: &now,
                updated_at: &now,
            })
            .execute(conn)
            .map_err(StorageError::query("Budget item insert"))?;

        with_remaining(load_item(conn, &id)?)
    })
}

pub fn update_budget_item(
    conn: &mut SqliteConnection,
    principal: &Principal,
    item_id: &str,
    input: &UpdateBudgetItemInput,
) -> Result<BudgetItemDetails, StorageError> {
    let allocated = input
        .allocated_amount
        .map(|a| money("allocated_amount", a, true))
        .transpose()?;
    let spent = input
        .spent_amount
        .map(|s| money("spent_amount", s, true))
        .transpose()?;

    conn.immediate_transaction(|conn| {
        let access = require(conn, principal, &Target::BudgetItem(item_id.to_string()), Intent::Write)?;

        let currency = match input.currency.as_deref() {
            Some(code) => Some(check_currency(&board_currency(conn, &access.board_id)?, Some(code))?),
            None => None,
        };
        if let Some(Some(category_id)) = input.category_id.as_ref() {
            owned_category(conn, principal, category_id)?;
        }

        let now = current_timestamp();
        diesel::update(budget_items::table.filter(budget_items::id.eq(item_id)))
            .set(&BudgetItemChanges {
                category_id: input.category_id.as_ref().map(|c| c.as_deref()),
                description: input.description.as_deref(),
                allocated_amount: allocated,
                spent_amount: spent,
                currency,
                updated_at: &now,
            })
            .execute(conn)
            .map_err(StorageError::query("Budget item update"))?;

        with_remaining(load_item(conn, item_id)?)
    })
}

pub fn delete_budget_item(
    conn: &mut SqliteConnection,
    principal: &Principal,
    item_id: &str,
) -> Result<(), StorageError> {
    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::BudgetItem(item_id.to_string()), Intent::Write)?;
        diesel::delete(budget_items::table.filter(budget_items::id.eq(item_id)))
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Delete failed: {}", e)))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use crate::db::test_support::{board, user};
    use crate::db::Database;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn budget_on(conn: &mut SqliteConnection, owner: &Principal, board_id: &str) -> String {
        create_budget(
            conn,
            owner,
            &CreateBudgetInput {
                board_id: board_id.into(),
                title: "Lodging".into(),
                total_allocated: dec("1500"),
                ..Default::default()
            },
        )
        .unwrap()
        .budget
        .id
    }

    fn item_input(budget_id: &str) -> CreateBudgetItemInput {
        CreateBudgetItemInput {
            budget_id: budget_id.into(),
            description: "Hotel".into(),
            allocated_amount: dec("500"),
            ..Default::default()
        }
    }

    #[test]
    fn test_remaining_follows_updates() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let b = board(&mut conn, &ana, "Rome");
        let bg = budget_on(&mut conn, &ana, &b);

        let item = create_budget_item(&mut conn, &ana, &item_input(&bg)).unwrap();
        assert_eq!(item.remaining_amount, "500.00");
        assert_eq!(item.item.currency, "EUR");

        let updated = update_budget_item(
            &mut conn,
            &ana,
            &item.item.id,
            &UpdateBudgetItemInput {
                spent_amount: Some(dec("120.5")),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.remaining_amount, "379.50");

        let fetched = get_budget(&mut conn, &ana, &bg).unwrap();
        assert_eq!(fetched.items[0].remaining_amount, "379.50");
        assert_eq!(fetched.budget.total_allocated, "1500.00");
    }

    #[test]
    fn test_currency_mismatch_rejected() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let b = board(&mut conn, &ana, "Rome");
        let bg = budget_on(&mut conn, &ana, &b);

        let mut input = item_input(&bg);
        input.currency = Some("USD".into());
        assert!(matches!(create_budget_item(&mut conn, &ana, &input), Err(StorageError::InvalidInput(_))));

        input.currency = Some("eur".into());
        assert_eq!(create_budget_item(&mut conn, &ana, &input).unwrap().item.currency, "EUR");
    }

    #[test]
    fn test_category_delete_nulls_items() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let b = board(&mut conn, &ana, "Rome");
        let bg = budget_on(&mut conn, &ana, &b);
        let cat = create_category(
            &mut conn,
            &ana,
            &CategoryInput {
                name: "Lodging".into(),
                description: None,
            },
        )
        .unwrap();

        let mut input = item_input(&bg);
        input.category_id = Some(cat.id.clone());
        let item = create_budget_item(&mut conn, &ana, &input).unwrap();
        assert_eq!(item.item.category_id.as_deref(), Some(cat.id.as_str()));

        delete_category(&mut conn, &ana, &cat.id).unwrap();

        let reloaded = get_budget_item(&mut conn, &ana, &item.item.id).unwrap();
        assert!(reloaded.item.category_id.is_none());
    }

    #[test]
    fn test_categories_are_private() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let ben = user(&mut conn, "ben");
        let b = board(&mut conn, &ana, "Rome");
        let bg = budget_on(&mut conn, &ana, &b);
        let bens = create_category(
            &mut conn,
            &ben,
            &CategoryInput {
                name: "Food".into(),
                description: None,
            },
        )
        .unwrap();

        assert!(list_categories(&mut conn, &ana).unwrap().is_empty());
        assert!(matches!(get_category(&mut conn, &ana, &bens.id), Err(StorageError::NotFound(_))));

        let mut input = item_input(&bg);
        input.category_id = Some(bens.id);
        assert!(matches!(create_budget_item(&mut conn, &ana, &input), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_budget_scoping() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let ben = user(&mut conn, "ben");
        let eve = user(&mut conn, "eve");
        let b = board(&mut conn, &ana, "Rome");
        crate::db::boards::add_member(&mut conn, &ana, &b, ben.user_id()).unwrap();
        let bg = budget_on(&mut conn, &ana, &b);

        assert_eq!(list_budgets(&mut conn, &ben, None).unwrap().len(), 1);
        assert!(list_budgets(&mut conn, &eve, None).unwrap().is_empty());
        assert!(matches!(
            update_budget(&mut conn, &ben, &bg, &UpdateBudgetInput::default()),
            Err(StorageError::Forbidden(_))
        ));
        assert!(matches!(delete_budget(&mut conn, &eve, &bg), Err(StorageError::NotFound(_))));
        assert!(matches!(
            create_budget_item(&mut conn, &ben, &item_input(&bg)),
            Err(StorageError::Forbidden(_))
        ));
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let b = board(&mut conn, &ana, "Rome");
        let bg = budget_on(&mut conn, &ana, &b);

        let mut input = item_input(&bg);
        input.spent_amount = dec("-1");
        assert!(matches!(create_budget_item(&mut conn, &ana, &input), Err(StorageError::InvalidInput(_))));
    }

    #[test]
    fn test_items_listed_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let b = board(&mut conn, &ana, "Rome");
        let bg = budget_on(&mut conn, &ana, &b);

        let older = create_budget_item(&mut conn, &ana, &item_input(&bg)).unwrap().item.id;
        let newer = create_budget_item(&mut conn, &ana, &item_input(&bg)).unwrap().item.id;
        for (id, at) in [(&older, "2026-01-01T00:00:00.000Z"), (&newer, "2026-01-02T00:00:00.000Z")] {
            diesel::update(budget_items::table.filter(budget_items::id.eq(id)))
                .set(budget_items::created_at.eq(at))
                .execute(&mut conn)
                .unwrap();
        }

        let ids: Vec<String> = list_budget_items(&mut conn, &ana, &bg)
            .unwrap()
            .into_iter()
            .map(|i| i.item.id)
            .collect();
        assert_eq!(ids, vec![newer.clone(), older.clone()]);
        assert_eq!(get_budget(&mut conn, &ana, &bg).unwrap().items[0].item.id, newer);
    }
}
