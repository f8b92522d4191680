//! Expenses recorded against a board, and the board budget summary

use chrono::NaiveDate;
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use super::diesel_schema::{boards, expenses};
use super::governance::{accessible_board_ids, require};
use super::models::{current_timestamp, new_id, Expense, NewExpense};
use super::principal::Principal;
use crate::access::{Intent, Target};
use crate::budget::{check_currency, money, summarize, BudgetSummary};
use crate::error::StorageError;

pub const DEFAULT_EXPENSE_CATEGORY: &str = "other";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateExpenseInput {
    pub board_id: String,
    pub title: String,
    pub amount: Decimal,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateExpenseInput {
    pub title: Option<String>,
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub date: Option<Option<NaiveDate>>,
    pub notes: Option<Option<String>>,
    pub currency: Option<String>,
}

/// Listing filters; all bounds inclusive
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseQuery {
    #[serde(default)]
    pub board_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
}

#[derive(AsChangeset)]
#[diesel(table_name = expenses)]
struct ExpenseChanges<'a> {
    title: Option<&'a str>,
    amount: Option<String>,
    category: Option<&'a str>,
    date: Option<Option<String>>,
    notes: Option<Option<&'a str>>,
    currency: Option<String>,
    updated_at: &'a str,
}

fn render_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn query_failed(e: diesel::result::Error) -> StorageError {
    StorageError::Internal(format!("Query failed: {}", e))
}

fn board_currency(conn: &mut SqliteConnection, board_id: &str) -> Result<String, StorageError> {
    boards::table
        .filter(boards::id.eq(board_id))
        .select(boards::currency)
        .first(conn)
        .optional()
        .map_err(query_failed)?
        .ok_or_else(|| StorageError::not_found("board", board_id))
}

fn load_expense(conn: &mut SqliteConnection, expense_id: &str) -> Result<Expense, StorageError> {
    expenses::table
        .filter(expenses::id.eq(expense_id))
        .first(conn)
        .optional()
        .map_err(query_failed)?
        .ok_or_else(|| StorageError::not_found("expense", expense_id))
}

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_expense(
    conn: &mut SqliteConnection,
    principal: &Principal,
    expense_id: &str,
) -> Result<Expense, StorageError> {
    require(conn, principal, &Target::Expense(expense_id.to_string()), Intent::Read)?;
    load_expense(conn, expense_id)
}

/// Expenses on readable boards, newest date first
pub fn list_expenses(
    conn: &mut SqliteConnection,
    principal: &Principal,
    query: &ExpenseQuery,
) -> Result<Vec<Expense>, StorageError> {
    let visible = match query.board_id.as_deref() {
        Some(id) => {
            require(conn, principal, &Target::Board(id.to_string()), Intent::Read)?;
            vec![id.to_string()]
        }
        None => accessible_board_ids(conn, principal)?,
    };

    let mut q = expenses::table
        .filter(expenses::board_id.eq_any(&visible))
        .into_boxed();

    if let Some(category) = query.category.as_deref() {
        q = q.filter(expenses::category.eq(category.to_string()));
    }
    if let Some(from) = query.date_from {
        q = q.filter(expenses::date.ge(render_date(from)));
    }
    if let Some(to) = query.date_to {
        q = q.filter(expenses::date.le(render_date(to)));
    }

    q.order((expenses::date.desc(), expenses::created_at.desc(), expenses::id.asc()))
        .load(conn)
        .map_err(query_failed)
}

/// Planned board budget against recorded spend, per category
pub fn budget_summary(
    conn: &mut SqliteConnection,
    principal: &Principal,
    board_id: &str,
) -> Result<BudgetSummary, StorageError> {
    require(conn, principal, &Target::Board(board_id.to_string()), Intent::Read)?;

    let (budget, currency): (String, String) = boards::table
        .filter(boards::id.eq(board_id))
        .select((boards::budget, boards::currency))
        .first(conn)
        .map_err(StorageError::query("board"))?;

    let rows: Vec<Expense> = expenses::table
        .filter(expenses::board_id.eq(board_id))
        .load(conn)
        .map_err(query_failed)?;

    summarize(&budget, &currency, &rows)
}

// ============================================================================
// Write Operations
// ============================================================================

pub fn create_expense(
    conn: &mut SqliteConnection,
    principal: &Principal,
    input: &CreateExpenseInput,
) -> Result<Expense, StorageError> {
    let amount = money("amount", input.amount, false)?;
    let date = input.date.map(render_date);

    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::Board(input.board_id.clone()), Intent::Write)?;
        let currency = check_currency(&board_currency(conn, &input.board_id)?, input.currency.as_deref())?;

        let id = new_id();
        let now = current_timestamp();
        diesel::insert_into(expenses::table)
            .values(&NewExpense {
                id: &id,
                board_id: &input.board_id,
                title: &input.title,
                amount: &amount,
                category: input.category.as_deref().unwrap_or(DEFAULT_EXPENSE_CATEGORY),
                date: date.as_deref(),
                notes: input.notes.as_deref(),
                currency: &currency,
                created_by: principal.user_id(),
                created_at: &now,
                updated_at: &now,
            })
            .execute(conn)
            .map_err(StorageError::query("Expense insert"))?;

        debug!(expense_id = %id, board_id = %input.board_id, amount = %amount, "Expense recorded");
        load_expense(conn, &id)
    })
}

pub fn update_expense(
    conn: &mut SqliteConnection,
    principal: &Principal,
    expense_id: &str,
    input: &UpdateExpenseInput,
) -> Result<Expense, StorageError> {
    let amount = input.amount.map(|a| money("amount", a, false)).transpose()?;

    conn.immediate_transaction(|conn| {
        let access = require(conn, principal, &Target::Expense(expense_id.to_string()), Intent::Write)?;
        let currency = match input.currency.as_deref() {
            Some(code) => Some(check_currency(&board_currency(conn, &access.board_id)?, Some(code))?),
            None => None,
        };

        let now = current_timestamp();
        diesel::update(expenses::table.filter(expenses::id.eq(expense_id)))
            .set(&ExpenseChanges {
                title: input.title.as_deref(),
                amount,
                category: input.category.as_deref(),
                date: input.date.map(|d| d.map(render_date)),
                notes: input.notes.as_ref().map(|n| n.as_deref()),
                currency,
                updated_at: &now,
            })
            .execute(conn)
            .map_err(StorageError::query("Expense update"))?;

        load_expense(conn, expense_id)
    })
}

pub fn delete_expense(
    conn: &mut SqliteConnection,
    principal: &Principal,
    expense_id: &str,
) -> Result<(), StorageError> {
    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::Expense(expense_id.to_string()), Intent::Write)?;
        diesel::delete(expenses::table.filter(expenses::id.eq(expense_id)))
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Delete failed: {}", e)))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use crate::db::boards::{update_board, UpdateBoardInput};
    use crate::db::test_support::{board, user};
    use crate::db::Database;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn day(d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2026, 7, d)
    }

    fn spend(conn: &mut SqliteConnection, p: &Principal, board_id: &str, category: &str, amount: &str, d: u32) -> Expense {
        create_expense(
            conn,
            p,
            &CreateExpenseInput {
                board_id: board_id.into(),
                title: format!("{} on {}", category, d),
                amount: dec(amount),
                category: Some(category.into()),
                date: day(d),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_filters_and_order() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let b = board(&mut conn, &ana, "Kyoto");

        spend(&mut conn, &ana, &b, "food", "12", 1);
        spend(&mut conn, &ana, &b, "transport", "30", 2);
        spend(&mut conn, &ana, &b, "food", "20", 3);

        let all = list_expenses(&mut conn, &ana, &ExpenseQuery::default()).unwrap();
        let dates: Vec<_> = all.iter().map(|e| e.date.clone().unwrap_or_default()).collect();
        assert_eq!(dates, vec!["2026-07-03", "2026-07-02", "2026-07-01"]);

        let food = list_expenses(
            &mut conn,
            &ana,
            &ExpenseQuery {
                category: Some("food".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(food.len(), 2);

        let window = list_expenses(
            &mut conn,
            &ana,
            &ExpenseQuery {
                date_from: day(2),
                date_to: day(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].category, "transport");
    }

    #[test]
    fn test_summary_against_board_budget() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let b = board(&mut conn, &ana, "Kyoto");
        update_board(
            &mut conn,
            &ana,
            &b,
            &UpdateBoardInput {
                budget: Some(dec("1000")),
                ..Default::default()
            },
        )
        .unwrap();

        spend(&mut conn, &ana, &b, "food", "12.25", 1);
        spend(&mut conn, &ana, &b, "food", "7.75", 2);
        spend(&mut conn, &ana, &b, "hotel", "400", 2);

        let summary = budget_summary(&mut conn, &ana, &b).unwrap();
        assert_eq!(summary.board_budget, "1000.00");
        assert_eq!(summary.actual_spend_total, "420.00");
        assert_eq!(summary.remaining, "580.00");
        assert_eq!(summary.currency, "EUR");
        assert_eq!(summary.by_category.len(), 2);
        assert_eq!(summary.by_category[0].category, "food");
        assert_eq!(summary.by_category[0].total, "20.00");
    }

    #[test]
    fn test_currency_and_amount_rules() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let b = board(&mut conn, &ana, "Kyoto");

        let mut input = CreateExpenseInput {
            board_id: b.clone(),
            title: "Taxi".into(),
            amount: dec("15"),
            currency: Some("JPY".into()),
            ..Default::default()
        };
        assert!(matches!(create_expense(&mut conn, &ana, &input), Err(StorageError::InvalidInput(_))));

        input.currency = None;
        input.amount = Decimal::ZERO;
        assert!(matches!(create_expense(&mut conn, &ana, &input), Err(StorageError::InvalidInput(_))));

        input.amount = dec("15");
        let created = create_expense(&mut conn, &ana, &input).unwrap();
        assert_eq!(created.currency, "EUR");
        assert_eq!(created.category, DEFAULT_EXPENSE_CATEGORY);
        assert_eq!(created.created_by, ana.user_id());
    }

    #[test]
    fn test_currency_switch_blocked_by_existing_expenses() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let b = board(&mut conn, &ana, "Kyoto");
        let switch = UpdateBoardInput {
            currency: Some("JPY".into()),
            ..Default::default()
        };

        let expense = spend(&mut conn, &ana, &b, "food", "12", 1);
        assert!(matches!(update_board(&mut conn, &ana, &b, &switch), Err(StorageError::InvalidInput(_))));

        delete_expense(&mut conn, &ana, &expense.id).unwrap();
        assert_eq!(update_board(&mut conn, &ana, &b, &switch).unwrap().board.currency, "JPY");
    }

    #[test]
    fn test_member_reads_stranger_blind() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let ana = user(&mut conn, "ana");
        let ben = user(&mut conn, "ben");
        let eve = user(&mut conn, "eve");
        let b = board(&mut conn, &ana, "Kyoto");
        crate::db::boards::add_member(&mut conn, &ana, &b, ben.user_id()).unwrap();
        let e = spend(&mut conn, &ana, &b, "food", "12", 1);

        assert!(get_expense(&mut conn, &ben, &e.id).is_ok());
        assert!(budget_summary(&mut conn, &ben, &b).is_ok());
        assert!(matches!(
            update_expense(&mut conn, &ben, &e.id, &UpdateExpenseInput::default()),
            Err(StorageError::Forbidden(_))
        ));
        assert!(matches!(get_expense(&mut conn, &eve, &e.id), Err(StorageError::NotFound(_))));
        assert!(matches!(budget_summary(&mut conn, &eve, &b), Err(StorageError::NotFound(_))));
        assert!(list_expenses(&mut conn, &eve, &ExpenseQuery::default()).unwrap().is_empty());
    }
}
