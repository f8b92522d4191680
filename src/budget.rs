//! Budget aggregation and money validation
//!
//! Amounts live in SQLite as decimal strings and are only ever combined as
//! `rust_decimal::Decimal`. Remaining amounts are derived on read.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::db::models::{BudgetItem, BudgetItemDetails, Expense};
use crate::error::StorageError;

/// Largest number of fractional digits accepted for money
pub const MONEY_SCALE: u32 = 2;

/// Largest number of significant digits accepted for money
pub const MONEY_DIGITS: u32 = 10;

/// Largest accepted amount, 99,999,999.99
fn money_max() -> Decimal {
    Decimal::new(10_i64.pow(MONEY_DIGITS) - 1, MONEY_SCALE)
}

/// Parse a stored or submitted amount
pub fn parse_amount(field: &str, raw: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(raw.trim())
        .map_err(|_| StorageError::InvalidInput(format!("{} must be a decimal number, got '{}'", field, raw)))
}

/// Validate a money amount and render it in canonical two-place form
pub fn money(field: &str, amount: Decimal, allow_zero: bool) -> Result<String, StorageError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(StorageError::InvalidInput(format!("{} must not be negative", field)));
    }
    if !allow_zero && amount.is_zero() {
        return Err(StorageError::InvalidInput(format!("{} must be greater than zero", field)));
    }
    if amount > money_max() {
        return Err(StorageError::InvalidInput(format!(
            "{} must not exceed {}",
            field,
            money_max()
        )));
    }
    if amount.scale() > MONEY_SCALE && amount.normalize().scale() > MONEY_SCALE {
        return Err(StorageError::InvalidInput(format!(
            "{} must have at most {} decimal places",
            field, MONEY_SCALE
        )));
    }

    let mut canonical = amount.normalize();
    canonical.rescale(MONEY_SCALE);
    Ok(canonical.to_string())
}

/// Remaining = allocated - spent. Recomputed on every read.
pub fn remaining_amount(allocated: Decimal, spent: Decimal) -> Result<Decimal, StorageError> {
    allocated
        .checked_sub(spent)
        .ok_or_else(|| overflow("remaining amount"))
}

fn overflow(what: &str) -> StorageError {
    StorageError::Internal(format!("{} overflowed", what))
}

/// Attach the derived remaining amount to a stored item
pub fn with_remaining(item: BudgetItem) -> Result<BudgetItemDetails, StorageError> {
    let allocated = parse_amount("allocated_amount", &item.allocated_amount)?;
    let spent = parse_amount("spent_amount", &item.spent_amount)?;
    let mut remaining = remaining_amount(allocated, spent)?;
    remaining.rescale(MONEY_SCALE);

    Ok(BudgetItemDetails {
        remaining_amount: remaining.to_string(),
        item,
    })
}

/// Validate a three-letter currency code and upper-case it
pub fn normalize_currency(code: &str) -> Result<String, StorageError> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(StorageError::InvalidInput(format!(
            "currency must be a 3-letter code, got '{}'",
            code
        )));
    }
    Ok(code.to_ascii_uppercase())
}

/// Currency for an expense or budget item tied to a board.
///
/// Absent → the board's currency; present and different → rejected.
pub fn check_currency(board_currency: &str, given: Option<&str>) -> Result<String, StorageError> {
    match given {
        None => Ok(board_currency.to_string()),
        Some(code) => {
            let code = normalize_currency(code)?;
            if code != board_currency {
                return Err(StorageError::InvalidInput(format!(
                    "currency {} does not match board currency {}",
                    code, board_currency
                )));
            }
            Ok(code)
        }
    }
}

/// Spend total for one expense category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CategoryTotal {
    pub category: String,
    pub total: String,
}

/// Board-level budget overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BudgetSummary {
    pub board_budget: String,
    pub actual_spend_total: String,
    pub remaining: String,
    pub currency: String,
    pub by_category: Vec<CategoryTotal>,
}

/// Summarize a board's planned budget against its recorded expenses
pub fn summarize(board_budget: &str, currency: &str, expenses: &[Expense]) -> Result<BudgetSummary, StorageError> {
    let planned = parse_amount("budget", board_budget)?;

    let mut total = Decimal::ZERO;
    let mut by_category: BTreeMap<String, Decimal> = BTreeMap::new();
    for expense in expenses {
        let amount = parse_amount("amount", &expense.amount)?;
        total = total.checked_add(amount).ok_or_else(|| overflow("expense total"))?;
        let slot = by_category.entry(expense.category.clone()).or_insert(Decimal::ZERO);
        *slot = slot
            .checked_add(amount)
            .ok_or_else(|| overflow("category total"))?;
    }
    let remaining = planned
        .checked_sub(total)
        .ok_or_else(|| overflow("remaining budget"))?;

    let render = |mut d: Decimal| {
        d.rescale(MONEY_SCALE);
        d.to_string()
    };

    Ok(BudgetSummary {
        board_budget: render(planned),
        actual_spend_total: render(total),
        remaining: render(remaining),
        currency: currency.to_string(),
        by_category: by_category
            .into_iter()
            .map(|(category, total)| CategoryTotal {
                category,
                total: render(total),
            })
            .collect(),
    })
}
