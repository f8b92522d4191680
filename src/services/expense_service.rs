//! Expense service - recorded spend and the board budget summary

use std::sync::Arc;

use tracing::debug;

use crate::budget::BudgetSummary;
use crate::db::expenses::{self, CreateExpenseInput, ExpenseQuery, UpdateExpenseInput};
use crate::db::models::Expense;
use crate::db::{Database, Principal};
use crate::error::StorageError;

use super::events::{EventBus, StorageEvent};
use super::validation::{bounded_text, date_order, optional_text, required_text, TITLE_MAX};

const NOTES_MAX: usize = 2000;

pub struct ExpenseService {
    db: Arc<Database>,
    events: Arc<EventBus>,
}

impl ExpenseService {
    pub fn new(db: Arc<Database>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    pub fn get(&self, principal: &Principal, expense_id: &str) -> Result<Expense, StorageError> {
        self.db.with_conn(|conn| expenses::get_expense(conn, principal, expense_id))
    }

    pub fn list(&self, principal: &Principal, query: &ExpenseQuery) -> Result<Vec<Expense>, StorageError> {
        date_order("date_from", query.date_from, "date_to", query.date_to)?;
        self.db.with_conn(|conn| expenses::list_expenses(conn, principal, query))
    }

    pub fn summary(&self, principal: &Principal, board_id: &str) -> Result<BudgetSummary, StorageError> {
        let summary = self
            .db
            .with_conn(|conn| expenses::budget_summary(conn, principal, board_id))?;
        debug!(board_id, spent = %summary.actual_spend_total, remaining = %summary.remaining, "Budget summary");
        Ok(summary)
    }

    pub fn create(&self, principal: &Principal, input: CreateExpenseInput) -> Result<Expense, StorageError> {
        required_text("title", &input.title, TITLE_MAX)?;
        optional_text("category", input.category.as_deref(), 50)?;
        if let Some(notes) = input.notes.as_deref() {
            bounded_text("notes", notes, NOTES_MAX)?;
        }

        let expense = self.db.with_conn(|conn| expenses::create_expense(conn, principal, &input))?;
        self.events.emit(StorageEvent::ExpenseRecorded {
            id: expense.id.clone(),
            board_id: expense.board_id.clone(),
            amount: expense.amount.clone(),
        });
        Ok(expense)
    }

    pub fn update(
        &self,
        principal: &Principal,
        expense_id: &str,
        input: UpdateExpenseInput,
    ) -> Result<Expense, StorageError> {
        optional_text("title", input.title.as_deref(), TITLE_MAX)?;
        optional_text("category", input.category.as_deref(), 50)?;
        if let Some(Some(notes)) = input.notes.as_ref() {
            bounded_text("notes", notes, NOTES_MAX)?;
        }

        let expense = self
            .db
            .with_conn(|conn| expenses::update_expense(conn, principal, expense_id, &input))?;
        self.events.emit(StorageEvent::ExpenseUpdated { id: expense_id.to_string() });
        Ok(expense)
    }

    pub fn delete(&self, principal: &Principal, expense_id: &str) -> Result<(), StorageError> {
        self.db
            .with_conn(|conn| expenses::delete_expense(conn, principal, expense_id))?;
        self.events.emit(StorageEvent::ExpenseDeleted { id: expense_id.to_string() });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{board, user};

    #[test]
    fn test_inverted_date_window_rejected() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ana = user(&mut db.conn().unwrap(), "ana");
        let service = ExpenseService::new(db, Arc::new(EventBus::new()));

        let query = ExpenseQuery {
            date_from: chrono::NaiveDate::from_ymd_opt(2026, 8, 2),
            date_to: chrono::NaiveDate::from_ymd_opt(2026, 8, 1),
            ..Default::default()
        };
        assert!(matches!(service.list(&ana, &query), Err(StorageError::InvalidInput(_))));
    }

    #[test]
    fn test_record_emits_event() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (ana, b) = {
            let mut conn = db.conn().unwrap();
            let ana = user(&mut conn, "ana");
            let b = board(&mut conn, &ana, "Kyoto");
            (ana, b)
        };
        let events = Arc::new(EventBus::new());
        let mut rx = events.subscribe();
        let service = ExpenseService::new(db, events);

        let expense = service
            .create(
                &ana,
                CreateExpenseInput {
                    board_id: b.clone(),
                    title: "Ramen".into(),
                    amount: rust_decimal::Decimal::new(1250, 2),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(expense.amount, "12.50");

        assert_eq!(
            rx.try_recv().unwrap(),
            StorageEvent::ExpenseRecorded {
                id: expense.id,
                board_id: b,
                amount: "12.50".into(),
            }
        );
    }
}
