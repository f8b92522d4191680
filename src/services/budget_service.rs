//! Budget service - categories, budgets and budget items

use std::sync::Arc;

use crate::db::budgets::{
    self, CategoryInput, CreateBudgetInput, CreateBudgetItemInput, UpdateBudgetInput, UpdateBudgetItemInput,
};
use crate::db::models::{BudgetCategory, BudgetItemDetails, BudgetWithItems};
use crate::db::{Database, Principal};
use crate::error::StorageError;

use super::events::{EventBus, StorageEvent};
use super::validation::{optional_text, required_text, CATEGORY_NAME_MAX, ITEM_DESCRIPTION_MAX, TITLE_MAX};

pub struct BudgetService {
    db: Arc<Database>,
    events: Arc<EventBus>,
}

impl BudgetService {
    pub fn new(db: Arc<Database>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub fn categories(&self, principal: &Principal) -> Result<Vec<BudgetCategory>, StorageError> {
        self.db.with_conn(|conn| budgets::list_categories(conn, principal))
    }

    pub fn category(&self, principal: &Principal, category_id: &str) -> Result<BudgetCategory, StorageError> {
        self.db.with_conn(|conn| budgets::get_category(conn, principal, category_id))
    }

    pub fn create_category(&self, principal: &Principal, input: CategoryInput) -> Result<BudgetCategory, StorageError> {
        required_text("name", &input.name, CATEGORY_NAME_MAX)?;
        self.db.with_conn(|conn| budgets::create_category(conn, principal, &input))
    }

    pub fn update_category(
        &self,
        principal: &Principal,
        category_id: &str,
        input: CategoryInput,
    ) -> Result<BudgetCategory, StorageError> {
        required_text("name", &input.name, CATEGORY_NAME_MAX)?;
        self.db
            .with_conn(|conn| budgets::update_category(conn, principal, category_id, &input))
    }

    pub fn delete_category(&self, principal: &Principal, category_id: &str) -> Result<(), StorageError> {
        self.db
            .with_conn(|conn| budgets::delete_category(conn, principal, category_id))
    }

    // =========================================================================
    // Budgets
    // =========================================================================

    pub fn get(&self, principal: &Principal, budget_id: &str) -> Result<BudgetWithItems, StorageError> {
        self.db.with_conn(|conn| budgets::get_budget(conn, principal, budget_id))
    }

    pub fn list(&self, principal: &Principal, board_id: Option<&str>) -> Result<Vec<BudgetWithItems>, StorageError> {
        self.db.with_conn(|conn| budgets::list_budgets(conn, principal, board_id))
    }

    pub fn create(&self, principal: &Principal, input: CreateBudgetInput) -> Result<BudgetWithItems, StorageError> {
        required_text("title", &input.title, TITLE_MAX)?;

        let budget = self.db.with_conn(|conn| budgets::create_budget(conn, principal, &input))?;
        self.events.emit(StorageEvent::BudgetChanged { id: budget.budget.id.clone() });
        Ok(budget)
    }

    pub fn update(
        &self,
        principal: &Principal,
        budget_id: &str,
        input: UpdateBudgetInput,
    ) -> Result<BudgetWithItems, StorageError> {
        optional_text("title", input.title.as_deref(), TITLE_MAX)?;

        let budget = self
            .db
            .with_conn(|conn| budgets::update_budget(conn, principal, budget_id, &input))?;
        self.events.emit(StorageEvent::BudgetChanged { id: budget_id.to_string() });
        Ok(budget)
    }

    pub fn delete(&self, principal: &Principal, budget_id: &str) -> Result<(), StorageError> {
        self.db.with_conn(|conn| budgets::delete_budget(conn, principal, budget_id))?;
        self.events.emit(StorageEvent::BudgetDeleted { id: budget_id.to_string() });
        Ok(())
    }

    // =========================================================================
    // Budget Items
    // =========================================================================

    pub fn item(&self, principal: &Principal, item_id: &str) -> Result<BudgetItemDetails, StorageError> {
        self.db.with_conn(|conn| budgets::get_budget_item(conn, principal, item_id))
    }

    pub fn items(&self, principal: &Principal, budget_id: &str) -> Result<Vec<BudgetItemDetails>, StorageError> {
        self.db
            .with_conn(|conn| budgets::list_budget_items(conn, principal, budget_id))
    }

    pub fn create_item(
        &self,
        principal: &Principal,
        input: CreateBudgetItemInput,
    ) -> Result<BudgetItemDetails, StorageError> {
        required_text("description", &input.description, ITEM_DESCRIPTION_MAX)?;

        let item = self
            .db
            .with_conn(|conn| budgets::create_budget_item(conn, principal, &input))?;
        self.events.emit(StorageEvent::BudgetItemChanged {
            id: item.item.id.clone(),
            budget_id: item.item.budget_id.clone(),
        });
        Ok(item)
    }

    pub fn update_item(
        &self,
        principal: &Principal,
        item_id: &str,
        input: UpdateBudgetItemInput,
    ) -> Result<BudgetItemDetails, StorageError> {
        optional_text("description", input.description.as_deref(), ITEM_DESCRIPTION_MAX)?;

        let item = self
            .db
            .with_conn(|conn| budgets::update_budget_item(conn, principal, item_id, &input))?;
        self.events.emit(StorageEvent::BudgetItemChanged {
            id: item.item.id.clone(),
            budget_id: item.item.budget_id.clone(),
        });
        Ok(item)
    }

    pub fn delete_item(&self, principal: &Principal, item_id: &str) -> Result<(), StorageError> {
        self.db
            .with_conn(|conn| budgets::delete_budget_item(conn, principal, item_id))?;
        self.events.emit(StorageEvent::BudgetItemDeleted { id: item_id.to_string() });
        Ok(())
    }
}
