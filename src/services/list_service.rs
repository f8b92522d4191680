//! List service - lists within a board
//!
//! Every position-changing call holds the board's container lock for the
//! duration of its transaction.

use std::sync::Arc;

use crate::db::lists::{self, CreateListInput, UpdateListInput};
use crate::db::models::BoardList;
use crate::db::{Database, Principal};
use crate::error::StorageError;
use crate::ordering::{Container, ContainerLocks};

use super::events::{EventBus, StorageEvent};
use super::validation::{optional_text, required_text, COLOR_MAX, TITLE_MAX};

pub struct ListService {
    db: Arc<Database>,
    events: Arc<EventBus>,
    locks: Arc<ContainerLocks>,
}

impl ListService {
    pub fn new(db: Arc<Database>, events: Arc<EventBus>, locks: Arc<ContainerLocks>) -> Self {
        Self { db, events, locks }
    }

    pub fn get(&self, principal: &Principal, list_id: &str) -> Result<BoardList, StorageError> {
        self.db.with_conn(|conn| lists::get_list(conn, principal, list_id))
    }

    /// Lists of one board, or of every readable board
    pub fn list(&self, principal: &Principal, board_id: Option<&str>) -> Result<Vec<BoardList>, StorageError> {
        match board_id {
            Some(board_id) => self.db.with_conn(|conn| lists::list_lists(conn, principal, board_id)),
            None => self.db.with_conn(|conn| lists::list_accessible_lists(conn, principal)),
        }
    }

    pub fn create(
        &self,
        principal: &Principal,
        board_id: &str,
        input: CreateListInput,
    ) -> Result<BoardList, StorageError> {
        required_text("title", &input.title, TITLE_MAX)?;
        optional_text("color", input.color.as_deref(), COLOR_MAX)?;

        let list = self.locks.with_locks(&[Container::Board(board_id.to_string())], || {
            self.db.with_conn(|conn| lists::create_list(conn, principal, board_id, &input))
        })?;

        self.events.emit(StorageEvent::ListCreated {
            id: list.id.clone(),
            board_id: list.board_id.clone(),
            position: list.position,
        });
        Ok(list)
    }

    pub fn update(
        &self,
        principal: &Principal,
        list_id: &str,
        input: UpdateListInput,
    ) -> Result<BoardList, StorageError> {
        optional_text("title", input.title.as_deref(), TITLE_MAX)?;
        optional_text("color", input.color.as_deref(), COLOR_MAX)?;

        let list = self
            .db
            .with_conn(|conn| lists::update_list(conn, principal, list_id, &input))?;
        self.events.emit(StorageEvent::ListUpdated { id: list_id.to_string() });
        Ok(list)
    }

    pub fn delete(&self, principal: &Principal, list_id: &str) -> Result<(), StorageError> {
        let board_id = self.board_of(list_id)?;

        self.locks.with_locks(&[Container::Board(board_id)], || {
            self.db.with_conn(|conn| lists::delete_list(conn, principal, list_id))
        })?;

        self.events.emit(StorageEvent::ListDeleted { id: list_id.to_string() });
        Ok(())
    }

    /// Move a list within its board; returns the board's lists in order
    pub fn reorder(
        &self,
        principal: &Principal,
        list_id: &str,
        new_position: i64,
    ) -> Result<Vec<BoardList>, StorageError> {
        let board_id = self.board_of(list_id)?;

        let ordered = self.locks.with_locks(&[Container::Board(board_id.clone())], || {
            self.db
                .with_conn(|conn| lists::reorder_list(conn, principal, list_id, new_position))
        })?;

        self.events.emit(StorageEvent::ListReordered {
            id: list_id.to_string(),
            board_id,
            position: new_position,
        });
        Ok(ordered)
    }

    /// A list never changes board, so its lock key is stable
    fn board_of(&self, list_id: &str) -> Result<String, StorageError> {
        self.db
            .with_conn(|conn| lists::board_of(conn, list_id))?
            .ok_or_else(|| StorageError::not_found("list", list_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{board, user};
    use crate::ordering::is_dense;

    #[test]
    fn test_concurrent_reorders_stay_dense() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_path(&dir.path().join("t.db"), 4, 5000).unwrap());
        let (ana, b) = {
            let mut conn = db.conn().unwrap();
            let ana = user(&mut conn, "ana");
            let b = board(&mut conn, &ana, "Trip");
            (ana, b)
        };

        let service = Arc::new(ListService::new(
            db.clone(),
            Arc::new(EventBus::new()),
            Arc::new(ContainerLocks::new()),
        ));
        let ids: Vec<String> = (0..6)
            .map(|i| {
                service
                    .create(
                        &ana,
                        &b,
                        CreateListInput {
                            title: format!("L{}", i),
                            ..Default::default()
                        },
                    )
                    .unwrap()
                    .id
            })
            .collect();

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let service = service.clone();
                let ana = ana.clone();
                let id = ids[i].clone();
                std::thread::spawn(move || {
                    for round in 0..5 {
                        service.reorder(&ana, &id, ((i + round) % 6) as i64).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let positions: Vec<i32> = service.list(&ana, Some(&b)).unwrap().iter().map(|l| l.position).collect();
        assert_eq!(positions.len(), 6);
        assert!(is_dense(&positions));
    }

    #[test]
    fn test_reorder_unknown_list() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ana = user(&mut db.conn().unwrap(), "ana");
        let service = ListService::new(db, Arc::new(EventBus::new()), Arc::new(ContainerLocks::new()));
        assert!(matches!(service.reorder(&ana, "missing", 0), Err(StorageError::NotFound(_))));
    }
}
