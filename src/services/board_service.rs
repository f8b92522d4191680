//! Board service - board CRUD and membership
//!
//! Validates input, applies the configured default currency and emits
//! events for committed changes.

use std::sync::Arc;

use tracing::info;

use crate::budget::normalize_currency;
use crate::db::boards::{self, BoardQuery, CreateBoardInput, UpdateBoardInput};
use crate::db::models::BoardWithMembers;
use crate::db::{Database, Principal};
use crate::error::StorageError;

use super::events::{EventBus, StorageEvent};
use super::validation::{date_order, optional_text, required_text, TITLE_MAX};

pub struct BoardService {
    db: Arc<Database>,
    events: Arc<EventBus>,
    default_currency: String,
}

impl BoardService {
    pub fn new(db: Arc<Database>, events: Arc<EventBus>, default_currency: &str) -> Self {
        Self {
            db,
            events,
            default_currency: default_currency.to_string(),
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, principal: &Principal, board_id: &str) -> Result<BoardWithMembers, StorageError> {
        self.db.with_conn(|conn| boards::get_board(conn, principal, board_id))
    }

    /// Boards owned by or shared with the principal
    pub fn list(&self, principal: &Principal, query: &BoardQuery) -> Result<Vec<BoardWithMembers>, StorageError> {
        if query.limit < 0 || query.offset < 0 {
            return Err(StorageError::InvalidInput("limit and offset must be >= 0".into()));
        }
        self.db.with_conn(|conn| boards::list_boards(conn, principal, query))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    pub fn create(&self, principal: &Principal, input: CreateBoardInput) -> Result<BoardWithMembers, StorageError> {
        self.validate_create(&input)?;
        let currency = normalize_currency(input.currency.as_deref().unwrap_or(&self.default_currency))?;

        let board = self
            .db
            .with_conn(|conn| boards::create_board(conn, principal, &input, &currency))?;

        info!(board_id = %board.board.id, owner = %principal.user_id(), "Board created");
        self.events.emit(StorageEvent::BoardCreated {
            id: board.board.id.clone(),
            title: board.board.title.clone(),
            owner_id: board.board.owner_id.clone(),
        });
        Ok(board)
    }

    pub fn update(
        &self,
        principal: &Principal,
        board_id: &str,
        input: UpdateBoardInput,
    ) -> Result<BoardWithMembers, StorageError> {
        self.validate_update(&input)?;

        let board = self
            .db
            .with_conn(|conn| boards::update_board(conn, principal, board_id, &input))?;

        self.events.emit(StorageEvent::BoardUpdated { id: board_id.to_string() });
        Ok(board)
    }

    /// Delete a board with all of its content
    pub fn delete(&self, principal: &Principal, board_id: &str) -> Result<(), StorageError> {
        self.db.with_conn(|conn| boards::delete_board(conn, principal, board_id))?;

        info!(board_id, "Board deleted");
        self.events.emit(StorageEvent::BoardDeleted { id: board_id.to_string() });
        Ok(())
    }

    // =========================================================================
    // Membership
    // =========================================================================

    pub fn add_member(
        &self,
        principal: &Principal,
        board_id: &str,
        user_id: &str,
    ) -> Result<BoardWithMembers, StorageError> {
        let (board, added) = self
            .db
            .with_conn(|conn| boards::add_member(conn, principal, board_id, user_id))?;

        if added {
            self.events.emit(StorageEvent::MemberAdded {
                board_id: board_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(board)
    }

    /// Invite an existing user by email
    pub fn invite(
        &self,
        principal: &Principal,
        board_id: &str,
        email: &str,
    ) -> Result<BoardWithMembers, StorageError> {
        required_text("email", email, 254)?;

        let before = self.get(principal, board_id)?.members;
        let (board, added) = self
            .db
            .with_conn(|conn| boards::add_member_by_email(conn, principal, board_id, email))?;
        if !added {
            return Ok(board);
        }

        for user_id in board.members.iter().filter(|m| !before.contains(m)) {
            self.events.emit(StorageEvent::MemberAdded {
                board_id: board_id.to_string(),
                user_id: user_id.clone(),
            });
        }
        Ok(board)
    }

    pub fn remove_member(
        &self,
        principal: &Principal,
        board_id: &str,
        user_id: &str,
    ) -> Result<BoardWithMembers, StorageError> {
        let (board, removed) = self
            .db
            .with_conn(|conn| boards::remove_member(conn, principal, board_id, user_id))?;

        if removed {
            self.events.emit(StorageEvent::MemberRemoved {
                board_id: board_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(board)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn validate_create(&self, input: &CreateBoardInput) -> Result<(), StorageError> {
        required_text("title", &input.title, TITLE_MAX)?;
        optional_text("cover_image", input.cover_image.as_deref(), 500)?;
        date_order("start_date", input.start_date, "end_date", input.end_date)?;
        validate_tags(&input.tags)
    }

    fn validate_update(&self, input: &UpdateBoardInput) -> Result<(), StorageError> {
        optional_text("title", input.title.as_deref(), TITLE_MAX)?;
        if let Some(Some(cover)) = input.cover_image.as_ref() {
            required_text("cover_image", cover, 500)?;
        }
        if let (Some(start), Some(end)) = (input.start_date, input.end_date) {
            date_order("start_date", start, "end_date", end)?;
        }
        match input.tags.as_deref() {
            Some(tags) => validate_tags(tags),
            None => Ok(()),
        }
    }
}

fn validate_tags(tags: &[String]) -> Result<(), StorageError> {
    for tag in tags {
        required_text("tag", tag, 50)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::user;
    use rust_decimal::Decimal;

    fn setup() -> (BoardService, Arc<EventBus>, Principal) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ana = user(&mut db.conn().unwrap(), "ana");
        let events = Arc::new(EventBus::new());
        (BoardService::new(db, events.clone(), "USD"), events, ana)
    }

    #[test]
    fn test_default_currency_and_event() {
        let (boards, events, ana) = setup();
        let mut rx = events.subscribe();

        let board = boards
            .create(
                &ana,
                CreateBoardInput {
                    title: "Oslo".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(board.board.currency, "USD");

        match rx.try_recv().unwrap() {
            StorageEvent::BoardCreated { id, owner_id, .. } => {
                assert_eq!(id, board.board.id);
                assert_eq!(owner_id, ana.user_id());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_create_validation() {
        let (boards, _, ana) = setup();

        let blank = CreateBoardInput {
            title: " ".into(),
            ..Default::default()
        };
        assert!(matches!(boards.create(&ana, blank), Err(StorageError::InvalidInput(_))));

        let bad_currency = CreateBoardInput {
            title: "Oslo".into(),
            currency: Some("KRONE".into()),
            ..Default::default()
        };
        assert!(matches!(boards.create(&ana, bad_currency), Err(StorageError::InvalidInput(_))));

        let negative = CreateBoardInput {
            title: "Oslo".into(),
            budget: Decimal::from(-5),
            ..Default::default()
        };
        assert!(matches!(boards.create(&ana, negative), Err(StorageError::InvalidInput(_))));

        let inverted = CreateBoardInput {
            title: "Oslo".into(),
            start_date: chrono::NaiveDate::from_ymd_opt(2026, 6, 2),
            end_date: chrono::NaiveDate::from_ymd_opt(2026, 6, 1),
            ..Default::default()
        };
        assert!(matches!(boards.create(&ana, inverted), Err(StorageError::InvalidInput(_))));
    }

    #[test]
    fn test_lowercase_currency_normalized() {
        let (boards, _, ana) = setup();
        let board = boards
            .create(
                &ana,
                CreateBoardInput {
                    title: "Oslo".into(),
                    currency: Some("nok".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(board.board.currency, "NOK");
    }

    #[test]
    fn test_membership_events_only_on_change() {
        let (boards, events, ana) = setup();
        let ben = user(&mut boards.db.conn().unwrap(), "ben");
        let board_id = boards
            .create(
                &ana,
                CreateBoardInput {
                    title: "Oslo".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .board
            .id;
        let mut rx = events.subscribe();

        boards.add_member(&ana, &board_id, ben.user_id()).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), StorageEvent::MemberAdded { .. }));

        boards.add_member(&ana, &board_id, ben.user_id()).unwrap();
        boards.invite(&ana, &board_id, "ben@example.com").unwrap();
        assert!(rx.try_recv().is_err());

        boards.remove_member(&ana, &board_id, ben.user_id()).unwrap();
        match rx.try_recv().unwrap() {
            StorageEvent::MemberRemoved { board_id: b, user_id } => {
                assert_eq!(b, board_id);
                assert_eq!(user_id, ben.user_id());
            }
            other => panic!("unexpected event {:?}", other),
        }

        boards.remove_member(&ana, &board_id, ben.user_id()).unwrap();
        assert!(rx.try_recv().is_err());
    }
}
