//! Card service - cards within lists, reorder and cross-list moves
//!
//! A card's container lock is chosen from its current list before the
//! transaction starts. If the card moves in between, the transaction reports
//! `Locked::Relocated` and the call retries with fresh locks.

use std::sync::Arc;

use diesel::SqliteConnection;
use tracing::{debug, warn};

use crate::db::cards::{self, CardMove, CreateCardInput, UpdateCardInput};
use crate::db::models::{Card, CardDetails};
use crate::db::{Database, Principal};
use crate::error::StorageError;
use crate::ordering::{Container, ContainerLocks, Locked};

use super::events::{EventBus, StorageEvent};
use super::validation::{optional_text, required_text, TITLE_MAX};

pub struct CardService {
    db: Arc<Database>,
    events: Arc<EventBus>,
    locks: Arc<ContainerLocks>,
    retry_attempts: u32,
}

impl CardService {
    pub fn new(
        db: Arc<Database>,
        events: Arc<EventBus>,
        locks: Arc<ContainerLocks>,
        retry_attempts: u32,
    ) -> Self {
        Self {
            db,
            events,
            locks,
            retry_attempts: retry_attempts.max(1),
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, principal: &Principal, card_id: &str) -> Result<CardDetails, StorageError> {
        self.db.with_conn(|conn| cards::get_card(conn, principal, card_id))
    }

    /// Cards of one list, or of every readable board
    pub fn list(&self, principal: &Principal, list_id: Option<&str>) -> Result<Vec<CardDetails>, StorageError> {
        match list_id {
            Some(list_id) => self.db.with_conn(|conn| cards::list_cards(conn, principal, list_id)),
            None => self.db.with_conn(|conn| cards::list_accessible_cards(conn, principal)),
        }
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    pub fn create(
        &self,
        principal: &Principal,
        list_id: &str,
        input: CreateCardInput,
    ) -> Result<CardDetails, StorageError> {
        self.validate_create(&input)?;

        let card = self.locks.with_locks(&[Container::List(list_id.to_string())], || {
            self.db.with_conn(|conn| cards::create_card(conn, principal, list_id, &input))
        })?;

        self.events.emit(StorageEvent::CardCreated {
            id: card.card.id.clone(),
            list_id: card.card.list_id.clone(),
            position: card.card.position,
        });
        Ok(card)
    }

    pub fn update(
        &self,
        principal: &Principal,
        card_id: &str,
        input: UpdateCardInput,
    ) -> Result<CardDetails, StorageError> {
        self.validate_update(&input)?;

        let card = self
            .db
            .with_conn(|conn| cards::update_card(conn, principal, card_id, &input))?;
        self.events.emit(StorageEvent::CardUpdated { id: card_id.to_string() });
        Ok(card)
    }

    pub fn delete(&self, principal: &Principal, card_id: &str) -> Result<(), StorageError> {
        self.with_card_locks(card_id, None, |conn, list_id| {
            cards::delete_card(conn, principal, card_id, list_id)
        })?;

        self.events.emit(StorageEvent::CardDeleted { id: card_id.to_string() });
        Ok(())
    }

    /// Move a card within its list; returns the list's cards in order
    pub fn reorder(
        &self,
        principal: &Principal,
        card_id: &str,
        new_position: i64,
    ) -> Result<Vec<Card>, StorageError> {
        let ordered = self.with_card_locks(card_id, None, |conn, list_id| {
            cards::reorder_card(conn, principal, card_id, list_id, new_position)
        })?;

        if let Some(card) = ordered.iter().find(|c| c.id == card_id) {
            self.events.emit(StorageEvent::CardReordered {
                id: card_id.to_string(),
                list_id: card.list_id.clone(),
                position: new_position,
            });
        }
        Ok(ordered)
    }

    /// Move a card to another list (or within its own list)
    pub fn move_card(
        &self,
        principal: &Principal,
        card_id: &str,
        new_list_id: &str,
        new_position: i64,
    ) -> Result<CardMove, StorageError> {
        let moved = self.with_card_locks(card_id, Some(new_list_id), |conn, list_id| {
            cards::move_card(conn, principal, card_id, list_id, new_list_id, new_position)
        })?;

        self.events.emit(StorageEvent::CardMoved {
            id: card_id.to_string(),
            from_list_id: moved.source_list_id.clone(),
            to_list_id: moved.destination_list_id.clone(),
            position: new_position,
        });
        Ok(moved)
    }

    /// Run `op` holding the lock of the card's current list (and of
    /// `destination`, when given), retrying when the card moved between
    /// lock selection and the transaction.
    fn with_card_locks<T>(
        &self,
        card_id: &str,
        destination: Option<&str>,
        op: impl Fn(&mut SqliteConnection, &str) -> Result<Locked<T>, StorageError>,
    ) -> Result<T, StorageError> {
        for attempt in 1..=self.retry_attempts {
            let list_id = self
                .db
                .with_conn(|conn| cards::list_of(conn, card_id))?
                .ok_or_else(|| StorageError::not_found("card", card_id))?;

            let mut containers = vec![Container::List(list_id.clone())];
            if let Some(destination) = destination {
                containers.push(Container::List(destination.to_string()));
            }

            let outcome = self
                .locks
                .with_locks(&containers, || self.db.with_conn(|conn| op(conn, &list_id)))?;

            match outcome {
                Locked::Done(value) => return Ok(value),
                Locked::Relocated => {
                    debug!(card_id, attempt, "Card changed list while waiting for its lock");
                }
            }
        }

        warn!(card_id, attempts = self.retry_attempts, "Gave up chasing a moving card");
        Err(StorageError::Conflict(format!(
            "card {} kept moving, retry the operation",
            card_id
        )))
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn validate_create(&self, input: &CreateCardInput) -> Result<(), StorageError> {
        required_text("title", &input.title, TITLE_MAX)?;
        for subtask in &input.subtasks {
            required_text("subtask title", &subtask.title, TITLE_MAX)?;
        }
        for attachment in &input.attachments {
            required_text("attachment name", &attachment.name, 255)?;
        }
        if let Some(pin) = input.location.as_ref() {
            validate_pin(pin)?;
        }
        Ok(())
    }

    fn validate_update(&self, input: &UpdateCardInput) -> Result<(), StorageError> {
        optional_text("title", input.title.as_deref(), TITLE_MAX)?;
        for subtask in input.subtasks.iter().flatten() {
            required_text("subtask title", &subtask.title, TITLE_MAX)?;
        }
        for attachment in input.attachments.iter().flatten() {
            required_text("attachment name", &attachment.name, 255)?;
        }
        if let Some(Some(pin)) = input.location.as_ref() {
            validate_pin(pin)?;
        }
        Ok(())
    }
}

fn validate_pin(pin: &crate::db::models::CardPin) -> Result<(), StorageError> {
    required_text("location name", &pin.name, TITLE_MAX)?;
    if !(-90.0..=90.0).contains(&pin.lat) || !(-180.0..=180.0).contains(&pin.lng) {
        return Err(StorageError::InvalidInput(format!(
            "location ({}, {}) is out of range",
            pin.lat, pin.lng
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{board, list, user};
    use crate::ordering::is_dense;

    struct Fixture {
        cards: Arc<CardService>,
        ana: Principal,
        list_a: String,
        list_b: String,
    }

    fn fixture(db: Database) -> Fixture {
        let db = Arc::new(db);
        let (ana, list_a, list_b) = {
            let mut conn = db.conn().unwrap();
            let ana = user(&mut conn, "ana");
            let b = board(&mut conn, &ana, "Trip");
            let la = list(&mut conn, &ana, &b, "A");
            let lb = list(&mut conn, &ana, &b, "B");
            (ana, la, lb)
        };
        let cards = Arc::new(CardService::new(
            db.clone(),
            Arc::new(EventBus::new()),
            Arc::new(ContainerLocks::new()),
            3,
        ));
        Fixture {
            cards,
            ana,
            list_a,
            list_b,
        }
    }

    fn add(f: &Fixture, list_id: &str, title: &str) -> String {
        f.cards
            .create(
                &f.ana,
                list_id,
                CreateCardInput {
                    title: title.into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .card
            .id
    }

    #[test]
    fn test_move_emits_event() {
        let f = fixture(Database::open_in_memory().unwrap());
        add(&f, &f.list_a, "c1");
        let c2 = add(&f, &f.list_a, "c2");

        let mut rx = f.cards.events.subscribe();
        let moved = f.cards.move_card(&f.ana, &c2, &f.list_b, 0).unwrap();
        assert_eq!(moved.destination_list_id, f.list_b);

        assert_eq!(
            rx.try_recv().unwrap(),
            StorageEvent::CardMoved {
                id: c2,
                from_list_id: f.list_a.clone(),
                to_list_id: f.list_b.clone(),
                position: 0,
            }
        );
    }

    #[test]
    fn test_unknown_card() {
        let f = fixture(Database::open_in_memory().unwrap());
        assert!(matches!(f.cards.reorder(&f.ana, "missing", 0), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_pin_validation() {
        let f = fixture(Database::open_in_memory().unwrap());
        let input = CreateCardInput {
            title: "Bad pin".into(),
            location: Some(crate::db::models::CardPin {
                name: "Nowhere".into(),
                lat: 95.0,
                lng: 0.0,
            }),
            ..Default::default()
        };
        assert!(matches!(f.cards.create(&f.ana, &f.list_a, input), Err(StorageError::InvalidInput(_))));
    }

    #[test]
    fn test_concurrent_moves_keep_both_lists_dense() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(Database::open_path(&dir.path().join("t.db"), 4, 5000).unwrap());
        let ids: Vec<String> = (0..8).map(|i| add(&f, &f.list_a, &format!("c{}", i))).collect();

        let handles: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let cards = f.cards.clone();
                let ana = f.ana.clone();
                let id = id.clone();
                let (a, b) = (f.list_a.clone(), f.list_b.clone());
                std::thread::spawn(move || {
                    let to = if i % 2 == 0 { &b } else { &a };
                    cards.move_card(&ana, &id, to, 0).unwrap();
                    cards.reorder(&ana, &id, (i % 3) as i64).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for list_id in [&f.list_a, &f.list_b] {
            let positions: Vec<i32> = f
                .cards
                .list(&f.ana, Some(list_id))
                .unwrap()
                .iter()
                .map(|c| c.card.position)
                .collect();
            assert!(is_dense(&positions), "list {} not dense: {:?}", list_id, positions);
        }
        assert_eq!(f.cards.list(&f.ana, None).unwrap().len(), 8);
    }
}
