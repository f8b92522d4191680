//! Map service - one geo location per card

use std::sync::Arc;

use crate::db::map_locations::{self, CreateMapLocationInput, UpdateMapLocationInput};
use crate::db::models::MapLocation;
use crate::db::{Database, Principal};
use crate::error::StorageError;

use super::events::{EventBus, StorageEvent};
use super::validation::{optional_text, required_text, TITLE_MAX};

pub struct MapService {
    db: Arc<Database>,
    events: Arc<EventBus>,
}

impl MapService {
    pub fn new(db: Arc<Database>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    pub fn get(&self, principal: &Principal, location_id: &str) -> Result<MapLocation, StorageError> {
        self.db
            .with_conn(|conn| map_locations::get_map_location(conn, principal, location_id))
    }

    pub fn for_card(&self, principal: &Principal, card_id: &str) -> Result<Option<MapLocation>, StorageError> {
        self.db
            .with_conn(|conn| map_locations::get_card_location(conn, principal, card_id))
    }

    pub fn list(&self, principal: &Principal, board_id: Option<&str>) -> Result<Vec<MapLocation>, StorageError> {
        self.db
            .with_conn(|conn| map_locations::list_map_locations(conn, principal, board_id))
    }

    pub fn create(&self, principal: &Principal, input: CreateMapLocationInput) -> Result<MapLocation, StorageError> {
        required_text("name", &input.name, TITLE_MAX)?;
        optional_text("address", input.address.as_deref(), 500)?;

        let location = self
            .db
            .with_conn(|conn| map_locations::create_map_location(conn, principal, &input))?;

        self.events.emit(StorageEvent::MapLocationCreated {
            id: location.id.clone(),
            card_id: location.card_id.clone(),
        });
        Ok(location)
    }

    pub fn update(
        &self,
        principal: &Principal,
        location_id: &str,
        input: UpdateMapLocationInput,
    ) -> Result<MapLocation, StorageError> {
        optional_text("name", input.name.as_deref(), TITLE_MAX)?;
        if let Some(Some(address)) = input.address.as_ref() {
            required_text("address", address, 500)?;
        }

        let location = self
            .db
            .with_conn(|conn| map_locations::update_map_location(conn, principal, location_id, &input))?;
        self.events.emit(StorageEvent::MapLocationUpdated { id: location_id.to_string() });
        Ok(location)
    }

    pub fn delete(&self, principal: &Principal, location_id: &str) -> Result<(), StorageError> {
        self.db
            .with_conn(|conn| map_locations::delete_map_location(conn, principal, location_id))?;
        self.events.emit(StorageEvent::MapLocationDeleted { id: location_id.to_string() });
        Ok(())
    }
}
