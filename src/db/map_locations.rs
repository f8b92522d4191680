//! Geo locations attached to cards, at most one per card

use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use super::diesel_schema::{cards, lists, map_locations};
use super::governance::{accessible_board_ids, require};
use super::models::{current_timestamp, new_id, MapLocation, NewMapLocation};
use super::principal::Principal;
use crate::access::{Intent, Target};
use crate::error::StorageError;

/// Fractional digits kept for coordinates
pub const COORDINATE_SCALE: u32 = 6;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMapLocationInput {
    pub card_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub latitude: Decimal,
    pub longitude: Decimal,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMapLocationInput {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub address: Option<Option<String>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = map_locations)]
struct MapLocationChanges<'a> {
    name: Option<&'a str>,
    description: Option<Option<&'a str>>,
    latitude: Option<String>,
    longitude: Option<String>,
    address: Option<Option<&'a str>>,
    updated_at: &'a str,
}

/// Validate a coordinate against `[-limit, limit]` and render it with six places
pub fn coordinate(field: &str, value: Decimal, limit: i64) -> Result<String, StorageError> {
    let limit = Decimal::from(limit);
    if value < -limit || value > limit {
        return Err(StorageError::InvalidInput(format!(
            "{} must be between {} and {}, got {}",
            field, -limit, limit, value
        )));
    }
    let mut rendered = value.normalize();
    if rendered.scale() > COORDINATE_SCALE {
        return Err(StorageError::InvalidInput(format!(
            "{} must have at most {} decimal places",
            field, COORDINATE_SCALE
        )));
    }
    rendered.rescale(COORDINATE_SCALE);
    Ok(rendered.to_string())
}

fn latitude(value: Decimal) -> Result<String, StorageError> {
    coordinate("latitude", value, 90)
}

fn longitude(value: Decimal) -> Result<String, StorageError> {
    coordinate("longitude", value, 180)
}

fn load_location(conn: &mut SqliteConnection, location_id: &str) -> Result<MapLocation, StorageError> {
    map_locations::table
        .filter(map_locations::id.eq(location_id))
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))?
        .ok_or_else(|| StorageError::not_found("map location", location_id))
}

pub fn get_map_location(
    conn: &mut SqliteConnection,
    principal: &Principal,
    location_id: &str,
) -> Result<MapLocation, StorageError> {
    require(conn, principal, &Target::MapLocation(location_id.to_string()), Intent::Read)?;
    load_location(conn, location_id)
}

/// Location of one card, if it has one
pub fn get_card_location(
    conn: &mut SqliteConnection,
    principal: &Principal,
    card_id: &str,
) -> Result<Option<MapLocation>, StorageError> {
    require(conn, principal, &Target::Card(card_id.to_string()), Intent::Read)?;
    map_locations::table
        .filter(map_locations::card_id.eq(card_id))
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

/// Locations on every board the principal can read, newest first
pub fn list_map_locations(
    conn: &mut SqliteConnection,
    principal: &Principal,
    board_id: Option<&str>,
) -> Result<Vec<MapLocation>, StorageError> {
    let visible = match board_id {
        Some(id) => {
            require(conn, principal, &Target::Board(id.to_string()), Intent::Read)?;
            vec![id.to_string()]
        }
        None => accessible_board_ids(conn, principal)?,
    };

    map_locations::table
        .inner_join(cards::table.inner_join(lists::table))
        .filter(lists::board_id.eq_any(&visible))
        .order((map_locations::created_at.desc(), map_locations::id.asc()))
        .select(MapLocation::as_select())
        .load(conn)
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

/// Attach a location to a card. A card that already has one is a conflict
/// and keeps its existing location.
pub fn create_map_location(
    conn: &mut SqliteConnection,
    principal: &Principal,
    input: &CreateMapLocationInput,
) -> Result<MapLocation, StorageError> {
    let lat = latitude(input.latitude)?;
    let lng = longitude(input.longitude)?;

    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::Card(input.card_id.clone()), Intent::Write)?;

        let existing: i64 = map_locations::table
            .filter(map_locations::card_id.eq(&input.card_id))
            .count()
            .get_result(conn)
            .map_err(|e| StorageError::Internal(format!("Count query failed: {}", e)))?;
        if existing > 0 {
            return Err(StorageError::Conflict(format!("card {} already has a map location", input.card_id)));
        }

        let id = new_id();
        let now = current_timestamp();
        diesel::insert_into(map_locations::table)
            .values(&NewMapLocation {
                id: &id,
                card_id: &input.card_id,
                name: &input.name,
                description: input.description.as_deref(),
                latitude: &lat,
                longitude: &lng,
                address: input.address.as_deref(),
                created_at: &now,
                updated_at: &now,
            })
            .execute(conn)
            .map_err(StorageError::query("Map location insert"))?;

        debug!(location_id = %id, card_id = %input.card_id, "Map location created");
        load_location(conn, &id)
    })
}

pub fn update_map_location(
    conn: &mut SqliteConnection,
    principal: &Principal,
    location_id: &str,
    input: &UpdateMapLocationInput,
) -> Result<MapLocation, StorageError> {
    let lat = input.latitude.map(latitude).transpose()?;
    let lng = input.longitude.map(longitude).transpose()?;

    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::MapLocation(location_id.to_string()), Intent::Write)?;

        let now = current_timestamp();
        diesel::update(map_locations::table.filter(map_locations::id.eq(location_id)))
            .set(&MapLocationChanges {
                name: input.name.as_deref(),
                description: input.description.as_ref().map(|d| d.as_deref()),
                latitude: lat,
                longitude: lng,
                address: input.address.as_ref().map(|a| a.as_deref()),
                updated_at: &now,
            })
            .execute(conn)
            .map_err(StorageError::query("Map location update"))?;

        load_location(conn, location_id)
    })
}

pub fn delete_map_location(
    conn: &mut SqliteConnection,
    principal: &Principal,
    location_id: &str,
) -> Result<(), StorageError> {
    conn.immediate_transaction(|conn| {
        require(conn, principal, &Target::MapLocation(location_id.to_string()), Intent::Write)?;
        diesel::delete(map_locations::table.filter(map_locations::id.eq(location_id)))
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Delete failed: {}", e)))?;
        Ok(())
    })
}
