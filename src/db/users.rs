//! User records
//!
//! Users are referenced, never owned, by boards, memberships, assignments
//! and categories. Credentials live outside this crate.

use diesel::prelude::*;
use serde::Deserialize;

use super::diesel_schema::users;
use super::models::{current_timestamp, new_id, NewUser, User};
use crate::error::StorageError;

/// Input for creating a user
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    #[serde(default)]
    pub id: Option<String>,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Partial profile update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UpdateUserInput {
    fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.first_name.is_none() && self.last_name.is_none()
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct UserChanges<'a> {
    username: Option<&'a str>,
    email: Option<String>,
    first_name: Option<&'a str>,
    last_name: Option<&'a str>,
}

pub fn get_user(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<User>, StorageError> {
    users::table
        .filter(users::id.eq(user_id))
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

/// Emails are matched case-insensitively; they are stored lower-cased
pub fn get_user_by_email(conn: &mut SqliteConnection, email: &str) -> Result<Option<User>, StorageError> {
    users::table
        .filter(users::email.eq(email.trim().to_lowercase()))
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

pub fn user_exists(conn: &mut SqliteConnection, user_id: &str) -> Result<bool, StorageError> {
    Ok(get_user(conn, user_id)?.is_some())
}

/// Create a user. Duplicate username or email is a conflict.
pub fn create_user(conn: &mut SqliteConnection, input: CreateUserInput) -> Result<User, StorageError> {
    let id = input.id.unwrap_or_else(new_id);
    let email = input.email.trim().to_lowercase();
    let now = current_timestamp();

    let new_user = NewUser {
        id: &id,
        username: input.username.trim(),
        email: &email,
        first_name: &input.first_name,
        last_name: &input.last_name,
        created_at: &now,
    };

    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(conn)
        .map_err(StorageError::query("User insert"))?;

    get_user(conn, &id)?.ok_or_else(|| StorageError::Internal("Failed to retrieve created user".into()))
}

/// Update a user's profile. Taking another user's username or email is a conflict.
pub fn update_user(
    conn: &mut SqliteConnection,
    user_id: &str,
    input: &UpdateUserInput,
) -> Result<User, StorageError> {
    conn.immediate_transaction(|conn| {
        let existing = get_user(conn, user_id)?.ok_or_else(|| StorageError::not_found("user", user_id))?;
        if input.is_empty() {
            return Ok(existing);
        }

        let changes = UserChanges {
            username: input.username.as_deref().map(str::trim),
            email: input.email.as_deref().map(|e| e.trim().to_lowercase()),
            first_name: input.first_name.as_deref(),
            last_name: input.last_name.as_deref(),
        };
        diesel::update(users::table.filter(users::id.eq(user_id)))
            .set(&changes)
            .execute(conn)
            .map_err(StorageError::query("User update"))?;

        get_user(conn, user_id)?.ok_or_else(|| StorageError::not_found("user", user_id))
    })
}

/// Delete a user; owned boards and categories cascade
pub fn delete_user(conn: &mut SqliteConnection, user_id: &str) -> Result<bool, StorageError> {
    let deleted = diesel::delete(users::table.filter(users::id.eq(user_id)))
        .execute(conn)
        .map_err(|e| StorageError::Internal(format!("Delete failed: {}", e)))?;
    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn input(username: &str, email: &str) -> CreateUserInput {
        CreateUserInput {
            id: None,
            username: username.into(),
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    #[test]
    fn test_create_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();

        let user = create_user(&mut conn, input("ana", "Ana@Example.com")).unwrap();
        assert_eq!(user.email, "ana@example.com");

        let found = get_user_by_email(&mut conn, "ANA@example.com").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(user_exists(&mut conn, &user.id).unwrap());
    }

    #[test]
    fn test_update_profile() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        let user = create_user(&mut conn, input("ana", "ana@example.com")).unwrap();

        let updated = update_user(
            &mut conn,
            &user.id,
            &UpdateUserInput {
                email: Some(" Ana.Silva@Example.com ".into()),
                last_name: Some("Silva".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.email, "ana.silva@example.com");
        assert_eq!(updated.last_name, "Silva");
        assert_eq!(updated.username, "ana");

        let unchanged = update_user(&mut conn, &user.id, &UpdateUserInput::default()).unwrap();
        assert_eq!(unchanged.email, "ana.silva@example.com");

        assert!(matches!(
            update_user(&mut conn, "ghost", &UpdateUserInput::default()),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_to_taken_username_conflicts() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();
        create_user(&mut conn, input("ana", "ana@example.com")).unwrap();
        let ben = create_user(&mut conn, input("ben", "ben@example.com")).unwrap();

        let err = update_user(
            &mut conn,
            &ben.id,
            &UpdateUserInput {
                username: Some("ana".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        assert_eq!(get_user(&mut conn, &ben.id).unwrap().unwrap().username, "ben");
    }

    #[test]
    fn test_duplicate_email_conflicts() {
        let db = Database::open_in_memory().unwrap();
        let mut conn = db.conn().unwrap();

        create_user(&mut conn, input("ana", "ana@example.com")).unwrap();
        let err = create_user(&mut conn, input("ana2", "ana@example.com")).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }
}
