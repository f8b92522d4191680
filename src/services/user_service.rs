//! User service - identity records and principal resolution

use std::sync::Arc;

use tracing::info;

use crate::db::models::User;
use crate::db::users::{self, CreateUserInput, UpdateUserInput};
use crate::db::{Database, Principal};
use crate::error::StorageError;

use super::events::{EventBus, StorageEvent};
use super::validation::{bounded_text, required_text, USERNAME_MAX};

pub struct UserService {
    db: Arc<Database>,
    events: Arc<EventBus>,
}

impl UserService {
    pub fn new(db: Arc<Database>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Turn an authenticated user id into a principal.
    /// Unknown ids are an authentication failure, not a missing resource.
    pub fn resolve_principal(&self, user_id: &str) -> Result<Principal, StorageError> {
        match self.db.with_conn(|conn| users::get_user(conn, user_id))? {
            Some(user) => Ok(Principal::new(user.id)),
            None => Err(StorageError::Auth(format!("unknown user {}", user_id))),
        }
    }

    pub fn get(&self, user_id: &str) -> Result<User, StorageError> {
        self.db
            .with_conn(|conn| users::get_user(conn, user_id))?
            .ok_or_else(|| StorageError::not_found("user", user_id))
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        self.db.with_conn(|conn| users::get_user_by_email(conn, email))
    }

    pub fn create(&self, input: CreateUserInput) -> Result<User, StorageError> {
        self.validate(&input)?;

        let user = self.db.with_conn(|conn| users::create_user(conn, input))?;
        info!(user_id = %user.id, username = %user.username, "User created");

        self.events.emit(StorageEvent::UserCreated {
            id: user.id.clone(),
            username: user.username.clone(),
        });
        Ok(user)
    }

    /// Partial profile update
    pub fn update(&self, user_id: &str, input: UpdateUserInput) -> Result<User, StorageError> {
        self.validate_update(&input)?;

        let user = self.db.with_conn(|conn| users::update_user(conn, user_id, &input))?;
        info!(user_id = %user.id, "User updated");

        self.events.emit(StorageEvent::UserUpdated { id: user.id.clone() });
        Ok(user)
    }

    /// Delete a user with every board and category they own
    pub fn delete(&self, user_id: &str) -> Result<bool, StorageError> {
        let deleted = self.db.with_conn(|conn| users::delete_user(conn, user_id))?;
        if deleted {
            self.events.emit(StorageEvent::UserDeleted { id: user_id.to_string() });
        }
        Ok(deleted)
    }

    fn validate(&self, input: &CreateUserInput) -> Result<(), StorageError> {
        required_text("username", &input.username, USERNAME_MAX)?;
        required_text("email", &input.email, 254)?;
        bounded_text("first_name", &input.first_name, USERNAME_MAX)?;
        bounded_text("last_name", &input.last_name, USERNAME_MAX)?;
        check_email(&input.email)
    }

    fn validate_update(&self, input: &UpdateUserInput) -> Result<(), StorageError> {
        if let Some(username) = &input.username {
            required_text("username", username, USERNAME_MAX)?;
        }
        if let Some(email) = &input.email {
            required_text("email", email, 254)?;
            check_email(email)?;
        }
        if let Some(first_name) = &input.first_name {
            bounded_text("first_name", first_name, USERNAME_MAX)?;
        }
        if let Some(last_name) = &input.last_name {
            bounded_text("last_name", last_name, USERNAME_MAX)?;
        }
        Ok(())
    }
}

fn check_email(email: &str) -> Result<(), StorageError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(StorageError::InvalidInput(format!("'{}' is not a valid email", email))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> UserService {
        UserService::new(Arc::new(Database::open_in_memory().unwrap()), Arc::new(EventBus::new()))
    }

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
    fn test_resolve_principal() {
        let users = service();
        let ana = users.create(input("ana", "ana@example.com")).unwrap();

        assert_eq!(users.resolve_principal(&ana.id).unwrap().user_id(), ana.id);
        assert!(matches!(users.resolve_principal("nobody"), Err(StorageError::Auth(_))));
    }

    #[test]
    fn test_email_validation() {
        let users = service();
        assert!(matches!(users.create(input("ana", "ana")), Err(StorageError::InvalidInput(_))));
        assert!(matches!(users.create(input("ana", "@example.com")), Err(StorageError::InvalidInput(_))));
        assert!(matches!(users.create(input("", "ana@example.com")), Err(StorageError::InvalidInput(_))));
    }

    #[test]
    fn test_update_profile_emits_event() {
        let users = service();
        let ana = users.create(input("ana", "ana@example.com")).unwrap();
        let mut rx = users.events.subscribe();

        let updated = users
            .update(
                &ana.id,
                UpdateUserInput {
                    first_name: Some("Ana".into()),
                    email: Some("ana@trips.example.com".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.first_name, "Ana");
        assert_eq!(users.find_by_email("ANA@trips.example.com").unwrap().unwrap().id, ana.id);

        match rx.try_recv().unwrap() {
            StorageEvent::UserUpdated { id } => assert_eq!(id, ana.id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_update_to_taken_email_conflicts() {
        let users = service();
        users.create(input("ana", "ana@example.com")).unwrap();
        let ben = users.create(input("ben", "ben@example.com")).unwrap();

        let taken = UpdateUserInput {
            email: Some("ANA@example.com".into()),
            ..Default::default()
        };
        assert!(matches!(users.update(&ben.id, taken), Err(StorageError::Conflict(_))));
        assert_eq!(users.get(&ben.id).unwrap().email, "ben@example.com");

        let malformed = UpdateUserInput {
            email: Some("ben".into()),
            ..Default::default()
        };
        assert!(matches!(users.update(&ben.id, malformed), Err(StorageError::InvalidInput(_))));
    }
}
