//! Principal passed to every database operation
//!
//! There is no ambient "current user": each operation receives the
//! authenticated identity explicitly and scopes its queries by it.

/// Authenticated user on whose behalf an operation runs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    /// User id as stored in the `users` table
    pub user_id: String,
}

impl Principal {
    /// Create a principal for the given user id
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// Get the user id as a string reference
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Principal({})", self.user_id)
    }
}
