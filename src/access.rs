//! Access control evaluator
//!
//! Every board-scoped entity is governed by exactly one board. The decision
//! rule is evaluated against that board only:
//!
//! | intent | owner | member | anyone else |
//! |--------|-------|--------|-------------|
//! | read   | allow | allow  | deny        |
//! | write  | allow | deny   | deny        |
//!
//! Callers must not leak existence: a principal that cannot read the board
//! gets `NotFound`, never `Forbidden`. See [`enforce`].

use serde::Serialize;

use crate::db::Principal;
use crate::error::StorageError;

/// What the principal intends to do with the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Read,
    /// Create, update, delete, reorder, move, membership changes
    Write,
}

/// Evaluator result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessDecision {
    Allow,
    Deny,
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }
}

/// Entity whose governing board decides access
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Board(String),
    List(String),
    Card(String),
    Budget(String),
    BudgetItem(String),
    MapLocation(String),
    Expense(String),
}

impl Target {
    pub fn kind(&self) -> &'static str {
        match self {
            Target::Board(_) => "board",
            Target::List(_) => "list",
            Target::Card(_) => "card",
            Target::Budget(_) => "budget",
            Target::BudgetItem(_) => "budget item",
            Target::MapLocation(_) => "map location",
            Target::Expense(_) => "expense",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Target::Board(id)
            | Target::List(id)
            | Target::Card(id)
            | Target::Budget(id)
            | Target::BudgetItem(id)
            | Target::MapLocation(id)
            | Target::Expense(id) => id,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// Ownership facts of a governing board, loaded from storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardAccess {
    pub board_id: String,
    pub owner_id: String,
    pub members: Vec<String>,
}

impl BoardAccess {
    pub fn is_owner(&self, principal: &Principal) -> bool {
        principal.is(&self.owner_id)
    }

    pub fn is_member(&self, principal: &Principal) -> bool {
        self.members.iter().any(|m| principal.is(m))
    }

    /// Whether `user_id` may be assigned to the board's cards
    pub fn includes(&self, user_id: &str) -> bool {
        self.owner_id == user_id || self.members.iter().any(|m| m == user_id)
    }
}

/// Pure decision function over loaded state
pub fn authorize(principal: &Principal, access: &BoardAccess, intent: Intent) -> AccessDecision {
    let allowed = match intent {
        Intent::Read => access.is_owner(principal) || access.is_member(principal),
        Intent::Write => access.is_owner(principal),
    };

    if allowed {
        AccessDecision::Allow
    } else {
        AccessDecision::Deny
    }
}

/// Decide for a target whose governing board may not exist.
/// An unresolvable target is always denied.
pub fn authorize_resolved(
    principal: &Principal,
    access: Option<&BoardAccess>,
    intent: Intent,
) -> AccessDecision {
    match access {
        Some(access) => authorize(principal, access, intent),
        None => AccessDecision::Deny,
    }
}

/// Turn a decision into the error a caller surfaces.
///
/// Unreadable targets become `NotFound` so their existence is not revealed;
/// readable but unwritable targets become `Forbidden`.
pub fn enforce(
    principal: &Principal,
    access: &BoardAccess,
    intent: Intent,
    target: &Target,
) -> Result<(), StorageError> {
    if authorize(principal, access, intent).is_allowed() {
        return Ok(());
    }

    if intent == Intent::Write && authorize(principal, access, Intent::Read).is_allowed() {
        return Err(StorageError::Forbidden(format!(
            "only the board owner may modify {}",
            target
        )));
    }

    Err(StorageError::NotFound(target.to_string()))
}
