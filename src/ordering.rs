//! Ordering engine for lists within a board and cards within a list
//!
//! Siblings are handled as id sequences in display order. Every mutation
//! produces a full new sequence which is renumbered `0..n-1`; only rows whose
//! stored position changed are written back.
//!
//! Position mutations on a container also hold that container's lock from
//! [`ContainerLocks`] for the whole transaction.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;

use crate::error::StorageError;

/// Immediate ordering scope of an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Container {
    /// Lists of a board
    Board(String),
    /// Cards of a list
    List(String),
}

/// Reject negative positions and convert to an index
fn index_from(position: i64) -> Result<usize, StorageError> {
    usize::try_from(position)
        .map_err(|_| StorageError::InvalidInput(format!("position must be >= 0, got {}", position)))
}

/// Move `id` to `new_position` among `siblings`.
///
/// The target position is clamped to the last slot. `siblings` must contain `id`.
pub fn reorder(siblings: &[String], id: &str, new_position: i64) -> Result<Vec<String>, StorageError> {
    let target = index_from(new_position)?;

    let current = siblings
        .iter()
        .position(|s| s == id)
        .ok_or_else(|| StorageError::Internal(format!("{} is not in its container", id)))?;

    let mut ordered = siblings.to_vec();
    let moving = ordered.remove(current);
    let target = target.min(ordered.len());
    ordered.insert(target, moving);
    Ok(ordered)
}

/// Remove `id`, closing the gap behind it
pub fn remove(siblings: &[String], id: &str) -> Vec<String> {
    siblings.iter().filter(|s| *s != id).cloned().collect()
}

/// Insert `id` at `position`, opening a gap.
///
/// Appending (`position == len`) is allowed; anything further is rejected
/// rather than clamped.
pub fn insert(siblings: &[String], id: &str, position: i64) -> Result<Vec<String>, StorageError> {
    let target = index_from(position)?;
    if target > siblings.len() {
        return Err(StorageError::InvalidInput(format!(
            "position {} out of range, container holds {} entries",
            position,
            siblings.len()
        )));
    }

    let mut ordered = siblings.to_vec();
    ordered.insert(target, id.to_string());
    Ok(ordered)
}

/// Dense positions for an ordered sequence
pub fn assign(ordered: &[String]) -> Vec<(String, i32)> {
    ordered
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i as i32))
        .collect()
}

/// Rows whose stored position differs from their dense position in `ordered`.
/// Ids missing from `current` (newly inserted) are always included.
pub fn changes(current: &[(String, i32)], ordered: &[String]) -> Vec<(String, i32)> {
    assign(ordered)
        .into_iter()
        .filter(|(id, position)| {
            current
                .iter()
                .find(|(existing, _)| existing == id)
                .map(|(_, stored)| stored != position)
                .unwrap_or(true)
        })
        .collect()
}

/// True when positions are exactly `0..n-1` in sequence order
pub fn is_dense(positions: &[i32]) -> bool {
    positions.iter().enumerate().all(|(i, p)| *p as usize == i)
}

/// Per-container locks
///
/// Locks are created on first use and never held across containers except
/// through [`ContainerLocks::with_locks`], which acquires in sorted order.
#[derive(Default)]
pub struct ContainerLocks {
    locks: DashMap<Container, Arc<Mutex<()>>>,
}

impl ContainerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the locks of every container in `containers`
    pub fn with_locks<T>(&self, containers: &[Container], f: impl FnOnce() -> T) -> T {
        let mut keys = containers.to_vec();
        keys.sort();
        keys.dedup();

        let mutexes: Vec<Arc<Mutex<()>>> = keys
            .into_iter()
            .map(|key| Arc::clone(&self.locks.entry(key).or_default()))
            .collect();

        // Poisoned locks are reused; guarded work is transactional.
        let _guards: Vec<MutexGuard<'_, ()>> = mutexes
            .iter()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
            .collect();

        f()
    }

    /// Number of containers that have been locked at least once
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Outcome of a card operation run under container locks chosen before the
/// transaction started
#[derive(Debug)]
pub enum Locked<T> {
    Done(T),
    /// The card changed list between lock selection and the transaction
    Relocated,
}
