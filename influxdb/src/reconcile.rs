//! Set reconciliation for keyed sub-blocks
//!
//! Retention policies and grants are stored in Terraform as collections keyed
//! by a natural key (policy name, database name). An update compares the old
//! and new desired collections and produces the statements that move the
//! server from one to the other.
//!
//! Actions from the old collection (deletes and updates) come first, in old
//! order, then creates in new order. Applying stops at the first failure and
//! does not roll back what already ran.

use std::collections::{HashMap, HashSet};
use std::future::Future;

/// An element identified by a natural key, unique within its collection
pub trait Keyed {
    fn key(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiffAction<T> {
    Create(T),
    /// Carries the whole new element, even if a single field changed
    Update(T),
    /// Carries the removed element so the statement can name what it revokes
    Delete(T),
}

impl<T: Keyed> DiffAction<T> {
    pub fn key(&self) -> &str {
        match self {
            DiffAction::Create(item) | DiffAction::Update(item) | DiffAction::Delete(item) => {
                item.key()
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DiffAction::Create(_) => "create",
            DiffAction::Update(_) => "update",
            DiffAction::Delete(_) => "delete",
        }
    }
}

pub fn diff<T: Keyed + PartialEq + Clone>(old: &[T], new: &[T]) -> Vec<DiffAction<T>> {
    let new_by_key: HashMap<&str, &T> = new.iter().map(|item| (item.key(), item)).collect();
    let old_keys: HashSet<&str> = old.iter().map(Keyed::key).collect();
    let mut actions = Vec::new();

    for old_item in old {
        match new_by_key.get(old_item.key()) {
            None => actions.push(DiffAction::Delete(old_item.clone())),
            Some(new_item) if *new_item != old_item => {
                actions.push(DiffAction::Update((*new_item).clone()))
            }
            Some(_) => {}
        }
    }

    for new_item in new {
        if !old_keys.contains(new_item.key()) {
            actions.push(DiffAction::Create(new_item.clone()));
        }
    }

    actions
}

/// Runs actions one after another, stopping at the first error
pub async fn apply<T, E, F, Fut>(actions: Vec<DiffAction<T>>, mut run: F) -> Result<(), E>
where
    T: Keyed,
    F: FnMut(DiffAction<T>) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    for action in actions {
        let kind = action.kind();
        let key = action.key().to_string();
        tracing::debug!(action = kind, key = %key, "applying change");
        if let Err(e) = run(action).await {
            tracing::warn!(action = kind, key = %key, error = %e, "change failed, stopping");
            return Err(e);
        }
    }
    Ok(())
}
