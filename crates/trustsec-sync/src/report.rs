//! Per-item outcome reporting for bulk operations.

use std::fmt;

use trustsec_common::{Collection, ErsError};

/// Result of one create or delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Object created
    Created,
    /// Name already taken on the remote system
    AlreadyExists { reason: String },
    /// Object deleted
    Deleted,
    /// Remote system refused the request
    Rejected { status: u16, reason: String },
    /// Request never completed
    Failed { reason: String },
}

impl Outcome {
    /// Returns true for created and deleted items.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Created | Outcome::Deleted)
    }

    /// Returns true for duplicate-name conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Outcome::AlreadyExists { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Created => write!(f, "created"),
            Outcome::AlreadyExists { reason } => write!(f, "already exists: {}", reason),
            Outcome::Deleted => write!(f, "deleted"),
            Outcome::Rejected { status, reason } => write!(f, "rejected ({}): {}", status, reason),
            Outcome::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Outcome for one named or identified item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    /// Name for creates, id for deletes
    pub key: String,
    pub outcome: Outcome,
}

/// Outcomes of one bulk operation over a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub collection: Collection,
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    /// Creates an empty report.
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            items: Vec::new(),
        }
    }

    /// Record one item.
    pub fn push(&mut self, key: impl Into<String>, outcome: Outcome) {
        self.items.push(ItemReport {
            key: key.into(),
            outcome,
        });
    }

    /// Number of created or deleted items.
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_success()).count()
    }

    /// Number of duplicate-name conflicts.
    pub fn conflicts(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_conflict()).count()
    }

    /// Number of rejected or failed items.
    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded() - self.conflicts()
    }

    /// Returns true if nothing was rejected or failed.
    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }

    /// Outcome recorded for `key`.
    pub fn outcome(&self, key: &str) -> Option<&Outcome> {
        self.items.iter().find(|i| i.key == key).map(|i| &i.outcome)
    }
}

/// An item that could not be built, resolved or transcoded.
#[derive(Debug)]
pub struct ItemFailure {
    /// Name or id of the item
    pub key: String,
    pub error: ErsError,
}

impl ItemFailure {
    pub fn new(key: impl Into<String>, error: ErsError) -> Self {
        Self {
            key: key.into(),
            error,
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.error)
    }
}
