//! Ledger and lifecycle errors

use quill_types::{BacklogStatus, EntryId, ObligationId, ObligationStatus, WorldBibleId};

/// Errors raised by [`crate::WorldBibleLedger`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Name normalizes to an empty slug
    #[error("'{name}' in category '{category}' does not produce a usable slug")]
    EmptySlug {
        /// Entry category
        category: String,
        /// Rejected name
        name: String,
    },

    /// Category is blank
    #[error("world bible category must not be blank")]
    EmptyCategory,

    /// Loaded entry belongs to another bible
    #[error("entry {entry} belongs to bible {found}, not {expected}")]
    ForeignEntry {
        /// Offending entry
        entry: EntryId,
        /// Bible the ledger was opened for
        expected: WorldBibleId,
        /// Bible recorded on the entry
        found: WorldBibleId,
    },

    /// Loaded entries violate the single-active-entry invariant
    #[error("slug '{slug}' has more than one active entry")]
    DuplicateActive {
        /// Slug with several active entries
        slug: String,
    },
}

/// A rejected lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Backlog items only move forward one step at a time
    #[error("backlog item '{backlog_id}' cannot move from {from} to {to}")]
    Backlog {
        /// Plan-scoped backlog key
        backlog_id: String,
        /// Current status
        from: BacklogStatus,
        /// Requested status
        to: BacklogStatus,
    },

    /// Obligation already left the Open state
    #[error("obligation {id} is already {status} and cannot be {action}")]
    ObligationTerminal {
        /// Obligation
        id: ObligationId,
        /// Current (terminal) status
        status: ObligationStatus,
        /// Attempted action
        action: &'static str,
    },
}
