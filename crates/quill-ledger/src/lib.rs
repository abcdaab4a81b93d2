//! Quill Ledger
//!
//! Pure state logic over persisted records:
//!
//! - [`WorldBibleLedger`]: slug-keyed, versioned facts with supersession and sweep
//! - [`backlog`]: the `Pending -> InProgress -> Complete` lifecycle and staleness
//! - [`obligation`]: the `Open -> Resolved | Dismissed` lifecycle and aging
//!
//! Nothing here touches storage; callers persist the mutated records.

#![warn(unreachable_pub)]

pub mod backlog;
pub mod error;
pub mod obligation;
pub mod slug;
pub mod world_bible;

pub use backlog::BacklogTransition;
pub use error::{LedgerError, TransitionError};
pub use slug::{entry_slug, slugify};
pub use world_bible::{is_entry_stale, BibleFreshness, PassSummary, UpsertRequest, WorldBibleLedger};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
