//! World bible ledger
//!
//! Holds every entry of a single bible in memory and applies upsert and
//! sweep passes to it. Entries are never removed: a superseded or omitted
//! fact is deactivated and stays reachable through [`WorldBibleLedger::history`].
//!
//! The ledger performs no IO. Callers load the bible's entries, apply a pass
//! and persist [`WorldBibleLedger::take_changes`] inside one transaction.
//!
//! # Invariants
//!
//! - At most one active entry per slug
//! - `sequence` strictly increases across the bible
//! - `version` increases by one per slug and `derived_from_entry_id` links
//!   each version to the one it superseded

use crate::error::LedgerError;
use crate::slug::entry_slug;
use chrono::{DateTime, Duration, Utc};
use quill_types::{
    ChangeType, EntryId, EntryProvenance, WorldBibleEntry, WorldBibleId,
};
use std::collections::{BTreeSet, HashMap, HashSet};

/// One fact to record in a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertRequest {
    /// Category (e.g. `characters`)
    pub category: String,
    /// Display name; normalized into the slug
    pub name: String,
    /// Canonical summary
    pub summary: String,
    /// In-world status (e.g. `active`, `deceased`)
    pub status: String,
    /// Continuity notes
    pub continuity_notes: Vec<String>,
    /// Which run produced the fact
    pub provenance: EntryProvenance,
}

impl UpsertRequest {
    /// Request with `active` status and no notes
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            summary: summary.into(),
            status: "active".to_string(),
            continuity_notes: Vec::new(),
            provenance: EntryProvenance::default(),
        }
    }

    /// Set the in-world status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Set continuity notes
    #[inline]
    #[must_use]
    pub fn with_notes(mut self, notes: Vec<String>) -> Self {
        self.continuity_notes = notes;
        self
    }

    /// Set provenance
    #[inline]
    #[must_use]
    pub fn with_provenance(mut self, provenance: EntryProvenance) -> Self {
        self.provenance = provenance;
        self
    }
}

/// Outcome of [`WorldBibleLedger::apply_pass`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Entries created by the pass, in order
    pub created: Vec<EntryId>,
    /// Slugs touched by the pass
    pub touched: BTreeSet<String>,
    /// Entries deactivated by the sweep
    pub swept: Vec<EntryId>,
}

/// Freshness classification of a whole bible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BibleFreshness {
    /// No active entries
    Missing,
    /// Most recently updated active entry is older than the window
    Stale {
        /// Last update of any active entry
        last_updated: DateTime<Utc>,
    },
    /// Within the window
    Fresh {
        /// Last update of any active entry
        last_updated: DateTime<Utc>,
    },
}

/// In-memory ledger for one world bible
#[derive(Debug, Clone)]
pub struct WorldBibleLedger {
    bible_id: WorldBibleId,
    entries: Vec<WorldBibleEntry>,
    by_id: HashMap<EntryId, usize>,
    active: HashMap<String, usize>,
    max_sequence: u64,
    changed: BTreeSet<usize>,
}

impl WorldBibleLedger {
    /// Ledger for a bible with no entries yet
    #[must_use]
    pub fn new(bible_id: WorldBibleId) -> Self {
        Self {
            bible_id,
            entries: Vec::new(),
            by_id: HashMap::new(),
            active: HashMap::new(),
            max_sequence: 0,
            changed: BTreeSet::new(),
        }
    }

    /// Open a ledger over previously persisted entries
    ///
    /// # Errors
    ///
    /// Fails if an entry belongs to another bible or a slug has more than
    /// one active entry.
    pub fn from_entries(
        bible_id: WorldBibleId,
        entries: impl IntoIterator<Item = WorldBibleEntry>,
    ) -> Result<Self, LedgerError> {
        let mut entries: Vec<WorldBibleEntry> = entries.into_iter().collect();
        entries.sort_by_key(|e| e.sequence);

        let mut ledger = Self::new(bible_id);
        for entry in entries {
            if entry.bible_id != bible_id {
                return Err(LedgerError::ForeignEntry {
                    entry: entry.id,
                    expected: bible_id,
                    found: entry.bible_id,
                });
            }
            let index = ledger.entries.len();
            if entry.is_active && ledger.active.insert(entry.slug.clone(), index).is_some() {
                return Err(LedgerError::DuplicateActive { slug: entry.slug });
            }
            ledger.max_sequence = ledger.max_sequence.max(entry.sequence);
            ledger.by_id.insert(entry.id, index);
            ledger.entries.push(entry);
        }
        Ok(ledger)
    }

    /// Bible this ledger manages
    #[inline]
    #[must_use]
    pub fn bible_id(&self) -> WorldBibleId {
        self.bible_id
    }

    /// Running maximum sequence (0 when empty)
    #[inline]
    #[must_use]
    pub fn max_sequence(&self) -> u64 {
        self.max_sequence
    }

    /// Record a fact, superseding the slug's active entry if any
    ///
    /// # Errors
    ///
    /// Fails when the category or name cannot be turned into a slug.
    pub fn upsert(
        &mut self,
        request: UpsertRequest,
        now: DateTime<Utc>,
    ) -> Result<&WorldBibleEntry, LedgerError> {
        let slug = entry_slug(&request.category, &request.name)?;
        let category = slug
            .split_once(':')
            .map_or_else(String::new, |(category, _)| category.to_string());

        let prior = self.active.remove(&slug).map(|index| {
            let prior = &mut self.entries[index];
            prior.is_active = false;
            prior.updated_at = now;
            self.changed.insert(index);
            (prior.id, prior.version)
        });

        self.max_sequence += 1;
        let entry = WorldBibleEntry {
            id: EntryId::new(),
            bible_id: self.bible_id,
            slug: slug.clone(),
            category,
            name: request.name.trim().to_string(),
            summary: request.summary.trim().to_string(),
            status: request.status.trim().to_lowercase(),
            continuity_notes: request.continuity_notes,
            version: prior.map_or(1, |(_, version)| version + 1),
            sequence: self.max_sequence,
            change_type: if prior.is_some() {
                ChangeType::Update
            } else {
                ChangeType::Seed
            },
            derived_from_entry_id: prior.map(|(id, _)| id),
            is_active: true,
            provenance: request.provenance,
            created_at: now,
            updated_at: now,
        };

        tracing::debug!(
            bible_id = %self.bible_id,
            slug = %entry.slug,
            version = entry.version,
            sequence = entry.sequence,
            "world bible entry recorded"
        );

        let index = self.entries.len();
        self.by_id.insert(entry.id, index);
        self.active.insert(slug, index);
        self.changed.insert(index);
        self.entries.push(entry);
        Ok(&self.entries[index])
    }

    /// Deactivate every active entry whose slug is not in `touched`
    ///
    /// No new version is created. Returns the deactivated entry ids.
    pub fn sweep(&mut self, touched: &HashSet<String>, now: DateTime<Utc>) -> Vec<EntryId> {
        let mut untouched: Vec<(String, usize)> = self
            .active
            .iter()
            .filter(|(slug, _)| !touched.contains(*slug))
            .map(|(slug, index)| (slug.clone(), *index))
            .collect();
        untouched.sort_by_key(|(_, index)| *index);

        let mut swept = Vec::with_capacity(untouched.len());
        for (slug, index) in untouched {
            self.active.remove(&slug);
            let entry = &mut self.entries[index];
            entry.is_active = false;
            entry.updated_at = now;
            self.changed.insert(index);
            swept.push(entry.id);
        }

        if !swept.is_empty() {
            tracing::info!(
                bible_id = %self.bible_id,
                count = swept.len(),
                "world bible entries omitted from pass deactivated"
            );
        }
        swept
    }

    /// Upsert every request then sweep the slugs the pass did not mention
    ///
    /// # Errors
    ///
    /// Stops at the first request that cannot be slugged; the sweep is not
    /// applied in that case.
    pub fn apply_pass(
        &mut self,
        requests: impl IntoIterator<Item = UpsertRequest>,
        now: DateTime<Utc>,
    ) -> Result<PassSummary, LedgerError> {
        let mut summary = PassSummary::default();
        for request in requests {
            let entry = self.upsert(request, now)?;
            summary.created.push(entry.id);
            summary.touched.insert(entry.slug.clone());
        }
        let touched: HashSet<String> = summary.touched.iter().cloned().collect();
        summary.swept = self.sweep(&touched, now);
        Ok(summary)
    }

    /// Active entry for a slug
    #[must_use]
    pub fn active_entry(&self, slug: &str) -> Option<&WorldBibleEntry> {
        self.active.get(slug).map(|&index| &self.entries[index])
    }

    /// Active entries, in sequence order
    pub fn active_entries(&self) -> impl Iterator<Item = &WorldBibleEntry> {
        self.entries.iter().filter(|e| e.is_active)
    }

    /// Every entry ever recorded, in sequence order
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[WorldBibleEntry] {
        &self.entries
    }

    /// Entry by id
    #[must_use]
    pub fn entry(&self, id: EntryId) -> Option<&WorldBibleEntry> {
        self.by_id.get(&id).map(|&index| &self.entries[index])
    }

    /// Version chain for a slug, newest first
    ///
    /// Starts at the latest entry for the slug (active or not) and follows
    /// `derived_from_entry_id` backwards.
    #[must_use]
    pub fn history(&self, slug: &str) -> Vec<&WorldBibleEntry> {
        let head = self
            .entries
            .iter()
            .rev()
            .find(|e| e.slug == slug);

        let mut chain = Vec::new();
        let mut current = head;
        while let Some(entry) = current {
            chain.push(entry);
            current = entry.derived_from_entry_id.and_then(|id| self.entry(id));
        }
        chain
    }

    /// Entries created or modified since the last call, in sequence order
    pub fn take_changes(&mut self) -> Vec<WorldBibleEntry> {
        std::mem::take(&mut self.changed)
            .into_iter()
            .map(|index| self.entries[index].clone())
            .collect()
    }

    /// Most recent `updated_at` across active entries
    #[must_use]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.active_entries().map(|e| e.updated_at).max()
    }

    /// Classify the bible against a freshness window
    #[must_use]
    pub fn freshness(&self, now: DateTime<Utc>, window: Duration) -> BibleFreshness {
        match self.last_updated() {
            None => BibleFreshness::Missing,
            Some(last_updated) if now - last_updated > window => {
                BibleFreshness::Stale { last_updated }
            }
            Some(last_updated) => BibleFreshness::Fresh { last_updated },
        }
    }
}

/// Whether an active entry is older than the freshness window
#[must_use]
pub fn is_entry_stale(entry: &WorldBibleEntry, now: DateTime<Utc>, window: Duration) -> bool {
    entry.is_active && now - entry.updated_at > window
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn mira(summary: &str) -> UpsertRequest {
        UpsertRequest::new("characters", "Mira", summary)
    }

    #[test]
    fn first_upsert_seeds_version_one() {
        let mut ledger = WorldBibleLedger::new(WorldBibleId::new());
        let entry = ledger.upsert(mira("A courier from the valley."), t0()).unwrap();
        assert_eq!(entry.slug, "characters:mira");
        assert_eq!(entry.version, 1);
        assert_eq!(entry.sequence, 1);
        assert_eq!(entry.change_type, ChangeType::Seed);
        assert!(entry.derived_from_entry_id.is_none());
    }

    #[test]
    fn second_upsert_supersedes() {
        let mut ledger = WorldBibleLedger::new(WorldBibleId::new());
        let first = ledger.upsert(mira("v1"), t0()).unwrap().id;
        let later = t0() + Duration::minutes(5);
        let second = ledger.upsert(mira("v2"), later).unwrap().clone();

        assert_eq!(second.version, 2);
        assert_eq!(second.change_type, ChangeType::Update);
        assert_eq!(second.derived_from_entry_id, Some(first));

        let old = ledger.entry(first).unwrap();
        assert!(!old.is_active);
        assert_eq!(old.updated_at, later);
        assert_eq!(ledger.active_entry("characters:mira").unwrap().id, second.id);
    }

    #[test]
    fn sweep_deactivates_untouched_only() {
        let mut ledger = WorldBibleLedger::new(WorldBibleId::new());
        ledger.upsert(mira("courier"), t0()).unwrap();
        let ash = ledger
            .upsert(UpsertRequest::new("locations", "Ash Vale", "burnt"), t0())
            .unwrap()
            .id;

        let touched: HashSet<String> = ["characters:mira".to_string()].into();
        let swept = ledger.sweep(&touched, t0());
        assert_eq!(swept, vec![ash]);
        assert!(ledger.active_entry("characters:mira").is_some());
        assert!(ledger.active_entry("locations:ash-vale").is_none());
        // no new version
        assert_eq!(ledger.entries().len(), 2);
        assert!(ledger.sweep(&touched, t0()).is_empty());
    }

    #[test]
    fn apply_pass_reports_created_and_swept() {
        let mut ledger = WorldBibleLedger::new(WorldBibleId::new());
        let cult = UpsertRequest::new("factions", "Ember Cult", "zealots");
        ledger.apply_pass([mira("one"), cult], t0()).unwrap();
        let summary = ledger.apply_pass([mira("two")], t0()).unwrap();
        assert_eq!(summary.created.len(), 1);
        assert_eq!(summary.swept.len(), 1);
        assert_eq!(ledger.active_entries().count(), 1);
    }

    #[test]
    fn history_walks_back_versions() {
        let mut ledger = WorldBibleLedger::new(WorldBibleId::new());
        for summary in ["a", "b", "c"] {
            ledger.upsert(mira(summary), t0()).unwrap();
        }
        let versions: Vec<u32> = ledger
            .history("characters:mira")
            .into_iter()
            .map(|e| e.version)
            .collect();
        assert_eq!(versions, vec![3, 2, 1]);
    }

    #[test]
    fn take_changes_drains() {
        let mut ledger = WorldBibleLedger::new(WorldBibleId::new());
        ledger.upsert(mira("a"), t0()).unwrap();
        ledger.take_changes();
        ledger.upsert(mira("b"), t0()).unwrap();
        let changes = ledger.take_changes();
        assert_eq!(changes.len(), 2);
        assert!(!changes[0].is_active);
        assert!(changes[1].is_active);
        assert!(ledger.take_changes().is_empty());
    }

    #[test]
    fn reopened_ledger_continues_sequence() {
        let bible = WorldBibleId::new();
        let mut ledger = WorldBibleLedger::new(bible);
        ledger.upsert(mira("a"), t0()).unwrap();
        ledger.upsert(mira("b"), t0()).unwrap();

        let mut reopened =
            WorldBibleLedger::from_entries(bible, ledger.entries().to_vec()).unwrap();
        let entry = reopened.upsert(mira("c"), t0()).unwrap();
        assert_eq!(entry.sequence, 3);
        assert_eq!(entry.version, 3);
    }

    #[test]
    fn from_entries_rejects_duplicate_active() {
        let bible = WorldBibleId::new();
        let mut a = WorldBibleLedger::new(bible);
        a.upsert(mira("a"), t0()).unwrap();
        let mut b = WorldBibleLedger::new(bible);
        b.upsert(mira("b"), t0()).unwrap();

        let mut entries = a.entries().to_vec();
        let mut dup = b.entries()[0].clone();
        dup.sequence = 2;
        entries.push(dup);
        assert_eq!(
            WorldBibleLedger::from_entries(bible, entries).unwrap_err(),
            LedgerError::DuplicateActive {
                slug: "characters:mira".into()
            }
        );
    }

    #[test]
    fn freshness_classification() {
        let mut ledger = WorldBibleLedger::new(WorldBibleId::new());
        let window = Duration::hours(6);
        assert_eq!(ledger.freshness(t0(), window), BibleFreshness::Missing);

        ledger.upsert(mira("a"), t0()).unwrap();
        assert_eq!(
            ledger.freshness(t0() + Duration::hours(1), window),
            BibleFreshness::Fresh { last_updated: t0() }
        );
        assert_eq!(
            ledger.freshness(t0() + Duration::hours(7), window),
            BibleFreshness::Stale { last_updated: t0() }
        );
        let entry = ledger.active_entry("characters:mira").unwrap();
        assert!(is_entry_stale(entry, t0() + Duration::hours(7), window));
        assert!(!is_entry_stale(entry, t0() + Duration::hours(6), window));
    }
}
