//! Attentional gate for free-prose replies
//!
//! Scene prose has no schema. Instead it must mention every salient term
//! drawn from its context chain (plan, project, blueprint, scroll, section,
//! scene), compared as case-insensitive substrings.

use crate::result::{ValidationFailure, ValidationResult};
use quill_types::PhaseKind;
use std::collections::HashSet;

/// Terms must be longer than this many characters
pub const MIN_TERM_EXCLUSIVE: usize = 3;

/// Upper bound on collected terms
pub const MAX_SALIENT_TERMS: usize = 30;

/// Report size when every term is missing
pub const TOTAL_MISS_REPORT_LIMIT: usize = 3;

/// Ordered, de-duplicated, capped set of salient terms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SalientTerms {
    terms: Vec<String>,
    seen: HashSet<String>,
}

impl SalientTerms {
    /// Empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate; returns whether it was accepted
    ///
    /// Candidates are trimmed, must be longer than three characters, are
    /// de-duplicated case-insensitively and stop being accepted at the cap.
    pub fn push(&mut self, candidate: impl AsRef<str>) -> bool {
        let term = candidate.as_ref().trim();
        if term.chars().count() <= MIN_TERM_EXCLUSIVE || self.terms.len() >= MAX_SALIENT_TERMS {
            return false;
        }
        if !self.seen.insert(term.to_lowercase()) {
            return false;
        }
        self.terms.push(term.to_string());
        true
    }

    /// Add an optional candidate
    pub fn push_opt(&mut self, candidate: Option<&str>) -> bool {
        candidate.is_some_and(|c| self.push(c))
    }

    /// Accepted terms in insertion order
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.terms
    }

    /// Number of accepted terms
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether no term was accepted
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Consume into the term list
    #[inline]
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.terms
    }
}

impl<S: AsRef<str>> Extend<S> for SalientTerms {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for candidate in iter {
            self.push(candidate);
        }
    }
}

impl<S: AsRef<str>> FromIterator<S> for SalientTerms {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut terms = Self::new();
        terms.extend(iter);
        terms
    }
}

/// Terms not found in `text` (case-insensitive substring match), in input order
#[must_use]
pub fn missing_terms(text: &str, terms: &[String]) -> Vec<String> {
    let haystack = text.to_lowercase();
    terms
        .iter()
        .filter(|term| !haystack.contains(&term.to_lowercase()))
        .cloned()
        .collect()
}

/// Apply the attentional gate to scene prose
///
/// When only some terms are missing, exactly those are reported. When every
/// term is missing the report is capped at [`TOTAL_MISS_REPORT_LIMIT`]: a
/// total miss points at a prompt or model failure, not at specific omissions.
#[must_use]
pub fn validate_scene(raw: &str, terms: &[String]) -> ValidationResult {
    let mut missing = missing_terms(raw, terms);
    if missing.is_empty() {
        return ValidationResult::passed(PhaseKind::SceneWeaver, None);
    }

    let total_missing = missing.len();
    if total_missing == terms.len() {
        missing.truncate(TOTAL_MISS_REPORT_LIMIT);
    }

    tracing::debug!(
        total_terms = terms.len(),
        total_missing,
        "scene reply failed salient-term coverage"
    );

    ValidationResult::failed(
        PhaseKind::SceneWeaver,
        ValidationFailure::MissingTerms {
            missing,
            total_missing,
            total_terms: terms.len(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn terms(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn salient_terms_filter_short_and_duplicate() {
        let collected: SalientTerms = ["Ash", "Mira", "mira", "  Hollow Market  ", ""]
            .into_iter()
            .collect();
        assert_eq!(collected.as_slice(), &terms(&["Mira", "Hollow Market"])[..]);
    }

    #[test]
    fn salient_terms_are_capped() {
        let collected: SalientTerms = (0..50).map(|i| format!("term-{i}")).collect();
        assert_eq!(collected.len(), MAX_SALIENT_TERMS);
        assert_eq!(collected.as_slice()[0], "term-0");
    }

    #[test]
    fn passes_when_all_terms_present_case_insensitive() {
        let result = validate_scene(
            "The HOLLOW market smelled of ash. Mira waited.",
            &terms(&["Hollow Market", "Mira"]),
        );
        assert!(result.is_passed());
    }

    #[test]
    fn partial_miss_reports_exact_subset() {
        let result = validate_scene(
            "Inside the Hollow Market, Mira bargained.",
            &terms(&["Hollow Market", "Ashfall Prologue", "Mira"]),
        );
        assert!(!result.is_passed());
        assert_eq!(result.missing_terms(), &terms(&["Ashfall Prologue"])[..]);
    }

    #[test]
    fn total_miss_is_capped_at_three() {
        let all = terms(&["Alpha", "Bravo", "Charlie", "Delta", "Echo"]);
        let result = validate_scene("nothing relevant here", &all);
        assert_eq!(result.missing_terms(), &all[..3]);
        match result.failure {
            Some(ValidationFailure::MissingTerms { total_missing, total_terms, .. }) => {
                assert_eq!(total_missing, 5);
                assert_eq!(total_terms, 5);
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn no_terms_always_passes() {
        assert!(validate_scene("anything", &[]).is_passed());
    }

    proptest! {
        #[test]
        fn prop_reported_set_matches_missing_subset(
            present in proptest::collection::vec("[a-z]{4,8}", 0..6),
            absent in proptest::collection::vec("[0-9]{4,8}", 0..6),
        ) {
            let text = present.join(" ");
            let mut all: Vec<String> = present.clone();
            all.extend(absent.iter().cloned());
            let result = validate_scene(&text, &all);
            let truly_missing = missing_terms(&text, &all);

            if truly_missing.is_empty() {
                prop_assert!(result.is_passed());
            } else if truly_missing.len() < all.len() {
                prop_assert_eq!(result.missing_terms(), &truly_missing[..]);
            } else {
                prop_assert_eq!(
                    result.missing_terms().len(),
                    truly_missing.len().min(TOTAL_MISS_REPORT_LIMIT)
                );
            }
        }
    }
}
