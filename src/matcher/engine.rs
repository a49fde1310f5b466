//! Candidate Engines
//!
//! Strategy seam between the hand-built symmetric-delete index and the
//! symspell crate's engine. Both answer the same question: the closest
//! dictionary term within the configured edit distance. The matcher on top
//! owns caching, prefiltering, phonetics, and scoring, so the engines stay
//! interchangeable.

use std::collections::{HashMap, HashSet};

use crate::text::{self, DeletionVariant};

/// Whether the accelerated engine was compiled into this build.
///
/// Selection is an explicit capability check at construction, never a
/// failed-load fallback at query time.
pub fn acceleration_available() -> bool {
    cfg!(feature = "accel")
}

/// A dictionary candidate retriever bounded by edit distance.
pub(crate) trait CandidateEngine: Send + Sync {
    /// Closest term within the engine's edit-distance bound, with its true
    /// Damerau-Levenshtein distance. `query_deletions` is the caller's
    /// already-generated deletion neighborhood of the query; engines that
    /// derive their own candidates may ignore it.
    fn best_candidate(
        &self,
        query: &str,
        query_deletions: &[DeletionVariant],
    ) -> Option<(String, usize)>;

    /// Exact membership.
    fn contains(&self, term: &str) -> bool;

    /// Number of dictionary terms.
    fn term_count(&self) -> usize;

    /// Number of deletion-index keys, when the engine exposes its index.
    fn index_len(&self) -> usize;

    /// Every key a bloom prefilter must cover: the terms plus their deletion
    /// neighborhood.
    fn prefilter_keys(&self) -> Vec<String>;

    /// Engine identifier for stats and logs.
    fn kind(&self) -> &'static str;
}

// ============================================================================
// Pure deletion-index engine
// ============================================================================

#[derive(Clone)]
struct IndexedTerm {
    term: String,
    distance: usize,
}

/// Symmetric-delete index: every term maps in via its deletion variants, and
/// a query retrieves candidates through shared variants instead of scanning
/// the dictionary.
pub(crate) struct DeletionIndexEngine {
    exact: HashSet<String>,
    index: HashMap<String, Vec<IndexedTerm>>,
    max_edit: usize,
    min_len: usize,
}

impl DeletionIndexEngine {
    pub fn new(terms: &[String], max_edit: usize, min_len: usize) -> Self {
        let mut engine = Self {
            exact: HashSet::new(),
            index: HashMap::new(),
            max_edit,
            min_len,
        };

        for raw in terms {
            let term = text::normalize(raw);
            if term.chars().count() < min_len {
                continue;
            }
            if !engine.exact.insert(term.clone()) {
                continue;
            }

            for variant in text::deletion_variants(&term, max_edit, min_len) {
                engine
                    .index
                    .entry(variant.text)
                    .or_default()
                    .push(IndexedTerm {
                        term: term.clone(),
                        distance: variant.distance,
                    });
            }
        }

        engine
    }

    fn consider(&self, term: &str, distance: usize, best: &mut Option<(String, usize)>) {
        if distance > self.max_edit {
            return;
        }
        let better = match best {
            None => true,
            Some((best_term, best_distance)) => {
                distance < *best_distance
                    || (distance == *best_distance && term < best_term.as_str())
            }
        };
        if better {
            *best = Some((term.to_string(), distance));
        }
    }
}

impl CandidateEngine for DeletionIndexEngine {
    fn best_candidate(
        &self,
        query: &str,
        query_deletions: &[DeletionVariant],
    ) -> Option<(String, usize)> {
        let mut seen = HashSet::new();
        let mut best: Option<(String, usize)> = None;

        // The query is itself a deletion variant of these terms. The length
        // gap equals the recorded depth, so that depth is the exact distance
        // and no dynamic program is needed.
        if let Some(entries) = self.index.get(query) {
            for entry in entries {
                if seen.insert(entry.term.clone()) {
                    self.consider(&entry.term, entry.distance, &mut best);
                }
            }
        }

        for deletion in query_deletions {
            // A deletion of the query that is a dictionary term: exact
            // distance again, by the same length argument.
            if self.exact.contains(&deletion.text) && seen.insert(deletion.text.clone()) {
                self.consider(&deletion.text, deletion.distance, &mut best);
            }
            // Shared variant. Only here does the true distance need
            // computing; transpositions and substitutions surface as a
            // deletion overlap whose depth overstates the real edit count.
            if let Some(entries) = self.index.get(&deletion.text) {
                for entry in entries {
                    if seen.insert(entry.term.clone()) {
                        let distance =
                            text::damerau_levenshtein(query, &entry.term, self.max_edit);
                        self.consider(&entry.term, distance, &mut best);
                    }
                }
            }
        }

        best
    }

    fn contains(&self, term: &str) -> bool {
        self.exact.contains(term)
    }

    fn term_count(&self) -> usize {
        self.exact.len()
    }

    fn index_len(&self) -> usize {
        self.index.len()
    }

    fn prefilter_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.exact.iter().cloned().collect();
        keys.extend(self.index.keys().cloned());
        keys
    }

    fn kind(&self) -> &'static str {
        "deletion-index"
    }
}

// ============================================================================
// Accelerated engine (symspell crate)
// ============================================================================

#[cfg(feature = "accel")]
pub(crate) use accel::SymSpellEngine;

#[cfg(feature = "accel")]
mod accel {
    use std::collections::HashSet;

    use symspell::{AsciiStringStrategy, SymSpell, SymSpellBuilder, Verbosity};

    use super::CandidateEngine;
    use crate::text::{self, DeletionVariant};

    /// Deletion-index retrieval delegated to the symspell crate.
    pub(crate) struct SymSpellEngine {
        inner: SymSpell<AsciiStringStrategy>,
        terms: HashSet<String>,
        max_edit: usize,
        min_len: usize,
    }

    impl SymSpellEngine {
        pub fn new(terms: &[String], max_edit: usize, min_len: usize) -> Result<Self, String> {
            let mut inner: SymSpell<AsciiStringStrategy> = SymSpellBuilder::default()
                .max_dictionary_edit_distance(max_edit as i64)
                .count_threshold(1)
                .build()
                .map_err(|e| e.to_string())?;

            let mut set = HashSet::new();
            for raw in terms {
                let term = text::normalize(raw);
                if term.chars().count() < min_len {
                    continue;
                }
                if set.insert(term.clone()) {
                    // Tab separator keeps multi-word terms intact.
                    inner.load_dictionary_line(&format!("{term}\t1"), 0, 1, "\t");
                }
            }

            Ok(Self {
                inner,
                terms: set,
                max_edit,
                min_len,
            })
        }
    }

    impl CandidateEngine for SymSpellEngine {
        fn best_candidate(
            &self,
            query: &str,
            _query_deletions: &[DeletionVariant],
        ) -> Option<(String, usize)> {
            let suggestions = self.inner.lookup(query, Verbosity::Top, self.max_edit as i64);
            suggestions
                .into_iter()
                .next()
                .filter(|s| s.distance >= 0 && s.distance as usize <= self.max_edit)
                .map(|s| (s.term, s.distance as usize))
        }

        fn contains(&self, term: &str) -> bool {
            self.terms.contains(term)
        }

        fn term_count(&self) -> usize {
            self.terms.len()
        }

        fn index_len(&self) -> usize {
            // The crate keeps its deletion map private.
            0
        }

        fn prefilter_keys(&self) -> Vec<String> {
            let mut keys: Vec<String> = self.terms.iter().cloned().collect();
            for term in &self.terms {
                for variant in text::deletion_variants(term, self.max_edit, self.min_len) {
                    keys.push(variant.text);
                }
            }
            keys
        }

        fn kind(&self) -> &'static str {
            "symspell"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(terms: &[&str]) -> DeletionIndexEngine {
        let owned: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
        DeletionIndexEngine::new(&owned, 2, 2)
    }

    fn lookup(engine: &DeletionIndexEngine, query: &str) -> Option<(String, usize)> {
        let deletions = text::deletion_variants(query, 2, 2);
        engine.best_candidate(query, &deletions)
    }

    #[test]
    fn test_exact_membership() {
        let e = engine(&["smith", "garcia"]);
        assert!(e.contains("smith"));
        assert!(!e.contains("smth"));
        assert_eq!(e.term_count(), 2);
        assert!(e.index_len() > 0);
    }

    #[test]
    fn test_short_terms_skipped() {
        let e = engine(&["a", "jo"]);
        assert!(!e.contains("a"));
        assert!(e.contains("jo"));
    }

    #[test]
    fn test_deletion_candidate() {
        let e = engine(&["smith"]);
        assert_eq!(lookup(&e, "smth"), Some(("smith".to_string(), 1)));
    }

    #[test]
    fn test_insertion_candidate() {
        let e = engine(&["smith"]);
        assert_eq!(lookup(&e, "smiith"), Some(("smith".to_string(), 1)));
    }

    #[test]
    fn test_substitution_candidate() {
        let e = engine(&["smith"]);
        assert_eq!(lookup(&e, "smyth"), Some(("smith".to_string(), 1)));
    }

    #[test]
    fn test_transposition_is_distance_one() {
        let e = engine(&["smith"]);
        assert_eq!(lookup(&e, "simth"), Some(("smith".to_string(), 1)));
    }

    #[test]
    fn test_beyond_bound_rejected() {
        let e = engine(&["smith"]);
        assert_eq!(lookup(&e, "schmidtt"), None);
    }

    #[test]
    fn test_tie_break_is_deterministic() {
        let e = engine(&["mara", "mora"]);
        // Both are distance 1 from "mura"; the lexicographically first wins.
        assert_eq!(lookup(&e, "mura"), Some(("mara".to_string(), 1)));
    }

    #[test]
    fn test_prefilter_keys_cover_terms_and_variants() {
        let e = engine(&["smith"]);
        let keys = e.prefilter_keys();
        assert!(keys.iter().any(|k| k == "smith"));
        assert!(keys.iter().any(|k| k == "smth"));
    }

    #[cfg(feature = "accel")]
    #[test]
    fn test_symspell_engine_matches_pure_semantics() {
        let terms = vec!["smith".to_string(), "garcia".to_string()];
        let accel = SymSpellEngine::new(&terms, 2, 2).unwrap();
        let deletions = text::deletion_variants("smth", 2, 2);
        let (term, distance) = accel.best_candidate("smth", &deletions).unwrap();
        assert_eq!(term, "smith");
        assert_eq!(distance, 1);
        assert!(accel.contains("garcia"));
        assert_eq!(accel.kind(), "symspell");
    }
}
