//! Fuzzy Matcher
//!
//! The primary high-throughput matcher: bloom prefilter, symmetric-delete
//! candidate retrieval, soundex fallback, and a bounded result cache. Built
//! once from a term list, then queried read-only.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use lru::LruCache;
use serde::Serialize;
use tracing::{info, warn};

use super::engine::{CandidateEngine, DeletionIndexEngine};
use crate::bloom::{BlobCodec, BloomFilter};
use crate::config::MatcherConfig;
use crate::text::{self, DeletionVariant};
use crate::types::{MatchResult, MatchType};

/// Counter snapshot for observability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherStats {
    pub engine: &'static str,
    pub terms: usize,
    pub index_entries: usize,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub prefilter_rejections: u64,
}

#[derive(Default)]
struct Counters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    prefilter_rejections: AtomicU64,
}

/// Deletion-index matcher with phonetic fallback.
pub struct FuzzyMatcher {
    config: MatcherConfig,
    engine: Box<dyn CandidateEngine>,
    phonetic_index: HashMap<String, Vec<String>>,
    prefilter: Option<BloomFilter>,
    cache: Mutex<LruCache<String, MatchResult>>,
    counters: Counters,
}

impl FuzzyMatcher {
    /// Build the matcher from raw terms. A one-time blocking cost; lookups
    /// afterwards never touch the index-construction path again.
    pub fn new(terms: &[String], config: MatcherConfig) -> Self {
        let engine = build_engine(terms, &config);

        let mut phonetic_index: HashMap<String, Vec<String>> = HashMap::new();
        if config.enable_phonetic {
            let mut seen = std::collections::HashSet::new();
            for raw in terms {
                let term = text::normalize(raw);
                if term.chars().count() < config.min_term_length || !seen.insert(term.clone()) {
                    continue;
                }
                phonetic_index
                    .entry(text::soundex(&term))
                    .or_default()
                    .push(term);
            }
        }

        let prefilter = if config.prefilter {
            Some(build_prefilter(engine.as_ref(), &config))
        } else {
            None
        };

        let cache_size = NonZeroUsize::new(config.cache_size.max(100)).unwrap_or(NonZeroUsize::MIN);

        info!(
            engine = engine.kind(),
            terms = engine.term_count(),
            index_entries = engine.index_len(),
            phonetic = config.enable_phonetic,
            prefilter = prefilter.is_some(),
            "fuzzy matcher built"
        );

        Self {
            config,
            engine,
            phonetic_index,
            prefilter,
            cache: Mutex::new(LruCache::new(cache_size)),
            counters: Counters::default(),
        }
    }

    /// Resolve a query against the dictionary. Never fails: malformed or
    /// unknown input comes back as a NONE result.
    pub fn lookup(&self, query: &str) -> MatchResult {
        let normalized = text::normalize(query);

        if let Some(cached) = self.cache_get(&normalized) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return cached;
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        let result = self.resolve(&normalized);
        self.cache_put(normalized, result.clone());
        result
    }

    /// Membership with fuzzy tolerance.
    pub fn has(&self, query: &str) -> bool {
        self.lookup(query).matched
    }

    /// Confidence score for a query.
    pub fn confidence(&self, query: &str) -> f64 {
        self.lookup(query).confidence
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    /// Number of dictionary terms.
    pub fn size(&self) -> usize {
        self.engine.term_count()
    }

    /// Number of deletion-index keys.
    pub fn index_size(&self) -> usize {
        self.engine.index_len()
    }

    pub fn stats(&self) -> MatcherStats {
        MatcherStats {
            engine: self.engine.kind(),
            terms: self.engine.term_count(),
            index_entries: self.engine.index_len(),
            cache_entries: self.lock_cache().len(),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            prefilter_rejections: self.counters.prefilter_rejections.load(Ordering::Relaxed),
        }
    }

    // ------------------------------------------------------------------
    // Lookup pipeline
    // ------------------------------------------------------------------

    fn resolve(&self, query: &str) -> MatchResult {
        // Prefilter gate. The filter covers the deletion-index keys, so a
        // query that misses with its whole deletion neighborhood cannot
        // reach any term within the edit bound and dies here.
        let mut deletions: Option<Vec<DeletionVariant>> = None;
        if let Some(filter) = &self.prefilter {
            if !filter.contains(query) {
                let generated = self.query_deletions(query);
                if !generated.iter().any(|d| filter.contains(&d.text)) {
                    self.counters
                        .prefilter_rejections
                        .fetch_add(1, Ordering::Relaxed);
                    return MatchResult::none();
                }
                deletions = Some(generated);
            }
        }

        if self.engine.contains(query) {
            return MatchResult::exact(query);
        }

        if query.chars().count() >= self.config.min_term_length {
            let deletions = deletions.unwrap_or_else(|| self.query_deletions(query));

            if let Some((term, distance)) = self.engine.best_candidate(query, &deletions) {
                if distance == 0 {
                    return MatchResult::exact(term);
                }
                let confidence = text::match_confidence(query, &term, distance);
                let match_type = if distance == 1 {
                    MatchType::Delete1
                } else {
                    MatchType::Delete2
                };
                return MatchResult {
                    matched: true,
                    term: Some(term),
                    distance: distance as i64,
                    confidence,
                    match_type,
                };
            }

            if let Some(result) = self.phonetic_lookup(query) {
                return result;
            }
        }

        MatchResult::none()
    }

    fn phonetic_lookup(&self, query: &str) -> Option<MatchResult> {
        if !self.config.enable_phonetic {
            return None;
        }
        let bucket = self.phonetic_index.get(&text::soundex(query))?;

        let window = self.config.max_edit_distance + 1;
        let mut best: Option<(&String, usize)> = None;
        for term in bucket {
            let distance = text::damerau_levenshtein(query, term, window);
            if best.as_ref().map_or(true, |(_, d)| distance < *d) {
                best = Some((term, distance));
            }
        }

        let (term, distance) = best?;
        if distance > window {
            return None;
        }

        let confidence = text::match_confidence(query, term, distance) * 0.9;
        Some(MatchResult {
            matched: true,
            term: Some(term.clone()),
            distance: distance as i64,
            confidence,
            match_type: MatchType::Phonetic,
        })
    }

    fn query_deletions(&self, query: &str) -> Vec<DeletionVariant> {
        text::deletion_variants(query, self.config.max_edit_distance, self.config.min_term_length)
    }

    // ------------------------------------------------------------------
    // Cache plumbing
    // ------------------------------------------------------------------

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache<String, MatchResult>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cache_get(&self, key: &str) -> Option<MatchResult> {
        self.lock_cache().get(key).cloned()
    }

    fn cache_put(&self, key: String, value: MatchResult) {
        self.lock_cache().put(key, value);
    }
}

fn build_engine(terms: &[String], config: &MatcherConfig) -> Box<dyn CandidateEngine> {
    if config.accelerated {
        #[cfg(feature = "accel")]
        {
            match super::engine::SymSpellEngine::new(
                terms,
                config.max_edit_distance,
                config.min_term_length,
            ) {
                Ok(accel) => return Box::new(accel),
                Err(err) => warn!(%err, "accelerated engine rejected the dictionary, using the deletion index"),
            }
        }
        #[cfg(not(feature = "accel"))]
        warn!("acceleration requested but the accel feature is not compiled in");
    }

    Box::new(DeletionIndexEngine::new(
        terms,
        config.max_edit_distance,
        config.min_term_length,
    ))
}

fn build_prefilter(engine: &dyn CandidateEngine, config: &MatcherConfig) -> BloomFilter {
    if let Some(path) = &config.prefilter_blob {
        match BlobCodec::load(path) {
            Ok((filter, metadata)) => {
                info!(
                    path = %path.display(),
                    items = metadata.item_count,
                    "prefilter blob loaded"
                );
                return filter;
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "prefilter blob rejected, rebuilding from index");
            }
        }
    }

    let keys = engine.prefilter_keys();
    let mut filter = BloomFilter::with_rate(keys.len(), config.prefilter_error_rate);
    for key in &keys {
        filter.insert(key);
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names_matcher(terms: &[&str]) -> FuzzyMatcher {
        let owned: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
        FuzzyMatcher::new(&owned, MatcherConfig::names())
    }

    #[test]
    fn test_every_term_is_exact() {
        let matcher = names_matcher(&["smith", "garcia", "penelope"]);
        for term in ["smith", "garcia", "penelope"] {
            let result = matcher.lookup(term);
            assert!(result.matched);
            assert_eq!(result.distance, 0);
            assert_eq!(result.confidence, 1.0);
            assert_eq!(result.match_type, MatchType::Exact);
            assert_eq!(result.term.as_deref(), Some(term));
        }
    }

    #[test]
    fn test_exact_is_case_and_whitespace_insensitive() {
        let matcher = names_matcher(&["smith"]);
        let result = matcher.lookup("  SMITH ");
        assert_eq!(result.match_type, MatchType::Exact);
    }

    #[test]
    fn test_single_deletion_match() {
        let matcher = names_matcher(&["smith"]);
        let result = matcher.lookup("smth");
        assert!(result.matched);
        assert_eq!(result.term.as_deref(), Some("smith"));
        assert_eq!(result.distance, 1);
        assert_eq!(result.match_type, MatchType::Delete1);
        assert!(result.confidence > 0.75);
    }

    #[test]
    fn test_double_edit_match() {
        let matcher = names_matcher(&["penelope"]);
        let result = matcher.lookup("penlop");
        assert!(result.matched);
        assert_eq!(result.match_type, MatchType::Delete2);
        assert_eq!(result.distance, 2);
    }

    #[test]
    fn test_distance_bound_honored() {
        let matcher = names_matcher(&["smith", "garcia", "penelope"]);
        for query in ["smth", "garcai", "penlope", "xyzzy", "smithsonian"] {
            let result = matcher.lookup(query);
            if result.matched && result.match_type != MatchType::Phonetic {
                assert!(result.distance <= 2, "{query}: distance {}", result.distance);
            }
            if result.match_type == MatchType::Phonetic {
                assert!(result.distance <= 3);
            }
        }
    }

    fn phonetic_matcher(terms: &[&str]) -> FuzzyMatcher {
        let owned: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
        let config = MatcherConfig {
            prefilter: false,
            ..MatcherConfig::names()
        };
        FuzzyMatcher::new(&owned, config)
    }

    #[test]
    fn test_phonetic_fallback() {
        // Distance 3 is past the deletion index but inside the phonetic
        // window, and the soundex codes line up.
        let matcher = phonetic_matcher(&["robert"]);
        let result = matcher.lookup("rubbbert");
        assert!(result.matched, "expected phonetic rescue, got {result:?}");
        assert_eq!(result.term.as_deref(), Some("robert"));
        assert_eq!(result.match_type, MatchType::Phonetic);
        assert_eq!(result.distance, 3);
        assert!(result.confidence < 1.0);
    }

    #[test]
    fn test_phonetic_discount_applied() {
        let matcher = phonetic_matcher(&["robert"]);
        let result = matcher.lookup("rubbbert");
        assert_eq!(result.match_type, MatchType::Phonetic);
        let raw = text::match_confidence("rubbbert", "robert", result.distance as usize);
        assert!((result.confidence - raw * 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_phonetic_window_bound() {
        // Same soundex bucket but distance 4 stays unmatched.
        let matcher = phonetic_matcher(&["robert"]);
        let result = matcher.lookup("rubbbbert");
        assert!(!result.matched);
    }

    #[test]
    fn test_no_match_is_none() {
        let matcher = names_matcher(&["smith"]);
        let result = matcher.lookup("zzzzzzz");
        assert!(!result.matched);
        assert_eq!(result.match_type, MatchType::None);
        assert_eq!(result.confidence, 0.0);
        assert!(result.term.is_none());
    }

    #[test]
    fn test_empty_and_garbage_input_never_panic() {
        let matcher = names_matcher(&["smith"]);
        for query in ["", "   ", "!!!", "\u{0}\u{0}", "a", "𝕊𝕞𝕚𝕥𝕙"] {
            let result = matcher.lookup(query);
            assert!(result.confidence >= 0.0 && result.confidence <= 1.0);
        }
    }

    #[test]
    fn test_repeated_lookups_identical() {
        let matcher = names_matcher(&["smith", "smyth", "garcia"]);
        for query in ["smith", "smth", "smyhte", "nothing"] {
            let first = matcher.lookup(query);
            for _ in 0..3 {
                assert_eq!(matcher.lookup(query), first);
            }
        }
    }

    #[test]
    fn test_prefilter_rejects_garbage_and_counts() {
        let owned: Vec<String> = vec!["smith".into(), "garcia".into()];
        let config = MatcherConfig {
            // The gate probes the whole deletion neighborhood, so give the
            // filter enough headroom that garbage cannot sneak through on a
            // false positive.
            prefilter_error_rate: 0.0001,
            ..MatcherConfig::names()
        };
        let matcher = FuzzyMatcher::new(&owned, config);
        matcher.lookup("qqqqqqqqqq");
        matcher.lookup("xkxkxkxkxk");
        matcher.lookup("zzzyyyxxx");
        let stats = matcher.stats();
        assert!(stats.prefilter_rejections >= 1);
    }

    #[test]
    fn test_prefilter_never_blocks_fuzzy_reachable_queries() {
        let matcher = names_matcher(&["smith"]);
        // Deletion, insertion, substitution, transposition.
        for query in ["smth", "smiith", "smyth", "simth"] {
            assert!(matcher.lookup(query).matched, "{query} was blocked");
        }
    }

    #[test]
    fn test_cache_hits_counted() {
        let matcher = names_matcher(&["smith"]);
        matcher.lookup("smith");
        matcher.lookup("smith");
        let stats = matcher.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);

        matcher.clear_cache();
        assert_eq!(matcher.stats().cache_entries, 0);
    }

    #[test]
    fn test_strict_preset_is_exact_only() {
        let terms: Vec<String> = vec!["smith".into()];
        let matcher = FuzzyMatcher::new(&terms, MatcherConfig::strict());
        assert!(matcher.lookup("smith").matched);
        assert!(!matcher.lookup("smth").matched);
    }

    #[test]
    fn test_size_accessors() {
        let matcher = names_matcher(&["smith", "garcia", "smith"]);
        assert_eq!(matcher.size(), 2);
        assert!(matcher.index_size() > 0);
    }
}
