//! OCR-Aware Matcher
//!
//! Wraps the fuzzy matcher with a homoglyph fold consulted before any edit
//! distance work. Scanned documents hand us `PENEL0PE` and `W1LLIAM`; the
//! fold maps those straight onto their canonical terms at a fixed 0.95
//! confidence instead of spending the fuzzy budget on them.
//!
//! The legacy reference algorithm is retained for when the fast path is
//! disabled. It scans the dictionary inside a length window with Jaro-Winkler
//! as a cheap prefilter. Slow by design; useful as a correctness baseline.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::fuzzy::{FuzzyMatcher, MatcherStats};
use crate::config::MatcherConfig;
use crate::text;
use crate::types::{MatchResult, MatchType};

/// Jaro-Winkler floor below which the legacy scan skips the Levenshtein
/// computation entirely.
const LEGACY_JW_FLOOR: f64 = 0.7;

/// Counter snapshot for observability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrStats {
    pub fast_path: bool,
    pub terms: usize,
    pub matcher: Option<MatcherStats>,
}

/// OCR-normalizing wrapper around [`FuzzyMatcher`].
pub struct OcrMatcher {
    /// Fast path. Absent when the matcher runs the legacy reference scan.
    inner: Option<FuzzyMatcher>,
    /// Folded form of every term mapped back to its canonical spelling.
    canonical: HashMap<String, String>,
    terms: Vec<String>,
    exact: HashSet<String>,
    soundex_buckets: HashMap<String, Vec<usize>>,
    max_distance: usize,
}

impl OcrMatcher {
    pub fn new(raw_terms: &[String], config: MatcherConfig, use_fast_path: bool) -> Self {
        let min_len = config.min_term_length;
        let max_distance = config.max_edit_distance;

        let mut terms: Vec<String> = Vec::new();
        let mut exact = HashSet::new();
        let mut canonical = HashMap::new();
        for raw in raw_terms {
            let term = text::normalize(raw);
            if term.chars().count() < min_len || !exact.insert(term.clone()) {
                continue;
            }
            canonical.entry(text::fold_ocr(&term)).or_insert_with(|| term.clone());
            terms.push(term);
        }

        let mut soundex_buckets: HashMap<String, Vec<usize>> = HashMap::new();
        let inner = if use_fast_path {
            Some(FuzzyMatcher::new(raw_terms, config))
        } else {
            for (i, term) in terms.iter().enumerate() {
                soundex_buckets.entry(text::soundex(term)).or_default().push(i);
            }
            None
        };

        Self {
            inner,
            canonical,
            terms,
            exact,
            soundex_buckets,
            max_distance,
        }
    }

    /// Resolve a query. Homoglyph fold first, then the fuzzy matcher (or the
    /// legacy scan when the fast path is off).
    pub fn lookup(&self, query: &str) -> MatchResult {
        let normalized = text::normalize(query);
        match &self.inner {
            Some(inner) => self.fast_lookup(&normalized, inner),
            None => self.legacy_lookup(&normalized),
        }
    }

    pub fn has(&self, query: &str) -> bool {
        self.lookup(query).matched
    }

    pub fn confidence(&self, query: &str) -> f64 {
        self.lookup(query).confidence
    }

    /// Exact membership of an already-normalized term.
    pub fn contains(&self, normalized: &str) -> bool {
        self.exact.contains(normalized)
    }

    pub fn clear_cache(&self) {
        if let Some(inner) = &self.inner {
            inner.clear_cache();
        }
    }

    pub fn size(&self) -> usize {
        self.exact.len()
    }

    pub fn stats(&self) -> OcrStats {
        OcrStats {
            fast_path: self.inner.is_some(),
            terms: self.exact.len(),
            matcher: self.inner.as_ref().map(FuzzyMatcher::stats),
        }
    }

    // ------------------------------------------------------------------
    // Fast path
    // ------------------------------------------------------------------

    fn fast_lookup(&self, query: &str, inner: &FuzzyMatcher) -> MatchResult {
        if let Some(result) = self.folded_hit(query) {
            return result;
        }

        let mut result = inner.lookup(query);
        result.match_type = match result.match_type {
            MatchType::Delete1 | MatchType::Delete2 | MatchType::Fuzzy => MatchType::Fuzzy,
            other => other,
        };
        result
    }

    /// NORMALIZED hit: the folded query names a canonical term that the raw
    /// query itself is not.
    fn folded_hit(&self, query: &str) -> Option<MatchResult> {
        let folded = text::fold_ocr(query);
        if folded == query {
            return None;
        }
        let canon = self.canonical.get(&folded)?;
        if canon == query {
            return None;
        }

        let bound = query.chars().count().max(canon.chars().count());
        let distance = text::damerau_levenshtein(query, canon, bound);
        Some(MatchResult {
            matched: true,
            term: Some(canon.clone()),
            distance: distance as i64,
            confidence: 0.95,
            match_type: MatchType::Normalized,
        })
    }

    // ------------------------------------------------------------------
    // Legacy reference path
    // ------------------------------------------------------------------

    fn legacy_lookup(&self, query: &str) -> MatchResult {
        if self.exact.contains(query) {
            return MatchResult::exact(query);
        }

        if let Some(result) = self.folded_hit(query) {
            return result;
        }

        if let Some(result) = self.legacy_phonetic(query) {
            return result;
        }

        if let Some(result) = self.legacy_scan(query) {
            return result;
        }

        MatchResult::none()
    }

    fn legacy_phonetic(&self, query: &str) -> Option<MatchResult> {
        let bucket = self.soundex_buckets.get(&text::soundex(query))?;

        let mut best: Option<(&str, usize)> = None;
        for &i in bucket {
            let term = self.terms[i].as_str();
            let distance = strsim::levenshtein(query, term);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((term, distance));
            }
        }

        let (term, distance) = best?;
        if distance > self.max_distance {
            return None;
        }
        Some(self.legacy_result(query, term, distance, MatchType::Phonetic))
    }

    /// Full scan bounded by a length window, with Jaro-Winkler screening out
    /// most of the Levenshtein work.
    fn legacy_scan(&self, query: &str) -> Option<MatchResult> {
        let query_len = query.chars().count();

        let mut best: Option<(&str, usize)> = None;
        let mut best_jw = 0.0f64;
        for term in &self.terms {
            let term_len = term.chars().count();
            if term_len.abs_diff(query_len) > self.max_distance {
                continue;
            }

            let jw = strsim::jaro_winkler(query, term);
            if jw <= LEGACY_JW_FLOOR && jw <= best_jw {
                continue;
            }

            let distance = strsim::levenshtein(query, term);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((term.as_str(), distance));
                best_jw = jw;
                if distance == 0 {
                    break;
                }
            }
        }

        let (term, distance) = best?;
        if distance > self.max_distance {
            return None;
        }
        Some(self.legacy_result(query, term, distance, MatchType::Fuzzy))
    }

    fn legacy_result(
        &self,
        query: &str,
        term: &str,
        distance: usize,
        match_type: MatchType,
    ) -> MatchResult {
        MatchResult {
            matched: true,
            term: Some(term.to_string()),
            distance: distance as i64,
            confidence: legacy_confidence(query, term, distance),
            match_type,
        }
    }
}

/// Blended similarity score for the reference path.
fn legacy_confidence(query: &str, term: &str, distance: usize) -> f64 {
    let jw = strsim::jaro_winkler(query, term);
    let lev_sim = strsim::normalized_levenshtein(query, term);
    let soundex_bonus = if text::soundex(query) == text::soundex(term) {
        1.0
    } else {
        0.0
    };

    let blended = 0.6 * jw + 0.3 * lev_sim + 0.1 * soundex_bonus;
    (blended * 0.95_f64.powi(distance as i32)).min(0.98)
}
