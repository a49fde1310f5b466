//! Gazetteer Service
//!
//! The orchestration layer the redaction pipeline talks to. Constructed once
//! at process start and passed around by handle; owns backend selection, the
//! name-validation ladder, two-word confidence scoring, and the hospital
//! whitelist that keeps institution tokens out of person-name redaction.
//!
//! Backend selection prefers the memory-mapped store when configured and
//! present (large resident-memory savings); otherwise the flat term lists are
//! loaded and matched in memory. Initialization failures are absorbed by
//! [`GazetteerService::new`] and reported through [`GazetteerService::health`];
//! [`GazetteerService::new_strict`] raises them for startup checks instead.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{GazetteerConfig, MatcherConfig};
use crate::error::InitResult;
use crate::matcher::{OcrMatcher, OcrStats};
use crate::store::{PersistentStore, StoreStats};
use crate::text;
use crate::types::{MatchResult, MatchType, NameCategory, TermLists};

/// Context words that license the hospital-phrase search at all. Without one
/// of these near the candidate, no whitelist matching runs.
const HOSPITAL_CONTEXT_KEYWORDS: &[&str] = &[
    "hospital",
    "clinic",
    "medical center",
    "infirmary",
    "memorial",
    "regional",
    "general",
    "health",
    "healthcare",
];

/// Threshold on [`GazetteerService::name_confidence`] for the boolean
/// real-name decision.
const LIKELY_NAME_THRESHOLD: f64 = 0.5;

/// Health snapshot, distinct from the strict constructor's error path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub healthy: bool,
    pub degraded: bool,
    pub backend: &'static str,
    pub reason: Option<String>,
}

/// Aggregated counters across whichever backend is active.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub backend: &'static str,
    pub first_names: Option<OcrStats>,
    pub surnames: Option<OcrStats>,
    pub hospitals: Option<OcrStats>,
    pub cities: Option<OcrStats>,
    pub store: Option<StoreStats>,
}

struct MemoryMatchers {
    first_names: OcrMatcher,
    surnames: OcrMatcher,
    hospitals: OcrMatcher,
    cities: OcrMatcher,
}

impl MemoryMatchers {
    fn build(lists: &TermLists, config: &GazetteerConfig) -> Self {
        let names_cfg = category_config(&config.names, config);
        let locations_cfg = category_config(&config.locations, config);

        Self {
            first_names: OcrMatcher::new(&lists.first_names, names_cfg.clone(), config.fast_path),
            surnames: OcrMatcher::new(&lists.surnames, names_cfg, config.fast_path),
            hospitals: OcrMatcher::new(&lists.hospitals, locations_cfg.clone(), config.fast_path),
            cities: OcrMatcher::new(&lists.cities, locations_cfg, config.fast_path),
        }
    }

    fn matcher(&self, category: NameCategory) -> &OcrMatcher {
        match category {
            NameCategory::FirstName => &self.first_names,
            NameCategory::Surname => &self.surnames,
            NameCategory::Hospital => &self.hospitals,
            NameCategory::City => &self.cities,
        }
    }
}

fn category_config(base: &MatcherConfig, config: &GazetteerConfig) -> MatcherConfig {
    MatcherConfig {
        accelerated: config.acceleration,
        enable_phonetic: base.enable_phonetic && config.phonetic.enabled,
        ..base.clone()
    }
}

enum Backend {
    Persistent(PersistentStore),
    Memory(Box<MemoryMatchers>),
    Unavailable,
}

/// Handle to the gazetteer engine.
pub struct GazetteerService {
    config: GazetteerConfig,
    backend: Backend,
    /// Multi-word hospital names, normalized, for whitelist phrase matching.
    hospital_phrases: Vec<String>,
    degraded_reason: Option<String>,
}

impl GazetteerService {
    /// Construct the service, absorbing initialization failures into
    /// degraded mode. The pipeline keeps running either way; `health()`
    /// tells operators why lookups are all coming back negative.
    pub async fn new(config: GazetteerConfig) -> Self {
        match Self::try_init(config.clone()).await {
            Ok(service) => service,
            Err(err) => {
                warn!(%err, "gazetteer init failed, service is degraded");
                Self {
                    config,
                    backend: Backend::Unavailable,
                    hospital_phrases: Vec::new(),
                    degraded_reason: Some(err.to_string()),
                }
            }
        }
    }

    /// Construct the service, surfacing the typed error instead. Meant for
    /// startup health checks that should fail fast.
    pub async fn new_strict(config: GazetteerConfig) -> InitResult<Self> {
        Self::try_init(config).await
    }

    async fn try_init(config: GazetteerConfig) -> InitResult<Self> {
        if config.store.enabled {
            match PersistentStore::open(&config.store).await {
                Ok(store) => {
                    let hospital_phrases = store
                        .multi_word_hospitals()
                        .await
                        .iter()
                        .map(|p| text::normalize(p))
                        .collect();
                    info!(path = %store.path().display(), "gazetteer backed by persistent store");
                    return Ok(Self {
                        config,
                        backend: Backend::Persistent(store),
                        hospital_phrases,
                        degraded_reason: None,
                    });
                }
                Err(err) if config.lists.any_configured() => {
                    warn!(%err, "persistent store unavailable, falling back to term lists");
                    let mut service = Self::init_memory(config).await?;
                    service.degraded_reason =
                        Some(format!("persistent store unavailable: {err}"));
                    return Ok(service);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Self::init_memory(config).await
    }

    async fn init_memory(config: GazetteerConfig) -> InitResult<Self> {
        let lists = TermLists::load(&config.lists)?;
        let hospital_phrases = lists
            .hospitals
            .iter()
            .map(|p| text::normalize(p))
            .filter(|p| p.contains(' '))
            .collect();
        let matchers = MemoryMatchers::build(&lists, &config);
        info!(terms = lists.len(), "gazetteer backed by in-memory matchers");

        Ok(Self {
            config,
            backend: Backend::Memory(Box::new(matchers)),
            hospital_phrases,
            degraded_reason: None,
        })
    }

    // ------------------------------------------------------------------
    // Membership API
    // ------------------------------------------------------------------

    pub async fn is_first_name(&self, phrase: &str) -> bool {
        self.validate(phrase, NameCategory::FirstName).await
    }

    pub async fn is_surname(&self, phrase: &str) -> bool {
        self.validate(phrase, NameCategory::Surname).await
    }

    pub async fn is_hospital(&self, phrase: &str) -> bool {
        self.validate(phrase, NameCategory::Hospital).await
    }

    pub async fn is_city(&self, phrase: &str) -> bool {
        self.validate(phrase, NameCategory::City).await
    }

    /// The validation ladder: exact hit, then an OCR-fold retry, then a
    /// character-run-deduplication retry, then the thresholded phonetic
    /// fallback. Malformed input validates false, never errors.
    async fn validate(&self, phrase: &str, category: NameCategory) -> bool {
        let normalized = text::normalize(phrase);
        if normalized.is_empty() {
            return false;
        }

        if self.exact_hit(&normalized, category).await {
            return true;
        }

        let folded = text::fold_ocr(&normalized);
        if folded != normalized && self.exact_hit(&folded, category).await {
            return true;
        }

        let deduped = text::collapse_runs(&folded);
        if deduped != folded && self.exact_hit(&deduped, category).await {
            return true;
        }

        if self.config.phonetic.enabled {
            if let Some(confidence) = self.fuzzy_confidence(&normalized, category).await {
                return confidence >= self.config.phonetic.threshold;
            }
        }

        false
    }

    async fn exact_hit(&self, normalized: &str, category: NameCategory) -> bool {
        match &self.backend {
            Backend::Persistent(store) => store.has_exact(normalized, category).await,
            Backend::Memory(matchers) => matchers.matcher(category).contains(normalized),
            Backend::Unavailable => false,
        }
    }

    /// Best fuzzy/phonetic confidence the backend can offer for this token.
    async fn fuzzy_confidence(&self, normalized: &str, category: NameCategory) -> Option<f64> {
        match &self.backend {
            Backend::Memory(matchers) => {
                let result = matchers.matcher(category).lookup(normalized);
                result.matched.then_some(result.confidence)
            }
            Backend::Persistent(store) => {
                if !category.has_soundex() {
                    return None;
                }
                let window = self.config.names.max_edit_distance + 1;
                let mut best: Option<(String, usize)> = None;
                for hit in store.phonetic_match(normalized).await {
                    if hit.category != category {
                        continue;
                    }
                    let distance = text::damerau_levenshtein(normalized, &hit.name, window);
                    if distance <= window
                        && best.as_ref().map_or(true, |(_, d)| distance < *d)
                    {
                        best = Some((hit.name, distance));
                    }
                }
                best.map(|(name, distance)| {
                    text::match_confidence(normalized, &name, distance) * 0.9
                })
            }
            Backend::Unavailable => None,
        }
    }

    // ------------------------------------------------------------------
    // Name confidence
    // ------------------------------------------------------------------

    /// Two-word confidence model. Both words validating is certainty; a
    /// validated first name alone is likelier a real person than a validated
    /// surname alone, except under the multi-surname convention where the
    /// leading token is itself a surname.
    pub async fn name_confidence(&self, phrase: &str) -> f64 {
        let tokens: Vec<&str> = phrase.split_whitespace().collect();
        match tokens.as_slice() {
            [] => 0.0,
            [single] => {
                if self.validate(single, NameCategory::FirstName).await
                    || self.validate(single, NameCategory::Surname).await
                {
                    1.0
                } else {
                    0.0
                }
            }
            [first, .., last] => {
                let first_ok = self.validate(first, NameCategory::FirstName).await;
                let last_ok = self.validate(last, NameCategory::Surname).await;
                match (first_ok, last_ok) {
                    (true, true) => 1.0,
                    (true, false) => 0.7,
                    (false, true) => {
                        if self.validate(first, NameCategory::Surname).await {
                            0.5
                        } else {
                            0.2
                        }
                    }
                    (false, false) => 0.0,
                }
            }
        }
    }

    pub async fn is_likely_real_name(&self, phrase: &str) -> bool {
        self.name_confidence(phrase).await >= LIKELY_NAME_THRESHOLD
    }

    // ------------------------------------------------------------------
    // Hospital whitelist
    // ------------------------------------------------------------------

    /// Whether `candidate` sits inside a known hospital name in `context`.
    /// Tokens inside institution names must be exempted from person-name
    /// redaction ("Johns" in "Johns Hopkins Hospital" is not a patient).
    pub fn is_part_of_hospital_name(&self, candidate: &str, context: &str) -> bool {
        let ctx = context.to_lowercase();
        if !HOSPITAL_CONTEXT_KEYWORDS
            .iter()
            .any(|keyword| !word_occurrences(&ctx, keyword).is_empty())
        {
            return false;
        }

        let mut spans: Vec<(usize, usize)> = Vec::new();
        for phrase in &self.hospital_phrases {
            for start in word_occurrences(&ctx, phrase) {
                spans.push((start, start + phrase.len()));
            }
        }
        if spans.is_empty() {
            return false;
        }

        // Longest phrase wins overlaps, earliest position breaks ties.
        spans.sort_by(|a, b| (b.1 - b.0).cmp(&(a.1 - a.0)).then(a.0.cmp(&b.0)));
        let mut kept: Vec<(usize, usize)> = Vec::new();
        for span in spans {
            if !kept.iter().any(|k| span.0 < k.1 && k.0 < span.1) {
                kept.push(span);
            }
        }

        let candidate = text::normalize(candidate);
        if candidate.is_empty() {
            return false;
        }
        word_occurrences(&ctx, &candidate)
            .into_iter()
            .any(|start| {
                let end = start + candidate.len();
                kept.iter().any(|(s, e)| start >= *s && end <= *e)
            })
    }

    // ------------------------------------------------------------------
    // Generic lookup
    // ------------------------------------------------------------------

    /// Best fuzzy result across every gazetteer source.
    pub async fn lookup(&self, term: &str) -> MatchResult {
        match &self.backend {
            Backend::Memory(matchers) => {
                let mut best = MatchResult::none();
                for category in [
                    NameCategory::FirstName,
                    NameCategory::Surname,
                    NameCategory::Hospital,
                    NameCategory::City,
                ] {
                    let result = matchers.matcher(category).lookup(term);
                    if result.matched && result.confidence > best.confidence {
                        best = result;
                    }
                }
                best
            }
            Backend::Persistent(store) => self.store_lookup(store, term).await,
            Backend::Unavailable => MatchResult::none(),
        }
    }

    async fn store_lookup(&self, store: &PersistentStore, term: &str) -> MatchResult {
        let normalized = text::normalize(term);
        if normalized.is_empty() {
            return MatchResult::none();
        }

        for category in [
            NameCategory::FirstName,
            NameCategory::Surname,
            NameCategory::Hospital,
            NameCategory::City,
        ] {
            if store.has_exact(&normalized, category).await {
                return MatchResult::exact(normalized);
            }
        }

        if let Some(hit) = store.fuzzy_match(&normalized, 5).await.into_iter().next() {
            let bound = normalized.chars().count().max(hit.name.chars().count());
            let distance = text::damerau_levenshtein(&normalized, &hit.name, bound);
            return MatchResult {
                matched: true,
                term: Some(hit.name),
                distance: distance as i64,
                confidence: hit.score.min(0.99),
                match_type: MatchType::Fuzzy,
            };
        }

        let window = self.config.names.max_edit_distance + 1;
        let mut best: Option<(String, usize)> = None;
        for hit in store.phonetic_match(&normalized).await {
            let distance = text::damerau_levenshtein(&normalized, &hit.name, window);
            if distance <= window && best.as_ref().map_or(true, |(_, d)| distance < *d) {
                best = Some((hit.name, distance));
            }
        }
        if let Some((name, distance)) = best {
            let confidence = text::match_confidence(&normalized, &name, distance) * 0.9;
            return MatchResult {
                matched: true,
                term: Some(name),
                distance: distance as i64,
                confidence,
                match_type: MatchType::Phonetic,
            };
        }

        MatchResult::none()
    }

    // ------------------------------------------------------------------
    // Lifecycle, health, observability
    // ------------------------------------------------------------------

    pub fn is_healthy(&self) -> bool {
        !matches!(self.backend, Backend::Unavailable)
    }

    pub fn health(&self) -> HealthStatus {
        let backend = match &self.backend {
            Backend::Persistent(_) => "persistent",
            Backend::Memory(_) => "memory",
            Backend::Unavailable => "unavailable",
        };
        let degraded = self.degraded_reason.is_some() || !self.is_healthy();
        HealthStatus {
            healthy: self.is_healthy(),
            degraded,
            backend,
            reason: self.degraded_reason.clone(),
        }
    }

    pub fn stats(&self) -> ServiceStats {
        match &self.backend {
            Backend::Memory(matchers) => ServiceStats {
                backend: "memory",
                first_names: Some(matchers.first_names.stats()),
                surnames: Some(matchers.surnames.stats()),
                hospitals: Some(matchers.hospitals.stats()),
                cities: Some(matchers.cities.stats()),
                store: None,
            },
            Backend::Persistent(store) => ServiceStats {
                backend: "persistent",
                first_names: None,
                surnames: None,
                hospitals: None,
                cities: None,
                store: Some(store.stats()),
            },
            Backend::Unavailable => ServiceStats {
                backend: "unavailable",
                first_names: None,
                surnames: None,
                hospitals: None,
                cities: None,
                store: None,
            },
        }
    }

    /// Drop every matcher cache. The indices themselves are immutable.
    pub fn clear_caches(&self) {
        if let Backend::Memory(matchers) = &self.backend {
            matchers.first_names.clear_cache();
            matchers.surnames.clear_cache();
            matchers.hospitals.clear_cache();
            matchers.cities.clear_cache();
        }
    }

    /// Explicit shutdown. Consumes the handle; the store pool closes cleanly.
    pub async fn shutdown(self) {
        if let Backend::Persistent(mut store) = self.backend {
            store.shutdown().await;
        }
    }
}

/// Byte offsets where `needle` occurs in `haystack` on word boundaries.
/// Multi-word needles match as phrases; boundaries are non-alphanumeric
/// characters or the string edges.
fn word_occurrences(haystack: &str, needle: &str) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }
    haystack
        .match_indices(needle)
        .filter(|(start, _)| {
            let before_ok = haystack[..*start]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric());
            let after_ok = haystack[start + needle.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric());
            before_ok && after_ok
        })
        .map(|(start, _)| start)
        .collect()
}
