//! Gazetteer Configuration
//!
//! Explicit configuration structs constructed by the caller and injected at
//! service start. Nothing here reads the environment; defaults are in the
//! serde helpers at the bottom of the file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{InitError, InitResult};

/// Top-level service configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GazetteerConfig {
    /// Phonetic fallback behavior for the validation ladder.
    #[serde(default)]
    pub phonetic: PhoneticConfig,

    /// Ask for the accelerated deletion-index engine. Honored only when the
    /// `accel` feature is compiled in; otherwise the pure engine runs and a
    /// warning is logged.
    #[serde(default)]
    pub acceleration: bool,

    /// Run the fast matcher pipeline. Turning this off selects the legacy
    /// reference algorithm, a deliberately slower correctness baseline.
    #[serde(default = "default_true")]
    pub fast_path: bool,

    /// Persistent store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Flat term list locations, used when the store is absent or disabled.
    #[serde(default)]
    pub lists: ListConfig,

    /// Matcher preset for person names (first names and surnames).
    #[serde(default = "MatcherConfig::names")]
    pub names: MatcherConfig,

    /// Matcher preset for locations (hospitals and cities).
    #[serde(default = "MatcherConfig::locations")]
    pub locations: MatcherConfig,
}

impl Default for GazetteerConfig {
    fn default() -> Self {
        Self {
            phonetic: PhoneticConfig::default(),
            acceleration: false,
            fast_path: true,
            store: StoreConfig::default(),
            lists: ListConfig::default(),
            names: MatcherConfig::names(),
            locations: MatcherConfig::locations(),
        }
    }
}

impl GazetteerConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &std::path::Path) -> InitResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from a TOML string.
    pub fn from_toml_str(content: &str) -> InitResult<Self> {
        toml::from_str(content).map_err(|e| InitError::Config(e.to_string()))
    }
}

/// Phonetic fallback settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhoneticConfig {
    /// Whether the phonetic retry runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum confidence a phonetic or fuzzy hit needs before the
    /// validation ladder accepts it.
    #[serde(default = "default_phonetic_threshold")]
    pub threshold: f64,
}

impl Default for PhoneticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.95,
        }
    }
}

/// Persistent store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Prefer the memory-mapped store over in-memory matchers when present.
    #[serde(default)]
    pub enabled: bool,

    /// Path to the SQLite gazetteer store.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// mmap window for the store, in bytes.
    #[serde(default = "default_mmap_size")]
    pub mmap_size: u64,

    /// Use the sidecar bloom blob (or an in-memory rebuild) to reject
    /// non-member queries before touching the store.
    #[serde(default = "default_true")]
    pub prefilter: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            mmap_size: default_mmap_size(),
            prefilter: true,
        }
    }
}

/// Flat term list locations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListConfig {
    #[serde(default)]
    pub first_names: Option<PathBuf>,
    #[serde(default)]
    pub surnames: Option<PathBuf>,
    #[serde(default)]
    pub hospitals: Option<PathBuf>,
    #[serde(default)]
    pub cities: Option<PathBuf>,
}

impl ListConfig {
    /// True when at least one list is configured.
    pub fn any_configured(&self) -> bool {
        self.first_names.is_some()
            || self.surnames.is_some()
            || self.hospitals.is_some()
            || self.cities.is_some()
    }
}

/// Per-matcher tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Maximum edit distance the deletion index accepts.
    #[serde(default = "default_max_edit")]
    pub max_edit_distance: usize,

    /// Whether the soundex fallback bucket is built and consulted.
    #[serde(default = "default_true")]
    pub enable_phonetic: bool,

    /// Terms and queries shorter than this skip the fuzzy machinery.
    #[serde(default = "default_min_term_length")]
    pub min_term_length: usize,

    /// Bounded LRU cache capacity for lookup results.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Build a bloom prefilter over the deletion-index keys.
    #[serde(default = "default_true")]
    pub prefilter: bool,

    /// Target false-positive rate for the prefilter.
    #[serde(default = "default_prefilter_rate")]
    pub prefilter_error_rate: f64,

    /// Optional prebuilt prefilter blob. Must cover the matcher's key space;
    /// an invalid blob is discarded and the filter rebuilt from the index.
    #[serde(default)]
    pub prefilter_blob: Option<PathBuf>,

    /// Use the accelerated engine when available.
    #[serde(default)]
    pub accelerated: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_edit_distance: 2,
            enable_phonetic: true,
            min_term_length: 3,
            cache_size: 10_000,
            prefilter: true,
            prefilter_error_rate: 0.01,
            prefilter_blob: None,
            accelerated: false,
        }
    }
}

impl MatcherConfig {
    /// Person names: tight minimum length, phonetic fallback on.
    pub fn names() -> Self {
        Self {
            max_edit_distance: 2,
            enable_phonetic: true,
            min_term_length: 2,
            cache_size: 5_000,
            ..Default::default()
        }
    }

    /// Hospitals and cities: longer minimum, no phonetic fallback.
    pub fn locations() -> Self {
        Self {
            max_edit_distance: 2,
            enable_phonetic: false,
            min_term_length: 3,
            cache_size: 2_000,
            ..Default::default()
        }
    }

    /// Exact membership only.
    pub fn strict() -> Self {
        Self {
            max_edit_distance: 0,
            enable_phonetic: false,
            min_term_length: 2,
            cache_size: 1_000,
            ..Default::default()
        }
    }
}

// Default value helpers for serde
fn default_true() -> bool {
    true
}
fn default_phonetic_threshold() -> f64 {
    0.95
}
fn default_mmap_size() -> u64 {
    128 * 1024 * 1024
}
fn default_max_edit() -> usize {
    2
}
fn default_min_term_length() -> usize {
    3
}
fn default_cache_size() -> usize {
    10_000
}
fn default_prefilter_rate() -> f64 {
    0.01
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GazetteerConfig::default();
        assert!(config.phonetic.enabled);
        assert_eq!(config.phonetic.threshold, 0.95);
        assert!(!config.acceleration);
        assert!(!config.store.enabled);
        assert!(config.names.enable_phonetic);
        assert!(!config.locations.enable_phonetic);
    }

    #[test]
    fn test_presets() {
        let names = MatcherConfig::names();
        assert_eq!(names.max_edit_distance, 2);
        assert_eq!(names.min_term_length, 2);
        assert!(names.enable_phonetic);

        let locations = MatcherConfig::locations();
        assert_eq!(locations.min_term_length, 3);
        assert!(!locations.enable_phonetic);

        let strict = MatcherConfig::strict();
        assert_eq!(strict.max_edit_distance, 0);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
acceleration = true

[phonetic]
threshold = 0.9

[store]
enabled = true
path = "/data/gazetteer.db"

[names]
max_edit_distance = 1
cache_size = 256
"#;
        let config = GazetteerConfig::from_toml_str(toml_str).unwrap();
        assert!(config.acceleration);
        assert_eq!(config.phonetic.threshold, 0.9);
        assert!(config.store.enabled);
        assert_eq!(config.names.max_edit_distance, 1);
        assert_eq!(config.names.cache_size, 256);
        // Unset sections keep their defaults.
        assert_eq!(config.locations.min_term_length, 3);
    }
}
