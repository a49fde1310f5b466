//! Persistent Gazetteer Store
//!
//! Read-only, memory-mapped SQLite backend. Keeps resident memory near zero
//! by letting the OS page cache carry the working set; safe for concurrent
//! readers because nothing writes at query time.
//!
//! Availability policy: a store that cannot be opened marks itself
//! unavailable and every query method returns an empty or false result
//! rather than an error. Callers treat "unavailable" exactly like "not
//! found" and rely on the health check to notice degraded mode.

pub mod schema;

pub use schema::{create_store, sidecar_blob_path};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::bloom::{BlobCodec, BloomFilter};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::text;
use crate::types::NameCategory;

/// A ranked hit from the trigram full-text index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FuzzyHit {
    pub name: String,
    pub source: String,
    /// BM25 rank remapped into [0, 1], larger is better.
    pub score: f64,
}

/// A soundex-bucket hit from one of the person-name tables.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneticHit {
    pub name: String,
    pub category: NameCategory,
}

/// Counter snapshot for observability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub available: bool,
    pub hits: u64,
    pub misses: u64,
    pub prefilter_rejections: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    prefilter_rejections: AtomicU64,
}

/// Handle to the read-only gazetteer store.
pub struct PersistentStore {
    pool: Option<SqlitePool>,
    path: PathBuf,
    prefilter: Option<BloomFilter>,
    counters: Counters,
}

/// Soundex results per table are capped; a bucket larger than this is noise.
const PHONETIC_LIMIT: i64 = 20;

impl PersistentStore {
    /// Open the store, failing loudly. Used by the strict startup path.
    pub async fn open(config: &StoreConfig) -> StoreResult<Self> {
        let Some(path) = config.path.as_deref() else {
            return Err(StoreError::NotFound {
                path: "(store path not configured)".to_string(),
            });
        };
        if !path.exists() {
            return Err(StoreError::NotFound {
                path: path.display().to_string(),
            });
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .immutable(true)
            .pragma("mmap_size", config.mmap_size.to_string())
            .pragma("query_only", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        // The info row doubles as a schema handshake.
        let info_row = sqlx::query("SELECT value FROM metadata WHERE key = 'info'")
            .fetch_optional(&pool)
            .await
            .map_err(|e| StoreError::Schema(e.to_string()))?;
        if info_row.is_none() {
            return Err(StoreError::Schema("metadata info row missing".to_string()));
        }

        let prefilter = if config.prefilter {
            Some(Self::load_or_rebuild_prefilter(&pool, path).await?)
        } else {
            None
        };

        info!(path = %path.display(), prefilter = prefilter.is_some(), "gazetteer store opened");

        Ok(Self {
            pool: Some(pool),
            path: path.to_path_buf(),
            prefilter,
            counters: Counters::default(),
        })
    }

    /// Open leniently: failures leave an unavailable handle whose queries
    /// all come back empty.
    pub async fn open_lenient(config: &StoreConfig) -> Self {
        match Self::open(config).await {
            Ok(store) => store,
            Err(err) => {
                warn!(%err, "gazetteer store unavailable, queries will return empty");
                Self {
                    pool: None,
                    path: config.path.clone().unwrap_or_default(),
                    prefilter: None,
                    counters: Counters::default(),
                }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Indexed case-insensitive equality lookup, bloom-prefiltered.
    pub async fn has_exact(&self, name: &str, category: NameCategory) -> bool {
        let Some(pool) = &self.pool else {
            return false;
        };

        let normalized = text::normalize(name);
        if normalized.is_empty() {
            return false;
        }

        if let Some(filter) = &self.prefilter {
            if !filter.contains(&normalized) {
                self.counters
                    .prefilter_rejections
                    .fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }

        let sql = format!(
            "SELECT 1 FROM {} WHERE name = ? COLLATE NOCASE LIMIT 1",
            category.table()
        );
        let found = sqlx::query(&sql)
            .bind(&normalized)
            .fetch_optional(pool)
            .await
            .ok()
            .flatten()
            .is_some();

        if found {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Person-name membership across both name tables.
    pub async fn is_name(&self, query: &str) -> bool {
        self.has_exact(query, NameCategory::FirstName).await
            || self.has_exact(query, NameCategory::Surname).await
    }

    /// Trigram full-text query across every name source, BM25-ranked.
    pub async fn fuzzy_match(&self, query: &str, limit: usize) -> Vec<FuzzyHit> {
        let Some(pool) = &self.pool else {
            return Vec::new();
        };

        let normalized = text::normalize(query);
        // The trigram tokenizer needs at least one full trigram.
        if normalized.chars().count() < 3 || limit == 0 {
            return Vec::new();
        }

        // Quote the query so untrusted text cannot reach FTS5 operators.
        let match_expr = format!("\"{}\"", normalized.replace('"', "\"\""));

        let rows = sqlx::query(
            "SELECT name, source, bm25(gazetteer_fts) AS rank
             FROM gazetteer_fts
             WHERE gazetteer_fts MATCH ?
             ORDER BY rank
             LIMIT ?",
        )
        .bind(&match_expr)
        .bind(limit as i64)
        .fetch_all(pool)
        .await
        .unwrap_or_default();

        rows.into_iter()
            .filter_map(|row| {
                let name: String = row.try_get("name").ok()?;
                let source: String = row.try_get("source").ok()?;
                let rank: f64 = row.try_get("rank").ok()?;
                Some(FuzzyHit {
                    name,
                    source,
                    score: bm25_to_score(rank),
                })
            })
            .collect()
    }

    /// Indexed soundex lookup over the person-name tables.
    pub async fn phonetic_match(&self, query: &str) -> Vec<PhoneticHit> {
        let Some(pool) = &self.pool else {
            return Vec::new();
        };

        let normalized = text::normalize(query);
        if normalized.is_empty() {
            return Vec::new();
        }
        let code = text::soundex(&normalized);

        let mut hits = Vec::new();
        for category in [NameCategory::FirstName, NameCategory::Surname] {
            let sql = format!(
                "SELECT name FROM {} WHERE soundex = ? LIMIT ?",
                category.table()
            );
            let rows = sqlx::query(&sql)
                .bind(&code)
                .bind(PHONETIC_LIMIT)
                .fetch_all(pool)
                .await
                .unwrap_or_default();

            for row in rows {
                if let Ok(name) = row.try_get::<String, _>("name") {
                    hits.push(PhoneticHit { name, category });
                }
            }
        }
        hits
    }

    /// Names of every multi-word hospital, for whitelist phrase matching.
    pub async fn multi_word_hospitals(&self) -> Vec<String> {
        let Some(pool) = &self.pool else {
            return Vec::new();
        };

        sqlx::query("SELECT name FROM hospitals WHERE name LIKE '% %'")
            .fetch_all(pool)
            .await
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| row.try_get::<String, _>("name").ok())
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            available: self.is_available(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            prefilter_rejections: self.counters.prefilter_rejections.load(Ordering::Relaxed),
        }
    }

    /// Close the pool. Queries afterwards behave as unavailable.
    pub async fn shutdown(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
    }

    /// Sidecar blob when it validates; otherwise rebuilt from the store's
    /// own rows. A bad blob is fatal for that blob only.
    async fn load_or_rebuild_prefilter(pool: &SqlitePool, path: &Path) -> StoreResult<BloomFilter> {
        let blob_path = sidecar_blob_path(path);
        if blob_path.exists() {
            match BlobCodec::load(&blob_path) {
                Ok((filter, metadata)) => {
                    info!(
                        path = %blob_path.display(),
                        items = metadata.item_count,
                        "store prefilter blob loaded"
                    );
                    return Ok(filter);
                }
                Err(err) => {
                    warn!(path = %blob_path.display(), %err, "store prefilter blob rejected, rebuilding from rows");
                }
            }
        }

        let mut names: Vec<String> = Vec::new();
        for table in ["first_names", "surnames", "hospitals", "cities"] {
            let rows = sqlx::query(&format!("SELECT name FROM {table}"))
                .fetch_all(pool)
                .await?;
            for row in rows {
                if let Ok(name) = row.try_get::<String, _>("name") {
                    names.push(name);
                }
            }
        }

        let mut filter = BloomFilter::with_rate(names.len(), 0.01);
        for name in &names {
            filter.insert(&text::normalize(name));
        }
        Ok(filter)
    }
}

/// Monotone remap of an FTS5 BM25 rank (more negative is better) into [0, 1].
fn bm25_to_score(rank: f64) -> f64 {
    let relevance = (-rank).max(0.0);
    relevance / (1.0 + relevance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TermLists;

    fn sample_lists() -> TermLists {
        TermLists {
            first_names: vec!["john".into(), "penelope".into(), "maria".into()],
            surnames: vec!["smith".into(), "garcia".into()],
            hospitals: vec!["johns hopkins hospital".into(), "mercy clinic".into()],
            cities: vec!["baltimore".into()],
        }
    }

    async fn built_store(dir: &tempfile::TempDir) -> PersistentStore {
        let path = dir.path().join("gazetteer.db");
        create_store(&path, &sample_lists(), 0.01).await.unwrap();
        let config = StoreConfig {
            enabled: true,
            path: Some(path),
            ..StoreConfig::default()
        };
        PersistentStore::open(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_exact_lookup_per_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = built_store(&dir).await;

        assert!(store.has_exact("john", NameCategory::FirstName).await);
        assert!(store.has_exact("JOHN", NameCategory::FirstName).await);
        assert!(store.has_exact("smith", NameCategory::Surname).await);
        assert!(store.has_exact("johns hopkins hospital", NameCategory::Hospital).await);
        assert!(store.has_exact("baltimore", NameCategory::City).await);

        assert!(!store.has_exact("john", NameCategory::Surname).await);
        assert!(!store.has_exact("nobody", NameCategory::FirstName).await);
    }

    #[tokio::test]
    async fn test_is_name_spans_both_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = built_store(&dir).await;

        assert!(store.is_name("john").await);
        assert!(store.is_name("garcia").await);
        assert!(!store.is_name("baltimore").await);
    }

    #[tokio::test]
    async fn test_fuzzy_match_ranks_near_terms() {
        let dir = tempfile::tempdir().unwrap();
        let store = built_store(&dir).await;

        let hits = store.fuzzy_match("penelope", 5).await;
        assert!(!hits.is_empty());
        assert_eq!(hits[0].name, "penelope");
        assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);

        // Shorter than a trigram returns nothing instead of erroring.
        assert!(store.fuzzy_match("pe", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_fuzzy_match_survives_hostile_input() {
        let dir = tempfile::tempdir().unwrap();
        let store = built_store(&dir).await;

        for query in ["a\" OR \"b", "NEAR(x y)", "name:*", "\"\"\""] {
            let _ = store.fuzzy_match(query, 5).await;
        }
    }

    #[tokio::test]
    async fn test_phonetic_match_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let store = built_store(&dir).await;

        let hits = store.phonetic_match("smyth").await;
        assert!(hits.iter().any(|h| h.name == "smith"));
        assert!(hits.iter().all(|h| h.category.has_soundex()));
    }

    #[tokio::test]
    async fn test_unavailable_store_returns_empty() {
        let config = StoreConfig {
            enabled: true,
            path: Some("/nonexistent/gazetteer.db".into()),
            ..StoreConfig::default()
        };
        let store = PersistentStore::open_lenient(&config).await;

        assert!(!store.is_available());
        assert!(!store.has_exact("john", NameCategory::FirstName).await);
        assert!(store.fuzzy_match("john", 5).await.is_empty());
        assert!(store.phonetic_match("john").await.is_empty());
        assert!(!store.stats().available);
    }

    #[tokio::test]
    async fn test_strict_open_fails_on_missing_store() {
        let config = StoreConfig {
            enabled: true,
            path: Some("/nonexistent/gazetteer.db".into()),
            ..StoreConfig::default()
        };
        assert!(matches!(
            PersistentStore::open(&config).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_sidecar_blob_triggers_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gazetteer.db");
        create_store(&path, &sample_lists(), 0.01).await.unwrap();
        std::fs::write(sidecar_blob_path(&path), b"garbage").unwrap();

        let config = StoreConfig {
            enabled: true,
            path: Some(path),
            ..StoreConfig::default()
        };
        let store = PersistentStore::open(&config).await.unwrap();
        // Rebuilt filter still admits real members.
        assert!(store.has_exact("john", NameCategory::FirstName).await);
    }

    #[tokio::test]
    async fn test_prefilter_rejections_counted() {
        let dir = tempfile::tempdir().unwrap();
        let store = built_store(&dir).await;

        store.has_exact("zzqqzzqq", NameCategory::FirstName).await;
        store.has_exact("xkxkxkxk", NameCategory::Surname).await;
        store.has_exact("qwqwqwqw", NameCategory::City).await;
        assert!(store.stats().prefilter_rejections >= 1);
    }

    #[tokio::test]
    async fn test_multi_word_hospitals() {
        let dir = tempfile::tempdir().unwrap();
        let store = built_store(&dir).await;

        let phrases = store.multi_word_hospitals().await;
        assert!(phrases.contains(&"johns hopkins hospital".to_string()));
        assert!(phrases.contains(&"mercy clinic".to_string()));
    }

    #[test]
    fn test_bm25_score_monotone() {
        assert!(bm25_to_score(-5.0) > bm25_to_score(-1.0));
        assert!(bm25_to_score(-1.0) > bm25_to_score(0.0));
        assert_eq!(bm25_to_score(2.0), 0.0);
        assert!(bm25_to_score(-100.0) <= 1.0);
    }
}
