//! Store Build Path
//!
//! Creates and populates the gazetteer store. This runs offline in
//! deployment tooling (and in tests); the query path in `store::mod` never
//! executes DDL and opens the result read-only.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;

use crate::bloom::BlobCodec;
use crate::error::{StoreError, StoreResult};
use crate::text;
use crate::types::{NameCategory, TermLists};

/// Current store schema version, recorded in the metadata info row.
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE first_names (name TEXT NOT NULL, soundex TEXT NOT NULL);
CREATE INDEX idx_first_names_name ON first_names(name COLLATE NOCASE);
CREATE INDEX idx_first_names_soundex ON first_names(soundex);

CREATE TABLE surnames (name TEXT NOT NULL, soundex TEXT NOT NULL);
CREATE INDEX idx_surnames_name ON surnames(name COLLATE NOCASE);
CREATE INDEX idx_surnames_soundex ON surnames(soundex);

CREATE TABLE hospitals (name TEXT NOT NULL);
CREATE INDEX idx_hospitals_name ON hospitals(name COLLATE NOCASE);

CREATE TABLE cities (name TEXT NOT NULL);
CREATE INDEX idx_cities_name ON cities(name COLLATE NOCASE);

CREATE VIRTUAL TABLE gazetteer_fts USING fts5(name, source UNINDEXED, tokenize='trigram');

CREATE TABLE metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)
"#;

/// Build a store at `path` from flat term lists, plus the sidecar bloom blob
/// the query path uses as its prefilter.
pub async fn create_store(path: &Path, lists: &TermLists, fp_rate: f64) -> StoreResult<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    // Delete-mode journal keeps the artifact a single distributable file.
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    for statement in SCHEMA_SQL.split(';').filter(|s| !s.trim().is_empty()) {
        sqlx::query(statement.trim()).execute(&pool).await?;
    }

    populate(&pool, lists).await?;
    write_info_row(&pool, lists).await?;
    pool.close().await;

    let all_names: Vec<String> = [
        &lists.first_names,
        &lists.surnames,
        &lists.hospitals,
        &lists.cities,
    ]
    .into_iter()
    .flatten()
    .cloned()
    .collect();
    BlobCodec::build_and_save(&all_names, &sidecar_blob_path(path), fp_rate)
        .map_err(|e| StoreError::Schema(format!("sidecar blob build failed: {e}")))?;

    info!(
        path = %path.display(),
        terms = lists.len(),
        "gazetteer store built"
    );
    Ok(())
}

/// Sidecar bloom blob location for a store file.
pub fn sidecar_blob_path(store_path: &Path) -> std::path::PathBuf {
    let mut name = store_path.as_os_str().to_owned();
    name.push(".bloom");
    std::path::PathBuf::from(name)
}

async fn populate(pool: &SqlitePool, lists: &TermLists) -> StoreResult<()> {
    let mut tx = pool.begin().await?;

    for category in [
        NameCategory::FirstName,
        NameCategory::Surname,
        NameCategory::Hospital,
        NameCategory::City,
    ] {
        for raw in lists.terms(category) {
            let name = text::normalize(raw);
            if name.is_empty() {
                continue;
            }

            if category.has_soundex() {
                sqlx::query(&format!(
                    "INSERT INTO {} (name, soundex) VALUES (?, ?)",
                    category.table()
                ))
                .bind(&name)
                .bind(text::soundex(&name))
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query(&format!("INSERT INTO {} (name) VALUES (?)", category.table()))
                    .bind(&name)
                    .execute(&mut *tx)
                    .await?;
            }

            sqlx::query("INSERT INTO gazetteer_fts (name, source) VALUES (?, ?)")
                .bind(&name)
                .bind(category.source_tag())
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

async fn write_info_row(pool: &SqlitePool, lists: &TermLists) -> StoreResult<()> {
    let info = serde_json::json!({
        "schema": SCHEMA_VERSION,
        "tables": ["first_names", "surnames", "hospitals", "cities"],
        "counts": {
            "firstNames": lists.first_names.len(),
            "surnames": lists.surnames.len(),
            "hospitals": lists.hospitals.len(),
            "cities": lists.cities.len(),
        },
        "builtAt": chrono::Utc::now().timestamp_millis(),
    });

    sqlx::query("INSERT INTO metadata (key, value) VALUES ('info', ?)")
        .bind(info.to_string())
        .execute(pool)
        .await?;
    Ok(())
}
