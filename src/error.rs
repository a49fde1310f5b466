//! Error Types

use thiserror::Error;

/// Errors raised while bringing a gazetteer service online.
///
/// These are recoverable: the lenient constructor logs them and degrades
/// functionality, while the strict constructor surfaces them for startup
/// health checks.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("dictionary list not found: {path}")]
    MissingDictionary { path: String },

    #[error("no gazetteer sources configured")]
    NoSources,

    #[error("config parse failed: {0}")]
    Config(String),

    #[error("persistent store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in the persisted bloom-blob format.
///
/// Fatal for the blob in question only; callers rebuild the filter from
/// source terms.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("bad magic bytes in bloom blob")]
    BadMagic,

    #[error("unsupported blob version {found} (expected {expected})")]
    UnsupportedVersion { found: u8, expected: u8 },

    #[error("truncated blob: {0}")]
    Truncated(&'static str),

    #[error("blob metadata parse failed: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors opening or building the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store not found: {path}")]
    NotFound { path: String },

    #[error("store schema check failed: {0}")]
    Schema(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for initialization.
pub type InitResult<T> = Result<T, InitError>;

/// Result type alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
