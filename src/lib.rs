//! phi-gazetteer
//!
//! Fuzzy gazetteer matching engine for PHI redaction pipelines. Validates and
//! fuzzily locates person names, hospital names, and cities inside noisy
//! clinical text, under a per-document latency budget measured in
//! milliseconds.
//!
//! The pieces, bottom up:
//!
//! - [`bloom`]: bloom filter plus the versioned `VBLM` blob codec used to
//!   persist it for instant cold starts.
//! - [`matcher`]: the symmetric-delete fuzzy matcher and its OCR-aware
//!   wrapper.
//! - [`store`]: the read-only, memory-mapped SQLite backend with trigram and
//!   soundex lookups.
//! - [`service`]: the orchestration layer that picks a backend and exposes
//!   the API the redaction pipeline consumes.
//!
//! ```no_run
//! use phi_gazetteer::{GazetteerConfig, GazetteerService};
//!
//! # async fn demo() {
//! let mut config = GazetteerConfig::default();
//! config.lists.first_names = Some("data/first_names.txt".into());
//! config.lists.surnames = Some("data/surnames.txt".into());
//!
//! let service = GazetteerService::new(config).await;
//! if service.is_healthy() {
//!     let confidence = service.name_confidence("John Smith").await;
//!     assert!(confidence >= 0.5);
//! }
//! # }
//! ```

pub mod bloom;
pub mod config;
pub mod error;
pub mod matcher;
pub mod service;
pub mod store;
pub mod text;
pub mod types;

pub use bloom::{BlobCodec, BlobMetadata, BloomFilter};
pub use config::{GazetteerConfig, ListConfig, MatcherConfig, PhoneticConfig, StoreConfig};
pub use error::{CodecError, InitError, StoreError};
pub use matcher::{acceleration_available, FuzzyMatcher, MatcherStats, OcrMatcher, OcrStats};
pub use service::{GazetteerService, HealthStatus, ServiceStats};
pub use store::{create_store, FuzzyHit, PersistentStore, PhoneticHit, StoreStats};
pub use types::{MatchResult, MatchType, NameCategory, TermLists};
