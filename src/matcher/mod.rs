//! Fuzzy Matching
//!
//! Two layers sit between raw clinical tokens and the gazetteer:
//!
//! 1. [`FuzzyMatcher`] answers "is this close to a dictionary term" through a
//!    symmetric-delete index with a bloom prefilter and soundex fallback.
//! 2. [`OcrMatcher`] wraps it with OCR homoglyph folding, so `PENEL0PE`
//!    resolves before the edit-distance machinery ever runs, and carries the
//!    slower reference algorithm used when the fast path is turned off.

pub mod engine;
pub mod fuzzy;
pub mod ocr;

pub use engine::acceleration_available;
pub use fuzzy::{FuzzyMatcher, MatcherStats};
pub use ocr::{OcrMatcher, OcrStats};
