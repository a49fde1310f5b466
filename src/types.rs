//! Match Results and Gazetteer Categories
//!
//! Shared types exchanged between the matchers, the persistent store, and the
//! redaction pipeline that consumes them.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ListConfig;
use crate::error::{InitError, InitResult};
use crate::text;

// ============================================================================
// Categories
// ============================================================================

/// Gazetteer category a term belongs to. Every term lives in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameCategory {
    FirstName,
    Surname,
    Hospital,
    City,
}

impl NameCategory {
    /// Table holding this category in the persistent store.
    pub fn table(&self) -> &'static str {
        match self {
            NameCategory::FirstName => "first_names",
            NameCategory::Surname => "surnames",
            NameCategory::Hospital => "hospitals",
            NameCategory::City => "cities",
        }
    }

    /// Source tag used in the full-text index.
    pub fn source_tag(&self) -> &'static str {
        match self {
            NameCategory::FirstName => "first_name",
            NameCategory::Surname => "surname",
            NameCategory::Hospital => "hospital",
            NameCategory::City => "city",
        }
    }

    /// Categories carrying a soundex column in the persistent store.
    pub fn has_soundex(&self) -> bool {
        matches!(self, NameCategory::FirstName | NameCategory::Surname)
    }
}

// ============================================================================
// Match results
// ============================================================================

/// How a lookup resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    #[serde(rename = "EXACT")]
    Exact,
    #[serde(rename = "DELETE_1")]
    Delete1,
    #[serde(rename = "DELETE_2")]
    Delete2,
    #[serde(rename = "PHONETIC")]
    Phonetic,
    #[serde(rename = "NORMALIZED")]
    Normalized,
    #[serde(rename = "FUZZY")]
    Fuzzy,
    #[serde(rename = "NONE")]
    None,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            MatchType::Exact => "EXACT",
            MatchType::Delete1 => "DELETE_1",
            MatchType::Delete2 => "DELETE_2",
            MatchType::Phonetic => "PHONETIC",
            MatchType::Normalized => "NORMALIZED",
            MatchType::Fuzzy => "FUZZY",
            MatchType::None => "NONE",
        };
        f.write_str(token)
    }
}

/// Outcome of a single gazetteer lookup.
///
/// `confidence` is non-increasing in `distance`; an `EXACT` match always
/// carries distance 0 and confidence 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub matched: bool,
    pub term: Option<String>,
    pub distance: i64,
    pub confidence: f64,
    pub match_type: MatchType,
}

impl MatchResult {
    /// Exact dictionary hit.
    pub fn exact(term: impl Into<String>) -> Self {
        Self {
            matched: true,
            term: Some(term.into()),
            distance: 0,
            confidence: 1.0,
            match_type: MatchType::Exact,
        }
    }

    /// No match.
    pub fn none() -> Self {
        Self {
            matched: false,
            term: None,
            distance: i64::MAX,
            confidence: 0.0,
            match_type: MatchType::None,
        }
    }
}

// ============================================================================
// Term lists
// ============================================================================

/// Flat term lists loaded from disk, one per category.
///
/// List files carry one term per line; blank lines and `#` comments are
/// skipped, terms are lowercased and trimmed on load.
#[derive(Debug, Clone, Default)]
pub struct TermLists {
    pub first_names: Vec<String>,
    pub surnames: Vec<String>,
    pub hospitals: Vec<String>,
    pub cities: Vec<String>,
}

impl TermLists {
    /// Load every configured list. A configured path that cannot be read is
    /// an initialization error; an unconfigured category stays empty.
    pub fn load(config: &ListConfig) -> InitResult<Self> {
        let lists = Self {
            first_names: load_list(config.first_names.as_deref())?,
            surnames: load_list(config.surnames.as_deref())?,
            hospitals: load_list(config.hospitals.as_deref())?,
            cities: load_list(config.cities.as_deref())?,
        };
        if lists.is_empty() {
            return Err(InitError::NoSources);
        }
        Ok(lists)
    }

    pub fn is_empty(&self) -> bool {
        self.first_names.is_empty()
            && self.surnames.is_empty()
            && self.hospitals.is_empty()
            && self.cities.is_empty()
    }

    pub fn terms(&self, category: NameCategory) -> &[String] {
        match category {
            NameCategory::FirstName => &self.first_names,
            NameCategory::Surname => &self.surnames,
            NameCategory::Hospital => &self.hospitals,
            NameCategory::City => &self.cities,
        }
    }

    /// Total term count across all categories.
    pub fn len(&self) -> usize {
        self.first_names.len() + self.surnames.len() + self.hospitals.len() + self.cities.len()
    }
}

fn load_list(path: Option<&Path>) -> InitResult<Vec<String>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let content = std::fs::read_to_string(path).map_err(|_| InitError::MissingDictionary {
        path: path.display().to_string(),
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(text::normalize)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_match_type_wire_tokens() {
        let json = serde_json::to_string(&MatchType::Delete1).unwrap();
        assert_eq!(json, "\"DELETE_1\"");
        let back: MatchType = serde_json::from_str("\"PHONETIC\"").unwrap();
        assert_eq!(back, MatchType::Phonetic);
    }

    #[test]
    fn test_match_result_camel_case() {
        let result = MatchResult::exact("smith");
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"matchType\":\"EXACT\""));
        assert!(json.contains("\"confidence\":1.0"));
    }

    #[test]
    fn test_load_list_normalizes_and_skips_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# header comment").unwrap();
        writeln!(file, "  Smith ").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "GARCIA").unwrap();
        let terms = load_list(Some(file.path())).unwrap();
        assert_eq!(terms, vec!["smith", "garcia"]);
    }

    #[test]
    fn test_missing_list_is_init_error() {
        let config = ListConfig {
            first_names: Some("/nonexistent/first_names.txt".into()),
            ..Default::default()
        };
        assert!(matches!(
            TermLists::load(&config),
            Err(InitError::MissingDictionary { .. })
        ));
    }
}
