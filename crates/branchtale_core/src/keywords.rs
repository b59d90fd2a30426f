//! crates/branchtale_core/src/keywords.rs
//!
//! Keyword validation and the insertion-ordered keyword set carried by every chapter.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::ports::{PortError, PortResult};

static KEYWORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("keyword pattern is valid"));

const KEYWORD_ARRAY_MESSAGE: &str =
    "Keywords must be an array of non-empty strings of letters, digits, '_', '-' or '.'.";

/// Returns true for a single well-formed keyword.
pub fn is_valid_keyword(keyword: &str) -> bool {
    KEYWORD_PATTERN.is_match(keyword)
}

pub fn validate_keyword(keyword: &str) -> PortResult<()> {
    if is_valid_keyword(keyword) {
        Ok(())
    } else {
        Err(PortError::Validation(format!(
            "Keyword '{}' may only contain letters, digits, '_', '-' or '.'.",
            keyword
        )))
    }
}

pub fn validate_keywords(keywords: &[String]) -> PortResult<()> {
    if keywords.iter().all(|k| is_valid_keyword(k)) {
        Ok(())
    } else {
        Err(PortError::Validation(KEYWORD_ARRAY_MESSAGE.to_string()))
    }
}

/// Checks the shape of an untyped request body: it must be a bare JSON array whose
/// every element is a valid keyword string.
pub fn keywords_from_json(body: &Value) -> PortResult<Vec<String>> {
    let items = body
        .as_array()
        .ok_or_else(|| PortError::Validation(KEYWORD_ARRAY_MESSAGE.to_string()))?;

    items
        .iter()
        .map(|item| match item.as_str() {
            Some(keyword) if is_valid_keyword(keyword) => Ok(keyword.to_string()),
            _ => Err(PortError::Validation(KEYWORD_ARRAY_MESSAGE.to_string())),
        })
        .collect()
}

//=========================================================================================
// KeywordSet
//=========================================================================================

/// A set of keywords that remembers insertion order.
///
/// Every mutation deduplicates, so the serialized array never repeats an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeywordSet(Vec<String>);

impl KeywordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from keywords that were already validated, dropping repeats.
    pub fn from_valid<I>(keywords: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut set = Self::new();
        set.extend(keywords);
        set
    }

    /// Returns false if the keyword was already present.
    pub fn insert(&mut self, keyword: String) -> bool {
        if self.contains(&keyword) {
            return false;
        }
        self.0.push(keyword);
        true
    }

    /// Set union; existing entries keep their position.
    pub fn extend<I>(&mut self, keywords: I)
    where
        I: IntoIterator<Item = String>,
    {
        for keyword in keywords {
            self.insert(keyword);
        }
    }

    /// Returns false if the keyword was not present.
    pub fn remove(&mut self, keyword: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|k| k != keyword);
        self.0.len() != before
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.0.iter().any(|k| k == keyword)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyword_pattern() {
        assert!(is_valid_keyword("sci-fi"));
        assert!(is_valid_keyword("v1.2_beta"));
        assert!(!is_valid_keyword(""));
        assert!(!is_valid_keyword("two words"));
        assert!(!is_valid_keyword("émigré"));
        assert!(!is_valid_keyword("tag#1"));
    }

    #[test]
    fn json_body_must_be_array_of_keywords() {
        assert_eq!(
            keywords_from_json(&json!(["a", "b"])).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(keywords_from_json(&json!({"keywords": ["a"]})).is_err());
        assert!(keywords_from_json(&json!("a")).is_err());
        assert!(keywords_from_json(&json!(["a", 1])).is_err());
        assert!(keywords_from_json(&json!(["a", ""])).is_err());
        assert!(keywords_from_json(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn union_drops_duplicates() {
        let mut set = KeywordSet::from_valid(["b".to_string()]);
        set.extend(["a", "a", "b"].map(String::from));
        assert_eq!(set.as_slice(), ["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn remove_reports_presence() {
        let mut set = KeywordSet::from_valid(["x".to_string(), "y".to_string()]);
        assert!(set.remove("x"));
        assert!(!set.remove("x"));
        assert_eq!(set.len(), 1);
    }
}
