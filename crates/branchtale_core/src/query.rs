//! crates/branchtale_core/src/query.rs
//!
//! The search mini-language used by chapter listings.
//!
//! A query is a whitespace-separated list of tokens:
//!
//! - `o:<letters>` picks the sort order. Each letter names a field (`s` story title,
//!   `c` chapter title, `a` author, `l` like count, `d` create date); lowercase sorts
//!   ascending, uppercase descending. At most one such token, and no field twice.
//! - `[<fields>:]<word>` is a search term. Field letters are `s`, `c`, `a`, `b`
//!   (body), `k` (keywords); lowercase matches a case-insensitive substring,
//!   uppercase (`S`, `C`, `A`, `K`) an exact value. Without a field list the word is
//!   searched as a substring in every field.
//!
//! Terms are ANDed; the fields inside one term are ORed. Every order ends with the
//! chapter id descending so pages never overlap.
//!
//! [`parse_query`] produces a [`ParsedQuery`], the single description of filter and
//! sort that both store adapters consume.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::Chapter;
use crate::ports::{PortError, PortResult};

/// Sort applied when the query carries no `o:` token.
pub const DEFAULT_SORT: &str = "D";

const SORT_PREFIX: &str = "o:";

static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("search word pattern is valid"));

//=========================================================================================
// Search terms
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    StoryTitle,
    ChapterTitle,
    AuthorName,
    BodyText,
    Keywords,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Case-insensitive substring.
    Contains,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMatch {
    pub field: SearchField,
    pub mode: MatchMode,
}

impl FieldMatch {
    fn from_letter(letter: char) -> Option<Self> {
        use MatchMode::*;
        use SearchField::*;
        let (field, mode) = match letter {
            's' => (StoryTitle, Contains),
            'S' => (StoryTitle, Exact),
            'c' => (ChapterTitle, Contains),
            'C' => (ChapterTitle, Exact),
            'a' => (AuthorName, Contains),
            'A' => (AuthorName, Exact),
            'b' => (BodyText, Contains),
            'k' => (Keywords, Contains),
            'K' => (Keywords, Exact),
            _ => return None,
        };
        Some(Self { field, mode })
    }

    fn matches(&self, chapter: &Chapter, word: &str, word_lower: &str) -> bool {
        let hit = |value: &str| match self.mode {
            MatchMode::Exact => value == word,
            MatchMode::Contains => value.to_lowercase().contains(word_lower),
        };
        match self.field {
            SearchField::StoryTitle => hit(&chapter.story_title),
            SearchField::ChapterTitle => chapter.chapter_title.as_deref().is_some_and(hit),
            SearchField::AuthorName => hit(&chapter.author_name),
            SearchField::BodyText => hit(&chapter.body_text),
            SearchField::Keywords => chapter.keywords.iter().any(hit),
        }
    }
}

/// One search token: `word` must match at least one of `fields`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    pub fields: Vec<FieldMatch>,
    pub word: String,
}

impl SearchTerm {
    pub fn matches(&self, chapter: &Chapter) -> bool {
        let word_lower = self.word.to_lowercase();
        self.fields
            .iter()
            .any(|f| f.matches(chapter, &self.word, &word_lower))
    }
}

//=========================================================================================
// Sort keys
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    StoryTitle,
    ChapterTitle,
    AuthorName,
    LikeCount,
    CreateDate,
    /// The implicit final tiebreak; never produced from a letter.
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub direction: Direction,
}

impl SortKey {
    fn from_letter(letter: char) -> Option<Self> {
        let field = match letter.to_ascii_lowercase() {
            's' => SortField::StoryTitle,
            'c' => SortField::ChapterTitle,
            'a' => SortField::AuthorName,
            'l' => SortField::LikeCount,
            'd' => SortField::CreateDate,
            _ => return None,
        };
        let direction = if letter.is_ascii_uppercase() {
            Direction::Descending
        } else {
            Direction::Ascending
        };
        Some(Self { field, direction })
    }

    /// Compares two rows on this key alone. Text compares lowercased; a missing
    /// chapter title sorts before any present one.
    pub fn compare(&self, a: &SortRow<'_>, b: &SortRow<'_>) -> Ordering {
        let ordering = match self.field {
            SortField::StoryTitle => {
                compare_folded(&a.chapter.story_title, &b.chapter.story_title)
            }
            SortField::ChapterTitle => {
                match (&a.chapter.chapter_title, &b.chapter.chapter_title) {
                    (Some(x), Some(y)) => compare_folded(x, y),
                    (x, y) => x.is_some().cmp(&y.is_some()),
                }
            }
            SortField::AuthorName => {
                compare_folded(&a.chapter.author_name, &b.chapter.author_name)
            }
            SortField::LikeCount => a.like_count.cmp(&b.like_count),
            SortField::CreateDate => a.chapter.create_date.cmp(&b.chapter.create_date),
            SortField::Id => a.chapter.id.cmp(&b.chapter.id),
        };
        match self.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

fn compare_folded(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// A chapter together with the denormalized values a sort may need.
#[derive(Debug, Clone, Copy)]
pub struct SortRow<'a> {
    pub chapter: &'a Chapter,
    pub like_count: u64,
}

/// Applies `keys` left to right.
pub fn compare_rows(keys: &[SortKey], a: &SortRow<'_>, b: &SortRow<'_>) -> Ordering {
    keys.iter()
        .map(|key| key.compare(a, b))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

//=========================================================================================
// Parsed query and filter
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub terms: Vec<SearchTerm>,
    /// Always ends with the id-descending tiebreak.
    pub sort: Vec<SortKey>,
}

/// What a store filters on for one listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterFilter {
    pub stories_only: bool,
    pub terms: Vec<SearchTerm>,
}

impl ChapterFilter {
    pub fn matches(&self, chapter: &Chapter) -> bool {
        (!self.stories_only || chapter.is_root()) && self.terms.iter().all(|t| t.matches(chapter))
    }
}

/// Parses a raw search string. Any bad token rejects the whole query.
pub fn parse_query(raw: &str, default_sort: &str) -> PortResult<ParsedQuery> {
    let mut terms = Vec::new();
    let mut sort_letters: Option<&str> = None;

    for token in raw.split_whitespace() {
        if let Some(letters) = token.strip_prefix(SORT_PREFIX) {
            if sort_letters.replace(letters).is_some() {
                return Err(malformed("only one sort token is allowed"));
            }
        } else {
            terms.push(parse_search_token(token)?);
        }
    }

    let mut sort = parse_sort_letters(sort_letters.unwrap_or(default_sort))?;
    sort.push(SortKey {
        field: SortField::Id,
        direction: Direction::Descending,
    });

    Ok(ParsedQuery { terms, sort })
}

fn parse_sort_letters(letters: &str) -> PortResult<Vec<SortKey>> {
    if letters.is_empty() {
        return Err(malformed("sort token names no field"));
    }
    let mut keys: Vec<SortKey> = Vec::new();
    for letter in letters.chars() {
        let key = SortKey::from_letter(letter)
            .ok_or_else(|| malformed(&format!("unknown sort field '{}'", letter)))?;
        if keys.iter().any(|k| k.field == key.field) {
            return Err(malformed(&format!("sort field '{}' is repeated", letter)));
        }
        keys.push(key);
    }
    Ok(keys)
}

fn parse_search_token(token: &str) -> PortResult<SearchTerm> {
    let (fields, word) = match token.split_once(':') {
        Some((letters, word)) => (parse_field_letters(letters)?, word),
        None => (all_fields(), token),
    };
    if !WORD_PATTERN.is_match(word) {
        return Err(malformed(&format!("'{}' is not a valid search word", token)));
    }
    Ok(SearchTerm {
        fields,
        word: word.to_string(),
    })
}

fn parse_field_letters(letters: &str) -> PortResult<Vec<FieldMatch>> {
    if letters.is_empty() {
        return Err(malformed("search token names no field"));
    }
    let mut fields: Vec<FieldMatch> = Vec::new();
    for letter in letters.chars() {
        let field = FieldMatch::from_letter(letter)
            .ok_or_else(|| malformed(&format!("unknown search field '{}'", letter)))?;
        match fields.iter().find(|f| f.field == field.field) {
            Some(existing) if existing.mode != field.mode => {
                return Err(malformed(&format!(
                    "search field '{}' is requested both exact and inexact",
                    letter
                )));
            }
            Some(_) => {}
            None => fields.push(field),
        }
    }
    Ok(fields)
}

fn all_fields() -> Vec<FieldMatch> {
    "scabk"
        .chars()
        .filter_map(FieldMatch::from_letter)
        .collect()
}

fn malformed(reason: &str) -> PortError {
    PortError::MalformedQuery(reason.to_string())
}

//=========================================================================================
// Listing parameters
//=========================================================================================

/// Validated query-string parameters of a chapter listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    /// 1-based.
    pub page: u32,
    pub stories_only: bool,
    pub search: String,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            stories_only: false,
            search: String::new(),
        }
    }
}

impl ListParams {
    /// `page` defaults to 1; `storiesOnly` is true for any value except a
    /// case-insensitive `false`, and false when absent.
    pub fn from_raw(
        page: Option<&str>,
        stories_only: Option<&str>,
        search: Option<&str>,
    ) -> PortResult<Self> {
        let page = match page {
            None => 1,
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|p| *p >= 1)
                .ok_or_else(|| {
                    PortError::Validation(format!("Page '{}' must be a positive integer.", raw))
                })?,
        };
        let stories_only = stories_only.is_some_and(|v| !v.eq_ignore_ascii_case("false"));

        Ok(Self {
            page,
            stories_only,
            search: search.unwrap_or_default().to_string(),
        })
    }
}
