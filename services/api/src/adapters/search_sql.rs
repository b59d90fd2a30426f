//! services/api/src/adapters/search_sql.rs
//!
//! Compiles a chapter filter and sort keys into a parameterized Postgres query.
//! Search words are always bound, never spliced into the SQL text.
//!
//! Text sorts compare `LOWER(..)` under the "C" collation so that Postgres orders
//! rows exactly like the in-memory adapter does.

use branchtale_core::query::{
    ChapterFilter, Direction, FieldMatch, MatchMode, SearchField, SearchTerm, SortField, SortKey,
};
use sqlx::{Postgres, QueryBuilder};

pub(crate) const CHAPTER_COLUMNS: &str = "c.id, c.story_id, c.previous_chapter_id, c.author_name, \
     c.story_title, c.chapter_title, c.body_text, c.keywords, c.create_date";

/// Builds the full listing query for one page.
pub(crate) fn build_listing(
    filter: &ChapterFilter,
    sort: &[SortKey],
    offset: u64,
    limit: u64,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {} FROM chapters c", CHAPTER_COLUMNS));

    if sort.iter().any(|k| k.field == SortField::LikeCount) {
        builder.push(
            " LEFT JOIN (SELECT chapter_id, COUNT(*) AS like_count FROM likes GROUP BY chapter_id) l \
             ON l.chapter_id = c.id",
        );
    }

    builder.push(" WHERE TRUE");
    if filter.stories_only {
        builder.push(" AND c.previous_chapter_id IS NULL");
    }
    for term in &filter.terms {
        push_term(&mut builder, term);
    }

    builder.push(" ORDER BY ");
    for (i, key) in sort.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(order_expression(key));
    }

    builder.push(" OFFSET ");
    builder.push_bind(offset as i64);
    builder.push(" LIMIT ");
    builder.push_bind(limit as i64);
    builder
}

fn push_term(builder: &mut QueryBuilder<'static, Postgres>, term: &SearchTerm) {
    builder.push(" AND (");
    for (i, field) in term.fields.iter().enumerate() {
        if i > 0 {
            builder.push(" OR ");
        }
        push_field_match(builder, field, &term.word);
    }
    builder.push(")");
}

fn push_field_match(builder: &mut QueryBuilder<'static, Postgres>, field: &FieldMatch, word: &str) {
    let column = match field.field {
        SearchField::StoryTitle => "c.story_title",
        SearchField::ChapterTitle => "c.chapter_title",
        SearchField::AuthorName => "c.author_name",
        SearchField::BodyText => "c.body_text",
        SearchField::Keywords => {
            match field.mode {
                MatchMode::Exact => {
                    builder.push_bind(word.to_string());
                    builder.push(" = ANY(c.keywords)");
                }
                MatchMode::Contains => {
                    builder.push(
                        "EXISTS (SELECT 1 FROM unnest(c.keywords) AS kw(value) \
                         WHERE strpos(lower(kw.value), lower(",
                    );
                    builder.push_bind(word.to_string());
                    builder.push(")) > 0)");
                }
            }
            return;
        }
    };

    match field.mode {
        MatchMode::Exact => {
            builder.push(column);
            builder.push(" = ");
            builder.push_bind(word.to_string());
        }
        MatchMode::Contains => {
            builder.push(format!("strpos(lower({}), lower(", column));
            builder.push_bind(word.to_string());
            builder.push(")) > 0");
        }
    }
}

fn order_expression(key: &SortKey) -> String {
    let (expression, nullable) = match key.field {
        SortField::StoryTitle => ("LOWER(c.story_title) COLLATE \"C\"", false),
        SortField::ChapterTitle => ("LOWER(c.chapter_title) COLLATE \"C\"", true),
        SortField::AuthorName => ("LOWER(c.author_name) COLLATE \"C\"", false),
        SortField::LikeCount => ("COALESCE(l.like_count, 0)", false),
        SortField::CreateDate => ("c.create_date", false),
        SortField::Id => ("c.id COLLATE \"C\"", false),
    };
    let direction = match key.direction {
        Direction::Ascending => "ASC",
        Direction::Descending => "DESC",
    };
    // Missing chapter titles sort lowest, as in the in-memory adapter.
    let nulls = match (nullable, key.direction) {
        (false, _) => "",
        (true, Direction::Ascending) => " NULLS FIRST",
        (true, Direction::Descending) => " NULLS LAST",
    };
    format!("{} {}{}", expression, direction, nulls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchtale_core::query::{parse_query, DEFAULT_SORT};

    fn sql(search: &str, stories_only: bool) -> String {
        let parsed = parse_query(search, DEFAULT_SORT).unwrap();
        let filter = ChapterFilter {
            stories_only,
            terms: parsed.terms,
        };
        build_listing(&filter, &parsed.sort, 0, 20).sql().to_string()
    }

    #[test]
    fn default_listing_orders_by_date_then_id() {
        let sql = sql("", false);
        assert!(sql.ends_with(
            "ORDER BY c.create_date DESC, c.id COLLATE \"C\" DESC OFFSET $1 LIMIT $2"
        ));
        assert!(!sql.contains("LEFT JOIN"));
    }

    #[test]
    fn like_sort_joins_counts() {
        let sql = sql("o:Lc", true);
        assert!(sql.contains("LEFT JOIN (SELECT chapter_id, COUNT(*)"));
        assert!(sql.contains("AND c.previous_chapter_id IS NULL"));
        assert!(sql.contains(
            "ORDER BY COALESCE(l.like_count, 0) DESC, LOWER(c.chapter_title) COLLATE \"C\" ASC NULLS FIRST"
        ));
    }

    #[test]
    fn search_words_are_bound() {
        let sql = sql("sA:Robert K:x", false);
        assert!(!sql.contains("Robert"));
        assert!(sql.contains("(strpos(lower(c.story_title), lower($1)) > 0 OR c.author_name = $2)"));
        assert!(sql.contains("AND ($3 = ANY(c.keywords))"));
    }
}
