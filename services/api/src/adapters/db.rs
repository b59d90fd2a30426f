//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! chapter engine's storage ports. It handles all interactions with PostgreSQL
//! using `sqlx`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use branchtale_core::domain::{
    Chapter, ChapterDraft, ChapterId, Flag, FlagId, KeywordRequest, RelationKind, Role, UserId,
    Viewer,
};
use branchtale_core::keywords::KeywordSet;
use branchtale_core::ports::{
    ChapterStore, KeywordReviewQueue, PortError, PortResult, RelationshipStore, UserDirectory,
    ViewerResolver,
};
use branchtale_core::query::{ChapterFilter, SortKey};
use branchtale_core::service::StorePorts;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;

use super::search_sql::{build_listing, CHAPTER_COLUMNS};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every storage port of the chapter engine.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Hands the same adapter to the engine under each port.
    pub fn into_ports(self: Arc<Self>) -> StorePorts {
        StorePorts {
            chapters: self.clone(),
            relations: self.clone(),
            users: self.clone(),
            review_queue: self,
        }
    }
}

fn storage(e: sqlx::Error) -> PortError {
    PortError::Storage(e.to_string())
}

fn relation_table(kind: RelationKind) -> &'static str {
    match kind {
        RelationKind::Like => "likes",
        RelationKind::Bookmark => "bookmarks",
    }
}

fn id_strings(ids: &[ChapterId]) -> Vec<String> {
    ids.iter().map(|id| id.as_str().to_string()).collect()
}

/// Ids read back from the database passed the CHECK constraint on the way in,
/// so a parse failure here means the row was written by something else.
fn stored_id<T>(raw: String, column: &str) -> PortResult<T>
where
    T: TryFrom<String, Error = PortError>,
{
    T::try_from(raw).map_err(|e| PortError::Storage(format!("corrupt {}: {}", column, e)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ChapterRecord {
    id: String,
    story_id: String,
    previous_chapter_id: Option<String>,
    author_name: String,
    story_title: String,
    chapter_title: Option<String>,
    body_text: String,
    keywords: Vec<String>,
    create_date: DateTime<Utc>,
}
impl ChapterRecord {
    fn to_domain(self) -> PortResult<Chapter> {
        Ok(Chapter {
            id: stored_id(self.id, "chapters.id")?,
            story_id: stored_id(self.story_id, "chapters.story_id")?,
            previous_chapter_id: self
                .previous_chapter_id
                .map(|raw| stored_id(raw, "chapters.previous_chapter_id"))
                .transpose()?,
            author_name: self.author_name,
            story_title: self.story_title,
            chapter_title: self.chapter_title,
            body_text: self.body_text,
            keywords: KeywordSet::from_valid(self.keywords),
            create_date: self.create_date,
        })
    }
}

fn chapters_to_domain(records: Vec<ChapterRecord>) -> PortResult<Vec<Chapter>> {
    records.into_iter().map(ChapterRecord::to_domain).collect()
}

#[derive(FromRow)]
struct FlagRecord {
    id: String,
    user_id: Option<String>,
    chapter_id: String,
    reason: String,
    create_date: DateTime<Utc>,
}
impl FlagRecord {
    fn to_domain(self) -> PortResult<Flag> {
        Ok(Flag {
            id: stored_id(self.id, "flags.id")?,
            user_id: self
                .user_id
                .map(|raw| stored_id(raw, "flags.user_id"))
                .transpose()?,
            chapter_id: stored_id(self.chapter_id, "flags.chapter_id")?,
            reason: self.reason,
            create_date: self.create_date,
        })
    }
}

#[derive(FromRow)]
struct ViewerRecord {
    id: String,
    username: String,
    role: String,
}
impl ViewerRecord {
    fn to_domain(self) -> PortResult<Viewer> {
        Ok(Viewer {
            id: stored_id(self.id, "users.id")?,
            name: self.username,
            role: Role::from_name(&self.role),
        })
    }
}

//=========================================================================================
// `ChapterStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChapterStore for DbAdapter {
    async fn create(&self, draft: ChapterDraft) -> PortResult<Chapter> {
        let chapter = draft.into_chapter(ChapterId::generate(), Utc::now());

        // The parent check and the insert are one statement, so a parent deleted
        // in between cannot leave an orphan behind.
        let sql = format!(
            "INSERT INTO chapters AS c (id, story_id, previous_chapter_id, author_name, \
             story_title, chapter_title, body_text, keywords, create_date) \
             SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9 \
             WHERE $3::text IS NULL OR EXISTS (SELECT 1 FROM chapters p WHERE p.id = $3) \
             RETURNING {}",
            CHAPTER_COLUMNS
        );
        let record = sqlx::query_as::<_, ChapterRecord>(&sql)
            .bind(chapter.id.as_str())
            .bind(chapter.story_id.as_str())
            .bind(chapter.previous_chapter_id.as_ref().map(|id| id.as_str()))
            .bind(&chapter.author_name)
            .bind(&chapter.story_title)
            .bind(chapter.chapter_title.as_deref())
            .bind(&chapter.body_text)
            .bind(chapter.keywords.as_slice())
            .bind(chapter.create_date)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        match record {
            Some(record) => record.to_domain(),
            None => Err(PortError::NotFound(format!(
                "Chapter {} not found.",
                chapter
                    .previous_chapter_id
                    .as_ref()
                    .map(|id| id.as_str())
                    .unwrap_or_default()
            ))),
        }
    }

    async fn find_by_id(&self, id: &ChapterId) -> PortResult<Option<Chapter>> {
        let sql = format!("SELECT {} FROM chapters c WHERE c.id = $1", CHAPTER_COLUMNS);
        sqlx::query_as::<_, ChapterRecord>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .map(ChapterRecord::to_domain)
            .transpose()
    }

    async fn find_filtered(
        &self,
        filter: &ChapterFilter,
        sort: &[SortKey],
        offset: u64,
        limit: u64,
    ) -> PortResult<Vec<Chapter>> {
        let mut builder = build_listing(filter, sort, offset, limit);
        debug!(sql = builder.sql(), "Chapter listing query.");
        let records = builder
            .build_query_as::<ChapterRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        chapters_to_domain(records)
    }

    async fn find_children(&self, parent_id: &ChapterId) -> PortResult<Vec<Chapter>> {
        let sql = format!(
            "SELECT {} FROM chapters c WHERE c.previous_chapter_id = $1 \
             ORDER BY c.create_date ASC, c.id COLLATE \"C\" ASC",
            CHAPTER_COLUMNS
        );
        let records = sqlx::query_as::<_, ChapterRecord>(&sql)
            .bind(parent_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        chapters_to_domain(records)
    }

    async fn update_keywords(
        &self,
        id: &ChapterId,
        keywords: &KeywordSet,
    ) -> PortResult<Option<Chapter>> {
        let sql = format!(
            "UPDATE chapters AS c SET keywords = $2 WHERE c.id = $1 RETURNING {}",
            CHAPTER_COLUMNS
        );
        sqlx::query_as::<_, ChapterRecord>(&sql)
            .bind(id.as_str())
            .bind(keywords.as_slice())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .map(ChapterRecord::to_domain)
            .transpose()
    }

    async fn delete_by_id(&self, id: &ChapterId) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM chapters WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }
}

//=========================================================================================
// `RelationshipStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RelationshipStore for DbAdapter {
    async fn add_relation(
        &self,
        kind: RelationKind,
        user_id: &UserId,
        chapter_id: &ChapterId,
    ) -> PortResult<()> {
        // The primary key settles concurrent duplicates; the loser inserts nothing.
        let sql = format!(
            "INSERT INTO {} (user_id, chapter_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            relation_table(kind)
        );
        let result = sqlx::query(&sql)
            .bind(user_id.as_str())
            .bind(chapter_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        if result.rows_affected() == 0 {
            return Err(PortError::Conflict(format!(
                "Chapter {} already has a {} from this user.",
                chapter_id,
                kind.noun()
            )));
        }
        Ok(())
    }

    async fn remove_relation(
        &self,
        kind: RelationKind,
        user_id: &UserId,
        chapter_id: &ChapterId,
    ) -> PortResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE user_id = $1 AND chapter_id = $2",
            relation_table(kind)
        );
        let result = sqlx::query(&sql)
            .bind(user_id.as_str())
            .bind(chapter_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "No {} from this user on chapter {}.",
                kind.noun(),
                chapter_id
            )));
        }
        Ok(())
    }

    async fn has_relation(
        &self,
        kind: RelationKind,
        user_id: &UserId,
        chapter_id: &ChapterId,
    ) -> PortResult<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND chapter_id = $2)",
            relation_table(kind)
        );
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(user_id.as_str())
            .bind(chapter_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(storage)
    }

    async fn relations_among(
        &self,
        kind: RelationKind,
        user_id: &UserId,
        chapter_ids: &[ChapterId],
    ) -> PortResult<HashSet<ChapterId>> {
        if chapter_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let sql = format!(
            "SELECT chapter_id FROM {} WHERE user_id = $1 AND chapter_id = ANY($2)",
            relation_table(kind)
        );
        let rows = sqlx::query_scalar::<_, String>(&sql)
            .bind(user_id.as_str())
            .bind(id_strings(chapter_ids))
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        rows.into_iter()
            .map(|raw| stored_id(raw, "chapter_id"))
            .collect()
    }

    async fn count_likes(&self, chapter_ids: &[ChapterId]) -> PortResult<HashMap<ChapterId, u64>> {
        if chapter_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT chapter_id, COUNT(*) FROM likes WHERE chapter_id = ANY($1) GROUP BY chapter_id",
        )
        .bind(id_strings(chapter_ids))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.into_iter()
            .map(|(raw, count)| Ok((stored_id(raw, "likes.chapter_id")?, count.max(0) as u64)))
            .collect()
    }

    async fn delete_relations_for(
        &self,
        kind: RelationKind,
        chapter_id: &ChapterId,
    ) -> PortResult<u64> {
        let sql = format!("DELETE FROM {} WHERE chapter_id = $1", relation_table(kind));
        let result = sqlx::query(&sql)
            .bind(chapter_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected())
    }

    async fn add_flag(
        &self,
        user_id: Option<&UserId>,
        chapter_id: &ChapterId,
        reason: &str,
    ) -> PortResult<Flag> {
        let record = sqlx::query_as::<_, FlagRecord>(
            "INSERT INTO flags (id, user_id, chapter_id, reason, create_date) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, chapter_id, reason, create_date",
        )
        .bind(FlagId::generate().as_str())
        .bind(user_id.map(|id| id.as_str()))
        .bind(chapter_id.as_str())
        .bind(reason)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        record.to_domain()
    }

    async fn list_flags(&self, offset: u64, limit: u64) -> PortResult<Vec<Flag>> {
        let records = sqlx::query_as::<_, FlagRecord>(
            "SELECT id, user_id, chapter_id, reason, create_date FROM flags \
             ORDER BY create_date DESC, id COLLATE \"C\" DESC OFFSET $1 LIMIT $2",
        )
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        records.into_iter().map(FlagRecord::to_domain).collect()
    }

    async fn delete_flag(&self, id: &FlagId) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM flags WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_flags_for(&self, chapter_id: &ChapterId) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM flags WHERE chapter_id = $1")
            .bind(chapter_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected())
    }
}

//=========================================================================================
// Users, Sessions and the Keyword Review Queue
//=========================================================================================

#[async_trait]
impl UserDirectory for DbAdapter {
    async fn author_ids(&self, names: &[String]) -> PortResult<HashMap<String, UserId>> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT username, id FROM users WHERE username = ANY($1)",
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.into_iter()
            .map(|(name, raw)| Ok((name, stored_id(raw, "users.id")?)))
            .collect()
    }
}

#[async_trait]
impl ViewerResolver for DbAdapter {
    async fn viewer_for_session(&self, token: &str) -> PortResult<Option<Viewer>> {
        sqlx::query_as::<_, ViewerRecord>(
            "SELECT u.id, u.username, u.role FROM auth_sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .map(ViewerRecord::to_domain)
        .transpose()
    }
}

#[async_trait]
impl KeywordReviewQueue for DbAdapter {
    async fn enqueue(&self, request: KeywordRequest) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO keyword_requests (chapter_id, requested_by, action, keywords, create_date) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(request.chapter_id.as_str())
        .bind(request.requested_by.as_str())
        .bind(request.action.as_str())
        .bind(&request.keywords)
        .bind(request.create_date)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}
