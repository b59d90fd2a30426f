//! crates/branchtale_core/src/memory.rs
//!
//! An in-memory implementation of every storage port, backed by
//! `tokio::sync::RwLock` collections. Used by the test suites and for running the
//! API without a database.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::{
    Chapter, ChapterDraft, ChapterId, Flag, FlagId, KeywordRequest, RelationKind, Role, UserId,
    Viewer,
};
use crate::keywords::KeywordSet;
use crate::ports::{
    ChapterStore, KeywordReviewQueue, PortError, PortResult, RelationshipStore, UserDirectory,
    ViewerResolver,
};
use crate::query::{compare_rows, ChapterFilter, SortKey, SortRow};
use crate::service::StorePorts;

type RelationKey = (RelationKind, UserId, ChapterId);

#[derive(Default)]
pub struct InMemoryStore {
    chapters: RwLock<HashMap<ChapterId, Chapter>>,
    relations: RwLock<HashSet<RelationKey>>,
    flags: RwLock<Vec<Flag>>,
    users: RwLock<HashMap<UserId, Viewer>>,
    sessions: RwLock<HashMap<String, UserId>>,
    keyword_requests: RwLock<Vec<KeywordRequest>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares one store behind every port.
    pub fn into_ports(self: Arc<Self>) -> StorePorts {
        StorePorts {
            chapters: self.clone(),
            relations: self.clone(),
            users: self.clone(),
            review_queue: self,
        }
    }

    pub async fn register_user(&self, name: &str, role: Role) -> Viewer {
        let viewer = Viewer {
            id: UserId::generate(),
            name: name.to_string(),
            role,
        };
        self.users
            .write()
            .await
            .insert(viewer.id.clone(), viewer.clone());
        viewer
    }

    /// Issues a session token for an existing user.
    pub async fn open_session(&self, user_id: &UserId) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        self.sessions
            .write()
            .await
            .insert(token.clone(), user_id.clone());
        token
    }

    /// Everything handed to the review queue so far, oldest first.
    pub async fn keyword_requests(&self) -> Vec<KeywordRequest> {
        self.keyword_requests.read().await.clone()
    }

    pub async fn chapter_count(&self) -> usize {
        self.chapters.read().await.len()
    }

    /// Relation and flag rows that still reference `chapter_id`.
    pub async fn references_to(&self, chapter_id: &ChapterId) -> usize {
        let relations = self
            .relations
            .read()
            .await
            .iter()
            .filter(|(_, _, c)| c == chapter_id)
            .count();
        let flags = self
            .flags
            .read()
            .await
            .iter()
            .filter(|f| &f.chapter_id == chapter_id)
            .count();
        relations + flags
    }

    async fn like_counts(&self) -> HashMap<ChapterId, u64> {
        let mut counts = HashMap::new();
        for (kind, _, chapter_id) in self.relations.read().await.iter() {
            if *kind == RelationKind::Like {
                *counts.entry(chapter_id.clone()).or_insert(0) += 1;
            }
        }
        counts
    }
}

#[async_trait]
impl ChapterStore for InMemoryStore {
    async fn create(&self, draft: ChapterDraft) -> PortResult<Chapter> {
        let mut chapters = self.chapters.write().await;
        if let Some(parent_id) = draft.previous_chapter_id() {
            if !chapters.contains_key(parent_id) {
                return Err(PortError::NotFound(format!(
                    "Chapter {} not found.",
                    parent_id
                )));
            }
        }
        let chapter = draft.into_chapter(ChapterId::generate(), Utc::now());
        chapters.insert(chapter.id.clone(), chapter.clone());
        Ok(chapter)
    }

    async fn find_by_id(&self, id: &ChapterId) -> PortResult<Option<Chapter>> {
        Ok(self.chapters.read().await.get(id).cloned())
    }

    async fn find_filtered(
        &self,
        filter: &ChapterFilter,
        sort: &[SortKey],
        offset: u64,
        limit: u64,
    ) -> PortResult<Vec<Chapter>> {
        let counts = self.like_counts().await;
        let chapters = self.chapters.read().await;

        let mut rows: Vec<SortRow<'_>> = chapters
            .values()
            .filter(|c| filter.matches(c))
            .map(|chapter| SortRow {
                chapter,
                like_count: counts.get(&chapter.id).copied().unwrap_or(0),
            })
            .collect();
        rows.sort_by(|a, b| compare_rows(sort, a, b));

        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|row| row.chapter.clone())
            .collect())
    }

    async fn find_children(&self, parent_id: &ChapterId) -> PortResult<Vec<Chapter>> {
        let mut children: Vec<Chapter> = self
            .chapters
            .read()
            .await
            .values()
            .filter(|c| c.previous_chapter_id.as_ref() == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.create_date.cmp(&b.create_date).then(a.id.cmp(&b.id)));
        Ok(children)
    }

    async fn update_keywords(
        &self,
        id: &ChapterId,
        keywords: &KeywordSet,
    ) -> PortResult<Option<Chapter>> {
        let mut chapters = self.chapters.write().await;
        Ok(chapters.get_mut(id).map(|chapter| {
            chapter.keywords = keywords.clone();
            chapter.clone()
        }))
    }

    async fn delete_by_id(&self, id: &ChapterId) -> PortResult<bool> {
        Ok(self.chapters.write().await.remove(id).is_some())
    }
}

#[async_trait]
impl RelationshipStore for InMemoryStore {
    async fn add_relation(
        &self,
        kind: RelationKind,
        user_id: &UserId,
        chapter_id: &ChapterId,
    ) -> PortResult<()> {
        let inserted = self
            .relations
            .write()
            .await
            .insert((kind, user_id.clone(), chapter_id.clone()));
        if inserted {
            Ok(())
        } else {
            Err(PortError::Conflict(format!(
                "Chapter {} already has a {} from this user.",
                chapter_id,
                kind.noun()
            )))
        }
    }

    async fn remove_relation(
        &self,
        kind: RelationKind,
        user_id: &UserId,
        chapter_id: &ChapterId,
    ) -> PortResult<()> {
        let removed = self
            .relations
            .write()
            .await
            .remove(&(kind, user_id.clone(), chapter_id.clone()));
        if removed {
            Ok(())
        } else {
            Err(PortError::NotFound(format!(
                "No {} from this user on chapter {}.",
                kind.noun(),
                chapter_id
            )))
        }
    }

    async fn has_relation(
        &self,
        kind: RelationKind,
        user_id: &UserId,
        chapter_id: &ChapterId,
    ) -> PortResult<bool> {
        Ok(self
            .relations
            .read()
            .await
            .contains(&(kind, user_id.clone(), chapter_id.clone())))
    }

    async fn relations_among(
        &self,
        kind: RelationKind,
        user_id: &UserId,
        chapter_ids: &[ChapterId],
    ) -> PortResult<HashSet<ChapterId>> {
        let relations = self.relations.read().await;
        Ok(chapter_ids
            .iter()
            .filter(|id| relations.contains(&(kind, user_id.clone(), (*id).clone())))
            .cloned()
            .collect())
    }

    async fn count_likes(&self, chapter_ids: &[ChapterId]) -> PortResult<HashMap<ChapterId, u64>> {
        let wanted: HashSet<&ChapterId> = chapter_ids.iter().collect();
        let mut counts = self.like_counts().await;
        counts.retain(|id, _| wanted.contains(id));
        Ok(counts)
    }

    async fn delete_relations_for(
        &self,
        kind: RelationKind,
        chapter_id: &ChapterId,
    ) -> PortResult<u64> {
        let mut relations = self.relations.write().await;
        let before = relations.len();
        relations.retain(|(k, _, c)| !(*k == kind && c == chapter_id));
        Ok((before - relations.len()) as u64)
    }

    async fn add_flag(
        &self,
        user_id: Option<&UserId>,
        chapter_id: &ChapterId,
        reason: &str,
    ) -> PortResult<Flag> {
        let flag = Flag {
            id: FlagId::generate(),
            user_id: user_id.cloned(),
            chapter_id: chapter_id.clone(),
            reason: reason.to_string(),
            create_date: Utc::now(),
        };
        self.flags.write().await.push(flag.clone());
        Ok(flag)
    }

    async fn list_flags(&self, offset: u64, limit: u64) -> PortResult<Vec<Flag>> {
        let mut flags = self.flags.read().await.clone();
        flags.sort_by(|a, b| {
            b.create_date
                .cmp(&a.create_date)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(flags
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn delete_flag(&self, id: &FlagId) -> PortResult<bool> {
        let mut flags = self.flags.write().await;
        let before = flags.len();
        flags.retain(|f| &f.id != id);
        Ok(flags.len() != before)
    }

    async fn delete_flags_for(&self, chapter_id: &ChapterId) -> PortResult<u64> {
        let mut flags = self.flags.write().await;
        let before = flags.len();
        flags.retain(|f| &f.chapter_id != chapter_id);
        Ok((before - flags.len()) as u64)
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn author_ids(&self, names: &[String]) -> PortResult<HashMap<String, UserId>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(|user| names.contains(&user.name))
            .map(|user| (user.name.clone(), user.id.clone()))
            .collect())
    }
}

#[async_trait]
impl ViewerResolver for InMemoryStore {
    async fn viewer_for_session(&self, token: &str) -> PortResult<Option<Viewer>> {
        let user_id = match self.sessions.read().await.get(token) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        Ok(self.users.read().await.get(&user_id).cloned())
    }
}

#[async_trait]
impl KeywordReviewQueue for InMemoryStore {
    async fn enqueue(&self, request: KeywordRequest) -> PortResult<()> {
        self.keyword_requests.write().await.push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{parse_query, DEFAULT_SORT};

    async fn seed(store: &InMemoryStore, author: &str, title: &str) -> Chapter {
        let draft = ChapterDraft::story(author, title, "Text.", &[]).unwrap();
        store.create(draft).await.unwrap()
    }

    #[tokio::test]
    async fn duplicate_relation_conflicts() {
        let store = InMemoryStore::new();
        let chapter = seed(&store, "alice", "One").await;
        let user = UserId::generate();

        store.add_relation(RelationKind::Like, &user, &chapter.id).await.unwrap();
        let err = store
            .add_relation(RelationKind::Like, &user, &chapter.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));

        // A bookmark is a separate relation.
        store.add_relation(RelationKind::Bookmark, &user, &chapter.id).await.unwrap();

        store.remove_relation(RelationKind::Like, &user, &chapter.id).await.unwrap();
        let err = store
            .remove_relation(RelationKind::Like, &user, &chapter.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn filtered_listing_sorts_by_likes_and_pages() {
        let store = InMemoryStore::new();
        let a = seed(&store, "alice", "A").await;
        let b = seed(&store, "bob", "B").await;
        let c = seed(&store, "carol", "C").await;
        for _ in 0..2 {
            store.add_relation(RelationKind::Like, &UserId::generate(), &b.id).await.unwrap();
        }
        store.add_relation(RelationKind::Like, &UserId::generate(), &c.id).await.unwrap();

        let query = parse_query("o:L", DEFAULT_SORT).unwrap();
        let filter = ChapterFilter::default();
        let page = store.find_filtered(&filter, &query.sort, 0, 2).await.unwrap();
        let ids: Vec<_> = page.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec![b.id.clone(), c.id.clone()]);

        let rest = store.find_filtered(&filter, &query.sort, 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, a.id);
    }

    #[tokio::test]
    async fn continuation_requires_existing_parent() {
        let store = InMemoryStore::new();
        let parent = seed(&store, "alice", "A").await;
        let draft = ChapterDraft::continuation(&parent, "bob", Some("Two"), "More.", &[]).unwrap();
        store.delete_by_id(&parent.id).await.unwrap();

        let err = store.create(draft).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn sessions_resolve_to_viewers() {
        let store = InMemoryStore::new();
        let viewer = store.register_user("alice", Role::Moderator).await;
        let token = store.open_session(&viewer.id).await;

        assert_eq!(store.viewer_for_session(&token).await.unwrap(), Some(viewer));
        assert_eq!(store.viewer_for_session("nope").await.unwrap(), None);
    }
}
