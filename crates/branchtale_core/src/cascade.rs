//! crates/branchtale_core/src/cascade.rs
//!
//! Recursive removal of a chapter subtree together with every like, bookmark and
//! flag that references a removed chapter.
//!
//! Children go before their parent; siblings are removed concurrently. Nothing is
//! rolled back: a storage error stops the cascade where it stands and is returned
//! as-is. Running the cascade again finishes the job, since chapters that are
//! already gone no longer show up as children.

use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use tracing::debug;

use crate::domain::{ChapterId, RelationKind};
use crate::ports::{ChapterStore, PortResult, RelationshipStore};

#[derive(Clone)]
pub struct DeletionCascade {
    chapters: Arc<dyn ChapterStore>,
    relations: Arc<dyn RelationshipStore>,
}

impl DeletionCascade {
    pub fn new(chapters: Arc<dyn ChapterStore>, relations: Arc<dyn RelationshipStore>) -> Self {
        Self {
            chapters,
            relations,
        }
    }

    /// Deletes `root_id` and all of its descendants. Returns how many chapters were
    /// actually removed by this call.
    pub async fn delete_subtree(&self, root_id: &ChapterId) -> PortResult<usize> {
        self.delete_node(root_id.clone()).await
    }

    fn delete_node(&self, id: ChapterId) -> BoxFuture<'_, PortResult<usize>> {
        async move {
            let children = self.chapters.find_children(&id).await?;
            let removed_below: usize =
                try_join_all(children.into_iter().map(|child| self.delete_node(child.id)))
                    .await?
                    .into_iter()
                    .sum();

            let likes = self
                .relations
                .delete_relations_for(RelationKind::Like, &id)
                .await?;
            let flags = self.relations.delete_flags_for(&id).await?;
            let bookmarks = self
                .relations
                .delete_relations_for(RelationKind::Bookmark, &id)
                .await?;
            let existed = self.chapters.delete_by_id(&id).await?;
            debug!(
                chapter_id = %id,
                likes, flags, bookmarks, existed,
                "Removed chapter and its references."
            );

            Ok(removed_below + usize::from(existed))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Chapter, ChapterDraft, UserId};
    use crate::keywords::KeywordSet;
    use crate::memory::InMemoryStore;
    use crate::ports::PortError;
    use crate::query::{ChapterFilter, SortKey};
    use async_trait::async_trait;

    /// Delegates to the in-memory store but refuses to delete one chapter.
    struct FailingStore {
        inner: Arc<InMemoryStore>,
        refuse: ChapterId,
    }

    #[async_trait]
    impl ChapterStore for FailingStore {
        async fn create(&self, draft: ChapterDraft) -> PortResult<Chapter> {
            self.inner.create(draft).await
        }
        async fn find_by_id(&self, id: &ChapterId) -> PortResult<Option<Chapter>> {
            self.inner.find_by_id(id).await
        }
        async fn find_filtered(
            &self,
            filter: &ChapterFilter,
            sort: &[SortKey],
            offset: u64,
            limit: u64,
        ) -> PortResult<Vec<Chapter>> {
            self.inner.find_filtered(filter, sort, offset, limit).await
        }
        async fn find_children(&self, parent_id: &ChapterId) -> PortResult<Vec<Chapter>> {
            self.inner.find_children(parent_id).await
        }
        async fn update_keywords(
            &self,
            id: &ChapterId,
            keywords: &KeywordSet,
        ) -> PortResult<Option<Chapter>> {
            self.inner.update_keywords(id, keywords).await
        }
        async fn delete_by_id(&self, id: &ChapterId) -> PortResult<bool> {
            if id == &self.refuse {
                return Err(PortError::Storage("disk on fire".into()));
            }
            self.inner.delete_by_id(id).await
        }
    }

    async fn story(store: &InMemoryStore) -> (Chapter, Vec<Chapter>) {
        let root = store
            .create(ChapterDraft::story("alice", "Saga", "Root.", &[]).unwrap())
            .await
            .unwrap();
        let left = store
            .create(ChapterDraft::continuation(&root, "bob", Some("L"), "L.", &[]).unwrap())
            .await
            .unwrap();
        let right = store
            .create(ChapterDraft::continuation(&root, "bob", Some("R"), "R.", &[]).unwrap())
            .await
            .unwrap();
        let deep = store
            .create(ChapterDraft::continuation(&left, "carol", Some("D"), "D.", &[]).unwrap())
            .await
            .unwrap();
        (root, vec![left, right, deep])
    }

    #[tokio::test]
    async fn removes_descendants_and_references() {
        let store = Arc::new(InMemoryStore::new());
        let unrelated = store
            .create(ChapterDraft::story("zed", "Other", "Other.", &[]).unwrap())
            .await
            .unwrap();
        let (root, descendants) = story(&store).await;
        let user = UserId::generate();
        for chapter in descendants.iter().chain([&root, &unrelated]) {
            store.add_relation(RelationKind::Like, &user, &chapter.id).await.unwrap();
            store.add_relation(RelationKind::Bookmark, &user, &chapter.id).await.unwrap();
            store.add_flag(None, &chapter.id, "spam").await.unwrap();
        }

        let cascade = DeletionCascade::new(store.clone(), store.clone());
        assert_eq!(cascade.delete_subtree(&root.id).await.unwrap(), 4);

        for chapter in descendants.iter().chain([&root]) {
            assert!(store.find_by_id(&chapter.id).await.unwrap().is_none());
            assert_eq!(store.references_to(&chapter.id).await, 0);
        }
        assert_eq!(store.chapter_count().await, 1);
        assert_eq!(store.references_to(&unrelated.id).await, 3);
    }

    #[tokio::test]
    async fn partial_failure_is_kept_and_retry_finishes() {
        let store = Arc::new(InMemoryStore::new());
        let (root, descendants) = story(&store).await;
        let left = &descendants[0];
        let deep = &descendants[2];

        let failing = Arc::new(FailingStore {
            inner: store.clone(),
            refuse: left.id.clone(),
        });
        let cascade = DeletionCascade::new(failing, store.clone());
        let err = cascade.delete_subtree(&root.id).await.unwrap_err();
        assert!(matches!(err, PortError::Storage(_)));

        // The grandchild went first and stays gone; the root survived.
        assert!(store.find_by_id(&deep.id).await.unwrap().is_none());
        assert!(store.find_by_id(&root.id).await.unwrap().is_some());

        let cascade = DeletionCascade::new(store.clone(), store.clone());
        cascade.delete_subtree(&root.id).await.unwrap();
        assert_eq!(store.chapter_count().await, 0);
    }

    #[tokio::test]
    async fn missing_root_removes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let cascade = DeletionCascade::new(store.clone(), store.clone());
        assert_eq!(cascade.delete_subtree(&ChapterId::generate()).await.unwrap(), 0);
    }
}
