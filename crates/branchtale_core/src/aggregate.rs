//! crates/branchtale_core/src/aggregate.rs
//!
//! Turns stored chapters into response views. Every join is an explicit call:
//! like counts and author ids are fetched in one batch per page, and viewer flags
//! with one existence check per relation kind, whatever the page size.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::domain::{Chapter, ChapterId, RelationKind, UserId, Viewer};
use crate::ports::{ChapterStore, PortResult, RelationshipStore, UserDirectory};
use crate::views::{ChapterDetail, ChapterInfo, ChapterListItem, ChapterSummary};

#[derive(Clone)]
pub struct ChapterAggregator {
    chapters: Arc<dyn ChapterStore>,
    relations: Arc<dyn RelationshipStore>,
    users: Arc<dyn UserDirectory>,
}

impl ChapterAggregator {
    pub fn new(
        chapters: Arc<dyn ChapterStore>,
        relations: Arc<dyn RelationshipStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            chapters,
            relations,
            users,
        }
    }

    /// Summaries for `chapters`, in the same order.
    pub async fn summaries(&self, chapters: &[Chapter]) -> PortResult<Vec<ChapterSummary>> {
        if chapters.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<ChapterId> = chapters.iter().map(|c| c.id.clone()).collect();
        let mut names: Vec<String> = chapters.iter().map(|c| c.author_name.clone()).collect();
        names.sort();
        names.dedup();

        let (like_counts, author_ids) = futures::try_join!(
            self.relations.count_likes(&ids),
            self.users.author_ids(&names)
        )?;

        Ok(chapters
            .iter()
            .map(|chapter| summarize(chapter, &like_counts, &author_ids))
            .collect())
    }

    /// The full view of one chapter. Viewer flags use point lookups and are skipped
    /// without a viewer.
    pub async fn full_info(
        &self,
        chapter: &Chapter,
        viewer: Option<&Viewer>,
    ) -> PortResult<ChapterInfo> {
        let summary = self
            .summaries(std::slice::from_ref(chapter))
            .await?
            .into_iter()
            .next()
            .unwrap_or_else(|| summarize(chapter, &HashMap::new(), &HashMap::new()));

        let (liked, bookmarked) = match viewer {
            Some(viewer) => {
                let (liked, bookmarked) = futures::try_join!(
                    self.relations
                        .has_relation(RelationKind::Like, &viewer.id, &chapter.id),
                    self.relations
                        .has_relation(RelationKind::Bookmark, &viewer.id, &chapter.id)
                )?;
                (Some(liked), Some(bookmarked))
            }
            None => (None, None),
        };

        Ok(ChapterInfo {
            summary,
            body_text: chapter.body_text.clone(),
            keywords: chapter.keywords.to_vec(),
            create_date: chapter.create_date,
            liked_by_viewer: liked,
            bookmarked_by_viewer: bookmarked,
        })
    }

    pub async fn full_info_with_continuations(
        &self,
        chapter: &Chapter,
        viewer: Option<&Viewer>,
    ) -> PortResult<ChapterDetail> {
        let children = self.chapters.find_children(&chapter.id).await?;
        let (info, continuation_chapters) = futures::try_join!(
            self.full_info(chapter, viewer),
            self.summaries(&children)
        )?;
        Ok(ChapterDetail {
            info,
            continuation_chapters,
        })
    }

    /// Rows for one page of search results.
    pub async fn list_items(
        &self,
        chapters: &[Chapter],
        viewer: Option<&Viewer>,
    ) -> PortResult<Vec<ChapterListItem>> {
        let summaries = self.summaries(chapters).await?;

        let flags = match viewer {
            Some(viewer) if !chapters.is_empty() => {
                let ids: Vec<ChapterId> = chapters.iter().map(|c| c.id.clone()).collect();
                Some(self.viewer_flags(&viewer.id, &ids).await?)
            }
            Some(_) => Some((HashSet::new(), HashSet::new())),
            None => None,
        };

        Ok(chapters
            .iter()
            .zip(summaries)
            .map(|(chapter, summary)| {
                let (liked, bookmarked) = match &flags {
                    Some((liked, bookmarked)) => (
                        Some(liked.contains(&chapter.id)),
                        Some(bookmarked.contains(&chapter.id)),
                    ),
                    None => (None, None),
                };
                ChapterListItem {
                    summary,
                    create_date: chapter.create_date,
                    liked_by_viewer: liked,
                    bookmarked_by_viewer: bookmarked,
                }
            })
            .collect())
    }

    async fn viewer_flags(
        &self,
        user_id: &UserId,
        ids: &[ChapterId],
    ) -> PortResult<(HashSet<ChapterId>, HashSet<ChapterId>)> {
        futures::try_join!(
            self.relations
                .relations_among(RelationKind::Like, user_id, ids),
            self.relations
                .relations_among(RelationKind::Bookmark, user_id, ids)
        )
    }
}

fn summarize(
    chapter: &Chapter,
    like_counts: &HashMap<ChapterId, u64>,
    author_ids: &HashMap<String, UserId>,
) -> ChapterSummary {
    ChapterSummary {
        story_id: chapter.story_id.clone(),
        chapter_id: chapter.id.clone(),
        story_title: chapter.story_title.clone(),
        chapter_title: chapter.chapter_title.clone(),
        author_name: chapter.author_name.clone(),
        author_id: author_ids.get(&chapter.author_name).cloned(),
        previous_chapter_id: chapter.previous_chapter_id.clone(),
        like_count: like_counts.get(&chapter.id).copied().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChapterDraft, Role};
    use crate::memory::InMemoryStore;

    async fn setup() -> (Arc<InMemoryStore>, ChapterAggregator) {
        let store = Arc::new(InMemoryStore::new());
        let aggregator = ChapterAggregator::new(store.clone(), store.clone(), store.clone());
        (store, aggregator)
    }

    #[tokio::test]
    async fn full_info_omits_viewer_flags_without_viewer() {
        let (store, aggregator) = setup().await;
        let author = store.register_user("alice", Role::User).await;
        let chapter = store
            .create(ChapterDraft::story("alice", "Tale", "Body.", &["x".into()]).unwrap())
            .await
            .unwrap();
        store
            .add_relation(RelationKind::Like, &author.id, &chapter.id)
            .await
            .unwrap();

        let anonymous = aggregator.full_info(&chapter, None).await.unwrap();
        assert_eq!(anonymous.liked_by_viewer, None);
        assert_eq!(anonymous.summary.like_count, 1);
        assert_eq!(anonymous.summary.author_id, Some(author.id.clone()));

        let json = serde_json::to_value(&anonymous).unwrap();
        assert!(json.get("likedByViewer").is_none());
        assert_eq!(json["storyId"], json["chapterId"]);

        let seen = aggregator.full_info(&chapter, Some(&author)).await.unwrap();
        assert_eq!(seen.liked_by_viewer, Some(true));
        assert_eq!(seen.bookmarked_by_viewer, Some(false));
    }

    #[tokio::test]
    async fn continuations_are_oldest_first() {
        let (store, aggregator) = setup().await;
        let root = store
            .create(ChapterDraft::story("alice", "Tale", "Body.", &[]).unwrap())
            .await
            .unwrap();
        let mut expected = Vec::new();
        for title in ["left", "right"] {
            let draft =
                ChapterDraft::continuation(&root, "bob", Some(title), "More.", &[]).unwrap();
            expected.push(store.create(draft).await.unwrap().id);
        }

        let detail = aggregator
            .full_info_with_continuations(&root, None)
            .await
            .unwrap();
        let ids: Vec<_> = detail
            .continuation_chapters
            .iter()
            .map(|c| c.chapter_id.clone())
            .collect();
        assert_eq!(ids, expected);
        assert_eq!(detail.continuation_chapters[0].author_id, None);
    }

    #[tokio::test]
    async fn list_items_apply_batched_viewer_flags() {
        let (store, aggregator) = setup().await;
        let viewer = store.register_user("reader", Role::User).await;
        let mut chapters = Vec::new();
        for title in ["one", "two", "three"] {
            let draft = ChapterDraft::story("alice", title, "Body.", &[]).unwrap();
            chapters.push(store.create(draft).await.unwrap());
        }
        store
            .add_relation(RelationKind::Like, &viewer.id, &chapters[0].id)
            .await
            .unwrap();
        store
            .add_relation(RelationKind::Bookmark, &viewer.id, &chapters[2].id)
            .await
            .unwrap();

        let items = aggregator.list_items(&chapters, Some(&viewer)).await.unwrap();
        let flags: Vec<_> = items
            .iter()
            .map(|i| (i.liked_by_viewer, i.bookmarked_by_viewer))
            .collect();
        assert_eq!(
            flags,
            vec![
                (Some(true), Some(false)),
                (Some(false), Some(false)),
                (Some(false), Some(true)),
            ]
        );
        assert_eq!(items[0].summary.like_count, 1);

        let anonymous = aggregator.list_items(&chapters, None).await.unwrap();
        assert!(anonymous.iter().all(|i| i.liked_by_viewer.is_none()));
    }
}
