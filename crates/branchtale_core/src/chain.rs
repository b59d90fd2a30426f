//! crates/branchtale_core/src/chain.rs
//!
//! Reconstructs the path from a story's root down to one chapter.
//!
//! A parent that can no longer be found ends the walk instead of failing it: the
//! caller gets the longest resolvable tail of the chain. Dangling parents are a
//! normal result of an interrupted cascade delete, so readers have to live with
//! them. The truncation is logged at `warn` level; the response does not mark it.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::warn;

use crate::aggregate::ChapterAggregator;
use crate::domain::{Chapter, ChapterId, Viewer};
use crate::ports::{ChapterStore, PortError, PortResult};
use crate::views::ChapterDetail;

#[derive(Clone)]
pub struct ChainResolver {
    chapters: Arc<dyn ChapterStore>,
    aggregator: ChapterAggregator,
}

impl ChainResolver {
    pub fn new(chapters: Arc<dyn ChapterStore>, aggregator: ChapterAggregator) -> Self {
        Self {
            chapters,
            aggregator,
        }
    }

    /// Chapters from the root (or the first resolvable ancestor) to `start_id`.
    pub async fn resolve(
        &self,
        start_id: &ChapterId,
        viewer: Option<&Viewer>,
    ) -> PortResult<Vec<ChapterDetail>> {
        let path = self.walk(start_id).await?;
        try_join_all(
            path.iter()
                .map(|chapter| self.aggregator.full_info_with_continuations(chapter, viewer)),
        )
        .await
    }

    /// The raw chapters of the chain, root first.
    pub async fn walk(&self, start_id: &ChapterId) -> PortResult<Vec<Chapter>> {
        let start = self
            .chapters
            .find_by_id(start_id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("Chapter {} not found.", start_id)))?;

        let mut seen = HashSet::from([start.id.clone()]);
        let mut path = vec![start];

        while let Some(parent_id) = path.last().and_then(|c| c.previous_chapter_id.clone()) {
            if !seen.insert(parent_id.clone()) {
                warn!(chapter_id = %parent_id, "Chapter chain loops back on itself; stopping.");
                break;
            }
            match self.chapters.find_by_id(&parent_id).await? {
                Some(parent) => path.push(parent),
                None => {
                    warn!(
                        start_id = %start_id,
                        missing_id = %parent_id,
                        "Chapter chain is broken; returning the resolvable tail."
                    );
                    break;
                }
            }
        }

        path.reverse();
        Ok(path)
    }
}
