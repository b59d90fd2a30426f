//! crates/branchtale_core/src/service.rs
//!
//! `ChapterService` is the entry point the web layer calls. Each method takes the
//! current viewer (if any) and already-parsed parameters, and returns a view or a
//! `PortError`.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::aggregate::ChapterAggregator;
use crate::cascade::DeletionCascade;
use crate::chain::ChainResolver;
use crate::domain::{
    Chapter, ChapterDraft, ChapterId, Flag, FlagId, KeywordAction, KeywordRequest, RelationKind,
    Viewer,
};
use crate::keywords::{keywords_from_json, KeywordSet};
use crate::moderation::{
    can_apply_immediately, plan_addition, plan_deletion, resolve_capabilities, KeywordPlan,
};
use crate::ports::{
    ChapterStore, KeywordReviewQueue, PortError, PortResult, RelationshipStore, UserDirectory,
};
use crate::query::{parse_query, ChapterFilter, ListParams, DEFAULT_SORT};
use crate::views::{ChapterDetail, ChapterInfo, ChapterPage, KeywordOutcome};

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// The set of adapters the service runs on.
#[derive(Clone)]
pub struct StorePorts {
    pub chapters: Arc<dyn ChapterStore>,
    pub relations: Arc<dyn RelationshipStore>,
    pub users: Arc<dyn UserDirectory>,
    pub review_queue: Arc<dyn KeywordReviewQueue>,
}

#[derive(Clone)]
pub struct ChapterService {
    chapters: Arc<dyn ChapterStore>,
    relations: Arc<dyn RelationshipStore>,
    review_queue: Arc<dyn KeywordReviewQueue>,
    aggregator: ChapterAggregator,
    chains: ChainResolver,
    cascade: DeletionCascade,
    page_size: u32,
}

impl ChapterService {
    pub fn new(ports: StorePorts, page_size: u32) -> Self {
        let aggregator = ChapterAggregator::new(
            ports.chapters.clone(),
            ports.relations.clone(),
            ports.users.clone(),
        );
        Self {
            chains: ChainResolver::new(ports.chapters.clone(), aggregator.clone()),
            cascade: DeletionCascade::new(ports.chapters.clone(), ports.relations.clone()),
            chapters: ports.chapters,
            relations: ports.relations,
            review_queue: ports.review_queue,
            aggregator,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    //-------------------------------------------------------------------------------------
    // Reading
    //-------------------------------------------------------------------------------------

    pub async fn list_chapters(
        &self,
        viewer: Option<&Viewer>,
        params: &ListParams,
    ) -> PortResult<ChapterPage> {
        let query = parse_query(&params.search, DEFAULT_SORT)?;
        let filter = ChapterFilter {
            stories_only: params.stories_only,
            terms: query.terms,
        };
        let offset = u64::from(params.page.max(1) - 1) * u64::from(self.page_size);

        let chapters = self
            .chapters
            .find_filtered(&filter, &query.sort, offset, u64::from(self.page_size))
            .await?;
        let items = self.aggregator.list_items(&chapters, viewer).await?;

        Ok(ChapterPage {
            page: params.page,
            page_size: self.page_size,
            items,
        })
    }

    pub async fn chapter_detail(
        &self,
        viewer: Option<&Viewer>,
        id: &ChapterId,
    ) -> PortResult<ChapterDetail> {
        let chapter = self.load(id).await?;
        self.aggregator
            .full_info_with_continuations(&chapter, viewer)
            .await
    }

    pub async fn chain(
        &self,
        viewer: Option<&Viewer>,
        id: &ChapterId,
    ) -> PortResult<Vec<ChapterDetail>> {
        self.chains.resolve(id, viewer).await
    }

    //-------------------------------------------------------------------------------------
    // Writing chapters
    //-------------------------------------------------------------------------------------

    pub async fn create_story(
        &self,
        viewer: Option<&Viewer>,
        story_title: &str,
        body_text: &str,
        keywords: &[String],
    ) -> PortResult<ChapterInfo> {
        let author = viewer.ok_or(PortError::Unauthorized)?;
        let draft = ChapterDraft::story(&author.name, story_title, body_text, keywords)?;
        let chapter = self.chapters.create(draft).await?;
        info!(chapter_id = %chapter.id, author = %author.name, "Story created.");
        self.aggregator.full_info(&chapter, viewer).await
    }

    pub async fn continue_chapter(
        &self,
        viewer: Option<&Viewer>,
        parent_id: &ChapterId,
        chapter_title: Option<&str>,
        body_text: &str,
        keywords: &[String],
    ) -> PortResult<ChapterInfo> {
        let author = viewer.ok_or(PortError::Unauthorized)?;
        let parent = self.load(parent_id).await?;
        let draft =
            ChapterDraft::continuation(&parent, &author.name, chapter_title, body_text, keywords)?;
        let chapter = self.chapters.create(draft).await?;
        info!(
            chapter_id = %chapter.id,
            parent_id = %parent_id,
            author = %author.name,
            "Continuation created."
        );
        self.aggregator.full_info(&chapter, viewer).await
    }

    /// Cascade-deletes a chapter subtree. Admins and moderators only.
    pub async fn delete_chapter(&self, viewer: Option<&Viewer>, id: &ChapterId) -> PortResult<usize> {
        let actor = viewer.ok_or(PortError::Unauthorized)?;
        let chapter = self.load(id).await?;
        if !resolve_capabilities(Some(actor), &chapter.author_name).is_privileged() {
            return Err(PortError::Forbidden(
                "Only moderators can delete chapters.".to_string(),
            ));
        }
        let removed = self.cascade.delete_subtree(id).await?;
        info!(chapter_id = %id, removed, actor = %actor.name, "Chapter subtree deleted.");
        Ok(removed)
    }

    //-------------------------------------------------------------------------------------
    // Keywords
    //-------------------------------------------------------------------------------------

    pub async fn add_keywords(
        &self,
        viewer: Option<&Viewer>,
        id: &ChapterId,
        body: &Value,
    ) -> PortResult<KeywordOutcome> {
        let actor = viewer.ok_or(PortError::Unauthorized)?;
        let chapter = self.load(id).await?;
        let plan = plan_addition(&chapter, body)?;
        self.apply_or_queue(actor, &chapter, KeywordAction::Add, plan)
            .await
    }

    pub async fn delete_keyword(
        &self,
        viewer: Option<&Viewer>,
        id: &ChapterId,
        keyword: &str,
    ) -> PortResult<KeywordOutcome> {
        let actor = viewer.ok_or(PortError::Unauthorized)?;
        let chapter = self.load(id).await?;
        let plan = plan_deletion(&chapter, keyword)?;
        self.apply_or_queue(actor, &chapter, KeywordAction::Delete, plan)
            .await
    }

    /// Admin edit: replaces the whole keyword set, bypassing review.
    pub async fn replace_keywords(
        &self,
        viewer: Option<&Viewer>,
        id: &ChapterId,
        body: &Value,
    ) -> PortResult<ChapterInfo> {
        let actor = viewer.ok_or(PortError::Unauthorized)?;
        let keywords = KeywordSet::from_valid(keywords_from_json(body)?);
        let chapter = self.load(id).await?;
        if !resolve_capabilities(Some(actor), &chapter.author_name).is_privileged() {
            return Err(PortError::Forbidden(
                "Only moderators can replace keywords.".to_string(),
            ));
        }
        let updated = self.store_keywords(id, &keywords).await?;
        info!(chapter_id = %id, actor = %actor.name, "Keywords replaced.");
        self.aggregator.full_info(&updated, viewer).await
    }

    async fn apply_or_queue(
        &self,
        actor: &Viewer,
        chapter: &Chapter,
        action: KeywordAction,
        plan: KeywordPlan,
    ) -> PortResult<KeywordOutcome> {
        let capabilities = resolve_capabilities(Some(actor), &chapter.author_name);
        if can_apply_immediately(&capabilities, &chapter.author_name, &actor.name) {
            let updated = self.store_keywords(&chapter.id, &plan.result).await?;
            info!(
                chapter_id = %chapter.id,
                action = action.as_str(),
                actor = %actor.name,
                "Keyword change applied."
            );
            let info = self.aggregator.full_info(&updated, Some(actor)).await?;
            return Ok(KeywordOutcome::Applied(info));
        }

        let request = KeywordRequest {
            chapter_id: chapter.id.clone(),
            requested_by: actor.id.clone(),
            action,
            keywords: plan.requested,
            create_date: chrono::Utc::now(),
        };
        self.review_queue.enqueue(request.clone()).await?;
        info!(
            chapter_id = %chapter.id,
            action = action.as_str(),
            actor = %actor.name,
            "Keyword change queued for review."
        );
        Ok(KeywordOutcome::Queued(request))
    }

    async fn store_keywords(&self, id: &ChapterId, keywords: &KeywordSet) -> PortResult<Chapter> {
        self.chapters
            .update_keywords(id, keywords)
            .await?
            .ok_or_else(|| not_found(id))
    }

    //-------------------------------------------------------------------------------------
    // Likes, bookmarks and flags
    //-------------------------------------------------------------------------------------

    pub async fn relate(
        &self,
        viewer: Option<&Viewer>,
        kind: RelationKind,
        id: &ChapterId,
    ) -> PortResult<()> {
        let user = viewer.ok_or(PortError::Unauthorized)?;
        self.load(id).await?;
        self.relations.add_relation(kind, &user.id, id).await
    }

    pub async fn unrelate(
        &self,
        viewer: Option<&Viewer>,
        kind: RelationKind,
        id: &ChapterId,
    ) -> PortResult<()> {
        let user = viewer.ok_or(PortError::Unauthorized)?;
        self.relations.remove_relation(kind, &user.id, id).await
    }

    /// Anyone may flag, signed in or not.
    pub async fn flag(
        &self,
        viewer: Option<&Viewer>,
        id: &ChapterId,
        reason: &str,
    ) -> PortResult<Flag> {
        if reason.trim().is_empty() {
            return Err(PortError::Validation("A flag needs a reason.".to_string()));
        }
        self.load(id).await?;
        let flag = self
            .relations
            .add_flag(viewer.map(|v| &v.id), id, reason)
            .await?;
        info!(chapter_id = %id, flag_id = %flag.id, "Chapter flagged.");
        Ok(flag)
    }

    pub async fn list_flags(&self, viewer: Option<&Viewer>, page: u32) -> PortResult<Vec<Flag>> {
        self.require_privileged(viewer, "Only moderators can review flags.")?;
        let offset = u64::from(page.max(1) - 1) * u64::from(self.page_size);
        self.relations
            .list_flags(offset, u64::from(self.page_size))
            .await
    }

    pub async fn delete_flag(&self, viewer: Option<&Viewer>, id: &FlagId) -> PortResult<()> {
        self.require_privileged(viewer, "Only moderators can delete flags.")?;
        if self.relations.delete_flag(id).await? {
            Ok(())
        } else {
            Err(PortError::NotFound(format!("Flag {} not found.", id)))
        }
    }

    //-------------------------------------------------------------------------------------
    // Helpers
    //-------------------------------------------------------------------------------------

    async fn load(&self, id: &ChapterId) -> PortResult<Chapter> {
        self.chapters
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    fn require_privileged(&self, viewer: Option<&Viewer>, message: &str) -> PortResult<()> {
        let actor = viewer.ok_or(PortError::Unauthorized)?;
        if resolve_capabilities(Some(actor), "").is_privileged() {
            Ok(())
        } else {
            Err(PortError::Forbidden(message.to_string()))
        }
    }
}

fn not_found(id: &ChapterId) -> PortError {
    PortError::NotFound(format!("Chapter {} not found.", id))
}
