pub mod aggregate;
pub mod cascade;
pub mod chain;
pub mod domain;
pub mod keywords;
pub mod memory;
pub mod moderation;
pub mod ports;
pub mod query;
pub mod service;
pub mod views;

pub use domain::{
    Chapter, ChapterDraft, ChapterId, Flag, FlagId, KeywordAction, KeywordRequest, RelationKind,
    Role, UserId, Viewer,
};
pub use keywords::KeywordSet;
pub use ports::{
    ChapterStore, KeywordReviewQueue, PortError, PortResult, RelationshipStore, UserDirectory,
    ViewerResolver,
};
pub use query::{parse_query, ChapterFilter, ListParams, ParsedQuery, SortKey};
pub use service::{ChapterService, StorePorts, DEFAULT_PAGE_SIZE};
pub use views::{
    ChapterDetail, ChapterInfo, ChapterListItem, ChapterPage, ChapterSummary, KeywordOutcome,
};
