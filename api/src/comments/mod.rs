pub mod create;
pub mod events;
pub mod fetch;
pub mod get;
pub mod moderate;
pub mod routes;
pub mod store;
pub mod tree;
pub mod vote;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    backend::BackendError,
    error::ApiRequestError,
    identity::{Role, role::Badge},
};

pub use store::CommentStore;
pub use tree::build_comment_tree;

pub type CommentId = i64;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Author {
    pub id: Option<Uuid>,
    pub username: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl Author {
    pub fn badge(&self) -> Option<Badge> {
        self.role.badge()
    }
}

// A comment row as it comes out of the backend
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CommentRecord {
    pub id: CommentId,
    pub content: String,
    /// ISO-8601; compares chronologically as a string.
    pub created_at: String,
    pub parent_id: Option<CommentId>,
    pub author: Author,
    pub pinned: bool,
    pub allow_replies: bool,
    pub allow_dislikes: bool,
    pub slug: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub likes: i64,
    pub dislikes: i64,
}

/// The model that will be returned to the client, see [`tree::forest_json`].
///
/// Reply chains can be arbitrarily deep, so nodes are never walked
/// recursively: neither when dropped nor when written out.
#[derive(Debug, PartialEq)]
pub struct CommentNode {
    pub id: CommentId,
    pub content: String,
    pub created_at: String,
    pub parent_id: Option<CommentId>,
    pub author: Author,
    pub badge: Option<Badge>,
    pub likes: i64,
    pub dislikes: i64,
    pub pinned: bool,
    pub allow_replies: bool,
    pub allow_dislikes: bool,
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    pub fn new(record: CommentRecord, tally: VoteTally, children: Vec<CommentNode>) -> Self {
        CommentNode {
            badge: record.author.badge(),
            id: record.id,
            content: record.content,
            created_at: record.created_at,
            parent_id: record.parent_id,
            author: record.author,
            likes: tally.likes,
            dislikes: tally.dislikes,
            pinned: record.pinned,
            allow_replies: record.allow_replies,
            allow_dislikes: record.allow_dislikes,
            children,
        }
    }
}

impl Drop for CommentNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CommentError {
    #[error("No content provided")]
    EmptyContent,

    #[error("Content too long (max {0} characters)")]
    ContentTooLong(usize),

    #[error("Thread name too long (max {0} characters)")]
    SlugTooLong(usize),

    #[error("Comment not found")]
    NotFound,

    #[error("You're replying to a comment that does not belong to this thread")]
    ForeignParent,

    #[error("Replies are closed for this comment")]
    RepliesClosed,

    #[error("Dislikes are disabled for this comment")]
    DislikesDisabled,

    #[error("Limit: 1 comment every 5 minutes, or replies are closed.")]
    RateLimited,

    #[error("Only admins and creators can moderate comments")]
    NotModerator,

    #[error("You can only delete your own comments")]
    NotOwner,

    #[error("Nothing to update")]
    EmptyPatch,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ApiRequestError for CommentError {
    fn status_code(&self) -> StatusCode {
        match self {
            CommentError::EmptyContent
            | CommentError::ContentTooLong(_)
            | CommentError::SlugTooLong(_)
            | CommentError::ForeignParent
            | CommentError::EmptyPatch => StatusCode::BAD_REQUEST,
            CommentError::NotFound => StatusCode::NOT_FOUND,
            CommentError::RepliesClosed
            | CommentError::DislikesDisabled
            | CommentError::NotModerator
            | CommentError::NotOwner => StatusCode::FORBIDDEN,
            CommentError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            CommentError::Backend(e) => e.status_code(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            CommentError::RateLimited => "RATE_LIMITED",
            CommentError::NotModerator | CommentError::NotOwner => "FORBIDDEN",
            CommentError::Backend(e) => e.error_code(),
            _ => "INVALID_COMMENT",
        }
    }
}
