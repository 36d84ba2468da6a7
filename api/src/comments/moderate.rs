use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::{App, error::AppError, identity::AuthUser, json::JsonBody};

use super::{
    CommentId,
    events::{CommentEvent, EventKind},
};

/// Moderation flags to change; absent fields are left alone.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ModerationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_replies: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_dislikes: Option<bool>,
}

impl ModerationPatch {
    pub fn is_empty(&self) -> bool {
        self.pinned.is_none() && self.allow_replies.is_none() && self.allow_dislikes.is_none()
    }
}

pub async fn patch_comment(
    State(ctx): State<App>,
    Path(id): Path<CommentId>,
    AuthUser(viewer): AuthUser,
    JsonBody(patch): JsonBody<ModerationPatch>,
) -> Result<StatusCode, AppError> {
    let meta = ctx.comments.moderate(&viewer, id, &patch).await?;

    ctx.events.publish(CommentEvent {
        slug: meta.slug,
        comment_id: Some(id),
        kind: EventKind::Moderated,
    });

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_comment(
    State(ctx): State<App>,
    Path(id): Path<CommentId>,
    AuthUser(viewer): AuthUser,
) -> Result<StatusCode, AppError> {
    let meta = ctx.comments.delete_comment(&viewer, id).await?;

    ctx.events.publish(CommentEvent {
        slug: meta.slug,
        comment_id: Some(id),
        kind: EventKind::Deleted,
    });

    Ok(StatusCode::NO_CONTENT)
}
