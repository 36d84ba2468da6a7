use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::{App, error::AppError, identity::AuthUser, json::JsonBody};

use super::{
    CommentError, CommentId, CommentRecord,
    events::{CommentEvent, EventKind},
};

const MAX_SLUG_LENGTH: usize = 200;

pub async fn create_comment(
    State(ctx): State<App>,
    AuthUser(viewer): AuthUser,
    JsonBody(mut submission): JsonBody<CommentSubmission>,
) -> Result<(StatusCode, Json<Option<CommentRecord>>), AppError> {
    submission.validate(ctx.comments.max_length())?;

    let slug = submission.slug.clone();
    let created = ctx.comments.send_comment(&viewer, submission).await?;

    ctx.events.publish(CommentEvent {
        slug,
        comment_id: created.as_ref().map(|c| c.id),
        kind: EventKind::Created,
    });

    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Deserialize, Debug)]
pub struct CommentSubmission {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    #[serde(default)]
    pub slug: Option<String>,
}

impl CommentSubmission {
    pub fn validate(&mut self, max_length: usize) -> Result<(), CommentError> {
        self.content = self.content.trim().to_string();
        if self.content.is_empty() {
            return Err(CommentError::EmptyContent);
        }
        if self.content.chars().count() > max_length {
            return Err(CommentError::ContentTooLong(max_length));
        }

        if let Some(slug) = self.slug.take() {
            let slug = slug.trim().to_string();
            if slug.chars().count() > MAX_SLUG_LENGTH {
                return Err(CommentError::SlugTooLong(MAX_SLUG_LENGTH));
            }
            self.slug = (!slug.is_empty()).then_some(slug);
        }

        Ok(())
    }
}
