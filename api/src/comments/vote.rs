use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};

use crate::{App, error::AppError, identity::AuthUser, json::JsonBody};

use super::{
    CommentId, VoteTally,
    events::{CommentEvent, EventKind},
};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(try_from = "i64", into = "i64")]
pub enum VoteValue {
    Like,
    Dislike,
}

impl TryFrom<i64> for VoteValue {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteValue::Like),
            -1 => Ok(VoteValue::Dislike),
            other => Err(format!("invalid vote value {other}, expected 1 or -1")),
        }
    }
}

impl From<VoteValue> for i64 {
    fn from(value: VoteValue) -> Self {
        match value {
            VoteValue::Like => 1,
            VoteValue::Dislike => -1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteAction {
    Retract,
    Cast(VoteValue),
}

impl VoteAction {
    /// Voting the same way twice takes the vote back; voting the other way
    /// replaces it.
    pub fn resolve(current: Option<VoteValue>, requested: VoteValue) -> Self {
        if current == Some(requested) {
            VoteAction::Retract
        } else {
            VoteAction::Cast(requested)
        }
    }

    pub fn resulting_vote(self) -> Option<VoteValue> {
        match self {
            VoteAction::Retract => None,
            VoteAction::Cast(value) => Some(value),
        }
    }
}

impl VoteTally {
    /// The tally after the viewer's vote moved from `previous` according to
    /// `action`, without waiting for the backend to recount.
    pub fn apply(self, previous: Option<VoteValue>, action: VoteAction) -> VoteTally {
        let mut tally = self;
        match previous {
            Some(VoteValue::Like) => tally.likes = (tally.likes - 1).max(0),
            Some(VoteValue::Dislike) => tally.dislikes = (tally.dislikes - 1).max(0),
            None => {}
        }
        match action.resulting_vote() {
            Some(VoteValue::Like) => tally.likes += 1,
            Some(VoteValue::Dislike) => tally.dislikes += 1,
            None => {}
        }
        tally
    }
}

#[derive(Debug)]
pub struct VoteOutcome {
    pub comment_id: CommentId,
    pub slug: Option<String>,
    pub vote: Option<VoteValue>,
    pub tally: VoteTally,
}

#[derive(Deserialize)]
pub struct VoteRequest {
    value: VoteValue,
}

#[derive(Serialize)]
pub struct VoteResponse {
    comment_id: CommentId,
    vote: Option<VoteValue>,
    likes: i64,
    dislikes: i64,
}

pub async fn vote_comment(
    State(ctx): State<App>,
    Path(id): Path<CommentId>,
    AuthUser(viewer): AuthUser,
    JsonBody(request): JsonBody<VoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    let outcome = ctx.comments.cast_vote(&viewer, id, request.value).await?;

    ctx.events.publish(CommentEvent {
        slug: outcome.slug,
        comment_id: Some(id),
        kind: EventKind::Voted,
    });

    Ok(Json(VoteResponse {
        comment_id: outcome.comment_id,
        vote: outcome.vote,
        likes: outcome.tally.likes,
        dislikes: outcome.tally.dislikes,
    }))
}
