use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    backend::{BackendError, Filter, Query, TableSource},
    identity::{Role, Viewer},
};

use super::{
    CommentError, CommentId, CommentNode, CommentRecord,
    create::CommentSubmission,
    fetch::{self, COMMENTS_TABLE},
    moderate::ModerationPatch,
    tree::{build_comment_tree, count_nodes},
    vote::{VoteAction, VoteOutcome, VoteValue},
};

pub const VOTES_TABLE: &str = "comment_votes";
pub const PROFILES_TABLE: &str = "profiles";

/// The columns needed to check replies, votes and ownership.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct CommentMeta {
    pub id: CommentId,
    pub author_id: Option<Uuid>,
    pub slug: Option<String>,
    #[serde(default = "enabled")]
    pub allow_replies: bool,
    #[serde(default = "enabled")]
    pub allow_dislikes: bool,
}

fn enabled() -> bool {
    true
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Role,
}

/// Reads and writes comment threads through the backend's table API.
#[derive(Clone)]
pub struct CommentStore {
    source: Arc<dyn TableSource>,
    max_length: usize,
}

impl CommentStore {
    pub fn new(source: Arc<dyn TableSource>, max_length: usize) -> Self {
        Self { source, max_length }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub async fn fetch_comments_tree(
        &self,
        slug: Option<&str>,
        token: Option<&str>,
    ) -> Result<Vec<CommentNode>, CommentError> {
        let records = fetch::fetch_records(self.source.as_ref(), slug, token).await?;
        let ids: Vec<CommentId> = records.iter().map(|r| r.id).collect();

        // Counts are an enrichment, a thread without them is still a thread
        let tallies = match fetch::fetch_tallies(self.source.as_ref(), &ids, token).await {
            Ok(tallies) => tallies,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load vote tallies, showing zero");
                Default::default()
            }
        };

        let tree = build_comment_tree(records, &tallies);
        tracing::debug!(slug = ?slug, comments = count_nodes(&tree), roots = tree.len(), "Built comment tree");
        Ok(tree)
    }

    pub async fn comment_meta(
        &self,
        id: CommentId,
        token: Option<&str>,
    ) -> Result<Option<CommentMeta>, CommentError> {
        let query = Query::select("id,author_id,slug,allow_replies,allow_dislikes")
            .eq("id", id)
            .limit(1);
        let rows = self.source.select(COMMENTS_TABLE, &query, token).await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(decode(row)?)),
            None => Ok(None),
        }
    }

    pub async fn my_profile(&self, viewer: &Viewer) -> Result<Option<Profile>, CommentError> {
        let query = Query::select("id,username,role")
            .eq("id", viewer.user.id)
            .limit(1);
        let rows = self
            .source
            .select(PROFILES_TABLE, &query, Some(&viewer.token))
            .await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(decode(row)?)),
            None => Ok(None),
        }
    }

    pub async fn my_role(&self, viewer: &Viewer) -> Result<Role, CommentError> {
        Ok(self
            .my_profile(viewer)
            .await?
            .map(|p| p.role)
            .unwrap_or_default())
    }

    pub async fn send_comment(
        &self,
        viewer: &Viewer,
        submission: CommentSubmission,
    ) -> Result<Option<CommentRecord>, CommentError> {
        if let Some(parent_id) = submission.parent_id {
            let parent = self
                .comment_meta(parent_id, Some(&viewer.token))
                .await?
                .ok_or(CommentError::NotFound)?;

            if parent.slug != submission.slug {
                return Err(CommentError::ForeignParent);
            }
            if !parent.allow_replies {
                return Err(CommentError::RepliesClosed);
            }
        }

        let mut row = json!({
            "content": submission.content,
            "parent_id": submission.parent_id,
            "author_id": viewer.user.id,
        });
        if let Some(slug) = &submission.slug {
            row["slug"] = json!(slug);
        }

        let rows = self
            .source
            .insert(COMMENTS_TABLE, row, Some(&viewer.token))
            .await
            .map_err(|e| {
                if e.is_policy_violation() {
                    tracing::info!(user = %viewer.user.id, error = %e, "Comment refused by policy");
                    CommentError::RateLimited
                } else {
                    e.into()
                }
            })?;

        // The row is stored at this point, a reply we can't read back is still
        // a success. It may also come back empty if policies hide the new row.
        match fetch::decode_rows(rows) {
            Ok(records) => Ok(records.into_iter().next()),
            Err(e) => {
                tracing::warn!(user = %viewer.user.id, error = %e, "Could not decode inserted comment");
                Ok(None)
            }
        }
    }

    pub async fn my_vote(
        &self,
        viewer: &Viewer,
        id: CommentId,
    ) -> Result<Option<VoteValue>, CommentError> {
        #[derive(Deserialize)]
        struct VoteRow {
            value: VoteValue,
        }

        let query = Query::select("value")
            .eq("comment_id", id)
            .eq("user_id", viewer.user.id)
            .limit(1);
        let rows = self
            .source
            .select(VOTES_TABLE, &query, Some(&viewer.token))
            .await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(decode::<VoteRow>(row)?.value)),
            None => Ok(None),
        }
    }

    pub async fn cast_vote(
        &self,
        viewer: &Viewer,
        id: CommentId,
        value: VoteValue,
    ) -> Result<VoteOutcome, CommentError> {
        let meta = self
            .comment_meta(id, Some(&viewer.token))
            .await?
            .ok_or(CommentError::NotFound)?;

        let current = self.my_vote(viewer, id).await?;
        let action = VoteAction::resolve(current, value);

        // Taking back an old dislike stays possible after dislikes are closed
        if action == VoteAction::Cast(VoteValue::Dislike) && !meta.allow_dislikes {
            return Err(CommentError::DislikesDisabled);
        }

        let before = match fetch::fetch_tallies(self.source.as_ref(), &[id], Some(&viewer.token)).await {
            Ok(tallies) => tallies.get(&id).copied().unwrap_or_default(),
            Err(e) => {
                tracing::warn!(comment_id = id, error = %e, "Could not load vote tally");
                Default::default()
            }
        };

        match action {
            VoteAction::Retract => {
                let filter = Filter::new()
                    .eq("comment_id", id)
                    .eq("user_id", viewer.user.id);
                self.source
                    .delete(VOTES_TABLE, &filter, Some(&viewer.token))
                    .await?;
            }
            VoteAction::Cast(value) => {
                let row = json!({
                    "comment_id": id,
                    "user_id": viewer.user.id,
                    "value": value,
                });
                self.source
                    .upsert(VOTES_TABLE, row, "comment_id,user_id", Some(&viewer.token))
                    .await?;
            }
        }

        Ok(VoteOutcome {
            comment_id: id,
            slug: meta.slug,
            vote: action.resulting_vote(),
            tally: before.apply(current, action),
        })
    }

    pub async fn moderate(
        &self,
        viewer: &Viewer,
        id: CommentId,
        patch: &ModerationPatch,
    ) -> Result<CommentMeta, CommentError> {
        if patch.is_empty() {
            return Err(CommentError::EmptyPatch);
        }
        if !self.my_role(viewer).await?.can_moderate() {
            return Err(CommentError::NotModerator);
        }

        let meta = self
            .comment_meta(id, Some(&viewer.token))
            .await?
            .ok_or(CommentError::NotFound)?;

        let changes = serde_json::to_value(patch).map_err(BackendError::from)?;
        self.source
            .update(
                COMMENTS_TABLE,
                &Filter::new().eq("id", id),
                changes,
                Some(&viewer.token),
            )
            .await?;

        tracing::info!(comment_id = id, moderator = %viewer.user.id, ?patch, "Comment moderated");
        Ok(meta)
    }

    pub async fn delete_comment(
        &self,
        viewer: &Viewer,
        id: CommentId,
    ) -> Result<CommentMeta, CommentError> {
        let meta = self
            .comment_meta(id, Some(&viewer.token))
            .await?
            .ok_or(CommentError::NotFound)?;

        if meta.author_id != Some(viewer.user.id) && !self.my_role(viewer).await?.can_moderate() {
            return Err(CommentError::NotOwner);
        }

        self.source
            .delete(
                COMMENTS_TABLE,
                &Filter::new().eq("id", id),
                Some(&viewer.token),
            )
            .await?;

        tracing::info!(comment_id = id, user = %viewer.user.id, "Comment deleted");
        Ok(meta)
    }
}

fn decode<T: serde::de::DeserializeOwned>(row: Value) -> Result<T, CommentError> {
    serde_json::from_value(row).map_err(|e| CommentError::Backend(e.into()))
}
