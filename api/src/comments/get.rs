use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{App, error::AppError, identity::MaybeAuthUser};

use super::{CommentNode, tree::forest_json};

#[derive(Deserialize)]
pub struct Queries {
    slug: Option<String>,
}

/// A thread rendered as JSON without recursing into its replies.
pub struct CommentForest(pub Vec<CommentNode>);

impl IntoResponse for CommentForest {
    fn into_response(self) -> Response {
        match forest_json(&self.0) {
            Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
            Err(e) => AppError::Unhandled(format!("Could not serialize comments: {e}")).into_response(),
        }
    }
}

/// The whole thread, rebuilt from the backend on every request.
pub async fn get_comments(
    State(ctx): State<App>,
    Query(q): Query<Queries>,
    MaybeAuthUser(viewer): MaybeAuthUser,
) -> Result<CommentForest, AppError> {
    let slug = q.slug.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let token = viewer.as_ref().ok().map(|v| v.token.as_str());

    let tree = ctx.comments.fetch_comments_tree(slug, token).await?;
    Ok(CommentForest(tree))
}
