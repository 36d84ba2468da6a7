use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::App;

use super::{
    create::create_comment,
    events::comment_events,
    get::get_comments,
    moderate::{delete_comment, patch_comment},
    vote::vote_comment,
};

pub fn route() -> Router<App> {
    Router::<App>::new()
        .route("/", get(get_comments).post(create_comment))
        .route("/events", get(comment_events))
        .route("/{id}", patch(patch_comment).delete(delete_comment))
        .route("/{id}/vote", post(vote_comment))
}
