//! Reading comment rows and vote tallies from the backend.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    backend::{BackendError, Query, TableSource},
    identity::Role,
};

use super::{Author, CommentId, CommentRecord, VoteTally};

pub const COMMENTS_TABLE: &str = "comments";
pub const STATS_TABLE: &str = "comment_stats";

const COMMENT_COLUMNS: &str =
    "id,content,created_at,parent_id,pinned,allow_replies,allow_dislikes,slug,author_id";

/// Ways of embedding the author's profile, richest first. The name of the
/// foreign key differs between deployments, and the last entry never joins.
pub const AUTHOR_JOINS: &[Option<&str>] = &[
    Some("author:author_id(id,username,role)"),
    Some("author:profiles!comments_author_id_fkey(id,username,role)"),
    Some("author:profiles(id,username,role)"),
    None,
];

#[derive(Deserialize)]
struct CommentRow {
    id: CommentId,
    #[serde(default)]
    content: String,
    created_at: String,
    parent_id: Option<CommentId>,
    pinned: Option<bool>,
    allow_replies: Option<bool>,
    allow_dislikes: Option<bool>,
    slug: Option<String>,
    author_id: Option<Uuid>,
    #[serde(default)]
    author: Option<AuthorRow>,
}

#[derive(Deserialize)]
struct AuthorRow {
    id: Option<Uuid>,
    username: Option<String>,
    #[serde(default)]
    role: Role,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        let author = match row.author {
            Some(a) => Author {
                id: a.id.or(row.author_id),
                username: a.username,
                role: a.role,
            },
            None => Author {
                id: row.author_id,
                ..Author::default()
            },
        };

        CommentRecord {
            id: row.id,
            content: row.content,
            created_at: row.created_at,
            parent_id: row.parent_id,
            author,
            pinned: row.pinned.unwrap_or(false),
            allow_replies: row.allow_replies.unwrap_or(true),
            allow_dislikes: row.allow_dislikes.unwrap_or(true),
            slug: row.slug,
        }
    }
}

pub fn select_columns(join: Option<&str>) -> String {
    match join {
        Some(join) => format!("{COMMENT_COLUMNS},{join}"),
        None => COMMENT_COLUMNS.to_string(),
    }
}

pub(crate) fn decode_rows(rows: Vec<Value>) -> Result<Vec<CommentRecord>, BackendError> {
    rows.into_iter()
        .map(|row| Ok(serde_json::from_value::<CommentRow>(row)?.into()))
        .collect()
}

/// Loads the comments of a thread (or of every thread) oldest first,
/// trying each of [`AUTHOR_JOINS`] until one is accepted.
///
/// Only rejections fall through to the next strategy; transport failures
/// would fail the plain read just the same.
pub async fn fetch_records(
    source: &dyn TableSource,
    slug: Option<&str>,
    token: Option<&str>,
) -> Result<Vec<CommentRecord>, BackendError> {
    let mut last_error = None;

    for join in AUTHOR_JOINS {
        let mut query = Query::select(&select_columns(*join)).order("created_at", true);
        if let Some(slug) = slug {
            query = query.eq("slug", slug);
        }

        match source.select(COMMENTS_TABLE, &query, token).await {
            Ok(rows) => {
                tracing::debug!(join = ?join, rows = rows.len(), "Loaded comments");
                return decode_rows(rows);
            }
            Err(e @ BackendError::Api { .. }) => {
                tracing::debug!(join = ?join, error = %e, "Author join rejected, trying next");
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| BackendError::Api {
        status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        code: None,
        message: "No comment query strategy configured".into(),
    }))
}

/// Ids per tally request, keeps the `in.(..)` filter well under URL limits.
pub const TALLY_BATCH: usize = 200;

/// Loads like/dislike counts for the given comments, [`TALLY_BATCH`] ids per
/// request. An empty id list skips the round trip.
pub async fn fetch_tallies(
    source: &dyn TableSource,
    ids: &[CommentId],
    token: Option<&str>,
) -> Result<HashMap<CommentId, VoteTally>, BackendError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    #[derive(Deserialize)]
    struct StatRow {
        comment_id: CommentId,
        #[serde(default)]
        likes: Option<i64>,
        #[serde(default)]
        dislikes: Option<i64>,
    }

    let mut tallies = HashMap::with_capacity(ids.len());
    for batch in ids.chunks(TALLY_BATCH) {
        let query = Query::select("comment_id,likes,dislikes").in_list("comment_id", batch);
        let rows = source.select(STATS_TABLE, &query, token).await?;

        for row in rows {
            let stat: StatRow = serde_json::from_value(row)?;
            tallies.insert(
                stat.comment_id,
                VoteTally {
                    likes: stat.likes.unwrap_or(0),
                    dislikes: stat.dislikes.unwrap_or(0),
                },
            );
        }
    }
    Ok(tallies)
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::backend::memory::{Call, MemorySource};

    const AUTHOR: &str = "0b7f5c2a-1d3e-4f6a-8b9c-0d1e2f3a4b5c";

    fn selects(source: &MemorySource) -> Vec<String> {
        source
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Select { columns, .. } => Some(columns),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn first_join_wins() {
        let source = MemorySource::new().with_rows(
            COMMENTS_TABLE,
            vec![json!({
                "id": 1, "content": "hi", "created_at": "t1", "parent_id": null,
                "pinned": null, "allow_replies": null, "allow_dislikes": false,
                "slug": "intro", "author_id": AUTHOR,
                "author": { "id": AUTHOR, "username": "ann", "role": "admin" }
            })],
        );

        let records = fetch_records(&source, Some("intro"), None).await.unwrap();

        assert_eq!(selects(&source).len(), 1);
        let r = &records[0];
        assert_eq!(r.author.username.as_deref(), Some("ann"));
        assert_eq!(r.author.role, Role::Admin);
        assert!(!r.pinned);
        assert!(r.allow_replies);
        assert!(!r.allow_dislikes);
    }

    #[tokio::test]
    async fn falls_back_through_join_names() {
        let source = MemorySource::new()
            .breaking_select_containing("author:author_id")
            .breaking_select_containing("comments_author_id_fkey")
            .with_rows(
                COMMENTS_TABLE,
                vec![json!({
                    "id": 1, "content": "hi", "created_at": "t1", "parent_id": null,
                    "author_id": AUTHOR,
                    "author": { "id": AUTHOR, "username": "bob", "role": null }
                })],
            );

        let records = fetch_records(&source, None, None).await.unwrap();

        let tried = selects(&source);
        assert_eq!(tried.len(), 3);
        assert!(tried[2].ends_with("author:profiles(id,username,role)"));
        assert_eq!(records[0].author.username.as_deref(), Some("bob"));
        assert_eq!(records[0].author.role, Role::User);
    }

    #[tokio::test]
    async fn last_resort_never_joins() {
        let source = MemorySource::new()
            .breaking_select_containing("author:")
            .with_rows(
                COMMENTS_TABLE,
                vec![json!({
                    "id": 1, "content": "hi", "created_at": "t1", "parent_id": null,
                    "author_id": AUTHOR
                })],
            );

        let records = fetch_records(&source, None, None).await.unwrap();

        let tried = selects(&source);
        assert_eq!(tried.len(), AUTHOR_JOINS.len());
        assert_eq!(tried.last().unwrap(), COMMENT_COLUMNS);
        assert_eq!(records[0].author.id.map(|id| id.to_string()).as_deref(), Some(AUTHOR));
        assert_eq!(records[0].author.username, None);
    }

    #[tokio::test]
    async fn unavailable_table_fails_after_every_strategy() {
        let source = MemorySource::new().failing(COMMENTS_TABLE);
        let result = fetch_records(&source, None, None).await;
        assert!(result.is_err());
        assert_eq!(selects(&source).len(), AUTHOR_JOINS.len());
    }

    #[tokio::test]
    async fn filters_by_slug() {
        let source = MemorySource::new().with_rows(
            COMMENTS_TABLE,
            vec![
                json!({ "id": 1, "created_at": "t1", "parent_id": null, "slug": "a", "author_id": null }),
                json!({ "id": 2, "created_at": "t2", "parent_id": null, "slug": "b", "author_id": null }),
            ],
        );

        let records = fetch_records(&source, Some("b"), None).await.unwrap();
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn tallies_for_requested_ids() {
        let source = MemorySource::new().with_rows(
            STATS_TABLE,
            vec![
                json!({ "comment_id": 1, "likes": 2, "dislikes": 1 }),
                json!({ "comment_id": 2, "likes": null, "dislikes": 4 }),
                json!({ "comment_id": 3, "likes": 9, "dislikes": 9 }),
            ],
        );

        let tallies = fetch_tallies(&source, &[1, 2], None).await.unwrap();
        assert_eq!(tallies.len(), 2);
        assert_eq!(tallies[&1], VoteTally { likes: 2, dislikes: 1 });
        assert_eq!(tallies[&2], VoteTally { likes: 0, dislikes: 4 });
    }

    #[tokio::test]
    async fn large_threads_load_tallies_in_batches() {
        let ids: Vec<CommentId> = (1..=5_000).collect();
        let source = MemorySource::new().with_rows(
            STATS_TABLE,
            ids.iter()
                .map(|&id| json!({ "comment_id": id, "likes": id % 7, "dislikes": 1 }))
                .collect(),
        );

        let tallies = fetch_tallies(&source, &ids, None).await.unwrap();

        assert_eq!(tallies.len(), 5_000);
        assert_eq!(tallies[&4_999], VoteTally { likes: 1, dislikes: 1 });

        let batches: Vec<usize> = source
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Select { filter, .. } => Some(filter),
                _ => None,
            })
            .map(|filter| {
                let (_, condition) = &filter.pairs()[0];
                condition.split(',').count()
            })
            .collect();
        assert_eq!(batches.len(), 5_000 / TALLY_BATCH);
        assert!(batches.iter().all(|&n| n == TALLY_BATCH));
    }

    #[tokio::test]
    async fn no_ids_no_query() {
        let source = MemorySource::new();
        let tallies = fetch_tallies(&source, &[], None).await.unwrap();
        assert!(tallies.is_empty());
        assert!(source.calls().is_empty());
    }
}
