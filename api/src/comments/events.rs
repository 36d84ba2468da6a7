use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::App;

use super::CommentId;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Voted,
    Moderated,
    Deleted,
}

/// Tells listeners that a thread changed. It carries no comment data:
/// receivers reload the whole thread.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CommentEvent {
    pub slug: Option<String>,
    pub comment_id: Option<CommentId>,
    pub kind: EventKind,
}

impl CommentEvent {
    /// Listeners without a thread filter hear everything.
    pub fn concerns(&self, slug: Option<&str>) -> bool {
        match slug {
            Some(slug) => self.slug.as_deref() == Some(slug),
            None => true,
        }
    }
}

#[derive(Clone)]
pub struct CommentEvents {
    sender: broadcast::Sender<CommentEvent>,
}

impl CommentEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: CommentEvent) {
        // No subscribers is not an error
        let listeners = self.sender.send(event).unwrap_or(0);
        tracing::trace!(listeners, "Published comment event");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommentEvent> {
        self.sender.subscribe()
    }
}

impl Default for CommentEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
pub struct EventQueries {
    slug: Option<String>,
}

/// Filters a subscription down to one thread. Lagging receivers skip the
/// missed events; the next one still triggers a full reload.
pub fn thread_events(
    receiver: broadcast::Receiver<CommentEvent>,
    slug: Option<String>,
) -> impl Stream<Item = CommentEvent> {
    BroadcastStream::new(receiver)
        .filter_map(|event| async move { event.ok() })
        .filter(move |event| std::future::ready(event.concerns(slug.as_deref())))
}

pub async fn comment_events(
    State(ctx): State<App>,
    Query(q): Query<EventQueries>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = thread_events(ctx.events.subscribe(), q.slug).map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().event("comments").data(json))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod test {
    use super::*;

    fn event(slug: Option<&str>, kind: EventKind) -> CommentEvent {
        CommentEvent {
            slug: slug.map(Into::into),
            comment_id: Some(1),
            kind,
        }
    }

    #[test]
    fn unfiltered_listener_hears_everything() {
        assert!(event(Some("a"), EventKind::Created).concerns(None));
        assert!(event(None, EventKind::Created).concerns(None));
    }

    #[test]
    fn filtered_listener_hears_its_thread() {
        assert!(event(Some("a"), EventKind::Voted).concerns(Some("a")));
        assert!(!event(Some("b"), EventKind::Voted).concerns(Some("a")));
        assert!(!event(None, EventKind::Voted).concerns(Some("a")));
    }

    #[test]
    fn publish_without_listeners() {
        CommentEvents::new().publish(event(Some("a"), EventKind::Deleted));
    }

    #[tokio::test]
    async fn stream_only_yields_matching_thread() {
        let events = CommentEvents::new();
        let mut stream = Box::pin(thread_events(events.subscribe(), Some("a".into())));

        events.publish(event(Some("b"), EventKind::Created));
        events.publish(event(Some("a"), EventKind::Moderated));

        let received = stream.next().await.unwrap();
        assert_eq!(received, event(Some("a"), EventKind::Moderated));
    }

    #[test]
    fn kind_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&EventKind::Moderated).unwrap(),
            r#""moderated""#
        );
    }
}
