//! Likes, comments, and the moderator relay.
//!
//! Reactions only touch stories still live in the store; once a story is
//! evicted every reaction against it is a silent no-op. Accepted comments
//! are forwarded to the moderator channel best-effort: relay failure is
//! logged and swallowed, never surfaced to the commenter, never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::story_store::{StoryId, StoryStore};

/// Errors surfaced by [`ReactionLog::comment`].
#[derive(Debug, Error)]
pub enum CommentError {
    #[error("Comment text is empty")]
    EmptyComment,
}

/// Errors from the moderator relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Relay request failed: {0}")]
    Transport(String),
}

/// External channel that forwards comments to a human moderator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModeratorRelay: Send + Sync {
    async fn forward_comment(&self, story_id: StoryId, text: &str) -> Result<(), RelayError>;
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    story_id: StoryId,
    text: &'a str,
}

/// Relay client posting comments to the configured moderator endpoint.
///
/// The response body is neither awaited for content nor validated.
pub struct HttpModeratorRelay {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpModeratorRelay {
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl ModeratorRelay for HttpModeratorRelay {
    async fn forward_comment(&self, story_id: StoryId, text: &str) -> Result<(), RelayError> {
        self.client
            .post(&self.endpoint)
            .json(&RelayPayload { story_id, text })
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        Ok(())
    }
}

/// Reactions against live stories.
pub struct ReactionLog {
    store: Arc<StoryStore>,
    relay: Arc<dyn ModeratorRelay>,
}

impl ReactionLog {
    pub fn new(store: Arc<StoryStore>, relay: Arc<dyn ModeratorRelay>) -> Self {
        Self { store, relay }
    }

    /// Increment the like counter. Every call counts; repeated likes from
    /// the same viewer are intentionally uncapped.
    ///
    /// Returns the new count, or `None` when the story is no longer live.
    pub fn like(&self, id: StoryId) -> Option<u64> {
        let count = self.store.mutate(id, |story| {
            story.like_count += 1;
            story.like_count
        })?;

        debug!(story_id = %id, like_count = count, "Like recorded");
        metrics::counter!("reactions.likes").increment(1);

        Some(count)
    }

    /// Append a comment and forward it to the moderator relay.
    ///
    /// Whitespace-only text is rejected. Returns the comment count after the
    /// append, or `Ok(None)` when the story is no longer live — nothing is
    /// appended or relayed then. The relay call runs detached; its outcome
    /// never reaches the commenter.
    pub fn comment(&self, id: StoryId, text: &str) -> Result<Option<usize>, CommentError> {
        if text.trim().is_empty() {
            return Err(CommentError::EmptyComment);
        }

        let count = match self.store.mutate(id, |story| {
            story.comments.push(text.to_string());
            story.comments.len()
        }) {
            Some(count) => count,
            None => return Ok(None),
        };

        debug!(story_id = %id, comment_count = count, "Comment appended");
        metrics::counter!("reactions.comments").increment(1);

        let relay = Arc::clone(&self.relay);
        let text = text.to_string();
        tokio::spawn(async move {
            if let Err(e) = relay.forward_comment(id, &text).await {
                warn!(story_id = %id, error = %e, "Moderator relay failed; comment kept");
            }
        });

        Ok(Some(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_ingest::{MediaAsset, MediaKind};
    use bytes::Bytes;
    use chrono::Utc;
    use parking_lot::Mutex;

    /// Relay double that records every delivery.
    #[derive(Default)]
    struct RecordingRelay {
        delivered: Mutex<Vec<(StoryId, String)>>,
        fail: bool,
    }

    impl RecordingRelay {
        fn failing() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl ModeratorRelay for RecordingRelay {
        async fn forward_comment(&self, story_id: StoryId, text: &str) -> Result<(), RelayError> {
            self.delivered.lock().push((story_id, text.to_string()));
            if self.fail {
                Err(RelayError::Transport("relay down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn fixture(relay: Arc<RecordingRelay>) -> (Arc<StoryStore>, ReactionLog, StoryId) {
        let store = Arc::new(StoryStore::new(chrono::Duration::hours(24)));
        let asset = MediaAsset::new(MediaKind::Image, "image/png", Bytes::from_static(b"png"));
        let story = store.admit(asset, None, Utc::now());
        let log = ReactionLog::new(store.clone(), relay);
        (store, log, story.id)
    }

    async fn drain_spawned_tasks() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn like_increments_every_call() {
        let (store, log, id) = fixture(Arc::new(RecordingRelay::default()));

        assert_eq!(log.like(id), Some(1));
        assert_eq!(log.like(id), Some(2));
        assert_eq!(log.like(id), Some(3));
        assert_eq!(store.get(id).unwrap().like_count, 3);
    }

    #[test]
    fn like_on_absent_story_is_noop() {
        let (_store, log, _id) = fixture(Arc::new(RecordingRelay::default()));
        assert_eq!(log.like(StoryId::from(u64::MAX)), None);
    }

    #[tokio::test]
    async fn empty_comment_is_rejected_without_mutation() {
        let (store, log, id) = fixture(Arc::new(RecordingRelay::default()));

        assert!(matches!(log.comment(id, ""), Err(CommentError::EmptyComment)));
        assert!(matches!(
            log.comment(id, "   \n\t"),
            Err(CommentError::EmptyComment)
        ));
        assert!(store.get(id).unwrap().comments.is_empty());
    }

    #[tokio::test]
    async fn comments_append_in_order() {
        let relay = Arc::new(RecordingRelay::default());
        let (store, log, id) = fixture(relay.clone());

        assert_eq!(log.comment(id, "first").unwrap(), Some(1));
        assert_eq!(log.comment(id, "second").unwrap(), Some(2));
        assert_eq!(log.comment(id, "third").unwrap(), Some(3));

        let comments = store.get(id).unwrap().comments;
        assert_eq!(comments, vec!["first", "second", "third"]);

        drain_spawned_tasks().await;
        let delivered = relay.delivered.lock();
        assert_eq!(delivered.len(), 3);
        assert_eq!(delivered[0], (id, "first".to_string()));
    }

    #[tokio::test]
    async fn relay_failure_is_swallowed() {
        let relay = Arc::new(RecordingRelay::failing());
        let (store, log, id) = fixture(relay.clone());

        // The append succeeds for the commenter even though the relay fails.
        assert_eq!(log.comment(id, "kept").unwrap(), Some(1));
        assert_eq!(store.get(id).unwrap().comments, vec!["kept"]);

        drain_spawned_tasks().await;
        assert_eq!(relay.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn comment_on_evicted_story_is_noop_and_not_relayed() {
        let relay = Arc::new(RecordingRelay::default());
        let (store, log, id) = fixture(relay.clone());

        store.sweep_expired(Utc::now() + chrono::Duration::hours(25));

        assert_eq!(log.comment(id, "too late").unwrap(), None);
        drain_spawned_tasks().await;
        assert!(relay.delivered.lock().is_empty());
    }
}
