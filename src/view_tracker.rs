//! Per-viewer idempotent view counting.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::story_store::{StoryId, StoryStore};

/// Story ids already counted for one viewer.
///
/// Grows monotonically. Ids of evicted stories linger harmlessly: counting
/// against an absent story is a no-op anyway, so no cleanup is required.
#[derive(Debug, Default)]
pub struct ViewedSet {
    seen: HashSet<StoryId>,
}

impl ViewedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: StoryId) -> bool {
        self.seen.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn insert(&mut self, id: StoryId) {
        self.seen.insert(id);
    }
}

/// Counts each story at most once per viewer.
pub struct ViewTracker {
    store: Arc<StoryStore>,
}

impl ViewTracker {
    pub fn new(store: Arc<StoryStore>) -> Self {
        Self { store }
    }

    /// Record a view, deduplicated against `viewed`.
    ///
    /// Returns the story's view count after the call, or `None` when the
    /// story is no longer live. The set is only updated when the count
    /// actually moved, so the two cannot drift apart.
    pub fn record_view(&self, viewed: &mut ViewedSet, id: StoryId) -> Option<u64> {
        if viewed.contains(id) {
            return self.store.get(id).map(|story| story.view_count);
        }

        let count = self.store.mutate(id, |story| {
            story.view_count += 1;
            story.view_count
        })?;

        viewed.insert(id);
        debug!(story_id = %id, view_count = count, "View recorded");
        metrics::counter!("views.recorded").increment(1);

        Some(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_ingest::{MediaAsset, MediaKind};
    use bytes::Bytes;
    use chrono::Utc;

    fn store_with_story() -> (Arc<StoryStore>, StoryId) {
        let store = Arc::new(StoryStore::new(chrono::Duration::hours(24)));
        let asset = MediaAsset::new(MediaKind::Image, "image/png", Bytes::from_static(b"png"));
        let story = store.admit(asset, None, Utc::now());
        (store, story.id)
    }

    #[test]
    fn repeated_views_count_once() {
        let (store, id) = store_with_story();
        let tracker = ViewTracker::new(store.clone());
        let mut viewed = ViewedSet::new();

        assert_eq!(tracker.record_view(&mut viewed, id), Some(1));
        assert_eq!(tracker.record_view(&mut viewed, id), Some(1));
        assert_eq!(tracker.record_view(&mut viewed, id), Some(1));

        assert_eq!(store.get(id).unwrap().view_count, 1);
        assert!(viewed.contains(id));
        assert_eq!(viewed.len(), 1);
    }

    #[test]
    fn distinct_viewers_each_count() {
        let (store, id) = store_with_story();
        let tracker = ViewTracker::new(store.clone());
        let mut first = ViewedSet::new();
        let mut second = ViewedSet::new();

        assert_eq!(tracker.record_view(&mut first, id), Some(1));
        assert_eq!(tracker.record_view(&mut second, id), Some(2));

        assert_eq!(store.get(id).unwrap().view_count, 2);
    }

    #[test]
    fn view_of_absent_story_is_noop() {
        let (store, _id) = store_with_story();
        let tracker = ViewTracker::new(store);
        let mut viewed = ViewedSet::new();

        let missing = StoryId::from(u64::MAX);
        assert_eq!(tracker.record_view(&mut viewed, missing), None);
        assert!(viewed.is_empty());
    }

    #[test]
    fn stale_viewed_entry_after_eviction_is_harmless() {
        let (store, id) = store_with_story();
        let tracker = ViewTracker::new(store.clone());
        let mut viewed = ViewedSet::new();

        tracker.record_view(&mut viewed, id);
        store.sweep_expired(Utc::now() + chrono::Duration::hours(25));

        assert_eq!(tracker.record_view(&mut viewed, id), None);
        assert!(viewed.contains(id));
        assert_eq!(viewed.len(), 1);
    }
}
