//! Authoritative in-memory collection of live stories.
//!
//! The store owns the canonical `Story` records. Other components never hold
//! copies that could diverge: views and reactions go through [`StoryStore::mutate`],
//! which applies the change under the store lock as one atomic step, and the
//! sweeper is the sole remover via [`StoryStore::sweep_expired`].

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::media_ingest::MediaAsset;

/// Unique story identifier, monotonically derived from admission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryId(u64);

impl StoryId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for StoryId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for StoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ephemeral media post with a bounded visibility window.
#[derive(Debug, Clone)]
pub struct Story {
    /// Identifier assigned at admission; immutable.
    pub id: StoryId,
    /// The media asset this story displays.
    pub media: MediaAsset,
    /// Admission instant; immutable.
    pub created_at: DateTime<Utc>,
    /// Playback cap in seconds; present only for video, never above the cap.
    pub duration_secs: Option<f64>,
    /// Distinct-viewer view count.
    pub view_count: u64,
    /// Uncapped like count.
    pub like_count: u64,
    /// Comment texts in insertion order; append-only.
    pub comments: Vec<String>,
}

const SEQ_BITS: u32 = 12;
const SEQ_MAX: u16 = (1 << SEQ_BITS) - 1;

/// Mints strictly increasing ids from wall-clock milliseconds plus a
/// sequence counter. Same-millisecond admissions and backward clock steps
/// still produce unique, ordered ids.
#[derive(Debug)]
struct IdMinter {
    last_ms: u64,
    seq: u16,
}

impl IdMinter {
    fn new() -> Self {
        Self { last_ms: 0, seq: 0 }
    }

    fn next(&mut self, now: DateTime<Utc>) -> StoryId {
        let ms = now.timestamp_millis().max(0) as u64;
        if ms > self.last_ms {
            self.last_ms = ms;
            self.seq = 0;
        } else if self.seq < SEQ_MAX {
            self.seq += 1;
        } else {
            // Sequence exhausted within one millisecond; borrow from the
            // next millisecond to stay monotonic.
            self.last_ms += 1;
            self.seq = 0;
        }
        StoryId((self.last_ms << SEQ_BITS) | u64::from(self.seq))
    }
}

struct StoreInner {
    stories: Vec<Story>,
    minter: IdMinter,
}

/// In-memory story collection with retention-based eviction.
pub struct StoryStore {
    inner: RwLock<StoreInner>,
    retention: Duration,
}

impl StoryStore {
    /// Create an empty store with the given retention window.
    pub fn new(retention: Duration) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                stories: Vec::new(),
                minter: IdMinter::new(),
            }),
            retention,
        }
    }

    /// The retention window stories live for.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Admit a validated story with `created_at = now` and zeroed counters.
    ///
    /// Returns a snapshot of the admitted record.
    pub fn admit(
        &self,
        media: MediaAsset,
        duration_secs: Option<f64>,
        now: DateTime<Utc>,
    ) -> Story {
        let story = {
            let mut inner = self.inner.write();
            let id = inner.minter.next(now);
            let story = Story {
                id,
                media,
                created_at: now,
                duration_secs,
                view_count: 0,
                like_count: 0,
                comments: Vec::new(),
            };
            inner.stories.push(story.clone());
            story
        };

        debug!(story_id = %story.id, "Story admitted");
        metrics::counter!("stories.admitted").increment(1);
        metrics::gauge!("stories.live").set(self.len() as f64);

        story
    }

    /// Snapshot of a story by id, if live.
    pub fn get(&self, id: StoryId) -> Option<Story> {
        self.inner.read().stories.iter().find(|s| s.id == id).cloned()
    }

    /// Snapshots of all live stories in admission order.
    pub fn all(&self) -> Vec<Story> {
        self.inner.read().stories.clone()
    }

    /// Number of live stories.
    pub fn len(&self) -> usize {
        self.inner.read().stories.len()
    }

    /// Whether the store holds no live stories.
    pub fn is_empty(&self) -> bool {
        self.inner.read().stories.is_empty()
    }

    /// Apply `f` to the story if present, as one atomic step under the
    /// store lock. Returns `None` when the id is no longer live, leaving
    /// everything untouched.
    pub fn mutate<T>(&self, id: StoryId, f: impl FnOnce(&mut Story) -> T) -> Option<T> {
        let mut inner = self.inner.write();
        inner.stories.iter_mut().find(|s| s.id == id).map(f)
    }

    /// Evict every story whose age reached the retention window, releasing
    /// each evicted story's media blob. Returns the number of evictions.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let evicted: Vec<Story> = {
            let mut inner = self.inner.write();
            let all = std::mem::take(&mut inner.stories);
            let (expired, live): (Vec<Story>, Vec<Story>) = all
                .into_iter()
                .partition(|s| now - s.created_at >= self.retention);
            inner.stories = live;
            expired
        };

        for story in &evicted {
            story.media.blob().release();
            debug!(
                story_id = %story.id,
                age_secs = (now - story.created_at).num_seconds(),
                "Story evicted"
            );
        }

        if !evicted.is_empty() {
            metrics::counter!("stories.evicted").increment(evicted.len() as u64);
            metrics::gauge!("stories.live").set(self.len() as f64);
        }

        evicted.len()
    }
}
