//! Upload validation, classification, and admission.
//!
//! An upload is classified by its declared content type: `image/*` admits
//! immediately, `video/*` admits only after the asynchronous duration probe
//! resolves, with the probed duration clamped to the configured cap. Nothing
//! is admitted on any failure.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::admin_gate::AdminCapability;
use crate::clock::Clock;
use crate::story_store::{Story, StoryStore};

/// Errors surfaced by [`MediaIngest::ingest`].
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Upload requires a granted admin capability")]
    Unauthorized,

    #[error("No file content was provided")]
    NoFileSelected,

    #[error("Unsupported media type: {content_type}")]
    UnsupportedType { content_type: String },

    #[error("Duration probe failed: {0}")]
    Probe(#[from] ProbeError),
}

/// Errors from the duration probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Probe process failed: {0}")]
    Process(String),

    #[error("Probe output was not a duration: {0}")]
    Malformed(String),

    #[error("Probe timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Media classification derived from the declared content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

/// A raw uploaded asset before validation.
#[derive(Debug, Clone)]
pub struct RawUpload {
    /// Declared content type, e.g. `image/png` or `video/mp4`.
    pub content_type: String,
    /// File bytes.
    pub data: Bytes,
}

/// Refcounted owner of an uploaded asset's bytes.
///
/// The bytes live exactly as long as the story: the sweep that evicts a
/// story releases its blob, after which [`MediaBlob::bytes`] returns `None`.
#[derive(Debug)]
pub struct MediaBlob {
    id: Uuid,
    bytes: Mutex<Option<Bytes>>,
}

impl MediaBlob {
    fn new(data: Bytes) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            bytes: Mutex::new(Some(data)),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current bytes, if not yet released.
    pub fn bytes(&self) -> Option<Bytes> {
        self.bytes.lock().clone()
    }

    /// Size in bytes, zero once released.
    pub fn len(&self) -> usize {
        self.bytes.lock().as_ref().map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_released(&self) -> bool {
        self.bytes.lock().is_none()
    }

    /// Drop the backing bytes. Idempotent.
    pub fn release(&self) {
        let mut slot = self.bytes.lock();
        if slot.take().is_some() {
            debug!(blob_id = %self.id, "Media blob released");
        }
    }
}

/// A validated media reference carried by a story.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    blob: Arc<MediaBlob>,
    kind: MediaKind,
    content_type: String,
}

impl MediaAsset {
    pub fn new(kind: MediaKind, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            blob: MediaBlob::new(data),
            kind,
            content_type: content_type.into(),
        }
    }

    pub fn blob(&self) -> &MediaBlob {
        &self.blob
    }

    /// Owned handle to the blob, sharing the same backing bytes.
    pub fn blob_handle(&self) -> Arc<MediaBlob> {
        Arc::clone(&self.blob)
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

/// Classify an upload by its declared content type prefix.
fn classify(content_type: &str) -> Option<MediaKind> {
    if content_type.starts_with("image/") {
        Some(MediaKind::Image)
    } else if content_type.starts_with("video/") {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Probes the true duration of a motion asset.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Duration of the asset in seconds.
    async fn probe_duration(&self, content_type: &str, data: &Bytes) -> Result<f64, ProbeError>;
}

/// Duration probe backed by the `ffprobe` binary.
///
/// The asset is staged to a temp file because most containers need a
/// seekable input for metadata extraction.
pub struct FfprobeDurationProbe {
    timeout: std::time::Duration,
}

impl FfprobeDurationProbe {
    pub fn new(timeout: std::time::Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl MediaProbe for FfprobeDurationProbe {
    async fn probe_duration(&self, _content_type: &str, data: &Bytes) -> Result<f64, ProbeError> {
        let path = std::env::temp_dir().join(format!("glimpse-probe-{}", Uuid::new_v4()));
        tokio::fs::write(&path, data.as_ref())
            .await
            .map_err(|e| ProbeError::Process(e.to_string()))?;

        let result = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new("ffprobe")
                .args([
                    "-v",
                    "error",
                    "-show_entries",
                    "format=duration",
                    "-of",
                    "default=noprint_wrappers=1:nokey=1",
                ])
                .arg(&path)
                .output(),
        )
        .await;

        let _ = tokio::fs::remove_file(&path).await;

        let output = match result {
            Err(_) => return Err(ProbeError::Timeout(self.timeout)),
            Ok(output) => output.map_err(|e| ProbeError::Process(e.to_string()))?,
        };

        if !output.status.success() {
            return Err(ProbeError::Process(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = stdout.trim();
        text.parse::<f64>()
            .map_err(|_| ProbeError::Malformed(text.to_string()))
    }
}

/// Validates uploads and admits them as stories.
pub struct MediaIngest {
    store: Arc<StoryStore>,
    probe: Arc<dyn MediaProbe>,
    clock: Arc<dyn Clock>,
    max_video_secs: f64,
}

impl MediaIngest {
    pub fn new(
        store: Arc<StoryStore>,
        probe: Arc<dyn MediaProbe>,
        clock: Arc<dyn Clock>,
        max_video_secs: f64,
    ) -> Self {
        Self {
            store,
            probe,
            clock,
            max_video_secs,
        }
    }

    /// Validate and admit an upload.
    ///
    /// Requires an admin capability. Images admit immediately; videos admit
    /// only after the duration probe resolves, with the probed value clamped
    /// to the cap. A story is either fully constructed and admitted, or not
    /// admitted at all.
    pub async fn ingest(
        &self,
        capability: Option<&AdminCapability>,
        upload: RawUpload,
    ) -> Result<Story, IngestError> {
        let capability = capability.ok_or(IngestError::Unauthorized)?;

        if upload.data.is_empty() {
            return Err(IngestError::NoFileSelected);
        }

        let kind = classify(&upload.content_type).ok_or_else(|| IngestError::UnsupportedType {
            content_type: upload.content_type.clone(),
        })?;

        let duration_secs = match kind {
            MediaKind::Image => None,
            MediaKind::Video => {
                // Suspension point: no store state is held across the probe;
                // admission below is a single atomic step on resume.
                let probed = self
                    .probe
                    .probe_duration(&upload.content_type, &upload.data)
                    .await?;
                Some(probed.min(self.max_video_secs))
            }
        };

        let size_bytes = upload.data.len();
        let asset = MediaAsset::new(kind, upload.content_type, upload.data);
        let story = self.store.admit(asset, duration_secs, self.clock.now());

        info!(
            story_id = %story.id,
            kind = ?kind,
            duration_secs = duration_secs,
            granted_to = %capability.user_id(),
            size_bytes = size_bytes,
            "Story admitted from upload"
        );
        metrics::counter!("ingest.accepted").increment(1);

        Ok(story)
    }
}
