//! Glimpse Stories Service
//!
//! In-memory lifecycle manager for ephemeral group media posts ("stories"):
//! admin-gated upload, validation and duration trimming, per-viewer view
//! dedup, reactions with moderated comment relay, and automatic eviction
//! after a 24-hour retention window. The whole process is ephemeral; nothing
//! survives a restart.
//!
//! ## Architecture
//!
//! ```text
//!  Auth Provider              StoryStore                Moderator Relay
//! ┌──────────────┐          ┌──────────────┐          ┌──────────────┐
//! │ getChatMember│◀─────────│  admit/get/  │          │ POST comment │
//! └──────────────┘          │  all/mutate  │─────────▶└──────────────┘
//!        ▲                  └──────────────┘                 ▲
//!        │                     ▲   ▲    ▲                   │
//! ┌──────────────┐             │   │    │            ┌──────────────┐
//! │ AdminGate    │             │   │    └────────────│ ReactionLog  │
//! └──────────────┘             │   │                 └──────────────┘
//!        │ capability          │   │                        ▲
//!        ▼                     │   │                        │
//! ┌──────────────┐             │  ┌──────────────┐   ┌──────────────┐
//! │ MediaIngest  │─────────────┘  │ ExpirySweeper│   │ ViewTracker  │
//! └──────────────┘                └──────────────┘   └──────────────┘
//! ```
//!
//! The store is the single owner of story state; every mutation goes through
//! its lock as one atomic step, and the sweeper is the sole remover.

pub mod admin_gate;
pub mod api;
pub mod clock;
pub mod config;
pub mod expiry_sweeper;
pub mod media_ingest;
pub mod reaction_log;
pub mod story_store;
pub mod view_tracker;

pub use admin_gate::{
    AdminCapability, AdminGate, AdminSession, AuthProvider, AuthProviderError, GateDenied,
    HttpAuthProvider,
};
pub use api::{create_router, start_api_server, AppState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use expiry_sweeper::ExpirySweeper;
pub use media_ingest::{
    FfprobeDurationProbe, IngestError, MediaAsset, MediaBlob, MediaIngest, MediaKind, MediaProbe,
    ProbeError, RawUpload,
};
pub use reaction_log::{
    CommentError, HttpModeratorRelay, ModeratorRelay, ReactionLog, RelayError,
};
pub use story_store::{Story, StoryId, StoryStore};
pub use view_tracker::{ViewTracker, ViewedSet};
