//! Core functionality for the motion tracking data model
//!
//! This crate provides the shared collaborators every track talks to: the
//! event bus, the video clip and playback clock, the context object that
//! replaces process-wide singletons, and the cancellation flag used by
//! background imports.

pub mod events;
pub mod state;
pub mod sync;
pub mod video;

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use events::{EventBus, Event, EventHandler, handler_from_fn};
pub use state::{TrackerContext, TrackerSettings, SettingsError};
pub use sync::CancelFlag;
pub use video::{VideoClip, VideoClipHandle, VideoPlayer, TimeSource};

/// Unique identifier for a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub uuid::Uuid);

impl TrackId {
    /// Create a new random track ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
