use std::path::Path;
use std::sync::Arc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::EventBus;
use crate::video::VideoPlayer;

/// Errors loading or saving settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tracker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerSettings {
    /// Growth increment for step arrays
    pub step_array_increment: usize,

    /// Frame duration used when a video reports none (milliseconds)
    pub default_frame_duration_ms: f64,

    /// Initial stride for newly created data clips
    pub default_stride: usize,

    /// Steps used on each side of a central difference
    pub derivative_spill: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            step_array_increment: 5,
            default_frame_duration_ms: 1000.0 / 30.0,
            default_stride: 1,
            derivative_spill: 1,
        }
    }
}

impl TrackerSettings {
    /// Load settings from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        let mut settings: Self = serde_json::from_str(&text)?;
        settings.step_array_increment = settings.step_array_increment.max(1);
        settings.default_stride = settings.default_stride.max(1);
        settings.derivative_spill = settings.derivative_spill.max(1);
        Ok(settings)
    }

    /// Save settings as pretty-printed JSON
    pub fn save_json_file(&self, path: &Path) -> Result<(), SettingsError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

/// Shared state handed to every track at construction.
///
/// Constructed once per session and cloned cheaply; there are no
/// process-wide singletons.
#[derive(Debug, Clone, Default)]
pub struct TrackerContext {
    /// The event bus
    pub event_bus: Arc<EventBus>,

    /// The video player, absent until a video (or empty clip) is attached
    pub player: Arc<RwLock<Option<VideoPlayer>>>,

    /// Settings
    pub settings: Arc<RwLock<TrackerSettings>>,
}

impl TrackerContext {
    /// Create a context with no video attached
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            event_bus: Arc::new(EventBus::new()),
            player: Arc::new(RwLock::new(None)),
            settings: Arc::new(RwLock::new(settings)),
        }
    }

    /// Attach a video player
    pub fn attach_player(&self, player: VideoPlayer) {
        tracing::info!(
            "attaching video clip with {} frames",
            crate::video::VideoClipHandle::frame_count(player.clip())
        );
        *self.player.write() = Some(player);
    }

    /// Detach the video player
    pub fn detach_player(&self) {
        *self.player.write() = None;
    }

    /// True if a player is attached
    pub fn has_player(&self) -> bool {
        self.player.read().is_some()
    }

    /// Current settings
    pub fn settings(&self) -> TrackerSettings {
        self.settings.read().clone()
    }
}
