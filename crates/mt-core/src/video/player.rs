//! Playback clock for a video clip

use super::{VideoClip, VideoClipHandle};
use crate::TrackId;

/// Where the player takes its start time and frame duration from
#[derive(Debug, Clone, PartialEq)]
pub enum TimeSource {
    /// The video's own timing
    Video,
    /// A data track's time column
    Data {
        track: TrackId,
        start_time_ms: f64,
        frame_duration_ms: f64,
    },
}

/// The video clip together with its timing.
///
/// All times are milliseconds.
#[derive(Debug, Clone)]
pub struct VideoPlayer {
    clip: VideoClip,
    frame_duration_ms: f64,
    time_source: TimeSource,
}

impl VideoPlayer {
    /// Create a player for a clip with a nominal frame duration
    pub fn new(clip: VideoClip, frame_duration_ms: f64) -> Self {
        Self {
            clip,
            frame_duration_ms,
            time_source: TimeSource::Video,
        }
    }

    pub fn clip(&self) -> &VideoClip {
        &self.clip
    }

    pub fn clip_mut(&mut self) -> &mut VideoClip {
        &mut self.clip
    }

    /// Duration of one frame under the current time source
    pub fn frame_duration(&self) -> f64 {
        match &self.time_source {
            TimeSource::Video => self.frame_duration_ms,
            TimeSource::Data { frame_duration_ms, .. } => *frame_duration_ms,
        }
    }

    /// Average duration of one step
    pub fn mean_step_duration(&self) -> f64 {
        self.frame_duration() * self.clip.step_size() as f64
    }

    /// Time of the clip's start frame under the current time source
    pub fn start_time(&self) -> f64 {
        match &self.time_source {
            TimeSource::Video => self.clip.start_time_ms(),
            TimeSource::Data { start_time_ms, .. } => *start_time_ms,
        }
    }

    /// Time at a step number
    pub fn step_time(&self, step: usize) -> f64 {
        self.start_time() + step as f64 * self.mean_step_duration()
    }

    /// Time at a frame number, which may lie outside the clip
    pub fn frame_time(&self, frame: usize) -> f64 {
        let offset = frame as f64 - self.clip.start_frame_number() as f64;
        self.start_time() + offset * self.frame_duration()
    }

    pub fn time_source(&self) -> &TimeSource {
        &self.time_source
    }

    /// Replace the time source
    pub fn set_time_source(&mut self, source: TimeSource) {
        tracing::debug!("time source set to {:?}", source);
        self.time_source = source;
    }

    /// True if the given track currently drives the clock
    pub fn is_time_source(&self, track: TrackId) -> bool {
        matches!(&self.time_source, TimeSource::Data { track: t, .. } if *t == track)
    }
}
