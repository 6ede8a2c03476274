//! Video collaborators: the playable clip and the playback clock
//!
//! Decoding is a black box; all this module needs from a video is its frame
//! count and a nominal frame duration.

mod clip;
mod player;

pub use clip::{VideoClip, DEFAULT_STEP_COUNT, MAX_FRAME_COUNT};
pub use player::{VideoPlayer, TimeSource};

/// The subset of a video clip that the data model is allowed to touch.
///
/// Frame numbers are video frame numbers; steps are the clip's own
/// `0..step_count` sequence.
pub trait VideoClipHandle {
    /// First frame number included in the clip
    fn start_frame_number(&self) -> usize;

    /// Last frame number included in the clip
    fn end_frame_number(&self) -> usize;

    /// Last frame number the clip could reach, padding included
    fn last_frame_number(&self) -> usize;

    /// Frames of padding past the final real video frame
    fn extra_frames(&self) -> usize;

    /// Set the padding past the final real video frame
    fn set_extra_frames(&mut self, extras: usize);

    /// Move the clip end to `end`, adding padding if the video is too short.
    /// Returns true if the end frame changed.
    fn extend_end_frame_number(&mut self, end: usize) -> bool;

    /// Number of frames available, padding included
    fn frame_count(&self) -> usize;

    /// Frames per step
    fn step_size(&self) -> usize;
}
