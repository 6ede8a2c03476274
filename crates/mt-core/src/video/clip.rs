//! Playable frame range of a video

use super::VideoClipHandle;

/// Step count of a clip with no video attached
pub const DEFAULT_STEP_COUNT: usize = 10;

/// Upper bound on frames for clips with no video (about 2h45m at 30fps)
pub const MAX_FRAME_COUNT: usize = 300_000;

/// The frames of a video that are played and analysed.
///
/// A clip is `step_count` steps of `step_size` frames starting at
/// `start_frame`. Padding (`extra_frames`) lets the clip run past the final
/// real video frame, which is how data longer than the video stays visible.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoClip {
    /// Real frames in the video, or `None` when no video is loaded
    video_frame_count: Option<usize>,
    start_frame: usize,
    step_size: usize,
    step_count: usize,
    extra_frames: usize,
    /// Frame count of a clip without video; grows with the end frame
    frame_count: usize,
    /// Start time in milliseconds
    start_time_ms: f64,
}

impl VideoClip {
    /// Create a clip spanning every frame of a video with `frames` frames
    pub fn new(frames: usize) -> Self {
        let frames = frames.max(1);
        let step_count = if frames > 1 { frames } else { DEFAULT_STEP_COUNT };
        Self {
            video_frame_count: Some(frames),
            start_frame: 0,
            step_size: 1,
            step_count,
            extra_frames: 0,
            frame_count: step_count,
            start_time_ms: 0.0,
        }
    }

    /// Create a clip with no video
    pub fn without_video() -> Self {
        Self {
            video_frame_count: None,
            start_frame: 0,
            step_size: 1,
            step_count: DEFAULT_STEP_COUNT,
            extra_frames: 0,
            frame_count: DEFAULT_STEP_COUNT,
            start_time_ms: 0.0,
        }
    }

    /// Real frames in the attached video
    pub fn video_frame_count(&self) -> Option<usize> {
        self.video_frame_count
    }

    fn has_multi_frame_video(&self) -> bool {
        matches!(self.video_frame_count, Some(n) if n > 1)
    }

    /// First frame number a clip may start at
    pub fn first_frame_number(&self) -> usize {
        0
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn start_time_ms(&self) -> f64 {
        self.start_time_ms
    }

    /// Set the start time; NaN restores the default of zero
    pub fn set_start_time_ms(&mut self, t0: f64) {
        self.start_time_ms = if t0.is_nan() { 0.0 } else { t0 };
    }

    /// Set the start frame, keeping the end frame where possible.
    /// Returns true if the start frame changed.
    pub fn set_start_frame_number(&mut self, start: usize) -> bool {
        let prev_start = self.start_frame;
        let prev_end = self.end_frame_number();
        let start = start.max(self.first_frame_number()).min(self.last_frame_number());
        self.start_frame = start;
        if prev_end >= start {
            self.set_end_frame(prev_end, false);
        } else {
            self.set_step_count(1);
        }
        prev_start != start
    }

    /// Set the number of frames per step. Returns true if it changed.
    pub fn set_step_size(&mut self, size: usize) -> bool {
        if size == 0 {
            return false;
        }
        let mut size = size;
        if let Some(frames) = self.video_frame_count.filter(|&n| n > 1) {
            let max_size = (frames + self.extra_frames)
                .saturating_sub(self.start_frame + 1)
                .max(1);
            size = size.min(max_size);
        }
        if size == self.step_size {
            return false;
        }
        let end = self.end_frame_number();
        self.step_size = size;
        self.step_count = 1 + (end - self.start_frame) / size;
        self.set_end_frame(end, false);
        true
    }

    /// Set the number of steps, clamped to what the video (plus padding) holds
    pub fn set_step_count(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let mut count = count;
        if let Some(frames) = self.video_frame_count.filter(|&n| n > 1) {
            let end = frames - 1 + self.extra_frames;
            let max_count = 1 + end.saturating_sub(self.start_frame) / self.step_size;
            count = count.min(max_count);
        } else {
            let max_count = MAX_FRAME_COUNT
                .saturating_sub(1 + self.start_frame)
                / self.step_size
                + 1;
            count = count.min(max_count);
        }
        self.step_count = count.max(1);
        if !self.has_multi_frame_video() {
            let frames = self.end_frame_number() + 1;
            self.frame_count = self.frame_count.max(frames).min(MAX_FRAME_COUNT);
        }
    }

    /// Set the end frame. Returns true if it changed.
    pub fn set_end_frame_number(&mut self, end: usize) -> bool {
        self.set_end_frame(end, true)
    }

    fn set_end_frame(&mut self, end: usize, only_if_changed: bool) -> bool {
        let prev = self.end_frame_number();
        if prev == end && only_if_changed {
            return false;
        }
        let end = end.max(self.start_frame);
        let span = end - self.start_frame;
        let mut count = span / self.step_size;
        let rem = span % self.step_size;
        if rem as f64 / self.step_size as f64 > 0.5 {
            count += 1;
        }
        while count > 0 && self.step_to_frame(count) > MAX_FRAME_COUNT - 1 {
            count -= 1;
        }
        self.set_step_count(count + 1);
        let end = self.end_frame_number();
        if end != self.start_frame {
            let max_step_size = (end - self.start_frame).max(1);
            if max_step_size < self.step_size {
                self.step_size = max_step_size;
            }
        }
        prev != end
    }

    pub fn step_to_frame(&self, step: usize) -> usize {
        self.start_frame + step * self.step_size
    }

    /// Step containing a frame, or `None` for frames before the start
    pub fn frame_to_step(&self, frame: usize) -> Option<usize> {
        frame
            .checked_sub(self.start_frame)
            .map(|offset| offset / self.step_size)
    }

    /// True if the frame is one of the clip's step frames
    pub fn includes_frame(&self, frame: usize) -> bool {
        match frame.checked_sub(self.start_frame) {
            Some(offset) => offset % self.step_size == 0 && offset / self.step_size < self.step_count,
            None => false,
        }
    }
}

impl Default for VideoClip {
    fn default() -> Self {
        Self::without_video()
    }
}

impl VideoClipHandle for VideoClip {
    fn start_frame_number(&self) -> usize {
        self.start_frame
    }

    fn end_frame_number(&self) -> usize {
        self.start_frame + self.step_size * (self.step_count - 1)
    }

    fn last_frame_number(&self) -> usize {
        match self.video_frame_count {
            Some(frames) if frames > 1 => frames - 1 + self.extra_frames,
            _ => self.end_frame_number(),
        }
    }

    fn extra_frames(&self) -> usize {
        self.extra_frames
    }

    fn set_extra_frames(&mut self, extras: usize) {
        if extras != self.extra_frames {
            tracing::trace!("set extra frames to {}", extras);
            self.extra_frames = extras;
            self.set_step_count(self.step_count);
        }
    }

    fn extend_end_frame_number(&mut self, end: usize) -> bool {
        if self.video_frame_count.is_some() && self.frame_count() <= end {
            let extras = end + 1 - self.frame_count() + self.extra_frames;
            self.set_extra_frames(extras);
        }
        self.set_end_frame_number(end)
    }

    fn frame_count(&self) -> usize {
        match self.video_frame_count {
            Some(frames) if frames > 1 => (frames + self.extra_frames).max(1),
            _ => self
                .frame_count
                .max(self.end_frame_number() + 1)
                .min(MAX_FRAME_COUNT),
        }
    }

    fn step_size(&self) -> usize {
        self.step_size
    }
}
