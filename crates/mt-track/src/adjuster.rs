//! Keeps the video's playable range in line with attached data

use mt_core::VideoClipHandle;
use tracing::{debug, info};

use crate::data_clip::DataClip;

/// What an adjustment did to the video clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustOutcome {
    /// No video is attached
    NoVideo,
    Unchanged,
    /// The clip end moved out to cover the data
    Extended { from: usize, to: usize },
    /// Padding past the last real frame was reduced
    PaddingTrimmed { from: usize, to: usize },
}

/// Grows or shrinks a video clip's end to match the data shown on it.
///
/// The clip is extended only when it currently ends at its last frame, so an
/// end the user trimmed is left alone. Shrinking only ever removes padding,
/// never real video frames.
pub struct VideoClipAdjuster;

impl VideoClipAdjuster {
    /// Last frame showing data for a track whose data starts at `start_frame`
    pub fn data_end_frame(start_frame: usize, clip: &DataClip) -> usize {
        start_frame + clip.available_clip_length() - 1
    }

    /// Reconcile `video` with data starting at `start_frame`
    pub fn adjust<V>(video: Option<&mut V>, start_frame: usize, clip: &DataClip) -> AdjustOutcome
    where
        V: VideoClipHandle + ?Sized,
    {
        let Some(video) = video else {
            return AdjustOutcome::NoVideo;
        };

        let data_end = Self::data_end_frame(start_frame, clip);
        let end = video.end_frame_number();
        let extra = video.extra_frames();

        let outcome = if end == video.last_frame_number() && data_end > end {
            video.extend_end_frame_number(data_end);
            AdjustOutcome::Extended {
                from: end,
                to: video.end_frame_number(),
            }
        } else if data_end < end && extra > 0 {
            let trimmed = extra.saturating_sub(end - data_end);
            video.set_extra_frames(trimmed);
            AdjustOutcome::PaddingTrimmed {
                from: extra,
                to: trimmed,
            }
        } else {
            AdjustOutcome::Unchanged
        };

        match outcome {
            AdjustOutcome::Unchanged => debug!("video clip already covers data ending at frame {}", data_end),
            other => info!("adjusted video clip for data ending at frame {}: {:?}", data_end, other),
        }
        outcome
    }
}
