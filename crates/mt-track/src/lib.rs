//! Frame-indexed track data model
//!
//! Tracks store per-frame steps, map video steps onto rows of external data,
//! keep the video's playable range in line with that data, and cache a
//! derived time series for plotting.

pub mod adjuster;
pub mod cache;
pub mod data_clip;
pub mod document;
pub mod step;
pub mod step_array;
pub mod track;
pub mod track_set;

use mt_core::TrackId;
use mt_data::DataError;
use thiserror::Error;

// Re-exports
pub use adjuster::{AdjustOutcome, VideoClipAdjuster};
pub use cache::{formula::FormulaError, Constant, TrackData, TrackDataCache};
pub use data_clip::DataClip;
pub use document::{TrackDocument, SessionDocument};
pub use step::{Point, Step};
pub use step_array::StepArray;
pub use track::{Track, TrackKind};
pub use track_set::TrackSet;

/// Errors that can occur in track operations
#[derive(Error, Debug)]
pub enum TrackError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Track not found: {0}")]
    NotFound(TrackId),

    #[error("Track {track} is referenced by {by}")]
    Referenced { track: TrackId, by: TrackId },

    #[error("Track {0} is not a data track")]
    NotADataTrack(TrackId),

    #[error("Document error: {0}")]
    Document(#[from] serde_json::Error),
}
