//! Data track operations
//!
//! A data track shows rows of an external series on video frames through a
//! [`DataClip`] shared with its followers. Every change to the clip runs the
//! same ordered reaction: refresh the initial time, reconcile the video clip,
//! then drop the cached per-frame positions so they are rebuilt on the next
//! read.

use std::sync::Arc;

use mt_core::events::events::{
    DataClipChanged, DataImported, Notice, StartFrameChanged, StepsChanged, VideoClipChanged,
};
use mt_core::{TimeSource, TrackerContext, VideoClipHandle};
use mt_data::{ColumnPairingResolver, DataTable, ExternalDataSeries};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{DataPointModel, Track, TrackKind};
use crate::adjuster::{AdjustOutcome, VideoClipAdjuster};
use crate::data_clip::DataClip;
use crate::step::Step;
use crate::TrackError;

impl Track {
    /// A data track showing the x/y(/t) columns found in `table`
    pub fn data_track(context: TrackerContext, name: impl Into<String>, table: &DataTable) -> Result<Self, TrackError> {
        let stride = context.settings().default_stride;
        let model = DataPointModel::new(
            ExternalDataSeries::placeholder(),
            Arc::new(RwLock::new(DataClip::default())),
            "",
        );
        let mut track = Self::with_kind(context, name, TrackKind::DataPoint(model));
        track.set_data(table)?;
        if stride > 1 {
            track.set_stride(stride)?;
        }
        Ok(track)
    }

    fn model(&self) -> Result<&DataPointModel, TrackError> {
        self.kind.as_data_point().ok_or(TrackError::NotADataTrack(self.id))
    }

    fn require_data_leader(&self) -> Result<&DataPointModel, TrackError> {
        match (self.is_leader(), self.kind.as_data_point()) {
            (true, Some(model)) => Ok(model),
            _ => Err(TrackError::NotADataTrack(self.id)),
        }
    }

    /// The data clip shared by this track and its followers
    pub fn data_clip(&self) -> Option<DataClip> {
        self.kind.as_data_point().map(|m| m.clip.read().clone())
    }

    /// Replace the data shown by this track and its followers.
    ///
    /// On error nothing changes. Followers are reused in order and created
    /// when missing; followers past the new point count keep their data.
    pub fn set_data(&mut self, table: &DataTable) -> Result<(), TrackError> {
        self.require_data_leader()?;
        let resolved = ColumnPairingResolver::new().resolve(table)?;
        let primary = resolved.primary_series()?;
        let followers = resolved.follower_series()?;
        let names = resolved.display_names();

        let rows = primary.len();
        let clip = {
            let model = self
                .kind
                .as_data_point_mut()
                .ok_or(TrackError::NotADataTrack(self.id))?;
            model.series = primary;
            model.point_name = names[0].clone();
            model.source_name = Some(table.name.clone());
            Arc::clone(&model.clip)
        };
        for (i, (_, series)) in followers.into_iter().enumerate() {
            let name = names[i + 1].clone();
            match self.followers.get_mut(i).and_then(|f| f.kind.as_data_point_mut()) {
                Some(model) => {
                    model.series = series;
                    model.point_name = name;
                    model.source_name = Some(table.name.clone());
                }
                None => {
                    let mut follower = self.new_follower(series, &clip, name);
                    if let Some(model) = follower.kind.as_data_point_mut() {
                        model.source_name = Some(table.name.clone());
                    }
                    self.followers.push(follower);
                }
            }
        }

        let length_changed = clip.write().set_data_length(rows);
        self.sync_with_clip();
        self.refresh_steps();
        if length_changed {
            self.publish_clip_changed();
        }
        info!(
            "set {} rows from '{}' on track '{}' ({} points)",
            rows,
            table.name,
            self.name,
            self.point_count()
        );

        let bus = &self.context.event_bus;
        bus.publish(StepsChanged { track: self.id });
        bus.publish(DataImported {
            source_name: table.name.clone(),
            row_count: rows,
            point_count: self.point_count(),
        });
        Ok(())
    }

    /// Append rows from a longer version of the current data.
    ///
    /// Existing rows and steps are kept; only rows past the current length
    /// are taken from `table`. When `table` has no new rows a notice is
    /// returned (and published) and nothing changes.
    pub fn append_data(&mut self, table: &DataTable) -> Result<Option<Notice>, TrackError> {
        let current = self.require_data_leader()?.series.clone();
        let resolved = ColumnPairingResolver::new().resolve(table)?;
        let newer = resolved.primary_series()?;
        if newer.len() <= current.len() {
            let notice = Notice {
                title: "No new data".to_string(),
                message: format!("'{}' has no rows past row {}", table.name, current.len()),
            };
            debug!("append to '{}' skipped: {}", self.name, notice.message);
            self.context.event_bus.publish(notice.clone());
            return Ok(Some(notice));
        }

        let extended = current.extended_by(&newer)?;
        let mut follower_updates = Vec::new();
        for (i, (_, series)) in resolved.follower_series()?.into_iter().enumerate() {
            let Some(model) = self.followers.get(i).and_then(|f| f.kind.as_data_point()) else {
                break;
            };
            if series.len() > model.series.len() {
                follower_updates.push((i, model.series.extended_by(&series)?));
            }
        }

        let rows = extended.len();
        let clip = {
            let model = self
                .kind
                .as_data_point_mut()
                .ok_or(TrackError::NotADataTrack(self.id))?;
            model.series = extended;
            Arc::clone(&model.clip)
        };
        for (i, series) in follower_updates {
            if let Some(model) = self.followers[i].kind.as_data_point_mut() {
                model.series = series;
            }
        }

        let length_changed = clip.write().set_data_length(rows);
        self.refresh_initial_time();
        self.adjust_video_clip();
        self.refresh_own_steps(true);
        for follower in &mut self.followers {
            follower.refresh_own_steps(true);
        }
        if length_changed {
            self.publish_clip_changed();
        }
        info!("appended {} rows to track '{}'", rows - current.len(), self.name);

        let bus = &self.context.event_bus;
        bus.publish(StepsChanged { track: self.id });
        bus.publish(DataImported {
            source_name: table.name.clone(),
            row_count: rows,
            point_count: self.point_count(),
        });
        Ok(None)
    }

    /// Move the frame showing the first clip row. Returns true if it moved.
    pub fn set_start_frame(&mut self, frame: usize) -> Result<bool, TrackError> {
        self.require_data_leader()?;
        if frame == self.start_frame {
            return Ok(false);
        }
        let max_frame = self
            .context
            .player
            .read()
            .as_ref()
            .map(|p| p.clip().frame_count().saturating_sub(1));
        let frame = max_frame.map_or(frame, |max| frame.min(max));
        if frame == self.start_frame {
            return Ok(false);
        }

        self.start_frame = frame;
        for follower in &mut self.followers {
            follower.start_frame = frame;
        }
        self.sync_with_clip();
        self.context
            .event_bus
            .publish(StartFrameChanged { track: self.id, frame });
        Ok(true)
    }

    /// Last frame showing data, limited by the video's last frame
    pub fn end_frame(&self) -> usize {
        let clip_end = match self.kind.as_data_point() {
            Some(model) => self.start_frame + model.clip.read().clip_length() - 1,
            None => self.start_frame,
        };
        match self.context.player.read().as_ref() {
            Some(player) => clip_end.min(player.clip().last_frame_number()),
            None => clip_end,
        }
    }

    /// Set the clip length so the data ends at `frame`
    pub fn set_end_frame(&mut self, frame: usize) -> Result<bool, TrackError> {
        let length = frame.saturating_sub(self.start_frame) + 1;
        self.set_clip_length(length)
    }

    /// Data row shown at the end frame
    pub fn end_index(&self) -> Option<usize> {
        let model = self.kind.as_data_point()?;
        let clip = model.clip.read();
        let index = clip.start_index() + (self.end_frame() - self.start_frame) * clip.stride();
        Some(index.min(clip.data_length() - 1))
    }

    pub fn set_start_index(&mut self, index: usize) -> Result<bool, TrackError> {
        let changed = self.require_data_leader()?.clip.write().set_start_index(index);
        if changed {
            self.data_clip_changed();
        }
        Ok(changed)
    }

    pub fn set_stride(&mut self, stride: usize) -> Result<bool, TrackError> {
        let changed = self.require_data_leader()?.clip.write().set_stride(stride);
        if changed {
            self.data_clip_changed();
        }
        Ok(changed)
    }

    pub fn set_clip_length(&mut self, length: usize) -> Result<bool, TrackError> {
        let changed = self.require_data_leader()?.clip.write().set_clip_length(length);
        if changed {
            self.data_clip_changed();
        }
        Ok(changed)
    }

    fn data_clip_changed(&mut self) {
        self.sync_with_clip();
        self.publish_clip_changed();
    }

    fn publish_clip_changed(&self) {
        if let Some(clip) = self.data_clip() {
            self.context.event_bus.publish(DataClipChanged {
                track: self.id,
                start_index: clip.start_index(),
                stride: clip.stride(),
                clip_length: clip.clip_length(),
            });
        }
    }

    /// Initial time, then the video clip, then the step markers
    fn sync_with_clip(&mut self) {
        self.refresh_initial_time();
        self.adjust_video_clip();
        self.reset_markers();
    }

    /// Reconcile the video clip with this track's data
    pub fn adjust_video_clip(&self) -> AdjustOutcome {
        let Some(clip) = self.data_clip() else {
            return AdjustOutcome::NoVideo;
        };
        let (outcome, changed) = {
            let mut player = self.context.player.write();
            let video = player.as_mut().map(|p| p.clip_mut());
            let outcome = VideoClipAdjuster::adjust(video, self.start_frame, &clip);
            let changed = player.as_ref().map(|p| {
                let video = p.clip();
                VideoClipChanged {
                    end_frame: video.end_frame_number(),
                    last_frame: video.last_frame_number(),
                    extra_frames: video.extra_frames(),
                }
            });
            (outcome, changed)
        };
        if matches!(outcome, AdjustOutcome::Extended { .. } | AdjustOutcome::PaddingTrimmed { .. }) {
            if let Some(event) = changed {
                self.context.event_bus.publish(event);
            }
        }
        outcome
    }

    /// Forget the last valid frame of this track and its followers so steps
    /// are rebuilt on the next read
    pub(crate) fn reset_markers(&mut self) {
        self.reset_own_marker();
        for follower in &mut self.followers {
            follower.reset_own_marker();
        }
    }

    fn reset_own_marker(&mut self) {
        if let Some(model) = self.kind.as_data_point_mut() {
            model.last_valid_frame = None;
        }
        self.cache.invalidate();
    }

    /// Rebuild steps of this track and its followers from their data
    pub fn refresh_steps(&mut self) {
        self.refresh_own_steps(false);
        for follower in &mut self.followers {
            follower.refresh_own_steps(false);
        }
    }

    pub(crate) fn ensure_steps(&mut self) {
        if let Some(model) = self.kind.as_data_point() {
            if model.last_valid_frame.is_none() {
                self.refresh_own_steps(false);
            }
        }
    }

    /// Place a step on every step frame from the start frame, stopping at the
    /// first frame with no data row. With `resume`, existing steps are kept
    /// and filling continues after the last valid frame.
    fn refresh_own_steps(&mut self, resume: bool) {
        let start = self.start_frame;
        let end = self.end_frame();
        let step_size = self
            .context
            .player
            .read()
            .as_ref()
            .map_or(1, |p| p.clip().step_size());
        let Some(model) = self.kind.as_data_point() else {
            return;
        };

        let mut last = None;
        let mut frame = start;
        match (resume, model.last_valid_frame) {
            (true, Some(valid)) => {
                last = Some(valid);
                frame = valid + step_size;
            }
            _ => self.steps.clear(),
        }
        while frame <= end {
            let Some(position) = model.position_at(frame, start) else {
                break;
            };
            self.steps.set_step(frame, Some(Step::new(frame, vec![position])));
            last = Some(frame);
            frame += step_size;
        }

        if let Some(model) = self.kind.as_data_point_mut() {
            model.last_valid_frame = last;
        }
        self.cache.invalidate();
        debug!("refreshed steps of '{}' up to frame {:?}", self.full_name(), last);
    }

    pub(crate) fn new_follower(&self, series: ExternalDataSeries, clip: &Arc<RwLock<DataClip>>, point_name: String) -> Track {
        let model = DataPointModel::new(series, Arc::clone(clip), point_name);
        let mut follower = Track::with_kind(self.context.clone(), self.name.clone(), TrackKind::DataPoint(model));
        follower.leader = Some(self.id);
        follower.color = self.color.clone();
        follower.footprint = self.footprint.clone();
        follower.start_frame = self.start_frame;
        follower
    }

    /// Data time at a clip step, NaN without time data
    pub fn step_time(&self, step: usize) -> f64 {
        self.kind
            .as_data_point()
            .and_then(|model| {
                let index = model.clip.read().step_to_index(step);
                model.series.time(index)
            })
            .unwrap_or(f64::NAN)
    }

    /// True if the data carries enough time values to drive the clock
    pub fn is_time_data_available(&self) -> bool {
        let Ok(model) = self.model() else {
            return false;
        };
        let Some(t) = model.series.t() else {
            return false;
        };
        let clip = model.clip.read();
        self.context.has_player() && t.len() > clip.stride().max(clip.start_index())
    }

    /// Seconds per video frame according to the data
    pub fn frame_duration(&self) -> Option<f64> {
        let model = self.kind.as_data_point()?;
        let stride = model.clip.read().stride();
        let t = model.series.t()?;
        Some(t.get(stride)? - t.first()?)
    }

    /// Data time, in seconds, of the video clip's start frame
    pub fn video_start_time(&self) -> Option<f64> {
        let model = self.kind.as_data_point()?;
        let t0 = model.series.time(model.clip.read().start_index())?;
        let duration = self.frame_duration()?;
        let clip_start = self
            .context
            .player
            .read()
            .as_ref()
            .map_or(0, |p| p.clip().start_frame_number());
        Some(t0 - duration * (self.start_frame as f64 - clip_start as f64))
    }

    /// Time of the first clip row, seconds
    pub fn initial_time(&self) -> Option<f64> {
        self.kind.as_data_point().and_then(|m| m.initial_time)
    }

    fn data_time_source(&self) -> Option<TimeSource> {
        if !self.is_time_data_available() {
            return None;
        }
        Some(TimeSource::Data {
            track: self.id,
            start_time_ms: self.video_start_time()? * 1000.0,
            frame_duration_ms: self.frame_duration()? * 1000.0,
        })
    }

    fn refresh_initial_time(&mut self) {
        let source = self.data_time_source();
        if let Some(model) = self.kind.as_data_point_mut() {
            model.initial_time = model.series.time(model.clip.read().start_index());
        }
        let mut player = self.context.player.write();
        if let (Some(player), Some(source)) = (player.as_mut(), source) {
            if player.is_time_source(self.id) {
                player.set_time_source(source);
            }
        }
    }

    /// Drive the playback clock from this track's time data. Returns true if
    /// the track is now the clock's time source.
    pub fn set_use_data_time(&mut self, use_data_time: bool) -> Result<bool, TrackError> {
        self.require_data_leader()?;
        self.use_data_time = use_data_time;
        let source = if use_data_time { self.data_time_source() } else { None };
        let in_use = {
            let mut player = self.context.player.write();
            match (player.as_mut(), source) {
                (Some(player), Some(source)) => {
                    player.set_time_source(source);
                    true
                }
                (Some(player), None) => {
                    if player.is_time_source(self.id) {
                        player.set_time_source(TimeSource::Video);
                    }
                    false
                }
                (None, _) => false,
            }
        };
        for point in std::iter::once(&*self).chain(self.followers.iter()) {
            point.cache.invalidate();
        }
        Ok(in_use)
    }

    /// Start frame that puts the first clip row at time `t` seconds on the
    /// playback clock
    pub fn start_frame_for_time(&self, t: f64) -> Option<usize> {
        let player = self.context.player.read();
        let player = player.as_ref()?;
        let mean = player.mean_step_duration();
        if !t.is_finite() || mean <= 0.0 {
            return None;
        }
        let step = ((t * 1000.0 - player.start_time()) / mean).round().max(0.0) as usize;
        Some(player.clip().step_to_frame(step))
    }
}
