//! Tracks: named, colored series of steps

mod data;
pub mod kind;

use std::sync::Arc;

use mt_core::{TrackId, TrackerContext, VideoClipHandle, VideoPlayer};
use tracing::debug;

use crate::cache::{Constant, Sample, TrackData, TrackDataCache};
use crate::step::{Point, Step};
use crate::step_array::StepArray;
use crate::TrackError;

pub use kind::{DataPointModel, NoTracks, TrackKind, TrackLookup};

/// Footprint of a new track
pub const DEFAULT_FOOTPRINT: &str = "CircleFootprint.FilledCircle";

/// Colors handed out to new tracks in turn
pub const DEFAULT_COLORS: [&str; 6] = ["#ff0000", "#0000ff", "#00c000", "#ff00ff", "#00c0c0", "#c0c000"];

/// A tracked object.
///
/// A data track is the leader of its point tracks: it owns its followers,
/// and each follower keeps only its leader's id.
#[derive(Debug)]
pub struct Track {
    pub(crate) id: TrackId,
    pub(crate) name: String,
    pub(crate) color: String,
    pub(crate) footprint: String,
    pub(crate) mass: f64,
    pub(crate) kind: TrackKind,
    pub(crate) steps: Arc<StepArray>,
    pub(crate) cache: TrackDataCache,
    pub(crate) leader: Option<TrackId>,
    pub(crate) followers: Vec<Track>,
    pub(crate) start_frame: usize,
    pub(crate) use_data_time: bool,
    pub(crate) context: TrackerContext,
}

impl Track {
    pub(crate) fn with_kind(context: TrackerContext, name: impl Into<String>, kind: TrackKind) -> Self {
        let increment = context.settings().step_array_increment;
        Self {
            id: TrackId::new(),
            name: name.into(),
            color: DEFAULT_COLORS[0].to_string(),
            footprint: DEFAULT_FOOTPRINT.to_string(),
            mass: 1.0,
            kind,
            steps: Arc::new(StepArray::with_increment(increment)),
            cache: TrackDataCache::new(),
            leader: None,
            followers: Vec::new(),
            start_frame: 0,
            use_data_time: false,
            context,
        }
    }

    /// A track whose steps the user marks
    pub fn point_mass(context: TrackerContext, name: impl Into<String>) -> Self {
        Self::with_kind(context, name, TrackKind::PointMass)
    }

    /// A point mass that sits at the same position on every frame
    pub fn fixed_point_mass(context: TrackerContext, name: impl Into<String>, position: Point) -> Self {
        let mut track = Self::point_mass(context, name);
        let increment = track.steps.increment();
        track.steps = Arc::new(StepArray::autofill(Step::new(0, vec![position]), increment));
        track
    }

    /// A track at the mass-weighted mean position of `members`
    pub fn center_of_mass(context: TrackerContext, name: impl Into<String>, members: Vec<TrackId>) -> Self {
        Self::with_kind(context, name, TrackKind::CenterOfMass { members })
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Track name followed by the point name, as shown for a single point
    pub fn full_name(&self) -> String {
        match self.point_label() {
            Some(label) if !label.is_empty() => format!("{} {}", self.name, label),
            _ => self.name.clone(),
        }
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    /// Set the color of this track and every follower
    pub fn set_color(&mut self, color: impl Into<String>) {
        self.color = color.into();
        for follower in &mut self.followers {
            follower.color = self.color.clone();
        }
    }

    pub fn footprint(&self) -> &str {
        &self.footprint
    }

    pub fn set_footprint(&mut self, footprint: impl Into<String>) {
        self.footprint = footprint.into();
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn set_mass(&mut self, mass: f64) {
        if mass > 0.0 && mass != self.mass {
            self.mass = mass;
            self.cache.invalidate();
        }
    }

    pub fn kind(&self) -> &TrackKind {
        &self.kind
    }

    pub fn steps(&self) -> &Arc<StepArray> {
        &self.steps
    }

    pub fn cache(&self) -> &TrackDataCache {
        &self.cache
    }

    pub fn context(&self) -> &TrackerContext {
        &self.context
    }

    /// Leader's id, for a follower
    pub fn leader(&self) -> Option<TrackId> {
        self.leader
    }

    pub fn is_leader(&self) -> bool {
        self.leader.is_none()
    }

    pub fn followers(&self) -> &[Track] {
        &self.followers
    }

    pub fn follower(&self, id: TrackId) -> Option<&Track> {
        self.followers.iter().find(|f| f.id == id)
    }

    pub fn follower_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.followers.iter_mut().find(|f| f.id == id)
    }

    /// This track followed by its followers
    pub fn all_points(&self) -> Vec<&Track> {
        std::iter::once(self).chain(self.followers.iter()).collect()
    }

    /// Points tracked by this track and its followers
    pub fn point_count(&self) -> usize {
        self.kind.point_count() * (1 + self.followers.len())
    }

    pub fn data_length(&self) -> usize {
        self.kind.data_length()
    }

    pub fn start_frame(&self) -> usize {
        self.start_frame
    }

    pub fn use_data_time(&self) -> bool {
        self.use_data_time
    }

    /// Mark a position at a frame. Only point masses accept marks; a fixed
    /// point mass moves on every frame.
    pub fn mark_step(&mut self, frame: usize, position: Point) -> Option<Arc<Step>> {
        if !matches!(self.kind, TrackKind::PointMass) {
            return None;
        }
        let step = Step::new(frame, vec![position]);
        let placed = if self.steps.is_autofill() {
            for n in 0..self.steps.len().max(frame + 1) {
                self.steps.set_step(n, Some(step.clone()));
            }
            self.steps.get_step(frame)
        } else {
            self.steps.set_step(frame, Some(step))
        };
        self.cache.invalidate();
        placed
    }

    /// Remove the mark at a frame. Returns true if a step was removed;
    /// autofill tracks keep their steps.
    pub fn erase_step(&mut self, frame: usize) -> bool {
        if !matches!(self.kind, TrackKind::PointMass) || self.steps.get_step(frame).is_none() {
            return false;
        }
        if self.steps.set_step(frame, None).is_some() {
            return false;
        }
        self.cache.invalidate();
        true
    }

    /// Step at a frame, bringing data-driven steps up to date first
    pub fn step_at(&mut self, frame: usize) -> Option<Arc<Step>> {
        self.ensure_steps();
        self.steps.get_step(frame)
    }

    /// Step shown at a frame without touching stored state; data tracks read
    /// their series directly
    pub fn current_step(&self, frame: usize) -> Option<Arc<Step>> {
        match &self.kind {
            TrackKind::DataPoint(model) => model
                .position_at(frame, self.start_frame)
                .map(|p| Arc::new(Step::new(frame, vec![p]))),
            _ => self.steps.get_step(frame),
        }
    }

    /// Steps a dependent track derives from other tracks, `None` for other
    /// kinds
    pub fn dependent_steps(&self, lookup: &dyn TrackLookup) -> Option<Vec<Step>> {
        if !self.kind.is_dependent() {
            return None;
        }
        let steps = self
            .frame_range()
            .into_iter()
            .filter_map(|frame| self.kind.compute_step_at(frame, self.start_frame, &self.steps, lookup))
            .collect();
        Some(steps)
    }

    pub(crate) fn replace_steps(&mut self, steps: Vec<Step>) {
        self.steps.clear();
        for step in steps {
            self.steps.set_step(step.frame(), Some(step));
        }
        self.cache.invalidate();
        debug!("replaced steps of '{}'", self.name);
    }

    /// Recompute steps of a dependent track from other tracks
    pub fn refresh_dependent(&mut self, lookup: &dyn TrackLookup) {
        if let Some(steps) = self.dependent_steps(lookup) {
            self.replace_steps(steps);
        }
    }

    /// Derived time series, recomputed only after a change
    pub fn data(&mut self) -> Result<Arc<TrackData>, TrackError> {
        self.ensure_steps();
        self.cache.set_spill(self.context.settings().derivative_spill);
        let this = &*self;
        this.cache.get_data(|| this.samples())
    }

    /// Add or replace a formula column
    pub fn define_column(&self, name: impl Into<String>, expression: impl Into<String>) {
        self.cache.define_column(name, expression);
    }

    pub fn remove_column(&self, name: &str) -> bool {
        self.cache.remove_column(name)
    }

    pub fn set_constant(&self, constant: Constant) {
        self.cache.set_constant(constant);
    }

    /// Time of a frame in seconds
    pub fn frame_time(&self, frame: usize) -> f64 {
        let player = self.context.player.read();
        self.time_at(frame, player.as_ref())
    }

    fn point_label(&self) -> Option<&str> {
        self.kind.as_data_point().map(DataPointModel::point_name)
    }

    fn time_at(&self, frame: usize, player: Option<&VideoPlayer>) -> f64 {
        let data_time = self.kind.as_data_point().and_then(|model| {
            model
                .index_at(frame, self.start_frame)
                .and_then(|index| model.series.time(index))
        });
        match (data_time, player) {
            (Some(t), _) => t,
            (None, Some(player)) => player.frame_time(frame) / 1000.0,
            (None, None) => frame as f64 * self.context.settings().default_frame_duration_ms / 1000.0,
        }
    }

    /// Frames that can hold steps: the video clip's step frames, or the
    /// existing array without a video
    fn frame_range(&self) -> Vec<usize> {
        match self.context.player.read().as_ref() {
            Some(player) => {
                let clip = player.clip();
                (clip.start_frame_number()..=clip.end_frame_number())
                    .filter(|&f| clip.includes_frame(f))
                    .collect()
            }
            None => (0..self.steps.len()).collect(),
        }
    }

    fn samples(&self) -> Vec<Sample> {
        let player = self.context.player.read();
        let clip = player.as_ref().map(VideoPlayer::clip);
        self.steps
            .steps()
            .iter()
            .filter_map(|step| {
                let frame = step.frame();
                if clip.is_some_and(|c| !c.includes_frame(frame)) {
                    return None;
                }
                Some(Sample {
                    frame,
                    step: clip.and_then(|c| c.frame_to_step(frame)).unwrap_or(frame),
                    t: self.time_at(frame, player.as_ref()),
                    position: step.position()?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mt_core::{TrackerSettings, VideoClip, VideoPlayer};

    fn context_with_video(frames: usize) -> TrackerContext {
        let context = TrackerContext::new(TrackerSettings::default());
        context.attach_player(VideoPlayer::new(VideoClip::new(frames), 100.0));
        context
    }

    #[test]
    fn test_marked_steps_feed_track_data() {
        let mut track = Track::point_mass(context_with_video(10), "ball");
        for frame in 0..4 {
            track.mark_step(frame, Point::new(frame as f64, 0.0));
        }
        let first = track.data().unwrap();
        assert_eq!(first.row_count(), 4);
        assert_eq!(first.values("t").unwrap()[2], 0.2);
        assert!(Arc::ptr_eq(&first, &track.data().unwrap()));

        track.mark_step(4, Point::new(4.0, 0.0));
        let second = track.data().unwrap();
        assert_eq!(second.row_count(), 5);
        assert!((second.values("v_x").unwrap()[2] - 10.0).abs() < 1e-9);

        assert!(track.erase_step(4));
        assert_eq!(track.data().unwrap().row_count(), 4);
    }

    #[test]
    fn test_fixed_point_mass_fills_every_frame() {
        let mut track = Track::fixed_point_mass(context_with_video(8), "origin", Point::new(1.0, 1.0));
        track.mark_step(2, Point::new(5.0, 5.0));
        assert_eq!(track.step_at(7).unwrap().position(), Some(Point::new(5.0, 5.0)));
        let data = track.data().unwrap();
        assert_eq!(data.row_count(), 8);

        assert!(!track.erase_step(2));
        assert!(track.step_at(2).is_some());
        assert!(!track.cache().is_dirty());
        assert!(Arc::ptr_eq(&data, &track.data().unwrap()));
    }

    #[test]
    fn test_derivative_spill_setting_reaches_track_data() {
        let context = context_with_video(10);
        let mut track = Track::point_mass(context.clone(), "ball");
        for frame in 0..5 {
            track.mark_step(frame, Point::new((frame * frame * frame) as f64, 0.0));
        }
        assert!(!track.data().unwrap().values("v_x").unwrap()[1].is_nan());

        context.settings.write().derivative_spill = 2;
        let data = track.data().unwrap();
        let vx = data.values("v_x").unwrap();
        assert!(vx[1].is_nan());
        assert!((vx[2] - 160.0).abs() < 1e-9);
        assert_eq!(track.cache().spill(), 2);
    }

    #[test]
    fn test_only_point_masses_accept_marks() {
        let context = context_with_video(10);
        let mut com = Track::center_of_mass(context, "cm", Vec::new());
        assert!(com.mark_step(0, Point::new(0.0, 0.0)).is_none());
        assert_eq!(com.point_count(), 1);
    }
}
