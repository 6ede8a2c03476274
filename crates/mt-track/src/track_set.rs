//! The tracks of one session

use std::sync::Arc;

use indexmap::IndexMap;
use mt_core::events::events::{DataImportFailed, TrackAdded, TrackDeleted, VideoClipChanged};
use mt_core::{TimeSource, TrackId, TrackerContext, VideoClipHandle};
use mt_data::ImportOutcome;
use tracing::{debug, info, warn};

use crate::cache::TrackData;
use crate::step::Step;
use crate::track::{Track, TrackLookup};
use crate::TrackError;

/// Tracks in insertion order.
///
/// Followers live inside their leader; lookups by id search them too.
pub struct TrackSet {
    context: TrackerContext,
    tracks: IndexMap<TrackId, Track>,
}

impl TrackSet {
    pub fn new(context: TrackerContext) -> Self {
        Self {
            context,
            tracks: IndexMap::new(),
        }
    }

    pub fn context(&self) -> &TrackerContext {
        &self.context
    }

    /// Number of top-level tracks
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Top-level tracks in insertion order
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    /// Add a track and announce it
    pub fn add(&mut self, mut track: Track) -> TrackId {
        let id = track.id();
        if let Some(steps) = track.dependent_steps(&*self) {
            track.replace_steps(steps);
        }
        let name = track.name().to_string();
        debug!("adding track '{}' ({})", name, track.kind().type_name());
        self.tracks.insert(id, track);
        self.context.event_bus.publish(TrackAdded { track: id, name });
        id
    }

    /// Track or follower with the given id
    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks
            .get(&id)
            .or_else(|| self.tracks.values().find_map(|t| t.follower(id)))
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        if self.tracks.contains_key(&id) {
            return self.tracks.get_mut(&id);
        }
        self.tracks.values_mut().find_map(|t| t.follower_mut(id))
    }

    /// Leader of a follower
    pub fn leader_of(&self, id: TrackId) -> Option<&Track> {
        let leader = self.get(id)?.leader()?;
        self.tracks.get(&leader)
    }

    /// Every point of the leader group a track belongs to, leader first
    pub fn all_points(&self, id: TrackId) -> Vec<&Track> {
        match self.leader_of(id).or_else(|| self.tracks.get(&id)) {
            Some(leader) => leader.all_points(),
            None => Vec::new(),
        }
    }

    /// Remove a track. Deleting a leader removes its followers; deleting a
    /// follower detaches it from its leader. Fails while a dependent track
    /// refers to the track or one of its followers.
    pub fn delete(&mut self, id: TrackId) -> Result<Track, TrackError> {
        let target = self.get(id).ok_or(TrackError::NotFound(id))?;
        let doomed: Vec<TrackId> = target.all_points().iter().map(|t| t.id()).collect();
        for other in self.tracks.values() {
            if doomed.contains(&other.id()) {
                continue;
            }
            if let Some(&member) = doomed.iter().find(|&&d| other.kind().references(d)) {
                return Err(TrackError::Referenced {
                    track: member,
                    by: other.id(),
                });
            }
        }

        let removed = match self.tracks.shift_remove(&id) {
            Some(track) => track,
            None => {
                let leader = self.leader_of(id).map(Track::id).ok_or(TrackError::NotFound(id))?;
                let leader = self.tracks.get_mut(&leader).ok_or(TrackError::NotFound(id))?;
                let index = leader
                    .followers
                    .iter()
                    .position(|f| f.id() == id)
                    .ok_or(TrackError::NotFound(id))?;
                let mut follower = leader.followers.remove(index);
                follower.leader = None;
                follower
            }
        };

        {
            let mut player = self.context.player.write();
            if let Some(player) = player.as_mut().filter(|p| p.is_time_source(id)) {
                player.set_time_source(TimeSource::Video);
            }
        }
        info!("deleted track '{}'", removed.name());
        self.context.event_bus.publish(TrackDeleted { track: id });
        Ok(removed)
    }

    /// React to a change of the video clip: keep start frames inside the
    /// video, drop cached positions and recompute dependent tracks
    pub fn on_video_clip_changed(&mut self) {
        let last_frame = self
            .context
            .player
            .read()
            .as_ref()
            .map(|p| p.clip().frame_count().saturating_sub(1));
        for track in self.tracks.values_mut() {
            if let Some(last) = last_frame.filter(|&last| track.start_frame() > last) {
                if let Err(e) = track.set_start_frame(last) {
                    warn!("could not move start frame of '{}': {}", track.name(), e);
                }
            }
            track.reset_markers();
        }
        self.refresh_dependents();

        let event = self.context.player.read().as_ref().map(|p| {
            let clip = p.clip();
            VideoClipChanged {
                end_frame: clip.end_frame_number(),
                last_frame: clip.last_frame_number(),
                extra_frames: clip.extra_frames(),
            }
        });
        if let Some(event) = event {
            self.context.event_bus.publish(event);
        }
    }

    /// Recompute the steps of every dependent track
    pub fn refresh_dependents(&mut self) {
        let lookup: &TrackSet = self;
        let updates: Vec<(TrackId, Vec<Step>)> = lookup
            .tracks
            .values()
            .filter_map(|t| t.dependent_steps(lookup).map(|steps| (t.id(), steps)))
            .collect();
        for (id, steps) in updates {
            if let Some(track) = self.tracks.get_mut(&id) {
                track.replace_steps(steps);
            }
        }
    }

    /// Derived time series of a track
    pub fn track_data(&mut self, id: TrackId) -> Result<Arc<TrackData>, TrackError> {
        self.get_mut(id).ok_or(TrackError::NotFound(id))?.data()
    }

    /// Commit a finished import, either into `target` or as a new data
    /// track. Cancelled imports are dropped silently.
    pub fn commit_import(&mut self, outcome: ImportOutcome, target: Option<TrackId>) -> Result<Option<TrackId>, TrackError> {
        let (source_name, result) = match outcome {
            ImportOutcome::Cancelled => {
                debug!("discarding cancelled import");
                return Ok(None);
            }
            ImportOutcome::Failed { source_name, error } => (source_name, Err(TrackError::Data(error))),
            ImportOutcome::Loaded { source_name, table } => {
                let result = match target {
                    Some(id) => match self.get_mut(id) {
                        Some(track) => track.set_data(&table).map(|_| id),
                        None => Err(TrackError::NotFound(id)),
                    },
                    None => Track::data_track(self.context.clone(), source_name.clone(), &table).map(|track| self.add(track)),
                };
                (source_name, result)
            }
        };

        match result {
            Ok(id) => {
                self.refresh_dependents();
                Ok(Some(id))
            }
            Err(error) => {
                warn!("import of '{}' failed: {}", source_name, error);
                self.context.event_bus.publish(DataImportFailed {
                    source_name,
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }
}

impl TrackLookup for TrackSet {
    fn step_at(&self, track: TrackId, frame: usize) -> Option<Arc<Step>> {
        self.get(track)?.current_step(frame)
    }

    fn mass_of(&self, track: TrackId) -> Option<f64> {
        self.get(track).map(Track::mass)
    }
}
