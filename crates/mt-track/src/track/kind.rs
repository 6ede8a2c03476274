//! What a track is made of, and how it computes a step

use std::sync::Arc;

use mt_core::TrackId;
use mt_data::ExternalDataSeries;
use parking_lot::RwLock;

use crate::data_clip::DataClip;
use crate::step::{Point, Step};
use crate::step_array::StepArray;

/// Read access to other tracks, for tracks derived from them
pub trait TrackLookup {
    /// Stored step of a track at a frame
    fn step_at(&self, track: TrackId, frame: usize) -> Option<Arc<Step>>;

    /// Mass of a track
    fn mass_of(&self, track: TrackId) -> Option<f64>;
}

/// Lookup that knows no tracks
pub struct NoTracks;

impl TrackLookup for NoTracks {
    fn step_at(&self, _track: TrackId, _frame: usize) -> Option<Arc<Step>> {
        None
    }

    fn mass_of(&self, _track: TrackId) -> Option<f64> {
        None
    }
}

/// Positions taken from an external series through a data clip.
///
/// Followers share their leader's clip.
#[derive(Debug, Clone)]
pub struct DataPointModel {
    pub(crate) series: ExternalDataSeries,
    pub(crate) clip: Arc<RwLock<DataClip>>,
    pub(crate) point_name: String,
    pub(crate) source_name: Option<String>,
    /// Last frame whose step is known to be current; `None` forces a refresh
    pub(crate) last_valid_frame: Option<usize>,
    /// Time of the first shown row, seconds
    pub(crate) initial_time: Option<f64>,
}

impl DataPointModel {
    pub fn new(series: ExternalDataSeries, clip: Arc<RwLock<DataClip>>, point_name: impl Into<String>) -> Self {
        Self {
            series,
            clip,
            point_name: point_name.into(),
            source_name: None,
            last_valid_frame: None,
            initial_time: None,
        }
    }

    pub fn series(&self) -> &ExternalDataSeries {
        &self.series
    }

    pub fn clip(&self) -> &Arc<RwLock<DataClip>> {
        &self.clip
    }

    pub fn point_name(&self) -> &str {
        &self.point_name
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    pub fn last_valid_frame(&self) -> Option<usize> {
        self.last_valid_frame
    }

    /// Data row shown at a frame, for data starting at `start_frame`
    pub fn index_at(&self, frame: usize, start_frame: usize) -> Option<usize> {
        let step = frame.checked_sub(start_frame)?;
        self.clip.read().checked_index(step)
    }

    /// Data position shown at a frame
    pub fn position_at(&self, frame: usize, start_frame: usize) -> Option<Point> {
        let index = self.index_at(frame, start_frame)?;
        self.series.point(index).map(|(x, y)| Point::new(x, y))
    }
}

/// The kinds of track
#[derive(Debug, Clone)]
pub enum TrackKind {
    /// Positions marked by the user, one step at a time
    PointMass,
    /// Positions read from external data
    DataPoint(DataPointModel),
    /// Mass-weighted mean of other point tracks
    CenterOfMass { members: Vec<TrackId> },
}

impl TrackKind {
    /// Step this kind produces at a frame
    pub fn compute_step_at(
        &self,
        frame: usize,
        start_frame: usize,
        steps: &StepArray,
        lookup: &dyn TrackLookup,
    ) -> Option<Step> {
        match self {
            TrackKind::PointMass => steps.get_step(frame).map(|s| s.with_frame(frame)),
            TrackKind::DataPoint(model) => model
                .position_at(frame, start_frame)
                .map(|p| Step::new(frame, vec![p])),
            TrackKind::CenterOfMass { members } => {
                let mut total = 0.0;
                let mut sum = Point::default();
                for &member in members {
                    let position = lookup.step_at(member, frame)?.position()?;
                    let mass = lookup.mass_of(member)?;
                    total += mass;
                    sum.x += mass * position.x;
                    sum.y += mass * position.y;
                }
                if members.is_empty() || total <= 0.0 {
                    return None;
                }
                Some(Step::at(frame, sum.x / total, sum.y / total))
            }
        }
    }

    /// Rows of external data behind the track
    pub fn data_length(&self) -> usize {
        match self {
            TrackKind::DataPoint(model) => model.series.len(),
            _ => 0,
        }
    }

    /// Points carried by each step
    pub fn point_count(&self) -> usize {
        1
    }

    pub fn is_dependent(&self) -> bool {
        matches!(self, TrackKind::CenterOfMass { .. })
    }

    /// True if the kind refers to the given track
    pub fn references(&self, track: TrackId) -> bool {
        matches!(self, TrackKind::CenterOfMass { members } if members.contains(&track))
    }

    pub fn as_data_point(&self) -> Option<&DataPointModel> {
        match self {
            TrackKind::DataPoint(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_data_point_mut(&mut self) -> Option<&mut DataPointModel> {
        match self {
            TrackKind::DataPoint(model) => Some(model),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TrackKind::PointMass => "PointMass",
            TrackKind::DataPoint(_) => "DataTrack",
            TrackKind::CenterOfMass { .. } => "CenterOfMass",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Fixed(HashMap<TrackId, (f64, Point)>);

    impl TrackLookup for Fixed {
        fn step_at(&self, track: TrackId, frame: usize) -> Option<Arc<Step>> {
            self.0
                .get(&track)
                .map(|(_, p)| Arc::new(Step::at(frame, p.x, p.y)))
        }

        fn mass_of(&self, track: TrackId) -> Option<f64> {
            self.0.get(&track).map(|(m, _)| *m)
        }
    }

    #[test]
    fn test_center_of_mass_weights_members() {
        let a = TrackId::new();
        let b = TrackId::new();
        let lookup = Fixed(HashMap::from([
            (a, (1.0, Point::new(0.0, 0.0))),
            (b, (3.0, Point::new(4.0, 8.0))),
        ]));
        let kind = TrackKind::CenterOfMass { members: vec![a, b] };
        let step = kind.compute_step_at(7, 0, &StepArray::new(), &lookup).unwrap();
        assert_eq!(step.frame(), 7);
        assert_eq!(step.position(), Some(Point::new(3.0, 6.0)));
        assert!(kind.references(a));
        assert!(kind.is_dependent());

        let missing = TrackKind::CenterOfMass { members: vec![a, TrackId::new()] };
        assert!(missing.compute_step_at(7, 0, &StepArray::new(), &lookup).is_none());
    }

    #[test]
    fn test_data_point_reads_through_clip() {
        let series = ExternalDataSeries::new(
            (0..10).map(|i| i as f64).collect(),
            (0..10).map(|i| -(i as f64)).collect(),
            None,
        )
        .unwrap();
        let clip = Arc::new(RwLock::new(DataClip::new(10)));
        clip.write().set_stride(2);
        let kind = TrackKind::DataPoint(DataPointModel::new(series, clip, "A"));

        let step = kind.compute_step_at(5, 3, &StepArray::new(), &NoTracks).unwrap();
        assert_eq!(step.position(), Some(Point::new(4.0, -4.0)));
        assert!(kind.compute_step_at(2, 3, &StepArray::new(), &NoTracks).is_none());
        assert!(kind.compute_step_at(8, 3, &StepArray::new(), &NoTracks).is_none());
        assert_eq!(kind.data_length(), 10);
    }
}
