//! JSON documents for saving and loading tracks
//!
//! A data track stores its leader series under `x`, `y` and `t` and each
//! follower under numbered keys (`x0`, `y0`, `mass0`, `pointname0`,
//! `color0`, `footprint0`, ...). Loading stops at the first follower index
//! with no `x`/`y` pair, so documents without followers load unchanged.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use mt_core::{TrackId, TrackerContext};
use mt_data::{DataError, ExternalDataSeries};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::{Constant, DerivedColumn};
use crate::data_clip::{DataClip, DataClipFields};
use crate::step::{Point, Step};
use crate::track::{DataPointModel, Track, TrackKind};
use crate::track_set::TrackSet;
use crate::TrackError;

fn default_mass() -> f64 {
    1.0
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn from_nullable(values: Vec<Option<f64>>) -> Vec<f64> {
    values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect()
}

fn to_nullable(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().map(|v| v.is_finite().then_some(*v)).collect()
}

/// Series arrays with missing values written as `null`
mod nullable {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &Option<Vec<f64>>, serializer: S) -> Result<S::Ok, S::Error> {
        values.as_deref().map(super::to_nullable).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<f64>>, D::Error> {
        Ok(Option::<Vec<Option<f64>>>::deserialize(deserializer)?.map(super::from_nullable))
    }
}

/// One marked position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDocument {
    pub frame: usize,
    pub x: f64,
    pub y: f64,
}

/// Saved form of one top-level track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackDocument {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TrackId>,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub footprint: String,
    #[serde(default = "default_mass")]
    pub mass: f64,

    #[serde(default, with = "nullable", skip_serializing_if = "Option::is_none")]
    pub x: Option<Vec<f64>>,
    #[serde(default, with = "nullable", skip_serializing_if = "Option::is_none")]
    pub y: Option<Vec<f64>>,
    #[serde(default, with = "nullable", skip_serializing_if = "Option::is_none")]
    pub t: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataclip: Option<DataClipFields>,
    #[serde(default)]
    pub start_frame: usize,
    #[serde(default, skip_serializing_if = "is_false")]
    pub use_data_time: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepDocument>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub fixed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<TrackId>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constants: Vec<Constant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_functions: Vec<DerivedColumn>,

    /// Numbered follower keys
    #[serde(flatten)]
    pub points: BTreeMap<String, Value>,
}

impl TrackDocument {
    pub fn from_track(track: &Track) -> Self {
        let mut doc = Self {
            kind: track.kind().type_name().to_string(),
            id: Some(track.id()),
            name: track.name().to_string(),
            color: track.color().to_string(),
            footprint: track.footprint().to_string(),
            mass: track.mass(),
            constants: track.cache().constants(),
            data_functions: track.cache().columns(),
            ..Default::default()
        };

        match track.kind() {
            TrackKind::PointMass => {
                let steps = track.steps();
                doc.fixed = steps.is_autofill();
                let stored = steps.steps();
                let kept = if doc.fixed { &stored[..stored.len().min(1)] } else { &stored[..] };
                doc.steps = kept
                    .iter()
                    .filter_map(|step| {
                        let p = step.position()?;
                        Some(StepDocument {
                            frame: step.frame(),
                            x: p.x,
                            y: p.y,
                        })
                    })
                    .collect();
            }
            TrackKind::DataPoint(model) => {
                doc.x = Some(model.series().x().to_vec());
                doc.y = Some(model.series().y().to_vec());
                doc.t = model.series().t().map(<[f64]>::to_vec);
                doc.pointname = Some(model.point_name().to_string());
                doc.source = model.source_name().map(str::to_string);
                doc.dataclip = Some(model.clip().read().clone().into());
                doc.start_frame = track.start_frame();
                doc.use_data_time = track.use_data_time();
                for (i, follower) in track.followers().iter().enumerate() {
                    doc.insert_follower(i, follower);
                }
            }
            TrackKind::CenterOfMass { members } => {
                doc.members = members.clone();
            }
        }
        doc
    }

    fn insert_follower(&mut self, i: usize, follower: &Track) {
        let Some(model) = follower.kind().as_data_point() else {
            return;
        };
        let entries = [
            ("x", Value::from(to_nullable(model.series().x()))),
            ("y", Value::from(to_nullable(model.series().y()))),
            ("mass", Value::from(follower.mass())),
            ("pointname", Value::from(model.point_name())),
            ("color", Value::from(follower.color())),
            ("footprint", Value::from(follower.footprint())),
            ("id", Value::from(follower.id().to_string())),
        ];
        for (key, value) in entries {
            self.points.insert(format!("{}{}", key, i), value);
        }
    }

    fn point_series(&self, key: &str, i: usize) -> Result<Option<Vec<f64>>, TrackError> {
        Ok(self.point_value::<Vec<Option<f64>>>(key, i)?.map(from_nullable))
    }

    fn point_value<T: serde::de::DeserializeOwned>(&self, key: &str, i: usize) -> Result<Option<T>, TrackError> {
        match self.points.get(&format!("{}{}", key, i)) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Build the track this document describes
    pub fn into_track(self, context: &TrackerContext) -> Result<Track, TrackError> {
        let mut track = match self.kind.as_str() {
            "PointMass" => self.point_mass(context),
            "DataTrack" => self.data_track(context)?,
            "CenterOfMass" => Track::center_of_mass(context.clone(), self.name.clone(), self.members.clone()),
            other => return Err(DataError::format(format!("Unknown track type '{}'", other)).into()),
        };

        if let Some(id) = self.id {
            track.id = id;
            for follower in &mut track.followers {
                follower.leader = Some(id);
            }
        }
        if !self.color.is_empty() {
            track.color = self.color.clone();
        }
        if !self.footprint.is_empty() {
            track.footprint = self.footprint.clone();
        }
        track.set_mass(self.mass);
        track.cache.defer_columns(self.data_functions);
        track.cache.defer_constants(self.constants);
        debug!("loaded track '{}' ({})", track.name(), track.kind().type_name());
        Ok(track)
    }

    fn point_mass(&self, context: &TrackerContext) -> Track {
        let mut track = match (self.fixed, self.steps.first()) {
            (true, Some(first)) => Track::fixed_point_mass(context.clone(), self.name.clone(), Point::new(first.x, first.y)),
            _ => Track::point_mass(context.clone(), self.name.clone()),
        };
        if !self.fixed {
            for step in &self.steps {
                track.steps.set_step(step.frame, Some(Step::at(step.frame, step.x, step.y)));
            }
        }
        track
    }

    fn data_track(&self, context: &TrackerContext) -> Result<Track, TrackError> {
        let (Some(x), Some(y)) = (self.x.clone(), self.y.clone()) else {
            return Err(DataError::format("Position data (x, y) not defined").into());
        };
        let series = ExternalDataSeries::new(x, y, self.t.clone())?;
        let rows = series.len();
        let clip = match self.dataclip.clone() {
            Some(fields) => fields.into_clip(rows),
            None => DataClip::new(rows),
        };
        let mut model = DataPointModel::new(series, Arc::new(RwLock::new(clip)), self.pointname.clone().unwrap_or_default());
        model.source_name = self.source.clone();

        let mut track = Track::with_kind(context.clone(), self.name.clone(), TrackKind::DataPoint(model));
        track.start_frame = self.start_frame;
        track.use_data_time = self.use_data_time;
        if !self.color.is_empty() {
            track.color = self.color.clone();
        }

        let shared = Arc::clone(model_clip(&track)?);
        for i in 0.. {
            let (Some(x), Some(y)) = (self.point_series("x", i)?, self.point_series("y", i)?) else {
                break;
            };
            let t = self.t.clone().filter(|t| t.len() == x.len());
            let series = ExternalDataSeries::new(x, y, t)?;
            let name = self.point_value::<String>("pointname", i)?.unwrap_or_default();
            let mut follower = track.new_follower(series, &shared, name);
            if let Some(mass) = self.point_value::<f64>("mass", i)? {
                follower.mass = mass;
            }
            if let Some(color) = self.point_value::<String>("color", i)? {
                follower.color = color;
            }
            if let Some(footprint) = self.point_value::<String>("footprint", i)? {
                follower.footprint = footprint;
            }
            if let Some(id) = self.point_value::<TrackId>("id", i)? {
                follower.id = id;
            }
            if let Some(model) = follower.kind.as_data_point_mut() {
                model.source_name = self.source.clone();
            }
            track.followers.push(follower);
        }
        Ok(track)
    }
}

fn model_clip(track: &Track) -> Result<&Arc<RwLock<DataClip>>, TrackError> {
    track
        .kind()
        .as_data_point()
        .map(DataPointModel::clip)
        .ok_or(TrackError::NotADataTrack(track.id()))
}

/// Saved form of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub tracks: Vec<TrackDocument>,
}

impl SessionDocument {
    pub fn to_json(&self) -> Result<String, TrackError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, TrackError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), TrackError> {
        std::fs::write(path, self.to_json()?).map_err(DataError::from)?;
        info!("saved {} tracks to {}", self.tracks.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, TrackError> {
        let text = std::fs::read_to_string(path).map_err(DataError::from)?;
        Self::from_json(&text)
    }
}

impl TrackSet {
    pub fn to_document(&self) -> SessionDocument {
        SessionDocument {
            tracks: self.tracks().map(TrackDocument::from_track).collect(),
        }
    }

    /// Rebuild a session. Tracks are added in document order, so a
    /// dependent track finds the members saved before it.
    pub fn from_document(context: TrackerContext, document: SessionDocument) -> Result<Self, TrackError> {
        let mut set = TrackSet::new(context.clone());
        for doc in document.tracks {
            let mut track = doc.into_track(&context)?;
            track.adjust_video_clip();
            if track.use_data_time() {
                track.set_use_data_time(true)?;
            }
            set.add(track);
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mt_core::{TrackerSettings, VideoClip, VideoPlayer};
    use mt_data::table::Column;
    use mt_data::DataTable;

    fn context_with_video(frames: usize) -> TrackerContext {
        let context = TrackerContext::new(TrackerSettings::default());
        context.attach_player(VideoPlayer::new(VideoClip::new(frames), 40.0));
        context
    }

    fn session(context: &TrackerContext) -> TrackSet {
        let mut set = TrackSet::new(context.clone());

        let mut ball = Track::point_mass(context.clone(), "ball");
        ball.mark_step(0, Point::new(0.0, 0.0));
        ball.mark_step(1, Point::new(1.0, 0.5));
        ball.mark_step(2, Point::new(2.0, 1.0));
        ball.set_mass(2.0);
        ball.set_constant(Constant::new("g", 9.8));
        ball.define_column("p_x", "mass * v_x");
        ball.set_constant(Constant::new("mass", 2.0));
        set.add(ball);

        let table = DataTable::from_columns(
            "pair",
            vec![
                Column::new("x_A", vec![0.0, 1.0, 2.0, 3.0]),
                Column::new("y_A", vec![0.0, 1.0, 2.0, 3.0]),
                Column::new("x_B", vec![4.0, 5.0, 6.0, 7.0]),
                Column::new("y_B", vec![4.0, 5.0, 6.0, 7.0]),
            ],
        );
        let mut body = Track::data_track(context.clone(), "body", &table).unwrap();
        body.set_start_frame(3).unwrap();
        body.set_stride(2).unwrap();
        let follower = body.followers()[0].id();
        set.add(body);

        set.add(Track::center_of_mass(context.clone(), "cm", vec![follower]));
        set
    }

    #[test]
    fn test_session_survives_json() {
        let context = context_with_video(20);
        let json = session(&context).to_document().to_json().unwrap();

        let context = context_with_video(20);
        let document = SessionDocument::from_json(&json).unwrap();
        let mut set = TrackSet::from_document(context, document).unwrap();
        let names: Vec<&str> = set.tracks().map(Track::name).collect();
        assert_eq!(names, vec!["ball", "body", "cm"]);

        let ids: Vec<TrackId> = set.tracks().map(Track::id).collect();
        let data = set.track_data(ids[0]).unwrap();
        assert_eq!(data.row_count(), 3);
        assert!((data.values("p_x").unwrap()[1] - 50.0).abs() < 1e-6);
        assert_eq!(data.constants().get("g"), Some(&9.8));

        let body = set.get(ids[1]).unwrap();
        assert_eq!(body.start_frame(), 3);
        assert_eq!(body.data_clip().unwrap().stride(), 2);
        assert_eq!(body.followers()[0].full_name(), "body B");
        assert_eq!(body.followers()[0].leader(), Some(ids[1]));

        let cm = set.get_mut(ids[2]).unwrap();
        assert_eq!(cm.step_at(4).unwrap().position(), Some(Point::new(6.0, 6.0)));
        assert!(cm.step_at(5).is_none());
    }

    #[test]
    fn test_follower_keys() {
        let context = context_with_video(20);
        let set = session(&context);
        let doc = &set.to_document().tracks[1];
        assert_eq!(doc.kind, "DataTrack");
        assert_eq!(doc.points.get("pointname0"), Some(&Value::from("B")));
        assert_eq!(doc.points.get("x0"), Some(&serde_json::json!([4.0, 5.0, 6.0, 7.0])));
        assert!(doc.points.contains_key("color0"));
        assert!(!doc.points.contains_key("x1"));
    }

    #[test]
    fn test_loading_tolerates_missing_point_keys() {
        let json = r#"{
            "tracks": [{
                "type": "DataTrack",
                "name": "sled",
                "x": [0, 1, 2, 3, 4, 5],
                "y": [0, 2, 4, 6, 8, 10],
                "x0": [1, 1, 1, 1, 1, 1],
                "dataclip": {"startIndex": 4, "stride": 1, "length": 6}
            }]
        }"#;
        let context = context_with_video(20);
        let set = TrackSet::from_document(context, SessionDocument::from_json(json).unwrap()).unwrap();
        let track = set.tracks().next().unwrap();
        assert!(track.followers().is_empty());
        assert_eq!(track.mass(), 1.0);
        let clip = track.data_clip().unwrap();
        assert_eq!(clip.data_length(), 6);
        assert_eq!(clip.start_index(), 4);
        assert_eq!(clip.available_clip_length(), 2);
    }

    #[test]
    fn test_bad_documents_are_rejected() {
        let context = context_with_video(20);
        let unknown = SessionDocument::from_json(r#"{"tracks": [{"type": "Ruler", "name": "r"}]}"#).unwrap();
        assert!(matches!(
            TrackSet::from_document(context.clone(), unknown),
            Err(TrackError::Data(DataError::DataFormat(_)))
        ));

        let ragged = SessionDocument::from_json(r#"{"tracks": [{"type": "DataTrack", "name": "d", "x": [1, 2], "y": [1]}]}"#).unwrap();
        assert!(TrackSet::from_document(context, ragged).is_err());
        assert!(matches!(SessionDocument::from_json("{"), Err(TrackError::Document(_))));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let context = context_with_video(20);
        let document = session(&context).to_document();
        document.save(&path).unwrap();
        assert_eq!(SessionDocument::load(&path).unwrap(), document);
    }
}
