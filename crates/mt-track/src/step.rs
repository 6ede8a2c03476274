//! The state of a track at one frame

use serde::{Deserialize, Serialize};

/// A position in world coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A track's recorded state at exactly one frame.
///
/// Steps are immutable once built and shared as `Arc<Step>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    frame: usize,
    points: Vec<Point>,
}

impl Step {
    pub fn new(frame: usize, points: Vec<Point>) -> Self {
        Self { frame, points }
    }

    /// A single-point step
    pub fn at(frame: usize, x: f64, y: f64) -> Self {
        Self::new(frame, vec![Point::new(x, y)])
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The step's first point, if it has one
    pub fn position(&self) -> Option<Point> {
        self.points.first().copied()
    }

    /// Copy of this step placed at another frame
    pub fn with_frame(&self, frame: usize) -> Self {
        Self {
            frame,
            points: self.points.clone(),
        }
    }
}
