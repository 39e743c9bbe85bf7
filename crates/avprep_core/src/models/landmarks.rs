//! Facial landmark types.

use serde::{Deserialize, Serialize};

/// A 2D point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    /// Create a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Linear blend `a * (1 - t) + b * t`.
    ///
    /// At `t = 0.5` this is exactly the midpoint.
    pub fn lerp(a: Point2, b: Point2, t: f64) -> Point2 {
        Point2::new(a.x * (1.0 - t) + b.x * t, a.y * (1.0 - t) + b.y * t)
    }

    /// Whether both coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A fixed-length set of keypoints detected on one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoints(Vec<Point2>);

impl Keypoints {
    /// Wrap a list of points.
    pub fn new(points: Vec<Point2>) -> Self {
        Self(points)
    }

    /// Build from interleaved `x0 y0 x1 y1 ...` values.
    ///
    /// Returns `None` for an odd number of values.
    pub fn from_flat(values: &[f64]) -> Option<Self> {
        if values.len() % 2 != 0 {
            return None;
        }
        Some(Self(
            values
                .chunks_exact(2)
                .map(|xy| Point2::new(xy[0], xy[1]))
                .collect(),
        ))
    }

    /// Interleaved `x0 y0 x1 y1 ...` values.
    pub fn to_flat(&self) -> Vec<f64> {
        self.0.iter().flat_map(|p| [p.x, p.y]).collect()
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no points.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All points in order.
    pub fn points(&self) -> &[Point2] {
        &self.0
    }

    /// Point at `index`.
    pub fn get(&self, index: usize) -> Option<Point2> {
        self.0.get(index).copied()
    }

    /// Points at the given indices, in index order.
    ///
    /// Returns `None` if any index is out of range.
    pub fn select(&self, indices: &[usize]) -> Option<Vec<Point2>> {
        indices.iter().map(|&i| self.get(i)).collect()
    }

    /// Mean of the points at the given indices.
    pub fn centroid(&self, indices: &[usize]) -> Option<Point2> {
        let points = self.select(indices)?;
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point2::new(sx / n, sy / n))
    }

    /// Point-wise linear blend of two keypoint sets of equal length.
    pub fn lerp(a: &Keypoints, b: &Keypoints, t: f64) -> Keypoints {
        Keypoints(
            a.0.iter()
                .zip(&b.0)
                .map(|(&pa, &pb)| Point2::lerp(pa, pb, t))
                .collect(),
        )
    }

    /// Point-wise mean of several keypoint sets of equal length.
    pub fn mean(sets: &[Keypoints]) -> Option<Keypoints> {
        let first = sets.first()?;
        let n = sets.len() as f64;
        let mut sums = vec![Point2::default(); first.len()];
        for set in sets {
            for (sum, p) in sums.iter_mut().zip(&set.0) {
                sum.x += p.x;
                sum.y += p.y;
            }
        }
        Some(Keypoints(
            sums.into_iter()
                .map(|s| Point2::new(s.x / n, s.y / n))
                .collect(),
        ))
    }

    /// Whether every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(Point2::is_finite)
    }
}

/// Per-frame landmarks of one clip.
///
/// One entry per decoded frame; `None` marks a frame where no face was found.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandmarkSequence {
    frames: Vec<Option<Keypoints>>,
}

impl LandmarkSequence {
    /// Create a sequence from per-frame entries.
    pub fn new(frames: Vec<Option<Keypoints>>) -> Self {
        Self { frames }
    }

    /// Append the next frame's landmarks.
    pub fn push(&mut self, frame: Option<Keypoints>) {
        self.frames.push(frame);
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the sequence has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Per-frame entries.
    pub fn frames(&self) -> &[Option<Keypoints>] {
        &self.frames
    }

    /// Number of frames with a detected face.
    pub fn valid_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_some()).count()
    }

    /// Whether no frame has a detected face.
    pub fn is_all_missing(&self) -> bool {
        self.valid_count() == 0
    }

    /// Whether every frame has a detected face.
    pub fn is_complete(&self) -> bool {
        self.frames.iter().all(Option::is_some)
    }
}
