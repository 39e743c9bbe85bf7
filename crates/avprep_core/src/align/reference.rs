//! Canonical reference face and ROI placement.

use std::path::Path;

use super::AlignError;
use crate::config::AlignmentSettings;
use crate::landmarks::read_reference;
use crate::models::{Keypoints, Point2};

/// Crop size in reference coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiWindow {
    pub width: u32,
    pub height: u32,
}

impl RoiWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// ROI rectangle placed in reference coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiPlacement {
    /// Left edge (integral).
    pub x0: f64,
    /// Top edge (integral).
    pub y0: f64,
    pub width: u32,
    pub height: u32,
}

/// Reference keypoints that every frame is aligned to.
///
/// Built once per worker and shared read-only between clip tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceFace {
    keypoints: Keypoints,
    stable_indices: Vec<usize>,
    stable_points: Vec<Point2>,
    mouth_indices: Vec<usize>,
    mouth_center: Point2,
}

impl ReferenceFace {
    /// Create a reference face.
    ///
    /// Fails if any index is out of range or the stable points coincide.
    pub fn new(
        keypoints: Keypoints,
        stable_indices: Vec<usize>,
        mouth_indices: Vec<usize>,
    ) -> Result<Self, AlignError> {
        let stable_points = keypoints.select(&stable_indices).ok_or_else(|| {
            AlignError::InvalidReference(format!(
                "stable index out of range for {} keypoints",
                keypoints.len()
            ))
        })?;
        if stable_points.len() < 2 {
            return Err(AlignError::InvalidReference(
                "need at least 2 stable points".to_string(),
            ));
        }
        let first = stable_points[0];
        if stable_points
            .iter()
            .all(|p| (p.x - first.x).abs() < 1e-9 && (p.y - first.y).abs() < 1e-9)
        {
            return Err(AlignError::InvalidReference(
                "stable points coincide".to_string(),
            ));
        }

        let mouth_center = keypoints.centroid(&mouth_indices).ok_or_else(|| {
            AlignError::InvalidReference(format!(
                "mouth indices empty or out of range for {} keypoints",
                keypoints.len()
            ))
        })?;
        if !keypoints.is_finite() {
            return Err(AlignError::InvalidReference(
                "non-finite coordinate".to_string(),
            ));
        }

        Ok(Self {
            keypoints,
            stable_indices,
            stable_points,
            mouth_indices,
            mouth_center,
        })
    }

    /// Load the reference face file using the configured indices.
    pub fn load(
        path: &Path,
        num_keypoints: usize,
        settings: &AlignmentSettings,
    ) -> Result<Self, AlignError> {
        let keypoints = read_reference(path, num_keypoints)
            .map_err(|e| AlignError::InvalidReference(e.to_string()))?;
        let reference = Self::new(
            keypoints,
            settings.stable_points.clone(),
            settings.mouth_points.clone(),
        )?;
        tracing::info!(
            "[Align] Loaded reference face from {} ({} keypoints, mouth at {:.1},{:.1})",
            path.display(),
            num_keypoints,
            reference.mouth_center.x,
            reference.mouth_center.y
        );
        Ok(reference)
    }

    pub fn keypoints(&self) -> &Keypoints {
        &self.keypoints
    }

    pub fn stable_indices(&self) -> &[usize] {
        &self.stable_indices
    }

    /// Reference positions of the stable keypoints.
    pub fn stable_points(&self) -> &[Point2] {
        &self.stable_points
    }

    pub fn mouth_indices(&self) -> &[usize] {
        &self.mouth_indices
    }

    /// Centroid of the mouth keypoints.
    pub fn mouth_center(&self) -> Point2 {
        self.mouth_center
    }

    /// Place `window` centered on the mouth, snapped to whole pixels.
    pub fn place_roi(&self, window: RoiWindow) -> RoiPlacement {
        RoiPlacement {
            x0: (self.mouth_center.x - window.width as f64 / 2.0).round(),
            y0: (self.mouth_center.y - window.height as f64 / 2.0).round(),
            width: window.width,
            height: window.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face() -> Keypoints {
        // 3 stable points, 2 mouth points
        Keypoints::from_flat(&[0.0, 0.0, 20.0, 0.0, 10.0, 10.0, 8.0, 30.0, 12.0, 30.0]).unwrap()
    }

    #[test]
    fn roi_is_centered_on_mouth() {
        let reference = ReferenceFace::new(face(), vec![0, 1, 2], vec![3, 4]).unwrap();
        assert_eq!(reference.mouth_center(), Point2::new(10.0, 30.0));
        let roi = reference.place_roi(RoiWindow::new(8, 6));
        assert_eq!((roi.x0, roi.y0), (6.0, 27.0));
    }

    #[test]
    fn rejects_bad_indices() {
        assert!(ReferenceFace::new(face(), vec![0, 9], vec![3]).is_err());
        assert!(ReferenceFace::new(face(), vec![0, 1], vec![]).is_err());
        assert!(ReferenceFace::new(face(), vec![0], vec![3]).is_err());
    }

    #[test]
    fn rejects_coincident_stable_points() {
        let kp = Keypoints::from_flat(&[1.0, 1.0, 1.0, 1.0, 5.0, 5.0]).unwrap();
        assert!(matches!(
            ReferenceFace::new(kp, vec![0, 1], vec![2]),
            Err(AlignError::InvalidReference(_))
        ));
    }
}
