//! Mouth ROI alignment.
//!
//! For each frame a similarity transform is estimated from the frame's
//! stable keypoints to the reference face. The fixed ROI around the
//! reference mouth is then filled by mapping every ROI pixel back into the
//! source frame with bilinear sampling.
//!
//! Ill-conditioned frames reuse the last good transform. A clip whose first
//! frame cannot be aligned is unusable.

mod reference;
mod transform;
mod warp;

use std::sync::Arc;

use image::RgbImage;

pub use reference::{ReferenceFace, RoiPlacement, RoiWindow};
pub use transform::{estimate_similarity, AffineTransform};
pub use warp::{crop_roi, sample_bilinear};

use crate::config::AlignmentSettings;
use crate::media::{FrameSink, FrameSource, MediaError};
use crate::models::Keypoints;

/// Alignment errors.
#[derive(Debug, thiserror::Error)]
pub enum AlignError {
    #[error("Invalid reference face: {0}")]
    InvalidReference(String),

    #[error("First frame cannot be aligned: {0}")]
    NoInitialTransform(Degeneracy),

    #[error("Landmark track has {landmarks} frames but the video has {frames}")]
    FrameCountMismatch { landmarks: usize, frames: usize },

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

/// Why a per-frame solve was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Degeneracy {
    #[error("stable keypoints missing from landmark set")]
    MissingPoints,

    #[error("stable keypoints coincide")]
    Coincident,

    #[error("non-finite transform")]
    NonFinite,

    #[error("scale {0:.4} outside accepted range")]
    ScaleOutOfRange(f64),
}

/// Per-frame transforms of a clip, expressed as reference-to-frame maps
/// ready for cropping.
#[derive(Debug, Clone)]
pub struct AlignedTrack {
    pub to_frame: Vec<AffineTransform>,
    /// Frames that reused the previous transform.
    pub fallbacks: usize,
}

/// Statistics of one aligned clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignStats {
    pub frames: usize,
    pub fallbacks: usize,
}

/// Aligns landmark tracks to a shared reference face and crops the ROI.
#[derive(Debug, Clone)]
pub struct MouthAligner {
    reference: Arc<ReferenceFace>,
    roi: RoiPlacement,
    min_scale: f64,
    max_scale: f64,
}

impl MouthAligner {
    pub fn new(reference: Arc<ReferenceFace>, window: RoiWindow, min_scale: f64, max_scale: f64) -> Self {
        let roi = reference.place_roi(window);
        Self {
            reference,
            roi,
            min_scale,
            max_scale,
        }
    }

    /// Aligner configured from the `[alignment]` settings.
    pub fn from_settings(reference: Arc<ReferenceFace>, settings: &AlignmentSettings) -> Self {
        Self::new(
            reference,
            RoiWindow::new(settings.crop_width, settings.crop_height),
            settings.min_scale,
            settings.max_scale,
        )
    }

    pub fn reference(&self) -> &ReferenceFace {
        &self.reference
    }

    pub fn roi(&self) -> &RoiPlacement {
        &self.roi
    }

    /// Frame-to-reference transform for one frame's keypoints.
    pub fn solve(&self, keypoints: &Keypoints) -> Result<AffineTransform, Degeneracy> {
        let src = keypoints
            .select(self.reference.stable_indices())
            .ok_or(Degeneracy::MissingPoints)?;
        if src.iter().any(|p| !p.is_finite()) {
            return Err(Degeneracy::NonFinite);
        }
        let t = estimate_similarity(&src, self.reference.stable_points())
            .ok_or(Degeneracy::Coincident)?;
        let scale = t.scale();
        if !scale.is_finite() {
            return Err(Degeneracy::NonFinite);
        }
        if scale < self.min_scale || scale > self.max_scale {
            return Err(Degeneracy::ScaleOutOfRange(scale));
        }
        Ok(t)
    }

    /// Solve every frame of a smoothed track.
    ///
    /// Degenerate frames reuse the most recent valid transform. Fails if the
    /// first frame is degenerate.
    pub fn solve_track(&self, track: &[Keypoints]) -> Result<AlignedTrack, AlignError> {
        let mut to_frame: Vec<AffineTransform> = Vec::with_capacity(track.len());
        let mut fallbacks = 0;

        for (i, keypoints) in track.iter().enumerate() {
            let solved = self
                .solve(keypoints)
                .and_then(|t| t.inverse().ok_or(Degeneracy::NonFinite));
            let previous = to_frame.last().copied();
            match (solved, previous) {
                (Ok(inverse), _) => to_frame.push(inverse),
                (Err(reason), Some(previous)) => {
                    tracing::warn!(
                        "[Align] Frame {}: {}; reusing previous transform",
                        i,
                        reason
                    );
                    fallbacks += 1;
                    to_frame.push(previous);
                }
                (Err(reason), None) => return Err(AlignError::NoInitialTransform(reason)),
            }
        }

        Ok(AlignedTrack {
            to_frame,
            fallbacks,
        })
    }

    /// Crop one frame with a reference-to-frame transform.
    pub fn crop(&self, frame: &RgbImage, to_frame: &AffineTransform) -> RgbImage {
        crop_roi(frame, to_frame, &self.roi)
    }

    /// Align a whole clip: decode `source`, crop every frame, encode to `sink`.
    ///
    /// `track` must have exactly one entry per decoded frame.
    pub fn align_clip(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        track: &[Keypoints],
    ) -> Result<AlignStats, AlignError> {
        let aligned = self.solve_track(track)?;

        let mut frames = 0;
        while let Some(frame) = source.next_frame()? {
            let Some(to_frame) = aligned.to_frame.get(frames) else {
                // Drain to report the real length
                let mut extra = 1;
                while source.next_frame()?.is_some() {
                    extra += 1;
                }
                return Err(AlignError::FrameCountMismatch {
                    landmarks: track.len(),
                    frames: frames + extra,
                });
            };
            sink.write_frame(&self.crop(&frame, to_frame))?;
            frames += 1;
        }

        if frames != track.len() {
            return Err(AlignError::FrameCountMismatch {
                landmarks: track.len(),
                frames,
            });
        }

        Ok(AlignStats {
            frames,
            fallbacks: aligned.fallbacks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Point2;

    fn reference_kp() -> Keypoints {
        Keypoints::from_flat(&[4.0, 4.0, 12.0, 4.0, 8.0, 8.0, 7.0, 12.0, 9.0, 12.0]).unwrap()
    }

    fn aligner() -> MouthAligner {
        let reference = ReferenceFace::new(reference_kp(), vec![0, 1, 2], vec![3, 4]).unwrap();
        MouthAligner::new(Arc::new(reference), RoiWindow::new(4, 4), 0.05, 20.0)
    }

    fn shifted(dx: f64) -> Keypoints {
        Keypoints::new(
            reference_kp()
                .points()
                .iter()
                .map(|p| Point2::new(p.x + dx, p.y))
                .collect(),
        )
    }

    #[test]
    fn reference_landmarks_give_identity() {
        let t = aligner().solve(&reference_kp()).unwrap();
        assert_eq!(t, AffineTransform::IDENTITY);
    }

    #[test]
    fn translated_face_is_compensated() {
        let aligner = aligner();
        let track = aligner.solve_track(&[shifted(3.0)]).unwrap();
        let p = track.to_frame[0].apply(Point2::new(8.0, 8.0));
        assert!((p.x - 11.0).abs() < 1e-9 && (p.y - 8.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_frame_reuses_previous() {
        let aligner = aligner();
        let collapsed = Keypoints::new(vec![Point2::new(1.0, 1.0); 5]);
        let track = aligner
            .solve_track(&[shifted(1.0), collapsed, shifted(2.0)])
            .unwrap();
        assert_eq!(track.fallbacks, 1);
        assert_eq!(track.to_frame[1], track.to_frame[0]);
        assert_ne!(track.to_frame[2], track.to_frame[0]);
    }

    #[test]
    fn degenerate_first_frame_fails() {
        let aligner = aligner();
        let collapsed = Keypoints::new(vec![Point2::new(1.0, 1.0); 5]);
        assert!(matches!(
            aligner.solve_track(&[collapsed, reference_kp()]),
            Err(AlignError::NoInitialTransform(Degeneracy::Coincident))
        ));
    }

    #[test]
    fn scale_bounds_are_enforced() {
        let aligner = aligner();
        let huge = Keypoints::new(
            reference_kp()
                .points()
                .iter()
                .map(|p| Point2::new(p.x * 100.0, p.y * 100.0))
                .collect(),
        );
        assert!(matches!(
            aligner.solve(&huge),
            Err(Degeneracy::ScaleOutOfRange(_))
        ));
    }
}
