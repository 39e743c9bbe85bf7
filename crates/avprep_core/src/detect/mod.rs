//! Face and landmark detection.
//!
//! Detection itself is an external capability behind [`FaceModel`]. This
//! module picks the primary face per frame and turns a decoded clip into a
//! [`LandmarkSequence`] where frames without a face are `None`.

mod external;
mod pool;

use image::RgbImage;

pub use external::{ExternalModel, ExternalModelFactory};
pub use pool::ModelPool;

use crate::media::{FrameSource, MediaError};
use crate::models::{Keypoints, LandmarkSequence};

/// Axis-aligned face bounding box in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl FaceBox {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Box area; inverted boxes have zero area.
    pub fn area(&self) -> f64 {
        (self.right - self.left).max(0.0) * (self.bottom - self.top).max(0.0)
    }
}

/// Detection errors.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("Failed to start detector '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Detector I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Detector protocol error: {0}")]
    Protocol(String),

    #[error("Expected {expected} keypoints, detector returned {found}")]
    KeypointCount { expected: usize, found: usize },

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl DetectError {
    /// Whether retrying with a fresh model may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DetectError::Io(_) | DetectError::Protocol(_) | DetectError::KeypointCount { .. }
        )
    }

    /// Whether the model that produced this error can no longer be trusted.
    ///
    /// Decode errors and malformed answers on a complete line leave the
    /// detector stream in sync; a broken pipe or a garbled reply does not.
    pub fn breaks_model(&self) -> bool {
        matches!(self, DetectError::Io(_) | DetectError::Protocol(_))
    }
}

/// A face detector with a landmark predictor.
pub trait FaceModel: Send {
    /// Detect faces in `frame`.
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<FaceBox>, DetectError>;

    /// Predict keypoints for `face` on the frame last passed to [`detect`].
    ///
    /// [`detect`]: FaceModel::detect
    fn landmarks(&mut self, face: &FaceBox) -> Result<Keypoints, DetectError>;
}

/// Creates [`FaceModel`] instances for a [`ModelPool`].
pub trait FaceModelFactory: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    fn create(&self) -> Result<Box<dyn FaceModel>, DetectError>;
}

/// Largest face by area; the first one wins ties.
pub fn select_primary_face(faces: &[FaceBox]) -> Option<FaceBox> {
    faces.iter().copied().fold(None, |best, face| match best {
        Some(b) if b.area() >= face.area() => Some(b),
        _ => Some(face),
    })
}

/// Landmarks of the primary face in one frame, `None` without a face.
pub fn detect_frame(
    model: &mut dyn FaceModel,
    frame: &RgbImage,
    num_keypoints: usize,
) -> Result<Option<Keypoints>, DetectError> {
    let faces = model.detect(frame)?;
    let Some(face) = select_primary_face(&faces) else {
        return Ok(None);
    };
    let keypoints = model.landmarks(&face)?;
    if keypoints.len() != num_keypoints {
        return Err(DetectError::KeypointCount {
            expected: num_keypoints,
            found: keypoints.len(),
        });
    }
    Ok(Some(keypoints))
}

/// Run detection on every frame of `source`.
pub fn detect_sequence(
    model: &mut dyn FaceModel,
    source: &mut dyn FrameSource,
    num_keypoints: usize,
) -> Result<LandmarkSequence, DetectError> {
    let mut seq = LandmarkSequence::default();
    while let Some(frame) = source.next_frame()? {
        seq.push(detect_frame(model, &frame, num_keypoints)?);
    }
    Ok(seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaResult, VideoInfo};
    use crate::models::Point2;

    struct StubModel {
        faces: Vec<FaceBox>,
        last_face: Option<FaceBox>,
    }

    impl FaceModel for StubModel {
        fn detect(&mut self, frame: &RgbImage) -> Result<Vec<FaceBox>, DetectError> {
            // Dark frames have no face
            if frame.get_pixel(0, 0)[0] == 0 {
                return Ok(Vec::new());
            }
            Ok(self.faces.clone())
        }

        fn landmarks(&mut self, face: &FaceBox) -> Result<Keypoints, DetectError> {
            self.last_face = Some(*face);
            Ok(Keypoints::new(vec![Point2::new(face.left, face.top)]))
        }
    }

    struct StubSource {
        info: VideoInfo,
        values: Vec<u8>,
    }

    impl FrameSource for StubSource {
        fn info(&self) -> &VideoInfo {
            &self.info
        }

        fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
            if self.values.is_empty() {
                return Ok(None);
            }
            let v = self.values.remove(0);
            Ok(Some(RgbImage::from_pixel(2, 2, image::Rgb([v, v, v]))))
        }
    }

    #[test]
    fn largest_face_wins() {
        let small = FaceBox::new(0.0, 0.0, 10.0, 10.0);
        let large = FaceBox::new(50.0, 50.0, 80.0, 90.0);
        assert_eq!(select_primary_face(&[small, large]), Some(large));
        assert_eq!(select_primary_face(&[large, small]), Some(large));
        assert_eq!(select_primary_face(&[]), None);
    }

    #[test]
    fn ties_keep_first_face() {
        let a = FaceBox::new(0.0, 0.0, 10.0, 10.0);
        let b = FaceBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(select_primary_face(&[a, b]), Some(a));
    }

    #[test]
    fn faceless_frames_become_missing() {
        let mut model = StubModel {
            faces: vec![
                FaceBox::new(1.0, 1.0, 5.0, 5.0),
                FaceBox::new(2.0, 2.0, 20.0, 20.0),
            ],
            last_face: None,
        };
        let mut source = StubSource {
            info: VideoInfo {
                width: 2,
                height: 2,
                fps: 25.0,
                fps_fraction: (25, 1),
                duration_secs: 0.12,
                frame_count: 3,
            },
            values: vec![200, 0, 200],
        };

        let seq = detect_sequence(&mut model, &mut source, 1).unwrap();
        assert_eq!(seq.len(), 3);
        assert!(seq.frames()[1].is_none());
        assert_eq!(seq.valid_count(), 2);
        assert_eq!(model.last_face, Some(FaceBox::new(2.0, 2.0, 20.0, 20.0)));
    }

    #[test]
    fn wrong_keypoint_count_is_an_error() {
        let mut model = StubModel {
            faces: vec![FaceBox::new(0.0, 0.0, 1.0, 1.0)],
            last_face: None,
        };
        let frame = RgbImage::from_pixel(2, 2, image::Rgb([9, 9, 9]));
        let err = detect_frame(&mut model, &frame, 68).unwrap_err();
        assert!(matches!(err, DetectError::KeypointCount { expected: 68, found: 1 }));
        assert!(err.is_retryable());
        assert!(!err.breaks_model());
    }

    #[test]
    fn only_stream_errors_break_a_model() {
        assert!(DetectError::Protocol("garbled".to_string()).breaks_model());
        let pipe = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(DetectError::Io(pipe).breaks_model());
        assert!(!DetectError::Media(MediaError::SourceNotFound("a.mp4".into())).breaks_model());
    }
}
