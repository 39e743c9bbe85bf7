//! Gap filling and temporal smoothing of landmark tracks.

use super::LandmarkError;
use crate::models::{Keypoints, LandmarkSequence};

/// Fill missing frames.
///
/// Interior gaps are linearly interpolated, point by point, between the
/// bounding detected frames. Leading and trailing gaps repeat the nearest
/// detected frame.
pub fn interpolate_missing(seq: &LandmarkSequence) -> Result<Vec<Keypoints>, LandmarkError> {
    let frames = seq.frames();
    let valid: Vec<usize> = frames
        .iter()
        .enumerate()
        .filter_map(|(i, f)| f.as_ref().map(|_| i))
        .collect();

    let (first, last) = match (valid.first(), valid.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Err(LandmarkError::NothingToSmooth),
    };

    let mut filled: Vec<Keypoints> = Vec::with_capacity(frames.len());
    let first_kp = frames[first].clone().unwrap_or_default();
    filled.extend(std::iter::repeat(first_kp).take(first));

    for pair in valid.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let (Some(ka), Some(kb)) = (&frames[a], &frames[b]) else {
            continue;
        };
        filled.push(ka.clone());
        let span = (b - a) as f64;
        for k in a + 1..b {
            let t = (k - a) as f64 / span;
            filled.push(Keypoints::lerp(ka, kb, t));
        }
    }

    let last_kp = frames[last].clone().unwrap_or_default();
    filled.push(last_kp.clone());
    filled.extend(std::iter::repeat(last_kp).take(frames.len() - last - 1));

    Ok(filled)
}

/// Centered moving average over `window` frames.
///
/// Frame `i` averages `[i - (window - 1) / 2, i + window / 2]`, clipped to
/// the track, so windows shrink at both ends. A window of 0 or 1 returns
/// the input unchanged.
pub fn moving_average(frames: &[Keypoints], window: usize) -> Vec<Keypoints> {
    if window <= 1 || frames.len() <= 1 {
        return frames.to_vec();
    }

    let before = (window - 1) / 2;
    let after = window / 2;
    (0..frames.len())
        .map(|i| {
            let start = i.saturating_sub(before);
            let end = (i + after + 1).min(frames.len());
            Keypoints::mean(&frames[start..end]).unwrap_or_else(|| frames[i].clone())
        })
        .collect()
}

/// Interpolate missing frames, then smooth.
///
/// The result has one keypoint set per input frame.
pub fn fill_and_smooth(
    seq: &LandmarkSequence,
    window: usize,
) -> Result<Vec<Keypoints>, LandmarkError> {
    let filled = interpolate_missing(seq)?;
    Ok(moving_average(&filled, window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Point2;

    fn kp(x: f64, y: f64) -> Keypoints {
        Keypoints::new(vec![Point2::new(x, y), Point2::new(x + 1.0, y - 1.0)])
    }

    #[test]
    fn single_gap_is_exact_midpoint() {
        let seq = LandmarkSequence::new(vec![Some(kp(0.0, 10.0)), None, Some(kp(4.0, 2.0))]);
        let filled = interpolate_missing(&seq).unwrap();
        assert_eq!(filled.len(), 3);
        assert_eq!(filled[1], kp(2.0, 6.0));
    }

    #[test]
    fn longer_gap_is_linear() {
        let seq = LandmarkSequence::new(vec![
            Some(kp(0.0, 0.0)),
            None,
            None,
            None,
            Some(kp(8.0, 0.0)),
        ]);
        let xs: Vec<f64> = interpolate_missing(&seq)
            .unwrap()
            .iter()
            .map(|k| k.get(0).unwrap().x)
            .collect();
        assert_eq!(xs, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn edges_hold_nearest_detection() {
        let seq = LandmarkSequence::new(vec![
            None,
            None,
            Some(kp(1.0, 1.0)),
            Some(kp(3.0, 3.0)),
            None,
        ]);
        let filled = interpolate_missing(&seq).unwrap();
        assert_eq!(filled[0], kp(1.0, 1.0));
        assert_eq!(filled[1], kp(1.0, 1.0));
        assert_eq!(filled[4], kp(3.0, 3.0));
    }

    #[test]
    fn all_missing_is_an_error() {
        let seq = LandmarkSequence::new(vec![None, None]);
        assert!(matches!(
            interpolate_missing(&seq),
            Err(LandmarkError::NothingToSmooth)
        ));
    }

    #[test]
    fn moving_average_shrinks_at_edges() {
        let frames: Vec<Keypoints> = [0.0, 3.0, 6.0, 9.0].iter().map(|&x| kp(x, 0.0)).collect();
        let smoothed = moving_average(&frames, 3);
        let xs: Vec<f64> = smoothed.iter().map(|k| k.get(0).unwrap().x).collect();
        assert_eq!(xs, vec![1.5, 3.0, 6.0, 7.5]);
    }

    #[test]
    fn window_of_one_is_identity() {
        let frames = vec![kp(0.0, 0.0), kp(5.0, 5.0)];
        assert_eq!(moving_average(&frames, 1), frames);
    }

    #[test]
    fn smoothing_constant_track_is_stable() {
        let seq = LandmarkSequence::new(vec![Some(kp(2.0, 2.0)), None, Some(kp(2.0, 2.0))]);
        let out = fill_and_smooth(&seq, 12).unwrap();
        assert_eq!(out, vec![kp(2.0, 2.0); 3]);
    }
}
