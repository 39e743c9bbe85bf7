//! Inverse-mapped bilinear cropping.

use image::{Rgb, RgbImage};

use super::reference::RoiPlacement;
use super::transform::AffineTransform;
use crate::models::Point2;

const BLACK: [f64; 3] = [0.0, 0.0, 0.0];

fn pixel(frame: &RgbImage, x: i64, y: i64) -> [f64; 3] {
    if x < 0 || y < 0 || x >= frame.width() as i64 || y >= frame.height() as i64 {
        return BLACK;
    }
    let Rgb([r, g, b]) = *frame.get_pixel(x as u32, y as u32);
    [r as f64, g as f64, b as f64]
}

/// Bilinear sample at `p`; positions outside the frame read as black.
///
/// Pixel centers sit on integer coordinates, so sampling at an integer
/// position returns that pixel unchanged.
pub fn sample_bilinear(frame: &RgbImage, p: Point2) -> Rgb<u8> {
    if !p.is_finite() {
        return Rgb([0, 0, 0]);
    }
    let (x0, y0) = (p.x.floor(), p.y.floor());
    let (fx, fy) = (p.x - x0, p.y - y0);
    let (ix, iy) = (x0 as i64, y0 as i64);

    let corners = [
        (pixel(frame, ix, iy), (1.0 - fx) * (1.0 - fy)),
        (pixel(frame, ix + 1, iy), fx * (1.0 - fy)),
        (pixel(frame, ix, iy + 1), (1.0 - fx) * fy),
        (pixel(frame, ix + 1, iy + 1), fx * fy),
    ];

    let mut out = [0u8; 3];
    for (c, value) in out.iter_mut().enumerate() {
        let v: f64 = corners.iter().map(|(px, w)| px[c] * w).sum();
        *value = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Crop `roi` (reference coordinates) out of `frame`.
///
/// `to_frame` maps reference coordinates into the frame, i.e. it is the
/// inverse of the frame-to-reference alignment. This is equivalent to
/// warping the whole frame into reference space and cropping there.
pub fn crop_roi(frame: &RgbImage, to_frame: &AffineTransform, roi: &RoiPlacement) -> RgbImage {
    RgbImage::from_fn(roi.width, roi.height, |u, v| {
        let reference_point = Point2::new(roi.x0 + u as f64, roi.y0 + v as f64);
        sample_bilinear(frame, to_frame.apply(reference_point))
    })
}
