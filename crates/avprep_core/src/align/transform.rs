//! 2D similarity transforms.

use crate::models::Point2;

/// Squared spread below which a point set is treated as coincident.
const MIN_SPREAD: f64 = 1e-9;

/// A 2x3 affine matrix `[[a, b, tx], [c, d, ty]]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub m: [[f64; 3]; 2],
}

impl AffineTransform {
    pub const IDENTITY: AffineTransform = AffineTransform {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    };

    /// Similarity with scale-rotation terms `(c, s)` and translation.
    ///
    /// `c = scale * cos(theta)`, `s = scale * sin(theta)`.
    pub fn similarity(c: f64, s: f64, tx: f64, ty: f64) -> Self {
        Self {
            m: [[c, -s, tx], [s, c, ty]],
        }
    }

    /// Map a point.
    pub fn apply(&self, p: Point2) -> Point2 {
        let m = &self.m;
        Point2::new(
            m[0][0] * p.x + m[0][1] * p.y + m[0][2],
            m[1][0] * p.x + m[1][1] * p.y + m[1][2],
        )
    }

    /// Uniform scale factor (exact for similarity transforms).
    pub fn scale(&self) -> f64 {
        let det = self.m[0][0] * self.m[1][1] - self.m[0][1] * self.m[1][0];
        det.abs().sqrt()
    }

    /// Whether every coefficient is finite.
    pub fn is_finite(&self) -> bool {
        self.m.iter().flatten().all(|v| v.is_finite())
    }

    /// Inverse transform, or `None` if singular.
    pub fn inverse(&self) -> Option<AffineTransform> {
        let [[a, b, tx], [c, d, ty]] = self.m;
        let det = a * d - b * c;
        if det.abs() < f64::EPSILON || !det.is_finite() {
            return None;
        }
        let (ia, ib, ic, id) = (d / det, -b / det, -c / det, a / det);
        Some(AffineTransform {
            m: [
                [ia, ib, -(ia * tx + ib * ty)],
                [ic, id, -(ic * tx + id * ty)],
            ],
        })
    }

    /// Coefficient-wise comparison.
    pub fn approx_eq(&self, other: &AffineTransform, tol: f64) -> bool {
        self.m
            .iter()
            .flatten()
            .zip(other.m.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= tol)
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

fn mean(points: &[Point2]) -> Point2 {
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point2::new(sx / n, sy / n)
}

/// Least-squares similarity transform mapping `src` onto `dst` (Umeyama).
///
/// Rotation, uniform scale and translation only; reflections are never
/// produced. Returns `None` when the point sets differ in length, have
/// fewer than two points, or `src` has no spread.
pub fn estimate_similarity(src: &[Point2], dst: &[Point2]) -> Option<AffineTransform> {
    if src.len() != dst.len() || src.len() < 2 {
        return None;
    }

    let ms = mean(src);
    let md = mean(dst);

    // a = sum <s, d>, b = sum s x d, spread = sum |s|^2 over centered points
    let (mut a, mut b, mut spread) = (0.0, 0.0, 0.0);
    for (s, d) in src.iter().zip(dst) {
        let (sx, sy) = (s.x - ms.x, s.y - ms.y);
        let (dx, dy) = (d.x - md.x, d.y - md.y);
        a += sx * dx + sy * dy;
        b += sx * dy - sy * dx;
        spread += sx * sx + sy * sy;
    }
    if spread < MIN_SPREAD || !spread.is_finite() {
        return None;
    }

    let c = a / spread;
    let s = b / spread;
    let tx = md.x - (c * ms.x - s * ms.y);
    let ty = md.y - (s * ms.x + c * ms.y);
    let t = AffineTransform::similarity(c, s, tx, ty);
    t.is_finite().then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Point2> {
        vec![
            Point2::new(10.0, 10.0),
            Point2::new(30.0, 10.0),
            Point2::new(30.0, 30.0),
            Point2::new(10.0, 30.0),
        ]
    }

    #[test]
    fn identical_points_give_exact_identity() {
        let pts = square();
        let t = estimate_similarity(&pts, &pts).unwrap();
        assert_eq!(t, AffineTransform::IDENTITY);
    }

    #[test]
    fn recovers_known_similarity() {
        let truth = AffineTransform::similarity(
            2.0 * 30f64.to_radians().cos(),
            2.0 * 30f64.to_radians().sin(),
            5.0,
            -3.0,
        );
        let src = square();
        let dst: Vec<Point2> = src.iter().map(|&p| truth.apply(p)).collect();
        let t = estimate_similarity(&src, &dst).unwrap();
        assert!(t.approx_eq(&truth, 1e-9));
        assert!((t.scale() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn never_reflects() {
        let src = square();
        let mirrored: Vec<Point2> = src.iter().map(|p| Point2::new(-p.x, p.y)).collect();
        let t = estimate_similarity(&src, &mirrored).unwrap();
        let det = t.m[0][0] * t.m[1][1] - t.m[0][1] * t.m[1][0];
        assert!(det >= 0.0);
    }

    #[test]
    fn coincident_points_are_degenerate() {
        let src = vec![Point2::new(5.0, 5.0); 4];
        assert!(estimate_similarity(&src, &square()).is_none());
        assert!(estimate_similarity(&square()[..1], &square()[..1]).is_none());
    }

    #[test]
    fn inverse_round_trips() {
        let t = AffineTransform::similarity(0.5, 0.25, 3.0, 4.0);
        let inv = t.inverse().unwrap();
        let p = Point2::new(7.0, -2.0);
        let back = inv.apply(t.apply(p));
        assert!((back.x - p.x).abs() < 1e-12 && (back.y - p.y).abs() < 1e-12);
        assert_eq!(AffineTransform::IDENTITY.inverse(), Some(AffineTransform::IDENTITY));
        assert!(AffineTransform::similarity(0.0, 0.0, 1.0, 1.0).inverse().is_none());
    }
}
