use std::ops::Mul;

/// An affine map between pixel space and world space.
///
/// Coefficients follow the GDAL/`affine` ordering:
/// ```text
/// x_world = a * col + b * row + c
/// y_world = d * col + e * row + f
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform(f64, f64, f64, f64, f64, f64);

impl AffineTransform {
    pub fn new(a: f64, b: f64, xoff: f64, d: f64, e: f64, yoff: f64) -> Self {
        Self(a, b, xoff, d, e, yoff)
    }

    pub fn identity() -> Self {
        Self(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
    }

    pub fn translation(xoff: f64, yoff: f64) -> Self {
        Self(1.0, 0.0, xoff, 0.0, 1.0, yoff)
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    pub fn a(&self) -> f64 {
        self.0
    }

    pub fn b(&self) -> f64 {
        self.1
    }

    pub fn c(&self) -> f64 {
        self.2
    }

    pub fn d(&self) -> f64 {
        self.3
    }

    pub fn e(&self) -> f64 {
        self.4
    }

    pub fn f(&self) -> f64 {
        self.5
    }

    pub fn determinant(&self) -> f64 {
        self.0 * self.4 - self.1 * self.3
    }

    /// Map a point through the transform.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.0 * x + self.1 * y + self.2,
            self.3 * x + self.4 * y + self.5,
        )
    }

    /// The inverse transform, or `None` if the transform is degenerate.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let ra = self.4 / det;
        let rb = -self.1 / det;
        let rd = -self.3 / det;
        let re = self.0 / det;
        Some(Self(
            ra,
            rb,
            -self.2 * ra - self.5 * rb,
            rd,
            re,
            -self.2 * rd - self.5 * re,
        ))
    }

    /// Same pixel size and rotation, anchored at a new world origin.
    pub fn with_origin(&self, xoff: f64, yoff: f64) -> Self {
        Self(self.0, self.1, xoff, self.3, self.4, yoff)
    }
}

impl Mul for AffineTransform {
    type Output = AffineTransform;

    /// Compose two transforms; `(lhs * rhs).apply(p) == lhs.apply(rhs.apply(p))`.
    fn mul(self, rhs: Self) -> Self::Output {
        Self(
            self.0 * rhs.0 + self.1 * rhs.3,
            self.0 * rhs.1 + self.1 * rhs.4,
            self.0 * rhs.2 + self.1 * rhs.5 + self.2,
            self.3 * rhs.0 + self.4 * rhs.3,
            self.3 * rhs.1 + self.4 * rhs.4,
            self.3 * rhs.2 + self.4 * rhs.5 + self.5,
        )
    }
}
