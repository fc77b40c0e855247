//! Pixel <-> projection plane mappings fitted from control points.
//!
//! Two models are available: an affine [`LinearTransform`] obtained by
//! least squares, and a thin-plate [`SurfaceSpline`] that follows local
//! distortion and interpolates its control points.

use nalgebra::{DMatrix, Matrix3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom::point::Point2D;

/// Smallest number of points any fit accepts.
pub const MIN_FIT_POINTS: usize = 3;

/// Ratio of smallest to largest singular value below which the linear
/// least-squares system is treated as rank deficient.
const RANK_TOL: f64 = 1.0e-12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("need at least {required} correspondences, got {found}")]
    TooFewCorrespondences { found: usize, required: usize },

    #[error("got {from} source points but {to} target points")]
    LengthMismatch { from: usize, to: usize },

    #[error("singular system (points collinear or duplicated)")]
    SingularMatrix,
}

fn check_inputs(from: &[Point2D], to: &[Point2D]) -> Result<(), FitError> {
    if from.len() != to.len() {
        return Err(FitError::LengthMismatch {
            from: from.len(),
            to: to.len(),
        });
    }
    if from.len() < MIN_FIT_POINTS {
        return Err(FitError::TooFewCorrespondences {
            found: from.len(),
            required: MIN_FIT_POINTS,
        });
    }
    Ok(())
}

fn centroid(points: &[Point2D]) -> Point2D {
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point2D::new(sx / n, sy / n)
}

/// Affine map
///
/// ```text
/// X = m00 x + m01 y + m02
/// Y = m10 x + m11 y + m12
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearTransform {
    m: [[f64; 3]; 2],
}

impl LinearTransform {
    pub const IDENTITY: LinearTransform = LinearTransform {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    };

    pub fn new(m: [[f64; 3]; 2]) -> Self {
        Self { m }
    }

    pub fn matrix(&self) -> [[f64; 3]; 2] {
        self.m
    }

    /// Homogeneous 3x3 form.
    pub fn to_matrix3(&self) -> Matrix3<f64> {
        let m = &self.m;
        Matrix3::new(
            m[0][0], m[0][1], m[0][2], //
            m[1][0], m[1][1], m[1][2], //
            0.0, 0.0, 1.0,
        )
    }

    pub fn apply(&self, p: Point2D) -> Point2D {
        let m = &self.m;
        Point2D::new(
            m[0][0] * p.x + m[0][1] * p.y + m[0][2],
            m[1][0] * p.x + m[1][1] * p.y + m[1][2],
        )
    }

    pub fn determinant(&self) -> f64 {
        self.m[0][0] * self.m[1][1] - self.m[0][1] * self.m[1][0]
    }

    /// `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        let inv = self.to_matrix3().try_inverse()?;
        let t = Self::new([
            [inv[(0, 0)], inv[(0, 1)], inv[(0, 2)]],
            [inv[(1, 0)], inv[(1, 1)], inv[(1, 2)]],
        ]);
        t.m.iter().flatten().all(|v| v.is_finite()).then_some(t)
    }

    /// Mean length of the rows of the linear part: the average output
    /// distance per unit input distance.
    pub fn mean_scale(&self) -> f64 {
        let row0 = self.m[0][0].hypot(self.m[0][1]);
        let row1 = self.m[1][0].hypot(self.m[1][1]);
        (row0 + row1) / 2.0
    }

    /// Least-squares affine map taking `from[i]` to `to[i]` (degree-1
    /// multiple linear regression of each output coordinate on x and y).
    ///
    /// Requires at least 3 non-collinear points.
    pub fn fit(from: &[Point2D], to: &[Point2D]) -> Result<Self, FitError> {
        check_inputs(from, to)?;
        let n = from.len();

        // Center the inputs so that large pixel coordinates do not swamp
        // the constant column.
        let c = centroid(from);
        let a = DMatrix::from_fn(n, 3, |i, j| match j {
            0 => from[i].x - c.x,
            1 => from[i].y - c.y,
            _ => 1.0,
        });
        let b = DMatrix::from_fn(n, 2, |i, j| if j == 0 { to[i].x } else { to[i].y });

        let svd = a.svd(true, true);
        let max_sv = svd.singular_values.max();
        let min_sv = svd.singular_values.min();
        if !(max_sv > 0.0) || min_sv / max_sv < RANK_TOL {
            return Err(FitError::SingularMatrix);
        }
        let x = svd
            .solve(&b, RANK_TOL * max_sv)
            .map_err(|_| FitError::SingularMatrix)?;

        let mut m = [[0.0; 3]; 2];
        for (k, row) in m.iter_mut().enumerate() {
            row[0] = x[(0, k)];
            row[1] = x[(1, k)];
            row[2] = x[(2, k)] - x[(0, k)] * c.x - x[(1, k)] * c.y;
        }
        let t = Self::new(m);
        if t.m.iter().flatten().all(|v| v.is_finite()) {
            Ok(t)
        } else {
            Err(FitError::SingularMatrix)
        }
    }
}

/// Thin-plate radial basis `U(r) = r^2 ln r`, with `U(0) = 0`.
fn tps_kernel(r2: f64) -> f64 {
    if r2 < 1e-20 { 0.0 } else { 0.5 * r2 * r2.ln() }
}

/// Two-dimensional thin-plate spline `f: R^2 -> R^2`:
///
/// ```text
/// f(p) = a0 + a1 x + a2 y + sum_i w_i U(|p - p_i|)
/// ```
///
/// Control points are normalized (centered and divided by their largest
/// extent) before solving. Both output components share one LU
/// factorization.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSpline {
    /// Normalized control points.
    nodes: Vec<Point2D>,
    origin: Point2D,
    scale: f64,
    weights: Vec<Point2D>,
    affine: [Point2D; 3],
    smoothing: f64,
}

impl SurfaceSpline {
    /// Fit the spline taking `from[i]` to `to[i]`. With `smoothing == 0` it
    /// interpolates exactly; larger values trade fidelity for smoothness.
    pub fn fit(from: &[Point2D], to: &[Point2D], smoothing: f64) -> Result<Self, FitError> {
        check_inputs(from, to)?;
        let n = from.len();

        let origin = centroid(from);
        let extent = from
            .iter()
            .map(|p| (p.x - origin.x).abs().max((p.y - origin.y).abs()))
            .fold(0.0, f64::max);
        if !(extent > 0.0) || !extent.is_finite() {
            return Err(FitError::SingularMatrix);
        }
        let scale = 1.0 / extent;
        let nodes: Vec<Point2D> = from
            .iter()
            .map(|p| Point2D::new((p.x - origin.x) * scale, (p.y - origin.y) * scale))
            .collect();

        // [K + lambda I  P] [w]   [v]
        // [P^T           0] [a] = [0]
        let size = n + 3;
        let mut system = DMatrix::<f64>::zeros(size, size);
        for i in 0..n {
            for j in 0..n {
                system[(i, j)] = if i == j {
                    smoothing
                } else {
                    tps_kernel(nodes[i].distance_sq(&nodes[j]))
                };
            }
            let row = [1.0, nodes[i].x, nodes[i].y];
            for (k, v) in row.into_iter().enumerate() {
                system[(i, n + k)] = v;
                system[(n + k, i)] = v;
            }
        }
        let rhs = DMatrix::from_fn(size, 2, |i, j| match (i < n, j) {
            (true, 0) => to[i].x,
            (true, _) => to[i].y,
            (false, _) => 0.0,
        });

        let solution = system.lu().solve(&rhs).ok_or(FitError::SingularMatrix)?;
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(FitError::SingularMatrix);
        }

        let weights = (0..n)
            .map(|i| Point2D::new(solution[(i, 0)], solution[(i, 1)]))
            .collect();
        let affine = [0, 1, 2].map(|k| Point2D::new(solution[(n + k, 0)], solution[(n + k, 1)]));

        Ok(Self {
            nodes,
            origin,
            scale,
            weights,
            affine,
            smoothing,
        })
    }

    pub fn apply(&self, p: Point2D) -> Point2D {
        let q = Point2D::new((p.x - self.origin.x) * self.scale, (p.y - self.origin.y) * self.scale);
        let [a0, a1, a2] = self.affine;
        let mut out = Point2D::new(
            a0.x + a1.x * q.x + a2.x * q.y,
            a0.y + a1.y * q.x + a2.y * q.y,
        );
        for (node, w) in self.nodes.iter().zip(&self.weights) {
            let u = tps_kernel(q.distance_sq(node));
            out.x += w.x * u;
            out.y += w.y * u;
        }
        out
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }
}

/// Forward (pixel -> plane) and inverse (plane -> pixel) splines fitted
/// on the same control points.
#[derive(Debug, Clone, PartialEq)]
pub struct SplinePair {
    pub forward: SurfaceSpline,
    pub inverse: SurfaceSpline,
}

impl SplinePair {
    pub fn fit(pixels: &[Point2D], plane: &[Point2D], smoothing: f64) -> Result<Self, FitError> {
        Ok(Self {
            forward: SurfaceSpline::fit(pixels, plane, smoothing)?,
            inverse: SurfaceSpline::fit(plane, pixels, smoothing)?,
        })
    }
}

/// A fitted mapping between two planes.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapping {
    Linear(LinearTransform),
    Spline(SurfaceSpline),
}

impl Mapping {
    pub fn apply(&self, p: Point2D) -> Point2D {
        match self {
            Mapping::Linear(t) => t.apply(p),
            Mapping::Spline(s) => s.apply(p),
        }
    }

    pub fn is_spline(&self) -> bool {
        matches!(self, Mapping::Spline(_))
    }
}

impl From<LinearTransform> for Mapping {
    fn from(t: LinearTransform) -> Self {
        Mapping::Linear(t)
    }
}

impl From<SurfaceSpline> for Mapping {
    fn from(s: SurfaceSpline) -> Self {
        Mapping::Spline(s)
    }
}
