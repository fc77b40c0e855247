//! Zenithal (azimuthal) projections.
//!
//! The native pole is the fiducial point and the projection plane is
//! tangent there. A zenithal projection is fully described by its radial
//! law `R(theta)`: native longitude becomes the position angle in the plane,
//! native latitude the distance from the origin.

use super::spherical::{NativeLaw, Spherical};
use super::{BROKEN_LINE_LIMIT, ProjectionCode, R0};
use crate::geom::dmath;
use crate::geom::point::Point2D;

/// Radial law of a zenithal projection.
pub trait RadialLaw: std::fmt::Debug + Default + Send + Sync {
    const CODE: ProjectionCode;

    /// Plane distance from the origin for native latitude `theta`.
    fn r_theta(&self, theta: f64) -> Option<f64>;

    /// Native latitude for plane distance `r`.
    fn theta(&self, r: f64) -> Option<f64>;

    fn broken_line_limit(&self, _n1: Point2D, _n2: Point2D) -> Option<f64> {
        Some(BROKEN_LINE_LIMIT)
    }
}

/// Zenithal projection built from a radial law.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zenithal<R>(pub R);

impl<R: RadialLaw> NativeLaw for Zenithal<R> {
    const CODE: ProjectionCode = R::CODE;
    const FIDUCIAL: (f64, f64) = (0.0, 90.0);

    fn project(&self, native: Point2D) -> Option<Point2D> {
        let r = self.0.r_theta(native.y)?;
        Some(Point2D::new(
            r * dmath::sin(native.x),
            -r * dmath::cos(native.x),
        ))
    }

    fn unproject(&self, plane: Point2D) -> Option<Point2D> {
        let r = plane.x.hypot(plane.y);
        let phi = if r == 0.0 {
            0.0
        } else {
            dmath::atan2(plane.x, -plane.y)
        };
        Some(Point2D::new(phi, self.0.theta(r)?))
    }

    fn broken_line_limit(&self, n1: Point2D, n2: Point2D) -> Option<f64> {
        self.0.broken_line_limit(n1, n2)
    }
}

/// Lambert zenithal equal-area law (ZEA).
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualAreaLaw;

impl RadialLaw for EqualAreaLaw {
    const CODE: ProjectionCode = ProjectionCode::ZenithalEqualArea;

    fn r_theta(&self, theta: f64) -> Option<f64> {
        Some(2.0 * R0 * dmath::sin((90.0 - theta) / 2.0))
    }

    fn theta(&self, r: f64) -> Option<f64> {
        let s = r / (2.0 * R0);
        let theta = 90.0 - 2.0 * dmath::asin(s);
        theta.is_finite().then_some(theta)
    }

    /// Segments far from the native pole are allowed less native length,
    /// since the far hemisphere is strongly compressed.
    fn broken_line_limit(&self, n1: Point2D, n2: Point2D) -> Option<f64> {
        let min_theta = n1.y.min(n2.y);
        Some(BROKEN_LINE_LIMIT * (min_theta + 90.0) / 180.0)
    }
}

/// Stereographic law (STG).
#[derive(Debug, Clone, Copy, Default)]
pub struct StereographicLaw;

impl RadialLaw for StereographicLaw {
    const CODE: ProjectionCode = ProjectionCode::Stereographic;

    fn r_theta(&self, theta: f64) -> Option<f64> {
        let s = 1.0 + dmath::sin(theta);
        if s == 0.0 {
            return None;
        }
        Some(2.0 * R0 * dmath::cos(theta) / s)
    }

    fn theta(&self, r: f64) -> Option<f64> {
        Some(90.0 - 2.0 * dmath::atan(r / (2.0 * R0)))
    }

    fn broken_line_limit(&self, _n1: Point2D, _n2: Point2D) -> Option<f64> {
        None
    }
}

/// Orthographic law (SIN). Only the hemisphere facing the observer is
/// representable.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrthographicLaw;

/// Colatitude (radians) below which `cos(theta)` is replaced by its
/// small-angle value.
const SIN_SMALL_ANGLE: f64 = 1.0e-5;

impl RadialLaw for OrthographicLaw {
    const CODE: ProjectionCode = ProjectionCode::Orthographic;

    fn r_theta(&self, theta: f64) -> Option<f64> {
        if theta < 0.0 {
            return None;
        }
        let t = (90.0 - theta).to_radians();
        let costhe = if t < SIN_SMALL_ANGLE {
            t
        } else {
            dmath::cos(theta)
        };
        Some(R0 * costhe)
    }

    fn theta(&self, r: f64) -> Option<f64> {
        let r2 = (r / R0).powi(2);
        if r2 < 0.5 {
            Some(dmath::acos(r2.sqrt()))
        } else if r2 <= 1.0 {
            Some(dmath::asin((1.0 - r2).sqrt()))
        } else {
            None
        }
    }
}

pub type ZenithalEqualArea = Spherical<Zenithal<EqualAreaLaw>>;
pub type Stereographic = Spherical<Zenithal<StereographicLaw>>;
pub type Orthographic = Spherical<Zenithal<OrthographicLaw>>;
