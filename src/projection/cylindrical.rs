//! Cylindrical and pseudo-cylindrical projections.
//!
//! The native fiducial point is `(0, 0)` on the native equator, so the
//! reference point sits at the plane origin and native latitude runs along
//! the y axis.

use super::spherical::{NativeLaw, Spherical};
use super::{ProjectionCode, R0};
use crate::geom::dmath;
use crate::geom::point::Point2D;

/// Roundoff allowed on the Hammer-Aitoff boundary ellipse.
const AIT_TOL: f64 = 1.0e-13;

/// Plate carrée (CAR): native longitude and latitude used as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlateCarreeLaw;

impl NativeLaw for PlateCarreeLaw {
    const CODE: ProjectionCode = ProjectionCode::PlateCarree;
    const FIDUCIAL: (f64, f64) = (0.0, 0.0);

    fn project(&self, native: Point2D) -> Option<Point2D> {
        Some(native)
    }

    fn unproject(&self, plane: Point2D) -> Option<Point2D> {
        if plane.y.abs() > 90.0 {
            return None;
        }
        Some(plane)
    }
}

/// Mercator (MER). The native poles are at infinity.
#[derive(Debug, Clone, Copy, Default)]
pub struct MercatorLaw;

impl NativeLaw for MercatorLaw {
    const CODE: ProjectionCode = ProjectionCode::Mercator;
    const FIDUCIAL: (f64, f64) = (0.0, 0.0);

    fn project(&self, native: Point2D) -> Option<Point2D> {
        if native.y.abs() >= 90.0 {
            return None;
        }
        let y = R0 * dmath::tan((native.y + 90.0) / 2.0).ln();
        Some(Point2D::new(native.x, y))
    }

    fn unproject(&self, plane: Point2D) -> Option<Point2D> {
        let theta = 2.0 * dmath::atan((plane.y / R0).exp()) - 90.0;
        Some(Point2D::new(plane.x, theta))
    }
}

/// Hammer-Aitoff (AIT): equal-area, the whole sphere inside an ellipse.
#[derive(Debug, Clone, Copy, Default)]
pub struct HammerAitoffLaw;

impl NativeLaw for HammerAitoffLaw {
    const CODE: ProjectionCode = ProjectionCode::HammerAitoff;
    const FIDUCIAL: (f64, f64) = (0.0, 0.0);

    fn project(&self, native: Point2D) -> Option<Point2D> {
        let costhe = dmath::cos(native.y);
        let half_phi = native.x / 2.0;
        let w = (2.0 / (1.0 + costhe * dmath::cos(half_phi))).sqrt();
        Some(Point2D::new(
            2.0 * R0 * w * costhe * dmath::sin(half_phi),
            R0 * w * dmath::sin(native.y),
        ))
    }

    fn unproject(&self, plane: Point2D) -> Option<Point2D> {
        let x = plane.x / (4.0 * R0);
        let y = plane.y / (2.0 * R0);
        let s = 1.0 - x * x - y * y;
        if s < 0.5 - AIT_TOL {
            return None;
        }
        let z = s.max(0.5).sqrt();
        let phi = 2.0 * dmath::atan2(2.0 * z * x, 2.0 * z * z - 1.0);
        let theta = dmath::asin(2.0 * z * y);
        theta.is_finite().then_some(Point2D::new(phi, theta))
    }
}

pub type PlateCarree = Spherical<PlateCarreeLaw>;
pub type Mercator = Spherical<MercatorLaw>;
pub type HammerAitoff = Spherical<HammerAitoffLaw>;
