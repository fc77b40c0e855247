use std::fmt;

use super::{BROKEN_LINE_LIMIT, Projection, ProjectionCode, ProjectionError, WcsKeywords};
use crate::geom::point::Point2D;
use crate::geom::rotation::SphericalRotation;
use crate::geom::sphere::distance_fast;

/// The projection-specific part of a spherical projection: how native
/// spherical coordinates map onto the plane.
pub trait NativeLaw: fmt::Debug + Default + Send + Sync {
    const CODE: ProjectionCode;

    /// Default native coordinates `(phi0, theta0)` of the fiducial point.
    const FIDUCIAL: (f64, f64);

    fn project(&self, native: Point2D) -> Option<Point2D>;

    fn unproject(&self, plane: Point2D) -> Option<Point2D>;

    /// Largest squared native distance for which a segment between the two
    /// native points is still considered continuous. `None` disables the
    /// check.
    fn broken_line_limit(&self, _n1: Point2D, _n2: Point2D) -> Option<f64> {
        Some(BROKEN_LINE_LIMIT)
    }
}

/// A native law combined with the rotation placing the reference point at
/// the native fiducial point.
#[derive(Debug, Clone)]
pub struct Spherical<L> {
    law: L,
    rotation: SphericalRotation,
    ra0: f64,
    dec0: f64,
    phi0: f64,
    theta0: f64,
}

impl<L: NativeLaw> Spherical<L> {
    /// Projection referenced at `(ra0, dec0)` with default poles.
    pub fn new(ra0: f64, dec0: f64) -> Result<Self, ProjectionError> {
        Self::from_refpoint(L::default(), ra0, dec0, None)
    }

    /// Projection referenced at `(ra0, dec0)`, optionally with an explicit
    /// native longitude of the celestial pole.
    pub fn from_refpoint(
        law: L,
        ra0: f64,
        dec0: f64,
        phip: Option<f64>,
    ) -> Result<Self, ProjectionError> {
        let (phi0, theta0) = L::FIDUCIAL;
        let rotation = SphericalRotation::new(ra0, dec0, phi0, theta0, phip, None)?;
        Ok(Self {
            law,
            rotation,
            ra0,
            dec0,
            phi0,
            theta0,
        })
    }

    pub fn from_wcs(law: L, wcs: &WcsKeywords) -> Result<Self, ProjectionError> {
        let code = wcs.code()?;
        if code != L::CODE {
            return Err(ProjectionError::InvalidCode(wcs.ctype1.clone()));
        }
        let phi0 = wcs.pv1_1.unwrap_or(L::FIDUCIAL.0);
        let theta0 = wcs.pv1_2.unwrap_or(L::FIDUCIAL.1);
        let rotation = SphericalRotation::new(
            wcs.crval1,
            wcs.crval2,
            phi0,
            theta0,
            Some(wcs.lonpole),
            Some(wcs.latpole),
        )?;
        Ok(Self {
            law,
            rotation,
            ra0: wcs.crval1,
            dec0: wcs.crval2,
            phi0,
            theta0,
        })
    }

    pub fn rotation(&self) -> &SphericalRotation {
        &self.rotation
    }
}

impl<L: NativeLaw> Projection for Spherical<L> {
    fn code(&self) -> ProjectionCode {
        L::CODE
    }

    fn ra0(&self) -> f64 {
        self.ra0
    }

    fn dec0(&self) -> f64 {
        self.dec0
    }

    fn project(&self, native: Point2D) -> Option<Point2D> {
        self.law.project(native)?.finite()
    }

    fn unproject(&self, plane: Point2D) -> Option<Point2D> {
        self.law.unproject(plane)?.finite()
    }

    fn direct(&self, sky: Point2D) -> Option<Point2D> {
        self.project(self.rotation.celestial_to_native(sky))
    }

    fn inverse(&self, plane: Point2D) -> Option<Point2D> {
        let native = self.unproject(plane)?;
        self.rotation.native_to_celestial(native).finite()
    }

    fn check_broken_line(&self, cp1: Point2D, cp2: Point2D) -> bool {
        let n1 = self.rotation.celestial_to_native(cp1);
        let n2 = self.rotation.celestial_to_native(cp2);
        match self.law.broken_line_limit(n1, n2) {
            Some(limit) => distance_fast(n1, n2) < limit,
            None => true,
        }
    }

    fn wcs(&self) -> WcsKeywords {
        let (phi0, theta0) = L::FIDUCIAL;
        WcsKeywords {
            ctype1: L::CODE.ctype1(),
            ctype2: L::CODE.ctype2(),
            crval1: self.ra0,
            crval2: self.dec0,
            lonpole: self.rotation.phi_p(),
            latpole: self.rotation.latpole(),
            pv1_1: (self.phi0 != phi0).then_some(self.phi0),
            pv1_2: (self.theta0 != theta0).then_some(self.theta0),
        }
    }
}
