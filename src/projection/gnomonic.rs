use super::{
    DEFAULT_SCALE, GNOMONIC_BROKEN_LINE_LIMIT, Projection, ProjectionCode, ProjectionError,
    WcsKeywords,
};
use crate::geom::dmath;
use crate::geom::point::Point2D;
use crate::geom::rotation::{UNDEFINED_POLE, default_phip};
use crate::geom::sphere::{radec_to_xyz, xyz_to_radec};

/// TAN (gnomonic) projection onto the plane tangent at `(ra0, dec0)`.
///
/// Works directly with unit vectors instead of going through a spherical
/// rotation: the plane axes are the local east and north directions at the
/// tangent point, so x grows with RA and y with Dec. Great circles map to
/// straight lines, and nothing at or beyond 90 degrees from the tangent
/// point is representable.
///
/// A non-default LONPOLE turns both axes about the tangent point, the same
/// way it turns the plane of the other zenithal projections.
#[derive(Debug, Clone)]
pub struct Gnomonic {
    scale: f64,
    ra0: f64,
    dec0: f64,
    /// Native longitude of the celestial pole.
    lonpole: f64,
    /// Tangent point.
    center: [f64; 3],
    /// Local east.
    east: [f64; 3],
    /// Local north.
    north: [f64; 3],
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

impl Gnomonic {
    pub fn new(scale: f64, ra0: f64, dec0: f64) -> Self {
        Self::with_lonpole(scale, ra0, dec0, default_phip(dec0, 0.0, 90.0))
    }

    /// Tangent plane whose axes are turned by `lonpole` minus the default
    /// LONPOLE for `dec0`.
    pub fn with_lonpole(scale: f64, ra0: f64, dec0: f64, lonpole: f64) -> Self {
        let (sin_ra, cos_ra) = (dmath::sin(ra0), dmath::cos(ra0));
        let (sin_dec, cos_dec) = (dmath::sin(dec0), dmath::cos(dec0));
        let east = [-sin_ra, cos_ra, 0.0];
        let north = [-sin_dec * cos_ra, -sin_dec * sin_ra, cos_dec];

        let turn = lonpole - default_phip(dec0, 0.0, 90.0);
        let (sin_t, cos_t) = (dmath::sin(turn), dmath::cos(turn));
        let combine = |a: [f64; 3], ka: f64, b: [f64; 3], kb: f64| {
            [
                ka * a[0] + kb * b[0],
                ka * a[1] + kb * b[1],
                ka * a[2] + kb * b[2],
            ]
        };
        Self {
            scale,
            ra0,
            dec0,
            lonpole,
            center: radec_to_xyz(ra0, dec0),
            east: combine(east, cos_t, north, -sin_t),
            north: combine(east, sin_t, north, cos_t),
        }
    }

    /// Rebuild from WCS keywords, with the default scale. LATPOLE is
    /// implied by the tangent point and not consulted.
    pub fn from_wcs(wcs: &WcsKeywords) -> Result<Self, ProjectionError> {
        if wcs.code()? != ProjectionCode::Gnomonic {
            return Err(ProjectionError::InvalidCode(wcs.ctype1.clone()));
        }
        let default = default_phip(wcs.crval2, 0.0, 90.0);
        let lonpole = Some(wcs.lonpole)
            .filter(|l| *l != UNDEFINED_POLE && l.is_finite())
            .unwrap_or(default);
        Ok(Self::with_lonpole(DEFAULT_SCALE, wcs.crval1, wcs.crval2, lonpole))
    }

    pub fn lonpole(&self) -> f64 {
        self.lonpole
    }

    /// Plane units per radian at the tangent point.
    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl Projection for Gnomonic {
    fn code(&self) -> ProjectionCode {
        ProjectionCode::Gnomonic
    }

    fn ra0(&self) -> f64 {
        self.ra0
    }

    fn dec0(&self) -> f64 {
        self.dec0
    }

    /// Takes celestial coordinates; this projection has no native frame.
    fn project(&self, sky: Point2D) -> Option<Point2D> {
        let s = radec_to_xyz(sky.x, sky.y);
        let cos_c = dot(s, self.center);
        if cos_c <= 0.0 {
            return None;
        }
        let f = self.scale / cos_c;
        Point2D::new(f * dot(s, self.east), f * dot(s, self.north)).finite()
    }

    /// Returns celestial coordinates, RA in `[0, 360)`.
    fn unproject(&self, plane: Point2D) -> Option<Point2D> {
        if !plane.is_finite() {
            return None;
        }
        if plane.x == 0.0 && plane.y == 0.0 {
            return Some(Point2D::new(self.ra0, self.dec0));
        }
        let x = plane.x / self.scale;
        let y = plane.y / self.scale;
        let v = [
            self.center[0] + x * self.east[0] + y * self.north[0],
            self.center[1] + x * self.east[1] + y * self.north[1],
            self.center[2] + x * self.east[2] + y * self.north[2],
        ];
        xyz_to_radec(v).finite()
    }

    fn direct(&self, sky: Point2D) -> Option<Point2D> {
        self.project(sky)
    }

    fn inverse(&self, plane: Point2D) -> Option<Point2D> {
        self.unproject(plane)
    }

    fn check_broken_line(&self, cp1: Point2D, cp2: Point2D) -> bool {
        match (self.project(cp1), self.project(cp2)) {
            (Some(a), Some(b)) => a.distance_sq(&b) < GNOMONIC_BROKEN_LINE_LIMIT,
            _ => false,
        }
    }

    fn wcs(&self) -> WcsKeywords {
        let code = ProjectionCode::Gnomonic;
        WcsKeywords {
            ctype1: code.ctype1(),
            ctype2: code.ctype2(),
            crval1: self.ra0,
            crval2: self.dec0,
            lonpole: self.lonpole,
            latpole: self.dec0,
            pv1_1: None,
            pv1_2: None,
        }
    }
}
