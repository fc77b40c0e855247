//! Celestial map projections.
//!
//! Every projection maps celestial coordinates (RA, Dec in degrees) onto a
//! flat projection plane and back. Except for the gnomonic projection, which
//! has its own closed form, this happens in two steps: a
//! [`SphericalRotation`](crate::geom::rotation::SphericalRotation) from
//! celestial to native spherical coordinates, followed by the
//! projection-specific native-to-plane law.
//!
//! Points that a projection cannot represent (behind the tangent plane,
//! outside the valid disk, ...) come back as `None`; that is not an error.

mod cylindrical;
mod gnomonic;
mod spherical;
mod zenithal;

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom::point::Point2D;

pub use cylindrical::{HammerAitoff, HammerAitoffLaw, Mercator, MercatorLaw, PlateCarree, PlateCarreeLaw};
pub use gnomonic::Gnomonic;
pub use spherical::{NativeLaw, Spherical};
pub use zenithal::{
    EqualAreaLaw, Orthographic, OrthographicLaw, RadialLaw, Stereographic, StereographicLaw,
    Zenithal, ZenithalEqualArea,
};

/// Radius of the generating sphere: one plane unit per degree at the
/// fiducial point.
pub const R0: f64 = 180.0 / PI;

/// Default gnomonic scale factor.
pub const DEFAULT_SCALE: f64 = R0;

/// Largest squared native distance (degrees squared) between the endpoints
/// of a segment that is still drawn as a straight line.
pub const BROKEN_LINE_LIMIT: f64 = 150.0;

/// Largest squared plane distance between the endpoints of a gnomonic
/// segment that is still drawn, at the default scale.
pub const GNOMONIC_BROKEN_LINE_LIMIT: f64 = 45.0 * 45.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("invalid projection code: {0}")]
    InvalidCode(String),

    #[error("native fiducial latitude {0} is outside [-90, 90]")]
    InvalidFiducialLatitude(f64),

    #[error("no spherical rotation places ({lng0}, {lat0}) at the native fiducial point")]
    InconsistentTriangle { lng0: f64, lat0: f64 },
}

/// The supported projections, by FITS code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CodeRepr", into = "String")]
pub enum ProjectionCode {
    Gnomonic,
    Stereographic,
    PlateCarree,
    Mercator,
    HammerAitoff,
    ZenithalEqualArea,
    Orthographic,
}

impl ProjectionCode {
    /// All codes in index order.
    pub const ALL: [ProjectionCode; 7] = [
        ProjectionCode::Gnomonic,
        ProjectionCode::Stereographic,
        ProjectionCode::PlateCarree,
        ProjectionCode::Mercator,
        ProjectionCode::HammerAitoff,
        ProjectionCode::ZenithalEqualArea,
        ProjectionCode::Orthographic,
    ];

    /// Integer selector of this projection.
    pub fn index(self) -> i64 {
        match self {
            ProjectionCode::Gnomonic => 0,
            ProjectionCode::Stereographic => 1,
            ProjectionCode::PlateCarree => 2,
            ProjectionCode::Mercator => 3,
            ProjectionCode::HammerAitoff => 4,
            ProjectionCode::ZenithalEqualArea => 5,
            ProjectionCode::Orthographic => 6,
        }
    }

    /// Three-letter FITS code.
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectionCode::Gnomonic => "TAN",
            ProjectionCode::Stereographic => "STG",
            ProjectionCode::PlateCarree => "CAR",
            ProjectionCode::Mercator => "MER",
            ProjectionCode::HammerAitoff => "AIT",
            ProjectionCode::ZenithalEqualArea => "ZEA",
            ProjectionCode::Orthographic => "SIN",
        }
    }

    /// Code from the projection part of a CTYPE value such as `RA---ZEA`.
    pub fn from_ctype(ctype: &str) -> Result<Self, ProjectionError> {
        let ctype = ctype.trim().trim_matches('\'').trim();
        match ctype.rsplit('-').next() {
            Some(code) if ctype.len() > code.len() => code.parse(),
            _ => Err(ProjectionError::InvalidCode(ctype.to_string())),
        }
    }

    pub fn ctype1(self) -> String {
        format!("RA---{}", self.as_str())
    }

    pub fn ctype2(self) -> String {
        format!("DEC--{}", self.as_str())
    }
}

impl TryFrom<i64> for ProjectionCode {
    type Error = ProjectionError;

    fn try_from(index: i64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|code| code.index() == index)
            .ok_or_else(|| ProjectionError::InvalidCode(index.to_string()))
    }
}

impl FromStr for ProjectionCode {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(index) = s.parse::<i64>() {
            return Self::try_from(index);
        }
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| ProjectionError::InvalidCode(s.to_string()))
    }
}

impl fmt::Display for ProjectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ProjectionCode> for String {
    fn from(code: ProjectionCode) -> Self {
        code.as_str().to_string()
    }
}

/// Serialized form of a projection selector: an index or a FITS code.
#[derive(Deserialize)]
#[serde(untagged)]
enum CodeRepr {
    Index(i64),
    Name(String),
}

impl TryFrom<CodeRepr> for ProjectionCode {
    type Error = ProjectionError;

    fn try_from(repr: CodeRepr) -> Result<Self, Self::Error> {
        match repr {
            CodeRepr::Index(index) => Self::try_from(index),
            CodeRepr::Name(name) => name.parse(),
        }
    }
}

/// WCS keywords describing a projection and its reference point.
///
/// Angles in degrees. `pv1_1`/`pv1_2` are only present when the native
/// fiducial point differs from the projection default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WcsKeywords {
    pub ctype1: String,
    pub ctype2: String,
    pub crval1: f64,
    pub crval2: f64,
    pub lonpole: f64,
    pub latpole: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pv1_1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pv1_2: Option<f64>,
}

impl WcsKeywords {
    pub fn code(&self) -> Result<ProjectionCode, ProjectionError> {
        ProjectionCode::from_ctype(&self.ctype1)
    }
}

/// A celestial map projection.
pub trait Projection: fmt::Debug + Send + Sync {
    fn code(&self) -> ProjectionCode;

    /// RA of the reference point, degrees.
    fn ra0(&self) -> f64;

    /// Dec of the reference point, degrees.
    fn dec0(&self) -> f64;

    /// Native spherical coordinates to the projection plane.
    fn project(&self, native: Point2D) -> Option<Point2D>;

    /// Projection plane to native spherical coordinates.
    fn unproject(&self, plane: Point2D) -> Option<Point2D>;

    /// Celestial coordinates to the projection plane.
    fn direct(&self, sky: Point2D) -> Option<Point2D>;

    /// Projection plane to celestial coordinates.
    fn inverse(&self, plane: Point2D) -> Option<Point2D>;

    /// Whether a segment between two celestial points can be drawn as a
    /// line, i.e. does not cross a discontinuity of the projection.
    fn check_broken_line(&self, cp1: Point2D, cp2: Point2D) -> bool;

    fn wcs(&self) -> WcsKeywords;
}

/// Where the projection reference point comes from.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Origin {
    /// The point supplied by the caller, typically the image center.
    #[default]
    OwnCenter,
    /// A fixed point overriding the caller's.
    Explicit { ra: f64, dec: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionConfig {
    pub code: ProjectionCode,
    pub origin: Origin,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            code: ProjectionCode::Gnomonic,
            origin: Origin::OwnCenter,
        }
    }
}

/// Build the projection selected by `config`, referenced at `(ra, dec)`
/// unless the config carries an explicit origin.
pub fn projection_factory(
    config: &ProjectionConfig,
    ra: f64,
    dec: f64,
) -> Result<Box<dyn Projection>, ProjectionError> {
    let (ra0, dec0) = match config.origin {
        Origin::OwnCenter => (ra, dec),
        Origin::Explicit { ra, dec } => (ra, dec),
    };
    Ok(match config.code {
        ProjectionCode::Gnomonic => Box::new(Gnomonic::new(DEFAULT_SCALE, ra0, dec0)),
        ProjectionCode::Stereographic => Box::new(Stereographic::new(ra0, dec0)?),
        ProjectionCode::PlateCarree => Box::new(PlateCarree::new(ra0, dec0)?),
        ProjectionCode::Mercator => Box::new(Mercator::new(ra0, dec0)?),
        ProjectionCode::HammerAitoff => Box::new(HammerAitoff::new(ra0, dec0)?),
        ProjectionCode::ZenithalEqualArea => Box::new(ZenithalEqualArea::new(ra0, dec0)?),
        ProjectionCode::Orthographic => Box::new(Orthographic::new(ra0, dec0)?),
    })
}

/// Rebuild a projection from previously written WCS keywords.
pub fn projection_from_wcs(wcs: &WcsKeywords) -> Result<Box<dyn Projection>, ProjectionError> {
    Ok(match wcs.code()? {
        ProjectionCode::Gnomonic => Box::new(Gnomonic::from_wcs(wcs)?),
        ProjectionCode::Stereographic => Box::new(Stereographic::from_wcs(Default::default(), wcs)?),
        ProjectionCode::PlateCarree => Box::new(PlateCarree::from_wcs(Default::default(), wcs)?),
        ProjectionCode::Mercator => Box::new(Mercator::from_wcs(Default::default(), wcs)?),
        ProjectionCode::HammerAitoff => Box::new(HammerAitoff::from_wcs(Default::default(), wcs)?),
        ProjectionCode::ZenithalEqualArea => {
            Box::new(ZenithalEqualArea::from_wcs(Default::default(), wcs)?)
        }
        ProjectionCode::Orthographic => Box::new(Orthographic::from_wcs(Default::default(), wcs)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::sphere::{separation, wrap_180};

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() < tol,
            "expected {a} ~= {b} (diff = {})",
            (a - b).abs()
        );
    }

    /// Sample points within `max_sep` degrees of the reference point.
    fn sky_grid(ra0: f64, dec0: f64, max_sep: f64) -> Vec<Point2D> {
        let mut points = Vec::new();
        for ira in -12..=12 {
            for idec in -8..=8 {
                let p = Point2D::new(
                    (ra0 + ira as f64 * 14.5 + 360.0) % 360.0,
                    (idec as f64 * 10.5 + 0.25).clamp(-89.0, 89.0),
                );
                if separation(p, Point2D::new(ra0, dec0)) < max_sep {
                    points.push(p);
                }
            }
        }
        points
    }

    fn assert_round_trip(projection: &dyn Projection, points: &[Point2D]) {
        assert!(!points.is_empty());
        for &p in points {
            let plane = projection
                .direct(p)
                .unwrap_or_else(|| panic!("{} failed to project {p:?}", projection.code()));
            let back = projection
                .inverse(plane)
                .unwrap_or_else(|| panic!("{} failed to invert {plane:?}", projection.code()));
            assert_close(wrap_180(back.x - p.x), 0.0, 1e-9);
            assert_close(back.y, p.y, 1e-9);
        }
    }

    #[test]
    fn round_trip_every_projection() {
        for &(ra0, dec0) in &[(150.0, 30.0), (10.0, -45.0), (280.0, 70.0), (0.0, 0.0)] {
            for code in ProjectionCode::ALL {
                let config = ProjectionConfig {
                    code,
                    origin: Origin::OwnCenter,
                };
                let projection = projection_factory(&config, ra0, dec0).unwrap();
                let max_sep = match code {
                    ProjectionCode::Gnomonic => 80.0,
                    ProjectionCode::Orthographic => 85.0,
                    ProjectionCode::Stereographic => 150.0,
                    _ => 120.0,
                };
                assert_round_trip(projection.as_ref(), &sky_grid(ra0, dec0, max_sep));
            }
        }
    }

    #[test]
    fn reference_point_maps_to_plane_origin() {
        for code in ProjectionCode::ALL {
            let config = ProjectionConfig { code, ..Default::default() };
            let projection = projection_factory(&config, 123.0, -33.0).unwrap();
            let plane = projection.direct(Point2D::new(123.0, -33.0)).unwrap();
            assert_close(plane.x, 0.0, 1e-9);
            assert_close(plane.y, 0.0, 1e-9);
        }
    }

    #[test]
    fn plane_axes_follow_ra_and_dec() {
        for code in ProjectionCode::ALL {
            let config = ProjectionConfig { code, ..Default::default() };
            let projection = projection_factory(&config, 150.0, 20.0).unwrap();
            let east = projection.direct(Point2D::new(150.1, 20.0)).unwrap();
            let north = projection.direct(Point2D::new(150.0, 20.1)).unwrap();
            assert!(east.x > 0.0, "{code}: {east:?}");
            assert!(north.y > 0.0, "{code}: {north:?}");
            assert_close(north.y, 0.1, 1e-4);
        }
    }

    #[test]
    fn factory_accepts_indices_and_codes() {
        let names = ["TAN", "STG", "CAR", "MER", "AIT", "ZEA", "SIN"];
        for (i, name) in names.iter().enumerate() {
            let by_index = ProjectionCode::try_from(i as i64).unwrap();
            let by_name: ProjectionCode = name.parse().unwrap();
            let by_index_str: ProjectionCode = i.to_string().parse().unwrap();
            assert_eq!(by_index, by_name);
            assert_eq!(by_index, by_index_str);
            assert_eq!(by_name.as_str(), *name);

            let config = ProjectionConfig {
                code: by_name,
                origin: Origin::OwnCenter,
            };
            let projection = projection_factory(&config, 10.0, 20.0).unwrap();
            assert_eq!(projection.code(), by_name);
        }
    }

    #[test]
    fn factory_rejects_unknown_codes() {
        for bad in ["7", "-1", "ARC", "tan", "", "TANX"] {
            assert!(
                matches!(bad.parse::<ProjectionCode>(), Err(ProjectionError::InvalidCode(_))),
                "{bad:?} accepted"
            );
        }
        assert!(ProjectionCode::try_from(42).is_err());
    }

    #[test]
    fn code_deserializes_from_index_or_name() {
        let a: ProjectionCode = serde_json::from_str("5").unwrap();
        let b: ProjectionCode = serde_json::from_str("\"ZEA\"").unwrap();
        assert_eq!(a, ProjectionCode::ZenithalEqualArea);
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"ZEA\"");
        assert!(serde_json::from_str::<ProjectionCode>("9").is_err());
    }

    #[test]
    fn explicit_origin_overrides_center() {
        let config = ProjectionConfig {
            code: ProjectionCode::Stereographic,
            origin: Origin::Explicit { ra: 45.0, dec: 10.0 },
        };
        let projection = projection_factory(&config, 200.0, -30.0).unwrap();
        assert_eq!(projection.ra0(), 45.0);
        assert_eq!(projection.dec0(), 10.0);
    }

    #[test]
    fn ctype_parsing() {
        assert_eq!(
            ProjectionCode::from_ctype("RA---TAN").unwrap(),
            ProjectionCode::Gnomonic
        );
        assert_eq!(
            ProjectionCode::from_ctype("'DEC--AIT'").unwrap(),
            ProjectionCode::HammerAitoff
        );
        assert!(ProjectionCode::from_ctype("TAN").is_err());
        assert!(ProjectionCode::from_ctype("RA---XYZ").is_err());
    }

    #[test]
    fn wcs_keywords_rebuild_projection() {
        for code in ProjectionCode::ALL {
            let config = ProjectionConfig { code, ..Default::default() };
            let original = projection_factory(&config, 210.0, -12.0).unwrap();
            let wcs = original.wcs();
            assert_eq!(wcs.ctype1, code.ctype1());
            assert_eq!(wcs.ctype2, code.ctype2());
            assert_eq!(wcs.crval1, 210.0);
            assert_eq!(wcs.crval2, -12.0);

            let rebuilt = projection_from_wcs(&wcs).unwrap();
            assert_eq!(rebuilt.code(), code);
            for &p in &[Point2D::new(212.0, -10.0), Point2D::new(205.5, -15.5)] {
                let a = original.direct(p).unwrap();
                let b = rebuilt.direct(p).unwrap();
                assert_close(a.x, b.x, 1e-12);
                assert_close(a.y, b.y, 1e-12);
            }
        }
    }
}
