//! General spherical rotation between native and celestial coordinates.
//!
//! Follows the FITS WCS conventions of Calabretta & Greisen (2002): a
//! projection works in its own "native" spherical frame, whose pole sits at
//! native latitude 90. The rotation is defined by the celestial coordinates
//! of the native pole `(alpha_p, delta_p)` and the native longitude of the
//! celestial pole `phi_p`.
//!
//! All angles are in degrees.

use super::dmath;
use super::point::Point2D;
use super::sphere::wrap_180;
use crate::projection::ProjectionError;

/// Switch between direct and roundoff-resistant formulas.
const TOL: f64 = 1.0e-5;

/// Above this `|z|` latitudes are recovered with `acos` instead of `asin`.
const ASIN_LIMIT: f64 = 0.99;

/// Sentinel some WCS writers use for an undefined LONPOLE/LATPOLE.
pub const UNDEFINED_POLE: f64 = 999.0;

/// Default native longitude of the celestial pole for a fiducial point at
/// latitude `lat0` and a projection with native fiducial `(phi0, theta0)`.
pub fn default_phip(lat0: f64, phi0: f64, theta0: f64) -> f64 {
    let phip = if lat0 < theta0 { 180.0 } else { 0.0 };
    wrap_180(phip + phi0)
}

fn defined(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != UNDEFINED_POLE)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SphericalRotation {
    latpole: f64,
    alpha_p: f64,
    delta_p: f64,
    phi_p: f64,
    sin_delta_p: f64,
    cos_delta_p: f64,
}

impl SphericalRotation {
    /// Build the rotation that carries the celestial point `(lng0, lat0)`
    /// onto the native fiducial point `(phi0, theta0)`.
    ///
    /// `phip` is the native longitude of the celestial pole (LONPOLE);
    /// `latpole` only disambiguates between the two solutions for the
    /// celestial latitude of the native pole. Either may be `None` or
    /// [`UNDEFINED_POLE`] to use the FITS defaults.
    pub fn new(
        lng0: f64,
        lat0: f64,
        phi0: f64,
        theta0: f64,
        phip: Option<f64>,
        latpole: Option<f64>,
    ) -> Result<Self, ProjectionError> {
        if theta0.abs() > 90.0 + TOL {
            return Err(ProjectionError::InvalidFiducialLatitude(theta0));
        }
        let phip = defined(phip).unwrap_or_else(|| default_phip(lat0, phi0, theta0));
        let latpole_hint = defined(latpole).unwrap_or(90.0);

        let (lngp, latp) = if theta0 == 90.0 {
            // The fiducial point is the native pole.
            (lng0, lat0)
        } else {
            let triangle = || ProjectionError::InconsistentTriangle { lng0, lat0 };

            let slat0 = dmath::sin(lat0);
            let clat0 = dmath::cos(lat0);
            let sthe0 = dmath::sin(theta0);
            let cthe0 = dmath::cos(theta0);
            let (sphip, cphip) = if phip == phi0 {
                (0.0, 1.0)
            } else {
                (dmath::sin(phip - phi0), dmath::cos(phip - phi0))
            };

            let x = cthe0 * cphip;
            let y = sthe0;
            let z = x.hypot(y);

            let latp = if z == 0.0 {
                if slat0 != 0.0 {
                    return Err(triangle());
                }
                latpole_hint
            } else {
                let (u, v) = if phip == phi0 {
                    (theta0, 90.0 - lat0)
                } else {
                    if (slat0 / z).abs() > 1.0 {
                        return Err(triangle());
                    }
                    (dmath::atan2(y, x), dmath::acos(slat0 / z))
                };

                let latp1 = wrap_180(u + v);
                let latp2 = wrap_180(u - v);
                let valid1 = latp1.abs() < 90.0 + TOL;
                let valid2 = latp2.abs() < 90.0 + TOL;

                let latp = match (valid1, valid2) {
                    (true, true) => {
                        if (latpole_hint - latp1).abs() < (latpole_hint - latp2).abs() {
                            latp1
                        } else {
                            latp2
                        }
                    }
                    (true, false) => latp1,
                    (false, true) => latp2,
                    (false, false) => return Err(triangle()),
                };
                latp.clamp(-90.0, 90.0)
            };

            let z = dmath::cos(latp) * clat0;
            let lngp = if z.abs() < TOL {
                if clat0.abs() < TOL {
                    // Celestial pole at the fiducial point.
                    lng0
                } else if latp > 0.0 {
                    // Celestial north pole at the native pole.
                    lng0 + phip - phi0 - 180.0
                } else {
                    // Celestial south pole at the native pole.
                    lng0 - phip + phi0
                }
            } else {
                let x = (sthe0 - dmath::sin(latp) * slat0) / z;
                let y = sphip * cthe0 / clat0;
                if x == 0.0 && y == 0.0 {
                    return Err(triangle());
                }
                lng0 - dmath::atan2(y, x)
            };

            (lngp, latp)
        };

        // Same sign convention for the native pole longitude as for lng0.
        let mut lngp = lngp;
        if lng0 >= 0.0 {
            if lngp < 0.0 {
                lngp += 360.0;
            } else if lngp > 360.0 {
                lngp -= 360.0;
            }
        } else if lngp > 0.0 {
            lngp -= 360.0;
        } else if lngp < -360.0 {
            lngp += 360.0;
        }

        let delta_p = 90.0 - latp;
        Ok(Self {
            latpole: latp,
            alpha_p: lngp,
            delta_p,
            phi_p: phip,
            sin_delta_p: dmath::sin(delta_p),
            cos_delta_p: dmath::cos(delta_p),
        })
    }

    /// Celestial latitude of the native pole.
    pub fn latpole(&self) -> f64 {
        self.latpole
    }

    /// Celestial longitude of the native pole.
    pub fn alpha_p(&self) -> f64 {
        self.alpha_p
    }

    /// Celestial co-latitude of the native pole.
    pub fn delta_p(&self) -> f64 {
        self.delta_p
    }

    /// Native longitude of the celestial pole.
    pub fn phi_p(&self) -> f64 {
        self.phi_p
    }

    /// Native (phi, theta) to celestial (lng, lat).
    pub fn native_to_celestial(&self, native: Point2D) -> Point2D {
        let (phi, theta) = (native.x, native.y);

        if self.sin_delta_p == 0.0 {
            // Pure change of longitude origin.
            let (lng, lat) = if self.delta_p == 0.0 {
                let dlng = (self.alpha_p - 180.0 - self.phi_p) % 360.0;
                (phi + dlng, theta)
            } else {
                let dlng = (self.alpha_p + self.phi_p) % 360.0;
                (dlng - phi, -theta)
            };
            return Point2D::new(self.normalize_lng(lng), lat);
        }

        let dphi = phi - self.phi_p;
        let sinthe = dmath::sin(theta);
        let costhe = dmath::cos(theta);
        let costhe3 = costhe * self.cos_delta_p;
        let costhe4 = costhe * self.sin_delta_p;
        let sinthe3 = sinthe * self.cos_delta_p;
        let sinthe4 = sinthe * self.sin_delta_p;
        let sinphi = dmath::sin(dphi);
        let cosphi = dmath::cos(dphi);

        let mut x = sinthe4 - costhe3 * cosphi;
        if x.abs() < TOL {
            x = -dmath::cos(theta + self.delta_p) + costhe3 * (1.0 - cosphi);
        }
        let y = -costhe * sinphi;

        let dlng = if x != 0.0 || y != 0.0 {
            dmath::atan2(y, x)
        } else if self.delta_p < 90.0 {
            dphi + 180.0
        } else {
            -dphi
        };
        let lng = self.normalize_lng(self.alpha_p + dlng);

        let z = sinthe3 + costhe4 * cosphi;
        let lat = if z.abs() > ASIN_LIMIT {
            dmath::acos(x.hypot(y)).copysign(z)
        } else {
            dmath::asin(z)
        };

        Point2D::new(lng, lat)
    }

    /// Celestial (lng, lat) to native (phi, theta).
    pub fn celestial_to_native(&self, celestial: Point2D) -> Point2D {
        let (lng, lat) = (celestial.x, celestial.y);

        if self.sin_delta_p == 0.0 {
            let (phi, theta) = if self.delta_p == 0.0 {
                let dphi = (self.phi_p - 180.0 - self.alpha_p) % 360.0;
                ((lng + dphi) % 360.0, lat)
            } else {
                let dphi = (self.phi_p + self.alpha_p) % 360.0;
                ((dphi - lng) % 360.0, -lat)
            };
            return Point2D::new(wrap_180(phi), theta);
        }

        let dlng = lng - self.alpha_p;
        let sinlat = dmath::sin(lat);
        let coslat = dmath::cos(lat);
        let coslat3 = coslat * self.cos_delta_p;
        let coslat4 = coslat * self.sin_delta_p;
        let sinlat3 = sinlat * self.cos_delta_p;
        let sinlat4 = sinlat * self.sin_delta_p;
        let sinlng = dmath::sin(dlng);
        let coslng = dmath::cos(dlng);

        let mut x = sinlat4 - coslat3 * coslng;
        if x.abs() < TOL {
            x = -dmath::cos(lat + self.delta_p) + coslat3 * (1.0 - coslng);
        }
        let y = -coslat * sinlng;

        let dphi = if x != 0.0 || y != 0.0 {
            dmath::atan2(y, x)
        } else if self.delta_p < 90.0 {
            dlng - 180.0
        } else {
            -dlng
        };
        let phi = wrap_180((self.phi_p + dphi) % 360.0);

        let z = sinlat3 + coslat4 * coslng;
        let theta = if z.abs() > ASIN_LIMIT {
            dmath::acos(x.hypot(y)).copysign(z)
        } else {
            dmath::asin(z)
        };

        Point2D::new(phi, theta)
    }

    /// Give a celestial longitude the sign of `alpha_p`, within one turn.
    fn normalize_lng(&self, lng: f64) -> f64 {
        let mut lng = lng;
        if self.alpha_p >= 0.0 {
            if lng < 0.0 {
                lng += 360.0;
            }
        } else if lng > 0.0 {
            lng -= 360.0;
        }
        if lng > 360.0 {
            lng -= 360.0;
        } else if lng < -360.0 {
            lng += 360.0;
        }
        lng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() < tol,
            "expected {a} ~= {b} (diff = {})",
            (a - b).abs()
        );
    }

    fn assert_lng_close(a: f64, b: f64, tol: f64) {
        assert_close(wrap_180(a - b), 0.0, tol);
    }

    #[test]
    fn pole_fiducial_is_degenerate() {
        for &(lng0, lat0) in &[(0.0, 0.0), (150.0, 30.0), (-45.0, -60.0), (359.0, 89.0)] {
            let rot = SphericalRotation::new(lng0, lat0, 0.0, 90.0, Some(0.0), None).unwrap();
            assert_eq!(rot.alpha_p(), lng0);
            assert_eq!(rot.latpole(), lat0);
            assert_eq!(rot.delta_p(), 90.0 - lat0);
            assert_eq!(rot.phi_p(), 0.0);
        }
    }

    #[test]
    fn default_phip_rule() {
        assert_eq!(default_phip(30.0, 0.0, 90.0), 180.0);
        assert_eq!(default_phip(90.0, 0.0, 90.0), 0.0);
        assert_eq!(default_phip(30.0, 0.0, 0.0), 0.0);
        assert_eq!(default_phip(-30.0, 0.0, 0.0), 180.0);
        assert_eq!(default_phip(-30.0, 90.0, 0.0), -90.0);
    }

    #[test]
    fn sentinel_phip_uses_default() {
        let a = SphericalRotation::new(150.0, 30.0, 0.0, 90.0, Some(UNDEFINED_POLE), None).unwrap();
        let b = SphericalRotation::new(150.0, 30.0, 0.0, 90.0, None, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.phi_p(), 180.0);
    }

    #[test]
    fn fiducial_maps_to_native_fiducial() {
        for &(phi0, theta0) in &[(0.0, 90.0), (0.0, 0.0)] {
            for &(lng0, lat0) in &[(150.0, 30.0), (10.0, -45.0), (270.0, 5.0), (-20.0, 70.0)] {
                let rot = SphericalRotation::new(lng0, lat0, phi0, theta0, None, None).unwrap();
                let native = rot.celestial_to_native(Point2D::new(lng0, lat0));
                assert_close(native.y, theta0, 1e-9);
                if theta0 < 90.0 {
                    assert_lng_close(native.x, phi0, 1e-9);
                }
                let back = rot.native_to_celestial(Point2D::new(phi0, theta0));
                assert_lng_close(back.x, lng0, 1e-9);
                assert_close(back.y, lat0, 1e-9);
            }
        }
    }

    #[test]
    fn cylindrical_native_pole() {
        // Fiducial (150, 30) on the native equator: the native pole sits
        // 90 degrees away on the opposite meridian.
        let rot = SphericalRotation::new(150.0, 30.0, 0.0, 0.0, None, None).unwrap();
        assert_close(rot.latpole(), 60.0, 1e-9);
        assert_close(rot.alpha_p(), 330.0, 1e-9);
        assert_close(rot.delta_p(), 30.0, 1e-9);
        assert_eq!(rot.phi_p(), 0.0);
    }

    #[test]
    fn equatorial_fiducial_is_pure_longitude_shift() {
        let rot = SphericalRotation::new(40.0, 0.0, 0.0, 0.0, None, None).unwrap();
        assert_eq!(rot.delta_p(), 0.0);
        let native = rot.celestial_to_native(Point2D::new(55.0, 12.0));
        assert_close(native.x, 15.0, 1e-12);
        assert_close(native.y, 12.0, 1e-12);
        let back = rot.native_to_celestial(native);
        assert_close(back.x, 55.0, 1e-12);
        assert_close(back.y, 12.0, 1e-12);
    }

    #[test]
    fn round_trip_grid() {
        for &(lng0, lat0, theta0) in &[
            (150.0, 30.0, 90.0),
            (0.0, -89.0, 90.0),
            (200.0, 45.0, 0.0),
            (-30.0, -10.0, 0.0),
        ] {
            let rot = SphericalRotation::new(lng0, lat0, 0.0, theta0, None, None).unwrap();
            for ilng in 0..12 {
                for ilat in -8..=8 {
                    let p = Point2D::new(ilng as f64 * 30.0 + 5.0, ilat as f64 * 10.0 + 1.0);
                    let native = rot.celestial_to_native(p);
                    let back = rot.native_to_celestial(native);
                    assert_lng_close(back.x, p.x, 1e-9);
                    assert_close(back.y, p.y, 1e-9);
                }
            }
        }
    }

    #[test]
    fn near_pole_latitudes_use_acos_branch() {
        let rot = SphericalRotation::new(10.0, 20.0, 0.0, 90.0, None, None).unwrap();
        let p = Point2D::new(10.0001, 19.9999);
        let native = rot.celestial_to_native(p);
        assert!(native.y > 89.99);
        let back = rot.native_to_celestial(native);
        assert_close(back.x, p.x, 1e-9);
        assert_close(back.y, p.y, 1e-9);
    }

    #[test]
    fn invalid_theta0_is_rejected() {
        let err = SphericalRotation::new(0.0, 0.0, 0.0, 95.0, None, None).unwrap_err();
        assert!(matches!(err, ProjectionError::InvalidFiducialLatitude(_)));
    }

    #[test]
    fn inconsistent_triangle_is_rejected() {
        // With phi0 = 90 and theta0 = 0 the native fiducial lies on the
        // great circle through both poles only for lat0 = 0.
        let err = SphericalRotation::new(0.0, 30.0, 90.0, 0.0, Some(0.0), None).unwrap_err();
        assert!(matches!(err, ProjectionError::InconsistentTriangle { .. }));
    }
}
