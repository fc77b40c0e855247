use super::dmath;
use super::point::Point2D;

/// Wrap an angle in degrees into `[-180, 180]`.
pub fn wrap_180(angle: f64) -> f64 {
    let mut a = angle % 360.0;
    if a > 180.0 {
        a -= 360.0;
    } else if a < -180.0 {
        a += 360.0;
    }
    a
}

/// RA difference `ra - reference` in degrees, taking the short way round:
/// the result lies in `[-180, 180]`.
pub fn normalize_ra_delta(ra: f64, reference: f64) -> f64 {
    wrap_180(ra - reference)
}

/// Convert (RA, Dec) in degrees to a unit vector `[x, y, z]`.
pub fn radec_to_xyz(ra: f64, dec: f64) -> [f64; 3] {
    let cos_dec = dmath::cos(dec);
    [cos_dec * dmath::cos(ra), cos_dec * dmath::sin(ra), dmath::sin(dec)]
}

/// Convert a (not necessarily unit) vector to (RA, Dec) in degrees, RA in
/// `[0, 360)`.
pub fn xyz_to_radec(v: [f64; 3]) -> Point2D {
    let mut ra = dmath::atan2(v[1], v[0]);
    if ra < 0.0 {
        ra += 360.0;
    }
    let dec = dmath::atan2(v[2], v[0].hypot(v[1]));
    Point2D::new(ra, dec)
}

/// Great-circle angular distance between two unit vectors, in degrees.
pub fn angular_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dot = a[0] * b[0] + a[1] * b[1] + a[2] * b[2];
    dmath::acos(dot.clamp(-1.0, 1.0))
}

/// Great-circle separation between two (longitude, latitude) points, in degrees.
pub fn separation(a: Point2D, b: Point2D) -> f64 {
    angular_distance(radec_to_xyz(a.x, a.y), radec_to_xyz(b.x, b.y))
}

/// Cheap squared distance between two (longitude, latitude) points, in
/// squared degrees.
///
/// The longitude difference is wrapped and scaled by the cosine of the mean
/// latitude. Only meaningful for short separations, which is all the
/// broken-line heuristics need.
pub fn distance_fast(a: Point2D, b: Point2D) -> f64 {
    let dx = normalize_ra_delta(a.x, b.x) * dmath::cos((a.y + b.y) / 2.0);
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Planar sky offset between two (RA, Dec) points in degrees, with the RA
/// difference weighted by the cosine of the mean declination.
pub fn sky_offset(a: Point2D, b: Point2D) -> f64 {
    distance_fast(a, b).sqrt()
}
