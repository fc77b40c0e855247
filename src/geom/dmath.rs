//! Trigonometry in degrees.
//!
//! `sin` and `cos` return exact values at multiples of 90 degrees so that
//! the degenerate branches of the spherical rotation (which compare
//! against exact zero) are taken when the geometry is exactly degenerate.
//! `asin` and `acos` tolerate arguments that overshoot +/-1 by roundoff.

/// Overshoot of +/-1 accepted by [`asin`] and [`acos`].
const INVERSE_TOL: f64 = 1.0e-10;

/// Quadrant `k` in `0..4` of an exact multiple of 90 degrees, so that
/// `angle = 90 k (mod 360)`.
fn quadrant(angle: f64) -> Option<u8> {
    if angle % 90.0 == 0.0 {
        Some((angle / 90.0).round().rem_euclid(4.0) as u8)
    } else {
        None
    }
}

pub fn sin(angle: f64) -> f64 {
    match quadrant(angle) {
        Some(1) => 1.0,
        Some(3) => -1.0,
        Some(_) => 0.0,
        None => angle.to_radians().sin(),
    }
}

pub fn cos(angle: f64) -> f64 {
    match quadrant(angle) {
        Some(0) => 1.0,
        Some(2) => -1.0,
        Some(_) => 0.0,
        None => angle.to_radians().cos(),
    }
}

pub fn tan(angle: f64) -> f64 {
    if angle % 180.0 == 0.0 {
        return 0.0;
    }
    angle.to_radians().tan()
}

/// Arc sine in degrees. NaN when `|v| > 1 + 1e-10`.
pub fn asin(v: f64) -> f64 {
    if v <= -1.0 {
        if v + 1.0 > -INVERSE_TOL {
            return -90.0;
        }
    } else if v == 0.0 {
        return 0.0;
    } else if v >= 1.0 && v - 1.0 < INVERSE_TOL {
        return 90.0;
    }
    v.asin().to_degrees()
}

/// Arc cosine in degrees. NaN when `|v| > 1 + 1e-10`.
pub fn acos(v: f64) -> f64 {
    if v >= 1.0 {
        if v - 1.0 < INVERSE_TOL {
            return 0.0;
        }
    } else if v == 0.0 {
        return 90.0;
    } else if v <= -1.0 && v + 1.0 > -INVERSE_TOL {
        return 180.0;
    }
    v.acos().to_degrees()
}

pub fn atan(v: f64) -> f64 {
    if v == 0.0 {
        return 0.0;
    }
    v.atan().to_degrees()
}

/// Two-argument arc tangent in degrees, exact on the axes.
pub fn atan2(y: f64, x: f64) -> f64 {
    if y == 0.0 {
        if x >= 0.0 {
            return 0.0;
        }
        return 180.0;
    }
    if x == 0.0 {
        if y > 0.0 {
            return 90.0;
        }
        return -90.0;
    }
    y.atan2(x).to_degrees()
}
