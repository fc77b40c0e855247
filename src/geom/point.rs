use serde::{Deserialize, Serialize};

/// A pair of coordinates.
///
/// Used for pixel positions, native spherical coordinates, projection plane
/// coordinates and (RA, Dec) pairs alike; the caller tracks the frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// `Some(self)` when both coordinates are finite.
    pub fn finite(self) -> Option<Self> {
        self.is_finite().then_some(self)
    }

    /// Squared Euclidean distance.
    pub fn distance_sq(&self, other: &Point2D) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

impl From<(f64, f64)> for Point2D {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}
