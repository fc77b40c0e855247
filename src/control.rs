//! Control points: target-image pixels paired with a known sky position or
//! with the matching pixel of an already solved reference image.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::debug;
use serde::Deserialize;

use crate::geom::point::Point2D;
use crate::metadata::ImageMetadata;
use crate::solver::SolveError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlPoint {
    /// Known (RA, Dec) of the target pixel.
    Sky { sky: Point2D, target: Point2D },
    /// Pixel in the reference image showing the same star.
    Pixel { reference: Point2D, target: Point2D },
}

impl ControlPoint {
    pub fn target(&self) -> Point2D {
        match self {
            ControlPoint::Sky { target, .. } | ControlPoint::Pixel { target, .. } => *target,
        }
    }

    /// Both coordinates pairs are finite.
    pub fn is_valid(&self) -> bool {
        match self {
            ControlPoint::Sky { sky, target } => sky.is_finite() && target.is_finite(),
            ControlPoint::Pixel { reference, target } => {
                reference.is_finite() && target.is_finite()
            }
        }
    }
}

/// One CSV row. Either `ref_x`/`ref_y` or `ra`/`dec` must be present.
#[derive(Debug, Deserialize)]
struct ControlPointRecord {
    target_x: f64,
    target_y: f64,
    #[serde(default)]
    ref_x: Option<f64>,
    #[serde(default)]
    ref_y: Option<f64>,
    #[serde(default)]
    ra: Option<f64>,
    #[serde(default)]
    dec: Option<f64>,
}

impl ControlPointRecord {
    fn into_control_point(self) -> Option<ControlPoint> {
        let target = Point2D::new(self.target_x, self.target_y);
        match (self.ref_x, self.ref_y, self.ra, self.dec) {
            (Some(x), Some(y), _, _) => Some(ControlPoint::Pixel {
                reference: Point2D::new(x, y),
                target,
            }),
            (_, _, Some(ra), Some(dec)) => Some(ControlPoint::Sky {
                sky: Point2D::new(ra, dec),
                target,
            }),
            _ => None,
        }
    }
}

/// Ordered, validated control points for one solve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlPointSet {
    points: Vec<ControlPoint>,
}

impl ControlPointSet {
    /// Keep the valid points, in order.
    pub fn new(points: impl IntoIterator<Item = ControlPoint>) -> Self {
        let points = points
            .into_iter()
            .enumerate()
            .filter_map(|(i, p)| {
                if p.is_valid() {
                    Some(p)
                } else {
                    debug!("dropping control point {i}: non-finite coordinates");
                    None
                }
            })
            .collect();
        Self { points }
    }

    /// Read points from CSV with a header row. Columns `target_x` and
    /// `target_y` are required; the source is `ref_x`/`ref_y` or
    /// `ra`/`dec`. Rows without a source or with non-finite values are
    /// skipped.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let mut points = Vec::new();
        for (row, record) in rdr.deserialize::<ControlPointRecord>().enumerate() {
            match record?.into_control_point() {
                Some(point) => points.push(point),
                None => debug!("dropping CSV row {}: no reference pixel or sky position", row + 1),
            }
        }
        Ok(Self::new(points))
    }

    pub fn from_path(path: &Path) -> Result<Self, SolveError> {
        let file = File::open(path)?;
        Ok(Self::from_csv_reader(BufReader::new(file))?)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControlPoint> {
        self.points.iter()
    }

    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    /// `(sky, target pixel)` for every point. Pixel pairs go through the
    /// reference image's solution; those whose reference pixel has no sky
    /// position are left out.
    pub fn sky_points(
        &self,
        reference: Option<&ImageMetadata>,
    ) -> Result<Vec<(Point2D, Point2D)>, SolveError> {
        let mut out = Vec::with_capacity(self.points.len());
        for (i, point) in self.points.iter().enumerate() {
            match *point {
                ControlPoint::Sky { sky, target } => out.push((sky, target)),
                ControlPoint::Pixel {
                    reference: pixel,
                    target,
                } => {
                    let metadata = reference.ok_or(SolveError::ReferenceUnsolved)?;
                    match metadata.convert_i_rd(pixel) {
                        Some(sky) => out.push((sky, target)),
                        None => debug!(
                            "control point {i}: reference pixel ({:.2}, {:.2}) has no sky position",
                            pixel.x, pixel.y
                        ),
                    }
                }
            }
        }
        Ok(out)
    }
}

impl FromIterator<ControlPoint> for ControlPointSet {
    fn from_iter<I: IntoIterator<Item = ControlPoint>>(iter: I) -> Self {
        Self::new(iter)
    }
}
