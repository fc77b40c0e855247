//! Solved image metadata: the projection plus the fitted pixel <-> plane
//! mappings, and the exports built on top of them.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::control::ControlPointSet;
use crate::geom::dmath;
use crate::geom::point::Point2D;
use crate::projection::{Projection, WcsKeywords, projection_from_wcs};
use crate::solver::SolveError;
use crate::transform::{LinearTransform, Mapping, SplinePair};

/// First line of a distortion export.
pub const DISTORTION_CSV_HEADER: [&str; 2] = ["ThinPlate", "2"];

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Geometric center, in pixel coordinates.
    pub fn center(&self) -> Point2D {
        Point2D::new(self.width as f64 / 2.0, self.height as f64 / 2.0)
    }
}

/// Linear WCS of an image in FITS terms: 1-based pixels with the y axis
/// pointing up, CD matrix in degrees per pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageWcs {
    #[serde(flatten)]
    pub keywords: WcsKeywords,
    pub crpix1: f64,
    pub crpix2: f64,
    pub cd1_1: f64,
    pub cd1_2: f64,
    pub cd2_1: f64,
    pub cd2_2: f64,
    pub width: u32,
    pub height: u32,
}

impl ImageWcs {
    pub fn load_json(path: &Path) -> Result<Self, SolveError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn save_json(&self, path: &Path) -> Result<(), SolveError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Predicted against measured target pixel for one control point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Residual {
    pub target: Point2D,
    /// `None` when the sky position does not project.
    pub predicted: Option<Point2D>,
}

impl Residual {
    /// Distance in pixels between prediction and measurement.
    pub fn error(&self) -> Option<f64> {
        self.predicted.map(|p| p.distance_sq(&self.target).sqrt())
    }
}

/// Pixel displacement between the spline and the linear solution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistortionSample {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
}

/// Astrometric solution of one image.
///
/// Pixel coordinates have their origin at the top-left corner of the image
/// with y growing downwards. `ref_i_g` maps pixels to the projection plane,
/// `ref_g_i` goes back.
#[derive(Debug, Clone)]
pub struct ImageMetadata {
    projection: Arc<dyn Projection>,
    linear: LinearTransform,
    linear_inverse: LinearTransform,
    ref_i_g: Mapping,
    ref_g_i: Mapping,
    size: ImageSize,
    resolution: f64,
    pixel_size: Option<f64>,
    focal: Option<f64>,
}

impl ImageMetadata {
    /// Linear solution.
    pub fn new(
        projection: Arc<dyn Projection>,
        linear: LinearTransform,
        size: ImageSize,
    ) -> Result<Self, SolveError> {
        let linear_inverse = linear.inverse().ok_or(SolveError::SingularFit)?;
        Ok(Self {
            projection,
            linear,
            linear_inverse,
            ref_i_g: Mapping::Linear(linear),
            ref_g_i: Mapping::Linear(linear_inverse),
            size,
            resolution: linear.mean_scale(),
            pixel_size: None,
            focal: None,
        })
    }

    /// Use the splines for conversions; the linear part is kept for
    /// resolution and WCS export.
    pub fn with_spline(mut self, splines: SplinePair) -> Self {
        self.ref_i_g = Mapping::Spline(splines.forward);
        self.ref_g_i = Mapping::Spline(splines.inverse);
        self
    }

    /// Pixel size in micrometres; also derives the focal length.
    pub fn with_pixel_size(mut self, pixel_size_um: f64) -> Self {
        self.pixel_size = Some(pixel_size_um);
        self.focal = Some(pixel_size_um / dmath::tan(self.resolution) / 1000.0)
            .filter(|f| f.is_finite());
        self
    }

    /// Pixel to (RA, Dec).
    pub fn convert_i_rd(&self, pixel: Point2D) -> Option<Point2D> {
        let plane = self.ref_i_g.apply(pixel).finite()?;
        self.projection.inverse(plane)
    }

    /// (RA, Dec) to pixel.
    pub fn convert_rd_i(&self, sky: Point2D) -> Option<Point2D> {
        let plane = self.projection.direct(sky)?;
        self.ref_g_i.apply(plane).finite()
    }

    /// Sky position of the image center.
    pub fn center(&self) -> Option<Point2D> {
        self.convert_i_rd(self.size.center())
    }

    pub fn projection(&self) -> &dyn Projection {
        self.projection.as_ref()
    }

    pub fn projection_arc(&self) -> Arc<dyn Projection> {
        Arc::clone(&self.projection)
    }

    /// Linear pixel to plane map.
    pub fn linear(&self) -> &LinearTransform {
        &self.linear
    }

    pub fn ref_i_g(&self) -> &Mapping {
        &self.ref_i_g
    }

    pub fn ref_g_i(&self) -> &Mapping {
        &self.ref_g_i
    }

    pub fn has_spline(&self) -> bool {
        self.ref_i_g.is_spline()
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Degrees per pixel.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Micrometres.
    pub fn pixel_size(&self) -> Option<f64> {
        self.pixel_size
    }

    /// Millimetres.
    pub fn focal(&self) -> Option<f64> {
        self.focal
    }

    /// Predicted pixel of every control point next to its measured pixel.
    pub fn residuals(
        &self,
        points: &ControlPointSet,
        reference: Option<&ImageMetadata>,
    ) -> Result<Vec<Residual>, SolveError> {
        Ok(points
            .sky_points(reference)?
            .into_iter()
            .map(|(sky, target)| Residual {
                target,
                predicted: self.convert_rd_i(sky),
            })
            .collect())
    }

    /// `n x n` samples at the centers of a regular grid over the image.
    /// Each sample holds how far the linear solution moves the point the
    /// spline solution assigns to that pixel.
    pub fn distortion_grid(&self, n: usize) -> Result<Vec<DistortionSample>, SolveError> {
        let Mapping::Spline(spline) = &self.ref_i_g else {
            return Err(SolveError::DistortionUnavailable);
        };
        let w = self.size.width as f64;
        let h = self.size.height as f64;
        let mut samples = Vec::with_capacity(n * n);
        for iy in 0..n {
            for ix in 0..n {
                let pixel = Point2D::new(
                    (ix as f64 + 0.5) * w / n as f64,
                    (iy as f64 + 0.5) * h / n as f64,
                );
                let linear = self.linear_inverse.apply(spline.apply(pixel));
                samples.push(DistortionSample {
                    x: pixel.x,
                    y: pixel.y,
                    dx: linear.x - pixel.x,
                    dy: linear.y - pixel.y,
                });
            }
        }
        Ok(samples)
    }

    /// Write the distortion grid as CSV: a `ThinPlate,2` line followed by
    /// one `x,y,dx,dy` line per sample.
    pub fn write_distortion_csv<W: Write>(&self, writer: W, n: usize) -> Result<(), SolveError> {
        let samples = self.distortion_grid(n)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(writer);
        wtr.write_record(DISTORTION_CSV_HEADER)?;
        for s in &samples {
            wtr.write_record(&[
                format!("{:.6}", s.x),
                format!("{:.6}", s.y),
                format!("{:.6}", s.dx),
                format!("{:.6}", s.dy),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Linear part of the solution as FITS WCS keywords.
    pub fn to_image_wcs(&self) -> ImageWcs {
        let m = self.linear.matrix();
        let h = self.size.height as f64;
        // Pixel where the plane origin falls.
        let origin = self.linear_inverse.apply(Point2D::new(0.0, 0.0));
        ImageWcs {
            keywords: self.projection.wcs(),
            crpix1: origin.x + 0.5,
            crpix2: h - origin.y + 0.5,
            cd1_1: m[0][0],
            cd1_2: -m[0][1],
            cd2_1: m[1][0],
            cd2_2: -m[1][1],
            width: self.size.width,
            height: self.size.height,
        }
    }

    /// Linear solution from FITS WCS keywords.
    pub fn from_image_wcs(wcs: &ImageWcs) -> Result<Self, SolveError> {
        let projection: Arc<dyn Projection> = Arc::from(projection_from_wcs(&wcs.keywords)?);
        let h = wcs.height as f64;
        let u = 0.5 - wcs.crpix1;
        let v = h + 0.5 - wcs.crpix2;
        let linear = LinearTransform::new([
            [wcs.cd1_1, -wcs.cd1_2, wcs.cd1_1 * u + wcs.cd1_2 * v],
            [wcs.cd2_1, -wcs.cd2_2, wcs.cd2_1 * u + wcs.cd2_2 * v],
        ]);
        Self::new(projection, linear, ImageSize::new(wcs.width, wcs.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlPoint;
    use crate::projection::{Origin, ProjectionCode, ProjectionConfig, projection_factory};
    use crate::transform::SplinePair;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() < tol,
            "expected {a} ~= {b} (diff = {})",
            (a - b).abs()
        );
    }

    /// 1 arcsec/pixel, north up, east left, image center on the reference
    /// point.
    fn simple_metadata(code: ProjectionCode) -> ImageMetadata {
        let config = ProjectionConfig {
            code,
            origin: Origin::OwnCenter,
        };
        let projection: Arc<dyn Projection> =
            Arc::from(projection_factory(&config, 150.0, 30.0).unwrap());
        let s = 1.0 / 3600.0;
        let linear = LinearTransform::new([[-s, 0.0, 500.0 * s], [0.0, -s, 400.0 * s]]);
        ImageMetadata::new(projection, linear, ImageSize::new(1000, 800)).unwrap()
    }

    #[test]
    fn center_pixel_is_reference_point() {
        let meta = simple_metadata(ProjectionCode::Gnomonic);
        let c = meta.center().unwrap();
        assert_close(c.x, 150.0, 1e-12);
        assert_close(c.y, 30.0, 1e-12);
        assert_close(meta.resolution(), 1.0 / 3600.0, 1e-18);
    }

    #[test]
    fn pixel_sky_round_trip() {
        let meta = simple_metadata(ProjectionCode::ZenithalEqualArea);
        for &(x, y) in &[(0.0, 0.0), (999.0, 10.0), (250.5, 700.25)] {
            let sky = meta.convert_i_rd(Point2D::new(x, y)).unwrap();
            let back = meta.convert_rd_i(sky).unwrap();
            assert_close(back.x, x, 1e-6);
            assert_close(back.y, y, 1e-6);
        }
        // Up is north, left is east.
        let up = meta.convert_i_rd(Point2D::new(500.0, 300.0)).unwrap();
        assert!(up.y > 30.0);
        let left = meta.convert_i_rd(Point2D::new(400.0, 400.0)).unwrap();
        assert!(left.x > 150.0);
    }

    #[test]
    fn focal_from_pixel_size() {
        let meta = simple_metadata(ProjectionCode::Gnomonic).with_pixel_size(3.76);
        let expected = 3.76 / (1.0f64 / 3600.0).to_radians().tan() / 1000.0;
        assert_close(meta.focal().unwrap(), expected, 1e-6);
        assert_eq!(meta.pixel_size(), Some(3.76));
    }

    #[test]
    fn image_wcs_round_trip() {
        for code in [ProjectionCode::Gnomonic, ProjectionCode::Stereographic] {
            let meta = simple_metadata(code);
            let wcs = meta.to_image_wcs();
            // Center pixel (500, 400) is FITS (500.5, 400.5).
            assert_close(wcs.crpix1, 500.5, 1e-9);
            assert_close(wcs.crpix2, 400.5, 1e-9);
            assert_close(wcs.cd1_1, -1.0 / 3600.0, 1e-18);
            assert_close(wcs.cd2_2, 1.0 / 3600.0, 1e-18);

            let rebuilt = ImageMetadata::from_image_wcs(&wcs).unwrap();
            for &(x, y) in &[(10.0, 20.0), (900.0, 780.0)] {
                let a = meta.convert_i_rd(Point2D::new(x, y)).unwrap();
                let b = rebuilt.convert_i_rd(Point2D::new(x, y)).unwrap();
                assert_close(a.x, b.x, 1e-10);
                assert_close(a.y, b.y, 1e-10);
            }
        }
    }

    #[test]
    fn image_wcs_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solution.json");
        let wcs = simple_metadata(ProjectionCode::HammerAitoff).to_image_wcs();
        wcs.save_json(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"ctype1\": \"RA---AIT\""));
        assert_eq!(ImageWcs::load_json(&path).unwrap(), wcs);
    }

    #[test]
    fn residuals_of_exact_points_vanish() {
        let meta = simple_metadata(ProjectionCode::Gnomonic);
        let points: ControlPointSet = [(100.0, 100.0), (800.0, 600.0)]
            .into_iter()
            .map(|(x, y)| {
                let target = Point2D::new(x, y);
                ControlPoint::Sky {
                    sky: meta.convert_i_rd(target).unwrap(),
                    target,
                }
            })
            .collect();
        let residuals = meta.residuals(&points, None).unwrap();
        assert_eq!(residuals.len(), 2);
        for r in residuals {
            assert!(r.error().unwrap() < 1e-6);
        }
    }

    #[test]
    fn distortion_requires_spline() {
        let meta = simple_metadata(ProjectionCode::Gnomonic);
        assert!(matches!(
            meta.distortion_grid(4),
            Err(SolveError::DistortionUnavailable)
        ));
        let mut out = Vec::new();
        assert!(meta.write_distortion_csv(&mut out, 4).is_err());
    }

    #[test]
    fn distortion_of_linear_spline_is_zero() {
        let meta = simple_metadata(ProjectionCode::Gnomonic);
        let pixels: Vec<Point2D> = (0..5)
            .flat_map(|i| (0..5).map(move |j| Point2D::new(i as f64 * 200.0, j as f64 * 160.0 + i as f64)))
            .collect();
        let plane: Vec<Point2D> = pixels.iter().map(|&p| meta.linear().apply(p)).collect();
        let meta = meta.with_spline(SplinePair::fit(&pixels, &plane, 0.0).unwrap());
        assert!(meta.has_spline());

        let grid = meta.distortion_grid(3).unwrap();
        assert_eq!(grid.len(), 9);
        assert_close(grid[0].x, 1000.0 / 6.0, 1e-12);
        assert_close(grid[0].y, 800.0 / 6.0, 1e-12);
        for s in &grid {
            assert_close(s.dx, 0.0, 1e-6);
            assert_close(s.dy, 0.0, 1e-6);
        }

        let mut out = Vec::new();
        meta.write_distortion_csv(&mut out, 3).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "ThinPlate,2");
        assert!(lines[1].starts_with("166.666667,133.333333,"));
        assert_eq!(lines[1].split(',').count(), 4);
    }
}
