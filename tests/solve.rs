//! End-to-end solves on synthetic control points.

use std::sync::Arc;

use approx::assert_abs_diff_eq;

use meridian::control::{ControlPoint, ControlPointSet};
use meridian::geom::point::Point2D;
use meridian::metadata::{ImageMetadata, ImageSize, ImageWcs};
use meridian::projection::{Origin, Projection, ProjectionCode, ProjectionConfig, projection_factory};
use meridian::solver::{SolverConfig, solve};
use meridian::transform::LinearTransform;

/// Known solution: `code` at `(ra0, dec0)`, `scale` deg/pixel, image center
/// on the reference point, rotated by `angle` degrees.
fn known_solution(
    code: ProjectionCode,
    ra0: f64,
    dec0: f64,
    scale: f64,
    angle: f64,
    size: ImageSize,
) -> ImageMetadata {
    let config = ProjectionConfig {
        code,
        origin: Origin::OwnCenter,
    };
    let projection: Arc<dyn Projection> = Arc::from(projection_factory(&config, ra0, dec0).unwrap());
    let (sin, cos) = angle.to_radians().sin_cos();
    let c = size.center();
    let r0 = [-cos * scale, sin * scale];
    let r1 = [-sin * scale, -cos * scale];
    let linear = LinearTransform::new([
        [r0[0], r0[1], -(r0[0] * c.x + r0[1] * c.y)],
        [r1[0], r1[1], -(r1[0] * c.x + r1[1] * c.y)],
    ]);
    ImageMetadata::new(projection, linear, size).unwrap()
}

fn grid_points(truth: &ImageMetadata, n: usize) -> ControlPointSet {
    let size = truth.size();
    let mut points = Vec::new();
    for iy in 0..n {
        for ix in 0..n {
            let fx = 0.05 + 0.9 * ix as f64 / (n - 1) as f64;
            let fy = 0.05 + 0.9 * iy as f64 / (n - 1) as f64;
            let target = Point2D::new(size.width as f64 * fx, size.height as f64 * fy);
            let sky = truth.convert_i_rd(target).unwrap();
            points.push(ControlPoint::Sky { sky, target });
        }
    }
    ControlPointSet::new(points)
}

#[test]
fn converges_to_generating_center_for_every_projection() {
    let size = ImageSize::new(3000, 2000);
    for code in ProjectionCode::ALL {
        let truth = known_solution(code, 245.0, -12.5, 1.5 / 3600.0, 23.0, size);
        let points = grid_points(&truth, 3);
        assert!(points.len() >= 6);

        let config = SolverConfig {
            projection: Some(code),
            ..Default::default()
        };
        let result = solve(None, &points, size, &config).unwrap();
        assert!(result.report.converged, "{code}: {:?}", result.report);
        assert!(result.report.iterations <= 15);
        assert!(result.report.offset_arcsec <= 1e-4);

        let center = result.metadata.center().unwrap();
        assert_abs_diff_eq!(center.x, 245.0, epsilon = 1e-6);
        assert_abs_diff_eq!(center.y, -12.5, epsilon = 1e-6);
        assert_abs_diff_eq!(result.metadata.resolution(), 1.5 / 3600.0, epsilon = 1e-10);
    }
}

#[test]
fn field_across_ra_zero() {
    let size = ImageSize::new(1024, 1024);
    let truth = known_solution(ProjectionCode::Gnomonic, 0.05, 41.0, 10.0 / 3600.0, -70.0, size);
    let points = grid_points(&truth, 4);
    let result = solve(None, &points, size, &SolverConfig::default()).unwrap();
    let center = result.metadata.center().unwrap();
    let dra = (center.x - 0.05 + 180.0).rem_euclid(360.0) - 180.0;
    assert_abs_diff_eq!(dra, 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(center.y, 41.0, epsilon = 1e-6);
}

#[test]
fn solution_survives_json_round_trip() {
    let size = ImageSize::new(1600, 1200);
    let truth = known_solution(ProjectionCode::ZenithalEqualArea, 120.0, 65.0, 4.0 / 3600.0, 90.0, size);
    let points = grid_points(&truth, 4);
    let result = solve(None, &points, size, &SolverConfig::default()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("target.json");
    result.metadata.to_image_wcs().save_json(&path).unwrap();
    let reloaded = ImageMetadata::from_image_wcs(&ImageWcs::load_json(&path).unwrap()).unwrap();

    for point in points.iter() {
        let ControlPoint::Sky { sky, target } = *point else {
            unreachable!()
        };
        let pixel = reloaded.convert_rd_i(sky).unwrap();
        assert_abs_diff_eq!(pixel.x, target.x, epsilon = 1e-4);
        assert_abs_diff_eq!(pixel.y, target.y, epsilon = 1e-4);
    }
}

#[test]
fn control_points_from_csv_file() {
    let size = ImageSize::new(800, 600);
    let truth = known_solution(ProjectionCode::PlateCarree, 10.0, 5.0, 6.0 / 3600.0, 0.0, size);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("points.csv");

    let mut text = String::from("target_x,target_y,ra,dec\n");
    for point in grid_points(&truth, 3).iter() {
        let ControlPoint::Sky { sky, target } = *point else {
            unreachable!()
        };
        text.push_str(&format!("{},{},{},{}\n", target.x, target.y, sky.x, sky.y));
    }
    text.push_str("1,2,,\n");
    std::fs::write(&path, text).unwrap();

    let points = ControlPointSet::from_path(&path).unwrap();
    assert_eq!(points.len(), 9);
    let result = solve(None, &points, size, &SolverConfig::default()).unwrap();
    let center = result.metadata.center().unwrap();
    assert_abs_diff_eq!(center.x, 10.0, epsilon = 1e-6);
    assert_abs_diff_eq!(center.y, 5.0, epsilon = 1e-6);
}
