//! Control-point plate solver.
//!
//! The target image's solution is found by iterative re-centering: the
//! projection is placed at the current center estimate, the control points
//! are projected onto its plane, and a pixel -> plane mapping is regressed.
//! The mapping then gives a new sky position for the image center, the
//! projection moves there, and the loop repeats until the center (and a
//! corner) stop moving.

use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;

use crate::control::ControlPointSet;
use crate::geom::point::Point2D;
use crate::geom::sphere::{normalize_ra_delta, sky_offset};
use crate::metadata::{ImageMetadata, ImageSize};
use crate::projection::{
    Origin, Projection, ProjectionCode, ProjectionConfig, ProjectionError, projection_factory,
};
use crate::transform::{FitError, LinearTransform, MIN_FIT_POINTS, Mapping, SplinePair};

#[derive(Error, Debug)]
pub enum SolveError {
    #[error("no control points")]
    NoControlPoints,

    #[error("need at least {required} usable control points, got {found}")]
    TooFewControlPoints { found: usize, required: usize },

    #[error("control points refer to reference pixels but the reference image has no solution")]
    ReferenceUnsolved,

    #[error("control points do not constrain the mapping (collinear or duplicated)")]
    SingularFit,

    #[error("image center falls outside the projection")]
    CenterUnprojectable,

    #[error("no convergence after {iterations} iterations (offset {offset_arcsec:.6} arcsec)")]
    NotConverged { iterations: usize, offset_arcsec: f64 },

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("solution has no distortion model")]
    DistortionUnavailable,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<FitError> for SolveError {
    fn from(err: FitError) -> Self {
        match err {
            FitError::TooFewCorrespondences { found, required } => {
                SolveError::TooFewControlPoints { found, required }
            }
            FitError::LengthMismatch { .. } | FitError::SingularMatrix => SolveError::SingularFit,
        }
    }
}

/// Configuration for [`solve`].
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Projection of the solution. `None` reuses the reference image's
    /// projection, or TAN without a reference.
    pub projection: Option<ProjectionCode>,
    /// Fit thin-plate splines on top of the linear solution.
    pub distortion: bool,
    pub max_iterations: usize,
    /// Center/corner movement (arcsec) below which the solve has converged.
    pub convergence_threshold: f64,
    /// Spline regularization; 0 interpolates the control points exactly.
    pub spline_smoothing: f64,
    /// Pixel size in micrometres, for the focal length estimate.
    pub pixel_size_um: Option<f64>,
    /// Fail instead of accepting the last iterate when not converged.
    pub strict: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            projection: None,
            distortion: false,
            max_iterations: 15,
            convergence_threshold: 1e-4,
            spline_smoothing: 0.0,
            pixel_size_um: None,
            strict: false,
        }
    }
}

/// Outcome of one re-centering step.
#[derive(Debug, Clone)]
pub struct FitIteration {
    /// Projection the fit was made in.
    pub projection: Arc<dyn Projection>,
    pub linear: LinearTransform,
    pub splines: Option<SplinePair>,
    /// Sky position of the image center under this fit.
    pub center: Point2D,
    /// Sky position of pixel (0, 0) under this fit.
    pub corner: Point2D,
    /// RMS of the plane residuals at the control points, arcsec.
    pub rms_arcsec: f64,
    /// Largest move of the center or corner, arcsec.
    pub offset_arcsec: f64,
    pub points_used: usize,
}

impl FitIteration {
    fn forward(&self) -> Mapping {
        match &self.splines {
            Some(pair) => Mapping::Spline(pair.forward.clone()),
            None => Mapping::Linear(self.linear),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub iterations: usize,
    pub converged: bool,
    pub offset_arcsec: f64,
    pub rms_arcsec: f64,
    pub points_used: usize,
}

#[derive(Debug, Clone)]
pub struct FitResult {
    pub metadata: ImageMetadata,
    pub report: SolveReport,
}

/// Center of the sky bounding rectangle of `points`, with RA unwrapped
/// around the first point so that fields across RA 0 stay contiguous.
pub fn bounding_box_center(points: &[Point2D]) -> Option<Point2D> {
    let first = points.first()?;
    let mut ra_min = f64::INFINITY;
    let mut ra_max = f64::NEG_INFINITY;
    let mut dec_min = f64::INFINITY;
    let mut dec_max = f64::NEG_INFINITY;
    for p in points {
        let ra = first.x + normalize_ra_delta(p.x, first.x);
        ra_min = ra_min.min(ra);
        ra_max = ra_max.max(ra);
        dec_min = dec_min.min(p.y);
        dec_max = dec_max.max(p.y);
    }
    let ra = ((ra_min + ra_max) / 2.0).rem_euclid(360.0);
    Some(Point2D::new(ra, (dec_min + dec_max) / 2.0))
}

/// One re-centering step: project the `(sky, target pixel)` pairs at
/// `center`, fit the pixel -> plane mapping and locate the image center and
/// corner on the sky.
///
/// Points that do not project are left out of the fit. The offset is
/// measured against `center` and, when given, `previous_corner`.
pub fn fit_iteration(
    center: Point2D,
    sky_points: &[(Point2D, Point2D)],
    size: ImageSize,
    config: &SolverConfig,
    previous_corner: Option<Point2D>,
) -> Result<FitIteration, SolveError> {
    let projection_config = ProjectionConfig {
        code: config.projection.unwrap_or(ProjectionCode::Gnomonic),
        origin: Origin::OwnCenter,
    };
    let projection: Arc<dyn Projection> =
        Arc::from(projection_factory(&projection_config, center.x, center.y)?);

    let mut pixels = Vec::with_capacity(sky_points.len());
    let mut plane = Vec::with_capacity(sky_points.len());
    for (i, &(sky, target)) in sky_points.iter().enumerate() {
        match projection.direct(sky) {
            Some(g) => {
                pixels.push(target);
                plane.push(g);
            }
            None => debug!(
                "control point {i} at ({:.6}, {:.6}) does not project from ({:.6}, {:.6})",
                sky.x, sky.y, center.x, center.y
            ),
        }
    }
    if pixels.len() < MIN_FIT_POINTS {
        return Err(SolveError::TooFewControlPoints {
            found: pixels.len(),
            required: MIN_FIT_POINTS,
        });
    }

    let linear = LinearTransform::fit(&pixels, &plane)?;
    let splines = if config.distortion {
        Some(SplinePair::fit(&pixels, &plane, config.spline_smoothing)?)
    } else {
        None
    };

    let mut iteration = FitIteration {
        projection,
        linear,
        splines,
        center,
        corner: center,
        rms_arcsec: 0.0,
        offset_arcsec: 0.0,
        points_used: pixels.len(),
    };
    let forward = iteration.forward();

    let sum_sq: f64 = pixels
        .iter()
        .zip(&plane)
        .map(|(p, g)| forward.apply(*p).distance_sq(g))
        .sum();
    let rms_arcsec = (sum_sq / pixels.len() as f64).sqrt() * 3600.0;

    let locate = |pixel: Point2D| {
        iteration
            .projection
            .inverse(forward.apply(pixel))
            .ok_or(SolveError::CenterUnprojectable)
    };
    let new_center = locate(size.center())?;
    let new_corner = locate(Point2D::new(0.0, 0.0))?;

    let center_shift = sky_offset(center, new_center);
    let corner_shift = previous_corner.map_or(0.0, |c| sky_offset(c, new_corner));

    iteration.center = new_center;
    iteration.corner = new_corner;
    iteration.rms_arcsec = rms_arcsec;
    iteration.offset_arcsec = center_shift.max(corner_shift) * 3600.0;
    Ok(iteration)
}

/// Solve the target image from control points.
///
/// `reference` is the reference image's solution, needed when control
/// points are given as reference pixels; its projection is also reused
/// when `config.projection` is `None`.
pub fn solve(
    reference: Option<&ImageMetadata>,
    points: &ControlPointSet,
    size: ImageSize,
    config: &SolverConfig,
) -> Result<FitResult, SolveError> {
    if points.is_empty() {
        return Err(SolveError::NoControlPoints);
    }
    let sky_points = points.sky_points(reference)?;
    if sky_points.len() < MIN_FIT_POINTS {
        return Err(SolveError::TooFewControlPoints {
            found: sky_points.len(),
            required: MIN_FIT_POINTS,
        });
    }

    let code = config
        .projection
        .or_else(|| reference.map(|r| r.projection().code()))
        .unwrap_or(ProjectionCode::Gnomonic);
    let config = SolverConfig {
        projection: Some(code),
        ..config.clone()
    };

    let skies: Vec<Point2D> = sky_points.iter().map(|(sky, _)| *sky).collect();
    let mut center = bounding_box_center(&skies).ok_or(SolveError::NoControlPoints)?;
    let mut corner = None;
    debug!(
        "initial center ({:.6}, {:.6}) from {} control points, projection {code}",
        center.x,
        center.y,
        sky_points.len()
    );

    let max_iterations = config.max_iterations.max(1);
    let mut iterations = 0;
    let mut converged = false;
    let mut last = None;
    while iterations < max_iterations {
        let iteration = fit_iteration(center, &sky_points, size, &config, corner)?;
        iterations += 1;
        debug!(
            "iteration {iterations}: center ({:.8}, {:.8}) offset {:.6}\" rms {:.4}\"",
            iteration.center.x, iteration.center.y, iteration.offset_arcsec, iteration.rms_arcsec
        );
        center = iteration.center;
        corner = Some(iteration.corner);
        converged = iteration.offset_arcsec <= config.convergence_threshold;
        last = Some(iteration);
        if converged {
            break;
        }
    }
    let last = last.ok_or(SolveError::NoControlPoints)?;

    if !converged {
        if config.strict {
            return Err(SolveError::NotConverged {
                iterations,
                offset_arcsec: last.offset_arcsec,
            });
        }
        warn!(
            "no convergence after {iterations} iterations (offset {:.6}\"), keeping last fit",
            last.offset_arcsec
        );
    }

    let mut metadata = ImageMetadata::new(last.projection.clone(), last.linear, size)?;
    if let Some(splines) = last.splines.clone() {
        metadata = metadata.with_spline(splines);
    }
    if let Some(pixel_size) = config.pixel_size_um {
        metadata = metadata.with_pixel_size(pixel_size);
    }

    let report = SolveReport {
        iterations,
        converged,
        offset_arcsec: last.offset_arcsec,
        rms_arcsec: last.rms_arcsec,
        points_used: last.points_used,
    };
    info!(
        "solved in {} iterations: center ({:.6}, {:.6}), {:.4}\"/px, rms {:.4}\"",
        report.iterations,
        last.center.x,
        last.center.y,
        metadata.resolution() * 3600.0,
        report.rms_arcsec
    );
    Ok(FitResult { metadata, report })
}
