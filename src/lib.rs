//! Celestial map projections and control-point plate solving.
//!
//! Meridian maps sky coordinates onto projection planes (TAN, STG, CAR,
//! MER, AIT, ZEA, SIN) following the FITS WCS conventions, and solves an
//! image from control points: pixels with known sky positions, or pixels
//! matched against an already solved reference image. The result is a
//! linear or thin-plate spline pixel <-> plane mapping on a re-centered
//! projection.

pub mod control;
pub mod geom;
pub mod metadata;
pub mod projection;
pub mod solver;
pub mod transform;

pub use control::{ControlPoint, ControlPointSet};
pub use geom::point::Point2D;
pub use metadata::{ImageMetadata, ImageSize, ImageWcs};
pub use projection::{Projection, ProjectionCode, ProjectionConfig, ProjectionError};
pub use solver::{FitResult, SolveError, SolveReport, SolverConfig, solve};
