use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use log::{error, info};

use meridian::control::ControlPointSet;
use meridian::geom::point::Point2D;
use meridian::metadata::{ImageMetadata, ImageSize, ImageWcs};
use meridian::projection::{Origin, ProjectionCode, ProjectionConfig, projection_factory};
use meridian::solver::{SolverConfig, solve};

#[derive(Parser)]
#[command(
    name = "meridian",
    about = "Celestial projections and control-point plate solving"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve an image from control points.
    Solve {
        /// Control point CSV (target_x, target_y and ref_x, ref_y or ra, dec).
        #[arg(short, long)]
        points: PathBuf,

        /// Solution of the reference image (JSON), needed for ref_x/ref_y points.
        #[arg(short, long)]
        reference: Option<PathBuf>,

        /// Target image width in pixels.
        #[arg(long)]
        width: u32,

        /// Target image height in pixels.
        #[arg(long)]
        height: u32,

        /// Projection code or index (TAN, STG, CAR, MER, AIT, ZEA, SIN or 0-6).
        /// Defaults to the reference image's projection.
        #[arg(long)]
        projection: Option<ProjectionCode>,

        /// Fit thin-plate splines for optical distortion.
        #[arg(long)]
        distortion: bool,

        /// Fail when the iteration does not converge.
        #[arg(long)]
        strict: bool,

        #[arg(long, default_value = "15")]
        max_iterations: usize,

        /// Convergence threshold in arcseconds.
        #[arg(long, default_value = "0.0001")]
        threshold: f64,

        /// Spline smoothing (0 interpolates exactly).
        #[arg(long, default_value = "0.0")]
        smoothing: f64,

        /// Pixel size in micrometres, for the focal length estimate.
        #[arg(long)]
        pixel_size: Option<f64>,

        /// Write the distortion grid to this CSV file (requires --distortion).
        #[arg(long)]
        distortion_csv: Option<PathBuf>,

        /// Samples per side of the distortion grid.
        #[arg(long, default_value = "10")]
        grid: usize,

        /// Write the linear solution as JSON WCS.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Project a sky position onto the projection plane.
    Project {
        #[arg(long, default_value = "TAN")]
        projection: ProjectionCode,

        /// Reference point RA (degrees).
        #[arg(long)]
        ra0: f64,

        /// Reference point Dec (degrees).
        #[arg(long, allow_hyphen_values = true)]
        dec0: f64,

        #[arg(allow_hyphen_values = true)]
        ra: f64,

        #[arg(allow_hyphen_values = true)]
        dec: f64,
    },

    /// Recover the sky position of a projection plane point.
    Unproject {
        #[arg(long, default_value = "TAN")]
        projection: ProjectionCode,

        /// Reference point RA (degrees).
        #[arg(long)]
        ra0: f64,

        /// Reference point Dec (degrees).
        #[arg(long, allow_hyphen_values = true)]
        dec0: f64,

        #[arg(allow_hyphen_values = true)]
        x: f64,

        #[arg(allow_hyphen_values = true)]
        y: f64,
    },
}

fn fail(message: impl std::fmt::Display) -> ! {
    error!("{message}");
    process::exit(1);
}

fn load_reference(path: &Path) -> ImageMetadata {
    let wcs = ImageWcs::load_json(path)
        .unwrap_or_else(|e| fail(format!("Failed to load reference {}: {e}", path.display())));
    ImageMetadata::from_image_wcs(&wcs)
        .unwrap_or_else(|e| fail(format!("Invalid reference solution {}: {e}", path.display())))
}

#[allow(clippy::too_many_arguments)]
fn cmd_solve(
    points_path: &Path,
    reference_path: Option<&Path>,
    size: ImageSize,
    config: &SolverConfig,
    distortion_csv: Option<&Path>,
    grid: usize,
    output: Option<&Path>,
) {
    let points = ControlPointSet::from_path(points_path).unwrap_or_else(|e| {
        fail(format!(
            "Failed to read control points {}: {e}",
            points_path.display()
        ))
    });
    info!("Loaded {} control points", points.len());

    let reference = reference_path.map(load_reference);
    let result = solve(reference.as_ref(), &points, size, config)
        .unwrap_or_else(|e| fail(format!("Solve failed: {e}")));
    let meta = &result.metadata;

    println!("Solved!");
    match meta.center() {
        Some(center) => println!(
            "  Image center: RA = {:.6} deg, Dec = {:+.6} deg",
            center.x, center.y
        ),
        None => println!("  Image center: outside the projection"),
    }
    println!("  Projection: {}", meta.projection().code());
    println!(
        "  Resolution: {:.4} arcsec/pixel",
        meta.resolution() * 3600.0
    );
    if let Some(focal) = meta.focal() {
        println!("  Focal length: {focal:.2} mm");
    }
    println!(
        "  Iterations: {} ({}), offset {:.6} arcsec, rms {:.4} arcsec, {} points",
        result.report.iterations,
        if result.report.converged {
            "converged"
        } else {
            "not converged"
        },
        result.report.offset_arcsec,
        result.report.rms_arcsec,
        result.report.points_used
    );

    if let Some(path) = distortion_csv {
        let file = File::create(path)
            .unwrap_or_else(|e| fail(format!("Failed to create {}: {e}", path.display())));
        meta.write_distortion_csv(BufWriter::new(file), grid)
            .unwrap_or_else(|e| fail(format!("Failed to write distortion grid: {e}")));
        info!("Wrote {grid}x{grid} distortion grid to {}", path.display());
    }

    if let Some(path) = output {
        meta.to_image_wcs()
            .save_json(path)
            .unwrap_or_else(|e| fail(format!("Failed to write {}: {e}", path.display())));
        info!("Wrote solution to {}", path.display());
    }
}

fn build_projection(code: ProjectionCode, ra0: f64, dec0: f64) -> Box<dyn meridian::Projection> {
    let config = ProjectionConfig {
        code,
        origin: Origin::OwnCenter,
    };
    projection_factory(&config, ra0, dec0)
        .unwrap_or_else(|e| fail(format!("Cannot build {code} projection: {e}")))
}

fn cmd_project(code: ProjectionCode, ra0: f64, dec0: f64, sky: Point2D) {
    let projection = build_projection(code, ra0, dec0);
    match projection.direct(sky) {
        Some(p) => println!("{:.10} {:.10}", p.x, p.y),
        None => fail(format!(
            "({}, {}) is not representable in {code} at ({ra0}, {dec0})",
            sky.x, sky.y
        )),
    }
}

fn cmd_unproject(code: ProjectionCode, ra0: f64, dec0: f64, plane: Point2D) {
    let projection = build_projection(code, ra0, dec0);
    match projection.inverse(plane) {
        Some(p) => println!("{:.10} {:.10}", p.x, p.y),
        None => fail(format!(
            "({}, {}) is outside the {code} projection plane",
            plane.x, plane.y
        )),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Solve {
            points,
            reference,
            width,
            height,
            projection,
            distortion,
            strict,
            max_iterations,
            threshold,
            smoothing,
            pixel_size,
            distortion_csv,
            grid,
            output,
        } => {
            if distortion_csv.is_some() && !distortion {
                fail("--distortion-csv requires --distortion");
            }
            let config = SolverConfig {
                projection: *projection,
                distortion: *distortion,
                max_iterations: *max_iterations,
                convergence_threshold: *threshold,
                spline_smoothing: *smoothing,
                pixel_size_um: *pixel_size,
                strict: *strict,
            };
            cmd_solve(
                points,
                reference.as_deref(),
                ImageSize::new(*width, *height),
                &config,
                distortion_csv.as_deref(),
                *grid,
                output.as_deref(),
            );
        }
        Commands::Project {
            projection,
            ra0,
            dec0,
            ra,
            dec,
        } => cmd_project(*projection, *ra0, *dec0, Point2D::new(*ra, *dec)),
        Commands::Unproject {
            projection,
            ra0,
            dec0,
            x,
            y,
        } => cmd_unproject(*projection, *ra0, *dec0, Point2D::new(*x, *y)),
    }
}
