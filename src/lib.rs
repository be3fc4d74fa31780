//! # Scanpath
//!
//! Laser scan-path generation for laser powder-bed-fusion (LPBF) additive
//! manufacturing.
//!
//! Given a set of STL part meshes with per-part placement, a constant slice
//! thickness and a library of process-parameter profiles, this library
//! produces, for every build layer:
//! - a planar contour description of the layer's cross-section (layer file),
//! - an ordered sequence of laser movements (marks and jumps) that fill the
//!   interior and trace the boundaries of every region (scan file).
//!
//! The pipeline runs in two resumable stages:
//! 1. **Layer generation**: slice each part with an external slicer, merge
//!    the per-part polygons into one layer, and emit layer XML files.
//! 2. **Scan generation**: read the layer files back, offset the region
//!    boundaries, contour and hatch them per region profile, group the
//!    resulting paths into trajectories and emit scan XML files.
//!
//! ## Example
//!
//! ```rust,ignore
//! use scanpath::config::BuildConfig;
//! use scanpath::pipeline;
//! use scanpath::scanpath::StripeTracker;
//!
//! let config = BuildConfig::from_file("build_config.json")?;
//! while !pipeline::run_layer_batch(&config)?.finished {}
//! let mut stripes = StripeTracker::new(&config);
//! while !pipeline::run_scan_batch(&config, &mut stripes)?.finished {}
//! ```

pub mod clipper;
pub mod config;
pub mod contour;
pub mod geometry;
pub mod hatch;
pub mod layer;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod scanpath;
pub mod slicer;
pub mod status;

pub use config::{BuildConfig, RegionProfile, SegmentStyle, VelocityProfile};
pub use geometry::{distance, BoundingBox, Edge, Vertex};
pub use layer::{Layer, Loop, LoopKind, Region, Slice};
pub use scanpath::{Path, PathKind, Segment, Trajectory};

/// Floating-point coordinate type. All planar coordinates are millimetres.
pub type CoordF = f64;

/// Quantization step for the polygon offsetter, in mm.
///
/// The offsetter divides coordinates by this value and rounds to the nearest
/// integer before handing them to the clipping kernel; results are multiplied
/// back. Offsetting directly in floating point misbehaves near vertices, so
/// this quantum is load-bearing for correctness, not merely a performance
/// choice.
pub const QUANTUM_MM: CoordF = 0.00002;

/// Scale factor handed to the clipping kernel (`1 / QUANTUM_MM`).
pub const CLIPPER_SCALE: CoordF = 1.0 / QUANTUM_MM;

/// Tolerance for treating two vertices as the same point, in mm.
///
/// Used when coalescing duplicate hatch/edge intersections, which arise when
/// a hatch line runs through a vertex shared by several edges. Deliberately
/// larger than [`INTERSECT_RANGE_MM`] so that near-parallel grazing cases are
/// also caught.
pub const VERTEX_MERGE_RANGE_MM: CoordF = 0.0002;

/// Inflation applied to segment bounds when testing whether a computed
/// intersection point actually lies on both segments, in mm.
pub const INTERSECT_RANGE_MM: CoordF = 0.00002;

/// Minimum edge-length-normalized determinant between a hatch line and an
/// edge. Below this the two are declared parallel and non-intersecting.
/// A value of 1e-3 corresponds to under a micron of separation across a
/// 400 mm plate.
pub const MIN_DETERMINANT: CoordF = 0.001;

/// Number of layers processed per batch-driver invocation.
///
/// Larger batches run faster but hold more state between checkpoints; memory
/// grows roughly linearly with this count.
pub const LAYERS_PER_BATCH: i32 = 25;

/// Date of the scan XML schema emitted by this crate. Written into the
/// header of every scan file.
pub const SCAN_SCHEMA_VERSION: &str = "2020-03-23";

/// Configuration schema version this crate accepts. A configuration file
/// declaring any other version is rejected at load time.
pub const CONFIG_SCHEMA_VERSION: i32 = 3;

/// Decimal places for coordinates in layer XML files. Intricate parts need
/// high layer-file resolution to avoid artifacts that would be magnified
/// during scan generation.
pub const LAYER_COORD_PRECISION: usize = 6;

/// Decimal places for coordinates in scan XML files (1 um resolution).
pub const SCAN_COORD_PRECISION: usize = 3;

/// When true, the layer writer emits the coordinate-system element for every
/// vertex; when false, only for the first vertex of each file.
pub const OUTPUT_COORD_SYSTEM_PER_VERTEX: bool = false;

/// Name of the error report created next to the configuration file when a
/// batch fails.
pub const ERROR_REPORT_FILENAME: &str = "scanpath_errors.txt";

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for scan-path generation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid geometry: {0}")]
    Geometry(String),

    #[error("Slicer error: {0}")]
    Slicer(String),

    #[error("Layer error: {0}")]
    Layer(String),

    #[error("Scan generation error: {0}")]
    Scan(String),
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
