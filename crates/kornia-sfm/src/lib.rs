#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Reconstruction alignment to GPS, ground control points and marker sizes.
pub mod align;

/// Camera projection models.
pub mod camera;

/// Configuration shared by the pair selection, track and alignment stages.
pub mod config;

/// WGS84 geodesy and local tangent plane conversions.
pub mod geo;

/// Marker corner correspondences.
pub mod markers;

/// Per-image pair matching driver.
pub mod matching;

/// Candidate image pair selection.
pub mod pairs;

/// Reconstruction data model: shots, poses and points.
pub mod reconstruction;

/// Feature and marker track graphs.
pub mod tracks;

/// Multi-view bearing triangulation.
pub mod triangulation;

/// Disjoint-set (union-find) structures.
pub mod union_find;

pub use config::{
    AlignMethod, ConfigError, MarkerPruning, OrientationPrior, ScaleAggregation, SfmConfig,
};

/// Identifier of an image (and of the shot reconstructed from it).
pub type ImageId = String;

/// Identifier of a fiducial marker.
pub type MarkerId = u32;
