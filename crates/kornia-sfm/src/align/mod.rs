//! Alignment of a reconstruction to GPS, ground control points and marker sizes.
//!
//! A similarity `y = s A x + b` is estimated between the arbitrary frame of a
//! reconstruction and the local tangent plane of the GPS measurements, then applied
//! in place to every point and shot of the reconstruction.

/// Ground control point triangulation.
pub mod gcp;

/// Scale recovery from the physical marker size.
pub mod marker_scale;

/// Camera image axes from EXIF orientation codes.
pub mod orientation;

/// Plane fitting and horizontalling.
pub mod plane;

/// Similarity transforms and their least-squares fits.
pub mod similarity;

use glam::{DMat3, DVec2, DVec3};
use thiserror::Error;

use crate::{
    config::{AlignMethod, OrientationPrior, SfmConfig},
    reconstruction::{Reconstruction, Shot},
    triangulation::{BearingTriangulator, MidpointTriangulator},
};

pub use gcp::{triangulate_all_gcp, triangulate_single_gcp, GcpObservation};
pub use marker_scale::{marker_edge_lengths, MarkerScale};
pub use orientation::{horizontal_and_vertical_directions, ImageDirections};
pub use plane::{fit_plane, plane_horizontalling_rotation};
pub use similarity::{fit_similarity_2d, fit_similarity_3d, Similarity, Similarity2d};

/// Minimum spread of the camera centers, below which they are considered identical.
const MIN_CAMERA_SPREAD: f64 = 1e-8;

/// Minimum spread of the GPS positions, below which they are considered identical.
const MIN_GPS_SPREAD: f64 = 0.01;

/// Errors that can occur when aligning a reconstruction.
#[derive(Debug, Error)]
pub enum AlignError {
    /// The inputs do not constrain the requested transform.
    #[error("insufficient data to align: {0}")]
    InsufficientData(String),

    /// Point sets of different sizes.
    #[error("mismatched point sets: {src} source and {dst} destination points")]
    MismatchedLengths {
        /// Number of source points.
        src: usize,
        /// Number of destination points.
        dst: usize,
    },

    /// Error reading or writing a persisted transform.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Error (de)serializing a persisted transform.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Estimator that produced an alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimator {
    /// 3D fit between camera centers and GCPs and their measured positions.
    Naive,
    /// Plane horizontalling followed by a 2D fit to GPS.
    OrientationPrior,
    /// Plane horizontalling with the degenerate scale and centroid translation.
    OrientationPriorFallback,
    /// Scale only, from the marker size.
    MarkerScale,
}

/// An estimated alignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    /// Transform from the reconstruction frame to the GPS frame.
    pub similarity: Similarity,
    /// Estimator that produced the transform.
    pub estimator: Estimator,
}

/// Apply a similarity to a reconstruction.
///
/// Points become `s A x + b`; shot rotations become `R A^T` and translations
/// `-R A^T b + s t`, so every shot sees the transformed points where it saw the
/// original ones, up to the scale.
pub fn apply_similarity(reconstruction: &mut Reconstruction, similarity: &Similarity) {
    for point in reconstruction.points.values_mut() {
        point.coordinates = similarity.transform_point(point.coordinates);
    }

    let a_t = similarity.rotation.transpose();
    for shot in reconstruction.shots.values_mut() {
        let rotation = shot.pose.rotation * a_t;
        let translation =
            -(rotation * similarity.translation) + similarity.scale * shot.pose.translation;
        shot.pose.rotation = rotation;
        shot.pose.translation = translation;
    }
}

/// Estimate and apply the alignment selected by `config.align_method`.
///
/// Ground control points are triangulated with a [`MidpointTriangulator`] set up from
/// the configuration. The reconstruction is left untouched on error.
pub fn align_reconstruction(
    reconstruction: &mut Reconstruction,
    gcps: &[GcpObservation],
    config: &SfmConfig,
) -> Result<Alignment, AlignError> {
    let triangulator =
        MidpointTriangulator::new(config.gcp_reprojection_threshold, config.gcp_min_ray_angle_degrees);
    let alignment = align_reconstruction_similarity(reconstruction, gcps, config, &triangulator)?;
    apply_similarity(reconstruction, &alignment.similarity);
    Ok(alignment)
}

/// Estimate the similarity aligning a reconstruction with its GPS and GCP data.
///
/// * [`AlignMethod::Naive`] fits camera centers and triangulated GCPs to their measured
///   positions, falling back to the marker scale with fewer than three of them.
/// * [`AlignMethod::OrientationPrior`] levels the ground plane implied by the camera
///   orientation prior, then fits a 2D similarity and a vertical offset to GPS.
/// * [`AlignMethod::MarkerScale`] only recovers the scale from the marker size.
/// * [`AlignMethod::OrientationPriorMarkerScale`] takes the rotation and translation of
///   the orientation prior and the scale of the markers, keeping the orientation prior
///   scale when no marker is complete.
///
/// Fails with [`AlignError::InsufficientData`] for a reconstruction without shots or
/// when the marker scale is the only estimator left and has no complete marker.
pub fn align_reconstruction_similarity<T: BearingTriangulator + ?Sized>(
    reconstruction: &Reconstruction,
    gcps: &[GcpObservation],
    config: &SfmConfig,
    triangulator: &T,
) -> Result<Alignment, AlignError> {
    if reconstruction.shots.is_empty() {
        return Err(AlignError::InsufficientData("reconstruction has no shots".into()));
    }

    let alignment = match config.align_method {
        AlignMethod::Naive => align_naive(reconstruction, gcps, config, triangulator)?,
        AlignMethod::OrientationPrior => align_orientation_prior(reconstruction, config),
        AlignMethod::MarkerScale => align_marker_scale(reconstruction, config)?,
        AlignMethod::OrientationPriorMarkerScale => {
            let mut alignment = align_orientation_prior(reconstruction, config);
            match MarkerScale::estimate(reconstruction, config.marker_size) {
                Ok(markers) => {
                    alignment.similarity.scale = markers.scale(config.marker_scale_aggregation)
                }
                Err(e) => log::warn!("{e}, keeping the orientation prior scale"),
            }
            alignment
        }
    };

    log::info!(
        "{:?} alignment with scale {}",
        alignment.estimator,
        alignment.similarity.scale
    );
    Ok(alignment)
}

fn align_marker_scale(
    reconstruction: &Reconstruction,
    config: &SfmConfig,
) -> Result<Alignment, AlignError> {
    let scale = MarkerScale::estimate(reconstruction, config.marker_size)?;
    Ok(Alignment {
        similarity: scale.similarity(config.marker_scale_aggregation),
        estimator: Estimator::MarkerScale,
    })
}

/// Shots in id order.
fn sorted_shots(reconstruction: &Reconstruction) -> Vec<&Shot> {
    let mut shots: Vec<&Shot> = reconstruction.shots.values().collect();
    shots.sort_by(|a, b| a.id.cmp(&b.id));
    shots
}

fn align_naive<T: BearingTriangulator + ?Sized>(
    reconstruction: &Reconstruction,
    gcps: &[GcpObservation],
    config: &SfmConfig,
    triangulator: &T,
) -> Result<Alignment, AlignError> {
    let (mut x, mut xp) = triangulate_all_gcp(reconstruction, gcps, triangulator);

    let mut without_gps = 0;
    for shot in sorted_shots(reconstruction) {
        match shot.metadata.gps_position {
            Some(gps) => {
                x.push(shot.pose.origin());
                xp.push(gps);
            }
            None => without_gps += 1,
        }
    }
    if without_gps > 0 {
        log::warn!("{} shots have no GPS position", without_gps);
    }

    if x.len() < 3 {
        log::warn!(
            "{} correspondences are not enough for a 3D fit, using the marker scale",
            x.len()
        );
        return align_marker_scale(reconstruction, config);
    }

    Ok(Alignment {
        similarity: fit_similarity_3d(&x, &xp)?,
        estimator: Estimator::Naive,
    })
}

fn mean(points: &[DVec3]) -> DVec3 {
    if points.is_empty() {
        return DVec3::ZERO;
    }
    points.iter().copied().sum::<DVec3>() / points.len() as f64
}

fn align_orientation_prior(reconstruction: &Reconstruction, config: &SfmConfig) -> Alignment {
    let shots = sorted_shots(reconstruction);

    let mut origins = Vec::with_capacity(shots.len());
    let mut onplane = Vec::new();
    let mut verticals = Vec::new();
    for shot in &shots {
        origins.push(shot.pose.origin());
        let d = horizontal_and_vertical_directions(&shot.pose.rotation, shot.metadata.orientation);
        match config.align_orientation_prior {
            OrientationPrior::NoRoll => {
                onplane.push(d.right);
                verticals.push(-d.down);
            }
            OrientationPrior::Horizontal => {
                onplane.push(d.right);
                onplane.push(d.forward);
                verticals.push(-d.down);
            }
            OrientationPrior::Vertical => {
                onplane.push(d.right);
                onplane.push(d.down);
                verticals.push(-d.forward);
            }
        }
    }

    // ground plane
    let center = mean(&origins);
    let centered: Vec<DVec3> = origins.iter().map(|o| *o - center).collect();
    let p = fit_plane(&centered, &onplane, &verticals);
    let r_plane = plane_horizontalling_rotation(p);
    let rotated: Vec<DVec3> = origins.iter().map(|o| r_plane * *o).collect();

    let mut x = Vec::new();
    let mut xp = Vec::new();
    for (shot, r) in shots.iter().zip(rotated.iter()) {
        if let Some(gps) = shot.metadata.gps_position {
            x.push(*r);
            xp.push(gps);
        }
    }
    if x.len() < shots.len() {
        log::warn!(
            "{} of {} shots have no GPS position",
            shots.len() - x.len(),
            shots.len()
        );
    }

    let degenerate = x.len() < 2
        || plane::axis_std(&x).max_element() < MIN_CAMERA_SPREAD
        || plane::axis_std(&xp).max_element() < MIN_GPS_SPREAD;

    let fit = if degenerate {
        None
    } else {
        let src: Vec<DVec2> = x.iter().map(|v| v.truncate()).collect();
        let dst: Vec<DVec2> = xp.iter().map(|v| v.truncate()).collect();
        fit_similarity_2d(&src, &dst).ok()
    };

    match fit {
        Some(t) => {
            let r2 = t.rotation;
            let a = DMat3::from_cols(
                DVec3::new(r2.x_axis.x, r2.x_axis.y, 0.0),
                DVec3::new(r2.y_axis.x, r2.y_axis.y, 0.0),
                DVec3::Z,
            ) * r_plane;
            let z_offset = mean(&xp).z - t.scale * mean(&x).z;
            Alignment {
                similarity: Similarity::new(t.scale, a, t.translation.extend(z_offset)),
                estimator: Estimator::OrientationPrior,
            }
        }
        None => {
            log::warn!("camera or GPS positions are degenerate, using the fallback scale");
            let scale = match MarkerScale::estimate(reconstruction, config.marker_size) {
                Ok(markers) => markers.scale(config.marker_scale_aggregation),
                Err(_) => {
                    rotated.len() as f64
                        / plane::axis_std(&rotated).max_element().max(MIN_CAMERA_SPREAD)
                }
            };
            Alignment {
                similarity: Similarity::new(scale, r_plane, mean(&xp) - mean(&x)),
                estimator: Estimator::OrientationPriorFallback,
            }
        }
    }
}
