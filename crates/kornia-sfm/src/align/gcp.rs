use std::collections::BTreeMap;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::{geo::Lla, reconstruction::Reconstruction, triangulation::BearingTriangulator, ImageId};

/// The observation of a ground control point in an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcpObservation {
    /// Image the point is observed in.
    pub shot_id: ImageId,
    /// Geodetic position of the point.
    pub lla: Lla,
    /// Position of the point in the local tangent plane.
    pub coordinates: [f64; 3],
    /// Normalized pixel coordinates of the observation.
    pub pixel: [f64; 2],
}

/// Triangulate one ground control point from its observations.
///
/// Observations in images without a shot are ignored. Returns `None` when fewer than
/// two shots see the point or the triangulator rejects the rays.
pub fn triangulate_single_gcp<T: BearingTriangulator + ?Sized>(
    reconstruction: &Reconstruction,
    observations: &[&GcpObservation],
    triangulator: &T,
) -> Option<DVec3> {
    let mut origins = Vec::new();
    let mut bearings = Vec::new();
    for observation in observations {
        let Some(shot) = reconstruction.shots.get(&observation.shot_id) else {
            continue;
        };
        let Some(camera) = reconstruction.shot_camera(shot) else {
            log::warn!("shot {} has no camera", shot.id);
            continue;
        };
        origins.push(shot.pose.origin());
        let bearing = camera.pixel_bearing(observation.pixel);
        bearings.push(shot.pose.rotation.transpose() * bearing);
    }

    if origins.len() < 2 {
        return None;
    }
    triangulator.triangulate(&origins, &bearings)
}

/// Triangulate every ground control point seen in two or more shots.
///
/// Observations are grouped by geodetic position. Returns the triangulated positions
/// and, index-aligned, the measured local coordinates. Points that cannot be
/// triangulated are left out.
pub fn triangulate_all_gcp<T: BearingTriangulator + ?Sized>(
    reconstruction: &Reconstruction,
    observations: &[GcpObservation],
    triangulator: &T,
) -> (Vec<DVec3>, Vec<DVec3>) {
    let mut groups: BTreeMap<[u64; 3], Vec<&GcpObservation>> = BTreeMap::new();
    for o in observations {
        let key = [
            o.lla.latitude.to_bits(),
            o.lla.longitude.to_bits(),
            o.lla.altitude.to_bits(),
        ];
        groups.entry(key).or_default().push(o);
    }

    let mut triangulated = Vec::new();
    let mut measured = Vec::new();
    for group in groups.values() {
        match triangulate_single_gcp(reconstruction, group, triangulator) {
            Some(x) => {
                triangulated.push(x);
                measured.push(DVec3::from_array(group[0].coordinates));
            }
            None => log::warn!(
                "could not triangulate ground control point at {:?}",
                group[0].lla
            ),
        }
    }
    log::debug!(
        "triangulated {} of {} ground control points",
        triangulated.len(),
        groups.len()
    );
    (triangulated, measured)
}
