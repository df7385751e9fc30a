use std::collections::HashMap;

use glam::{DMat3, DVec3};

use crate::{camera::CameraModel, ImageId, MarkerId};

/// A marker corner, identified by the marker id and the corner index (0 to 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerCorner {
    /// Id of the marker.
    pub marker_id: MarkerId,
    /// Corner index within the marker.
    pub corner_id: u8,
}

/// World to camera transformation: `x_cam = rotation * x_world + translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Rotation from world to camera.
    pub rotation: DMat3,
    /// Translation from world to camera.
    pub translation: DVec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            rotation: DMat3::IDENTITY,
            translation: DVec3::ZERO,
        }
    }
}

impl Pose {
    /// Create a pose from a world to camera rotation and translation.
    pub fn new(rotation: DMat3, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Create a pose from a rotation and the camera center in world coordinates.
    pub fn from_origin(rotation: DMat3, origin: DVec3) -> Self {
        Self {
            rotation,
            translation: -(rotation * origin),
        }
    }

    /// The camera center in world coordinates.
    pub fn origin(&self) -> DVec3 {
        -(self.rotation.transpose() * self.translation)
    }

    /// Transform a world point to camera coordinates.
    pub fn transform(&self, point: DVec3) -> DVec3 {
        self.rotation * point + self.translation
    }

    /// Transform a camera point to world coordinates.
    pub fn inverse_transform(&self, point: DVec3) -> DVec3 {
        self.rotation.transpose() * (point - self.translation)
    }
}

/// Per-shot metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotMetadata {
    /// Measured camera position in the local tangent plane, if any.
    pub gps_position: Option<DVec3>,
    /// EXIF orientation code (1 to 8).
    pub orientation: u8,
}

impl Default for ShotMetadata {
    fn default() -> Self {
        Self {
            gps_position: None,
            orientation: 1,
        }
    }
}

/// A reconstructed image.
#[derive(Debug, Clone, PartialEq)]
pub struct Shot {
    /// Image the shot was reconstructed from.
    pub id: ImageId,
    /// Id of the camera in [`Reconstruction::cameras`].
    pub camera: String,
    /// Pose of the shot.
    pub pose: Pose,
    /// Shot metadata.
    pub metadata: ShotMetadata,
}

/// A reconstructed 3D point.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Id of the point, the id of the track it was triangulated from.
    pub id: String,
    /// Coordinates of the point.
    pub coordinates: DVec3,
    /// Reprojection error, if computed.
    pub reprojection_error: Option<f64>,
    /// Marker corner the point was triangulated from, if any.
    pub marker: Option<MarkerCorner>,
}

impl Point {
    /// Create a point that is not attached to a marker.
    pub fn new(id: impl Into<String>, coordinates: DVec3) -> Self {
        Self {
            id: id.into(),
            coordinates,
            reprojection_error: None,
            marker: None,
        }
    }
}

/// Cameras, shots and points of a reconstruction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconstruction {
    /// Camera models by id.
    pub cameras: HashMap<String, CameraModel>,
    /// Shots by image id.
    pub shots: HashMap<ImageId, Shot>,
    /// Points by id.
    pub points: HashMap<String, Point>,
}

impl Reconstruction {
    /// Add or replace a camera model.
    pub fn add_camera(&mut self, id: impl Into<String>, camera: CameraModel) {
        self.cameras.insert(id.into(), camera);
    }

    /// Add or replace a shot.
    pub fn add_shot(&mut self, shot: Shot) {
        self.shots.insert(shot.id.clone(), shot);
    }

    /// Add or replace a point.
    pub fn add_point(&mut self, point: Point) {
        self.points.insert(point.id.clone(), point);
    }

    /// Camera model of a shot.
    pub fn shot_camera(&self, shot: &Shot) -> Option<&CameraModel> {
        self.cameras.get(&shot.camera)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pose_origin() {
        let rotation = DMat3::from_rotation_z(0.3) * DMat3::from_rotation_x(-1.1);
        let origin = DVec3::new(1.0, -2.0, 5.0);
        let pose = Pose::from_origin(rotation, origin);

        let o = pose.origin();
        assert_relative_eq!(o.x, origin.x, epsilon = 1e-12);
        assert_relative_eq!(o.y, origin.y, epsilon = 1e-12);
        assert_relative_eq!(o.z, origin.z, epsilon = 1e-12);

        // the camera center maps to the camera frame origin
        assert!(pose.transform(origin).length() < 1e-12);

        let p = DVec3::new(0.5, 0.25, -3.0);
        let back = pose.inverse_transform(pose.transform(p));
        assert!((back - p).length() < 1e-12);
    }
}
