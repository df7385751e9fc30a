use glam::{DMat3, DVec3};

/// Triangulates a 3D point from camera rays.
pub trait BearingTriangulator {
    /// Returns the point seen along every ray, or `None` when the rays are not
    /// consistent enough to locate it.
    ///
    /// # Arguments
    ///
    /// * `origins` - Ray origins (camera centers) in world coordinates.
    /// * `bearings` - Unit ray directions in world coordinates.
    fn triangulate(&self, origins: &[DVec3], bearings: &[DVec3]) -> Option<DVec3>;
}

/// Least-squares midpoint triangulation with ray angle and reprojection checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidpointTriangulator {
    /// Maximum angle in radians between a ray and the direction to the triangulated point.
    pub reproj_threshold: f64,
    /// Minimum angle in radians between the two most divergent rays.
    pub min_ray_angle: f64,
}

impl Default for MidpointTriangulator {
    fn default() -> Self {
        Self {
            reproj_threshold: 0.004,
            min_ray_angle: 2.0_f64.to_radians(),
        }
    }
}

impl MidpointTriangulator {
    /// Create a triangulator from a bearing threshold and a minimum ray angle in degrees.
    pub fn new(reproj_threshold: f64, min_ray_angle_degrees: f64) -> Self {
        Self {
            reproj_threshold,
            min_ray_angle: min_ray_angle_degrees.to_radians(),
        }
    }
}

impl BearingTriangulator for MidpointTriangulator {
    fn triangulate(&self, origins: &[DVec3], bearings: &[DVec3]) -> Option<DVec3> {
        if origins.len() != bearings.len() || origins.len() < 2 {
            return None;
        }

        let mut max_angle = 0.0_f64;
        for (i, bi) in bearings.iter().enumerate() {
            for bj in bearings.iter().skip(i + 1) {
                max_angle = max_angle.max(bi.angle_between(*bj));
            }
        }
        if max_angle < self.min_ray_angle {
            return None;
        }

        let point = triangulate_midpoint(origins, bearings)?;

        for (o, b) in origins.iter().zip(bearings.iter()) {
            let ray = point - *o;
            if ray.length_squared() == 0.0 || ray.angle_between(*b) > self.reproj_threshold {
                return None;
            }
        }

        Some(point)
    }
}

/// Point minimizing the sum of squared distances to the rays `o + t * b`.
///
/// Returns `None` when the rays are parallel.
pub fn triangulate_midpoint(origins: &[DVec3], bearings: &[DVec3]) -> Option<DVec3> {
    let mut a = DMat3::ZERO;
    let mut rhs = DVec3::ZERO;
    for (o, b) in origins.iter().zip(bearings.iter()) {
        let b = b.normalize();
        // projector onto the plane orthogonal to the ray
        let q = DMat3::IDENTITY - DMat3::from_cols(b * b.x, b * b.y, b * b.z);
        a += q;
        rhs += q * *o;
    }
    if a.determinant().abs() < 1e-12 {
        return None;
    }
    Some(a.inverse() * rhs)
}
