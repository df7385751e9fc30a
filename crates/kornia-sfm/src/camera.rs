use glam::DVec3;
use serde::{Deserialize, Serialize};

const UNDISTORT_ITERATIONS: usize = 20;

/// A camera projection model over normalized image coordinates.
///
/// Normalized coordinates are pixels centered at the principal point and divided by
/// the largest image dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CameraModel {
    /// Pinhole projection with two radial distortion coefficients.
    Perspective {
        /// Focal length relative to the largest image dimension.
        focal: f64,
        /// Second order radial distortion.
        k1: f64,
        /// Fourth order radial distortion.
        k2: f64,
    },
    /// Equirectangular projection covering the full sphere.
    Spherical,
}

impl CameraModel {
    /// A perspective camera without distortion.
    pub fn perspective(focal: f64) -> Self {
        Self::Perspective {
            focal,
            k1: 0.0,
            k2: 0.0,
        }
    }

    /// Unit bearing in camera coordinates of a normalized pixel.
    pub fn pixel_bearing(&self, pixel: [f64; 2]) -> DVec3 {
        match self {
            Self::Perspective { focal, k1, k2 } => {
                let (x, y) = undistort(pixel[0] / focal, pixel[1] / focal, *k1, *k2);
                DVec3::new(x, y, 1.0).normalize()
            }
            Self::Spherical => {
                let lon = pixel[0] * 2.0 * std::f64::consts::PI;
                let lat = -pixel[1] * 2.0 * std::f64::consts::PI;
                DVec3::new(lat.cos() * lon.sin(), -lat.sin(), lat.cos() * lon.cos())
            }
        }
    }

    /// Normalized pixel of a point in camera coordinates.
    ///
    /// Returns `None` for points behind a perspective camera.
    pub fn project(&self, point: DVec3) -> Option<[f64; 2]> {
        match self {
            Self::Perspective { focal, k1, k2 } => {
                if point.z <= 0.0 {
                    return None;
                }
                let (x, y) = (point.x / point.z, point.y / point.z);
                let r2 = x * x + y * y;
                let d = 1.0 + r2 * (k1 + k2 * r2);
                Some([focal * d * x, focal * d * y])
            }
            Self::Spherical => {
                let lon = point.x.atan2(point.z);
                let lat = (-point.y).atan2((point.x * point.x + point.z * point.z).sqrt());
                Some([
                    lon / (2.0 * std::f64::consts::PI),
                    -lat / (2.0 * std::f64::consts::PI),
                ])
            }
        }
    }
}

// fixed point iteration of x = xd / (1 + k1 r^2 + k2 r^4)
fn undistort(xd: f64, yd: f64, k1: f64, k2: f64) -> (f64, f64) {
    if k1 == 0.0 && k2 == 0.0 {
        return (xd, yd);
    }
    let (mut x, mut y) = (xd, yd);
    for _ in 0..UNDISTORT_ITERATIONS {
        let r2 = x * x + y * y;
        let d = 1.0 + r2 * (k1 + k2 * r2);
        x = xd / d;
        y = yd / d;
    }
    (x, y)
}
