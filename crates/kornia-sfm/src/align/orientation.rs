use glam::{DMat3, DVec3};

/// Image axes of a camera in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageDirections {
    /// Pointing to the right of the image.
    pub right: DVec3,
    /// Pointing to the bottom of the image.
    pub down: DVec3,
    /// Pointing to the front of the camera.
    pub forward: DVec3,
}

/// Directions of the upright image axes of a camera, given its world to camera
/// rotation and the EXIF orientation code of the image.
///
/// Unknown orientation codes are treated as code 1.
pub fn horizontal_and_vertical_directions(rotation: &DMat3, orientation: u8) -> ImageDirections {
    let (r0, r1, r2) = (rotation.row(0), rotation.row(1), rotation.row(2));
    let (right, down, forward) = match orientation {
        1 => (r0, r1, r2),
        2 => (-r0, r1, -r2),
        3 => (-r0, -r1, r2),
        4 => (r0, -r1, r2),
        5 => (r1, r0, -r2),
        6 => (-r1, r0, r2),
        7 => (-r1, -r0, -r2),
        8 => (r1, -r0, r2),
        _ => {
            log::warn!("unknown orientation {}, using 1 instead", orientation);
            (r0, r1, r2)
        }
    };
    ImageDirections {
        right,
        down,
        forward,
    }
}
