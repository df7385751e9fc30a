use glam::{DMat3, DVec3, DVec4};

/// Population standard deviation of all the coordinates of `points`, taken together.
fn overall_std(points: &[DVec3]) -> f64 {
    let n = (points.len() * 3) as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean = points.iter().map(|p| p.x + p.y + p.z).sum::<f64>() / n;
    let var = points
        .iter()
        .flat_map(|p| p.to_array())
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>()
        / n;
    var.sqrt()
}

/// Per-axis population standard deviation of `points`.
pub(crate) fn axis_std(points: &[DVec3]) -> DVec3 {
    if points.is_empty() {
        return DVec3::ZERO;
    }
    let n = points.len() as f64;
    let mean = points.iter().copied().sum::<DVec3>() / n;
    let var = points
        .iter()
        .map(|p| (*p - mean) * (*p - mean))
        .sum::<DVec3>()
        / n;
    DVec3::new(var.x.sqrt(), var.y.sqrt(), var.z.sqrt())
}

/// Fit the plane `p` with `(x, 1) . p = 0` for every point and `(v, 0) . p = 0` for
/// every in-plane vector.
///
/// The normal `p[..3]` is oriented to agree with the sum of `verticals`. Points are
/// rescaled by their overall spread before solving. Without any constraint the
/// horizontal plane `z = 0` is returned.
///
/// # Arguments
///
/// * `points` - Points on the plane, preferably centered.
/// * `vectors` - Directions parallel to the plane.
/// * `verticals` - Directions pointing up, used to orient the normal.
pub fn fit_plane(points: &[DVec3], vectors: &[DVec3], verticals: &[DVec3]) -> DVec4 {
    let horizontal = DVec4::new(0.0, 0.0, 1.0, 0.0);
    let rows = points.len() + vectors.len();
    if rows == 0 {
        return horizontal;
    }

    let s = 1.0 / overall_std(points).max(1e-8);
    let a = faer::Mat::<f64>::from_fn(rows, 4, |i, j| {
        let (v, w) = if i < points.len() {
            (points[i] * s, 1.0)
        } else {
            (vectors[i - points.len()] * s, 0.0)
        };
        match j {
            3 => w,
            _ => v[j],
        }
    });

    // right singular vector of the smallest singular value
    let svd = a.svd();
    let v = svd.v();
    let mut p = DVec4::new(v.read(0, 3), v.read(1, 3), v.read(2, 3), v.read(3, 3) / s);

    if p.truncate().length() < 1e-12 {
        return horizontal;
    }

    let d: f64 = verticals.iter().map(|v| p.truncate().dot(*v)).sum();
    if d < 0.0 {
        p = -p;
    } else if d == 0.0 && !verticals.is_empty() {
        log::debug!("plane normal is orthogonal to the verticals");
    }
    p
}

/// Rotation mapping the normal of plane `p` onto the z axis.
pub fn plane_horizontalling_rotation(p: DVec4) -> DMat3 {
    let v0 = p.truncate();
    let v1 = DVec3::Z;
    let angle = v0.angle_between(v1);
    let axis = v0.cross(v1);
    if axis.length() > 1e-12 {
        DMat3::from_axis_angle(axis.normalize(), angle)
    } else if angle > 3.0 {
        // normal along -z
        DMat3::from_diagonal(DVec3::new(1.0, -1.0, -1.0))
    } else {
        DMat3::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_plane_points() {
        // points on z = 2 x + 1
        let points: Vec<DVec3> = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (2.0, 3.0), (-1.0, 4.0)]
            .iter()
            .map(|&(x, y)| DVec3::new(x, y, 2.0 * x + 1.0))
            .collect();
        let p = fit_plane(&points, &[], &[DVec3::Z]);

        for x in &points {
            assert_relative_eq!(x.extend(1.0).dot(p), 0.0, epsilon = 1e-9);
        }
        assert!(p.z > 0.0);
    }

    #[test]
    fn test_fit_plane_orientation() {
        let points = [DVec3::new(-1.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0)];
        let vectors = [DVec3::X, DVec3::Z];

        let up = fit_plane(&points, &vectors, &[DVec3::NEG_Y]);
        assert_relative_eq!(up.y, -1.0, epsilon = 1e-9);

        let down = fit_plane(&points, &vectors, &[DVec3::Y]);
        assert_relative_eq!(down.y, 1.0, epsilon = 1e-9);

        assert_eq!(fit_plane(&[], &[], &[]), DVec4::new(0.0, 0.0, 1.0, 0.0));
    }

    #[test]
    fn test_horizontalling_rotation() {
        let normal = DVec3::new(1.0, -2.0, 0.5).normalize();
        let r = plane_horizontalling_rotation(normal.extend(3.0));
        let z = r * normal;
        assert_relative_eq!(z.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(z.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(z.z, 1.0, epsilon = 1e-9);

        assert_eq!(plane_horizontalling_rotation(DVec4::new(0.0, 0.0, 2.0, 0.0)), DMat3::IDENTITY);
        let flip = plane_horizontalling_rotation(DVec4::new(0.0, 0.0, -1.0, 0.0));
        assert_eq!(flip * DVec3::NEG_Z, DVec3::Z);
    }

    #[test]
    fn test_axis_std() {
        let points = [DVec3::new(-1.0, 2.0, 5.0), DVec3::new(1.0, 2.0, 5.0)];
        assert_eq!(axis_std(&points), DVec3::new(1.0, 0.0, 0.0));
    }
}
