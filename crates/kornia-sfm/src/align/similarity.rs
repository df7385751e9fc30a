use std::io::{Read, Write};

use glam::{DMat2, DMat3, DVec2, DVec3};
use serde::{Deserialize, Serialize};

use super::AlignError;

/// A similarity transform `y = scale * rotation * x + translation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "SimilarityRecord", from = "SimilarityRecord")]
pub struct Similarity {
    /// Uniform scale, positive.
    pub scale: f64,
    /// Rotation matrix.
    pub rotation: DMat3,
    /// Translation vector.
    pub translation: DVec3,
}

/// Row-major serialized form of a [`Similarity`].
#[derive(Serialize, Deserialize)]
struct SimilarityRecord {
    scale: f64,
    rotation: [[f64; 3]; 3],
    translation: [f64; 3],
}

impl From<Similarity> for SimilarityRecord {
    fn from(s: Similarity) -> Self {
        let r = s.rotation;
        Self {
            scale: s.scale,
            rotation: [r.row(0).to_array(), r.row(1).to_array(), r.row(2).to_array()],
            translation: s.translation.to_array(),
        }
    }
}

impl From<SimilarityRecord> for Similarity {
    fn from(r: SimilarityRecord) -> Self {
        Self {
            scale: r.scale,
            rotation: DMat3::from_cols_array_2d(&r.rotation).transpose(),
            translation: DVec3::from_array(r.translation),
        }
    }
}

impl Default for Similarity {
    fn default() -> Self {
        Self::identity()
    }
}

impl Similarity {
    /// Create a similarity from its scale, rotation and translation.
    pub fn new(scale: f64, rotation: DMat3, translation: DVec3) -> Self {
        Self {
            scale,
            rotation,
            translation,
        }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self::new(1.0, DMat3::IDENTITY, DVec3::ZERO)
    }

    /// A pure scaling about the origin.
    pub fn from_scale(scale: f64) -> Self {
        Self::new(scale, DMat3::IDENTITY, DVec3::ZERO)
    }

    /// Transform a point.
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.scale * (self.rotation * point) + self.translation
    }

    /// The transform applying `self` first and `next` second.
    pub fn then(&self, next: &Similarity) -> Similarity {
        Similarity {
            scale: self.scale * next.scale,
            rotation: next.rotation * self.rotation,
            translation: next.scale * (next.rotation * self.translation) + next.translation,
        }
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Similarity {
        let rt = self.rotation.transpose();
        Similarity {
            scale: 1.0 / self.scale,
            rotation: rt,
            translation: -(rt * self.translation) / self.scale,
        }
    }

    /// Write the transform as JSON.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<(), AlignError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Read a transform written by [`Similarity::write_json`].
    pub fn read_json<R: Read>(reader: R) -> Result<Self, AlignError> {
        Ok(serde_json::from_reader(reader)?)
    }
}

/// A 2D similarity transform `y = scale * rotation * x + translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity2d {
    /// Uniform scale.
    pub scale: f64,
    /// Rotation matrix.
    pub rotation: DMat2,
    /// Translation vector.
    pub translation: DVec2,
}

fn check_lengths(src: usize, dst: usize) -> Result<(), AlignError> {
    if src != dst {
        return Err(AlignError::MismatchedLengths { src, dst });
    }
    if src == 0 {
        return Err(AlignError::InsufficientData("no point correspondence".into()));
    }
    Ok(())
}

/// Least-squares similarity mapping `src` onto `dst`.
///
/// The rotation is the Procrustes solution of the centered point sets, reflections
/// excluded, and the scale is the ratio of their root mean square spreads.
pub fn fit_similarity_3d(src: &[DVec3], dst: &[DVec3]) -> Result<Similarity, AlignError> {
    check_lengths(src.len(), dst.len())?;
    let n = src.len() as f64;

    let c_src = src.iter().copied().sum::<DVec3>() / n;
    let c_dst = dst.iter().copied().sum::<DVec3>() / n;

    // cross-covariance H = sum(dst_c * src_c^T)
    let mut h = [[0.0f64; 3]; 3];
    let (mut var_src, mut var_dst) = (0.0, 0.0);
    for (x, y) in src.iter().zip(dst.iter()) {
        let (xc, yc) = ((*x - c_src).to_array(), (*y - c_dst).to_array());
        for (r, yr) in yc.iter().enumerate() {
            for (c, xc_c) in xc.iter().enumerate() {
                h[r][c] += yr * xc_c;
            }
        }
        var_src += xc.iter().map(|v| v * v).sum::<f64>();
        var_dst += yc.iter().map(|v| v * v).sum::<f64>();
    }
    if var_src < f64::EPSILON {
        return Err(AlignError::InsufficientData(
            "source points have no spread".into(),
        ));
    }

    let svd = faer::Mat::<f64>::from_fn(3, 3, |i, j| h[i][j]).svd();
    let u = DMat3::from_cols_array_2d(&[
        [svd.u().read(0, 0), svd.u().read(1, 0), svd.u().read(2, 0)],
        [svd.u().read(0, 1), svd.u().read(1, 1), svd.u().read(2, 1)],
        [svd.u().read(0, 2), svd.u().read(1, 2), svd.u().read(2, 2)],
    ]);
    let v = DMat3::from_cols_array_2d(&[
        [svd.v().read(0, 0), svd.v().read(1, 0), svd.v().read(2, 0)],
        [svd.v().read(0, 1), svd.v().read(1, 1), svd.v().read(2, 1)],
        [svd.v().read(0, 2), svd.v().read(1, 2), svd.v().read(2, 2)],
    ]);

    let rotation = if (u * v.transpose()).determinant() < 0.0 {
        u * DMat3::from_diagonal(DVec3::new(1.0, 1.0, -1.0)) * v.transpose()
    } else {
        u * v.transpose()
    };

    let scale = (var_dst / var_src).sqrt();
    let translation = c_dst - scale * (rotation * c_src);
    Ok(Similarity::new(scale, rotation, translation))
}

/// Least-squares 2D similarity mapping `src` onto `dst`.
pub fn fit_similarity_2d(src: &[DVec2], dst: &[DVec2]) -> Result<Similarity2d, AlignError> {
    check_lengths(src.len(), dst.len())?;
    let n = src.len() as f64;

    let c_src = src.iter().copied().sum::<DVec2>() / n;
    let c_dst = dst.iter().copied().sum::<DVec2>() / n;

    let (mut dot, mut cross, mut var_src, mut var_dst) = (0.0, 0.0, 0.0, 0.0);
    for (x, y) in src.iter().zip(dst.iter()) {
        let (x, y) = (*x - c_src, *y - c_dst);
        dot += x.dot(y);
        cross += x.perp_dot(y);
        var_src += x.length_squared();
        var_dst += y.length_squared();
    }
    if var_src < f64::EPSILON {
        return Err(AlignError::InsufficientData(
            "source points have no spread".into(),
        ));
    }

    let rotation = DMat2::from_angle(cross.atan2(dot));
    let scale = (var_dst / var_src).sqrt();
    let translation = c_dst - scale * (rotation * c_src);
    Ok(Similarity2d {
        scale,
        rotation,
        translation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_vec_eq(a: DVec3, b: DVec3) {
        assert_relative_eq!(a.x, b.x, epsilon = 1e-9);
        assert_relative_eq!(a.y, b.y, epsilon = 1e-9);
        assert_relative_eq!(a.z, b.z, epsilon = 1e-9);
    }

    fn sample() -> Similarity {
        Similarity::new(
            2.5,
            DMat3::from_axis_angle(DVec3::new(1.0, -2.0, 0.5).normalize(), 0.7),
            DVec3::new(10.0, -3.0, 4.0),
        )
    }

    #[test]
    fn test_compose_and_inverse() {
        let s1 = sample();
        let s2 = Similarity::new(0.5, DMat3::from_rotation_z(1.2), DVec3::new(-1.0, 0.0, 2.0));
        let p = DVec3::new(0.3, -1.7, 2.2);

        let composed = s1.then(&s2);
        assert_vec_eq(composed.transform_point(p), s2.transform_point(s1.transform_point(p)));
        assert_relative_eq!(composed.scale, 1.25);

        let back = s1.inverse().transform_point(s1.transform_point(p));
        assert_vec_eq(back, p);
        assert_vec_eq(Similarity::identity().transform_point(p), p);
    }

    #[test]
    fn test_fit_similarity_3d() -> Result<(), Box<dyn std::error::Error>> {
        let truth = sample();
        let src = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 2.0, 0.0),
            DVec3::new(0.0, 0.0, 3.0),
            DVec3::new(1.0, 1.0, 1.0),
        ];
        let dst = src.map(|p| truth.transform_point(p));

        let fit = fit_similarity_3d(&src, &dst)?;
        assert_relative_eq!(fit.scale, truth.scale, epsilon = 1e-9);
        assert_relative_eq!(fit.rotation.determinant(), 1.0, epsilon = 1e-9);
        for (x, y) in src.iter().zip(dst.iter()) {
            assert_vec_eq(fit.transform_point(*x), *y);
        }
        Ok(())
    }

    #[test]
    fn test_fit_similarity_3d_rejects_reflection() -> Result<(), Box<dyn std::error::Error>> {
        let src = [
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::new(0.0, 0.0, 0.0),
        ];
        // mirrored along z
        let dst = src.map(|p| DVec3::new(p.x, p.y, -p.z));
        let fit = fit_similarity_3d(&src, &dst)?;
        assert_relative_eq!(fit.rotation.determinant(), 1.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_fit_errors() {
        assert!(matches!(
            fit_similarity_3d(&[DVec3::ZERO], &[]),
            Err(AlignError::MismatchedLengths { src: 1, dst: 0 })
        ));
        assert!(matches!(
            fit_similarity_3d(&[DVec3::ONE; 3], &[DVec3::ZERO; 3]),
            Err(AlignError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_fit_similarity_2d() -> Result<(), Box<dyn std::error::Error>> {
        let rotation = DMat2::from_angle(-2.0);
        let src = [
            DVec2::new(0.0, 0.0),
            DVec2::new(4.0, 1.0),
            DVec2::new(-1.0, 3.0),
        ];
        let dst = src.map(|p| 3.0 * (rotation * p) + DVec2::new(5.0, -7.0));

        let fit = fit_similarity_2d(&src, &dst)?;
        assert_relative_eq!(fit.scale, 3.0, epsilon = 1e-9);
        assert_relative_eq!(fit.translation.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(fit.translation.y, -7.0, epsilon = 1e-9);
        assert_relative_eq!(fit.rotation.x_axis.x, rotation.x_axis.x, epsilon = 1e-9);
        assert_relative_eq!(fit.rotation.x_axis.y, rotation.x_axis.y, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_json_record() -> Result<(), Box<dyn std::error::Error>> {
        let s = sample();
        let mut buffer = Vec::new();
        s.write_json(&mut buffer)?;

        let value: serde_json::Value = serde_json::from_slice(&buffer)?;
        // rows are stored in order
        assert_relative_eq!(
            value["rotation"][0][1].as_f64().unwrap_or_default(),
            s.rotation.row(0).y,
            epsilon = 1e-12
        );

        let back = Similarity::read_json(buffer.as_slice())?;
        assert_relative_eq!(back.scale, s.scale);
        assert!(back.rotation.abs_diff_eq(s.rotation, 1e-12));
        assert!(back.translation.abs_diff_eq(s.translation, 1e-12));
        Ok(())
    }
}
