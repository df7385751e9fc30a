use std::collections::BTreeMap;
use std::io::Write;

use glam::DVec3;

use crate::{markers::MARKER_CORNERS, reconstruction::Reconstruction, MarkerId, ScaleAggregation};

use super::{AlignError, Similarity};

/// Scale factor between a median absolute deviation and a standard deviation.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Scale of a reconstruction recovered from the known physical marker size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerScale {
    /// Marker size over the median reconstructed edge length.
    pub median: f64,
    /// Marker size over the mean reconstructed edge length.
    pub mean: f64,
    /// Robust dispersion of the per-edge scales, 1.4826 times their median absolute deviation.
    pub median_sigma: f64,
    /// Standard deviation of the per-edge scales.
    pub mean_sigma: f64,
    /// Number of edges used.
    pub num_edges: usize,
}

/// Edge lengths of every marker with its four corners reconstructed.
///
/// Markers are visited in ascending id order, edges in corner order `01, 12, 23, 30`.
pub fn marker_edge_lengths(reconstruction: &Reconstruction) -> Vec<f64> {
    let mut corners: BTreeMap<MarkerId, [Option<DVec3>; MARKER_CORNERS]> = BTreeMap::new();
    for point in reconstruction.points.values() {
        let Some(corner) = point.marker else {
            continue;
        };
        let Some(slot) = corners
            .entry(corner.marker_id)
            .or_default()
            .get_mut(corner.corner_id as usize)
        else {
            log::debug!("ignoring corner {} of marker {}", corner.corner_id, corner.marker_id);
            continue;
        };
        *slot = Some(point.coordinates);
    }

    let mut edges = Vec::new();
    for (marker_id, corners) in corners {
        let [Some(c0), Some(c1), Some(c2), Some(c3)] = corners else {
            log::debug!("marker {} is missing corners", marker_id);
            continue;
        };
        edges.extend([
            c0.distance(c1),
            c1.distance(c2),
            c2.distance(c3),
            c3.distance(c0),
        ]);
    }
    edges
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

impl MarkerScale {
    /// Estimate the scale from the reconstructed marker corners.
    ///
    /// Fails with [`AlignError::InsufficientData`] when no marker has its four corners
    /// reconstructed.
    pub fn estimate(reconstruction: &Reconstruction, marker_size: f64) -> Result<Self, AlignError> {
        let edges: Vec<f64> = marker_edge_lengths(reconstruction)
            .into_iter()
            .filter(|d| *d > f64::EPSILON)
            .collect();
        if edges.is_empty() {
            return Err(AlignError::InsufficientData(
                "no marker with four reconstructed corners".into(),
            ));
        }

        let n = edges.len() as f64;
        let median_edge = median(&edges);
        let mean_edge = edges.iter().sum::<f64>() / n;

        let scales: Vec<f64> = edges.iter().map(|d| marker_size / d).collect();
        let median_scale = marker_size / median_edge;
        let deviations: Vec<f64> = scales.iter().map(|s| (s - median_scale).abs()).collect();
        let mean_of_scales = scales.iter().sum::<f64>() / n;
        let variance = scales
            .iter()
            .map(|s| (s - mean_of_scales) * (s - mean_of_scales))
            .sum::<f64>()
            / n;

        let estimate = Self {
            median: median_scale,
            mean: marker_size / mean_edge,
            median_sigma: MAD_TO_SIGMA * median(&deviations),
            mean_sigma: variance.sqrt(),
            num_edges: edges.len(),
        };
        log::debug!("marker scale from {} edges: {:?}", estimate.num_edges, estimate);
        Ok(estimate)
    }

    /// The scale for an aggregation.
    pub fn scale(&self, aggregation: ScaleAggregation) -> f64 {
        match aggregation {
            ScaleAggregation::Median => self.median,
            ScaleAggregation::Mean => self.mean,
        }
    }

    /// The pure scaling similarity for an aggregation.
    pub fn similarity(&self, aggregation: ScaleAggregation) -> Similarity {
        Similarity::from_scale(self.scale(aggregation))
    }

    /// Write the median and mean scales followed by their dispersions, space separated.
    pub fn write_priors<W: Write>(&self, mut writer: W) -> Result<(), AlignError> {
        write!(
            writer,
            "{} {} {} {}",
            self.median, self.mean, self.median_sigma, self.mean_sigma
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruction::{MarkerCorner, Point};
    use approx::assert_relative_eq;

    fn add_marker(recon: &mut Reconstruction, marker_id: MarkerId, corners: &[DVec3]) {
        for (c, x) in corners.iter().enumerate() {
            let mut point = Point::new(format!("m{marker_id}_{c}"), *x);
            point.marker = Some(MarkerCorner {
                marker_id,
                corner_id: c as u8,
            });
            recon.add_point(point);
        }
    }

    fn square(origin: DVec3, edge: f64) -> [DVec3; 4] {
        [
            origin,
            origin + DVec3::new(edge, 0.0, 0.0),
            origin + DVec3::new(edge, edge, 0.0),
            origin + DVec3::new(0.0, edge, 0.0),
        ]
    }

    #[test]
    fn test_square_marker_scale() -> Result<(), Box<dyn std::error::Error>> {
        let mut recon = Reconstruction::default();
        add_marker(&mut recon, 1, &square(DVec3::new(3.0, 1.0, -2.0), 2.0));
        recon.add_point(Point::new("plain", DVec3::ONE));

        let scale = MarkerScale::estimate(&recon, 0.5)?;
        assert_relative_eq!(scale.median, 0.25, epsilon = 1e-12);
        assert_relative_eq!(scale.mean, 0.25, epsilon = 1e-12);
        assert_relative_eq!(scale.median_sigma, 0.0, epsilon = 1e-12);
        assert_eq!(scale.num_edges, 4);
        assert_relative_eq!(scale.similarity(ScaleAggregation::Median).scale, 0.25, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_median_and_mean_differ() -> Result<(), Box<dyn std::error::Error>> {
        let mut recon = Reconstruction::default();
        add_marker(&mut recon, 1, &square(DVec3::ZERO, 1.0));
        add_marker(&mut recon, 2, &square(DVec3::splat(10.0), 1.0));
        add_marker(&mut recon, 3, &square(DVec3::splat(-10.0), 4.0));

        let scale = MarkerScale::estimate(&recon, 1.0)?;
        // edges: eight of length 1, four of length 4
        assert_relative_eq!(scale.median, 1.0, epsilon = 1e-12);
        assert_relative_eq!(scale.mean, 0.5, epsilon = 1e-12);
        assert!(scale.mean_sigma > 0.0);
        assert_relative_eq!(scale.scale(ScaleAggregation::Mean), 0.5, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_incomplete_markers() {
        let mut recon = Reconstruction::default();
        add_marker(&mut recon, 1, &square(DVec3::ZERO, 1.0)[..3]);
        assert!(marker_edge_lengths(&recon).is_empty());
        assert!(matches!(
            MarkerScale::estimate(&recon, 0.1),
            Err(AlignError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_write_priors() -> Result<(), Box<dyn std::error::Error>> {
        let scale = MarkerScale {
            median: 0.5,
            mean: 0.25,
            median_sigma: 0.0,
            mean_sigma: 0.125,
            num_edges: 8,
        };
        let mut buffer = Vec::new();
        scale.write_priors(&mut buffer)?;
        assert_eq!(String::from_utf8(buffer)?, "0.5 0.25 0 0.125");
        Ok(())
    }
}
