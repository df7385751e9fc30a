use std::collections::{BTreeSet, HashSet};

use crate::MarkerId;

/// Number of corners of a marker.
pub const MARKER_CORNERS: usize = 4;

/// A correspondence between two marker corner features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerMatch {
    /// Feature index in the first image.
    pub feature1: usize,
    /// Feature index in the second image.
    pub feature2: usize,
    /// Id of the marker both corners belong to.
    pub marker_id: MarkerId,
}

impl MarkerMatch {
    /// Create a marker corner correspondence.
    pub fn new(feature1: usize, feature2: usize, marker_id: MarkerId) -> Self {
        Self {
            feature1,
            feature2,
            marker_id,
        }
    }
}

/// Marker corner features detected in one image.
///
/// Detections are stored as four consecutive features, one per corner, so the
/// feature `4 * d + c` is corner `c` of detection `d`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerFeatures {
    /// Normalized pixel coordinates of the corners.
    pub points: Vec<[f64; 2]>,
    /// Colors of the corners.
    pub colors: Vec<[u8; 3]>,
    /// Corner index (0 to 3) of every feature.
    pub corner_ids: Vec<u8>,
    /// Marker id of every feature.
    pub marker_ids: Vec<MarkerId>,
}

impl MarkerFeatures {
    /// Append the four corners of a detection.
    pub fn push_detection(
        &mut self,
        marker_id: MarkerId,
        corners: [[f64; 2]; MARKER_CORNERS],
        color: [u8; 3],
    ) {
        for (c, corner) in corners.into_iter().enumerate() {
            self.points.push(corner);
            self.colors.push(color);
            self.corner_ids.push(c as u8);
            self.marker_ids.push(marker_id);
        }
    }

    /// Number of corner features.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the image has no marker detection.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Marker ids of the detections, in detection order.
    pub fn detection_ids(&self) -> impl Iterator<Item = MarkerId> + '_ {
        self.marker_ids.iter().step_by(MARKER_CORNERS).copied()
    }
}

/// Match the marker detections of two images.
///
/// Every detection of `a` whose id is also detected in `b` yields the four corner
/// correspondences. Ids in `ignored` are skipped.
pub fn match_marker_features(
    a: &MarkerFeatures,
    b: &MarkerFeatures,
    ignored: &HashSet<MarkerId>,
) -> Vec<MarkerMatch> {
    let mut matches = Vec::new();
    for (d1, id1) in a.detection_ids().enumerate() {
        if ignored.contains(&id1) {
            continue;
        }
        for (d2, id2) in b.detection_ids().enumerate() {
            if id1 != id2 {
                continue;
            }
            for c in 0..MARKER_CORNERS {
                matches.push(MarkerMatch::new(
                    d1 * MARKER_CORNERS + c,
                    d2 * MARKER_CORNERS + c,
                    id1,
                ));
            }
        }
    }
    matches
}

/// Marker ids to leave out so that roughly `keep_ratio` of the ids are used.
///
/// The ratio is rounded down to a whole percent and reduced to a fraction `p / q`;
/// walking the ids in ascending order, the first `p` of every `q` ids are kept.
pub fn marker_ignore_list(
    ids: impl IntoIterator<Item = MarkerId>,
    keep_ratio: f64,
) -> HashSet<MarkerId> {
    let ids: BTreeSet<MarkerId> = ids.into_iter().collect();

    let percent = (keep_ratio * 100.0).floor().clamp(0.0, 100.0) as usize;
    let divisor = gcd(percent, 100).max(1);
    let (numerator, denominator) = (percent / divisor, 100 / divisor);

    let mut ignored = HashSet::new();
    let mut n = 1;
    for id in ids.iter() {
        if n > numerator {
            ignored.insert(*id);
        }
        if n == denominator {
            n = 1;
            continue;
        }
        n += 1;
    }

    log::debug!(
        "keeping {} of {} marker ids (keep fraction {}/{})",
        ids.len() - ignored.len(),
        ids.len(),
        numerator,
        denominator
    );
    ignored
}

fn gcd(a: usize, b: usize) -> usize {
    match b {
        0 => a,
        _ => gcd(b, a % b),
    }
}
