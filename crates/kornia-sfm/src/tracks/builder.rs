use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::{
    markers::{MarkerFeatures, MarkerMatch},
    reconstruction::MarkerCorner,
    union_find::KeyedUnionFind,
    ImageId, MarkerId,
};

use super::{ImageFeatures, ImageMatchKey, TrackId, TrackObservation, TracksGraph};

/// Errors that can occur when building tracks.
#[derive(Debug, Error)]
pub enum TracksError {
    /// A match references a feature the image does not have.
    #[error("feature {feature} is out of range for image {image} with {len} features")]
    FeatureOutOfRange {
        /// Image of the feature.
        image: ImageId,
        /// Index of the feature.
        feature: usize,
        /// Number of features of the image.
        len: usize,
    },
}

/// Counts collected while building tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TracksReport {
    /// Equivalence classes found by the union pass, ordinary and marker.
    pub classes: usize,
    /// Classes dropped for having fewer than the minimum number of observations.
    pub short_classes: usize,
    /// Classes dropped for observing an image more than once.
    pub inconsistent_classes: usize,
    /// Classes dropped for having fewer than the minimum number of observations in
    /// images with a feature table.
    pub incomplete_classes: usize,
    /// Ordinary tracks kept.
    pub tracks: usize,
    /// Marker tracks kept.
    pub marker_tracks: usize,
}

/// A member of a track equivalence class.
trait Observation {
    fn image(&self) -> &ImageId;
}

impl Observation for (ImageId, usize) {
    fn image(&self) -> &ImageId {
        &self.0
    }
}

impl Observation for (ImageId, usize, MarkerId) {
    fn image(&self) -> &ImageId {
        &self.0
    }
}

/// Merges pairwise matches into tracks.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use kornia_sfm::tracks::{ImageFeatures, TrackBuilder};
///
/// let features: HashMap<String, ImageFeatures> = ["a", "b", "c"]
///     .into_iter()
///     .map(|im| (im.to_string(), ImageFeatures::new(vec![[0.0, 0.0]; 2], vec![[0, 0, 0]; 2])))
///     .collect();
/// let mut matches = HashMap::new();
/// matches.insert(("a".to_string(), "b".to_string()), vec![(0, 1)]);
/// matches.insert(("b".to_string(), "c".to_string()), vec![(1, 0)]);
///
/// let (graph, report) = TrackBuilder::new(2)
///     .build(&features, &matches, &HashMap::new(), &HashMap::new())
///     .unwrap();
/// assert_eq!(report.tracks, 1);
/// assert_eq!(graph.num_observations(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackBuilder {
    /// Minimum number of observations of a track.
    pub min_track_length: usize,
}

impl Default for TrackBuilder {
    fn default() -> Self {
        Self {
            min_track_length: 2,
        }
    }
}

impl TrackBuilder {
    /// Create a builder keeping tracks with at least `min_track_length` observations.
    pub fn new(min_track_length: usize) -> Self {
        Self { min_track_length }
    }

    /// Build the track graph.
    ///
    /// Feature matches are merged on `(image, feature)`, marker matches on
    /// `(image, feature, marker id)` so that different markers never merge. Marker
    /// track ids follow the ordinary track ids. Observations of images missing from
    /// the feature tables are skipped, and a track left shorter than the minimum
    /// length by them is dropped.
    ///
    /// # Arguments
    ///
    /// * `features` - Feature table of every image.
    /// * `matches` - Feature index pairs of every matched image pair.
    /// * `marker_features` - Marker corner table of every image.
    /// * `marker_matches` - Marker corner matches of every matched image pair.
    pub fn build(
        &self,
        features: &HashMap<ImageId, ImageFeatures>,
        matches: &HashMap<ImageMatchKey, Vec<(usize, usize)>>,
        marker_features: &HashMap<ImageId, MarkerFeatures>,
        marker_matches: &HashMap<ImageMatchKey, Vec<MarkerMatch>>,
    ) -> Result<(TracksGraph, TracksReport), TracksError> {
        let mut report = TracksReport::default();

        log::debug!("merging features onto tracks");
        let mut uf: KeyedUnionFind<(ImageId, usize)> = KeyedUnionFind::new();
        for key in sorted_keys(matches) {
            let (im1, im2) = key;
            for (f1, f2) in &matches[key] {
                uf.union((im1.clone(), *f1), (im2.clone(), *f2));
            }
        }
        let tracks = self.good_tracks(uf.sets(), &mut report);
        let tracks = self.complete_tracks(tracks, features, &mut report);
        report.tracks = tracks.len();
        log::debug!("good tracks: {}", tracks.len());

        log::debug!("merging marker features onto tracks");
        let mut uf: KeyedUnionFind<(ImageId, usize, MarkerId)> = KeyedUnionFind::new();
        for key in sorted_keys(marker_matches) {
            let (im1, im2) = key;
            for m in &marker_matches[key] {
                uf.union(
                    (im1.clone(), m.feature1, m.marker_id),
                    (im2.clone(), m.feature2, m.marker_id),
                );
            }
        }
        let marker_tracks = self.good_tracks(uf.sets(), &mut report);
        let marker_tracks = self.complete_tracks(marker_tracks, marker_features, &mut report);
        report.marker_tracks = marker_tracks.len();
        log::debug!("good marker tracks: {}", marker_tracks.len());

        let mut graph = TracksGraph::new();
        let mut skipped = 0;

        for (i, track) in tracks.iter().enumerate() {
            for (image, feature) in track {
                let Some(table) = features.get(image) else {
                    skipped += 1;
                    continue;
                };
                let out_of_range = || TracksError::FeatureOutOfRange {
                    image: image.clone(),
                    feature: *feature,
                    len: table.len(),
                };
                let point = table.points.get(*feature).ok_or_else(out_of_range)?;
                let color = table.colors.get(*feature).ok_or_else(out_of_range)?;
                graph.add_observation(
                    image,
                    TrackId(i),
                    TrackObservation {
                        feature: *point,
                        feature_id: *feature,
                        color: color.map(f64::from),
                        marker: None,
                    },
                );
            }
        }

        let offset = tracks.len();
        for (i, track) in marker_tracks.iter().enumerate() {
            for (image, feature, marker_id) in track {
                let Some(table) = marker_features.get(image) else {
                    skipped += 1;
                    continue;
                };
                let out_of_range = || TracksError::FeatureOutOfRange {
                    image: image.clone(),
                    feature: *feature,
                    len: table.len(),
                };
                let point = table.points.get(*feature).ok_or_else(out_of_range)?;
                let color = table.colors.get(*feature).ok_or_else(out_of_range)?;
                let corner_id = table.corner_ids.get(*feature).ok_or_else(out_of_range)?;
                graph.add_observation(
                    image,
                    TrackId(offset + i),
                    TrackObservation {
                        feature: *point,
                        feature_id: *feature,
                        color: color.map(f64::from),
                        marker: Some(MarkerCorner {
                            marker_id: *marker_id,
                            corner_id: *corner_id,
                        }),
                    },
                );
            }
        }

        if skipped > 0 {
            log::debug!("skipped {} observations of images without features", skipped);
        }
        if report.incomplete_classes > 0 {
            log::debug!(
                "dropped {} tracks too short once images without features are left out",
                report.incomplete_classes
            );
        }
        if report.inconsistent_classes > 0 {
            log::warn!(
                "dropped {} tracks observing an image more than once",
                report.inconsistent_classes
            );
        }
        log::info!(
            "created {} tracks and {} marker tracks over {} images",
            report.tracks,
            report.marker_tracks,
            graph.num_images()
        );

        Ok((graph, report))
    }

    /// Keep the classes long enough and observing every image at most once.
    ///
    /// Inconsistent classes are dropped whole.
    fn good_tracks<K: Observation>(
        &self,
        classes: Vec<Vec<K>>,
        report: &mut TracksReport,
    ) -> Vec<Vec<K>> {
        report.classes += classes.len();
        let mut good = Vec::new();
        for class in classes {
            if class.len() < self.min_track_length {
                report.short_classes += 1;
                continue;
            }
            let mut images = HashSet::new();
            if !class.iter().all(|o| images.insert(o.image())) {
                report.inconsistent_classes += 1;
                continue;
            }
            good.push(class);
        }
        good
    }

    /// Drop the tracks with fewer than the minimum number of observations in images
    /// that have a table.
    fn complete_tracks<K: Observation, T>(
        &self,
        tracks: Vec<Vec<K>>,
        tables: &HashMap<ImageId, T>,
        report: &mut TracksReport,
    ) -> Vec<Vec<K>> {
        let (complete, incomplete): (Vec<_>, Vec<_>) = tracks.into_iter().partition(|track| {
            track.iter().filter(|o| tables.contains_key(o.image())).count()
                >= self.min_track_length
        });
        report.incomplete_classes += incomplete.len();
        complete
    }
}

fn sorted_keys<V>(matches: &HashMap<ImageMatchKey, V>) -> Vec<&ImageMatchKey> {
    let mut keys: Vec<&ImageMatchKey> = matches.keys().collect();
    keys.sort();
    keys
}
