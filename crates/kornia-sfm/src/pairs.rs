//! Candidate image pair selection.
//!
//! Decides which image pairs are worth matching, from GPS proximity, capture time,
//! sequence order and marker co-visibility. Every selector returns unordered pairs.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use kiddo::{immutable::float::kdtree::ImmutableKdTree, SquaredEuclidean};

use crate::{
    config::{MarkerPruning, SfmConfig},
    geo::{invent_reference, Lla, LocalTangentPlane, TopocentricConverter},
    tracks::MarkerGraph,
    ImageId,
};

/// An unordered image pair, stored with the lexicographically smaller image first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImagePair {
    first: ImageId,
    second: ImageId,
}

impl ImagePair {
    /// Create the unordered pair of `a` and `b`.
    pub fn new(a: impl Into<ImageId>, b: impl Into<ImageId>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    /// The lexicographically smaller image.
    pub fn first(&self) -> &ImageId {
        &self.first
    }

    /// The lexicographically larger image.
    pub fn second(&self) -> &ImageId {
        &self.second
    }

    /// Returns true if `image` is one of the two images.
    pub fn contains(&self, image: &str) -> bool {
        self.first == image || self.second == image
    }
}

/// A set of candidate pairs.
pub type CandidatePairs = BTreeSet<ImagePair>;

/// EXIF derived metadata of an image.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageMetadata {
    /// GPS fix, if the image has one.
    pub gps: Option<Lla>,
    /// Capture time in seconds since the epoch, if known.
    pub capture_time: Option<f64>,
    /// EXIF orientation code (1 to 8).
    pub orientation: u8,
    /// Identifier of the camera that took the image.
    pub camera: String,
}

/// Assign every pair to its first image, the unit of work of the matching stage.
///
/// Every image gets an entry, possibly empty.
pub fn per_image(images: &[ImageId], pairs: &CandidatePairs) -> BTreeMap<ImageId, Vec<ImageId>> {
    let mut res: BTreeMap<ImageId, Vec<ImageId>> =
        images.iter().map(|im| (im.clone(), Vec::new())).collect();
    for pair in pairs {
        res.entry(pair.first.clone())
            .or_default()
            .push(pair.second.clone());
    }
    res
}

/// All pairs of distinct images.
pub fn match_candidates_all(images: &[ImageId]) -> CandidatePairs {
    let mut pairs = CandidatePairs::new();
    for (i, im1) in images.iter().enumerate() {
        for im2 in images.iter().skip(i + 1) {
            if im1 != im2 {
                pairs.insert(ImagePair::new(im1.clone(), im2.clone()));
            }
        }
    }
    pairs
}

/// Pairs of images close to each other according to their GPS position.
///
/// Every image is paired with up to `max_neighbors` of its nearest images within
/// `max_distance` metres in the local tangent plane. A bound of 0 means no limit,
/// and the mode is off when both are 0. If any image lacks GPS the mode is disabled
/// and the set is empty.
///
/// # Arguments
///
/// * `images` - Images to pair.
/// * `exifs` - Metadata of every image.
/// * `plane` - Local tangent plane the GPS fixes are projected to.
/// * `max_neighbors` - Maximum number of neighbours per image.
/// * `max_distance` - Maximum distance between paired images.
pub fn match_candidates_by_distance(
    images: &[ImageId],
    exifs: &HashMap<ImageId, ImageMetadata>,
    plane: &impl LocalTangentPlane,
    max_neighbors: usize,
    max_distance: f64,
) -> CandidatePairs {
    let mut pairs = CandidatePairs::new();
    if (max_neighbors == 0 && max_distance <= 0.0) || images.is_empty() {
        return pairs;
    }

    let mut points = Vec::with_capacity(images.len());
    for image in images {
        match exifs.get(image).and_then(|exif| exif.gps.as_ref()) {
            Some(gps) => points.push(plane.topocentric(gps)),
            None => {
                log::warn!("image {image} has no GPS, disabling GPS candidate pairs");
                return pairs;
            }
        }
    }

    let k = match max_neighbors {
        0 => images.len(),
        n => (n + 1).min(images.len()),
    };
    let radius = if max_distance > 0.0 {
        max_distance * max_distance
    } else {
        f64::INFINITY
    };

    let kdtree: ImmutableKdTree<f64, u32, 3, 32> = ImmutableKdTree::new_from_slice(&points);

    for (i, point) in points.iter().enumerate() {
        let mut neighbors = kdtree
            .within::<SquaredEuclidean>(point, radius)
            .into_iter()
            .map(|nn| (nn.distance, nn.item as usize))
            .collect::<Vec<_>>();
        neighbors.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        for (_, j) in neighbors.into_iter().take(k) {
            if i != j {
                pairs.insert(ImagePair::new(images[i].clone(), images[j].clone()));
            }
        }
    }
    pairs
}

/// Pairs of images captured close in time.
///
/// Every image is paired with its `max_neighbors` nearest images by capture time,
/// earlier images winning ties. If any image lacks a capture time the set is empty.
pub fn match_candidates_by_time(
    images: &[ImageId],
    exifs: &HashMap<ImageId, ImageMetadata>,
    max_neighbors: usize,
) -> CandidatePairs {
    let mut pairs = CandidatePairs::new();
    if max_neighbors == 0 {
        return pairs;
    }

    let mut times = Vec::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        match exifs.get(image).and_then(|exif| exif.capture_time) {
            Some(t) => times.push((t, i)),
            None => {
                log::warn!("image {image} has no capture time, disabling time candidate pairs");
                return pairs;
            }
        }
    }
    times.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    // grow a window around each image in the sorted sequence
    for (pos, &(t, i)) in times.iter().enumerate() {
        let (mut lo, mut hi) = (pos, pos + 1);
        for _ in 0..max_neighbors {
            let left = lo.checked_sub(1).map(|l| (t - times[l].0, l));
            let right = times.get(hi).map(|&(th, _)| (th - t, hi));
            let j = match (left, right) {
                (Some((dl, l)), Some((dr, _))) if dl <= dr => {
                    lo = l;
                    l
                }
                (_, Some((_, r))) => {
                    hi += 1;
                    r
                }
                (Some((_, l)), None) => {
                    lo = l;
                    l
                }
                (None, None) => break,
            };
            pairs.insert(ImagePair::new(images[i].clone(), images[times[j].1].clone()));
        }
    }
    pairs
}

/// Pairs of images close in the sorted image sequence.
///
/// Every image is paired with the images at most `(max_neighbors + 2) / 2` positions
/// away in `images`, which is expected to be sorted.
pub fn match_candidates_by_order(images: &[ImageId], max_neighbors: usize) -> CandidatePairs {
    let mut pairs = CandidatePairs::new();
    if max_neighbors == 0 {
        return pairs;
    }
    let n = (max_neighbors + 2) / 2;

    for (i, image) in images.iter().enumerate() {
        let a = i.saturating_sub(n);
        let b = (i + n + 1).min(images.len());
        for j in a..b {
            if i != j {
                pairs.insert(ImagePair::new(image.clone(), images[j].clone()));
            }
        }
    }
    pairs
}

/// Union of the GPS distance, capture time and sequence order candidate pairs.
///
/// Images are sorted before selection. When `plane` is `None` a reference is
/// invented from the mean GPS position of the images.
pub fn match_candidates_from_metadata(
    images: &[ImageId],
    exifs: &HashMap<ImageId, ImageMetadata>,
    plane: Option<&dyn LocalTangentPlane>,
    config: &SfmConfig,
) -> CandidatePairs {
    let mut images = images.to_vec();
    images.sort();

    let mut gps_neighbors = config.matching_gps_neighbors;
    let mut max_distance = config.matching_gps_distance;

    let all_have_gps = images
        .iter()
        .all(|im| exifs.get(im).is_some_and(|exif| exif.gps.is_some()));
    if !all_have_gps {
        if gps_neighbors != 0 {
            log::warn!("not all images have GPS info, disabling matching_gps_neighbors");
        }
        gps_neighbors = 0;
        max_distance = 0.0;
    }

    let d = match plane {
        Some(plane) => {
            match_candidates_by_distance(&images, exifs, &plane, gps_neighbors, max_distance)
        }
        None => {
            let reference = invent_reference(images.iter().filter_map(|im| {
                exifs.get(im).and_then(|exif| exif.gps.as_ref())
            }));
            match reference {
                Some(reference) => match_candidates_by_distance(
                    &images,
                    exifs,
                    &TopocentricConverter::new(reference),
                    gps_neighbors,
                    max_distance,
                ),
                None => {
                    log::debug!("no GPS positions, skipping GPS candidate pairs");
                    CandidatePairs::new()
                }
            }
        }
    };
    let t = match_candidates_by_time(&images, exifs, config.matching_time_neighbors);
    let o = match_candidates_by_order(&images, config.matching_order_neighbors);
    log::debug!(
        "metadata candidates: {} by distance, {} by time, {} by order",
        d.len(),
        t.len(),
        o.len()
    );

    d.into_iter().chain(t).chain(o).collect()
}

/// Pairs of images connected through the marker graph.
///
/// * [`MarkerPruning::Strict`] pairs images observing a common marker.
/// * [`MarkerPruning::Medium`] also pairs every image without markers with every image.
/// * [`MarkerPruning::Loose`] also pairs every image of a connected component with the
///   images of every other component.
///
/// [`MarkerPruning::None`] yields an empty set.
pub fn match_candidates_from_markers(
    images: &[ImageId],
    graph: &MarkerGraph,
    pruning: MarkerPruning,
) -> CandidatePairs {
    let mut pairs = CandidatePairs::new();
    if pruning == MarkerPruning::None {
        return pairs;
    }

    let requested: HashSet<&ImageId> = images.iter().collect();
    let mut images_without_markers = Vec::new();
    for im1 in images {
        let markers = graph.markers_in_image(im1);
        if markers.is_empty() {
            images_without_markers.push(im1);
            continue;
        }
        for marker in markers {
            for im2 in graph.images_with_marker(marker) {
                if im1 != im2 && requested.contains(im2) {
                    pairs.insert(ImagePair::new(im1.clone(), im2.clone()));
                }
            }
        }
    }

    if pruning >= MarkerPruning::Medium {
        for image in images_without_markers {
            for candidate in images {
                if image != candidate {
                    pairs.insert(ImagePair::new(image.clone(), candidate.clone()));
                }
            }
        }
    }

    if pruning >= MarkerPruning::Loose {
        let components = graph.marker_connected_components();
        if components.len() > 1 {
            log::info!(
                "merging {} marker graph connected components in loose mode",
                components.len()
            );
        }
        for (i, cc1) in components.iter().enumerate() {
            for cc2 in components.iter().skip(i + 1) {
                for im1 in cc1.images().filter(|im| requested.contains(im)) {
                    for im2 in cc2.images().filter(|im| requested.contains(im)) {
                        pairs.insert(ImagePair::new(im1.clone(), im2.clone()));
                    }
                }
            }
        }
    }

    pairs
}

/// Select the pairs to match: all pairs, intersected with the marker pairs when
/// marker pruning is on and with the metadata pairs when metadata pruning is on.
///
/// A criterion that yields no pair at all is reported and skipped instead of
/// emptying the selection.
pub fn select_candidate_pairs(
    images: &[ImageId],
    exifs: &HashMap<ImageId, ImageMetadata>,
    markers: Option<&MarkerGraph>,
    plane: Option<&dyn LocalTangentPlane>,
    config: &SfmConfig,
) -> CandidatePairs {
    let mut pairs = match_candidates_all(images);
    log::info!("{} initial matching image pairs", pairs.len());

    if config.prune_with_tags != MarkerPruning::None {
        let marker_pairs = match markers {
            Some(graph) => match_candidates_from_markers(images, graph, config.prune_with_tags),
            None => CandidatePairs::new(),
        };
        log::info!("{} marker matching image pairs", marker_pairs.len());
        if marker_pairs.is_empty() {
            log::warn!("marker pruning produced no pair, skipping it");
        } else {
            pairs = pairs.intersection(&marker_pairs).cloned().collect();
        }
    }

    if config.prune_with_metadata {
        let meta_pairs = match_candidates_from_metadata(images, exifs, plane, config);
        log::info!("{} metadata matching image pairs", meta_pairs.len());
        if meta_pairs.is_empty() {
            log::warn!("metadata pruning produced no pair, skipping it");
        } else {
            pairs = pairs.intersection(&meta_pairs).cloned().collect();
        }
    }

    log::info!("{} final matching image pairs", pairs.len());
    pairs
}
