use std::collections::BTreeMap;

use crate::{reconstruction::MarkerCorner, ImageId};

use super::{ImageMatchKey, TrackId, TrackNode, TrackObservation};

/// Tracks observed in two images, coordinates index-aligned with `tracks`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonTracks {
    /// Tracks observed in both images.
    pub tracks: Vec<TrackId>,
    /// Coordinates of the tracks in the first image.
    pub p1: Vec<[f64; 2]>,
    /// Coordinates of the tracks in the second image.
    pub p2: Vec<[f64; 2]>,
}

/// Tracks shared by an image pair, with their marker corners.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairTracks {
    /// Tracks observed in both images.
    pub tracks: Vec<TrackId>,
    /// Coordinates of the tracks in the first image.
    pub p1: Vec<[f64; 2]>,
    /// Coordinates of the tracks in the second image.
    pub p2: Vec<[f64; 2]>,
    /// Marker corner of every track, as observed in the second image.
    pub markers: Vec<Option<MarkerCorner>>,
}

/// Bipartite graph between images and tracks.
///
/// Every edge carries the [`TrackObservation`] of a track in an image. Adjacency is
/// kept in both directions so that per-image and per-track queries are cheap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TracksGraph {
    images: BTreeMap<ImageId, BTreeMap<TrackId, TrackObservation>>,
    tracks: BTreeMap<TrackId, BTreeMap<ImageId, TrackObservation>>,
}

impl TracksGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the edge between `image` and `track`, replacing a previous observation.
    pub fn add_observation(&mut self, image: &str, track: TrackId, observation: TrackObservation) {
        self.images
            .entry(image.to_string())
            .or_default()
            .insert(track, observation);
        self.tracks
            .entry(track)
            .or_default()
            .insert(image.to_string(), observation);
    }

    /// Returns true if the graph holds the node.
    pub fn contains(&self, node: &TrackNode) -> bool {
        match node {
            TrackNode::Image(image) => self.images.contains_key(image),
            TrackNode::Track(track) => self.tracks.contains_key(track),
        }
    }

    /// Neighbours of a node: tracks of an image, or images of a track.
    pub fn neighbors(&self, node: &TrackNode) -> Vec<TrackNode> {
        match node {
            TrackNode::Image(image) => self
                .images
                .get(image)
                .map(|t| t.keys().map(|id| TrackNode::Track(*id)).collect())
                .unwrap_or_default(),
            TrackNode::Track(track) => self
                .tracks
                .get(track)
                .map(|i| i.keys().map(|id| TrackNode::Image(id.clone())).collect())
                .unwrap_or_default(),
        }
    }

    /// Split the nodes by kind: the tracks and the images of the graph.
    pub fn tracks_and_images(&self) -> (Vec<TrackId>, Vec<ImageId>) {
        (
            self.tracks.keys().copied().collect(),
            self.images.keys().cloned().collect(),
        )
    }

    /// Observations of the tracks seen in `image`.
    pub fn image_tracks(&self, image: &str) -> Option<&BTreeMap<TrackId, TrackObservation>> {
        self.images.get(image)
    }

    /// Observations of `track` in every image that sees it.
    pub fn track_observations(&self, track: TrackId) -> Option<&BTreeMap<ImageId, TrackObservation>> {
        self.tracks.get(&track)
    }

    /// The observation of `track` in `image`.
    pub fn observation(&self, image: &str, track: TrackId) -> Option<&TrackObservation> {
        self.images.get(image)?.get(&track)
    }

    /// Tracks observed in both images.
    ///
    /// `p1[i]` and `p2[i]` are the coordinates of `tracks[i]` in the first and the
    /// second image. Unknown images share no track.
    pub fn common_tracks(&self, im1: &str, im2: &str) -> CommonTracks {
        let mut common = CommonTracks::default();
        let (Some(t1), Some(t2)) = (self.images.get(im1), self.images.get(im2)) else {
            return common;
        };
        for (track, o1) in t1 {
            if let Some(o2) = t2.get(track) {
                common.tracks.push(*track);
                common.p1.push(o1.feature);
                common.p2.push(o2.feature);
            }
        }
        common
    }

    /// Tracks shared by every image pair having at least `min_common` of `tracks` in common.
    ///
    /// Pairs are keyed by sorted image ids; pairs below the threshold are left out.
    pub fn all_common_tracks(
        &self,
        tracks: &[TrackId],
        min_common: usize,
    ) -> BTreeMap<ImageMatchKey, PairTracks> {
        let mut per_pair: BTreeMap<(&ImageId, &ImageId), Vec<TrackId>> = BTreeMap::new();
        for track in tracks {
            let Some(observations) = self.tracks.get(track) else {
                continue;
            };
            let images: Vec<&ImageId> = observations.keys().collect();
            for (i, im1) in images.iter().enumerate() {
                for im2 in images.iter().skip(i + 1) {
                    per_pair.entry((*im1, *im2)).or_default().push(*track);
                }
            }
        }

        let mut common = BTreeMap::new();
        for ((im1, im2), shared) in per_pair {
            if shared.len() < min_common {
                continue;
            }
            let mut pair = PairTracks::default();
            for track in shared {
                let (Some(o1), Some(o2)) = (self.observation(im1, track), self.observation(im2, track))
                else {
                    continue;
                };
                pair.tracks.push(track);
                pair.p1.push(o1.feature);
                pair.p2.push(o2.feature);
                pair.markers.push(o2.marker);
            }
            common.insert((im1.clone(), im2.clone()), pair);
        }
        log::debug!(
            "{} image pairs share at least {} tracks",
            common.len(),
            min_common
        );
        common
    }

    /// Number of image nodes.
    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    /// Number of track nodes.
    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Number of image/track edges.
    pub fn num_observations(&self) -> usize {
        self.images.values().map(BTreeMap::len).sum()
    }
}
