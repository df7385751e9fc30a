//! Feature tracks and marker connectivity.
//!
//! Pairwise matches are merged into multi-view tracks with a disjoint set and stored
//! in a bipartite image/track graph. Marker matches additionally produce a bipartite
//! image/marker graph used to select candidate pairs and to seed resectioning.

/// Track graph construction from pairwise matches.
pub mod builder;

/// Bipartite image/track graph and its queries.
pub mod graph;

/// Bipartite image/marker graph.
pub mod marker_graph;

use std::fmt;

use crate::{reconstruction::MarkerCorner, ImageId, MarkerId};

pub use builder::{TrackBuilder, TracksError, TracksReport};
pub use graph::{CommonTracks, PairTracks, TracksGraph};
pub use marker_graph::{create_marker_graph, MarkerComponent, MarkerGraph};

/// Key of the matches between two images.
pub type ImageMatchKey = (ImageId, ImageId);

/// Features detected in one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageFeatures {
    /// Normalized pixel coordinates.
    pub points: Vec<[f64; 2]>,
    /// RGB colors.
    pub colors: Vec<[u8; 3]>,
}

impl ImageFeatures {
    /// Create a feature table, colors index-aligned with points.
    pub fn new(points: Vec<[f64; 2]>, colors: Vec<[u8; 3]>) -> Self {
        Self { points, colors }
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the image has no feature.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Identifier of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub usize);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node of the track graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackNode {
    /// An image.
    Image(ImageId),
    /// A track.
    Track(TrackId),
}

/// The observation of a track in an image, carried by a track graph edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackObservation {
    /// Normalized pixel coordinates.
    pub feature: [f64; 2],
    /// Index of the feature in the image feature table.
    pub feature_id: usize,
    /// Color of the feature.
    pub color: [f64; 3],
    /// Marker corner of the feature, `None` for ordinary features.
    pub marker: Option<MarkerCorner>,
}

impl TrackObservation {
    /// Returns true if the observation is a marker corner.
    pub fn is_marker(&self) -> bool {
        self.marker.is_some()
    }

    /// Marker id, 0 for ordinary features.
    pub fn marker_id(&self) -> MarkerId {
        self.marker.map_or(0, |m| m.marker_id)
    }

    /// Corner index, 0 for ordinary features.
    pub fn corner_id(&self) -> u8 {
        self.marker.map_or(0, |m| m.corner_id)
    }
}
