use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::{markers::MarkerMatch, union_find::KeyedUnionFind, ImageId, MarkerId};

use super::ImageMatchKey;

/// Bipartite graph between images and the marker ids they observe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerGraph {
    images: BTreeMap<ImageId, BTreeSet<MarkerId>>,
    markers: BTreeMap<MarkerId, BTreeSet<ImageId>>,
}

/// A connected component of the marker graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerComponent {
    markers_per_image: BTreeMap<ImageId, usize>,
    markers: BTreeSet<MarkerId>,
}

impl MarkerComponent {
    /// Images of the component.
    pub fn images(&self) -> impl Iterator<Item = &ImageId> + '_ {
        self.markers_per_image.keys()
    }

    /// Markers of the component.
    pub fn markers(&self) -> impl Iterator<Item = MarkerId> + '_ {
        self.markers.iter().copied()
    }

    /// Number of images in the component.
    pub fn num_images(&self) -> usize {
        self.markers_per_image.len()
    }

    /// Number of markers in the component.
    pub fn num_markers(&self) -> usize {
        self.markers.len()
    }

    /// Number of markers every image of the component observes.
    pub fn markers_per_image(&self) -> &BTreeMap<ImageId, usize> {
        &self.markers_per_image
    }
}

impl MarkerGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the edge between an image and a marker.
    pub fn add_edge(&mut self, image: &str, marker: MarkerId) {
        self.images
            .entry(image.to_string())
            .or_default()
            .insert(marker);
        self.markers
            .entry(marker)
            .or_default()
            .insert(image.to_string());
    }

    /// Image nodes.
    pub fn images(&self) -> impl Iterator<Item = &ImageId> + '_ {
        self.images.keys()
    }

    /// Marker nodes.
    pub fn markers(&self) -> impl Iterator<Item = MarkerId> + '_ {
        self.markers.keys().copied()
    }

    /// Markers observed in `image`, in ascending id order.
    pub fn markers_in_image(&self, image: &str) -> Vec<MarkerId> {
        self.images
            .get(image)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Images observing `marker`.
    pub fn images_with_marker(&self, marker: MarkerId) -> Vec<&ImageId> {
        self.markers
            .get(&marker)
            .map(|i| i.iter().collect())
            .unwrap_or_default()
    }

    /// Returns true if the graph has no node.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Split the graph into connected components.
    ///
    /// Components are sorted by descending number of images, then by descending
    /// number of markers, then by their first image id.
    pub fn marker_connected_components(&self) -> Vec<MarkerComponent> {
        let mut visited: BTreeSet<&ImageId> = BTreeSet::new();
        let mut components = Vec::new();

        for start in self.images.keys() {
            if visited.contains(start) {
                continue;
            }
            let mut component = MarkerComponent::default();
            let mut queue = VecDeque::from([start]);
            visited.insert(start);
            while let Some(image) = queue.pop_front() {
                let markers = match self.images.get(image) {
                    Some(markers) => markers,
                    None => continue,
                };
                component
                    .markers_per_image
                    .insert(image.clone(), markers.len());
                for marker in markers {
                    if !component.markers.insert(*marker) {
                        continue;
                    }
                    for neighbor in self.markers.get(marker).into_iter().flatten() {
                        if visited.insert(neighbor) {
                            queue.push_back(neighbor);
                        }
                    }
                }
            }
            components.push(component);
        }

        components.sort_by(|a, b| {
            b.num_images()
                .cmp(&a.num_images())
                .then(b.num_markers().cmp(&a.num_markers()))
                .then_with(|| a.images().next().cmp(&b.images().next()))
        });
        log::debug!("marker graph has {} connected components", components.len());
        components
    }
}

/// Build the marker graph from marker matches.
///
/// Observations `(image, marker)` are merged through the matches; a marker is linked
/// to the images of its class when the class spans at least `min_track_length` images.
pub fn create_marker_graph(
    marker_matches: &HashMap<ImageMatchKey, Vec<MarkerMatch>>,
    min_track_length: usize,
) -> MarkerGraph {
    let mut keys: Vec<&ImageMatchKey> = marker_matches.keys().collect();
    keys.sort();

    let mut uf: KeyedUnionFind<(ImageId, MarkerId)> = KeyedUnionFind::new();
    for key in keys {
        let (im1, im2) = key;
        for m in &marker_matches[key] {
            uf.union((im1.clone(), m.marker_id), (im2.clone(), m.marker_id));
        }
    }

    let mut graph = MarkerGraph::new();
    let mut good = 0;
    for set in uf.sets() {
        if set.len() < min_track_length {
            continue;
        }
        good += 1;
        for (image, marker) in set {
            graph.add_edge(&image, marker);
        }
    }
    log::debug!("good marker tracks: {}", good);
    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(edges: &[(&str, &str, MarkerId)]) -> HashMap<ImageMatchKey, Vec<MarkerMatch>> {
        let mut matches: HashMap<ImageMatchKey, Vec<MarkerMatch>> = HashMap::new();
        for (a, b, id) in edges {
            matches
                .entry((a.to_string(), b.to_string()))
                .or_default()
                .extend((0..4).map(|c| MarkerMatch::new(c, c, *id)));
        }
        matches
    }

    #[test]
    fn test_marker_graph_edges() {
        let graph = create_marker_graph(&matches(&[("a", "b", 1), ("b", "c", 1), ("c", "d", 2)]), 2);
        assert_eq!(graph.markers_in_image("b"), vec![1]);
        assert_eq!(graph.markers_in_image("c"), vec![1, 2]);
        assert_eq!(graph.images_with_marker(1), vec!["a", "b", "c"]);
        assert!(graph.markers_in_image("x").is_empty());

        // marker 2 spans only two images
        let graph = create_marker_graph(&matches(&[("a", "b", 1), ("b", "c", 1), ("c", "d", 2)]), 3);
        assert_eq!(graph.markers().collect::<Vec<_>>(), vec![1]);
        assert!(graph.images_with_marker(2).is_empty());
    }

    #[test]
    fn test_connected_components_sorted() {
        let graph = create_marker_graph(
            &matches(&[
                ("e", "f", 7),
                ("a", "b", 1),
                ("b", "c", 2),
                ("x", "y", 3),
                ("x", "y", 4),
            ]),
            2,
        );
        let components = graph.marker_connected_components();
        assert_eq!(components.len(), 3);

        assert_eq!(components[0].num_images(), 3);
        assert_eq!(components[0].num_markers(), 2);
        assert_eq!(components[0].markers_per_image()["b"], 2);
        assert_eq!(components[0].markers_per_image()["a"], 1);

        // two images each, more markers first
        assert_eq!(components[1].images().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(components[1].num_markers(), 2);
        assert_eq!(components[2].images().collect::<Vec<_>>(), vec!["e", "f"]);
    }
}
