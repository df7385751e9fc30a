use std::collections::{BTreeSet, HashMap};
use std::f64::consts::FRAC_PI_2;

use approx::assert_relative_eq;
use glam::{DMat3, DVec3};
use kornia_sfm::{
    align::{align_reconstruction, Estimator, MarkerScale, Similarity},
    camera::CameraModel,
    geo::{Lla, TopocentricConverter},
    markers::{marker_ignore_list, match_marker_features, MarkerFeatures},
    matching::match_pairs,
    pairs::{match_candidates_all, per_image, select_candidate_pairs, ImageMetadata},
    reconstruction::{Point, Pose, Reconstruction, Shot, ShotMetadata},
    tracks::{create_marker_graph, ImageFeatures, TrackBuilder},
    ImageId, MarkerId, MarkerPruning, SfmConfig,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

const NUM_IMAGES: usize = 5;
const NUM_POINTS: usize = 40;
const MARKER: MarkerId = 17;
const LONELY_MARKER: MarkerId = 99;

struct Scene {
    images: Vec<ImageId>,
    origins: Vec<DVec3>,
    points: Vec<DVec3>,
    marker: [DVec3; 4],
    truth: Similarity,
}

impl Scene {
    fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(3);
        let points = (0..NUM_POINTS)
            .map(|_| {
                DVec3::new(
                    rng.random_range(-2.0..6.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(5.0..10.0),
                )
            })
            .collect();
        // cameras look along +z with y pointing down, the ground is y = 0.5
        let origins = (0..NUM_IMAGES)
            .map(|i| DVec3::new(i as f64, 0.0, 0.5 * (i % 2) as f64))
            .collect();
        let marker = [
            DVec3::new(1.0, 0.5, 6.0),
            DVec3::new(1.5, 0.5, 6.0),
            DVec3::new(1.5, 0.5, 6.5),
            DVec3::new(1.0, 0.5, 6.5),
        ];
        // maps the camera frame to east-north-up
        let truth = Similarity::new(
            2.0,
            DMat3::from_rotation_z(0.6) * DMat3::from_rotation_x(-FRAC_PI_2),
            DVec3::new(30.0, -12.0, 4.0),
        );
        Self {
            images: (0..NUM_IMAGES).map(|i| format!("im{i}")).collect(),
            origins,
            points,
            marker,
            truth,
        }
    }

    fn pose(&self, i: usize) -> Pose {
        Pose::from_origin(DMat3::IDENTITY, self.origins[i])
    }

    fn project(&self, i: usize, point: DVec3) -> [f64; 2] {
        CameraModel::perspective(1.0)
            .project(self.pose(i).transform(point))
            .unwrap_or_default()
    }

    /// Feature `f` of image `i` observes point `(f + i) % NUM_POINTS`.
    fn features(&self) -> HashMap<ImageId, ImageFeatures> {
        (0..NUM_IMAGES)
            .map(|i| {
                let points = (0..NUM_POINTS)
                    .map(|f| self.project(i, self.points[(f + i) % NUM_POINTS]))
                    .collect();
                (
                    self.images[i].clone(),
                    ImageFeatures::new(points, vec![[200, 100, 50]; NUM_POINTS]),
                )
            })
            .collect()
    }

    fn marker_features(&self) -> HashMap<ImageId, MarkerFeatures> {
        (0..NUM_IMAGES)
            .map(|i| {
                let mut features = MarkerFeatures::default();
                if i == 0 {
                    features.push_detection(
                        LONELY_MARKER,
                        [[0.1, 0.1], [0.2, 0.1], [0.2, 0.2], [0.1, 0.2]],
                        [0, 0, 0],
                    );
                }
                features.push_detection(MARKER, self.marker.map(|c| self.project(i, c)), [255; 3]);
                (self.images[i].clone(), features)
            })
            .collect()
    }

    fn exifs(&self) -> HashMap<ImageId, ImageMetadata> {
        let converter = TopocentricConverter::new(Lla::new(47.37, 8.54, 400.0));
        (0..NUM_IMAGES)
            .map(|i| {
                let enu = self.truth.transform_point(self.origins[i]).to_array();
                (
                    self.images[i].clone(),
                    ImageMetadata {
                        gps: Some(converter.to_lla(&enu)),
                        capture_time: Some(i as f64),
                        orientation: 1,
                        camera: "cam".into(),
                    },
                )
            })
            .collect()
    }
}

fn image_index(image: &str) -> usize {
    image[2..].parse().unwrap_or_default()
}

#[test]
fn pipeline_from_matches_to_aligned_reconstruction() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();

    let scene = Scene::new();
    let config = SfmConfig {
        matching_gps_distance: 0.0,
        matching_order_neighbors: 2,
        prune_with_tags: MarkerPruning::Strict,
        processes: 2,
        ..Default::default()
    };
    config.validate()?;

    // markers are matched over every pair to build the marker graph
    let marker_features = scene.marker_features();
    let ignored = marker_ignore_list([MARKER, LONELY_MARKER], config.marker_keep_ratio);
    assert!(ignored.is_empty());
    let all_pairs = per_image(&scene.images, &match_candidates_all(&scene.images));
    let (marker_matches, _) = match_pairs(&all_pairs, config.processes, |a, b| {
        Some(match_marker_features(
            &marker_features[a],
            &marker_features[b],
            &ignored,
        ))
    })?;
    let marker_graph = create_marker_graph(&marker_matches, config.min_track_length);
    assert_eq!(marker_graph.markers().collect::<Vec<_>>(), vec![MARKER]);

    // candidate pairs: sequence neighbours sharing a marker
    let converter = TopocentricConverter::new(Lla::new(47.37, 8.54, 400.0));
    let candidates = select_candidate_pairs(
        &scene.images,
        &scene.exifs(),
        Some(&marker_graph),
        Some(&converter),
        &config,
    );
    assert_eq!(candidates.len(), 7);
    assert!(candidates
        .iter()
        .all(|p| image_index(p.first()).abs_diff(image_index(p.second())) <= 2));

    // feature matching, every candidate attempted
    let features = scene.features();
    let (matches, report) = match_pairs(&per_image(&scene.images, &candidates), config.processes, |a, b| {
        let (ia, ib) = (image_index(a), image_index(b));
        let m: Vec<(usize, usize)> = (0..NUM_POINTS)
            .map(|fa| {
                let point = (fa + ia) % NUM_POINTS;
                (fa, (point + NUM_POINTS - ib) % NUM_POINTS)
            })
            .collect();
        Some(m)
    })?;
    assert_eq!(report.attempted, 7);
    assert_eq!(report.empty, 0);

    let (graph, tracks_report) = TrackBuilder::new(config.min_track_length).build(
        &features,
        &matches,
        &marker_features,
        &marker_matches,
    )?;
    assert_eq!(tracks_report.tracks, NUM_POINTS);
    assert_eq!(tracks_report.marker_tracks, 4);
    assert_eq!(tracks_report.inconsistent_classes, 0);

    let (tracks, images) = graph.tracks_and_images();
    assert_eq!(images, scene.images);
    assert_eq!(tracks.len(), NUM_POINTS + 4);

    // coordinates of common tracks are index aligned
    let common = graph.common_tracks("im1", "im3");
    assert_eq!(common.tracks.len(), NUM_POINTS + 4);
    for (i, track) in common.tracks.iter().enumerate() {
        let o1 = graph.observation("im1", *track).ok_or("missing observation")?;
        let o3 = graph.observation("im3", *track).ok_or("missing observation")?;
        assert_eq!(common.p1[i], o1.feature);
        assert_eq!(common.p2[i], o3.feature);
        if !o1.is_marker() {
            assert_eq!((o1.feature_id + 1) % NUM_POINTS, (o3.feature_id + 3) % NUM_POINTS);
        }
    }

    let all_common = graph.all_common_tracks(&tracks, NUM_POINTS);
    assert_eq!(all_common.len(), NUM_IMAGES * (NUM_IMAGES - 1) / 2);
    assert!(graph.all_common_tracks(&tracks, NUM_POINTS + 5).is_empty());

    // reconstruction as the incremental loop would produce it
    let mut reconstruction = Reconstruction::default();
    reconstruction.add_camera("cam", CameraModel::perspective(1.0));
    for i in 0..NUM_IMAGES {
        reconstruction.add_shot(Shot {
            id: scene.images[i].clone(),
            camera: "cam".into(),
            pose: scene.pose(i),
            metadata: ShotMetadata {
                gps_position: Some(scene.truth.transform_point(scene.origins[i])),
                orientation: 1,
            },
        });
    }
    let mut truth_points = HashMap::new();
    for track in &tracks {
        let observations = graph.track_observations(*track).ok_or("missing track")?;
        let o = observations["im0"];
        let coordinates = match o.marker {
            Some(corner) => scene.marker[corner.corner_id as usize],
            None => scene.points[o.feature_id],
        };
        let mut point = Point::new(track.to_string(), coordinates);
        point.marker = o.marker;
        truth_points.insert(point.id.clone(), scene.truth.transform_point(coordinates));
        reconstruction.add_point(point);
    }

    let marker_scale = MarkerScale::estimate(&reconstruction, config.marker_size)?;
    assert_relative_eq!(marker_scale.median, 0.2, epsilon = 1e-9);

    let alignment = align_reconstruction(&mut reconstruction, &[], &config)?;
    assert_eq!(alignment.estimator, Estimator::OrientationPrior);
    assert_relative_eq!(alignment.similarity.scale, 2.0, epsilon = 1e-9);

    for (id, point) in &reconstruction.points {
        let expected = truth_points[id];
        assert!((point.coordinates - expected).length() < 1e-6, "point {id}");
    }
    for shot in reconstruction.shots.values() {
        let gps = shot.metadata.gps_position.ok_or("missing gps")?;
        assert!((shot.pose.origin() - gps).length() < 1e-6, "shot {}", shot.id);
    }

    let seen: BTreeSet<_> = reconstruction
        .points
        .values()
        .filter_map(|p| p.marker.map(|m| m.corner_id))
        .collect();
    assert_eq!(seen.len(), 4);
    Ok(())
}

#[test]
fn pipeline_sequential_and_parallel_matching_agree() -> Result<(), Box<dyn std::error::Error>> {
    let scene = Scene::new();
    let marker_features = scene.marker_features();
    let work = per_image(&scene.images, &match_candidates_all(&scene.images));
    let matcher = |a: &ImageId, b: &ImageId| {
        Some(match_marker_features(
            &marker_features[a],
            &marker_features[b],
            &Default::default(),
        ))
    };

    let (sequential, r1) = match_pairs(&work, 1, matcher)?;
    let (parallel, r2) = match_pairs(&work, 4, matcher)?;
    assert_eq!(sequential, parallel);
    assert_eq!(r1, r2);
    assert_eq!(r1.attempted, 10);
    Ok(())
}
