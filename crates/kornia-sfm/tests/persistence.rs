use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use approx::assert_relative_eq;
use glam::{DMat3, DVec3};
use kornia_sfm::{
    align::{MarkerScale, Similarity},
    config::ConfigError,
    AlignMethod, MarkerPruning, SfmConfig,
};

#[test]
fn similarity_json_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("similarity.json");

    let similarity = Similarity::new(
        1.5,
        DMat3::from_rotation_z(0.3) * DMat3::from_rotation_y(-0.2),
        DVec3::new(10.0, -4.0, 0.25),
    );
    similarity.write_json(BufWriter::new(File::create(&path)?))?;

    let loaded = Similarity::read_json(BufReader::new(File::open(&path)?))?;
    assert_relative_eq!(loaded.scale, similarity.scale);
    let x = DVec3::new(0.5, 2.0, -1.0);
    assert!((loaded.transform_point(x) - similarity.transform_point(x)).length() < 1e-12);

    // rotation is stored row by row
    let document: serde_json::Value = serde_json::from_reader(File::open(&path)?)?;
    let row = similarity.rotation.row(0);
    assert_relative_eq!(document["rotation"][0][1].as_f64().unwrap_or_default(), row.y);
    Ok(())
}

#[test]
fn similarity_json_rejects_truncated_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, r#"{{"scale": 1.0, "rotation": [[1, 0, 0]]"#)?;
    assert!(Similarity::read_json(File::open(file.path())?).is_err());
    Ok(())
}

#[test]
fn marker_scale_priors_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("scale_priors.txt");

    let scale = MarkerScale {
        median: 0.2,
        mean: 0.19,
        median_sigma: 0.01,
        mean_sigma: 0.02,
        num_edges: 12,
    };
    scale.write_priors(File::create(&path)?)?;

    let contents = std::fs::read_to_string(&path)?;
    let values = contents
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(values, vec![0.2, 0.19, 0.01, 0.02]);
    Ok(())
}

#[test]
fn config_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"{{
            "align_method": "orientation_prior_tag_scaling",
            "prune_with_tags": "medium",
            "matching_order_neighbors": 5,
            "processes": 4
        }}"#
    )?;

    let config = SfmConfig::from_json(&std::fs::read_to_string(file.path())?)?;
    assert_eq!(config.align_method, AlignMethod::OrientationPriorMarkerScale);
    assert_eq!(config.prune_with_tags, MarkerPruning::Medium);
    assert_eq!(config.matching_order_neighbors, 5);
    assert_eq!(config.processes, 4);
    assert_eq!(config.min_track_length, SfmConfig::default().min_track_length);
    Ok(())
}

#[test]
fn config_from_file_out_of_range() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, r#"{{"marker_keep_ratio": 1.5}}"#)?;

    let res = SfmConfig::from_json(&std::fs::read_to_string(file.path())?);
    assert!(matches!(
        res,
        Err(ConfigError::InvalidValue {
            field: "marker_keep_ratio",
            ..
        })
    ));
    Ok(())
}
