use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating a [`SfmConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error(transparent)]
    Parse(#[from] serde_json::Error),

    /// A configuration value is outside its accepted range.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the offending option.
        field: &'static str,
        /// Human readable description of the accepted range.
        reason: String,
    },
}

/// Method used to estimate the similarity that aligns a reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlignMethod {
    /// Direct 3D-3D fit between camera centers / GCPs and their measured positions.
    #[serde(rename = "naive")]
    Naive,
    /// Ground plane from a camera orientation prior, then a 2D similarity to GPS.
    #[default]
    #[serde(rename = "orientation_prior")]
    OrientationPrior,
    /// Uniform scale from the known physical marker size.
    #[serde(rename = "marker-scale")]
    MarkerScale,
    /// Rotation and translation from the orientation prior, scale from the markers.
    #[serde(rename = "orientation_prior_tag_scaling")]
    OrientationPriorMarkerScale,
}

/// Assumed camera orientation for [`AlignMethod::OrientationPrior`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationPrior {
    /// The horizon is horizontal on the images.
    NoRoll,
    /// The cameras look towards the horizon.
    #[default]
    Horizontal,
    /// The cameras look down towards the ground.
    Vertical,
}

/// Strictness of the marker co-visibility candidate pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerPruning {
    /// Markers are not used to prune candidate pairs.
    #[default]
    None,
    /// Only images that observe a common marker are paired.
    Strict,
    /// As strict, plus images without markers pair with every image.
    Medium,
    /// As medium, plus all connected components of the marker graph are merged.
    Loose,
}

/// Aggregation of the observed marker edge lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleAggregation {
    /// Median edge length (L1 estimate).
    #[default]
    Median,
    /// Mean edge length (L2 estimate).
    Mean,
}

/// Every recognized option of the pair selection, track building and alignment stages.
///
/// Partial JSON documents are accepted, missing options take their default.
///
/// ```
/// use kornia_sfm::{AlignMethod, SfmConfig};
///
/// let config = SfmConfig::from_json(r#"{"align_method": "naive", "min_track_length": 3}"#).unwrap();
/// assert_eq!(config.align_method, AlignMethod::Naive);
/// assert_eq!(config.min_track_length, 3);
/// assert_eq!(config.marker_size, 0.1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SfmConfig {
    /// Alignment method.
    pub align_method: AlignMethod,
    /// Camera orientation prior used by the orientation prior alignment.
    pub align_orientation_prior: OrientationPrior,
    /// Physical edge length of the fiducial markers.
    pub marker_size: f64,
    /// Aggregation used for the marker scale.
    pub marker_scale_aggregation: ScaleAggregation,
    /// Minimum number of observations of a valid track.
    pub min_track_length: usize,
    /// Maximum number of GPS neighbours per image, 0 for no limit.
    pub matching_gps_neighbors: usize,
    /// Maximum GPS distance between paired images in metres, 0 for no limit.
    pub matching_gps_distance: f64,
    /// Number of capture time neighbours per image, 0 disables.
    pub matching_time_neighbors: usize,
    /// Number of sequence order neighbours per image, 0 disables.
    pub matching_order_neighbors: usize,
    /// Marker co-visibility pruning of the candidate pairs.
    pub prune_with_tags: MarkerPruning,
    /// Prune the candidate pairs with GPS, time and order metadata.
    pub prune_with_metadata: bool,
    /// Fraction of the marker ids kept for marker matching, at least one percent.
    pub marker_keep_ratio: f64,
    /// Number of matching workers.
    pub processes: usize,
    /// Bearing threshold used when triangulating ground control points.
    pub gcp_reprojection_threshold: f64,
    /// Minimum ray angle in degrees used when triangulating ground control points.
    pub gcp_min_ray_angle_degrees: f64,
}

impl Default for SfmConfig {
    fn default() -> Self {
        Self {
            align_method: AlignMethod::OrientationPrior,
            align_orientation_prior: OrientationPrior::Horizontal,
            marker_size: 0.1,
            marker_scale_aggregation: ScaleAggregation::Median,
            min_track_length: 2,
            matching_gps_neighbors: 0,
            matching_gps_distance: 150.0,
            matching_time_neighbors: 0,
            matching_order_neighbors: 0,
            prune_with_tags: MarkerPruning::None,
            prune_with_metadata: true,
            marker_keep_ratio: 1.0,
            processes: 1,
            gcp_reprojection_threshold: 0.004,
            gcp_min_ray_angle_degrees: 2.0,
        }
    }
}

impl SfmConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every option is inside its accepted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.marker_size.is_finite() && self.marker_size > 0.0) {
            return Err(invalid("marker_size", "must be finite and positive"));
        }
        if self.min_track_length < 1 {
            return Err(invalid("min_track_length", "must be at least 1"));
        }
        if !(self.matching_gps_distance.is_finite() && self.matching_gps_distance >= 0.0) {
            return Err(invalid(
                "matching_gps_distance",
                "must be finite and non negative",
            ));
        }
        // the ratio is used as a whole percent
        if !(0.01..=1.0).contains(&self.marker_keep_ratio) {
            return Err(invalid("marker_keep_ratio", "must be in [0.01, 1]"));
        }
        if self.processes < 1 {
            return Err(invalid("processes", "must be at least 1"));
        }
        if !(self.gcp_reprojection_threshold.is_finite() && self.gcp_reprojection_threshold > 0.0)
        {
            return Err(invalid(
                "gcp_reprojection_threshold",
                "must be finite and positive",
            ));
        }
        if !(self.gcp_min_ray_angle_degrees.is_finite() && self.gcp_min_ray_angle_degrees >= 0.0) {
            return Err(invalid(
                "gcp_min_ray_angle_degrees",
                "must be finite and non negative",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}
