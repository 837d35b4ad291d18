//! Per-entry-point option objects: the configuration surface.
//!
//! Built by the CLI (or an embedding application) and consumed by the
//! dispatcher. Every field here is either validated by the dispatcher before
//! a worker exists, or passed through to a collaborator untouched.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use parallax_core::CoreError;

/// Default camera model for newly registered images.
pub const DEFAULT_CAMERA_MODEL: &str = "SIMPLE_RADIAL";

/// Kernel knobs shared by every matching entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingOptions {
    /// Store location (registry, features, matches).
    pub store_path: PathBuf,
    /// Request GPU acceleration for matching.
    pub use_gpu: bool,
    /// Nearest/second-nearest descriptor distance ratio threshold.
    pub max_ratio: f32,
    /// Maximum descriptor distance for a correspondence to count.
    pub max_distance: f32,
}

impl MatchingOptions {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            use_gpu: true,
            max_ratio: 0.8,
            max_distance: 0.7,
        }
    }
}

/// Options for the feature extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOptions {
    pub store_path: PathBuf,
    /// Image source root; scanned recursively unless an image list is given.
    pub image_path: PathBuf,
    /// Explicit image list file. Takes precedence over the directory scan.
    pub image_list_path: Option<PathBuf>,
    pub camera_model: String,
    /// Comma-separated parameters; empty defers estimation.
    pub camera_params: String,
    pub use_gpu: bool,
}

impl ExtractionOptions {
    pub fn new(store_path: impl Into<PathBuf>, image_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            image_path: image_path.into(),
            image_list_path: None,
            camera_model: DEFAULT_CAMERA_MODEL.to_string(),
            camera_params: String::new(),
            use_gpu: true,
        }
    }
}

/// Options for the feature importer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
    pub store_path: PathBuf,
    pub image_path: PathBuf,
    /// Directory of externally computed descriptor files.
    pub import_path: PathBuf,
    pub image_list_path: Option<PathBuf>,
    pub camera_model: String,
    pub camera_params: String,
}

impl ImportOptions {
    pub fn new(
        store_path: impl Into<PathBuf>,
        image_path: impl Into<PathBuf>,
        import_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store_path: store_path.into(),
            image_path: image_path.into(),
            import_path: import_path.into(),
            image_list_path: None,
            camera_model: DEFAULT_CAMERA_MODEL.to_string(),
            camera_params: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExhaustiveMatchingOptions {
    pub matching: MatchingOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequentialMatchingOptions {
    pub matching: MatchingOptions,
    /// Window of order-adjacent images each image is matched against.
    pub overlap: usize,
    pub loop_detection: bool,
    /// Every `loop_detection_period`-th image is re-checked against earlier
    /// images when loop detection is on.
    pub loop_detection_period: usize,
    /// How many earlier images are sampled for each re-check.
    pub loop_detection_num_images: usize,
}

impl SequentialMatchingOptions {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            matching: MatchingOptions::new(store_path),
            overlap: 10,
            loop_detection: false,
            loop_detection_period: 10,
            loop_detection_num_images: 50,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.overlap == 0 {
            return Err(CoreError::InvalidOption {
                name: "overlap",
                reason: "must be at least 1".into(),
            });
        }
        if self.loop_detection && self.loop_detection_period == 0 {
            return Err(CoreError::InvalidOption {
                name: "loop_detection_period",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialMatchingOptions {
    pub matching: MatchingOptions,
    pub max_num_neighbors: usize,
    /// Same unit as the stored image locations.
    pub max_distance: f64,
}

impl SpatialMatchingOptions {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            matching: MatchingOptions::new(store_path),
            max_num_neighbors: 50,
            max_distance: 100.0,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_num_neighbors == 0 {
            return Err(CoreError::InvalidOption {
                name: "max_num_neighbors",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitiveMatchingOptions {
    pub matching: MatchingOptions,
    /// Rounds of match-graph expansion.
    pub num_iterations: usize,
}

impl TransitiveMatchingOptions {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            matching: MatchingOptions::new(store_path),
            num_iterations: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabTreeMatchingOptions {
    pub matching: MatchingOptions,
    /// Visually similar candidates retrieved per image.
    pub num_nearest: usize,
}

impl VocabTreeMatchingOptions {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            matching: MatchingOptions::new(store_path),
            num_nearest: 100,
        }
    }
}

/// Options for the generic matches importer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchesImportOptions {
    pub matching: MatchingOptions,
    pub match_list_path: PathBuf,
    /// One of `pairs`, `raw`, `inliers`; anything else is a configuration
    /// error checked before all other work.
    pub match_type: String,
}

impl MatchesImportOptions {
    pub fn new(store_path: impl Into<PathBuf>, match_list_path: impl Into<PathBuf>) -> Self {
        Self {
            matching: MatchingOptions::new(store_path),
            match_list_path: match_list_path.into(),
            match_type: "pairs".to_string(),
        }
    }
}

/// The closed set of importer variants selected by `match_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Explicit pair list; matching and verification run here.
    Pairs,
    /// Explicit correspondences; geometric verification runs here.
    Raw,
    /// Explicit correspondences already verified elsewhere.
    Inliers,
}

impl FromStr for MatchType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pairs" => Ok(Self::Pairs),
            "raw" => Ok(Self::Raw),
            "inliers" => Ok(Self::Inliers),
            other => Err(CoreError::InvalidMatchType(other.to_string())),
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pairs => "pairs",
            Self::Raw => "raw",
            Self::Inliers => "inliers",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn match_type_parses_the_three_variants() {
        assert_eq!("pairs".parse::<MatchType>().unwrap(), MatchType::Pairs);
        assert_eq!("raw".parse::<MatchType>().unwrap(), MatchType::Raw);
        assert_eq!("inliers".parse::<MatchType>().unwrap(), MatchType::Inliers);
    }

    #[test]
    fn match_type_rejects_anything_else() {
        assert_matches!(
            "geometric".parse::<MatchType>(),
            Err(CoreError::InvalidMatchType(_))
        );
        assert_matches!("".parse::<MatchType>(), Err(CoreError::InvalidMatchType(_)));
        // case sensitive, like the rest of the configuration surface
        assert_matches!(
            "Pairs".parse::<MatchType>(),
            Err(CoreError::InvalidMatchType(_))
        );
    }

    #[test]
    fn sequential_overlap_zero_is_rejected() {
        let mut options = SequentialMatchingOptions::new("/tmp/store");
        options.overlap = 0;
        assert_matches!(options.validate(), Err(CoreError::InvalidOption { .. }));
    }

    #[test]
    fn spatial_zero_neighbors_is_rejected() {
        let mut options = SpatialMatchingOptions::new("/tmp/store");
        options.max_num_neighbors = 0;
        assert_matches!(options.validate(), Err(CoreError::InvalidOption { .. }));
    }
}
