//! Collaborator contracts consumed by the job variants.
//!
//! The descriptor computation, the match kernel, and the feature store are
//! external services as far as the dispatcher is concerned; jobs talk to them
//! through the narrow traits below and never depend on a concrete
//! implementation.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parallax_core::types::{ImageId, ImagePair};

use crate::gpu::GpuContext;

/// Descriptors computed for one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFeatures {
    pub width: u32,
    pub height: u32,
    /// One fixed-length descriptor per detected feature.
    pub descriptors: Vec<Vec<f32>>,
}

/// One feature correspondence between two images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correspondence {
    pub idx1: u32,
    pub idx2: u32,
}

/// Matches recorded for one image pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairMatches {
    pub pair: ImagePair,
    pub correspondences: Vec<Correspondence>,
    /// Whether these correspondences passed geometric verification.
    pub verified: bool,
    pub recorded_at: DateTime<Utc>,
}

/// An image known to the feature store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageEntry {
    pub id: ImageId,
    pub name: String,
    /// Prior location, when known (e.g. from GPS), used by spatial matching.
    pub location: Option<[f64; 3]>,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to decode image {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("store record is corrupt: {0}")]
    CorruptRecord(String),

    #[error("no features stored for image {0}")]
    MissingFeatures(ImageId),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Computes per-image descriptors.
///
/// `gpu` is `Some` only when the worker runs on a context-owning thread; the
/// backend may then use the context for acceleration.
pub trait DescriptorBackend: Send {
    fn extract(
        &self,
        path: &Path,
        gpu: Option<&GpuContext>,
    ) -> Result<ImageFeatures, BackendError>;
}

/// Matches descriptors between two images and verifies candidate matches.
pub trait MatchKernel: Send {
    fn match_features(
        &self,
        a: &ImageFeatures,
        b: &ImageFeatures,
        gpu: Option<&GpuContext>,
    ) -> Result<Vec<Correspondence>, BackendError>;

    /// Geometric verification: filter `candidates` down to the
    /// correspondences consistent with a plausible camera geometry.
    fn verify(
        &self,
        a: &ImageFeatures,
        b: &ImageFeatures,
        candidates: Vec<Correspondence>,
    ) -> Result<Vec<Correspondence>, BackendError>;
}

/// Persistence for registered images, their features, and their matches.
///
/// At most one worker is active per invocation against a store; the store
/// defines no concurrency discipline of its own.
pub trait FeatureStore: Send {
    /// Register an image by name, or return its existing id.
    fn register_image(
        &mut self,
        name: &str,
        location: Option<[f64; 3]>,
    ) -> Result<ImageId, BackendError>;

    fn images(&self) -> Result<Vec<ImageEntry>, BackendError>;

    fn image_id(&self, name: &str) -> Result<Option<ImageId>, BackendError>;

    fn write_features(&mut self, id: ImageId, features: &ImageFeatures)
        -> Result<(), BackendError>;

    fn features(&self, id: ImageId) -> Result<ImageFeatures, BackendError>;

    fn has_features(&self, id: ImageId) -> Result<bool, BackendError>;

    fn write_matches(&mut self, matches: &PairMatches) -> Result<(), BackendError>;

    /// All pairs that already have recorded matches, for transitive expansion.
    fn matched_pairs(&self) -> Result<Vec<ImagePair>, BackendError>;
}
