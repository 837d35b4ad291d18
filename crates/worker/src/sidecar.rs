//! Default [`FeatureStore`] implementations.
//!
//! [`SidecarStore`] keeps everything as JSON records under the store path:
//! an `images.json` registry, one `features/<id>.json` file per image, and an
//! append-only `matches.jsonl`. [`MemoryStore`] backs unit tests.
//!
//! The heavyweight storage layer is an external concern; these exist so the
//! pipeline runs end-to-end and stays observable in tests.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use parallax_core::types::{ImageId, ImagePair};

use crate::backend::{BackendError, FeatureStore, ImageEntry, ImageFeatures, PairMatches};

const IMAGES_FILE: &str = "images.json";
const MATCHES_FILE: &str = "matches.jsonl";
const FEATURES_DIR: &str = "features";

// ---------------------------------------------------------------------------
// Sidecar-file store
// ---------------------------------------------------------------------------

/// File-backed store rooted at the configured store path.
pub struct SidecarStore {
    root: PathBuf,
    images: Vec<ImageEntry>,
}

impl SidecarStore {
    /// Open (or initialise) a store at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let root = root.into();
        fs::create_dir_all(root.join(FEATURES_DIR))?;

        let images = match fs::read(root.join(IMAGES_FILE)) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| BackendError::CorruptRecord(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self { root, images })
    }

    fn persist_images(&self) -> Result<(), BackendError> {
        let bytes = serde_json::to_vec_pretty(&self.images)
            .map_err(|e| BackendError::CorruptRecord(e.to_string()))?;
        fs::write(self.root.join(IMAGES_FILE), bytes)?;
        Ok(())
    }

    fn features_path(&self, id: ImageId) -> PathBuf {
        self.root.join(FEATURES_DIR).join(format!("{id}.json"))
    }
}

impl FeatureStore for SidecarStore {
    fn register_image(
        &mut self,
        name: &str,
        location: Option<[f64; 3]>,
    ) -> Result<ImageId, BackendError> {
        if let Some(entry) = self.images.iter().find(|e| e.name == name) {
            return Ok(entry.id);
        }
        let id = self.images.len() as ImageId + 1;
        self.images.push(ImageEntry {
            id,
            name: name.to_string(),
            location,
        });
        self.persist_images()?;
        Ok(id)
    }

    fn images(&self) -> Result<Vec<ImageEntry>, BackendError> {
        Ok(self.images.clone())
    }

    fn image_id(&self, name: &str) -> Result<Option<ImageId>, BackendError> {
        Ok(self.images.iter().find(|e| e.name == name).map(|e| e.id))
    }

    fn write_features(
        &mut self,
        id: ImageId,
        features: &ImageFeatures,
    ) -> Result<(), BackendError> {
        let bytes = serde_json::to_vec(features)
            .map_err(|e| BackendError::CorruptRecord(e.to_string()))?;
        fs::write(self.features_path(id), bytes)?;
        Ok(())
    }

    fn features(&self, id: ImageId) -> Result<ImageFeatures, BackendError> {
        let bytes = match fs::read(self.features_path(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackendError::MissingFeatures(id))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| BackendError::CorruptRecord(e.to_string()))
    }

    fn has_features(&self, id: ImageId) -> Result<bool, BackendError> {
        Ok(self.features_path(id).exists())
    }

    fn write_matches(&mut self, matches: &PairMatches) -> Result<(), BackendError> {
        let line = serde_json::to_string(matches)
            .map_err(|e| BackendError::CorruptRecord(e.to_string()))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(MATCHES_FILE))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn matched_pairs(&self) -> Result<Vec<ImagePair>, BackendError> {
        let contents = match fs::read_to_string(self.root.join(MATCHES_FILE)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str::<PairMatches>(line)
                    .map(|m| m.pair)
                    .map_err(|e| BackendError::CorruptRecord(e.to_string()))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-memory store for unit tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    images: Vec<ImageEntry>,
    features: HashMap<ImageId, ImageFeatures>,
    matches: Vec<PairMatches>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All match records written so far, in write order.
    pub fn match_records(&self) -> &[PairMatches] {
        &self.matches
    }
}

impl FeatureStore for MemoryStore {
    fn register_image(
        &mut self,
        name: &str,
        location: Option<[f64; 3]>,
    ) -> Result<ImageId, BackendError> {
        if let Some(entry) = self.images.iter().find(|e| e.name == name) {
            return Ok(entry.id);
        }
        let id = self.images.len() as ImageId + 1;
        self.images.push(ImageEntry {
            id,
            name: name.to_string(),
            location,
        });
        Ok(id)
    }

    fn images(&self) -> Result<Vec<ImageEntry>, BackendError> {
        Ok(self.images.clone())
    }

    fn image_id(&self, name: &str) -> Result<Option<ImageId>, BackendError> {
        Ok(self.images.iter().find(|e| e.name == name).map(|e| e.id))
    }

    fn write_features(
        &mut self,
        id: ImageId,
        features: &ImageFeatures,
    ) -> Result<(), BackendError> {
        self.features.insert(id, features.clone());
        Ok(())
    }

    fn features(&self, id: ImageId) -> Result<ImageFeatures, BackendError> {
        self.features
            .get(&id)
            .cloned()
            .ok_or(BackendError::MissingFeatures(id))
    }

    fn has_features(&self, id: ImageId) -> Result<bool, BackendError> {
        Ok(self.features.contains_key(&id))
    }

    fn write_matches(&mut self, matches: &PairMatches) -> Result<(), BackendError> {
        self.matches.push(matches.clone());
        Ok(())
    }

    fn matched_pairs(&self) -> Result<Vec<ImagePair>, BackendError> {
        Ok(self.matches.iter().map(|m| m.pair).collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;

    use crate::backend::Correspondence;

    fn sample_features() -> ImageFeatures {
        ImageFeatures {
            width: 4,
            height: 4,
            descriptors: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        }
    }

    #[test]
    fn registration_assigns_dense_ids_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SidecarStore::open(dir.path()).unwrap();
        let a = store.register_image("a.png", None).unwrap();
        let b = store.register_image("b.png", None).unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(store.register_image("a.png", None).unwrap(), 1);
        assert_eq!(store.images().unwrap().len(), 2);
    }

    #[test]
    fn registry_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = SidecarStore::open(dir.path()).unwrap();
            store.register_image("a.png", Some([1.0, 2.0, 3.0])).unwrap();
        }
        let store = SidecarStore::open(dir.path()).unwrap();
        let images = store.images().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].location, Some([1.0, 2.0, 3.0]));
        assert_eq!(store.image_id("a.png").unwrap(), Some(1));
    }

    #[test]
    fn features_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SidecarStore::open(dir.path()).unwrap();
        let id = store.register_image("a.png", None).unwrap();
        assert!(!store.has_features(id).unwrap());

        store.write_features(id, &sample_features()).unwrap();
        assert!(store.has_features(id).unwrap());
        let features = store.features(id).unwrap();
        assert_eq!(features.descriptors.len(), 2);
    }

    #[test]
    fn missing_features_is_a_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore::open(dir.path()).unwrap();
        assert_matches!(store.features(42), Err(BackendError::MissingFeatures(42)));
    }

    #[test]
    fn matches_append_and_list_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SidecarStore::open(dir.path()).unwrap();
        assert!(store.matched_pairs().unwrap().is_empty());

        for pair in [(1, 2), (2, 3)] {
            store
                .write_matches(&PairMatches {
                    pair,
                    correspondences: vec![Correspondence { idx1: 0, idx2: 1 }],
                    verified: true,
                    recorded_at: Utc::now(),
                })
                .unwrap();
        }
        assert_eq!(store.matched_pairs().unwrap(), vec![(1, 2), (2, 3)]);
    }

    #[test]
    fn memory_store_mirrors_the_contract() {
        let mut store = MemoryStore::new();
        let id = store.register_image("a.png", None).unwrap();
        store.write_features(id, &sample_features()).unwrap();
        assert!(store.has_features(id).unwrap());
        assert_eq!(store.image_id("a.png").unwrap(), Some(id));
        assert_matches!(store.features(9), Err(BackendError::MissingFeatures(9)));
    }
}
