//! Feature extraction: per-image descriptors for a resolved image set.

use std::path::PathBuf;

use crate::backend::{BackendError, DescriptorBackend, FeatureStore};
use crate::gpu::GpuContext;
use crate::lifecycle::{Job, JobError};

/// One image of the resolved input set.
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    /// Name relative to the image source root; also the store registry key.
    pub name: String,
    pub path: PathBuf,
}

pub struct FeatureExtractionJob {
    images: Vec<ResolvedImage>,
    backend: Box<dyn DescriptorBackend>,
    store: Box<dyn FeatureStore>,
}

impl FeatureExtractionJob {
    pub fn new(
        images: Vec<ResolvedImage>,
        backend: Box<dyn DescriptorBackend>,
        store: Box<dyn FeatureStore>,
    ) -> Self {
        Self {
            images,
            backend,
            store,
        }
    }
}

impl Job for FeatureExtractionJob {
    fn label(&self) -> &'static str {
        "feature-extractor"
    }

    fn run(&mut self, gpu: Option<&GpuContext>) -> Result<(), JobError> {
        let mut extracted = 0usize;
        let mut skipped = 0usize;

        for image in &self.images {
            let features = match self.backend.extract(&image.path, gpu) {
                Ok(features) => features,
                Err(BackendError::Decode { path, reason }) => {
                    tracing::warn!(path, reason, "Skipping undecodable image");
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let id = self.store.register_image(&image.name, None)?;
            self.store.write_features(id, &features)?;
            tracing::debug!(
                image = %image.name,
                features = features.descriptors.len(),
                "Features extracted",
            );
            extracted += 1;
        }

        tracing::info!(extracted, skipped, "Feature extraction finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ImageFeatures;
    use crate::kernel::GridDescriptorBackend;
    use crate::sidecar::MemoryStore;
    use std::path::Path;

    struct FixedBackend;

    impl DescriptorBackend for FixedBackend {
        fn extract(
            &self,
            _path: &Path,
            _gpu: Option<&GpuContext>,
        ) -> Result<ImageFeatures, BackendError> {
            Ok(ImageFeatures {
                width: 2,
                height: 2,
                descriptors: vec![vec![1.0]],
            })
        }
    }

    #[test]
    fn extraction_registers_and_stores_every_image() {
        let store = MemoryStore::new();
        let images = vec![
            ResolvedImage {
                name: "a.png".into(),
                path: "/img/a.png".into(),
            },
            ResolvedImage {
                name: "b.png".into(),
                path: "/img/b.png".into(),
            },
        ];
        let mut job =
            FeatureExtractionJob::new(images, Box::new(FixedBackend), Box::new(store));
        job.run(None).unwrap();

        use crate::backend::FeatureStore as _;
        let images = job.store.images().unwrap();
        assert_eq!(images.len(), 2);
        assert!(job.store.has_features(images[0].id).unwrap());
    }

    #[test]
    fn undecodable_images_are_skipped_not_fatal() {
        let store = MemoryStore::new();
        let images = vec![ResolvedImage {
            name: "missing.png".into(),
            path: "/nonexistent/missing.png".into(),
        }];
        let mut job = FeatureExtractionJob::new(
            images,
            Box::new(GridDescriptorBackend::default()),
            Box::new(store),
        );
        job.run(None).unwrap();

        use crate::backend::FeatureStore as _;
        assert!(job.store.images().unwrap().is_empty());
    }
}
