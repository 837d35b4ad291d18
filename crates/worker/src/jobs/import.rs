//! Feature import: ingest externally computed descriptors, no pairing.

use std::fs;
use std::path::PathBuf;

use crate::backend::{BackendError, FeatureStore, ImageFeatures};
use crate::gpu::GpuContext;
use crate::lifecycle::{Job, JobError};

pub struct FeatureImportJob {
    /// Image names of the resolved input set.
    images: Vec<String>,
    /// Directory holding one `<image name>.json` descriptor file per image.
    import_path: PathBuf,
    store: Box<dyn FeatureStore>,
}

impl FeatureImportJob {
    pub fn new(images: Vec<String>, import_path: PathBuf, store: Box<dyn FeatureStore>) -> Self {
        Self {
            images,
            import_path,
            store,
        }
    }
}

impl Job for FeatureImportJob {
    fn label(&self) -> &'static str {
        "feature-importer"
    }

    fn run(&mut self, _gpu: Option<&GpuContext>) -> Result<(), JobError> {
        let mut imported = 0usize;
        let mut skipped = 0usize;

        for name in &self.images {
            let path = self.import_path.join(format!("{name}.json"));
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!(image = %name, "No descriptor file to import");
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(JobError::Backend(e.into())),
            };
            let features: ImageFeatures = serde_json::from_slice(&bytes)
                .map_err(|e| JobError::Backend(BackendError::CorruptRecord(e.to_string())))?;

            let id = self.store.register_image(name, None)?;
            self.store.write_features(id, &features)?;
            imported += 1;
        }

        tracing::info!(imported, skipped, "Feature import finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FeatureStore as _;
    use crate::sidecar::MemoryStore;
    use assert_matches::assert_matches;

    fn write_descriptors(dir: &std::path::Path, name: &str, contents: &str) {
        fs::write(dir.join(format!("{name}.json")), contents).unwrap();
    }

    #[test]
    fn import_reads_descriptor_files_and_registers_images() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptors(
            dir.path(),
            "a.png",
            r#"{"width":2,"height":2,"descriptors":[[1.0,0.0]]}"#,
        );

        let mut job = FeatureImportJob::new(
            vec!["a.png".into()],
            dir.path().to_path_buf(),
            Box::new(MemoryStore::new()),
        );
        job.run(None).unwrap();

        let images = job.store.images().unwrap();
        assert_eq!(images.len(), 1);
        let features = job.store.features(images[0].id).unwrap();
        assert_eq!(features.descriptors, vec![vec![1.0, 0.0]]);
    }

    #[test]
    fn missing_descriptor_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = FeatureImportJob::new(
            vec!["a.png".into()],
            dir.path().to_path_buf(),
            Box::new(MemoryStore::new()),
        );
        job.run(None).unwrap();
        assert!(job.store.images().unwrap().is_empty());
    }

    #[test]
    fn corrupt_descriptor_files_fail_the_job() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptors(dir.path(), "a.png", "not json");
        let mut job = FeatureImportJob::new(
            vec!["a.png".into()],
            dir.path().to_path_buf(),
            Box::new(MemoryStore::new()),
        );
        assert_matches!(
            job.run(None),
            Err(JobError::Backend(BackendError::CorruptRecord(_)))
        );
    }
}
