//! Default collaborator implementations: a luminance-grid descriptor backend
//! and a mutual-nearest-neighbour match kernel.
//!
//! These stand in for the heavyweight descriptor/verification kernels, which
//! are external services behind the [`crate::backend`] traits. They are real
//! enough to run the pipeline end-to-end on actual images.

use std::path::Path;

use parallax_core::pairing::VisualIndex;
use parallax_core::types::ImageId;

use crate::backend::{BackendError, Correspondence, DescriptorBackend, ImageFeatures, MatchKernel};
use crate::gpu::GpuContext;

/// Histogram bins per grid cell descriptor.
const DESCRIPTOR_BINS: usize = 8;

/// Default grid resolution (descriptors per image = grid²).
const DEFAULT_GRID: u32 = 8;

/// Default nearest/second-nearest ratio threshold.
const DEFAULT_MAX_RATIO: f32 = 0.8;

/// Default maximum descriptor distance for a correspondence to count.
const DEFAULT_MAX_DISTANCE: f32 = 0.7;

// ---------------------------------------------------------------------------
// Descriptor backend
// ---------------------------------------------------------------------------

/// Computes one normalised luminance histogram per grid cell.
#[derive(Debug, Clone)]
pub struct GridDescriptorBackend {
    pub grid: u32,
}

impl Default for GridDescriptorBackend {
    fn default() -> Self {
        Self { grid: DEFAULT_GRID }
    }
}

impl DescriptorBackend for GridDescriptorBackend {
    fn extract(
        &self,
        path: &Path,
        gpu: Option<&GpuContext>,
    ) -> Result<ImageFeatures, BackendError> {
        if let Some(ctx) = gpu {
            debug_assert!(ctx.owns_current_thread());
        }

        let img = image::open(path)
            .map_err(|e| BackendError::Decode {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
            .to_luma8();

        let (width, height) = img.dimensions();
        let grid = self.grid.min(width).min(height).max(1);

        let mut descriptors = Vec::with_capacity((grid * grid) as usize);
        for gy in 0..grid {
            for gx in 0..grid {
                let x0 = gx * width / grid;
                let x1 = (gx + 1) * width / grid;
                let y0 = gy * height / grid;
                let y1 = (gy + 1) * height / grid;

                let mut histogram = [0f32; DESCRIPTOR_BINS];
                let mut count = 0f32;
                for y in y0..y1 {
                    for x in x0..x1 {
                        let luma = img.get_pixel(x, y).0[0] as usize;
                        histogram[luma * DESCRIPTOR_BINS / 256] += 1.0;
                        count += 1.0;
                    }
                }
                if count > 0.0 {
                    for bin in histogram.iter_mut() {
                        *bin /= count;
                    }
                }
                descriptors.push(histogram.to_vec());
            }
        }

        Ok(ImageFeatures {
            width,
            height,
            descriptors,
        })
    }
}

// ---------------------------------------------------------------------------
// Match kernel
// ---------------------------------------------------------------------------

/// Mutual-nearest-neighbour matching with a ratio test; verification filters
/// correspondences by descriptor distance.
#[derive(Debug, Clone)]
pub struct MutualNearestKernel {
    pub max_ratio: f32,
    pub max_distance: f32,
}

impl Default for MutualNearestKernel {
    fn default() -> Self {
        Self {
            max_ratio: DEFAULT_MAX_RATIO,
            max_distance: DEFAULT_MAX_DISTANCE,
        }
    }
}

fn distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Index of the nearest descriptor in `haystack`, with its distance and the
/// second-nearest distance.
fn nearest(needle: &[f32], haystack: &[Vec<f32>]) -> Option<(usize, f32, f32)> {
    let mut best: Option<(usize, f32)> = None;
    let mut second = f32::INFINITY;
    for (j, candidate) in haystack.iter().enumerate() {
        let d = distance(needle, candidate);
        match best {
            Some((_, bd)) if d >= bd => second = second.min(d),
            _ => {
                if let Some((_, bd)) = best {
                    second = second.min(bd);
                }
                best = Some((j, d));
            }
        }
    }
    best.map(|(j, d)| (j, d, second))
}

impl MatchKernel for MutualNearestKernel {
    fn match_features(
        &self,
        a: &ImageFeatures,
        b: &ImageFeatures,
        gpu: Option<&GpuContext>,
    ) -> Result<Vec<Correspondence>, BackendError> {
        if let Some(ctx) = gpu {
            debug_assert!(ctx.owns_current_thread());
        }

        let mut out = Vec::new();
        for (i, da) in a.descriptors.iter().enumerate() {
            let Some((j, d, second)) = nearest(da, &b.descriptors) else {
                continue;
            };
            if d > self.max_distance {
                continue;
            }
            if second.is_finite() && d >= self.max_ratio * second {
                continue;
            }
            // mutual check
            let Some((back, _, _)) = nearest(&b.descriptors[j], &a.descriptors) else {
                continue;
            };
            if back != i {
                continue;
            }
            out.push(Correspondence {
                idx1: i as u32,
                idx2: j as u32,
            });
        }
        Ok(out)
    }

    fn verify(
        &self,
        a: &ImageFeatures,
        b: &ImageFeatures,
        candidates: Vec<Correspondence>,
    ) -> Result<Vec<Correspondence>, BackendError> {
        Ok(candidates
            .into_iter()
            .filter(|c| {
                let (Some(da), Some(db)) = (
                    a.descriptors.get(c.idx1 as usize),
                    b.descriptors.get(c.idx2 as usize),
                ) else {
                    return false;
                };
                distance(da, db) <= self.max_distance
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Visual index
// ---------------------------------------------------------------------------

/// Linear retrieval index over per-image mean descriptors.
///
/// Stands in for a precomputed vocabulary tree: `query` returns the images
/// whose mean descriptor is closest to the query's.
pub struct MeanDescriptorIndex {
    entries: Vec<(ImageId, Vec<f32>)>,
}

impl MeanDescriptorIndex {
    /// Build the index from every image with stored features.
    pub fn build(
        images: &[ImageId],
        features_of: &mut dyn FnMut(ImageId) -> Result<ImageFeatures, BackendError>,
    ) -> Result<Self, BackendError> {
        let mut entries = Vec::with_capacity(images.len());
        for id in images {
            let features = features_of(*id)?;
            if let Some(mean) = mean_descriptor(&features) {
                entries.push((*id, mean));
            }
        }
        Ok(Self { entries })
    }
}

fn mean_descriptor(features: &ImageFeatures) -> Option<Vec<f32>> {
    let first = features.descriptors.first()?;
    let mut mean = vec![0f32; first.len()];
    for descriptor in &features.descriptors {
        for (m, v) in mean.iter_mut().zip(descriptor) {
            *m += v;
        }
    }
    let n = features.descriptors.len() as f32;
    for m in mean.iter_mut() {
        *m /= n;
    }
    Some(mean)
}

impl VisualIndex for MeanDescriptorIndex {
    fn query(&self, image: ImageId, top_k: usize) -> Vec<ImageId> {
        let Some((_, query_mean)) = self.entries.iter().find(|(id, _)| *id == image) else {
            return Vec::new();
        };
        let mut scored: Vec<(f32, ImageId)> = self
            .entries
            .iter()
            .filter(|(id, _)| *id != image)
            .map(|(id, mean)| (distance(query_mean, mean), *id))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.into_iter().take(top_k).map(|(_, id)| id).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn features(descriptors: Vec<Vec<f32>>) -> ImageFeatures {
        ImageFeatures {
            width: 64,
            height: 64,
            descriptors,
        }
    }

    #[test]
    fn identical_descriptors_match_mutually() {
        let kernel = MutualNearestKernel::default();
        let a = features(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let b = features(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let matches = kernel.match_features(&a, &b, None).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0], Correspondence { idx1: 0, idx2: 0 });
        assert_eq!(matches[1], Correspondence { idx1: 1, idx2: 1 });
    }

    #[test]
    fn distant_descriptors_do_not_match() {
        let kernel = MutualNearestKernel::default();
        let a = features(vec![vec![1.0, 0.0]]);
        let b = features(vec![vec![0.0, 1.0]]);
        assert!(kernel.match_features(&a, &b, None).unwrap().is_empty());
    }

    #[test]
    fn ratio_test_rejects_ambiguous_matches() {
        let kernel = MutualNearestKernel {
            max_ratio: 0.8,
            max_distance: 10.0,
        };
        // two near-identical candidates in b: nearest/second ratio ~1
        let a = features(vec![vec![1.0, 0.0]]);
        let b = features(vec![vec![1.0, 0.01], vec![1.0, 0.011]]);
        assert!(kernel.match_features(&a, &b, None).unwrap().is_empty());
    }

    #[test]
    fn verify_drops_out_of_range_indices() {
        let kernel = MutualNearestKernel::default();
        let a = features(vec![vec![1.0, 0.0]]);
        let b = features(vec![vec![1.0, 0.0]]);
        let candidates = vec![
            Correspondence { idx1: 0, idx2: 0 },
            Correspondence { idx1: 5, idx2: 0 },
        ];
        let verified = kernel.verify(&a, &b, candidates).unwrap();
        assert_eq!(verified, vec![Correspondence { idx1: 0, idx2: 0 }]);
    }

    #[test]
    fn verify_drops_far_correspondences() {
        let kernel = MutualNearestKernel {
            max_ratio: 0.8,
            max_distance: 0.1,
        };
        let a = features(vec![vec![1.0, 0.0]]);
        let b = features(vec![vec![0.0, 1.0]]);
        let verified = kernel
            .verify(&a, &b, vec![Correspondence { idx1: 0, idx2: 0 }])
            .unwrap();
        assert!(verified.is_empty());
    }

    #[test]
    fn grid_backend_extracts_grid_squared_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        let img = image::GrayImage::from_fn(32, 32, |x, y| image::Luma([(x * 8 + y) as u8]));
        img.save(&path).unwrap();

        let backend = GridDescriptorBackend { grid: 4 };
        let features = backend.extract(&path, None).unwrap();
        assert_eq!(features.width, 32);
        assert_eq!(features.height, 32);
        assert_eq!(features.descriptors.len(), 16);
        // histograms are normalised
        let sum: f32 = features.descriptors[0].iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn grid_backend_reports_missing_file_as_decode_error() {
        let backend = GridDescriptorBackend::default();
        let err = backend
            .extract(Path::new("/nonexistent/img.png"), None)
            .unwrap_err();
        assert!(matches!(err, BackendError::Decode { .. }));
    }

    #[test]
    fn mean_index_ranks_similar_images_first() {
        let entries = vec![
            (1, vec![vec![1.0, 0.0]]),
            (2, vec![vec![0.9, 0.1]]),
            (3, vec![vec![0.0, 1.0]]),
        ];
        let mut by_id = std::collections::HashMap::new();
        for (id, descriptors) in entries {
            by_id.insert(id, features(descriptors));
        }
        let index =
            MeanDescriptorIndex::build(&[1, 2, 3], &mut |id| Ok(by_id[&id].clone())).unwrap();
        assert_eq!(index.query(1, 1), vec![2]);
        assert_eq!(index.query(1, 2), vec![2, 3]);
        assert!(index.query(99, 3).is_empty());
    }
}
