//! The matcher job family.
//!
//! All matcher variants share one match-and-verify loop ([`MatchingJob`]);
//! they differ only in how candidate pairs are selected ([`PairSelection`]).
//! Externally supplied correspondence lists go through [`MatchImportJob`]
//! instead, which skips the matching step and optionally verifies.

use chrono::Utc;

use parallax_core::listing::MatchBlock;
use parallax_core::pairing::{
    exhaustive_pairs, sequential_pairs, spatial_pairs, transitive_pairs, vocab_tree_pairs,
    LoopClosure,
};
use parallax_core::types::{ordered_pair, ImageId, ImagePair};

use crate::backend::{
    BackendError, Correspondence, FeatureStore, ImageEntry, MatchKernel, PairMatches,
};
use crate::gpu::GpuContext;
use crate::kernel::MeanDescriptorIndex;
use crate::lifecycle::{Job, JobError};

// ---------------------------------------------------------------------------
// Candidate selection
// ---------------------------------------------------------------------------

/// How a [`MatchingJob`] selects its candidate pairs. Chosen once at
/// configuration time.
#[derive(Debug, Clone)]
pub enum PairSelection {
    /// All unordered pairs among known images.
    Exhaustive,
    /// Bounded window of order-adjacent images, optional loop-closure
    /// re-checks against sampled earlier images.
    Sequential {
        overlap: usize,
        loop_closure: Option<LoopClosure>,
    },
    /// Nearest neighbours by known location.
    Spatial {
        max_neighbors: usize,
        max_distance: f64,
    },
    /// Bounded-round expansion of the existing match graph.
    Transitive { rounds: usize },
    /// Top-k visually similar candidates from the visual index.
    VocabTree { num_nearest: usize },
    /// An externally supplied explicit pair list (by image name).
    ExplicitPairs(Vec<(String, String)>),
}

impl PairSelection {
    fn label(&self) -> &'static str {
        match self {
            Self::Exhaustive => "exhaustive-matcher",
            Self::Sequential { .. } => "sequential-matcher",
            Self::Spatial { .. } => "spatial-matcher",
            Self::Transitive { .. } => "transitive-matcher",
            Self::VocabTree { .. } => "vocab-tree-matcher",
            Self::ExplicitPairs(_) => "pairs-matcher",
        }
    }
}

// ---------------------------------------------------------------------------
// Shared match-and-verify job
// ---------------------------------------------------------------------------

pub struct MatchingJob {
    selection: PairSelection,
    store: Box<dyn FeatureStore>,
    kernel: Box<dyn MatchKernel>,
}

impl MatchingJob {
    pub fn new(
        selection: PairSelection,
        store: Box<dyn FeatureStore>,
        kernel: Box<dyn MatchKernel>,
    ) -> Self {
        Self {
            selection,
            store,
            kernel,
        }
    }

    fn candidate_pairs(&self, images: &[ImageEntry]) -> Result<Vec<ImagePair>, BackendError> {
        let ids: Vec<ImageId> = images.iter().map(|e| e.id).collect();
        let pairs = match &self.selection {
            PairSelection::Exhaustive => exhaustive_pairs(&ids),
            PairSelection::Sequential {
                overlap,
                loop_closure,
            } => {
                // name order stands in for capture order
                let mut ordered: Vec<&ImageEntry> = images.iter().collect();
                ordered.sort_by(|a, b| a.name.cmp(&b.name));
                let ids: Vec<ImageId> = ordered.iter().map(|e| e.id).collect();
                sequential_pairs(&ids, *overlap, *loop_closure)
            }
            PairSelection::Spatial {
                max_neighbors,
                max_distance,
            } => {
                let locations: Vec<(ImageId, Option<[f64; 3]>)> =
                    images.iter().map(|e| (e.id, e.location)).collect();
                spatial_pairs(&locations, *max_neighbors, *max_distance)
            }
            PairSelection::Transitive { rounds } => {
                transitive_pairs(&self.store.matched_pairs()?, *rounds)
            }
            PairSelection::VocabTree { num_nearest } => {
                let mut with_features = Vec::with_capacity(ids.len());
                for id in &ids {
                    if self.store.has_features(*id)? {
                        with_features.push(*id);
                    }
                }
                let index =
                    MeanDescriptorIndex::build(&with_features, &mut |id| self.store.features(id))?;
                vocab_tree_pairs(&with_features, &index, *num_nearest)
            }
            PairSelection::ExplicitPairs(named) => {
                let mut out = Vec::with_capacity(named.len());
                for (name1, name2) in named {
                    match (self.store.image_id(name1)?, self.store.image_id(name2)?) {
                        (Some(a), Some(b)) => out.push(ordered_pair(a, b)),
                        _ => {
                            tracing::warn!(%name1, %name2, "Skipping pair with unknown image name")
                        }
                    }
                }
                out
            }
        };
        Ok(pairs)
    }
}

impl Job for MatchingJob {
    fn label(&self) -> &'static str {
        self.selection.label()
    }

    fn run(&mut self, gpu: Option<&GpuContext>) -> Result<(), JobError> {
        let images = self.store.images()?;
        let pairs = self.candidate_pairs(&images)?;
        tracing::info!(
            worker = self.label(),
            images = images.len(),
            candidates = pairs.len(),
            "Candidate pairs resolved",
        );

        let mut matched = 0usize;
        for (a, b) in pairs {
            let features = (self.store.features(a), self.store.features(b));
            let (fa, fb) = match features {
                (Ok(fa), Ok(fb)) => (fa, fb),
                (Err(BackendError::MissingFeatures(id)), _)
                | (_, Err(BackendError::MissingFeatures(id))) => {
                    tracing::warn!(image = id, "Skipping pair without stored features");
                    continue;
                }
                (Err(e), _) | (_, Err(e)) => return Err(e.into()),
            };

            let candidates = self.kernel.match_features(&fa, &fb, gpu)?;
            let verified = self.kernel.verify(&fa, &fb, candidates)?;
            if verified.is_empty() {
                tracing::debug!(pair = ?(a, b), "No verified matches");
                continue;
            }

            self.store.write_matches(&PairMatches {
                pair: (a, b),
                correspondences: verified,
                verified: true,
                recorded_at: Utc::now(),
            })?;
            matched += 1;
        }

        tracing::info!(worker = self.label(), matched, "Matching finished");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Externally supplied correspondences
// ---------------------------------------------------------------------------

/// Imports correspondence blocks; verifies them when `verify` is set (raw
/// import) and trusts them otherwise (inliers import).
pub struct MatchImportJob {
    blocks: Vec<MatchBlock>,
    verify: bool,
    store: Box<dyn FeatureStore>,
    kernel: Box<dyn MatchKernel>,
}

impl MatchImportJob {
    pub fn new(
        blocks: Vec<MatchBlock>,
        verify: bool,
        store: Box<dyn FeatureStore>,
        kernel: Box<dyn MatchKernel>,
    ) -> Self {
        Self {
            blocks,
            verify,
            store,
            kernel,
        }
    }
}

impl Job for MatchImportJob {
    fn label(&self) -> &'static str {
        if self.verify {
            "raw-matches-importer"
        } else {
            "inliers-matches-importer"
        }
    }

    fn run(&mut self, _gpu: Option<&GpuContext>) -> Result<(), JobError> {
        let mut imported = 0usize;

        for block in &self.blocks {
            let ids = (
                self.store.image_id(&block.name1)?,
                self.store.image_id(&block.name2)?,
            );
            let (id1, id2) = match ids {
                (Some(id1), Some(id2)) => (id1, id2),
                _ => {
                    tracing::warn!(
                        name1 = %block.name1,
                        name2 = %block.name2,
                        "Skipping match block with unknown image name",
                    );
                    continue;
                }
            };

            let mut correspondences: Vec<Correspondence> = block
                .correspondences
                .iter()
                .map(|(i, j)| Correspondence { idx1: *i, idx2: *j })
                .collect();

            // keep correspondence direction aligned with the normalised pair
            if id1 > id2 {
                for c in correspondences.iter_mut() {
                    std::mem::swap(&mut c.idx1, &mut c.idx2);
                }
            }
            let pair = ordered_pair(id1, id2);

            if self.verify {
                let fa = self.store.features(pair.0)?;
                let fb = self.store.features(pair.1)?;
                correspondences = self.kernel.verify(&fa, &fb, correspondences)?;
            }

            self.store.write_matches(&PairMatches {
                pair,
                correspondences,
                verified: self.verify,
                recorded_at: Utc::now(),
            })?;
            imported += 1;
        }

        tracing::info!(
            worker = self.label(),
            imported,
            verify = self.verify,
            "Match import finished",
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
