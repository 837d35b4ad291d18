//! One dispatcher entry point per job kind.
//!
//! Strict order inside every entry point: validate configuration, resolve the
//! input set (an empty result is a deliberate no-op success), construct
//! exactly one worker, execute it over the resolved GPU path, and derive the
//! outcome from the worker's terminal state. A configuration error aborts
//! before any worker, store mutation, or GPU context exists.

use std::path::Path;

use uuid::Uuid;

use parallax_core::camera::validate_camera_config;
use parallax_core::listing::{read_match_blocks, read_pair_list, read_text_file_lines, scan_image_directory};
use parallax_core::pairing::LoopClosure;

use parallax_worker::backend::FeatureStore;
use parallax_worker::jobs::{
    FeatureExtractionJob, FeatureImportJob, MatchImportJob, MatchingJob, PairSelection,
    ResolvedImage,
};
use parallax_worker::kernel::{GridDescriptorBackend, MutualNearestKernel};
use parallax_worker::sidecar::SidecarStore;
use parallax_worker::{Worker, WorkerOutcome, WorkerState};

use crate::error::PipelineError;
use crate::options::{
    ExhaustiveMatchingOptions, ExtractionOptions, ImportOptions, MatchType, MatchesImportOptions,
    MatchingOptions, SequentialMatchingOptions, SpatialMatchingOptions, TransitiveMatchingOptions,
    VocabTreeMatchingOptions,
};
use crate::runner::{execute, ExecutionPath};

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// The worker ran to the Completed terminal state.
    Completed,
    /// The resolved input set was empty; no worker was constructed.
    SkippedEmptyInput,
}

/// Outcome of one dispatcher invocation.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub status: DispatchStatus,
    /// Size of the resolved image or pair input set.
    pub resolved_items: usize,
    /// Whether a GPU context was created for this invocation.
    pub gpu_context_used: bool,
}

impl DispatchReport {
    fn skipped() -> Self {
        Self {
            status: DispatchStatus::SkippedEmptyInput,
            resolved_items: 0,
            gpu_context_used: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared steps
// ---------------------------------------------------------------------------

/// Resolve the image input set: an explicit list file takes precedence over
/// the recursive directory scan.
fn resolve_image_set(
    image_path: &Path,
    image_list_path: Option<&Path>,
) -> Result<Vec<String>, PipelineError> {
    let names = match image_list_path {
        Some(list) => read_text_file_lines(list)?,
        None => scan_image_directory(image_path)?,
    };
    Ok(names)
}

/// Map a worker's terminal state onto the invocation outcome.
fn into_report(
    outcome: WorkerOutcome,
    label: &str,
    resolved_items: usize,
) -> Result<DispatchReport, PipelineError> {
    match outcome.state {
        WorkerState::Completed => Ok(DispatchReport {
            status: DispatchStatus::Completed,
            resolved_items,
            gpu_context_used: outcome.gpu_context_used,
        }),
        _ => Err(PipelineError::JobFailed {
            label: label.to_string(),
            message: outcome
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unspecified worker failure".to_string()),
        }),
    }
}

fn kernel_from(options: &MatchingOptions) -> MutualNearestKernel {
    MutualNearestKernel {
        max_ratio: options.max_ratio,
        max_distance: options.max_distance,
    }
}

/// Shared tail of every matcher entry point: read the store's image set,
/// short-circuit on empty, then run one matching worker.
async fn run_matcher(
    options: &MatchingOptions,
    selection: PairSelection,
) -> Result<DispatchReport, PipelineError> {
    let store = SidecarStore::open(&options.store_path)?;
    let images = store.images()?;
    if images.is_empty() {
        tracing::info!(store = %options.store_path.display(), "No images in store; nothing to match");
        return Ok(DispatchReport::skipped());
    }
    let resolved = images.len();

    let job = MatchingJob::new(selection, Box::new(store), Box::new(kernel_from(options)));
    let worker = Worker::new(Box::new(job));
    let label = worker.label();
    let outcome = execute(worker, ExecutionPath::resolve(options.use_gpu)).await?;
    into_report(outcome, label, resolved)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Compute descriptors for every image in the resolved input set.
pub async fn run_feature_extractor(
    options: &ExtractionOptions,
) -> Result<DispatchReport, PipelineError> {
    let invocation = Uuid::now_v7();
    tracing::info!(%invocation, store = %options.store_path.display(), "Feature extraction requested");

    validate_camera_config(&options.camera_model, &options.camera_params)?;

    let names = resolve_image_set(&options.image_path, options.image_list_path.as_deref())?;
    if names.is_empty() {
        tracing::info!("Resolved image set is empty; nothing to extract");
        return Ok(DispatchReport::skipped());
    }
    let resolved = names.len();

    let store = SidecarStore::open(&options.store_path)?;
    let images = names
        .into_iter()
        .map(|name| ResolvedImage {
            path: options.image_path.join(&name),
            name,
        })
        .collect();
    let job = FeatureExtractionJob::new(
        images,
        Box::new(GridDescriptorBackend::default()),
        Box::new(store),
    );

    let worker = Worker::new(Box::new(job));
    let label = worker.label();
    let outcome = execute(worker, ExecutionPath::resolve(options.use_gpu)).await?;
    into_report(outcome, label, resolved)
}

/// Ingest externally computed descriptors for the resolved image set.
pub async fn run_feature_importer(
    options: &ImportOptions,
) -> Result<DispatchReport, PipelineError> {
    let invocation = Uuid::now_v7();
    tracing::info!(%invocation, store = %options.store_path.display(), "Feature import requested");

    validate_camera_config(&options.camera_model, &options.camera_params)?;

    let names = resolve_image_set(&options.image_path, options.image_list_path.as_deref())?;
    if names.is_empty() {
        tracing::info!("Resolved image set is empty; nothing to import");
        return Ok(DispatchReport::skipped());
    }
    let resolved = names.len();

    let store = SidecarStore::open(&options.store_path)?;
    let job = FeatureImportJob::new(names, options.import_path.clone(), Box::new(store));

    // descriptor ingestion is file shuffling; it never takes the GPU path
    let worker = Worker::new(Box::new(job));
    let label = worker.label();
    let outcome = execute(worker, ExecutionPath::Direct).await?;
    into_report(outcome, label, resolved)
}

/// Match all unordered image pairs.
pub async fn run_exhaustive_matcher(
    options: &ExhaustiveMatchingOptions,
) -> Result<DispatchReport, PipelineError> {
    let invocation = Uuid::now_v7();
    tracing::info!(%invocation, "Exhaustive matching requested");
    run_matcher(&options.matching, PairSelection::Exhaustive).await
}

/// Match each image against a window of order-adjacent images.
pub async fn run_sequential_matcher(
    options: &SequentialMatchingOptions,
) -> Result<DispatchReport, PipelineError> {
    let invocation = Uuid::now_v7();
    tracing::info!(%invocation, "Sequential matching requested");

    options.validate()?;
    let loop_closure = options.loop_detection.then_some(LoopClosure {
        period: options.loop_detection_period,
        num_images: options.loop_detection_num_images,
    });
    run_matcher(
        &options.matching,
        PairSelection::Sequential {
            overlap: options.overlap,
            loop_closure,
        },
    )
    .await
}

/// Match each image against its spatial neighbours.
pub async fn run_spatial_matcher(
    options: &SpatialMatchingOptions,
) -> Result<DispatchReport, PipelineError> {
    let invocation = Uuid::now_v7();
    tracing::info!(%invocation, "Spatial matching requested");

    options.validate()?;
    run_matcher(
        &options.matching,
        PairSelection::Spatial {
            max_neighbors: options.max_num_neighbors,
            max_distance: options.max_distance,
        },
    )
    .await
}

/// Expand the existing match graph transitively.
pub async fn run_transitive_matcher(
    options: &TransitiveMatchingOptions,
) -> Result<DispatchReport, PipelineError> {
    let invocation = Uuid::now_v7();
    tracing::info!(%invocation, "Transitive matching requested");
    run_matcher(
        &options.matching,
        PairSelection::Transitive {
            rounds: options.num_iterations,
        },
    )
    .await
}

/// Match each image against its most visually similar candidates.
pub async fn run_vocab_tree_matcher(
    options: &VocabTreeMatchingOptions,
) -> Result<DispatchReport, PipelineError> {
    let invocation = Uuid::now_v7();
    tracing::info!(%invocation, "Vocabulary-tree matching requested");
    run_matcher(
        &options.matching,
        PairSelection::VocabTree {
            num_nearest: options.num_nearest,
        },
    )
    .await
}

/// Generic importer: `match_type` selects the pairs, raw, or inliers variant.
pub async fn run_matches_importer(
    options: &MatchesImportOptions,
) -> Result<DispatchReport, PipelineError> {
    let invocation = Uuid::now_v7();
    tracing::info!(%invocation, match_type = %options.match_type, "Match import requested");

    // checked before everything else, independent of the other validation
    let match_type: MatchType = options.match_type.parse()?;

    match match_type {
        MatchType::Pairs => {
            let pairs = read_pair_list(&options.match_list_path)?;
            if pairs.is_empty() {
                tracing::info!("Pair list is empty; nothing to match");
                return Ok(DispatchReport::skipped());
            }
            let resolved = pairs.len();

            let store = SidecarStore::open(&options.matching.store_path)?;
            let job = MatchingJob::new(
                PairSelection::ExplicitPairs(pairs),
                Box::new(store),
                Box::new(kernel_from(&options.matching)),
            );
            let worker = Worker::new(Box::new(job));
            let label = worker.label();
            let outcome = execute(worker, ExecutionPath::resolve(options.matching.use_gpu)).await?;
            into_report(outcome, label, resolved)
        }
        MatchType::Raw | MatchType::Inliers => {
            let blocks = read_match_blocks(&options.match_list_path)?;
            if blocks.is_empty() {
                tracing::info!("Match list is empty; nothing to import");
                return Ok(DispatchReport::skipped());
            }
            let resolved = blocks.len();

            let store = SidecarStore::open(&options.matching.store_path)?;
            let job = MatchImportJob::new(
                blocks,
                match_type == MatchType::Raw,
                Box::new(store),
                Box::new(kernel_from(&options.matching)),
            );
            let worker = Worker::new(Box::new(job));
            let label = worker.label();
            let outcome = execute(worker, ExecutionPath::resolve(options.matching.use_gpu)).await?;
            into_report(outcome, label, resolved)
        }
    }
}
