//! The job dispatcher: one entry point per job kind.
//!
//! Each entry point assembles validated configuration, resolves the image or
//! pair input set, constructs exactly one worker, executes it over the
//! resolved GPU path, and reports the terminal state. All configuration
//! errors surface before any worker exists.

pub mod dispatch;
pub mod error;
pub mod options;
pub mod runner;

pub use dispatch::{
    run_exhaustive_matcher, run_feature_extractor, run_feature_importer, run_matches_importer,
    run_sequential_matcher, run_spatial_matcher, run_transitive_matcher, run_vocab_tree_matcher,
    DispatchReport, DispatchStatus,
};
pub use error::PipelineError;
