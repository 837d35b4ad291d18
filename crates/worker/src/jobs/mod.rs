//! The closed family of job kinds the dispatcher can construct.
//!
//! Exactly one job is selected per invocation, at configuration time; there
//! is no re-dispatch after construction.

pub mod extract;
pub mod import;
pub mod matchers;

pub use extract::{FeatureExtractionJob, ResolvedImage};
pub use import::FeatureImportJob;
pub use matchers::{MatchImportJob, MatchingJob, PairSelection};
