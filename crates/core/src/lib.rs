//! Pure domain logic for the feature pipeline: camera model registry,
//! candidate-pair generation policies, and list-file readers.
//!
//! This crate has zero internal dependencies and no async. The only I/O it
//! performs is reading image-list, pair-list, and match-list files.

pub mod camera;
pub mod error;
pub mod listing;
pub mod pairing;
pub mod types;

pub use error::CoreError;
