use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Camera model does not exist: {0}")]
    UnknownCameraModel(String),

    #[error("Invalid camera parameters: {0}")]
    InvalidCameraParams(String),

    #[error("Invalid match type: {0:?} (expected 'pairs', 'raw', or 'inliers')")]
    InvalidMatchType(String),

    #[error("Invalid option {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("Malformed list file {path}: {reason}")]
    MalformedList { path: PathBuf, reason: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
