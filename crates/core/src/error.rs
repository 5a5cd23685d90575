use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("EXIF parsing error: {0}")]
    Exif(#[from] exif::Error),

    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("cannot read source directory {}: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no usable capture time in {}: {reason}", .path.display())]
    ExtractionFailed { path: PathBuf, reason: String },

    #[error("record already exists: {0}")]
    DuplicateRecord(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("existence check failed for {key}: {message}")]
    BlobCheckFailed { key: String, message: String },

    #[error("upload failed for {key}: {message}")]
    BlobUploadFailed { key: String, message: String },

    #[error("listing blob store failed: {0}")]
    BlobListFailed(String),

    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    #[error("failed to persist metadata to {}: {source}", .path.display())]
    PersistFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("resize error: {0}")]
    Resize(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("URL signing error: {0}")]
    Signing(String),
}

pub type Result<T> = std::result::Result<T, Error>;
