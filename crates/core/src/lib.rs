pub mod blob;
pub mod config;
pub mod domain;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod query;
pub mod resize;
pub mod signing;
pub mod store;

pub use blob::{BlobStore, ExistenceCheck, ExistenceChecker};
pub use config::SyncConfig;
pub use domain::{KeyPrefixes, PhotoRecord, Variant, VariantCounts};
pub use error::{Error, Result};
pub use metadata::{ExifExtractor, MetadataExtractor};
pub use pipeline::{
    CancelFlag, FileError, FileOutcome, IngestionPipeline, PipelineOptions, RunReport,
    SyncProgress,
};
pub use query::{Gallery, PhotoEntry};
pub use resize::{DerivativeGenerator, TargetSize};
pub use signing::{CannedPolicySigner, UnsignedUrls, UrlSigner};
pub use store::PhotoStore;

use std::path::Path;

/// Sync `source_dir` using `config`, with no progress reporting.
pub fn sync_directory(config: &SyncConfig, source_dir: &Path, erase_existing: bool) -> Result<RunReport> {
    config.build_pipeline()?.run(source_dir, erase_existing)
}
