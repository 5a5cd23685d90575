use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::blob::fs::FilesystemBlobStore;
use crate::blob::{BlobStore, ExistenceCheck};
use crate::domain::KeyPrefixes;
use crate::error::{Error, Result};
use crate::metadata::ExifExtractor;
use crate::pipeline::{IngestionPipeline, PipelineOptions};
use crate::query::Gallery;
use crate::resize::DerivativeGenerator;
use crate::signing::{CannedPolicySigner, UnsignedUrls, UrlSigner};
use crate::store::PhotoStore;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_THUMBNAIL_HEIGHT: u32 = 162;
pub const DEFAULT_MEDIUM_HEIGHT: u32 = 768;
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Settings for a sync run and for the query side. Every field may be left
/// out of the TOML file; missing ones take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub source_dir: Option<PathBuf>,
    pub store_path: PathBuf,
    pub concurrency: usize,
    pub existence_check: ExistenceCheck,
    pub persist_each_insert: bool,
    pub prefixes: KeyPrefixes,
    pub thumbnail_height: u32,
    pub medium_height: u32,
    pub jpeg_quality: u8,
    pub blob: BlobConfig,
    pub delivery: DeliveryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            store_path: PathBuf::from("photos.json"),
            concurrency: DEFAULT_CONCURRENCY,
            existence_check: ExistenceCheck::default(),
            persist_each_insert: false,
            prefixes: KeyPrefixes::default(),
            thumbnail_height: DEFAULT_THUMBNAIL_HEIGHT,
            medium_height: DEFAULT_MEDIUM_HEIGHT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            blob: BlobConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BlobConfig {
    Filesystem {
        root: PathBuf,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for BlobConfig {
    fn default() -> Self {
        BlobConfig::Filesystem {
            root: PathBuf::from("bucket"),
        }
    }
}

/// Where viewers fetch derivatives from and how those URLs are authenticated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub base_url: String,
    pub key_pair_id: Option<String>,
    pub private_key_file: Option<PathBuf>,
    pub expiration_hours: i64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            key_pair_id: None,
            private_key_file: None,
            expiration_hours: 1,
        }
    }
}

impl DeliveryConfig {
    /// A key-pair id together with a private key selects signed URLs;
    /// neither selects plain URLs. One without the other is an error.
    pub fn signer(&self) -> Result<Box<dyn UrlSigner>> {
        match (&self.key_pair_id, &self.private_key_file) {
            (Some(id), Some(key_file)) => Ok(Box::new(CannedPolicySigner::from_pem_file(
                id.clone(),
                key_file,
                self.expiration_hours * 3600,
            )?)),
            (None, None) => Ok(Box::new(UnsignedUrls)),
            _ => Err(Error::Config(
                "delivery signing needs both key_pair_id and private_key_file".to_string(),
            )),
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        let config: SyncConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("failed to parse config file {}: {e}", path.display()))
        })?;
        Ok(config)
    }

    /// Load `path` when it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        let prefixes = [
            &self.prefixes.image,
            &self.prefixes.thumb,
            &self.prefixes.medium,
        ];
        if prefixes.iter().any(|p| p.is_empty()) {
            return Err(Error::Config("key prefixes must not be empty".to_string()));
        }
        if prefixes[0] == prefixes[1] || prefixes[0] == prefixes[2] || prefixes[1] == prefixes[2] {
            return Err(Error::Config("key prefixes must be distinct".to_string()));
        }
        if self.thumbnail_height == 0 || self.medium_height == 0 {
            return Err(Error::Config("derivative heights must be positive".to_string()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config("jpeg_quality must be within 1..=100".to_string()));
        }
        if self.delivery.expiration_hours <= 0 {
            return Err(Error::Config("expiration_hours must be positive".to_string()));
        }
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            concurrency: self.concurrency,
            existence_check: self.existence_check,
            persist_each_insert: self.persist_each_insert,
            prefixes: self.prefixes.clone(),
            thumbnail_height: self.thumbnail_height,
            medium_height: self.medium_height,
        }
    }

    /// Connect the configured blob backend.
    pub fn open_blob_store(&self) -> Result<Arc<dyn BlobStore>> {
        match &self.blob {
            BlobConfig::Filesystem { root } => Ok(Arc::new(FilesystemBlobStore::new(root)?)),
            #[cfg(feature = "s3")]
            BlobConfig::S3 {
                bucket,
                region,
                endpoint,
                force_path_style,
            } => {
                let settings = crate::blob::s3::S3Settings {
                    bucket: bucket.clone(),
                    region: region.clone(),
                    endpoint: endpoint.clone(),
                    force_path_style: *force_path_style,
                };
                Ok(Arc::new(crate::blob::s3::S3BlobStore::connect(&settings)?))
            }
            #[cfg(not(feature = "s3"))]
            BlobConfig::S3 { .. } => Err(Error::Config(
                "s3 backend requested but this build lacks the `s3` feature".to_string(),
            )),
        }
    }

    /// Wire a pipeline from this configuration: open the store, connect the
    /// blob backend and use EXIF extraction.
    pub fn build_pipeline(&self) -> Result<IngestionPipeline> {
        self.validate()?;
        let store = Arc::new(PhotoStore::open(&self.store_path)?);
        let blobs = self.open_blob_store()?;
        info!(
            store = %self.store_path.display(),
            backend = blobs.backend_name(),
            records = store.len(),
            "pipeline ready"
        );
        Ok(IngestionPipeline::new(
            store,
            blobs,
            Arc::new(ExifExtractor),
            DerivativeGenerator::new(self.jpeg_quality),
            self.pipeline_options(),
        ))
    }

    /// Wire the query side over the store at `store_path`.
    pub fn open_gallery(&self) -> Result<Gallery> {
        let store = Arc::new(PhotoStore::open(&self.store_path)?);
        Ok(Gallery::new(
            store,
            self.delivery.base_url.clone(),
            self.prefixes.clone(),
            self.delivery.signer()?,
        ))
    }
}
