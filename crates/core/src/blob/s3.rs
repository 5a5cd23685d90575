//! S3-compatible backend using the AWS SDK.
//!
//! The pipeline is synchronous, so the store owns a small tokio runtime and
//! blocks on each request from the calling worker thread.

use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, instrument};

use super::BlobStore;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO etc.).
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

pub struct S3BlobStore {
    runtime: tokio::runtime::Runtime,
    client: Client,
    bucket: String,
    url_base: String,
}

impl S3BlobStore {
    /// Build a client from the ambient AWS configuration and verify the bucket
    /// is reachable.
    pub fn connect(settings: &S3Settings) -> Result<Self> {
        if settings.bucket.is_empty() {
            return Err(Error::Config("s3 bucket is not set".to_string()));
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;

        let region = settings
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());
        let endpoint = settings.endpoint.as_ref().map(|endpoint| {
            let lower = endpoint.to_ascii_lowercase();
            if lower.starts_with("http://") || lower.starts_with("https://") {
                endpoint.clone()
            } else {
                format!("http://{endpoint}")
            }
        });

        let client = runtime.block_on(async {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(aws_config::Region::new(region.clone()))
                .load()
                .await;
            let mut builder = aws_sdk_s3::config::Builder::from(&shared);
            if let Some(url) = &endpoint {
                builder = builder.endpoint_url(url);
            }
            if settings.force_path_style {
                builder = builder.force_path_style(true);
            }
            Client::from_conf(builder.build())
        });

        runtime
            .block_on(client.head_bucket().bucket(&settings.bucket).send())
            .map_err(|e| Error::Config(format!("bucket {} not reachable: {e}", settings.bucket)))?;

        let url_base = match &endpoint {
            Some(url) => format!("{}/{}", url.trim_end_matches('/'), settings.bucket),
            None => format!("https://{}.s3.{region}.amazonaws.com", settings.bucket),
        };

        Ok(Self {
            runtime,
            client,
            bucket: settings.bucket.clone(),
            url_base,
        })
    }
}

impl BlobStore for S3BlobStore {
    #[instrument(skip(self), fields(backend = "s3"))]
    fn exists(&self, key: &str) -> Result<bool> {
        let result = self.runtime.block_on(
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send(),
        );
        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = err {
                    if service_err.raw().status().as_u16() == 404 {
                        return Ok(false);
                    }
                }
                Err(Error::BlobCheckFailed {
                    key: key.to_string(),
                    message: err.to_string(),
                })
            }
        }
    }

    #[instrument(skip(self, content), fields(backend = "s3", size = content.len()))]
    fn put(&self, key: &str, content: &[u8], content_type: &str) -> Result<String> {
        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .content_type(content_type)
                    .body(ByteStream::from(content.to_vec()))
                    .send(),
            )
            .map_err(|e| Error::BlobUploadFailed {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        Ok(format!("{}/{}", self.url_base, key))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }
            let output = self
                .runtime
                .block_on(request.send())
                .map_err(|e| Error::BlobListFailed(e.to_string()))?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(str::to_string);
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        debug!(count = keys.len(), "listed bucket");
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}
