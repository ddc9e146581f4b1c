//! S3 / MinIO object store client.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use gstjob_common::config::{
    SINK_ACCESS_KEY_ID_ENV, SINK_SECRET_ACCESS_KEY_ENV, SRC_ACCESS_KEY_ID_ENV,
    SRC_SECRET_ACCESS_KEY_ENV,
};
use gstjob_model::EndpointConfig;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;

/// Static access key pair for one endpoint.
#[derive(Clone)]
pub struct AccessKeys {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for AccessKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessKeys")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl AccessKeys {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// Credentials for the source endpoint.
    pub fn source_from_env() -> StorageResult<Self> {
        Self::from_env(SRC_ACCESS_KEY_ID_ENV, SRC_SECRET_ACCESS_KEY_ENV)
    }

    /// Credentials for the sink endpoints.
    pub fn sink_from_env() -> StorageResult<Self> {
        Self::from_env(SINK_ACCESS_KEY_ID_ENV, SINK_SECRET_ACCESS_KEY_ENV)
    }

    fn from_env(id_key: &str, secret_key: &str) -> StorageResult<Self> {
        Ok(Self {
            access_key_id: std::env::var(id_key)
                .map_err(|_| StorageError::config_error(format!("{id_key} not set")))?,
            secret_access_key: std::env::var(secret_key)
                .map_err(|_| StorageError::config_error(format!("{secret_key} not set")))?,
        })
    }
}

/// Object store backed by an S3-compatible endpoint, bound to one bucket.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a client for the endpoint's bucket.
    pub fn new(endpoint: &EndpointConfig, keys: &AccessKeys) -> StorageResult<Self> {
        if endpoint.endpoint.is_empty() {
            return Err(StorageError::config_error("Endpoint address is empty"));
        }
        if endpoint.bucket.is_empty() {
            return Err(StorageError::config_error(format!(
                "No bucket configured for endpoint {}",
                endpoint.endpoint
            )));
        }
        if !endpoint.endpoint_ca.is_empty() || endpoint.insecure_skip_verify {
            warn!(
                endpoint = %endpoint.endpoint,
                "Custom CA and skip-verify settings are not applied; using the system trust store"
            );
        }

        let credentials = Credentials::new(
            &keys.access_key_id,
            &keys.secret_access_key,
            None,
            None,
            "gstjob",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(endpoint.endpoint_url())
            .region(Region::new(endpoint.region().to_string()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: endpoint.bucket.clone(),
        })
    }

    /// Generate a presigned GET URL for `key`.
    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(DisplayErrorContext(&e).to_string()))?;

        Ok(presigned.uri().to_string())
    }

    async fn copy_parts(
        &self,
        destination: &str,
        upload_id: &str,
        sources: &[String],
    ) -> StorageResult<Vec<CompletedPart>> {
        let mut completed = Vec::with_capacity(sources.len());
        for (idx, source) in sources.iter().enumerate() {
            let part_number = i32::try_from(idx + 1).map_err(|_| {
                StorageError::compose_failed(destination, "Too many parts to compose")
            })?;
            let copy_source = format!("{}/{}", self.bucket, urlencoding::encode(source));
            let output = self
                .client
                .upload_part_copy()
                .bucket(&self.bucket)
                .key(destination)
                .upload_id(upload_id)
                .part_number(part_number)
                .copy_source(copy_source)
                .send()
                .await
                .map_err(|e| {
                    StorageError::compose_failed(
                        destination,
                        format!("copy of {source}: {}", DisplayErrorContext(&e)),
                    )
                })?;

            let etag = output
                .copy_part_result()
                .and_then(|r| r.e_tag())
                .map(str::to_string);
            completed.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(etag)
                    .build(),
            );
        }
        Ok(completed)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
        debug!(bucket = %self.bucket, key, bytes = data.len(), "Uploading object");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(key, DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!(bucket = %self.bucket, key, "Downloading object");

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(key, DisplayErrorContext(&e).to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(key, e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    async fn compose(&self, destination: &str, sources: &[String]) -> StorageResult<()> {
        info!(
            bucket = %self.bucket,
            key = destination,
            parts = sources.len(),
            "Composing object from parts"
        );

        let upload = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(destination)
            .content_type(crate::store::OCTET_STREAM)
            .send()
            .await
            .map_err(|e| {
                StorageError::compose_failed(destination, DisplayErrorContext(&e).to_string())
            })?;
        let upload_id = upload
            .upload_id()
            .ok_or_else(|| StorageError::compose_failed(destination, "No upload id returned"))?
            .to_string();

        let result = match self.copy_parts(destination, &upload_id, sources).await {
            Ok(parts) => self
                .client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(destination)
                .upload_id(&upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await
                .map(|_| ())
                .map_err(|e| {
                    StorageError::compose_failed(destination, DisplayErrorContext(&e).to_string())
                }),
            Err(e) => Err(e),
        };

        if result.is_err() {
            if let Err(e) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(destination)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!(
                    key = destination,
                    error = %DisplayErrorContext(&e),
                    "Failed to abort multipart upload"
                );
            }
        }
        result
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        debug!(bucket = %self.bucket, key, "Deleting object");

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(key, DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }
}
