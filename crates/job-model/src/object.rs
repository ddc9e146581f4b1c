//! Object descriptors and object-store endpoint configuration.

use std::fmt;

use gstjob_common::error::{JobError, JobResult};
use serde::{Deserialize, Serialize};

/// Region used when an endpoint does not name one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Which streams of the source an object receives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    /// The complete processed output.
    #[default]
    All,
    /// Only the video branch.
    Video,
    /// Only the audio branch.
    Audio,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::All => "all",
            Self::Video => "video",
            Self::Audio => "audio",
        };
        f.write_str(name)
    }
}

/// A single object in an object store: the job's input or one of its outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescriptor {
    /// Object key inside the endpoint's bucket.
    #[serde(rename = "name")]
    pub key: String,

    /// Where the object lives.
    pub config: SourceSinkConfig,

    /// Which streams this object carries (sinks only).
    #[serde(default)]
    pub stream_type: StreamType,
}

/// Endpoint configuration wrapper; MinIO/S3 is the only supported backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSinkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minio: Option<EndpointConfig>,
}

/// Connection, TLS, and location parameters for an S3-compatible endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    /// Host and optional port, without scheme.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,

    /// Talk plain HTTP instead of HTTPS.
    #[serde(default, rename = "insecureNoTLS")]
    pub insecure_no_tls: bool,

    /// Base64-encoded PEM bundle for the endpoint's CA.
    #[serde(default, rename = "endpointCA", skip_serializing_if = "String::is_empty")]
    pub endpoint_ca: String,

    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure_skip_verify: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bucket: String,

    /// Key prefix, or a destination key template for sinks.
    #[serde(default, rename = "key", skip_serializing_if = "String::is_empty")]
    pub prefix: String,
}

impl ObjectDescriptor {
    pub fn new(key: impl Into<String>, endpoint: EndpointConfig, stream_type: StreamType) -> Self {
        Self {
            key: key.into(),
            config: SourceSinkConfig {
                minio: Some(endpoint),
            },
            stream_type,
        }
    }

    /// The S3 endpoint this object lives on.
    pub fn endpoint(&self) -> JobResult<&EndpointConfig> {
        self.config.minio.as_ref().ok_or_else(|| {
            JobError::spec(format!(
                "Object '{}' has no MinIO configuration; other endpoints are not supported",
                self.key
            ))
        })
    }

    /// Last path component of the key.
    pub fn base_name(&self) -> &str {
        base_name(&self.key)
    }
}

impl SourceSinkConfig {
    /// Overlay `self` on top of `globals`: fields set here win.
    pub fn merged_over(&self, globals: Option<&SourceSinkConfig>) -> SourceSinkConfig {
        let Some(globals) = globals else {
            return self.clone();
        };
        let minio = match (&globals.minio, &self.minio) {
            (Some(base), Some(own)) => Some(own.merged_over(base)),
            (Some(base), None) => Some(base.clone()),
            (None, own) => own.clone(),
        };
        SourceSinkConfig { minio }
    }
}

impl EndpointConfig {
    pub fn use_tls(&self) -> bool {
        !self.insecure_no_tls
    }

    pub fn region(&self) -> &str {
        if self.region.is_empty() {
            DEFAULT_REGION
        } else {
            &self.region
        }
    }

    /// Endpoint URL including the scheme implied by the TLS policy.
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_tls() { "https" } else { "http" };
        format!("{scheme}://{}", self.endpoint.trim_end_matches('/'))
    }

    /// Overlay `self` on top of `base`: non-empty fields and set flags here win.
    pub fn merged_over(&self, base: &EndpointConfig) -> EndpointConfig {
        fn pick(own: &str, base: &str) -> String {
            let chosen = if own.is_empty() { base } else { own };
            chosen.to_string()
        }
        EndpointConfig {
            endpoint: pick(&self.endpoint, &base.endpoint),
            insecure_no_tls: self.insecure_no_tls || base.insecure_no_tls,
            endpoint_ca: pick(&self.endpoint_ca, &base.endpoint_ca),
            insecure_skip_verify: self.insecure_skip_verify || base.insecure_skip_verify,
            region: pick(&self.region, &base.region),
            bucket: pick(&self.bucket, &base.bucket),
            prefix: pick(&self.prefix, &base.prefix),
        }
    }

    /// Compute the destination key for an output derived from `src_key`.
    ///
    /// The configured key may be a template using `{{ .SrcName }}` (source
    /// base name without extension) and `{{ .SrcExt }}` (extension with the
    /// leading dot). A plain prefix yields `<prefix>/<basename of src_key>`.
    pub fn destination_key(&self, src_key: &str) -> String {
        if self.prefix.contains("{{") {
            let ext = extension(src_key);
            let name = base_name(src_key.strip_suffix(ext).unwrap_or(src_key));
            return render_key_template(&self.prefix, name, ext);
        }
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            base_name(src_key).to_string()
        } else {
            format!("{prefix}/{}", base_name(src_key))
        }
    }
}

fn render_key_template(template: &str, src_name: &str, src_ext: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        match after[..end].trim() {
            ".SrcName" => out.push_str(src_name),
            ".SrcExt" => out.push_str(src_ext),
            other => {
                tracing::warn!(field = other, "Unknown field in destination key template");
                out.push_str(&rest[start..start + 2 + end + 2]);
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Last `/`-separated component of a key.
pub fn base_name(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Extension of the last component of a key, including the dot.
pub fn extension(key: &str) -> &str {
    let name = base_name(key);
    match name.rfind('.') {
        Some(idx) => &name[idx..],
        None => "",
    }
}
